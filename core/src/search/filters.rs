use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::path::KbPath;
use crate::storage::DocumentRecord;

/// Hard exclusion filters applied to search candidates. An empty filter set keeps everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub category: Option<Uuid>,
    /// Every listed tag must be present on the document, ignoring case. Blank tags are
    /// dropped.
    #[serde(default, deserialize_with = "non_blank_tags")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub path_prefix: Option<KbPath>,
}

impl SearchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, category: Uuid) -> Self {
        self.category = Some(category);
        self
    }

    /// Adds a required tag. A blank tag constrains nothing and is ignored.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        let tag = tag.trim();
        if !tag.is_empty() {
            self.tags.push(tag.to_string());
        }
        self
    }

    pub fn with_path_prefix(mut self, prefix: KbPath) -> Self {
        self.path_prefix = Some(prefix);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.tags.is_empty() && self.path_prefix.is_none()
    }

    pub fn matches(&self, document: &DocumentRecord) -> bool {
        if let Some(category) = self.category {
            if document.category_id != Some(category) {
                return false;
            }
        }
        let mut required = self.tags.iter().map(|tag| tag.trim()).filter(|tag| !tag.is_empty());
        if !required.all(|tag| document.has_tag(tag)) {
            return false;
        }
        match &self.path_prefix {
            Some(prefix) => document.path.starts_with(prefix),
            None => true,
        }
    }
}

fn non_blank_tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let tags = Vec::<String>::deserialize(deserializer)?;
    Ok(tags
        .into_iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect())
}
