mod common;

use std::time::Duration;

use casebase_core::context::OpContext;
use casebase_core::storage::{
    checksum, BlobKey, BlobKeying, BlobStore, DeleteSummary, Entry, Error, MetadataStore, Step,
};
use common::{Call, Fault, Harness};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn create_document_stores_blob_and_record() {
    let h = Harness::new(BlobKeying::ById).await;
    h.kb.ensure_path(&h.ctx, "clients/smith").await.unwrap();
    let doc = h
        .kb
        .create_document(&h.ctx, "/clients//smith/intake.txt/", b"Initial intake".to_vec(), "text/plain; charset=utf-8")
        .await
        .unwrap();

    assert_eq!(doc.path.to_string(), "clients/smith/intake.txt");
    assert_eq!(doc.size, 14);
    assert_eq!(doc.content_type, "text/plain");
    assert_eq!(doc.checksum, checksum(b"Initial intake"));
    assert_eq!(doc.blob_key, BlobKey::new(format!("{}/{}", h.workspace.id, doc.id)));

    let (record, bytes) = h.kb.read_document(&h.ctx, "clients/smith/intake.txt").await.unwrap();
    assert_eq!(record.id, doc.id);
    assert_eq!(bytes, b"Initial intake");
    assert!(h.kb.verify_document(&h.ctx, "clients/smith/intake.txt").await.is_ok());
}

#[tokio::test]
async fn create_rejects_conflicts_missing_parents_and_bad_input() {
    let h = Harness::new(BlobKeying::ById).await;
    h.kb.create_folder(&h.ctx, "matters").await.unwrap();

    assert!(matches!(h.kb.create_folder(&h.ctx, "matters").await, Err(Error::Conflict(_))));
    assert!(matches!(h.kb.create_folder(&h.ctx, "archive/2023").await, Err(Error::NotFound(_))));
    assert!(matches!(h.kb.create_folder(&h.ctx, "matters/../etc").await, Err(Error::InvalidPath(_))));
    assert!(matches!(h.kb.create_folder(&h.ctx, "matters/a|b").await, Err(Error::InvalidPath(_))));

    let missing_parent = h.kb.create_document(&h.ctx, "archive/memo.txt", b"x".to_vec(), "text/plain").await;
    assert!(matches!(missing_parent, Err(Error::NotFound(_))));
    let over_folder = h.kb.create_document(&h.ctx, "matters", b"x".to_vec(), "text/plain").await;
    assert!(matches!(over_folder, Err(Error::Conflict(_))));
    let bad_type = h.kb.create_document(&h.ctx, "matters/memo.txt", b"x".to_vec(), "not a type").await;
    assert!(matches!(bad_type, Err(Error::InvalidInput(_))));

    assert_eq!(h.paths().await, ["matters"]);
    assert!(h.blobs.is_empty().await);
}

#[tokio::test]
async fn ensure_path_creates_ancestors_and_stops_at_documents() {
    let h = Harness::new(BlobKeying::ById).await;
    let leaf = h.kb.ensure_path(&h.ctx, "a/b/c").await.unwrap();
    assert_eq!(h.paths().await, ["a", "a/b", "a/b/c"]);

    let again = h.kb.ensure_path(&h.ctx, "a/b/c").await.unwrap();
    assert_eq!(again.id, leaf.id);

    h.kb.create_document(&h.ctx, "a/b/file.txt", b"x".to_vec(), "text/plain").await.unwrap();
    match h.kb.ensure_path(&h.ctx, "a/b/file.txt/d").await {
        Err(Error::Conflict(msg)) => assert!(msg.contains("a/b/file.txt")),
        other => panic!("expected conflict, got {:?}", other),
    }
    assert!(h.kb.get(&h.ctx, "a/b/file.txt/d").await.is_err());
}

#[tokio::test]
async fn create_folder_retry_after_landed_write_conflicts() {
    let h = Harness::new(BlobKeying::ById).await;
    h.faults.inject(Call::Create, 1, Fault::LandThenFail);

    assert!(matches!(h.kb.create_folder(&h.ctx, "cases").await, Err(Error::Unavailable(_))));
    assert!(matches!(h.kb.create_folder(&h.ctx, "cases").await, Err(Error::Conflict(_))));
    assert_eq!(h.paths().await, ["cases"]);
}

#[tokio::test]
async fn create_folder_retry_after_lost_write_succeeds() {
    let h = Harness::new(BlobKeying::ById).await;
    h.faults.inject(Call::Create, 1, Fault::Fail);

    assert!(matches!(h.kb.create_folder(&h.ctx, "cases").await, Err(Error::Unavailable(_))));
    assert!(h.paths().await.is_empty());
    h.kb.create_folder(&h.ctx, "cases").await.unwrap();
    assert_eq!(h.paths().await, ["cases"]);
}

#[tokio::test]
async fn failed_record_write_discards_fresh_blob() {
    let h = Harness::new(BlobKeying::ById).await;
    h.faults.inject(Call::Create, 1, Fault::Fail);

    let result = h.kb.create_document(&h.ctx, "memo.txt", b"draft".to_vec(), "text/plain").await;
    assert!(matches!(result, Err(Error::Unavailable(_))));
    assert!(h.blobs.is_empty().await);
    assert!(h.paths().await.is_empty());
}

#[tokio::test]
async fn landed_record_keeps_its_blob() {
    let h = Harness::new(BlobKeying::ById).await;
    h.faults.inject(Call::Create, 1, Fault::LandThenFail);

    let result = h.kb.create_document(&h.ctx, "memo.txt", b"draft".to_vec(), "text/plain").await;
    assert!(matches!(result, Err(Error::Unavailable(_))));
    let (_, bytes) = h.kb.read_document(&h.ctx, "memo.txt").await.unwrap();
    assert_eq!(bytes, b"draft");

    let retry = h.kb.create_document(&h.ctx, "memo.txt", b"draft".to_vec(), "text/plain").await;
    assert!(matches!(retry, Err(Error::Conflict(_))));
    assert_eq!(h.blobs.len().await, 1);
}

#[tokio::test]
async fn orphan_cleanup_failure_is_not_the_reported_error() {
    let h = Harness::new(BlobKeying::ById).await;
    h.faults.inject(Call::Create, 1, Fault::Fail);
    h.faults.inject(Call::BlobDelete, 1, Fault::Fail);

    let result = h.kb.create_document(&h.ctx, "memo.txt", b"draft".to_vec(), "text/plain").await;
    assert!(matches!(result, Err(Error::Unavailable(msg)) if msg.contains("Create")));
    // The orphan stays behind as garbage; no record points at it.
    assert_eq!(h.blobs.len().await, 1);
    assert!(h.paths().await.is_empty());
}

#[tokio::test]
async fn rename_folder_preserves_identity_and_children() {
    let h = Harness::new(BlobKeying::ById).await;
    let intake = h.doc("clients/smith/intake.txt").await;
    let call = h.doc("clients/smith/notes/call.txt").await;
    h.kb.set_tags(&h.ctx, "clients/smith/intake.txt", ["divorce", " custody "]).await.unwrap();
    let folder = h.kb.get(&h.ctx, "clients/smith").await.unwrap();
    let children_before = h.kb.list(&h.ctx, "clients/smith", false).await.unwrap().len();
    let keys_before = h.blobs.keys().await;

    let moved = h.kb.rename_or_move(&h.ctx, "clients/smith", "clients/smith-jones").await.unwrap();
    assert_eq!(moved.id(), folder.id());
    assert_eq!(moved.path().to_string(), "clients/smith-jones");

    let renamed = h.kb.get_document(&h.ctx, "clients/smith-jones/intake.txt").await.unwrap();
    assert_eq!(renamed.id, intake.id);
    assert_eq!(renamed.checksum, intake.checksum);
    assert!(renamed.has_tag("CUSTODY"));
    let nested = h.kb.get(&h.ctx, "clients/smith-jones/notes/call.txt").await.unwrap();
    assert_eq!(nested.id(), call.id);
    assert_eq!(h.kb.list(&h.ctx, "clients/smith-jones", false).await.unwrap().len(), children_before);

    assert!(matches!(h.kb.get(&h.ctx, "clients/smith").await, Err(Error::NotFound(_))));
    assert_eq!(
        h.paths().await,
        [
            "clients",
            "clients/smith-jones",
            "clients/smith-jones/intake.txt",
            "clients/smith-jones/notes",
            "clients/smith-jones/notes/call.txt",
        ]
    );
    // Id-keyed blobs are never touched by a rename.
    assert_eq!(h.blobs.keys().await, keys_before);
    assert_eq!(h.faults.calls(Call::Copy), 0);
}

#[tokio::test]
async fn rename_into_itself_is_rejected_without_changes() {
    let h = Harness::new(BlobKeying::ById).await;
    h.doc("a/b/memo.txt").await;
    let before = h.paths().await;

    for target in ["a", "a/b", "a/b/c"] {
        let result = h.kb.rename_or_move(&h.ctx, "a", target).await;
        assert!(matches!(result, Err(Error::InvalidPath(_))), "target {}", target);
    }
    assert_eq!(h.paths().await, before);
}

#[tokio::test]
async fn rename_checks_destination() {
    let h = Harness::new(BlobKeying::ById).await;
    h.doc("a/memo.txt").await;
    h.doc("b/memo.txt").await;

    assert!(matches!(h.kb.rename_or_move(&h.ctx, "a", "b").await, Err(Error::Conflict(_))));
    assert!(matches!(h.kb.rename_or_move(&h.ctx, "a/memo.txt", "b/memo.txt").await, Err(Error::Conflict(_))));
    assert!(matches!(h.kb.rename_or_move(&h.ctx, "a", "missing/a").await, Err(Error::NotFound(_))));
    assert!(matches!(h.kb.rename_or_move(&h.ctx, "nothing", "c").await, Err(Error::NotFound(_))));
    assert!(matches!(
        h.kb.rename_or_move(&h.ctx, "a", "b/memo.txt/a").await,
        Err(Error::NotFound(_))
    ));

    let moved = h.kb.rename_or_move(&h.ctx, "a/memo.txt", "b/memo-2.txt").await.unwrap();
    assert_eq!(moved.path().to_string(), "b/memo-2.txt");
    // The source is gone, so repeating the same move by path reports it missing.
    let again = h.kb.rename_or_move(&h.ctx, "a/memo.txt", "b/memo-2.txt").await;
    assert!(matches!(again, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn missing_source_never_resolves_to_an_unrelated_entry() {
    let h = Harness::new(BlobKeying::ById).await;
    let unrelated = h.doc("b.txt").await;

    let result = h.kb.rename_or_move(&h.ctx, "never-existed.txt", "b.txt").await;
    assert!(matches!(result, Err(Error::NotFound(_))), "got {:?}", result);
    assert_eq!(h.paths().await, ["b.txt"]);
    assert_eq!(h.kb.get(&h.ctx, "b.txt").await.unwrap().id(), unrelated.id);
}

#[tokio::test]
async fn move_by_id_retries_are_idempotent() {
    let h = Harness::new(BlobKeying::ById).await;
    let memo = h.doc("a/memo.txt").await;
    let other = h.doc("b/other.txt").await;

    let moved = h.kb.move_by_id(&h.ctx, memo.id, "a/renamed.txt").await.unwrap();
    assert_eq!(moved.path().to_string(), "a/renamed.txt");
    let again = h.kb.move_by_id(&h.ctx, memo.id, "/a/renamed.txt/").await.unwrap();
    assert_eq!(again.id(), memo.id);
    assert_eq!(h.paths().await, ["a", "a/renamed.txt", "b", "b/other.txt"]);

    // Another entry sitting at the destination is a conflict, not a completed move.
    let result = h.kb.move_by_id(&h.ctx, other.id, "a/renamed.txt").await;
    assert!(matches!(result, Err(Error::Conflict(_))));
    let result = h.kb.move_by_id(&h.ctx, uuid::Uuid::new_v4(), "c.txt").await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn path_keyed_folder_move_copies_then_deletes_blobs() {
    let h = Harness::new(BlobKeying::ByPath).await;
    h.doc("estates/doe/will.txt").await;
    h.doc("estates/doe/codicil.txt").await;
    let ws = h.workspace.id;

    h.kb.rename_or_move(&h.ctx, "estates/doe", "estates/doe-trust").await.unwrap();

    assert_eq!(
        h.blobs.keys().await,
        [
            BlobKey::new(format!("{}/estates/doe-trust/codicil.txt", ws)),
            BlobKey::new(format!("{}/estates/doe-trust/will.txt", ws)),
        ]
    );
    let (doc, bytes) = h.kb.read_document(&h.ctx, "estates/doe-trust/will.txt").await.unwrap();
    assert_eq!(bytes, b"estates/doe/will.txt");
    assert_eq!(doc.blob_key, BlobKey::new(format!("{}/estates/doe-trust/will.txt", ws)));
    assert_eq!(h.faults.calls(Call::Copy), 2);
}

#[tokio::test]
async fn path_keyed_document_move() {
    let h = Harness::new(BlobKeying::ByPath).await;
    h.doc("inbox/letter.txt").await;
    h.kb.create_folder(&h.ctx, "filed").await.unwrap();

    let moved = h.kb.rename_or_move(&h.ctx, "inbox/letter.txt", "filed/letter.txt").await.unwrap();
    let Entry::Document(doc) = moved else { panic!("expected a document") };
    assert_eq!(h.blobs.keys().await, [doc.blob_key.clone()]);
    assert_eq!(h.blobs.get(&doc.blob_key).await.unwrap(), b"inbox/letter.txt");
}

#[tokio::test]
async fn failed_document_move_removes_the_copy() {
    let h = Harness::new(BlobKeying::ByPath).await;
    let doc = h.doc("letter.txt").await;
    h.faults.inject(Call::Update, 1, Fault::Fail);

    let result = h.kb.rename_or_move(&h.ctx, "letter.txt", "reply.txt").await;
    assert!(matches!(result, Err(Error::Unavailable(_))));
    assert_eq!(h.blobs.keys().await, [doc.blob_key.clone()]);
    assert_eq!(h.paths().await, ["letter.txt"]);
}

#[tokio::test]
async fn partial_folder_move_resumes_on_retry() {
    let h = Harness::new(BlobKeying::ById).await;
    let first = h.doc("a/1.txt").await;
    h.doc("a/2.txt").await;
    let deep = h.doc("a/sub/3.txt").await;
    // Leaf-to-root order: a/sub/3.txt, a/1.txt, a/2.txt, a/sub, a.
    h.faults.inject(Call::Update, 2, Fault::Fail);

    let err = h.kb.rename_or_move(&h.ctx, "a", "b").await.unwrap_err();
    let Error::PartialFailure(progress) = &err else { panic!("expected partial failure, got {:?}", err) };
    assert_eq!(progress.processed_paths().len(), 1);
    assert_eq!(progress.processed_paths()[0].to_string(), "a/sub/3.txt");
    assert_eq!(progress.stopped_at.as_ref().map(ToString::to_string).as_deref(), Some("a/1.txt"));
    assert!(err.is_retryable());

    // Nothing is lost in the intermediate state.
    assert_eq!(h.kb.get(&h.ctx, "b/sub/3.txt").await.unwrap().id(), deep.id);
    assert_eq!(h.kb.get(&h.ctx, "a/1.txt").await.unwrap().id(), first.id);

    h.kb.rename_or_move(&h.ctx, "a", "b").await.unwrap();
    assert_eq!(h.paths().await, ["b", "b/1.txt", "b/2.txt", "b/sub", "b/sub/3.txt"]);
    assert_eq!(h.kb.get(&h.ctx, "b/1.txt").await.unwrap().id(), first.id);
}

#[tokio::test]
async fn partial_path_keyed_move_leaves_no_dangling_records() {
    let h = Harness::new(BlobKeying::ByPath).await;
    h.doc("a/1.txt").await;
    h.doc("a/2.txt").await;
    h.faults.inject(Call::Update, 2, Fault::Fail);

    let err = h.kb.rename_or_move(&h.ctx, "a", "b").await.unwrap_err();
    assert!(matches!(err, Error::PartialFailure(_)));
    for path in ["b/1.txt", "a/2.txt"] {
        h.kb.verify_document(&h.ctx, path).await.unwrap();
    }

    h.kb.rename_or_move(&h.ctx, "a", "b").await.unwrap();
    let ws = h.workspace.id;
    assert_eq!(
        h.blobs.keys().await,
        [BlobKey::new(format!("{}/b/1.txt", ws)), BlobKey::new(format!("{}/b/2.txt", ws))]
    );
}

#[tokio::test]
async fn landed_folder_update_counts_as_moved() {
    let h = Harness::new(BlobKeying::ByPath).await;
    h.doc("a/1.txt").await;
    // The reply to the first record update is lost after the write landed.
    h.faults.inject(Call::Update, 1, Fault::LandThenFail);

    h.kb.rename_or_move(&h.ctx, "a", "b").await.unwrap();

    assert_eq!(h.paths().await, ["b", "b/1.txt"]);
    let ws = h.workspace.id;
    assert_eq!(h.blobs.keys().await, [BlobKey::new(format!("{}/b/1.txt", ws))]);
    let (doc, bytes) = h.kb.read_document(&h.ctx, "b/1.txt").await.unwrap();
    assert_eq!(doc.blob_key, BlobKey::new(format!("{}/b/1.txt", ws)));
    assert_eq!(bytes, b"a/1.txt");
}

#[tokio::test]
async fn unsettled_folder_update_never_reports_a_live_blob_as_orphaned() {
    let h = Harness::new(BlobKeying::ByPath).await;
    h.doc("a/1.txt").await;
    h.doc("a/2.txt").await;
    // The first update lands but its reply is lost, and the re-read fails too.
    h.faults.inject(Call::Update, 1, Fault::LandThenFail);
    h.faults.inject(Call::GetById, 1, Fault::Fail);

    let err = h.kb.rename_or_move(&h.ctx, "a", "b").await.unwrap_err();
    let Error::PartialFailure(progress) = &err else { panic!("expected partial failure, got {:?}", err) };
    let ws = h.workspace.id;
    let live = BlobKey::new(format!("{}/b/1.txt", ws));
    assert_eq!(progress.orphaned_blobs, [BlobKey::new(format!("{}/b/2.txt", ws))]);

    let moved = h.kb.verify_document(&h.ctx, "b/1.txt").await.unwrap();
    assert_eq!(moved.blob_key, live);
    h.kb.verify_document(&h.ctx, "a/2.txt").await.unwrap();

    h.kb.rename_or_move(&h.ctx, "a", "b").await.unwrap();
    assert_eq!(h.paths().await, ["b", "b/1.txt", "b/2.txt"]);
    for path in ["b/1.txt", "b/2.txt"] {
        h.kb.verify_document(&h.ctx, path).await.unwrap();
    }
}

#[tokio::test]
async fn cancellation_stops_between_descendants() {
    let h = Harness::new(BlobKeying::ById).await;
    h.doc("a/1.txt").await;
    h.doc("a/2.txt").await;
    let token = CancellationToken::new();
    let ctx = OpContext::new(Duration::from_secs(5)).with_cancellation(token.clone());
    // Cancelled while the first record update is in flight; that update still completes.
    h.faults.inject(Call::Update, 1, Fault::Cancel(token));

    let err = h.kb.rename_or_move(&ctx, "a", "b").await.unwrap_err();
    let Error::Cancelled(progress) = &err else { panic!("expected cancellation, got {:?}", err) };
    assert_eq!(progress.processed_paths().len(), 1);
    assert_eq!(h.paths().await, ["a", "a/2.txt", "b/1.txt"]);

    h.kb.rename_or_move(&h.ctx, "a", "b").await.unwrap();
    assert_eq!(h.paths().await, ["b", "b/1.txt", "b/2.txt"]);
}

#[tokio::test]
async fn recursive_delete_removes_subtree() {
    let h = Harness::new(BlobKeying::ById).await;
    h.doc("matters/2024/smith/intake.txt").await;
    h.doc("matters/2024/smith/notes.txt").await;
    h.doc("matters/2024/jones.txt").await;
    h.doc("other/keep.txt").await;

    assert!(matches!(h.kb.delete(&h.ctx, "matters", false).await, Err(Error::NotEmpty(_))));

    let summary = h.kb.delete(&h.ctx, "matters", true).await.unwrap();
    assert_eq!(summary, DeleteSummary { folders: 3, documents: 3, blobs: 3 });
    assert_eq!(summary.total(), 6);
    assert_eq!(h.paths().await, ["other", "other/keep.txt"]);
    assert_eq!(h.blobs.len().await, 1);
    assert!(h.kb.list(&h.ctx, "", true).await.unwrap().iter().all(|e| !e.path().to_string().starts_with("matters")));
}

#[tokio::test]
async fn deleting_empty_folder_and_single_document() {
    let h = Harness::new(BlobKeying::ById).await;
    h.kb.create_folder(&h.ctx, "empty").await.unwrap();
    h.doc("memo.txt").await;

    let summary = h.kb.delete(&h.ctx, "empty", false).await.unwrap();
    assert_eq!(summary, DeleteSummary { folders: 1, documents: 0, blobs: 0 });
    let summary = h.kb.delete(&h.ctx, "memo.txt", false).await.unwrap();
    assert_eq!(summary, DeleteSummary { folders: 0, documents: 1, blobs: 1 });
    assert!(h.paths().await.is_empty());
    assert!(h.blobs.is_empty().await);
    assert!(matches!(h.kb.delete(&h.ctx, "memo.txt", false).await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn delete_tolerates_missing_blob() {
    let h = Harness::new(BlobKeying::ById).await;
    let doc = h.doc("memo.txt").await;
    h.blobs.delete(&doc.blob_key).await.unwrap();

    let summary = h.kb.delete(&h.ctx, "memo.txt", false).await.unwrap();
    assert_eq!(summary, DeleteSummary { folders: 0, documents: 1, blobs: 0 });
}

#[tokio::test]
async fn delete_that_loses_its_record_write_reports_progress() {
    let h = Harness::new(BlobKeying::ById).await;
    let doc = h.doc("memo.txt").await;
    h.faults.inject(Call::Delete, 1, Fault::Fail);

    let err = h.kb.delete(&h.ctx, "memo.txt", false).await.unwrap_err();
    let progress = err.progress().expect("progress report");
    assert_eq!(progress.completed, vec![Step::BlobDeleted { key: doc.blob_key.clone() }]);

    // The record is now corrupt until the retry removes it.
    assert!(matches!(h.kb.read_document(&h.ctx, "memo.txt").await, Err(Error::Corrupt { .. })));
    h.kb.delete(&h.ctx, "memo.txt", false).await.unwrap();
    assert!(h.paths().await.is_empty());
}

#[tokio::test]
async fn missing_blob_is_reported_as_corruption() {
    for keying in [BlobKeying::ById, BlobKeying::ByPath] {
        let h = Harness::new(keying).await;
        let memo = h.doc("a/memo.txt").await;
        let notes = h.doc("a/notes.txt").await;
        h.blobs.delete(&notes.blob_key).await.unwrap();

        assert!(matches!(h.kb.read_document(&h.ctx, "a/notes.txt").await, Err(Error::Corrupt { .. })));
        assert!(matches!(h.kb.verify_document(&h.ctx, "a/notes.txt").await, Err(Error::Corrupt { .. })));
        match h.kb.rename_or_move(&h.ctx, "a", "b").await {
            Err(Error::Corrupt { path, key }) => {
                assert_eq!(path.to_string(), "a/notes.txt");
                assert_eq!(key, notes.blob_key);
            }
            other => panic!("expected corruption under {:?}, got {:?}", keying, other),
        }
        match h.kb.rename_or_move(&h.ctx, "a/notes.txt", "a/renamed.txt").await {
            Err(Error::Corrupt { path, .. }) => assert_eq!(path.to_string(), "a/notes.txt"),
            other => panic!("expected corruption under {:?}, got {:?}", keying, other),
        }

        // Nothing moved, and copies made before the missing blob was found are gone.
        assert_eq!(h.paths().await, ["a", "a/memo.txt", "a/notes.txt"]);
        assert_eq!(h.blobs.keys().await, [memo.blob_key.clone()]);
    }
}

#[tokio::test]
async fn find_matches_file_names() {
    let h = Harness::new(BlobKeying::ById).await;
    h.doc("cases/Smith-Custody.txt").await;
    h.doc("cases/smith-notes.txt").await;
    h.doc("cases/jones/SMITH.pdf").await;
    h.doc("other/smith.txt").await;
    h.kb.create_folder(&h.ctx, "cases/smith-archive").await.unwrap();

    let found = |documents: Vec<casebase_core::storage::DocumentRecord>| {
        let mut paths: Vec<String> = documents.iter().map(|d| d.path.to_string()).collect();
        paths.sort();
        paths
    };

    let any_case = h.kb.find(&h.ctx, "cases", "smith", false).await.unwrap();
    assert_eq!(found(any_case), ["cases/Smith-Custody.txt", "cases/jones/SMITH.pdf", "cases/smith-notes.txt"]);
    let exact = h.kb.find(&h.ctx, "cases", "Smith", true).await.unwrap();
    assert_eq!(found(exact), ["cases/Smith-Custody.txt"]);
    let everywhere = h.kb.find(&h.ctx, "/", " SMITH ", true).await.unwrap();
    assert_eq!(found(everywhere), ["cases/jones/SMITH.pdf"]);
    assert_eq!(h.kb.find(&h.ctx, "", "smith", false).await.unwrap().len(), 4);

    assert!(matches!(h.kb.find(&h.ctx, "cases", "  ", false).await, Err(Error::InvalidInput(_))));
    assert!(matches!(h.kb.find(&h.ctx, "missing", "smith", false).await, Err(Error::NotFound(_))));
}

#[tokio::test(start_paused = true)]
async fn hung_backend_call_times_out_as_unavailable() {
    let h = Harness::new(BlobKeying::ById).await;
    let ctx = OpContext::new(Duration::from_millis(50));
    h.faults.inject(Call::GetByPath, 1, Fault::Hang);

    match h.kb.create_folder(&ctx, "slow").await {
        Err(Error::Unavailable(msg)) => assert!(msg.contains("timed out")),
        other => panic!("expected timeout, got {:?}", other),
    }
    h.kb.create_folder(&ctx, "slow").await.unwrap();
}

#[tokio::test]
async fn listing_is_ordered_and_validated() {
    let h = Harness::new(BlobKeying::ById).await;
    h.doc("b/2.txt").await;
    h.doc("b/1.txt").await;
    h.doc("a.txt").await;

    let top: Vec<String> = h.kb.list(&h.ctx, "/", false).await.unwrap().iter().map(|e| e.path().to_string()).collect();
    assert_eq!(top, ["a.txt", "b"]);
    let all: Vec<String> = h.kb.list(&h.ctx, "", true).await.unwrap().iter().map(|e| e.path().to_string()).collect();
    assert_eq!(all, ["a.txt", "b", "b/1.txt", "b/2.txt"]);

    assert!(matches!(h.kb.list(&h.ctx, "a.txt", false).await, Err(Error::InvalidPath(_))));
    assert!(matches!(h.kb.list(&h.ctx, "c", false).await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn tags_and_categories_update_the_record() {
    let h = Harness::new(BlobKeying::ById).await;
    let doc = h.doc("memo.txt").await;
    let category = h.catalog.create_category(&h.ctx, h.workspace.id, "Custody").await.unwrap();

    let tagged = h.kb.set_tags(&h.ctx, "memo.txt", ["urgent", "", "  "]).await.unwrap();
    assert_eq!(tagged.tags.len(), 1);
    assert!(tagged.modified_at >= doc.modified_at);

    let filed = h.kb.set_category(&h.ctx, "memo.txt", Some(category.id)).await.unwrap();
    assert_eq!(filed.category_id, Some(category.id));
    let missing = h.kb.set_category(&h.ctx, "memo.txt", Some(uuid::Uuid::new_v4())).await;
    assert!(matches!(missing, Err(Error::NotFound(_))));

    let stored = h.metadata.get_by_id(h.workspace.id, doc.id).await.unwrap();
    assert_eq!(stored.as_document().and_then(|d| d.category_id), Some(category.id));
}

#[tokio::test]
async fn tags_differing_in_case_collapse() {
    let h = Harness::new(BlobKeying::ById).await;
    h.doc("memo.txt").await;

    let tagged = h.kb.set_tags(&h.ctx, "memo.txt", ["Divorce", "divorce", " DIVORCE "]).await.unwrap();
    assert_eq!(tagged.tags.iter().collect::<Vec<_>>(), ["divorce"]);
    assert!(tagged.has_tag("DiVoRcE"));

    let tagged = h.kb.set_tags(&h.ctx, "memo.txt", ["Ärztlich", "ärztlich"]).await.unwrap();
    assert_eq!(tagged.tags.len(), 1);
    assert!(tagged.has_tag("ÄRZTLICH"));
    assert!(!tagged.has_tag("divorce"));
    assert!(!tagged.has_tag("  "));
}
