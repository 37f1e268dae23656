//! End-to-end sync scenarios against recording fakes and a temporary vault.

mod common;

use common::{drain, Harness, HTML_FOLDER, PARENT_PAGE, ROUTE};
use core_document::{Block, MediaKind};
use core_runtime::config::{HtmlUpdateStrategy, RouteConfig, SyncSettings};
use core_runtime::events::{CoreEvent, SyncEvent};
use core_sync::{
    content_hash, hash_bytes, Direction, RemoteOperation, SyncError, SyncRecordRepository,
    SyncRequest, SyncWarning,
};
use std::path::Path;
use tempfile::TempDir;

const DAILY: &str = "# Daily\n\nHello world.\n\n![[cat.png]]\n";

fn media_refs(blocks: &[Block]) -> Vec<String> {
    blocks
        .iter()
        .filter_map(Block::as_media)
        .map(|m| m.reference().to_string())
        .collect()
}

// ============================================================================
// Forward
// ============================================================================

#[tokio::test]
async fn test_first_forward_sync_creates_both_destinations() {
    let h = Harness::new().await;
    h.write("_media/cat.png", b"png");
    let doc = h.write("daily.md", DAILY.as_bytes());

    let outcome = h
        .orchestrator
        .sync(&doc, ROUTE, Direction::Forward)
        .await
        .unwrap();

    assert!(outcome.created);
    assert_eq!(outcome.relative_path, "daily.md");
    assert_eq!(outcome.structured_id, "page-1");
    assert_eq!(outcome.html_id, "doc-1");
    assert_eq!(outcome.media_uploaded, 2);
    assert_eq!(outcome.media_reused, 0);
    assert!(outcome.warnings.is_empty());

    assert_eq!(h.structured.calls("create_page"), 1);
    assert_eq!(h.structured.calls("upload_media"), 1);
    // Blobs need an existing document: one create, then a content replace.
    assert_eq!(h.html.calls("create_document"), 1);
    assert_eq!(h.html.calls("upload_blob"), 1);
    assert_eq!(h.html.calls("replace_document"), 1);

    let page = h.structured.page("page-1").unwrap();
    assert_eq!(
        media_refs(&page),
        vec!["https://files.example/upload/1/cat.png".to_string()]
    );

    let html = h.html.html("doc-1").unwrap();
    assert!(html.contains("<h1>Daily</h1>"));
    assert!(html.contains("src=\"blob-1\""));
    assert!(!html.contains("files.example"));

    let record = h
        .repository
        .find(ROUTE, "daily.md")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.structured_id, "page-1");
    assert_eq!(record.html_id, "doc-1");
    assert_eq!(record.content_hash, content_hash(DAILY));
    assert_eq!(record.last_direction, Direction::Forward);
    assert_eq!(record.last_synced_at, common::fixed_clock().0);
    let media = &record.media["_media/cat.png"];
    assert_eq!(media.blob_id, "blob-1");
    assert_eq!(media.html_doc_id, "doc-1");
    assert_eq!(media.content_hash, hash_bytes(b"png"));
    assert_eq!(media.size, 3);

    // New destinations land in the route's configured parent and folder.
    let parents = h.structured.state.lock().unwrap().parents.clone();
    assert_eq!(parents["page-1"].as_deref(), Some(PARENT_PAGE));
    let folders = h.html.state.lock().unwrap().folders.clone();
    assert_eq!(folders["doc-1"].as_deref(), Some(HTML_FOLDER));
}

#[tokio::test]
async fn test_sibling_media_and_several_paragraphs_reach_both_stores() {
    let h = Harness::new().await;
    h.write("journal/cat.png", b"sibling cat");
    let source = "# Daily

First paragraph.

Second paragraph with *emphasis*.

\
                  ![[cat.png]]

![photo](cat.png)

Closing words.
";
    let doc = h.write("journal/daily.md", source.as_bytes());

    let outcome = h
        .orchestrator
        .sync(&doc, ROUTE, Direction::Forward)
        .await
        .unwrap();

    assert!(outcome.warnings.is_empty());
    // Both notations name the same file: one structured upload, one blob.
    assert_eq!(h.structured.calls("upload_media"), 1);
    assert_eq!(h.html.calls("upload_blob"), 1);
    assert_eq!(outcome.media_uploaded, 2);

    let page = h.structured.page("page-1").unwrap();
    assert_eq!(
        media_refs(&page),
        vec![
            "https://files.example/upload/1/cat.png".to_string(),
            "https://files.example/upload/1/cat.png".to_string(),
        ]
    );
    let paragraphs: Vec<String> = page
        .iter()
        .filter(|b| b.kind_name() == "paragraph")
        .map(Block::plain_text)
        .collect();
    assert_eq!(
        paragraphs,
        vec![
            "First paragraph.",
            "Second paragraph with emphasis.",
            "Closing words.",
        ]
    );

    let html = h.html.html("doc-1").unwrap();
    assert!(html.contains("<p>First paragraph.</p>"));
    assert!(html.contains("<i>emphasis</i>"));
    assert!(html.contains("<p>Closing words.</p>"));
    assert_eq!(html.matches("src=\"blob-1\"").count(), 2);

    let record = h.repository.find(ROUTE, "journal/daily.md").await.unwrap().unwrap();
    assert_eq!(record.media.len(), 1);
    assert_eq!(record.media["journal/cat.png"].content_hash, hash_bytes(b"sibling cat"));
}

#[tokio::test]
async fn test_unchanged_rerun_updates_in_place_without_new_blobs() {
    let h = Harness::new().await;
    h.write("_media/cat.png", b"png");
    let doc = h.write("daily.md", DAILY.as_bytes());
    let first = h
        .orchestrator
        .sync(&doc, ROUTE, Direction::Forward)
        .await
        .unwrap();

    let second = h
        .orchestrator
        .sync(&doc, ROUTE, Direction::Forward)
        .await
        .unwrap();

    assert!(!second.created);
    assert_eq!(second.structured_id, first.structured_id);
    assert_eq!(second.html_id, first.html_id);
    assert_eq!(second.content_hash, first.content_hash);
    assert_eq!(second.media_reused, 1);
    assert_eq!(h.structured.calls("create_page"), 1);
    assert_eq!(h.structured.calls("replace_page_content"), 1);
    assert_eq!(h.html.calls("create_document"), 1);
    assert_eq!(h.html.calls("upload_blob"), 1);

    let record = h.repository.find(ROUTE, "daily.md").await.unwrap().unwrap();
    assert_eq!(record.content_hash, content_hash(DAILY));
    assert_eq!(record.media["_media/cat.png"].blob_id, "blob-1");
}

#[tokio::test]
async fn test_forward_without_media_creates_document_directly() {
    let h = Harness::new().await;
    let doc = h.write("plain.md", b"# Plain\n\nJust text.\n");

    h.orchestrator
        .sync(&doc, ROUTE, Direction::Forward)
        .await
        .unwrap();

    assert_eq!(h.html.calls("create_document"), 1);
    assert_eq!(h.html.calls("replace_document"), 0);
    assert!(h.html.html("doc-1").unwrap().contains("<p>Just text.</p>"));
}

#[tokio::test]
async fn test_second_forward_sync_updates_and_reuses_blobs() {
    let h = Harness::new().await;
    h.write("_media/cat.png", b"png");
    let doc = h.write("daily.md", DAILY.as_bytes());
    h.orchestrator
        .sync(&doc, ROUTE, Direction::Forward)
        .await
        .unwrap();

    let edited = "# Daily\n\nHello again.\n\n![[cat.png]]\n";
    h.write("daily.md", edited.as_bytes());
    let outcome = h
        .orchestrator
        .sync(&doc, ROUTE, Direction::Forward)
        .await
        .unwrap();

    assert!(!outcome.created);
    assert_eq!(outcome.html_id, "doc-1");
    assert_eq!(outcome.media_reused, 1);
    assert_eq!(h.structured.calls("create_page"), 1);
    assert_eq!(h.structured.calls("replace_page_content"), 1);
    // Hosted addresses expire, so structured uploads are never cached.
    assert_eq!(h.structured.calls("upload_media"), 2);
    assert_eq!(h.html.calls("create_document"), 1);
    assert_eq!(h.html.calls("upload_blob"), 1);

    let html = h.html.html("doc-1").unwrap();
    assert!(html.contains("Hello again."));
    assert!(html.contains("src=\"blob-1\""));

    let record = h.repository.find(ROUTE, "daily.md").await.unwrap().unwrap();
    assert_eq!(record.content_hash, content_hash(edited));
}

#[tokio::test]
async fn test_changed_media_file_is_uploaded_again() {
    let h = Harness::new().await;
    h.write("_media/cat.png", b"png");
    let doc = h.write("daily.md", DAILY.as_bytes());
    h.orchestrator
        .sync(&doc, ROUTE, Direction::Forward)
        .await
        .unwrap();

    h.write("_media/cat.png", b"a different cat");
    let outcome = h
        .orchestrator
        .sync(&doc, ROUTE, Direction::Forward)
        .await
        .unwrap();

    assert_eq!(outcome.media_reused, 0);
    assert_eq!(h.html.calls("upload_blob"), 2);
    assert!(h.html.html("doc-1").unwrap().contains("src=\"blob-2\""));
}

#[tokio::test]
async fn test_unresolved_and_url_media_are_left_as_written() {
    let h = Harness::new().await;
    let doc = h.write(
        "links.md",
        b"# Links\n\n![[missing.png]]\n\n![remote](https://cdn.example/x.png)\n",
    );

    let outcome = h
        .orchestrator
        .sync(&doc, ROUTE, Direction::Forward)
        .await
        .unwrap();

    assert_eq!(
        outcome.warnings,
        vec![SyncWarning::UnresolvedMedia {
            reference: "![[missing.png]]".to_string()
        }]
    );
    assert_eq!(outcome.media_uploaded, 0);
    assert_eq!(h.structured.calls("upload_media"), 0);
    assert_eq!(h.html.calls("upload_blob"), 0);

    let html = h.html.html("doc-1").unwrap();
    assert!(html.contains("src=\"missing.png\""));
    assert!(html.contains("src=\"https://cdn.example/x.png\""));
}

#[tokio::test]
async fn test_media_inside_code_fence_is_not_uploaded() {
    let h = Harness::new().await;
    h.write("_media/cat.png", b"png");
    let doc = h.write("code.md", b"# Code\n\n```\n![[cat.png]]\n```\n");

    let outcome = h
        .orchestrator
        .sync(&doc, ROUTE, Direction::Forward)
        .await
        .unwrap();

    assert_eq!(outcome.media_uploaded, 0);
    assert!(outcome.warnings.is_empty());
}

#[tokio::test]
async fn test_media_inside_inline_code_is_not_uploaded() {
    let h = Harness::new().await;
    h.write("_media/cat.png", b"png");
    let doc = h.write("code.md", b"# Code\n\nWrite `![[cat.png]]` to embed.\n");

    let outcome = h
        .orchestrator
        .sync(&doc, ROUTE, Direction::Forward)
        .await
        .unwrap();

    assert_eq!(outcome.media_uploaded, 0);
    assert_eq!(h.structured.calls("upload_media"), 0);
    assert!(outcome.warnings.is_empty());
    assert!(media_refs(&h.structured.page("page-1").unwrap()).is_empty());
}

#[tokio::test]
async fn test_notations_resolve_the_same_target_independently() {
    let h = Harness::new().await;
    h.write("_media/a.png", b"png");
    let doc = h.write("notes/n.md", b"![[a.png]]\n\n![std](a.png)\n");

    let outcome = h
        .orchestrator
        .sync(&doc, ROUTE, Direction::Forward)
        .await
        .unwrap();

    // The embed finds the media folder; the standard path is note-relative.
    assert_eq!(
        outcome.warnings,
        vec![SyncWarning::UnresolvedMedia {
            reference: "![std](a.png)".to_string()
        }]
    );
    assert_eq!(h.structured.calls("upload_media"), 1);

    let page = h.structured.page("page-1").unwrap();
    assert_eq!(
        media_refs(&page),
        vec![
            "https://files.example/upload/1/a.png".to_string(),
            "a.png".to_string(),
        ]
    );
    let html = h.html.html("doc-1").unwrap();
    assert!(html.contains("src=\"blob-1\""));
    assert!(html.contains("src=\"a.png\""));
}

#[tokio::test]
async fn test_forward_emits_stage_and_completion_events() {
    let h = Harness::new().await;
    let mut receiver = h.events.subscribe();
    let doc = h.write("plain.md", b"# Plain\n");

    h.orchestrator
        .sync(&doc, ROUTE, Direction::Forward)
        .await
        .unwrap();

    let events = drain(&mut receiver);
    let stages: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            CoreEvent::Sync(SyncEvent::StageEntered { stage, .. }) => Some(stage.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(stages.first(), Some(&"read_source"));
    assert_eq!(stages.last(), Some(&"done"));
    assert_eq!(stages.len(), 11);
    assert!(matches!(
        events.last(),
        Some(CoreEvent::Sync(SyncEvent::Completed { created: true, .. }))
    ));
}

// ============================================================================
// Reverse
// ============================================================================

#[tokio::test]
async fn test_reverse_sync_writes_markdown_and_media() {
    let h = Harness::new().await;
    h.write("_media/cat.png", b"png");
    let doc = h.write("journal/daily.md", DAILY.as_bytes());
    h.orchestrator
        .sync(&doc, ROUTE, Direction::Forward)
        .await
        .unwrap();

    h.html.set_html(
        "doc-1",
        "<h1>Daily</h1><p>Edited remotely.</p>\
         <div data-section-style=\"11\"><img src=\"blob-7\" alt=\"\"></div>",
    );
    h.html.put_blob("doc-1", "blob-7", b"new image");

    let outcome = h
        .orchestrator
        .sync(&doc, ROUTE, Direction::Reverse)
        .await
        .unwrap();

    assert_eq!(outcome.direction, Direction::Reverse);
    assert!(!outcome.created);
    assert!(outcome.warnings.is_empty());
    assert_eq!(outcome.media_uploaded, 1);
    assert_eq!(h.structured.calls("replace_page_content"), 1);

    let written = h.read("journal/daily.md");
    assert!(written.contains("Edited remotely."));
    assert!(written.contains("_media/image_blob-7.png"));
    assert!(!written.contains("files.example"));
    assert_eq!(
        std::fs::read(h.vault.path().join("journal/_media/image_blob-7.png")).unwrap(),
        b"new image"
    );

    let page = h.structured.page("page-1").unwrap();
    assert_eq!(
        page.iter().filter_map(Block::as_media).next().map(|m| m.kind()),
        Some(MediaKind::Image)
    );

    let record = h.repository.find(ROUTE, "journal/daily.md").await.unwrap().unwrap();
    assert_eq!(record.last_direction, Direction::Reverse);
    assert_eq!(record.content_hash, content_hash(&written));
    assert_eq!(record.media["journal/_media/image_blob-7.png"].blob_id, "blob-7");

    // Staged downloads do not outlive the run.
    assert_eq!(std::fs::read_dir(h.staging.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_reverse_reports_missing_blobs() {
    let h = Harness::new().await;
    let doc = h.write("daily.md", b"# Daily\n");
    h.orchestrator
        .sync(&doc, ROUTE, Direction::Forward)
        .await
        .unwrap();
    h.html.set_html(
        "doc-1",
        "<h1>Daily</h1><div data-section-style=\"11\"><img src=\"blob-99\" alt=\"\"></div>",
    );

    let outcome = h
        .orchestrator
        .sync(&doc, ROUTE, Direction::Reverse)
        .await
        .unwrap();

    assert_eq!(
        outcome.warnings,
        vec![SyncWarning::MissingBlob {
            reference: "blob-99".to_string()
        }]
    );
    assert_eq!(h.structured.calls("upload_media"), 0);
    assert!(h.read("daily.md").contains("blob-99"));
}

#[tokio::test]
async fn test_reverse_before_forward_makes_no_remote_calls() {
    let h = Harness::new().await;
    let doc = h.write("daily.md", b"# Daily\n");

    let err = h
        .orchestrator
        .sync(&doc, ROUTE, Direction::Reverse)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SyncError::DocumentNotYetSynced { ref relative_path, .. } if relative_path == "daily.md"
    ));
    assert_eq!(h.html.calls("fetch_document"), 0);
    assert_eq!(h.structured.calls("replace_page_content"), 0);
}

// ============================================================================
// Recreation
// ============================================================================

#[tokio::test]
async fn test_recreate_strategy_replaces_document_and_moves_backlinks() {
    let h = Harness::with_strategy(HtmlUpdateStrategy::Recreate).await;
    h.write("_media/cat.png", b"png");
    let doc = h.write("daily.md", DAILY.as_bytes());
    h.orchestrator
        .sync(&doc, ROUTE, Direction::Forward)
        .await
        .unwrap();
    h.html.state.lock().unwrap().backlinks = vec!["doc-index".to_string()];
    let mut receiver = h.events.subscribe();

    let outcome = h
        .orchestrator
        .sync(&doc, ROUTE, Direction::Forward)
        .await
        .unwrap();

    assert_eq!(outcome.html_id, "doc-2");
    assert!(!outcome.created);
    // Blobs are attached per document, so the replacement gets a new one.
    assert_eq!(outcome.media_reused, 0);
    assert!(h.html.html("doc-2").unwrap().contains("src=\"blob-2\""));

    {
        let state = h.html.state.lock().unwrap();
        assert_eq!(state.deleted, vec!["doc-1".to_string()]);
        assert_eq!(
            state.rewritten,
            vec![(
                "doc-index".to_string(),
                "doc-1".to_string(),
                "doc-2".to_string()
            )]
        );
    }

    let record = h.repository.find(ROUTE, "daily.md").await.unwrap().unwrap();
    assert_eq!(record.html_id, "doc-2");
    assert!(!record.has_pending_recreation());

    assert!(drain(&mut receiver).iter().any(|e| matches!(
        e,
        CoreEvent::Sync(SyncEvent::RecreationPending { previous_id, replacement_id, .. })
            if previous_id == "doc-1" && replacement_id == "doc-2"
    )));
}

#[tokio::test]
async fn test_failed_delete_interrupts_recreation() {
    let h = Harness::with_strategy(HtmlUpdateStrategy::Recreate).await;
    let doc = h.write("plain.md", b"# Plain\n");
    h.orchestrator
        .sync(&doc, ROUTE, Direction::Forward)
        .await
        .unwrap();
    // Someone removed the document by hand, so the retire step cannot delete it.
    h.html.state.lock().unwrap().docs.remove("doc-1");

    let err = h
        .orchestrator
        .sync(&doc, ROUTE, Direction::Forward)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SyncError::RecreationInterrupted {
            operation: RemoteOperation::DeleteDocument,
            source: bridge_traits::BridgeError::NotFound(_),
            ..
        }
    ));
    assert!(err.to_string().contains("delete_document"));
}

#[tokio::test]
async fn test_interrupted_recreation_stays_visible_until_acknowledged() {
    let h = Harness::with_strategy(HtmlUpdateStrategy::Recreate).await;
    let doc = h.write("daily.md", b"# Daily\n\nBody.\n");
    h.orchestrator
        .sync(&doc, ROUTE, Direction::Forward)
        .await
        .unwrap();
    {
        let mut state = h.html.state.lock().unwrap();
        state.backlinks = vec!["doc-index".to_string()];
        state.fail_rewrite = true;
    }

    let err = h
        .orchestrator
        .sync(&doc, ROUTE, Direction::Forward)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SyncError::RecreationInterrupted {
            ref previous_id,
            ref replacement_id,
            operation: RemoteOperation::RewriteBacklinks,
            ..
        } if previous_id == "doc-1" && replacement_id == "doc-2"
    ));
    assert!(h.html.state.lock().unwrap().deleted.is_empty());

    let status = h.orchestrator.status(&doc).await.unwrap();
    assert_eq!(status.len(), 1);
    let record = status[0].record.as_ref().unwrap();
    assert_eq!(record.html_id, "doc-2");
    assert_eq!(record.pending_recreations.len(), 1);
    assert_eq!(record.pending_recreations[0].previous_id, "doc-1");

    // A later successful recreation carries the older marker forward.
    h.html.state.lock().unwrap().fail_rewrite = false;
    let outcome = h
        .orchestrator
        .sync(&doc, ROUTE, Direction::Forward)
        .await
        .unwrap();
    assert_eq!(outcome.html_id, "doc-3");
    assert!(outcome.warnings.contains(&SyncWarning::RecreationPending {
        previous_id: "doc-1".to_string(),
        replacement_id: "doc-2".to_string(),
    }));

    let cleared = h
        .orchestrator
        .acknowledge_recreation(&doc, ROUTE)
        .await
        .unwrap();
    assert_eq!(cleared.len(), 1);
    assert_eq!(cleared[0].replacement_id, "doc-2");

    let record = h.repository.find(ROUTE, "daily.md").await.unwrap().unwrap();
    assert!(!record.has_pending_recreation());
}

// ============================================================================
// Routes, status and batches
// ============================================================================

#[tokio::test]
async fn test_route_and_path_errors_precede_io() {
    let mut h = Harness::new().await;
    let doc = h.write("daily.md", b"# Daily\n");

    let err = h
        .orchestrator
        .sync(&doc, "unknown", Direction::Forward)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::RouteNotFound { ref route } if route == "unknown"));

    let outside = TempDir::new().unwrap();
    let stray = outside.path().join("stray.md");
    std::fs::write(&stray, "# Stray\n").unwrap();
    let err = h
        .orchestrator
        .sync(&stray, ROUTE, Direction::Forward)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::DocumentOutsideRoute { .. }));

    let archive = TempDir::new().unwrap();
    let stores = h.stores();
    h.orchestrator
        .register_route(
            RouteConfig::new("archive", archive.path()).with_enabled(false),
            stores,
        )
        .unwrap();
    let err = h
        .orchestrator
        .sync(Path::new("old.md"), "archive", Direction::Forward)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::RouteDisabled { .. }));

    let stores = h.stores();
    let err = h
        .orchestrator
        .register_route(RouteConfig::new(ROUTE, archive.path()), stores)
        .unwrap_err();
    assert!(matches!(err, SyncError::Config(_)));

    assert_eq!(h.structured.calls("create_page"), 0);
    assert_eq!(h.html.calls("create_document"), 0);
}

#[tokio::test]
async fn test_status_before_and_after_sync() {
    let h = Harness::new().await;
    let doc = h.write("notes/today.md", b"# Today\n");

    let status = h.orchestrator.status(&doc).await.unwrap();
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].route, ROUTE);
    assert_eq!(status[0].relative_path, "notes/today.md");
    assert!(status[0].record.is_none());

    h.orchestrator
        .sync(&doc, ROUTE, Direction::Forward)
        .await
        .unwrap();
    let status = h.orchestrator.status(&doc).await.unwrap();
    assert_eq!(status[0].record.as_ref().unwrap().html_id, "doc-1");

    let outside = TempDir::new().unwrap();
    assert!(h
        .orchestrator
        .status(&outside.path().join("x.md"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_batch_sync_reports_each_document() {
    let vault = TempDir::new().unwrap();
    let staging = TempDir::new().unwrap();
    let settings = SyncSettings::default()
        .with_max_concurrent_documents(2)
        .with_staging_dir(staging.path());
    let h = Harness::build(vault, staging, settings).await;

    let mut requests = Vec::new();
    for name in ["a.md", "b.md", "nested/c.md"] {
        let path = h.write(name, format!("# {}\n", name).as_bytes());
        requests.push(SyncRequest::new(path, ROUTE, Direction::Forward));
    }
    requests.push(SyncRequest::new(
        h.vault.path().join("a.md"),
        "elsewhere",
        Direction::Forward,
    ));

    let results = h.orchestrator.sync_batch(requests).await;

    assert_eq!(results.len(), 4);
    let succeeded = results.iter().filter(|(_, r)| r.is_ok()).count();
    assert_eq!(succeeded, 3);
    assert!(results.iter().any(|(request, result)| request.route == "elsewhere"
        && matches!(result, Err(SyncError::RouteNotFound { .. }))));
    assert_eq!(h.structured.calls("create_page"), 3);
    assert_eq!(h.repository.list_by_route(ROUTE).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_concurrent_syncs_of_one_document_are_serialized() {
    let h = Harness::new().await;
    let doc = h.write("daily.md", b"# Daily\n");

    let (first, second) = tokio::join!(
        h.orchestrator.sync(&doc, ROUTE, Direction::Forward),
        h.orchestrator.sync(&doc, ROUTE, Direction::Forward),
    );

    let created: Vec<bool> = vec![first.unwrap().created, second.unwrap().created];
    assert_eq!(created.iter().filter(|c| **c).count(), 1);
    assert_eq!(h.structured.calls("create_page"), 1);
    assert_eq!(h.html.calls("create_document"), 1);
}
