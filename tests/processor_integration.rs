//! Integration tests for the archival pipeline.
//!
//! These run the real prober and built-in tools against wiremock servers,
//! with in-memory (or on-disk) stores behind the storage layer.

use std::sync::Arc;
use std::time::Duration;

use link_archiver::notify::SentReply;
use link_archiver::{
    ArchiveStorage, ArchiverConfig, ContentProber, Database, FailureReason, LocalFileStore,
    MemoryFileStore, MemoryKvStore, MemoryNotifier, Message, Processor, ReuseKind, SkipReason,
    SqliteKvStore, ToolRegistry, ToolSettings, UrlOutcome,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    processor: Processor,
    storage: Arc<ArchiveStorage>,
    files: MemoryFileStore,
    notifier: MemoryNotifier,
}

fn harness_with(settings: ToolSettings) -> Harness {
    let files = MemoryFileStore::new();
    let storage = Arc::new(ArchiveStorage::new(
        Arc::new(MemoryKvStore::new()),
        Arc::new(files.clone()),
    ));
    let notifier = MemoryNotifier::new();
    let processor = Processor::new(
        Arc::new(ContentProber::new(Duration::from_secs(5)).unwrap()),
        Arc::new(ToolRegistry::with_default_tools(&settings).unwrap()),
        Arc::clone(&storage),
        Arc::new(notifier.clone()),
        4,
    );
    Harness {
        processor,
        storage,
        files,
        notifier,
    }
}

fn harness() -> Harness {
    harness_with(ToolSettings::default())
}

fn direct_download_config() -> ArchiverConfig {
    ArchiverConfig {
        default_archival_tool: "direct_download".to_string(),
        ..ArchiverConfig::default()
    }
}

fn head_ok(etag: Option<&str>) -> ResponseTemplate {
    let template = ResponseTemplate::new(200).insert_header("Content-Type", "application/pdf");
    match etag {
        Some(etag) => template.insert_header("ETag", etag),
        None => template,
    }
}

fn pdf_body(body: &[u8]) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_vec(), "application/pdf")
}

fn attachment(reply: &SentReply) -> &link_archiver::AttachmentReply {
    match reply {
        SentReply::Attachment(attachment) => attachment,
        other => panic!("expected attachment reply, got {other:?}"),
    }
}

#[tokio::test]
async fn test_new_url_is_downloaded_and_announced() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/doc.pdf"))
        .respond_with(head_ok(Some("\"v1\"")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/doc.pdf"))
        .respond_with(pdf_body(b"%PDF-1.4 one"))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness();
    let url = format!("{}/doc.pdf", server.uri());

    let outcome = h
        .processor
        .process_url("p1", "chan", &url, &direct_download_config())
        .await;

    assert_eq!(outcome, UrlOutcome::Archived);
    assert_eq!(h.files.upload_count(), 1);
    let replies = h.notifier.replies();
    assert_eq!(replies.len(), 1);
    let reply = attachment(&replies[0]);
    assert_eq!(reply.filename, "doc.pdf");
    assert_eq!(reply.mime_type, "application/pdf");
    assert_eq!(reply.size, 12);
    assert_eq!(reply.original_post_id, None);

    let stored = h.files.file(&reply.file_id).unwrap();
    assert_eq!(stored.container_id, "chan");
    assert_eq!(stored.bytes, b"%PDF-1.4 one");
}

#[tokio::test]
async fn test_same_post_same_url_is_archived_once() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(head_ok(None))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(pdf_body(b"%PDF-1.4"))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness();
    let url = format!("{}/doc.pdf", server.uri());
    let config = direct_download_config();

    let first = h.processor.process_url("p1", "chan", &url, &config).await;
    let second = h.processor.process_url("p1", "chan", &url, &config).await;

    assert_eq!(first, UrlOutcome::Archived);
    assert_eq!(second, UrlOutcome::Skipped(SkipReason::AlreadyArchived));
    assert_eq!(h.notifier.replies().len(), 1);
    assert_eq!(h.storage.per_post_records("p1", &url).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_matching_etag_reuses_without_download() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(head_ok(Some("\"v1\"")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(pdf_body(b"%PDF-1.4"))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness();
    let url = format!("{}/doc.pdf", server.uri());
    let config = direct_download_config();

    assert_eq!(
        h.processor.process_url("p1", "chan", &url, &config).await,
        UrlOutcome::Archived
    );
    assert_eq!(
        h.processor.process_url("p2", "chan", &url, &config).await,
        UrlOutcome::Reused(ReuseKind::Etag)
    );

    assert_eq!(h.files.upload_count(), 1);
    let replies = h.notifier.replies();
    let first = attachment(&replies[0]);
    let second = attachment(&replies[1]);
    assert_eq!(second.file_id, first.file_id);
    assert_eq!(second.original_post_id.as_deref(), Some("p1"));

    let records = h.storage.per_post_records("p2", &url).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].post_id, "p2");
    assert_eq!(records[0].file_id, first.file_id);
    assert_eq!(records[0].etag.as_deref(), Some("v1"));
}

#[tokio::test]
async fn test_identical_content_reuses_and_refreshes_global_etag() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(head_ok(None))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .respond_with(head_ok(Some("\"v2\"")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(pdf_body(b"%PDF-1.4 same"))
        .expect(2)
        .mount(&server)
        .await;

    let h = harness();
    let url = format!("{}/doc.pdf", server.uri());
    let config = direct_download_config();

    assert_eq!(
        h.processor.process_url("p1", "chan", &url, &config).await,
        UrlOutcome::Archived
    );
    let before = h.storage.existing_global_archive(&url).await.unwrap().unwrap();
    assert_eq!(before.etag, None);

    assert_eq!(
        h.processor.process_url("p2", "chan", &url, &config).await,
        UrlOutcome::Reused(ReuseKind::ContentHash)
    );

    assert_eq!(h.files.upload_count(), 1, "identical content must not be uploaded twice");
    let after = h.storage.existing_global_archive(&url).await.unwrap().unwrap();
    assert_eq!(after.file_id, before.file_id);
    assert_eq!(after.post_id, "p1");
    assert_eq!(after.etag.as_deref(), Some("v2"));
    assert!(after.archived_at >= before.archived_at);

    let reused = h.storage.per_post_records("p2", &url).await.unwrap();
    assert_eq!(reused[0].etag.as_deref(), Some("v2"));
    let replies = h.notifier.replies();
    assert_eq!(attachment(&replies[1]).original_post_id.as_deref(), Some("p1"));
}

#[tokio::test]
async fn test_changed_content_creates_new_artifact() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(head_ok(None))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(pdf_body(b"%PDF-1.4 old"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(pdf_body(b"%PDF-1.4 new"))
        .mount(&server)
        .await;

    let h = harness();
    let url = format!("{}/doc.pdf", server.uri());
    let config = direct_download_config();

    h.processor.process_url("p1", "chan", &url, &config).await;
    let old = h.storage.existing_global_archive(&url).await.unwrap().unwrap();

    let outcome = h.processor.process_url("p2", "chan", &url, &config).await;

    assert_eq!(outcome, UrlOutcome::Archived);
    assert_eq!(h.files.upload_count(), 2);
    let new = h.storage.existing_global_archive(&url).await.unwrap().unwrap();
    assert_ne!(new.file_id, old.file_id);
    assert_eq!(new.post_id, "p2");
    assert_ne!(new.content_hash, old.content_hash);
    assert_eq!(attachment(&h.notifier.replies()[1]).original_post_id, None);
}

#[tokio::test]
async fn test_oversize_download_replies_with_too_large() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(head_ok(None))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(pdf_body(&[b'x'; 17]))
        .mount(&server)
        .await;

    let h = harness_with(ToolSettings {
        max_download_bytes: 16,
        ..ToolSettings::default()
    });
    let url = format!("{}/big.pdf", server.uri());

    let outcome = h
        .processor
        .process_url("p1", "chan", &url, &direct_download_config())
        .await;

    assert_eq!(outcome, UrlOutcome::Failed(FailureReason::TooLarge));
    assert_eq!(h.files.upload_count(), 0);
    match &h.notifier.replies()[0] {
        SentReply::Failure { post_id, message, .. } => {
            assert_eq!(post_id, "p1");
            assert!(message.contains("**Reason:** File too large"));
        }
        other => panic!("expected failure reply, got {other:?}"),
    }
    assert!(!h.storage.is_already_archived("p1", &url).await.unwrap());
}

#[tokio::test]
async fn test_http_error_replies_with_status_reason() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(head_ok(None))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let h = harness();
    let url = format!("{}/doc.pdf", server.uri());

    let outcome = h
        .processor
        .process_url("p1", "chan", &url, &direct_download_config())
        .await;

    assert_eq!(outcome, UrlOutcome::Failed(FailureReason::HttpServerError));
}

#[tokio::test]
async fn test_message_fans_out_under_a_small_admission_cap() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(head_ok(None))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(pdf_body(b"%PDF-1.4"))
        .mount(&server)
        .await;

    let files = MemoryFileStore::new();
    let storage = Arc::new(ArchiveStorage::new(
        Arc::new(MemoryKvStore::new()),
        Arc::new(files.clone()),
    ));
    let processor = Processor::from_config(
        &ArchiverConfig {
            max_concurrent_archives: 1,
            ..direct_download_config()
        },
        storage,
        Arc::new(MemoryNotifier::new()),
    )
    .unwrap();
    assert_eq!(processor.max_concurrent(), 1);

    let text = (0..5)
        .map(|i| format!("{}/doc{i}.pdf", server.uri()))
        .collect::<Vec<_>>()
        .join(" and ");
    let handles = processor.process_message(
        &Message::new("p1", "chan", text),
        Arc::new(direct_download_config()),
    );

    assert_eq!(handles.len(), 5);
    for handle in handles {
        assert_eq!(handle.await.unwrap(), UrlOutcome::Archived);
    }
    assert_eq!(files.upload_count(), 5);
}

#[tokio::test]
async fn test_sqlite_and_local_store_backends() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(head_ok(Some("\"v1\"")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(pdf_body(b"%PDF-1.4 disk"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db = Database::new(&dir.path().join("archive.db")).await.unwrap();
    let local = LocalFileStore::new(dir.path().join("files"));
    let storage = Arc::new(ArchiveStorage::new(
        Arc::new(SqliteKvStore::new(db)),
        Arc::new(local.clone()),
    ));
    let notifier = MemoryNotifier::new();
    let processor = Processor::from_config(
        &direct_download_config(),
        Arc::clone(&storage),
        Arc::new(notifier.clone()),
    )
    .unwrap();
    let url = format!("{}/doc.pdf", server.uri());

    let outcome = processor
        .process_url("p1", "chan", &url, &direct_download_config())
        .await;

    assert_eq!(outcome, UrlOutcome::Archived);
    let reply = attachment(&notifier.replies()[0]).clone();
    let on_disk = local.artifact_path("chan", &reply.file_id, &reply.filename);
    assert_eq!(std::fs::read(on_disk).unwrap(), b"%PDF-1.4 disk");

    let records = storage.per_post_records("p1", &url).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].etag.as_deref(), Some("v1"));
}
