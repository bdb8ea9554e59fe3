//! Integration tests for the SQLite store: view replacement, cursors and
//! docket tasks.

use std::path::PathBuf;

use regscrape_core::store::{SeedSummary, TransientFault};
use regscrape_core::{
    Attachment, Cursor, DecodeStatus, DocketRecord, Document, DocumentFilter, ScrapeStatus,
    StoreError, View, ViewQuery, ViewScope,
};

mod support;
use support::{downloaded_view, setup_store};

fn document(id: &str, docket: &str, agency: &str, views: Vec<View>) -> Document {
    let mut document = Document::new(id);
    document.docket_id = Some(docket.to_string());
    document.agency = Some(agency.to_string());
    document.views = views;
    document
}

async fn drain<C: Cursor>(mut cursor: C) -> Result<Vec<C::Item>, StoreError> {
    let mut items = Vec::new();
    while let Some(item) = cursor.next().await? {
        items.push(item);
    }
    Ok(items)
}

// ==================== View Update Tests ====================

#[tokio::test]
async fn test_update_view_replaces_by_url_and_moves_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let (store, _db_dir) = setup_store().await?;
    store
        .insert_document(&document(
            "EPA-0001-0001",
            "EPA-0001",
            "EPA",
            vec![View::new("https://a/1", "pdf"), View::new("https://a/2", "msw8")],
        ))
        .await?;

    let mut updated = View::new("https://a/1", "pdf");
    updated.mark_downloaded(PathBuf::from("/data/1.pdf"));
    store.update_view("EPA-0001-0001", &updated).await?;

    let stored = store.get_document("EPA-0001-0001").await?.ok_or("missing")?;
    assert_eq!(stored.views.len(), 2);
    assert_eq!(stored.views[0].url, "https://a/2");
    assert_eq!(stored.views[1], updated);
    Ok(())
}

#[tokio::test]
async fn test_update_view_for_unknown_owner_fails() -> Result<(), Box<dyn std::error::Error>> {
    let (store, _db_dir) = setup_store().await?;
    store
        .insert_document(&document("EPA-0001-0001", "EPA-0001", "EPA", vec![]))
        .await?;

    let view = View::new("https://a/1", "pdf");
    assert!(matches!(
        store.update_view("EPA-9999-0001", &view).await,
        Err(StoreError::DocumentNotFound(id)) if id == "EPA-9999-0001"
    ));
    assert!(matches!(
        store.update_attachment_view("EPA-0001-0001", "09000064", &view).await,
        Err(StoreError::AttachmentNotFound { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_attachment_view_update_leaves_document_views_alone() -> Result<(), Box<dyn std::error::Error>> {
    let (store, _db_dir) = setup_store().await?;
    let mut doc = document(
        "FDA-0002-0001",
        "FDA-0002",
        "FDA",
        vec![View::new("https://shared/url", "pdf")],
    );
    doc.attachments = vec![Attachment {
        object_id: "0900006480c3".to_string(),
        title: None,
        views: vec![View::new("https://shared/url", "pdf")],
    }];
    store.insert_document(&doc).await?;

    let mut decoded = downloaded_view("https://shared/url", "pdf", &PathBuf::from("/data/c3.pdf"));
    decoded.mark_decoded("attachment text".to_string(), false);
    store
        .update_attachment_view("FDA-0002-0001", "0900006480c3", &decoded)
        .await?;

    let stored = store.get_document("FDA-0002-0001").await?.ok_or("missing")?;
    assert_eq!(stored.views[0].decoded, DecodeStatus::Pending);
    let attachment = stored.attachment("0900006480c3").ok_or("attachment missing")?;
    assert_eq!(attachment.views, vec![decoded]);
    Ok(())
}

// ==================== Cursor Tests ====================

#[tokio::test]
async fn test_view_cursor_pages_through_every_match() -> Result<(), Box<dyn std::error::Error>> {
    let (store, _db_dir) = setup_store().await?;
    for i in 0..5 {
        store
            .insert_document(&document(
                &format!("EPA-0003-000{i}"),
                "EPA-0003",
                "EPA",
                vec![View::new(format!("https://a/{i}"), "pdf")],
            ))
            .await?;
    }
    store
        .insert_document(&document(
            "FDA-0004-0001",
            "FDA-0004",
            "FDA",
            vec![View::new("https://b/1", "pdf")],
        ))
        .await?;

    // Page size is 2, so six matches span three pages.
    let all = drain(store.find_views(&ViewQuery::pending_download())).await?;
    assert_eq!(all.len(), 6);

    let epa_only = ViewQuery::pending_download().with_filter(DocumentFilter {
        agency: Some("EPA".to_string()),
        docket_id: None,
    });
    let epa = drain(store.find(ViewScope::Documents, &epa_only)).await?;
    assert_eq!(epa.len(), 5);
    assert!(epa.iter().all(|record| record.attachment_id.is_none()));

    let attachments = drain(store.find_attachment_views(&ViewQuery::pending_download())).await?;
    assert!(attachments.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_updated_view_leaves_query_it_no_longer_matches() -> Result<(), Box<dyn std::error::Error>> {
    let (store, _db_dir) = setup_store().await?;
    store
        .insert_document(&document(
            "EPA-0005-0001",
            "EPA-0005",
            "EPA",
            vec![
                View::new("https://a/1", "pdf"),
                View::new("https://a/2", "pdf"),
                View::new("https://a/3", "pdf"),
            ],
        ))
        .await?;

    let mut cursor = store.find_views(&ViewQuery::pending_download());
    let mut seen = Vec::new();
    while let Some(mut record) = cursor.next().await? {
        seen.push(record.view.url.clone());
        record
            .view
            .mark_downloaded(PathBuf::from(format!("/data/{}.pdf", seen.len())));
        store.update_record(&record).await?;
    }

    assert_eq!(seen, vec!["https://a/1", "https://a/2", "https://a/3"]);
    let remaining = drain(store.find_views(&ViewQuery::pending_download())).await?;
    assert!(remaining.is_empty());
    Ok(())
}

// ==================== Docket Tests ====================

#[tokio::test]
async fn test_create_dockets_is_idempotent() -> Result<(), Box<dyn std::error::Error>> {
    let (store, _db_dir) = setup_store().await?;
    for (id, docket) in [
        ("EPA-0006-0001", "EPA-0006"),
        ("EPA-0006-0002", "EPA-0006"),
        ("FDA-0007-0001", "FDA-0007"),
    ] {
        store
            .insert_document(&document(id, docket, "EPA", vec![]))
            .await?;
    }
    let mut orphan = Document::new("NOTICE-0001");
    orphan.docket_id = None;
    store.insert_document(&orphan).await?;

    assert_eq!(store.create_dockets().await?, SeedSummary { total: 2, new: 2 });

    let scraped = DocketRecord::pending("EPA-0006").scraped_with(serde_json::json!({"title": "Ozone"}));
    store.save_docket(&scraped, true).await?;
    assert_eq!(store.create_dockets().await?, SeedSummary { total: 2, new: 0 });

    let stored = store.get_docket("EPA-0006").await?.ok_or("docket missing")?;
    assert_eq!(stored.scraped, ScrapeStatus::Scraped);

    let pending = drain(store.pending_dockets()).await?;
    assert_eq!(
        pending.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
        vec!["FDA-0007"]
    );
    Ok(())
}

#[tokio::test]
async fn test_save_docket_without_upsert_keeps_existing() -> Result<(), Box<dyn std::error::Error>> {
    let (store, _db_dir) = setup_store().await?;
    let pending = DocketRecord::pending("EPA-0008");
    store.save_docket(&pending, false).await?;
    store
        .save_docket(&pending.failed_with("remote action failed"), false)
        .await?;
    assert_eq!(store.get_docket("EPA-0008").await?, Some(pending.clone()));

    store
        .save_docket(&pending.failed_with("remote action failed"), true)
        .await?;
    let stored = store.get_docket("EPA-0008").await?.ok_or("docket missing")?;
    assert_eq!(stored.scraped, ScrapeStatus::Failed);
    assert_eq!(stored.failure_reason.as_deref(), Some("remote action failed"));
    Ok(())
}

#[test]
fn test_store_errors_classify_transience() {
    assert!(StoreError::transient("connection reset").is_transient());
    assert!(!StoreError::DocumentNotFound("x".to_string()).is_transient());
    assert_eq!(TransientFault::of(&sqlx::Error::PoolTimedOut), Some(TransientFault::PoolTimeout));
    assert_eq!(TransientFault::of(&sqlx::Error::RowNotFound), None);
}
