mod common;

use chrono::{Duration, Utc};
use common::*;
use file_lifecycle::entities::{prelude::*, *};
use file_lifecycle::error::AppError;
use file_lifecycle::models::{FileDto, SharePermission};
use file_lifecycle::services::file_service::UploadRequest;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};

async fn alice_file(h: &TestHarness) -> FileDto {
    h.state
        .file_service
        .upload_file(UploadRequest::new(&b"shared bytes"[..], "notes.txt"), "alice")
        .await
        .unwrap()
}

async fn backdate_link(h: &TestHarness, token: &str) {
    let link = ShareLinks::find()
        .filter(share_links::Column::Token.eq(token))
        .one(&h.state.db)
        .await
        .unwrap()
        .unwrap();
    let mut active: share_links::ActiveModel = link.into();
    active.expires_at = Set(Utc::now() - Duration::minutes(5));
    active.update(&h.state.db).await.unwrap();
}

#[tokio::test]
async fn test_read_link_denies_write() {
    let h = harness().await;
    let file = alice_file(&h).await;
    let shares = &h.state.share_service;

    let link = shares
        .create_share_link(&file.id, "read", Some(3), "alice")
        .await
        .unwrap();
    assert_eq!(link.permission, "READ");
    assert_eq!(link.created_by, "alice");
    assert_eq!(link.token.len(), 43);
    assert!(link.file_url.contains("X-Amz-Expires="));

    // anyone holding the token, e.g. bob
    let err = shares
        .validate_share_link(&link.token, SharePermission::Write)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AccessDenied(_)));

    let shared = shares
        .validate_share_link(&link.token, SharePermission::Read)
        .await
        .unwrap();
    assert_eq!(shared.id, file.id);
}

#[tokio::test]
async fn test_write_link_implies_read() {
    let h = harness().await;
    let file = alice_file(&h).await;
    let shares = &h.state.share_service;

    let link = shares
        .create_share_link(&file.id, "WRITE", None, "alice")
        .await
        .unwrap();
    assert!(
        shares
            .validate_share_link(&link.token, SharePermission::Write)
            .await
            .is_ok()
    );
    assert!(
        shares
            .validate_share_link(&link.token, SharePermission::Read)
            .await
            .is_ok()
    );
    assert_eq!((link.expires_at - Utc::now()).num_days(), 6);
}

#[tokio::test]
async fn test_expired_link_is_removed_on_validation() {
    let h = harness().await;
    let file = alice_file(&h).await;
    let shares = &h.state.share_service;

    let link = shares
        .create_share_link(&file.id, "READ", Some(1), "alice")
        .await
        .unwrap();
    backdate_link(&h, &link.token).await;

    let err = shares
        .validate_share_link(&link.token, SharePermission::Read)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AccessDenied(_)));
    assert_eq!(ShareLinks::find().count(&h.state.db).await.unwrap(), 0);

    // gone for good
    let err = shares
        .validate_share_link(&link.token, SharePermission::Read)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_issue_rules() {
    let h = harness().await;
    let file = alice_file(&h).await;
    let shares = &h.state.share_service;

    let err = shares
        .create_share_link(&file.id, "ADMIN", None, "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));

    let err = shares
        .create_share_link(&file.id, "READ", Some(0), "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));

    let err = shares
        .create_share_link(&file.id, "READ", None, "mallory")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AccessDenied(_)));

    let err = shares
        .create_share_link("no-such-file", "READ", None, "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    // readers may share too
    h.state.authz.grant_read_permission(&file.id, "bob").await.unwrap();
    let link = shares
        .create_share_link(&file.id, "READ", None, "bob")
        .await
        .unwrap();
    assert_eq!(link.created_by, "bob");
}

#[tokio::test]
async fn test_only_creator_revokes() {
    let h = harness().await;
    let file = alice_file(&h).await;
    let shares = &h.state.share_service;

    let link = shares
        .create_share_link(&file.id, "READ", None, "alice")
        .await
        .unwrap();

    let err = shares.delete_share_link(&link.token, "bob").await.unwrap_err();
    assert!(matches!(err, AppError::AccessDenied(_)));

    shares.delete_share_link(&link.token, "alice").await.unwrap();
    let err = shares
        .validate_share_link(&link.token, SharePermission::Read)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = shares.delete_share_link(&link.token, "alice").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_listing_links() {
    let h = harness().await;
    let file = alice_file(&h).await;
    let shares = &h.state.share_service;

    shares
        .create_share_link(&file.id, "READ", None, "alice")
        .await
        .unwrap();
    let stale = shares
        .create_share_link(&file.id, "WRITE", None, "alice")
        .await
        .unwrap();
    backdate_link(&h, &stale.token).await;

    let for_file = shares.get_share_links_for_file(&file.id, "alice").await.unwrap();
    assert_eq!(for_file.len(), 1);
    assert_eq!(for_file[0].permission, "READ");

    let err = shares
        .get_share_links_for_file(&file.id, "bob")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AccessDenied(_)));

    assert_eq!(shares.get_share_links_by_user("alice").await.unwrap().len(), 1);
    assert!(shares.get_share_links_by_user("bob").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_accessing_shared_content() {
    let h = harness().await;
    let file = alice_file(&h).await;
    let shares = &h.state.share_service;

    let link = shares
        .create_share_link(&file.id, "READ", Some(2), "alice")
        .await
        .unwrap();

    let by_token = shares.get_share_link_by_token(&link.token).await.unwrap();
    assert_eq!(by_token.file_id, file.id);

    let dto = shares.access_shared_file(&link.token).await.unwrap();
    assert_eq!(dto.filename, "notes.txt");
    assert!(!dto.download_url.is_empty());

    let (shared, body) = shares.open_shared_file(&link.token).await.unwrap();
    assert_eq!(shared.id, file.id);
    let bytes = body.collect().await.unwrap().into_bytes();
    assert_eq!(&bytes[..], b"shared bytes");

    let err = shares.access_shared_file("bogus").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_out_of_range_link_expiry_is_invalid_input() {
    let h = harness().await;
    let file = alice_file(&h).await;

    let err = h
        .state
        .share_service
        .create_share_link(&file.id, "READ", Some(1_000_000_000_000), "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
    assert_eq!(ShareLinks::find().count(&h.state.db).await.unwrap(), 0);
}
