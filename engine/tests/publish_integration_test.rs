//! Integration tests for the LinkedIn publish protocol
//!
//! A wiremock server plays LinkedIn's images, posts and socialActions
//! endpoints.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::{
    matchers::{body_partial_json, header, method, path, path_regex, query_param},
    Mock, MockServer, ResponseTemplate,
};

use quill_engine::analytics::EngagementSource;
use quill_engine::publish::{LinkedInClient, PublishPhase, PublishProtocol};
use quill_engine::retry::{RecordingSleeper, ResilientCaller, RetryPolicy};
use quill_engine::secrets::SecretString;
use sdk::errors::EngineError;
use sdk::types::VisualAsset;

const OWNER: &str = "urn:li:person:abc123";

fn client(server: &MockServer) -> LinkedInClient {
    LinkedInClient::new(
        &server.uri(),
        "202411",
        &SecretString::new("li-token"),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn protocol(server: &MockServer, attempts: u32) -> PublishProtocol {
    let caller = ResilientCaller::with_sleeper(
        RetryPolicy {
            max_attempts: attempts,
            base_delay: Duration::from_millis(1),
            max_jitter: Duration::ZERO,
        },
        Arc::new(RecordingSleeper::new()),
    );
    PublishProtocol::new(Arc::new(client(server)), caller, OWNER)
}

fn asset() -> VisualAsset {
    VisualAsset {
        prompt_text: "isometric server room".to_string(),
        binary_image: vec![0x89, 0x50, 0x4E, 0x47],
        mime_type: "image/png".to_string(),
    }
}

async fn mount_register(server: &MockServer, image_urn: &str, upload_path: &str) {
    Mock::given(method("POST"))
        .and(path("/rest/images"))
        .and(query_param("action", "initializeUpload"))
        .and(body_partial_json(json!({ "initializeUploadRequest": { "owner": OWNER } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": {
                "uploadUrlExpiresAt": 1_700_000_000_000u64,
                "uploadUrl": format!("{}{}", server.uri(), upload_path),
                "image": image_urn
            }
        })))
        .up_to_n_times(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_text_post_sends_linkedin_headers() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/posts"))
        .and(header("Authorization", "Bearer li-token"))
        .and(header("X-Restli-Protocol-Version", "2.0.0"))
        .and(header("LinkedIn-Version", "202411"))
        .and(body_partial_json(json!({
            "author": OWNER,
            "commentary": "Agents are the new interns.",
            "visibility": "PUBLIC",
            "lifecycleState": "PUBLISHED"
        })))
        .respond_with(ResponseTemplate::new(201).insert_header("x-restli-id", "urn:li:share:7001"))
        .expect(1)
        .mount(&server)
        .await;

    let receipt = protocol(&server, 3)
        .publish("Agents are the new interns.", None)
        .await
        .unwrap();

    assert_eq!(receipt.post_urn, "urn:li:share:7001");
    assert!(!receipt.has_image);
    assert_eq!(receipt.upload_pairs, 0);
}

#[tokio::test]
async fn test_failed_upload_uses_fresh_registration_urn() {
    let server = MockServer::start().await;

    mount_register(&server, "urn:li:image:first", "/upload/first").await;
    mount_register(&server, "urn:li:image:second", "/upload/second").await;

    Mock::given(method("PUT"))
        .and(path("/upload/first"))
        .respond_with(ResponseTemplate::new(400).set_body_string("upload url expired"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/upload/second"))
        .and(header("content-type", "image/png"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/posts"))
        .and(body_partial_json(json!({ "content": { "media": { "id": "urn:li:image:second" } } })))
        .respond_with(ResponseTemplate::new(201).insert_header("x-restli-id", "urn:li:share:7002"))
        .expect(1)
        .mount(&server)
        .await;

    let image = asset();
    let receipt = protocol(&server, 3)
        .publish("Post with a picture", Some(&image))
        .await
        .unwrap();

    assert_eq!(receipt.post_urn, "urn:li:share:7002");
    assert_eq!(receipt.asset_urn.as_deref(), Some("urn:li:image:second"));
    assert!(receipt.has_image);
    assert_eq!(receipt.upload_pairs, 2);
}

#[tokio::test]
async fn test_transient_upload_failure_never_reuses_upload_url() {
    let server = MockServer::start().await;

    mount_register(&server, "urn:li:image:first", "/upload/first").await;
    mount_register(&server, "urn:li:image:second", "/upload/second").await;

    // A retry of this url would hit the 503 again and fail the expectation
    Mock::given(method("PUT"))
        .and(path("/upload/first"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/upload/second"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/posts"))
        .and(body_partial_json(json!({ "content": { "media": { "id": "urn:li:image:second" } } })))
        .respond_with(ResponseTemplate::new(201).insert_header("x-restli-id", "urn:li:share:7005"))
        .expect(1)
        .mount(&server)
        .await;

    let image = asset();
    let receipt = protocol(&server, 3)
        .publish("Retry with a new ticket", Some(&image))
        .await
        .unwrap();

    assert_eq!(receipt.asset_urn.as_deref(), Some("urn:li:image:second"));
    assert_eq!(receipt.upload_pairs, 2);
}

#[tokio::test]
async fn test_registration_rejected_publishes_text_only() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/images"))
        .respond_with(ResponseTemplate::new(403).set_body_string("not allowed"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/posts"))
        .respond_with(ResponseTemplate::new(201).insert_header("x-restli-id", "urn:li:share:7003"))
        .expect(1)
        .mount(&server)
        .await;

    let image = asset();
    let receipt = protocol(&server, 3)
        .publish("Text survives", Some(&image))
        .await
        .unwrap();

    assert!(!receipt.has_image);
    assert!(receipt.asset_urn.is_none());

    let requests = server.received_requests().await.unwrap();
    let create = requests
        .iter()
        .find(|r| r.url.path() == "/rest/posts")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&create.body).unwrap();
    assert!(body.get("content").is_none());
}

#[tokio::test]
async fn test_post_id_falls_back_to_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/posts"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "urn:li:share:7004" })))
        .mount(&server)
        .await;

    let receipt = protocol(&server, 1).publish("hello", None).await.unwrap();
    assert_eq!(receipt.post_urn, "urn:li:share:7004");
}

#[tokio::test]
async fn test_create_failure_reports_orphaned_asset() {
    let server = MockServer::start().await;

    mount_register(&server, "urn:li:image:orphan", "/upload/orphan").await;

    Mock::given(method("PUT"))
        .and(path("/upload/orphan"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/posts"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .expect(2)
        .mount(&server)
        .await;

    let image = asset();
    let failure = protocol(&server, 2)
        .publish("doomed", Some(&image))
        .await
        .unwrap_err();

    assert_eq!(failure.phase, PublishPhase::Create);
    assert_eq!(failure.orphaned_asset_urn.as_deref(), Some("urn:li:image:orphan"));
    assert!(matches!(
        failure.error,
        EngineError::UpstreamExhausted { attempts: 2, .. }
    ));
}

#[tokio::test]
async fn test_engagement_reads_social_actions() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/rest/socialActions/.+"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "likesSummary": { "totalLikes": 42, "likedByCurrentUser": false },
            "commentsSummary": { "totalFirstLevelComments": 3, "aggregatedTotalComments": 7 }
        })))
        .mount(&server)
        .await;

    let engagement = client(&server)
        .engagement("urn:li:share:1")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(engagement.likes, 42);
    assert_eq!(engagement.comments, 7);
    assert_eq!(engagement.views, None);
}

#[tokio::test]
async fn test_engagement_forbidden_is_unavailable() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/rest/socialActions/.+"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let engagement = client(&server).engagement("urn:li:share:1").await.unwrap();
    assert_eq!(engagement, None);
}
