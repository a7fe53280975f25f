//! HTTP contract tests for the fashn.ai client using wiremock.

use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use elo_tryon::models::job::GarmentCategory;
use elo_tryon::services::fashn::{FashnClient, JobState, ProviderError, SynthesisProvider};

fn create_client(server: &MockServer) -> FashnClient {
    FashnClient::new("https://api.fashn.ai", "test-key").with_base_url(&server.uri())
}

#[tokio::test]
async fn submit_posts_run_request_and_returns_job_id() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/run"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_json(serde_json::json!({
            "model_image": "https://x/m.jpg",
            "garment_image": "https://x/g.jpg",
            "category": "tops",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "abc123"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = create_client(&server);
    let job_id = client
        .submit("https://x/m.jpg", "https://x/g.jpg", GarmentCategory::Tops)
        .await
        .unwrap();

    assert_eq!(job_id, "abc123");
}

#[tokio::test]
async fn submit_is_never_retried_on_server_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/run"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1) // exactly one request, no retry
        .mount(&server)
        .await;

    let client = create_client(&server);
    let err = client
        .submit("https://x/m.jpg", "https://x/g.jpg", GarmentCategory::Tops)
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::Server { status } if status.as_u16() == 500));
}

#[tokio::test]
async fn submit_auth_failure_keeps_status_code() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/run"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = create_client(&server);
    let err = client
        .submit("https://x/m.jpg", "https://x/g.jpg", GarmentCategory::Tops)
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::Rejected { status } if status.as_u16() == 401));
}

#[tokio::test]
async fn status_parses_terminal_success() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/status/abc123"))
        .and(header("Authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "succeeded",
            "output": ["https://x/r.png", "https://x/r2.png"],
        })))
        .mount(&server)
        .await;

    let client = create_client(&server);
    let state = client.status("abc123").await.unwrap();

    assert_eq!(
        state,
        JobState::Succeeded {
            output: vec!["https://x/r.png".to_string(), "https://x/r2.png".to_string()],
        }
    );
}

#[tokio::test]
async fn status_parses_pending_and_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/status/pending-job"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "pending"
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/status/failed-job"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "failed",
            "error": "nsfw_content",
        })))
        .mount(&server)
        .await;

    let client = create_client(&server);

    assert_eq!(client.status("pending-job").await.unwrap(), JobState::Pending);
    assert_eq!(
        client.status("failed-job").await.unwrap(),
        JobState::Failed {
            error: Some("nsfw_content".to_string()),
        }
    );
}

#[tokio::test]
async fn status_network_error_is_distinct_from_provider_failure() {
    // A server that was shut down: connection refused, not a provider verdict.
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let client = FashnClient::new("https://api.fashn.ai", "test-key").with_base_url(&uri);
    let err = client.status("abc123").await.unwrap_err();

    assert!(matches!(err, ProviderError::Http(_)));
}
