use hubcast::{ClientOptions, HubClient, MessageKind, PostMessageRequest, Sender};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ok(data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "data": data }))
}

fn message_json(id: i64, content: &str) -> serde_json::Value {
    json!({
        "id": id,
        "workspace_id": "ws-1",
        "sender": {"kind": "human", "id": "u-1"},
        "content": content,
        "type": "chat",
        "metadata": {},
        "created_at": "2026-01-05T12:00:00Z"
    })
}

async fn client(server: &MockServer) -> HubClient {
    HubClient::new(ClientOptions::new("hub_live_test").with_base_url(server.uri()))
        .expect("failed to create client")
}

#[tokio::test]
async fn post_message_sends_bearer_token_and_decodes_envelope() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    Mock::given(method("POST"))
        .and(path("/v1/workspaces/ws-1/messages"))
        .and(header("authorization", "Bearer hub_live_test"))
        .and(body_json(json!({
            "sender": {"kind": "agent", "name": "coder"},
            "content": "status update",
            "type": "chat",
            "metadata": {}
        })))
        .respond_with(ok(message_json(1, "status update")))
        .expect(1)
        .mount(&server)
        .await;

    let message = client
        .post_message(
            "ws-1",
            &PostMessageRequest::chat(Sender::agent("coder"), "status update"),
        )
        .await
        .expect("post_message failed");
    assert_eq!(message.id, 1);
    assert_eq!(message.message_kind, MessageKind::Chat);
}

#[tokio::test]
async fn list_since_passes_cursor_and_limit() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1/workspaces/ws-1/messages"))
        .and(query_param("after_id", "41"))
        .and(query_param("limit", "50"))
        .respond_with(ok(json!({
            "messages": [message_json(42, "catch-up")],
            "has_more": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let batch = client
        .list_since("ws-1", 41, Some(50))
        .await
        .expect("list_since failed");
    assert_eq!(batch.messages.len(), 1);
    assert_eq!(batch.messages[0].id, 42);
    assert!(!batch.has_more);
}

#[tokio::test]
async fn list_unseen_queries_the_consumer_key() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1/workspaces/ws-1/messages/unseen"))
        .and(query_param("consumer", "agent:coder"))
        .respond_with(ok(json!([message_json(7, "are you done?")])))
        .expect(1)
        .mount(&server)
        .await;

    let unseen = client
        .list_unseen("ws-1", "agent:coder")
        .await
        .expect("list_unseen failed");
    assert_eq!(unseen.len(), 1);
    assert_eq!(unseen[0].content, "are you done?");
}

#[tokio::test]
async fn acknowledge_posts_ids_and_consumer() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    Mock::given(method("POST"))
        .and(path("/v1/workspaces/ws-1/messages/acknowledge"))
        .and(body_json(json!({
            "message_ids": [7, 8],
            "consumer": "agent:coder"
        })))
        .respond_with(ok(json!({ "acknowledged": 2 })))
        .expect(1)
        .mount(&server)
        .await;

    let response = client
        .acknowledge("ws-1", &[7, 8], "agent:coder")
        .await
        .expect("acknowledge failed");
    assert_eq!(response.acknowledged, 2);
}

#[tokio::test]
async fn agent_activity_handles_absent_record() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1/workspaces/ws-1/agent-activity"))
        .respond_with(ok(json!({ "activity": null })))
        .expect(1)
        .mount(&server)
        .await;

    let activity = client
        .agent_activity("ws-1")
        .await
        .expect("agent_activity failed");
    assert!(activity.is_none());
}

#[tokio::test]
async fn api_errors_surface_code_and_status() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1/workspaces/ws-1/messages/unseen"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "ok": false,
            "error": { "code": "unauthorized", "message": "Missing or invalid API key" }
        })))
        .mount(&server)
        .await;

    let err = client
        .list_unseen("ws-1", "agent:coder")
        .await
        .expect_err("expected auth rejection");
    assert!(err.is_auth_rejection());
    assert_eq!(err.code(), Some("unauthorized"));
    assert_eq!(err.status(), Some(401));
}

#[tokio::test]
async fn transient_5xx_is_retried_then_succeeds() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1/workspaces/ws-1/messages/unseen"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/workspaces/ws-1/messages/unseen"))
        .respond_with(ok(json!([])))
        .mount(&server)
        .await;

    let unseen = client
        .list_unseen("ws-1", "agent:coder")
        .await
        .expect("retry should recover");
    assert!(unseen.is_empty());
}
