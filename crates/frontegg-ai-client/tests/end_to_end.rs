#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Client scenarios against mocked Frontegg services.

use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use frontegg_ai_client::{ClientError, FronteggAiClient, ManualClock};
use frontegg_ai_common::ClientConfig;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const PRIVATE_KEY: &str = include_str!("fixtures/identity_private_key.pem");
const PUBLIC_KEY: &str = include_str!("fixtures/identity_public_key.pem");

fn config(server: &MockServer) -> ClientConfig {
    ClientConfig::builder()
        .agent_id("a1")
        .client_id("client-1")
        .client_secret("secret-1")
        .api_base_url(server.uri())
        .mcp_server_url(format!("{}/mcp/v1", server.uri()))
        .build()
}

fn issuance(token: &str, expires_in: i64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"token": token, "expiresIn": expires_in}))
}

fn body(request: &Request) -> Value {
    serde_json::from_slice(&request.body).unwrap_or(Value::Null)
}

/// JSON-RPC result echoing the id of the request it answers.
fn rpc_result(request: &Request, result: Value) -> ResponseTemplate {
    let id = body(request)["id"].clone();
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    }))
}

async fn mount_handshake(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/mcp/v1"))
        .and(body_partial_json(json!({"method": "initialize"})))
        .and(header("agent-id", "a1"))
        .respond_with(|request: &Request| {
            rpc_result(
                request,
                json!({
                    "protocolVersion": "2025-03-26",
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "frontegg-mcp", "version": "1.0.0"}
                }),
            )
            .insert_header("mcp-session-id", "sess-1")
        })
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/mcp/v1"))
        .and(body_partial_json(json!({"method": "notifications/initialized"})))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(server)
        .await;

    // No standalone server event stream.
    Mock::given(method("GET"))
        .and(path("/mcp/v1"))
        .respond_with(ResponseTemplate::new(405))
        .mount(server)
        .await;
}

fn tool_result(text: &'static str) -> impl Fn(&Request) -> ResponseTemplate + Send + Sync {
    move |request: &Request| {
        rpc_result(
            request,
            json!({"content": [{"type": "text", "text": text}]}),
        )
    }
}

/// POST requests in arrival order, named by JSON-RPC method or by path.
async fn post_sequence(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method.as_str() == "POST")
        .map(|r| {
            body(r)["method"]
                .as_str()
                .map_or_else(|| r.url.path().to_string(), ToString::to_string)
        })
        .collect()
}

fn sign(claims: &Value) -> String {
    encode(
        &Header::new(Algorithm::RS256),
        claims,
        &EncodingKey::from_rsa_pem(PRIVATE_KEY.as_bytes()).unwrap(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_credential_refreshes_exactly_when_expired() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/vendor/"))
        .and(body_partial_json(json!({"clientId": "client-1", "secret": "secret-1"})))
        .respond_with(issuance("abc", 60))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/vendor/"))
        .respond_with(issuance("def", 60))
        .expect(1)
        .mount(&server)
        .await;
    mount_handshake(&server).await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "tools/call"})))
        .and(header("authorization", "Bearer abc"))
        .and(header("mcp-session-id", "sess-1"))
        .and(header("mcp-protocol-version", "2025-03-26"))
        .respond_with(tool_result("first"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "tools/call"})))
        .and(header("authorization", "Bearer def"))
        .respond_with(tool_result("second"))
        .expect(1)
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new(
        DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
    ));
    let client = FronteggAiClient::builder(config(&server))
        .with_clock(clock.clone())
        .with_staging(false)
        .connect()
        .await
        .unwrap();

    // Issued at t=0, valid for 60s.
    clock.advance(Duration::from_secs(30));
    client
        .call_tool("echo", json!({"n": 1}), "t1", None)
        .await
        .unwrap();

    clock.advance(Duration::from_secs(31));
    client
        .call_tool("echo", json!({"n": 2}), "t1", None)
        .await
        .unwrap();

    assert_eq!(
        post_sequence(&server).await,
        vec![
            "/auth/vendor/",
            "initialize",
            "notifications/initialized",
            "tools/call",
            "/auth/vendor/",
            "tools/call",
        ]
    );
}

#[tokio::test]
async fn test_tool_call_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/vendor/"))
        .respond_with(issuance("abc", 3600))
        .mount(&server)
        .await;
    mount_handshake(&server).await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "tools/call"})))
        .respond_with(tool_result("ok"))
        .mount(&server)
        .await;

    let client = FronteggAiClient::builder(config(&server))
        .with_staging(false)
        .connect()
        .await
        .unwrap();
    client.call_tool("echo", Value::Null, "t1", None).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let call = requests
        .iter()
        .find(|r| body(r)["method"] == "tools/call")
        .unwrap();
    let mut identity: Vec<&str> = call
        .headers
        .keys()
        .map(reqwest::header::HeaderName::as_str)
        .filter(|name| {
            [
                "authorization",
                "agent-id",
                "tenant-id",
                "user-id",
                "frontegg-user-access-token",
                "mcp-session-id",
            ]
            .contains(name)
        })
        .collect();
    identity.sort_unstable();

    assert_eq!(
        identity,
        vec!["agent-id", "authorization", "mcp-session-id", "tenant-id"]
    );
    assert_eq!(call.headers["tenant-id"], "t1");
}

#[tokio::test]
async fn test_rejected_issuance_fails_connect() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/vendor/"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid secret"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp/v1"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let err = FronteggAiClient::builder(config(&server))
        .with_staging(false)
        .connect()
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ClientError::Authentication { status: 401, ref body } if body == "invalid secret"
    ));
}

#[tokio::test]
async fn test_machine_token_binds_tenant_only() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/vendor/"))
        .respond_with(issuance("abc", 3600))
        .mount(&server)
        .await;
    mount_handshake(&server).await;
    Mock::given(method("GET"))
        .and(path("/identity/resources/configurations/v1"))
        .and(header("x-access-token", "abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"publicKey": PUBLIC_KEY})))
        .expect(1)
        .mount(&server)
        .await;

    let client = FronteggAiClient::builder(config(&server))
        .with_staging(false)
        .connect()
        .await
        .unwrap();

    let exp = chrono::Utc::now().timestamp() + 3600;
    let machine = sign(&json!({
        "type": "tenantApiToken",
        "sub": "api-client-7",
        "tenantId": "t9",
        "exp": exp,
    }));
    assert!(client.authenticate_end_user(&machine).await);

    let ctx = client.current_context().await;
    assert_eq!(ctx.tenant_id.as_deref(), Some("t9"));
    assert!(ctx.user_id.is_none());
    assert_eq!(
        client.render_context_preamble("You are an agent.").await,
        "You are an agent."
    );

    let user = sign(&json!({
        "type": "userToken",
        "sub": "user-1",
        "tenantId": "t9",
        "name": "Ada",
        "email": "ada@example.com",
        "exp": exp,
    }));
    assert!(client.authenticate_end_user(&user).await);
    let prompt = client.render_context_preamble("You are an agent.").await;
    assert!(prompt.contains("Email: ada@example.com"));
    assert_eq!(
        client.current_context().await.user_id.as_deref(),
        Some("user-1")
    );

    assert!(!client.authenticate_end_user("garbage").await);
}
