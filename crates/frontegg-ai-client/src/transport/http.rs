//! MCP streamable HTTP transport.
//!
//! The session handshake, JSON-RPC framing and SSE decoding are rmcp's
//! [`StreamableHttpClientTransport`]. The HTTP client it drives is
//! [`IdentityHttpClient`], which sends each request with the header set the caller
//! supplied for that operation. The headers ride along in the rmcp request's
//! extensions, so a tool call keeps its own identity even though rmcp sends it from
//! a background worker.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use log::{debug, error, info, warn};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use rmcp::model::{
    CallToolRequest, CallToolRequestParams, CallToolResult, ClientJsonRpcMessage, ClientRequest,
    ErrorData, GetExtensions, JsonObject, ListToolsRequest, PaginatedRequestParams, RequestId,
    ServerJsonRpcMessage, ServerResult, Tool,
};
use rmcp::service::{ClientInitializeError, RunningService, ServerSink};
use rmcp::transport::DynamicTransportError;
use rmcp::transport::streamable_http_client::{
    SseError, StreamableHttpClient, StreamableHttpClientTransport,
    StreamableHttpClientTransportConfig, StreamableHttpError, StreamableHttpPostResponse,
};
use rmcp::{RoleClient, ServiceError, ServiceExt};
use sse_stream::{Sse, SseStream};
use tokio::sync::RwLock;

use super::{McpTransport, SESSION_ID_HEADER};
use crate::error::{ClientError, Result};

const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";
const LAST_EVENT_ID_HEADER: &str = "last-event-id";
const EVENT_STREAM: &str = "text/event-stream";
const JSON: &str = "application/json";
const ACCEPT_BOTH: &str = "application/json, text/event-stream";

type HttpError = StreamableHttpError<ClientError>;

/// Header set attached to an outgoing rmcp request.
#[derive(Debug, Clone)]
struct OperationHeaders(HeaderMap);

#[derive(Debug, Default)]
struct SessionState {
    /// Used for messages that carry no headers of their own: the handshake, the
    /// server event stream and session deletion.
    fallback_headers: HeaderMap,
    session_id: Option<String>,
    protocol_version: Option<String>,
}

/// [`StreamableHttpClient`] that sends caller-supplied headers with every request.
#[derive(Debug, Clone)]
pub struct IdentityHttpClient {
    http: reqwest::Client,
    state: Arc<RwLock<SessionState>>,
}

impl IdentityHttpClient {
    async fn headers(&self, attached: Option<HeaderMap>, session_id: Option<&str>) -> HeaderMap {
        let mut headers = match attached {
            Some(headers) => headers,
            None => self.state.read().await.fallback_headers.clone(),
        };
        if let Some(session_id) = session_id
            && let Ok(value) = HeaderValue::from_str(session_id)
        {
            headers.insert(HeaderName::from_static(SESSION_ID_HEADER), value);
        }
        headers
    }
}

fn network(e: reqwest::Error) -> HttpError {
    StreamableHttpError::Client(ClientError::Network(e))
}

async fn status_error(response: reqwest::Response) -> HttpError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_else(|e| {
        warn!("Failed to read error response body: {e}");
        String::new()
    });
    error!("MCP request failed with status {status}: {body}");
    StreamableHttpError::Client(ClientError::Http { status, body })
}

const fn response_id(message: &ServerJsonRpcMessage) -> Option<&RequestId> {
    match message {
        ServerJsonRpcMessage::Response(response) => Some(&response.id),
        ServerJsonRpcMessage::Error(error) => Some(&error.id),
        _ => None,
    }
}

impl StreamableHttpClient for IdentityHttpClient {
    type Error = ClientError;

    async fn post_message(
        &self,
        uri: Arc<str>,
        message: ClientJsonRpcMessage,
        session_id: Option<Arc<str>>,
        _auth_header: Option<String>,
    ) -> std::result::Result<StreamableHttpPostResponse, HttpError> {
        let (request_id, attached) = match &message {
            ClientJsonRpcMessage::Request(request) => (
                Some(request.id.clone()),
                request
                    .request
                    .extensions()
                    .get::<OperationHeaders>()
                    .map(|h| h.0.clone()),
            ),
            _ => (None, None),
        };
        let headers = self.headers(attached, session_id.as_deref()).await;

        let response = self
            .http
            .post(uri.as_ref())
            .headers(headers)
            .header(ACCEPT, ACCEPT_BOTH)
            .json(&message)
            .send()
            .await
            .map_err(network)?;

        let status = response.status();
        if matches!(status, StatusCode::ACCEPTED | StatusCode::NO_CONTENT) {
            return Ok(StreamableHttpPostResponse::Accepted);
        }
        if !status.is_success() {
            return Err(status_error(response).await);
        }

        let session_id = response
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        if let Some(session_id) = &session_id {
            self.state.write().await.session_id = Some(session_id.clone());
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        match content_type.as_deref() {
            Some(ct) if ct.starts_with(EVENT_STREAM) => Ok(StreamableHttpPostResponse::Sse(
                SseStream::from_byte_stream(response.bytes_stream()).boxed(),
                session_id,
            )),
            Some(ct) if ct.starts_with(JSON) => {
                let body = response.bytes().await.map_err(network)?;
                let reply: ServerJsonRpcMessage = serde_json::from_slice(&body)
                    .map_err(|e| StreamableHttpError::Client(ClientError::Serialization(e)))?;

                if let (Some(expected), Some(actual)) = (&request_id, response_id(&reply))
                    && expected != actual
                {
                    error!("MCP response id {actual} does not match request {expected}");
                    return Err(StreamableHttpError::Client(ClientError::InvalidResponse(
                        format!("response id {actual} does not match request {expected}"),
                    )));
                }
                Ok(StreamableHttpPostResponse::Json(reply, session_id))
            }
            _ => {
                error!("Unexpected MCP response content type: {content_type:?}");
                Err(StreamableHttpError::UnexpectedContentType(content_type))
            }
        }
    }

    async fn delete_session(
        &self,
        uri: Arc<str>,
        session_id: Arc<str>,
        _auth_header: Option<String>,
    ) -> std::result::Result<(), HttpError> {
        let headers = self.headers(None, Some(&*session_id)).await;
        let response = self
            .http
            .delete(uri.as_ref())
            .headers(headers)
            .send()
            .await
            .map_err(network)?;

        match response.status() {
            status if status.is_success() => {
                debug!("MCP session {session_id} closed");
                Ok(())
            }
            StatusCode::METHOD_NOT_ALLOWED => {
                debug!("Server does not support explicit session termination");
                Ok(())
            }
            _ => Err(status_error(response).await),
        }
    }

    async fn get_stream(
        &self,
        uri: Arc<str>,
        session_id: Arc<str>,
        last_event_id: Option<String>,
        _auth_header: Option<String>,
    ) -> std::result::Result<BoxStream<'static, std::result::Result<Sse, SseError>>, HttpError>
    {
        let mut headers = self.headers(None, Some(&*session_id)).await;
        if let Some(last_event_id) = last_event_id
            && let Ok(value) = HeaderValue::from_str(&last_event_id)
        {
            headers.insert(HeaderName::from_static(LAST_EVENT_ID_HEADER), value);
        }

        let response = self
            .http
            .get(uri.as_ref())
            .headers(headers)
            .header(ACCEPT, EVENT_STREAM)
            .send()
            .await
            .map_err(network)?;

        if response.status() == StatusCode::METHOD_NOT_ALLOWED {
            debug!("Server does not offer a standalone event stream");
            return Err(StreamableHttpError::ServerDoesNotSupportSse);
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(SseStream::from_byte_stream(response.bytes_stream()).boxed())
    }
}

fn rpc_error(data: ErrorData) -> ClientError {
    ClientError::Rpc {
        code: i64::from(data.code.0),
        message: data.message.into_owned(),
    }
}

/// Recover the error raised by [`IdentityHttpClient`] from rmcp's type-erased wrapper.
fn transport_error(err: DynamicTransportError) -> ClientError {
    match err.error.downcast::<HttpError>() {
        Ok(inner) => match *inner {
            StreamableHttpError::Client(e) => e,
            other => ClientError::transport(other),
        },
        Err(other) => ClientError::Transport(other),
    }
}

fn service_error(err: ServiceError) -> ClientError {
    match err {
        ServiceError::McpError(data) => rpc_error(data),
        ServiceError::TransportSend(e) => transport_error(e),
        ServiceError::TransportClosed => ClientError::NotConnected,
        other => ClientError::transport(other),
    }
}

fn initialize_error(err: ClientInitializeError) -> ClientError {
    match err {
        ClientInitializeError::TransportError { error, .. } => transport_error(error),
        ClientInitializeError::JsonRpcError(data) => rpc_error(data),
        other => ClientError::InvalidResponse(other.to_string()),
    }
}

fn unexpected(method: &str, result: &ServerResult) -> ClientError {
    ClientError::InvalidResponse(format!("unexpected {method} result: {result:?}"))
}

/// MCP client transport over streamable HTTP.
pub struct StreamableHttpTransport {
    client: IdentityHttpClient,
    endpoint: String,
    service: RwLock<Option<RunningService<RoleClient, ()>>>,
}

impl std::fmt::Debug for StreamableHttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamableHttpTransport")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl StreamableHttpTransport {
    /// Transport posting to `endpoint` with the given client.
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client: IdentityHttpClient {
                http,
                state: Arc::new(RwLock::new(SessionState::default())),
            },
            endpoint: endpoint.into(),
            service: RwLock::new(None),
        }
    }

    /// Endpoint requests are posted to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn peer(&self) -> Result<ServerSink> {
        self.service
            .read()
            .await
            .as_ref()
            .map(|service| service.peer().clone())
            .ok_or(ClientError::NotConnected)
    }
}

#[async_trait]
impl McpTransport for StreamableHttpTransport {
    async fn connect(&self, headers: HeaderMap) -> Result<()> {
        *self.client.state.write().await = SessionState {
            fallback_headers: headers,
            ..SessionState::default()
        };

        let transport = StreamableHttpClientTransport::with_client(
            self.client.clone(),
            StreamableHttpClientTransportConfig::with_uri(self.endpoint.as_str()),
        );
        let service = ().serve(transport).await.map_err(initialize_error)?;

        if let Some(info) = service.peer_info() {
            info!(
                "Connected to MCP server {} {} (protocol {})",
                info.server_info.name, info.server_info.version, info.protocol_version
            );
            self.client.state.write().await.protocol_version =
                Some(info.protocol_version.to_string());
        }

        let previous = self.service.write().await.replace(service);
        if let Some(previous) = previous
            && let Err(e) = previous.cancel().await
        {
            warn!("Failed to shut down previous MCP session: {e}");
        }
        Ok(())
    }

    async fn list_tools(&self, headers: HeaderMap) -> Result<Vec<Tool>> {
        let peer = self.peer().await?;
        self.client
            .state
            .write()
            .await
            .fallback_headers
            .clone_from(&headers);

        let mut tools = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = None;
        loop {
            let mut request = ListToolsRequest::with_param(PaginatedRequestParams {
                meta: None,
                cursor: cursor.take(),
            });
            request
                .extensions
                .insert(OperationHeaders(headers.clone()));

            let page = match peer
                .send_request(ClientRequest::ListToolsRequest(request))
                .await
                .map_err(service_error)?
            {
                ServerResult::ListToolsResult(page) => page,
                other => return Err(unexpected("tools/list", &other)),
            };
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if seen.insert(next.clone()) => cursor = Some(next),
                Some(next) => {
                    warn!("tools/list cursor {next} was already visited; stopping");
                    break;
                }
                None => break,
            }
        }

        debug!("Listed {} tools", tools.len());
        Ok(tools)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
        headers: HeaderMap,
    ) -> Result<CallToolResult> {
        let peer = self.peer().await?;

        let mut request = CallToolRequest::new(CallToolRequestParams {
            meta: None,
            name: name.to_owned().into(),
            arguments,
            task: None,
        });
        request.extensions.insert(OperationHeaders(headers));

        match peer
            .send_request(ClientRequest::CallToolRequest(request))
            .await
            .map_err(service_error)?
        {
            ServerResult::CallToolResult(result) => Ok(result),
            other => Err(unexpected("tools/call", &other)),
        }
    }

    async fn close(&self, headers: HeaderMap) -> Result<()> {
        let Some(service) = self.service.write().await.take() else {
            return Ok(());
        };
        self.client.state.write().await.fallback_headers = headers;

        // The worker deletes the session before `cancel` returns.
        let closed = service.cancel().await;
        *self.client.state.write().await = SessionState::default();
        closed.map_err(ClientError::transport)?;

        debug!("MCP session at {} closed", self.endpoint);
        Ok(())
    }

    async fn session_id(&self) -> Option<String> {
        self.client.state.read().await.session_id.clone()
    }

    async fn request_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(version) = &self.client.state.read().await.protocol_version
            && let Ok(value) = HeaderValue::from_str(version)
        {
            headers.insert(HeaderName::from_static(PROTOCOL_VERSION_HEADER), value);
        }
        headers
    }
}
