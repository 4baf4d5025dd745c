//! Tool transport.
//!
//! [`McpTransport`] is the wire-level collaborator: it frames MCP requests and
//! performs the session handshake, but knows nothing about Frontegg identity.
//! [`FronteggTransport`] wraps one and supplies the credential and context headers
//! for every request it sends.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use rmcp::model::{CallToolResult, JsonObject, Tool};

use crate::error::Result;

pub mod adapter;
pub mod http;

pub use adapter::{FronteggTransport, build_headers};
pub use http::{IdentityHttpClient, StreamableHttpTransport};

/// Header carrying the MCP session established by the handshake.
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

/// A connection to an MCP tool server.
///
/// Every method receives the complete header set to send with its request(s).
/// Implementations must not add authentication headers of their own.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Perform the session handshake.
    async fn connect(&self, headers: HeaderMap) -> Result<()>;

    /// List every tool the server exposes.
    async fn list_tools(&self, headers: HeaderMap) -> Result<Vec<Tool>>;

    /// Invoke a tool by name.
    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
        headers: HeaderMap,
    ) -> Result<CallToolResult>;

    /// Terminate the session.
    async fn close(&self, headers: HeaderMap) -> Result<()>;

    /// Session id assigned by the server during the handshake, if any.
    async fn session_id(&self) -> Option<String>;

    /// Headers the transport itself wants on every request (e.g. the negotiated
    /// protocol version). Identity headers set by the caller take precedence.
    async fn request_headers(&self) -> HeaderMap {
        HeaderMap::new()
    }
}
