//! # frontegg-ai-client
//!
//! Client library for invoking Frontegg AI agent tools over MCP.
//!
//! The client keeps a short-lived vendor token fresh and attaches the agent, tenant
//! and user identity to every tool request:
//! - [`credentials`]: vendor token issuance and expiry
//! - [`context`]: the shared request context
//! - [`transport`]: the MCP transport and the identity header adapter
//! - [`identity`]: end-user token verification
//! - [`backoff`]: retry with exponential backoff
//!
//! ## Example
//!
//! ```no_run
//! use frontegg_ai_client::FronteggAiClient;
//! use frontegg_ai_common::{ClientConfig, Environment};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), frontegg_ai_client::ClientError> {
//! let config = ClientConfig::builder()
//!     .environment(Environment::Us)
//!     .agent_id("agent-123")
//!     .client_id("vendor-client-id")
//!     .client_secret("vendor-secret")
//!     .build();
//!
//! let client = FronteggAiClient::get_instance(config).await?;
//! let tools = client.list_tools().await?;
//! println!("{} tools available", tools.len());
//!
//! let result = client
//!     .call_tool("send-email", json!({"to": "ada@example.com"}), "tenant-1", Some("user-1"))
//!     .await?;
//! println!("{result:?}");
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod client;
pub mod context;
pub mod credentials;
pub mod error;
pub mod identity;
pub mod transport;

pub use backoff::{RetryPolicy, retry};
pub use client::{ClientBuilder, ClientState, FronteggAiClient};
pub use context::ContextStore;
pub use credentials::{Clock, Credential, CredentialManager, ManualClock, SystemClock};
pub use error::ClientError;
pub use identity::{FronteggIdentityVerifier, IdentityVerifier};
pub use transport::{FronteggTransport, McpTransport, StreamableHttpTransport};
