//! # frontegg-ai-common
//!
//! Shared types for the Frontegg AI agents client:
//! - [`ClientConfig`] and the [`Environment`]-derived service [`Endpoints`]
//! - [`RequestContext`], the identity attached to every tool request
//! - [`VerifiedToken`] and [`AuthenticatedUser`], the result of end-user token verification
//!
//! ## Example
//!
//! ```
//! use frontegg_ai_common::{AuthenticatedUser, RequestContext};
//!
//! let ctx = RequestContext::new("agent-123").with_tenant("tenant-1");
//! assert_eq!(ctx.tenant_id.as_deref(), Some("tenant-1"));
//!
//! let user = AuthenticatedUser::new("user-1", "Ada");
//! let prompt = user.render_preamble("You are a helpful assistant.");
//! assert!(prompt.contains("User ID: user-1"));
//! ```

/// Client configuration and endpoint resolution.
pub mod config;
/// Per-request identity context.
pub mod context;
/// Verified end-user identity and the prompt preamble.
pub mod identity;

pub use config::{ClientConfig, Endpoints, Environment, STAGING_OVERRIDE_ENV};
pub use context::RequestContext;
pub use identity::{AuthenticatedUser, TokenKind, VerifiedToken};
