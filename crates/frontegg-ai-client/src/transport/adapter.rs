//! Identity header injection.

use std::sync::Arc;

use frontegg_ai_common::RequestContext;
use log::{debug, warn};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use rmcp::model::{CallToolResult, JsonObject, Tool};
use secrecy::{ExposeSecret, SecretString};

use super::{McpTransport, SESSION_ID_HEADER};
use crate::context::ContextStore;
use crate::credentials::CredentialManager;
use crate::error::{ClientError, Result};

/// Agent the request is made for. Always sent.
pub const AGENT_ID_HEADER: &str = "agent-id";
/// Tenant of the current principal.
pub const TENANT_ID_HEADER: &str = "tenant-id";
/// User of the current principal.
pub const USER_ID_HEADER: &str = "user-id";
/// Raw end-user access token, forwarded only while it belongs to the principal.
pub const USER_TOKEN_HEADER: &str = "frontegg-user-access-token";

fn header_value(name: &'static str, value: &str, sensitive: bool) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(value).map_err(|_| {
        warn!("Refusing to send invalid value for header '{name}'");
        ClientError::InvalidHeader { name }
    })?;
    value.set_sensitive(sensitive);
    Ok(value)
}

/// Build the header set for one request.
///
/// `base` holds the transport's own headers. Identity headers are inserted on top
/// of it and replace any entry with the same name. Optional context fields are
/// only emitted when set.
///
/// # Errors
///
/// Returns [`ClientError::InvalidHeader`] if a value cannot be sent as an HTTP
/// header.
pub fn build_headers(
    token: &SecretString,
    context: &RequestContext,
    session_id: Option<&str>,
    base: HeaderMap,
) -> Result<HeaderMap> {
    let mut headers = base;

    headers.insert(
        AUTHORIZATION,
        header_value(
            "authorization",
            &format!("Bearer {}", token.expose_secret()),
            true,
        )?,
    );
    headers.insert(
        HeaderName::from_static(AGENT_ID_HEADER),
        header_value(AGENT_ID_HEADER, &context.agent_id, false)?,
    );

    if let Some(tenant_id) = &context.tenant_id {
        headers.insert(
            HeaderName::from_static(TENANT_ID_HEADER),
            header_value(TENANT_ID_HEADER, tenant_id, false)?,
        );
    }
    if let Some(user_id) = &context.user_id {
        headers.insert(
            HeaderName::from_static(USER_ID_HEADER),
            header_value(USER_ID_HEADER, user_id, false)?,
        );
    }
    if let Some(user_token) = &context.end_user_token {
        headers.insert(
            HeaderName::from_static(USER_TOKEN_HEADER),
            header_value(USER_TOKEN_HEADER, user_token.expose_secret(), true)?,
        );
    }
    if let Some(session_id) = session_id {
        headers.insert(
            HeaderName::from_static(SESSION_ID_HEADER),
            header_value(SESSION_ID_HEADER, session_id, false)?,
        );
    }

    Ok(headers)
}

/// Wraps a [`McpTransport`] and authenticates every request it sends.
///
/// Headers are computed when a request is sent, so a credential refreshed by the
/// [`CredentialManager`] is picked up by the next request without reconnecting.
pub struct FronteggTransport {
    inner: Box<dyn McpTransport>,
    credentials: Arc<CredentialManager>,
    context: Arc<ContextStore>,
}

impl std::fmt::Debug for FronteggTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FronteggTransport")
            .field("credentials", &self.credentials)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl FronteggTransport {
    /// Wrap `inner` so every request carries the token from `credentials` and the
    /// identity held by `context`.
    pub fn new(
        inner: Box<dyn McpTransport>,
        credentials: Arc<CredentialManager>,
        context: Arc<ContextStore>,
    ) -> Self {
        Self {
            inner,
            credentials,
            context,
        }
    }

    /// Headers for a request sent under `context`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::MissingCredential`] before the first token has been
    /// issued, [`ClientError::InvalidHeader`] for unsendable context values.
    pub async fn headers_for(&self, context: &RequestContext) -> Result<HeaderMap> {
        let token = self
            .credentials
            .current_token()
            .await
            .ok_or(ClientError::MissingCredential)?;
        let session_id = self.inner.session_id().await;
        let base = self.inner.request_headers().await;

        build_headers(&token, context, session_id.as_deref(), base)
    }

    /// Headers for a request sent under the shared context.
    ///
    /// # Errors
    ///
    /// See [`headers_for`](Self::headers_for).
    pub async fn current_headers(&self) -> Result<HeaderMap> {
        let context = self.context.current_context().await;
        self.headers_for(&context).await
    }

    /// Perform the handshake of the wrapped transport.
    ///
    /// # Errors
    ///
    /// Returns header construction errors and whatever the transport raises.
    pub async fn connect(&self) -> Result<()> {
        let headers = self.current_headers().await?;
        self.inner.connect(headers).await?;
        debug!("MCP transport connected");
        Ok(())
    }

    /// List tools under the shared context.
    ///
    /// # Errors
    ///
    /// Returns header construction errors and whatever the transport raises.
    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        let headers = self.current_headers().await?;
        self.inner.list_tools(headers).await
    }

    /// Call a tool under the shared context.
    ///
    /// # Errors
    ///
    /// Returns header construction errors and whatever the transport raises.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<CallToolResult> {
        let headers = self.current_headers().await?;
        self.inner.call_tool(name, arguments, headers).await
    }

    /// Call a tool under an explicit context, ignoring the shared one.
    ///
    /// # Errors
    ///
    /// Returns header construction errors and whatever the transport raises.
    pub async fn call_tool_with_context(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
        context: &RequestContext,
    ) -> Result<CallToolResult> {
        let headers = self.headers_for(context).await?;
        self.inner.call_tool(name, arguments, headers).await
    }

    /// Terminate the session of the wrapped transport.
    ///
    /// # Errors
    ///
    /// Returns header construction errors and whatever the transport raises.
    pub async fn close(&self) -> Result<()> {
        let headers = self.current_headers().await?;
        self.inner.close(headers).await
    }

    /// Session id of the wrapped transport.
    pub async fn session_id(&self) -> Option<String> {
        self.inner.session_id().await
    }
}


#[cfg(test)]
mod proptests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn printable_context_values_are_sent_verbatim(
            tenant in "[!-~]{1,40}",
            user in "[!-~]{1,40}",
        ) {
            let context = RequestContext::new("a1").with_tenant(tenant.clone()).with_user(Some(user.clone()));
            let headers = build_headers(
                &SecretString::new("abc".into()),
                &context,
                None,
                HeaderMap::new(),
            )
            .unwrap();

            prop_assert_eq!(headers["tenant-id"].to_str().unwrap(), tenant.as_str());
            prop_assert_eq!(headers["user-id"].to_str().unwrap(), user.as_str());
        }

        #[test]
        fn control_characters_are_rejected(
            prefix in "[a-z]{0,10}",
            suffix in "[a-z]{0,10}",
            control in prop::sample::select(vec!['\n', '\r', '\0', '\x7f']),
        ) {
            let context = RequestContext::new("a1")
                .with_tenant("t1")
                .with_user(Some(format!("{prefix}{control}{suffix}")));
            let result = build_headers(
                &SecretString::new("abc".into()),
                &context,
                None,
                HeaderMap::new(),
            );

            prop_assert!(matches!(result, Err(ClientError::InvalidHeader { name: "user-id" })), "expected InvalidHeader for user-id");
        }
    }
}
