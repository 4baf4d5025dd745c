//! Shared request context.

use frontegg_ai_common::RequestContext;
use log::{debug, error};
use secrecy::SecretString;
use tokio::sync::RwLock;

use crate::error::{ClientError, Result};

/// Holds the identity context used by requests that do not carry their own.
///
/// Last write wins. Requests that must not observe concurrent updates should take
/// a [`snapshot`](Self::current_context) and send with it explicitly.
#[derive(Debug)]
pub struct ContextStore {
    agent_id: String,
    context: RwLock<RequestContext>,
}

impl ContextStore {
    /// Empty context bound to `agent_id` for its whole lifetime.
    pub fn new(agent_id: impl Into<String>) -> Self {
        let agent_id = agent_id.into();
        Self {
            context: RwLock::new(RequestContext::new(agent_id.clone())),
            agent_id,
        }
    }

    /// The agent id fixed at construction.
    #[must_use]
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Replace tenant and user.
    ///
    /// An end-user token stored for a different tenant or user is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AgentIdMismatch`] if `agent_id` differs from the one
    /// the store was created with.
    pub async fn set_context(
        &self,
        agent_id: &str,
        tenant_id: &str,
        user_id: Option<&str>,
    ) -> Result<()> {
        if agent_id != self.agent_id {
            error!(
                "Rejecting context update for agent '{agent_id}', client is bound to '{}'",
                self.agent_id
            );
            return Err(ClientError::AgentIdMismatch {
                expected: self.agent_id.clone(),
                actual: agent_id.to_string(),
            });
        }

        let mut context = self.context.write().await;
        if !context.same_principal(Some(tenant_id), user_id) {
            if context.end_user_token.take().is_some() {
                debug!("Principal changed, dropping stored end-user token");
            }
            context.tenant_id = Some(tenant_id.to_string());
            context.user_id = user_id.map(ToString::to_string);
        }
        Ok(())
    }

    /// Set or clear the end-user token for the current tenant and user.
    pub async fn set_end_user_token(&self, token: Option<SecretString>) {
        self.context.write().await.end_user_token = token;
    }

    /// A copy of the current context.
    pub async fn current_context(&self) -> RequestContext {
        self.context.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use secrecy::ExposeSecret;

    #[tokio::test]
    async fn test_initial_context_has_only_agent() {
        let store = ContextStore::new("a1");
        let ctx = store.current_context().await;
        assert_eq!(ctx.agent_id, "a1");
        assert!(ctx.tenant_id.is_none());
        assert!(ctx.user_id.is_none());
    }

    #[tokio::test]
    async fn test_set_context_replaces_tenant_and_user() {
        let store = ContextStore::new("a1");
        store.set_context("a1", "t1", Some("u1")).await.unwrap();
        store.set_context("a1", "t2", None).await.unwrap();

        let ctx = store.current_context().await;
        assert_eq!(ctx.tenant_id.as_deref(), Some("t2"));
        assert!(ctx.user_id.is_none());
    }

    #[tokio::test]
    async fn test_divergent_agent_is_rejected() {
        let store = ContextStore::new("a1");
        let err = store.set_context("a2", "t1", None).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::AgentIdMismatch { ref expected, ref actual } if expected == "a1" && actual == "a2"
        ));
        assert!(store.current_context().await.tenant_id.is_none());
    }

    #[tokio::test]
    async fn test_end_user_token_dropped_on_principal_change() {
        let store = ContextStore::new("a1");
        store.set_context("a1", "t1", Some("u1")).await.unwrap();
        store
            .set_end_user_token(Some(SecretString::new("jwt".into())))
            .await;

        store.set_context("a1", "t1", Some("u1")).await.unwrap();
        assert_eq!(
            store
                .current_context()
                .await
                .end_user_token
                .unwrap()
                .expose_secret(),
            "jwt"
        );

        store.set_context("a1", "t2", Some("u1")).await.unwrap();
        assert!(store.current_context().await.end_user_token.is_none());
    }
}
