use secrecy::SecretString;

/// Identity attributes attached to every outbound tool request.
///
/// `agent_id` is fixed when a client is built. The remaining fields describe who a
/// call is made on behalf of and may change from one call to the next.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Agent the client acts for. Sent as `agent-id`.
    pub agent_id: String,
    /// Tenant scope of the call. Sent as `tenant-id` once set.
    pub tenant_id: Option<String>,
    /// End user the call is made for. Sent as `user-id`.
    pub user_id: Option<String>,
    /// Raw end-user access token. Sent as `frontegg-user-access-token`.
    pub end_user_token: Option<SecretString>,
}

impl RequestContext {
    /// Context with only the agent set.
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            tenant_id: None,
            user_id: None,
            end_user_token: None,
        }
    }

    /// Sets the tenant.
    #[must_use]
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Sets or clears the user.
    #[must_use]
    pub fn with_user(mut self, user_id: Option<impl Into<String>>) -> Self {
        self.user_id = user_id.map(Into::into);
        self
    }

    /// Sets the end-user access token.
    #[must_use]
    pub fn with_end_user_token(mut self, token: impl Into<String>) -> Self {
        self.end_user_token = Some(SecretString::new(token.into().into()));
        self
    }

    /// Whether this context already addresses the given tenant and user.
    #[must_use]
    pub fn same_principal(&self, tenant_id: Option<&str>, user_id: Option<&str>) -> bool {
        self.tenant_id.as_deref() == tenant_id && self.user_id.as_deref() == user_id
    }
}
