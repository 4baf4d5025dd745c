//! The client facade.
//!
//! [`FronteggAiClient`] ties the credential manager, the context store, the tool
//! transport and the identity verifier together. Build one explicitly with
//! [`FronteggAiClient::builder`], or share a process-wide instance through
//! [`FronteggAiClient::get_instance`].

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use frontegg_ai_common::{AuthenticatedUser, ClientConfig, Endpoints, RequestContext, TokenKind};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use log::{debug, error, info, warn};
use rmcp::model::{CallToolResult, JsonObject, Tool};
use secrecy::SecretString;
use serde_json::Value;
use tokio::sync::{OnceCell, RwLock};

use crate::context::ContextStore;
use crate::credentials::{Clock, CredentialManager, SystemClock};
use crate::error::{ClientError, Result};
use crate::identity::{FronteggIdentityVerifier, IdentityVerifier};
use crate::transport::{FronteggTransport, McpTransport, StreamableHttpTransport};

type InitAttempt =
    Shared<BoxFuture<'static, std::result::Result<Arc<FronteggAiClient>, Arc<ClientError>>>>;

static INSTANCE: OnceCell<Arc<FronteggAiClient>> = OnceCell::const_new();
/// The initialization in flight, cleared once it settles.
static PENDING: Mutex<Option<InitAttempt>> = Mutex::new(None);
static INSTANCE_STATE: AtomicU8 = AtomicU8::new(ClientState::Uninitialized as u8);

/// Lifecycle of the shared instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientState {
    /// No initialization attempted yet.
    Uninitialized = 0,
    /// Credential issuance and transport handshake in progress.
    Connecting = 1,
    /// Initialized and usable.
    Ready = 2,
    /// The last initialization attempt failed. The next `get_instance` retries.
    Failed = 3,
}

impl ClientState {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Ready,
            3 => Self::Failed,
            _ => Self::Uninitialized,
        }
    }
}

fn set_instance_state(state: ClientState) {
    INSTANCE_STATE.store(state as u8, Ordering::SeqCst);
}

/// Build the HTTP client shared by all collaborators.
///
/// # Errors
///
/// Returns [`ClientError::Network`] if the client cannot be constructed.
pub fn build_http_client(config: &ClientConfig) -> Result<reqwest::Client> {
    let client = match config.timeout() {
        Some(timeout) => reqwest::Client::builder().timeout(timeout).build()?,
        None => reqwest::Client::builder().build()?,
    };
    Ok(client)
}

/// Explicit construction of a [`FronteggAiClient`].
///
/// Every collaborator defaults to the Frontegg implementation for the configured
/// environment.
pub struct ClientBuilder {
    config: ClientConfig,
    transport: Option<Box<dyn McpTransport>>,
    identity: Option<Arc<dyn IdentityVerifier>>,
    clock: Option<Arc<dyn Clock>>,
    http: Option<reqwest::Client>,
    staging: Option<bool>,
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("config", &self.config)
            .field("custom_transport", &self.transport.is_some())
            .field("custom_identity", &self.identity.is_some())
            .field("staging", &self.staging)
            .finish_non_exhaustive()
    }
}

impl ClientBuilder {
    /// Use a custom tool transport instead of [`StreamableHttpTransport`].
    #[must_use]
    pub fn with_transport(mut self, transport: impl McpTransport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Use a custom identity verifier instead of [`FronteggIdentityVerifier`].
    #[must_use]
    pub fn with_identity_verifier(mut self, identity: Arc<dyn IdentityVerifier>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Use a custom clock for credential expiry.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use a preconfigured HTTP client.
    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Force the staging switch on or off instead of reading the environment.
    #[must_use]
    pub const fn with_staging(mut self, staging: bool) -> Self {
        self.staging = Some(staging);
        self
    }

    /// Issue the first service credential and connect the tool transport.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Configuration`] for an invalid configuration,
    /// [`ClientError::Authentication`] if the credential cannot be issued, and any
    /// error raised by the transport handshake.
    pub async fn connect(self) -> Result<FronteggAiClient> {
        self.config
            .validate()
            .map_err(|e| ClientError::Configuration(e.to_string()))?;

        let endpoints = self.staging.map_or_else(
            || self.config.endpoints(),
            |staging| self.config.endpoints_with_staging(staging),
        );
        let http = match self.http {
            Some(http) => http,
            None => build_http_client(&self.config)?,
        };
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let credentials = Arc::new(
            CredentialManager::new(
                http.clone(),
                endpoints.vendor_auth_url(),
                self.config.client_id.clone(),
                self.config.client_secret.clone(),
                clock,
            )
            .with_skew(self.config.refresh_skew()),
        );
        credentials.ensure_fresh().await.inspect_err(|e| {
            error!("Failed to issue initial service credential: {e}");
        })?;

        let inner = self.transport.unwrap_or_else(|| {
            Box::new(StreamableHttpTransport::new(
                http.clone(),
                endpoints.mcp_server_url.clone(),
            ))
        });
        let context = Arc::new(ContextStore::new(self.config.agent_id.clone()));
        let transport = FronteggTransport::new(inner, Arc::clone(&credentials), Arc::clone(&context));
        transport.connect().await.inspect_err(|e| {
            error!("Failed to connect to {}: {e}", endpoints.mcp_server_url);
        })?;

        let identity = self.identity.unwrap_or_else(|| {
            Arc::new(FronteggIdentityVerifier::new(
                http,
                endpoints.identity_url(),
                Arc::clone(&credentials),
            ))
        });

        info!(
            "Frontegg AI client connected for agent {} at {}",
            self.config.agent_id, endpoints.mcp_server_url
        );

        Ok(FronteggAiClient {
            config: self.config,
            endpoints,
            credentials,
            context,
            transport,
            identity,
            user: RwLock::new(None),
        })
    }
}

/// Client for Frontegg AI agent tools.
pub struct FronteggAiClient {
    config: ClientConfig,
    endpoints: Endpoints,
    credentials: Arc<CredentialManager>,
    context: Arc<ContextStore>,
    transport: FronteggTransport,
    identity: Arc<dyn IdentityVerifier>,
    user: RwLock<Option<AuthenticatedUser>>,
}

impl std::fmt::Debug for FronteggAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FronteggAiClient")
            .field("agent_id", &self.config.agent_id)
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

impl FronteggAiClient {
    /// Start building a client for `config`.
    #[must_use]
    pub const fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder {
            config,
            transport: None,
            identity: None,
            clock: None,
            http: None,
            staging: None,
        }
    }

    /// The process-wide shared client.
    ///
    /// The first call connects a client for `config`; concurrent first calls join
    /// that single attempt and all see its outcome. A failed attempt is not
    /// remembered, so a call made after it settles tries again. Once connected,
    /// `config` is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Initialization`] wrapping the error of the attempt
    /// this call joined.
    pub async fn get_instance(config: ClientConfig) -> Result<Arc<Self>> {
        if let Some(client) = INSTANCE.get() {
            return Ok(Arc::clone(client));
        }

        let attempt = {
            let mut pending = PENDING.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(client) = INSTANCE.get() {
                return Ok(Arc::clone(client));
            }
            match pending.as_ref() {
                Some(attempt) => attempt.clone(),
                None => {
                    let attempt = Self::initialize(config).boxed().shared();
                    *pending = Some(attempt.clone());
                    attempt
                }
            }
        };

        attempt.await.map_err(ClientError::Initialization)
    }

    async fn initialize(
        config: ClientConfig,
    ) -> std::result::Result<Arc<Self>, Arc<ClientError>> {
        set_instance_state(ClientState::Connecting);
        let outcome = Self::builder(config).connect().await.map(Arc::new);

        {
            let mut pending = PENDING.lock().unwrap_or_else(PoisonError::into_inner);
            match &outcome {
                Ok(client) => {
                    if INSTANCE.set(Arc::clone(client)).is_err() {
                        warn!("Shared Frontegg AI client was already set");
                    }
                    set_instance_state(ClientState::Ready);
                }
                Err(e) => {
                    error!("Failed to initialize Frontegg AI client: {e}");
                    set_instance_state(ClientState::Failed);
                }
            }
            *pending = None;
        }

        outcome.map_err(Arc::new)
    }

    /// State of the shared instance.
    #[must_use]
    pub fn instance_state() -> ClientState {
        ClientState::from_u8(INSTANCE_STATE.load(Ordering::SeqCst))
    }

    /// The configuration this client was built from.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Resolved service endpoints.
    #[must_use]
    pub const fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    async fn ensure_fresh(&self) -> Result<()> {
        self.credentials.ensure_fresh().await.inspect_err(|e| {
            error!("Failed to refresh service credential: {e}");
        })
    }

    /// List the tools available to this agent.
    ///
    /// Sent under the shared context.
    ///
    /// # Errors
    ///
    /// Returns credential refresh failures and transport errors unchanged.
    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        self.ensure_fresh().await?;
        self.transport.list_tools().await.inspect_err(|e| {
            error!("Failed to list tools: {e}");
        })
    }

    /// Invoke `tool_id` for `tenant_id` (and optionally `user_id`).
    ///
    /// The tenant and user become the shared context, and this call is sent with
    /// a private copy of it so concurrent calls cannot change its headers.
    /// `input` must be a JSON object or `null`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidInput`] for non-object input, credential
    /// refresh failures and transport errors unchanged.
    pub async fn call_tool(
        &self,
        tool_id: &str,
        input: Value,
        tenant_id: &str,
        user_id: Option<&str>,
    ) -> Result<CallToolResult> {
        let result = self.call_tool_inner(tool_id, input, tenant_id, user_id).await;
        if let Err(e) = &result {
            error!("Failed to call tool {tool_id}: {e}");
        }
        result
    }

    async fn call_tool_inner(
        &self,
        tool_id: &str,
        input: Value,
        tenant_id: &str,
        user_id: Option<&str>,
    ) -> Result<CallToolResult> {
        let arguments = tool_arguments(input)?;
        self.credentials.ensure_fresh().await?;
        self.context
            .set_context(&self.config.agent_id, tenant_id, user_id)
            .await?;

        let stored = self.context.current_context().await;
        let mut context = RequestContext::new(self.config.agent_id.clone())
            .with_tenant(tenant_id)
            .with_user(user_id);
        if stored.same_principal(Some(tenant_id), user_id) {
            context.end_user_token = stored.end_user_token;
        }

        debug!("Calling tool {tool_id} for tenant {tenant_id}");
        self.transport
            .call_tool_with_context(tool_id, arguments, &context)
            .await
    }

    /// Set the shared tenant and user.
    ///
    /// # Errors
    ///
    /// See [`ContextStore::set_context`].
    pub async fn set_context(&self, tenant_id: &str, user_id: Option<&str>) -> Result<()> {
        self.context
            .set_context(&self.config.agent_id, tenant_id, user_id)
            .await
    }

    /// Set or clear the end-user token forwarded with requests.
    pub async fn set_end_user_token(&self, token: Option<&str>) {
        self.context
            .set_end_user_token(token.map(|t| SecretString::new(t.into())))
            .await;
    }

    /// A copy of the shared context.
    pub async fn current_context(&self) -> RequestContext {
        self.context.current_context().await
    }

    /// Verify an end-user token and bind its identity.
    ///
    /// User tokens bind tenant and user and make the user available to
    /// [`render_context_preamble`](Self::render_context_preamble). Other tokens
    /// bind only the tenant. Returns `false` if the token cannot be verified.
    pub async fn authenticate_end_user(&self, token: &str) -> bool {
        let verified = match self.identity.validate_token(token).await {
            Ok(verified) => verified,
            Err(e) => {
                warn!("End-user token verification failed: {e}");
                return false;
            }
        };

        let tenant_id = verified.tenant_id.clone();
        let bound = match verified.kind {
            TokenKind::User => {
                let subject = verified.sub.clone();
                let bound = self
                    .context
                    .set_context(&self.config.agent_id, &tenant_id, Some(&subject))
                    .await;
                *self.user.write().await = verified.into_authenticated_user();
                bound
            }
            TokenKind::Machine => {
                *self.user.write().await = None;
                self.context
                    .set_context(&self.config.agent_id, &tenant_id, None)
                    .await
            }
        };

        match bound {
            Ok(()) => {
                debug!("Bound end-user context for tenant {tenant_id}");
                true
            }
            Err(e) => {
                warn!("Could not bind verified identity: {e}");
                false
            }
        }
    }

    /// The verified user, if one is bound.
    pub async fn authenticated_user(&self) -> Option<AuthenticatedUser> {
        self.user.read().await.clone()
    }

    /// Forget the verified user.
    pub async fn clear_authenticated_user(&self) {
        *self.user.write().await = None;
    }

    /// Prepend the verified user context to `prompt`.
    ///
    /// Without a verified user the prompt is returned unchanged.
    pub async fn render_context_preamble(&self, prompt: &str) -> String {
        self.user
            .read()
            .await
            .as_ref()
            .map_or_else(|| prompt.to_string(), |user| user.render_preamble(prompt))
    }

    /// Terminate the tool session.
    ///
    /// # Errors
    ///
    /// Returns transport errors unchanged.
    pub async fn close(&self) -> Result<()> {
        self.transport.close().await.inspect_err(|e| {
            error!("Failed to close MCP session: {e}");
        })
    }
}

fn tool_arguments(input: Value) -> Result<Option<JsonObject>> {
    match input {
        Value::Object(map) => Ok(Some(map)),
        Value::Null => Ok(None),
        other => Err(ClientError::InvalidInput(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}
