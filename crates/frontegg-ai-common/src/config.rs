//! Client configuration.
//!
//! A [`ClientConfig`] names the Frontegg region the client talks to, the agent it
//! acts for, and the vendor credentials used to obtain a service token. Everything
//! else (endpoint URLs, issuance and identity paths) is derived from it.
//!
//! ## Example TOML Configuration
//!
//! ```toml
//! environment = "us"
//! agent_id = "agent-123"
//! client_id = "vendor-client-id"
//! client_secret = "vendor-secret"
//! timeout_seconds = 30
//! ```
//!
//! ## Staging
//!
//! Setting `FRONTEGG_AI_AGENTS_STG_OVERRIDE=true` in the process environment points
//! both endpoints at Frontegg's staging stack regardless of `environment`. Explicit
//! `api_base_url` / `mcp_server_url` values win over both.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Environment variable that switches both endpoints to staging.
pub const STAGING_OVERRIDE_ENV: &str = "FRONTEGG_AI_AGENTS_STG_OVERRIDE";

const STAGING_API_URL: &str = "https://api.stg.frontegg.com";
const STAGING_MCP_URL: &str = "https://mcp.stg.frontegg.com/mcp/v1";

/// Frontegg region. Selects the base domain of both service endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum Environment {
    /// `frontegg.com`
    #[default]
    Eu,
    /// `us.frontegg.com`
    Us,
    /// `ca.frontegg.com`
    Ca,
    /// `au.frontegg.com`
    Au,
    /// `uk.frontegg.com`
    Uk,
}

impl Environment {
    /// Base domain for this region.
    #[must_use]
    pub const fn domain(self) -> &'static str {
        match self {
            Self::Eu => "frontegg.com",
            Self::Us => "us.frontegg.com",
            Self::Ca => "ca.frontegg.com",
            Self::Au => "au.frontegg.com",
            Self::Uk => "uk.frontegg.com",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eu => write!(f, "eu"),
            Self::Us => write!(f, "us"),
            Self::Ca => write!(f, "ca"),
            Self::Au => write!(f, "au"),
            Self::Uk => write!(f, "uk"),
        }
    }
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    /// Accepts either the short region name or the region's domain.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eu" | "frontegg.com" => Ok(Self::Eu),
            "us" | "us.frontegg.com" => Ok(Self::Us),
            "ca" | "ca.frontegg.com" => Ok(Self::Ca),
            "au" | "au.frontegg.com" => Ok(Self::Au),
            "uk" | "uk.frontegg.com" => Ok(Self::Uk),
            other => anyhow::bail!("Unknown Frontegg environment: {other}"),
        }
    }
}

/// Resolved service endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// MCP tool-invocation endpoint.
    pub mcp_server_url: String,
    /// Frontegg API base, parent of the vendor auth and identity services.
    pub api_base_url: String,
}

impl Endpoints {
    /// Production endpoints for a region.
    #[must_use]
    pub fn for_environment(environment: Environment) -> Self {
        let domain = environment.domain();
        Self {
            mcp_server_url: format!("https://mcp.{domain}/mcp/v1"),
            api_base_url: format!("https://api.{domain}"),
        }
    }

    /// Frontegg staging endpoints.
    #[must_use]
    pub fn staging() -> Self {
        Self {
            mcp_server_url: STAGING_MCP_URL.to_string(),
            api_base_url: STAGING_API_URL.to_string(),
        }
    }

    /// Vendor token issuance URL (`{api}/auth/vendor/`).
    #[must_use]
    pub fn vendor_auth_url(&self) -> String {
        format!("{}/auth/vendor/", self.api_base_url.trim_end_matches('/'))
    }

    /// Identity service base URL (`{api}/identity`).
    #[must_use]
    pub fn identity_url(&self) -> String {
        format!("{}/identity", self.api_base_url.trim_end_matches('/'))
    }
}

/// Configuration for a Frontegg AI client.
///
/// The client secret is held as a [`SecretString`] and is never printed by the
/// `Debug` implementation.
///
/// # Examples
///
/// ```
/// use frontegg_ai_common::{ClientConfig, Environment};
///
/// let config = ClientConfig::builder()
///     .environment(Environment::Us)
///     .agent_id("agent-123")
///     .client_id("vendor-client-id")
///     .client_secret("vendor-secret")
///     .build();
///
/// assert_eq!(
///     config.endpoints_with_staging(false).mcp_server_url,
///     "https://mcp.us.frontegg.com/mcp/v1"
/// );
/// ```
#[derive(Debug, Clone, Deserialize, TypedBuilder)]
pub struct ClientConfig {
    /// Region selecting the default endpoints.
    #[serde(default)]
    #[builder(default)]
    pub environment: Environment,
    /// Agent this client acts for. Fixed for the lifetime of a client.
    #[builder(setter(into))]
    pub agent_id: String,
    /// Vendor client id used for token issuance.
    #[builder(setter(into))]
    pub client_id: String,
    /// Vendor secret used for token issuance.
    #[builder(setter(transform = |secret: &str| SecretString::new(secret.into())))]
    pub client_secret: SecretString,
    /// Overrides the API base derived from `environment`.
    #[serde(default)]
    #[builder(default, setter(strip_option, into))]
    pub api_base_url: Option<String>,
    /// Overrides the MCP endpoint derived from `environment`.
    #[serde(default)]
    #[builder(default, setter(strip_option, into))]
    pub mcp_server_url: Option<String>,
    /// HTTP request timeout. `None` leaves requests unbounded.
    #[serde(default)]
    #[builder(default, setter(strip_option))]
    pub timeout_seconds: Option<u64>,
    /// Treat the service token as expired this many seconds early.
    #[serde(default)]
    #[builder(default)]
    pub refresh_skew_seconds: u64,
}

impl ClientConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_yaml_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from file based on extension
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed, or has an unsupported extension.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        match path.extension().and_then(|s| s.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml_file(path),
            Some("json") => Self::from_json_file(path),
            Some("toml") => Self::from_toml_file(path),
            _ => Err(anyhow::anyhow!(
                "Unsupported config file format. Use .yaml, .yml, .json, or .toml"
            )),
        }
    }

    /// Build a configuration from the process environment.
    ///
    /// Reads `FRONTEGG_AGENT_ID`, `FRONTEGG_CLIENT_ID`, `FRONTEGG_CLIENT_SECRET` and
    /// optionally `FRONTEGG_ENVIRONMENT`, `FRONTEGG_API_URL`, `FRONTEGG_MCP_SERVER_URL`.
    ///
    /// # Errors
    /// Returns an error if a required variable is missing or a value is invalid.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    ///
    /// # Errors
    /// Returns an error if a required key is missing or a value is invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| anyhow::anyhow!("Missing required variable {key}"))
        };

        let environment = lookup("FRONTEGG_ENVIRONMENT")
            .map(|value| value.parse::<Environment>())
            .transpose()?
            .unwrap_or_default();

        let config = Self {
            environment,
            agent_id: required("FRONTEGG_AGENT_ID")?,
            client_id: required("FRONTEGG_CLIENT_ID")?,
            client_secret: SecretString::new(required("FRONTEGG_CLIENT_SECRET")?.into()),
            api_base_url: lookup("FRONTEGG_API_URL"),
            mcp_server_url: lookup("FRONTEGG_MCP_SERVER_URL"),
            timeout_seconds: lookup("FRONTEGG_TIMEOUT_SECONDS")
                .map(|value| value.parse::<u64>())
                .transpose()?,
            refresh_skew_seconds: 0,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// Returns an error if a required field is empty or a URL override does not parse.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.agent_id.trim().is_empty() {
            anyhow::bail!("agent_id must not be empty");
        }
        if self.client_id.trim().is_empty() {
            anyhow::bail!("client_id must not be empty");
        }
        if self.client_secret.expose_secret().is_empty() {
            anyhow::bail!("client_secret must not be empty");
        }

        for (name, value) in [
            ("api_base_url", &self.api_base_url),
            ("mcp_server_url", &self.mcp_server_url),
        ] {
            if let Some(value) = value
                && let Err(e) = url::Url::parse(value)
            {
                anyhow::bail!("{name} is not a valid URL ({value}): {e}");
            }
        }

        Ok(())
    }

    /// Endpoints for this configuration, honouring [`STAGING_OVERRIDE_ENV`].
    #[must_use]
    pub fn endpoints(&self) -> Endpoints {
        let staging = std::env::var(STAGING_OVERRIDE_ENV).is_ok_and(|v| v == "true");
        self.endpoints_with_staging(staging)
    }

    /// Endpoints for this configuration with the staging switch given explicitly.
    #[must_use]
    pub fn endpoints_with_staging(&self, staging: bool) -> Endpoints {
        let mut endpoints = if staging {
            log::debug!("{STAGING_OVERRIDE_ENV} is set, using staging endpoints");
            Endpoints::staging()
        } else {
            Endpoints::for_environment(self.environment)
        };

        if let Some(api) = &self.api_base_url {
            endpoints.api_base_url.clone_from(api);
        }
        if let Some(mcp) = &self.mcp_server_url {
            endpoints.mcp_server_url.clone_from(mcp);
        }

        endpoints
    }

    /// Early-expiry margin applied to the service token.
    #[must_use]
    pub const fn refresh_skew(&self) -> Duration {
        Duration::from_secs(self.refresh_skew_seconds)
    }

    /// Request timeout, if one is configured.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn base_config() -> ClientConfig {
        ClientConfig::builder()
            .agent_id("agent-1")
            .client_id("client-1")
            .client_secret("secret-1")
            .build()
    }

    #[test]
    fn test_builder_defaults() {
        let config = base_config();
        assert_eq!(config.environment, Environment::Eu);
        assert!(config.api_base_url.is_none());
        assert!(config.mcp_server_url.is_none());
        assert!(config.timeout().is_none());
        assert_eq!(config.refresh_skew(), Duration::ZERO);
    }

    #[test]
    fn test_debug_does_not_leak_secret() {
        let config = base_config();
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-1"));
    }

    #[test]
    fn test_endpoints_per_environment() {
        let cases = [
            (Environment::Eu, "https://mcp.frontegg.com/mcp/v1", "https://api.frontegg.com"),
            (Environment::Us, "https://mcp.us.frontegg.com/mcp/v1", "https://api.us.frontegg.com"),
            (Environment::Ca, "https://mcp.ca.frontegg.com/mcp/v1", "https://api.ca.frontegg.com"),
            (Environment::Au, "https://mcp.au.frontegg.com/mcp/v1", "https://api.au.frontegg.com"),
            (Environment::Uk, "https://mcp.uk.frontegg.com/mcp/v1", "https://api.uk.frontegg.com"),
        ];

        for (environment, mcp, api) in cases {
            let endpoints = Endpoints::for_environment(environment);
            assert_eq!(endpoints.mcp_server_url, mcp);
            assert_eq!(endpoints.api_base_url, api);
        }
    }

    #[test]
    fn test_derived_service_urls() {
        let endpoints = Endpoints::for_environment(Environment::Eu);
        assert_eq!(
            endpoints.vendor_auth_url(),
            "https://api.frontegg.com/auth/vendor/"
        );
        assert_eq!(endpoints.identity_url(), "https://api.frontegg.com/identity");
    }

    #[test]
    fn test_staging_switch() {
        let config = ClientConfig::builder()
            .environment(Environment::Us)
            .agent_id("agent-1")
            .client_id("client-1")
            .client_secret("secret-1")
            .build();

        let endpoints = config.endpoints_with_staging(true);
        assert_eq!(endpoints.api_base_url, "https://api.stg.frontegg.com");
        assert_eq!(
            endpoints.mcp_server_url,
            "https://mcp.stg.frontegg.com/mcp/v1"
        );
    }

    #[test]
    fn test_explicit_overrides_win_over_staging() {
        let config = ClientConfig::builder()
            .agent_id("agent-1")
            .client_id("client-1")
            .client_secret("secret-1")
            .api_base_url("http://127.0.0.1:9000/")
            .mcp_server_url("http://127.0.0.1:9001/mcp")
            .build();

        let endpoints = config.endpoints_with_staging(true);
        assert_eq!(endpoints.mcp_server_url, "http://127.0.0.1:9001/mcp");
        assert_eq!(
            endpoints.vendor_auth_url(),
            "http://127.0.0.1:9000/auth/vendor/"
        );
    }

    #[test]
    fn test_environment_from_str() {
        assert_eq!("US".parse::<Environment>().unwrap(), Environment::Us);
        assert_eq!(
            "uk.frontegg.com".parse::<Environment>().unwrap(),
            Environment::Uk
        );
        assert_eq!("frontegg.com".parse::<Environment>().unwrap(), Environment::Eu);
        assert!("mars".parse::<Environment>().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        let config = ClientConfig::builder()
            .agent_id("")
            .client_id("client-1")
            .client_secret("secret-1")
            .build();
        assert!(config.validate().is_err());

        let config = ClientConfig::builder()
            .agent_id("agent-1")
            .client_id("client-1")
            .client_secret("")
            .build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_url_override() {
        let config = ClientConfig::builder()
            .agent_id("agent-1")
            .client_id("client-1")
            .client_secret("secret-1")
            .mcp_server_url("not a url")
            .build();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("mcp_server_url"));
    }

    #[test]
    fn test_from_lookup() {
        let vars = HashMap::from([
            ("FRONTEGG_AGENT_ID", "agent-1"),
            ("FRONTEGG_CLIENT_ID", "client-1"),
            ("FRONTEGG_CLIENT_SECRET", "secret-1"),
            ("FRONTEGG_ENVIRONMENT", "au"),
            ("FRONTEGG_TIMEOUT_SECONDS", "15"),
        ]);

        let config =
            ClientConfig::from_lookup(|key| vars.get(key).map(ToString::to_string)).unwrap();
        assert_eq!(config.environment, Environment::Au);
        assert_eq!(config.agent_id, "agent-1");
        assert_eq!(config.client_secret.expose_secret(), "secret-1");
        assert_eq!(config.timeout(), Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_from_lookup_missing_required() {
        let vars = HashMap::from([("FRONTEGG_AGENT_ID", "agent-1")]);
        let err = ClientConfig::from_lookup(|key| vars.get(key).map(ToString::to_string))
            .unwrap_err()
            .to_string();
        assert!(err.contains("FRONTEGG_CLIENT_ID"));
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
environment = "ca"
agent_id = "agent-1"
client_id = "client-1"
client_secret = "secret-1"
refresh_skew_seconds = 5
"#
        )
        .unwrap();

        let config = ClientConfig::from_file(file.path()).unwrap();
        assert_eq!(config.environment, Environment::Ca);
        assert_eq!(config.refresh_skew(), Duration::from_secs(5));
        assert_eq!(config.client_secret.expose_secret(), "secret-1");
    }

    #[test]
    fn test_from_file_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(ClientConfig::from_file(file.path()).is_err());
    }
}
