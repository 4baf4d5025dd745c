use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use log::info;

use frontegg_ai_client::backoff::{RetryPolicy, retry};
use frontegg_ai_client::{ClientError, FronteggAiClient};
use frontegg_ai_common::ClientConfig;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a client configuration file (TOML, JSON, or YAML).
    /// Falls back to FRONTEGG_* environment variables.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Tenant the call is made for
    #[arg(long, env = "FRONTEGG_TENANT_ID")]
    tenant_id: String,

    /// End user the call is made for
    #[arg(long)]
    user_id: Option<String>,

    /// End-user JWT to verify before calling the tool
    #[arg(long, env = "FRONTEGG_USER_JWT")]
    user_jwt: Option<String>,

    /// Tool to invoke. Lists the available tools when omitted.
    #[arg(long)]
    tool: Option<String>,

    /// Tool input as a JSON object
    #[arg(long, default_value = "{}")]
    input: String,

    /// Attempts for retryable failures
    #[arg(long, default_value_t = 3)]
    attempts: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::from_env()?,
    };
    info!("Connecting agent {} ({})", config.agent_id, config.environment);

    let client = FronteggAiClient::get_instance(config).await?;

    if let Some(jwt) = &args.user_jwt {
        if client.authenticate_end_user(jwt).await {
            println!("{}", client.render_context_preamble("You are a helpful agent.").await);
        } else {
            println!("End-user token could not be verified");
        }
    }

    let Some(tool) = &args.tool else {
        for tool in client.list_tools().await? {
            println!(
                "{}: {}",
                tool.name,
                tool.description.as_deref().unwrap_or("")
            );
        }
        return Ok(());
    };

    let input: serde_json::Value = serde_json::from_str(&args.input)?;
    let policy = RetryPolicy::new(args.attempts)
        .with_base_delay(Duration::from_millis(500))
        .with_should_retry(ClientError::is_retryable);

    let result = retry("call_tool", &policy, || {
        client.call_tool(tool, input.clone(), &args.tenant_id, args.user_id.as_deref())
    })
    .await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    client.close().await?;
    Ok(())
}
