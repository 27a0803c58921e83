//! Demo extension binary.
//!
//! Connects to the hub described by `TALKOPS_TOKEN`, exposes an `echo`
//! function, logs inbound messages, and runs until interrupted.

use clap::Parser;
use serde_json::{json, Value};
use talkops::types::LoggingConfig;
use talkops::{Config, Extension, Handler, Parameter};

#[derive(Debug, Parser)]
#[command(name = "talkops-extension", about = "Run a demo TalkOps extension")]
struct Cli {
    /// Base64 connection descriptor issued by the hub.
    #[arg(long, env = "TALKOPS_TOKEN", hide_env_values = true)]
    token: String,

    /// Extension name reported in state.
    #[arg(long, default_value = "Echo")]
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = Config::from_token(&cli.token)?;
    config.logging = LoggingConfig::from_env();
    talkops::observability::init_tracing(&config.logging);

    let extension = Extension::new(config)
        .with_metadata("name", json!(cli.name))
        .with_parameters(vec![Parameter::new("GREETING")?
            .with_description("Greeting logged at startup")?
            .with_default_value("echo")?
            .optional(true)])
        .with_function(
            "echo",
            Handler::from_blocking(|args| {
                let text = args.get("text").and_then(Value::as_str).unwrap_or_default();
                Some(json!(text))
            }),
        )?
        .on(
            "message",
            Handler::from_async(|args| async move {
                tracing::info!("message received: {}", serde_json::Value::Object(args));
                None
            }),
        )?;

    let running = extension.start_http().await;
    tracing::info!("🚀 Extension running, press Ctrl-C to stop");
    tracing::info!(
        "  ✓ GREETING={}",
        running.parameters().get_value("GREETING").unwrap_or_default()
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    drop(running);
    Ok(())
}
