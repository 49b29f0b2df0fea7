//!
//! authgate server binary
//! ----------------------
//! Command-line entry point for the authentication service. Configuration
//! comes from environment variables (see `authgate::config`); `--port`
//! overrides `AUTHGATE_HTTP_PORT`.

use anyhow::{Context, Result};
use std::env;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use authgate::redact::{RedactingMakeWriter, Redactor};
use authgate::AuthConfig;

fn parse_port_arg(args: &[String], flag: &str) -> Option<u16> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag
            && i + 1 < args.len() {
                return args[i + 1].parse::<u16>().ok();
            }
        i += 1;
    }
    None
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("Usage: authgate_server [--port <u16>]");
        println!("Env: AUTHGATE_HTTP_PORT, SESSION_NAME, AUTH_TYPE, AUTH_SESSION_BACKEND, AUTH_EXCLUDED_PATHS, AUTH_PII_FIELDS, RUST_LOG");
        return Ok(());
    }

    let mut cfg = AuthConfig::from_env().context("While reading configuration from the environment")?;
    if let Some(p) = parse_port_arg(&args, "--port") {
        cfg.http_port = p;
    }

    // Init logging; every line passes through the PII redactor
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("invalid log filter")?;
    let writer = RedactingMakeWriter::new(std::io::stdout, Redactor::new(cfg.pii_fields.iter().cloned()));
    fmt().with_env_filter(filter).with_ansi(false).with_writer(writer).init();

    let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "authgate",
        "authgate starting: RUST_LOG='{}', http_port={}, session_name={:?}",
        rust_log, cfg.http_port, cfg.session_name
    );

    authgate::server::run(cfg).await
}
