//! Command-line and environment configuration.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use testbot_ci::PipelineConfig;

pub const DEFAULT_MAINLINE_REF: &str = "refs/heads/main";

#[derive(Debug, Clone, Parser)]
#[command(name = "testbotd", version, about = "Push-triggered integration test runner")]
pub struct Cli {
    /// Address to listen on; a leading ':' binds every interface
    #[arg(long, env = "LISTEN", default_value = ":4567")]
    pub listen: String,

    /// First database to migrate
    #[arg(long, env = "DB1_URL", default_value = "postgres:///core?sslmode=disable")]
    pub db1_url: String,

    /// Second database to migrate
    #[arg(long, env = "DB2_URL", default_value = "postgres:///core-2?sslmode=disable")]
    pub db2_url: String,

    /// Third database to migrate
    #[arg(long, env = "DB3_URL", default_value = "postgres:///core-3?sslmode=disable")]
    pub db3_url: String,

    /// Chat webhook receiving run notifications
    #[arg(long, env = "SLACK_WEBHOOK_URL")]
    pub slack_webhook_url: Option<String>,

    /// Source checkout the pipeline runs in
    #[arg(long, env = "CHAIN", default_value = ".")]
    pub source_dir: PathBuf,

    /// Ref whose pushes trigger a run
    #[arg(long, env = "MAINLINE_REF", default_value = DEFAULT_MAINLINE_REF)]
    pub mainline_ref: String,

    /// Per-step timeout in seconds (0 = none)
    #[arg(long, env = "STEP_TIMEOUT_SECS", default_value_t = 0)]
    pub step_timeout_secs: u64,

    /// Emit JSON-formatted log lines
    #[arg(long, env = "TESTBOT_LOG_JSON")]
    pub json: bool,
}

/// Resolved configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub listen: SocketAddr,
    pub webhook_url: Option<String>,
    pub mainline_ref: String,
    pub pipeline: PipelineConfig,
}

impl BotConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let listen = parse_listen(&cli.listen)?;
        let webhook_url = cli
            .slack_webhook_url
            .as_ref()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());

        Ok(Self {
            listen,
            webhook_url,
            mainline_ref: cli.mainline_ref.clone(),
            pipeline: PipelineConfig {
                source_dir: cli.source_dir.clone(),
                database_urls: [
                    cli.db1_url.clone(),
                    cli.db2_url.clone(),
                    cli.db3_url.clone(),
                ],
                step_timeout_secs: cli.step_timeout_secs,
            },
        })
    }
}

/// Parse a listen address, accepting the `:port` shorthand.
pub fn parse_listen(listen: &str) -> Result<SocketAddr> {
    let listen = listen.trim();
    let full = if listen.starts_with(':') {
        format!("0.0.0.0{listen}")
    } else {
        listen.to_string()
    };
    full.parse()
        .with_context(|| format!("invalid listen address: {listen}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_listen_port_only() {
        let addr = parse_listen(":4567").expect("parse");
        assert_eq!(addr, "0.0.0.0:4567".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_parse_listen_full() {
        let addr = parse_listen("127.0.0.1:8080").expect("parse");
        assert_eq!(addr.port(), 8080);
        assert!(addr.ip().is_loopback());
    }

    #[test]
    fn test_parse_listen_invalid() {
        assert!(parse_listen("not-an-address").is_err());
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from([
            "testbotd",
            "--listen",
            "127.0.0.1:9000",
            "--db2-url",
            "postgres:///other",
            "--source-dir",
            "/src/chain",
            "--slack-webhook-url",
            "https://hooks.example.com/T000",
            "--step-timeout-secs",
            "600",
        ])
        .expect("parse");

        let config = BotConfig::from_cli(&cli).expect("config");
        assert_eq!(config.listen.port(), 9000);
        assert_eq!(config.pipeline.database_urls[1], "postgres:///other");
        assert_eq!(config.pipeline.source_dir, PathBuf::from("/src/chain"));
        assert_eq!(config.pipeline.step_timeout_secs, 600);
        assert_eq!(
            config.webhook_url.as_deref(),
            Some("https://hooks.example.com/T000")
        );
    }

    #[test]
    fn test_blank_webhook_url_disables_delivery() {
        let cli = Cli::try_parse_from(["testbotd", "--slack-webhook-url", "  "]).expect("parse");
        let config = BotConfig::from_cli(&cli).expect("config");
        assert!(config.webhook_url.is_none());
    }
}
