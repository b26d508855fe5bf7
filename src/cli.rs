use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

use crate::config::Config;
use crate::exporter::Exporter;
use crate::metrics::PipelineMetrics;
use crate::providers::bitbucket::BitbucketProvider;
use crate::{server, shutdown};

#[derive(Parser)]
#[command(name = "bitbucket-pipelines-exporter")]
#[command(author, version, about = "Prometheus exporter for Bitbucket Pipelines", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, global = true, env = "BITBUCKET_PIPELINES_EXPORTER_WORKSPACE")]
    workspace: Option<String>,

    #[arg(short, long, global = true, env = "BITBUCKET_PIPELINES_EXPORTER_USERNAME")]
    username: Option<String>,

    #[arg(
        long,
        global = true,
        env = "BITBUCKET_PIPELINES_EXPORTER_APP_PASSWORD",
        hide_env_values = true
    )]
    app_password: Option<String>,

    #[arg(long, global = true, env = "BITBUCKET_PIPELINES_EXPORTER_BASE_URL")]
    base_url: Option<String>,

    /// Timeout for each API request, in seconds
    #[arg(long, global = true, env = "BITBUCKET_PIPELINES_EXPORTER_REQUEST_TIMEOUT")]
    request_timeout: Option<u64>,

    /// Seconds between polling cycles
    #[arg(short, long, global = true, env = "BITBUCKET_PIPELINES_EXPORTER_INTERVAL")]
    interval: Option<u64>,

    /// Address of the metrics endpoint
    #[arg(short, long, global = true, env = "BITBUCKET_PIPELINES_EXPORTER_LISTEN_ADDR")]
    listen_addr: Option<SocketAddr>,

    /// Pipeline requests in flight per cycle
    #[arg(long, global = true, env = "BITBUCKET_PIPELINES_EXPORTER_MAX_CONCURRENT_FETCHES")]
    max_concurrent_fetches: Option<usize>,

    /// Write JSON output of the listing commands to a file
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll pipelines and serve Prometheus metrics (default)
    Serve,
    /// Print the repository slugs of the workspace
    Repositories,
    /// Print the latest pipeline of one repository
    Pipeline {
        #[arg(short, long)]
        repository: String,
    },
    /// Print the workspaces the credentials can access
    Workspaces,
}

impl Cli {
    /// Load the configuration file and apply command line and environment overrides.
    fn resolve_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;

        if let Some(workspace) = &self.workspace {
            config.bitbucket.workspace = Some(workspace.clone());
        }
        if let Some(username) = &self.username {
            config.bitbucket.username = Some(username.clone());
        }
        if let Some(app_password) = &self.app_password {
            config.bitbucket.app_password = Some(app_password.clone());
        }
        if let Some(base_url) = &self.base_url {
            config.bitbucket.base_url = base_url.clone();
        }
        if let Some(request_timeout) = self.request_timeout {
            config.bitbucket.request_timeout_secs = request_timeout;
        }
        if let Some(interval) = self.interval {
            config.exporter.interval_secs = interval;
        }
        if let Some(listen_addr) = self.listen_addr {
            config.exporter.listen_addr = listen_addr;
        }
        if let Some(max_concurrent_fetches) = self.max_concurrent_fetches {
            config.exporter.max_concurrent_fetches = max_concurrent_fetches;
        }

        Ok(config)
    }

    fn provider(config: &Config, workspace: String) -> Result<BitbucketProvider> {
        let credentials = config.bitbucket.credentials()?;

        BitbucketProvider::new(
            &config.bitbucket.base_url,
            workspace,
            credentials,
            config.bitbucket.request_timeout(),
        )
        .context("Failed to create Bitbucket client")
    }

    fn write_json(&self, value: &impl Serialize) -> Result<()> {
        let json_output = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };

        if let Some(output_path) = &self.output {
            std::fs::write(output_path, json_output)
                .with_context(|| format!("Failed to write {}", output_path.display()))?;
            info!("Output written to: {}", output_path.display());
        } else {
            println!("{json_output}");
        }

        Ok(())
    }

    async fn execute_serve(&self, config: &Config) -> Result<()> {
        let provider = Self::provider(config, config.bitbucket.workspace()?.to_owned())?;

        // The repository set is fixed for the lifetime of the process.
        let repositories = provider.list_repositories().await?;
        if repositories.is_empty() {
            warn!(
                "No repositories found in workspace {}; no pipeline metrics will be published",
                provider.workspace()
            );
        }

        let metrics = Arc::new(PipelineMetrics::new()?);
        let listener = server::bind(config.exporter.listen_addr)
            .await
            .with_context(|| format!("Failed to bind {}", config.exporter.listen_addr))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = tokio::spawn(server::serve(
            listener,
            Arc::clone(&metrics),
            shutdown_rx.clone(),
        ));
        tokio::spawn(shutdown::forward_signal(shutdown_tx));

        let exporter = Exporter::new(
            provider,
            metrics,
            repositories,
            config.exporter.interval(),
            config.exporter.max_concurrent_fetches,
        );
        exporter.run(shutdown_rx).await;

        server.await.context("Metrics server task failed")??;
        info!("Exporter stopped");

        Ok(())
    }

    pub async fn execute(&self) -> Result<()> {
        let config = self.resolve_config()?;

        match &self.command {
            None | Some(Commands::Serve) => self.execute_serve(&config).await,
            Some(Commands::Repositories) => {
                let workspace = config.bitbucket.workspace()?.to_owned();
                let repositories = Self::provider(&config, workspace)?
                    .list_repositories()
                    .await?;
                self.write_json(&repositories)
            }
            Some(Commands::Pipeline { repository }) => {
                let workspace = config.bitbucket.workspace()?.to_owned();
                let latest = Self::provider(&config, workspace)?
                    .latest_pipeline(repository)
                    .await
                    .with_context(|| format!("Failed to fetch pipelines for {repository}"))?;
                self.write_json(&latest)
            }
            Some(Commands::Workspaces) => {
                // listing workspaces does not need one configured
                let workspace = config.bitbucket.workspace.clone().unwrap_or_default();
                let workspaces = Self::provider(&config, workspace)?
                    .list_workspaces()
                    .await?;
                self.write_json(&workspaces)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_missing_config_file_is_error() {
        let cli = Cli::try_parse_from([
            "bitbucket-pipelines-exporter",
            "--config",
            "nonexistent.toml",
        ])
        .unwrap();

        assert!(cli.resolve_config().is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "bitbucket-pipelines-exporter",
            "--workspace",
            "acme",
            "--username",
            "alice",
            "--app-password",
            "secret",
            "--interval",
            "30",
            "--listen-addr",
            "127.0.0.1:9000",
            "--max-concurrent-fetches",
            "4",
            "serve",
        ])
        .unwrap();
        let config = cli.resolve_config().unwrap();

        assert_eq!(config.bitbucket.workspace.as_deref(), Some("acme"));
        assert_eq!(config.bitbucket.username.as_deref(), Some("alice"));
        assert_eq!(config.exporter.interval_secs, 30);
        assert_eq!(config.exporter.listen_addr.port(), 9000);
        assert_eq!(config.exporter.max_concurrent_fetches, 4);
    }

    #[test]
    fn test_non_integer_interval_is_rejected() {
        let result = Cli::try_parse_from(["bitbucket-pipelines-exporter", "--interval", "1m"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_pipeline_subcommand_requires_repository() {
        assert!(Cli::try_parse_from(["bitbucket-pipelines-exporter", "pipeline"]).is_err());

        let cli =
            Cli::try_parse_from(["bitbucket-pipelines-exporter", "pipeline", "-r", "svc-a"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Pipeline { ref repository }) if repository == "svc-a"
        ));
    }
}
