//! Run the webhook service

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use pagewright_core::config::{CliOverrides, ProviderKind};
use pagewright_core::{
    ChatCompletionsGenerator, Config, JsonFileRegistry, LocalProvider, Materializer, Notifier,
    Orchestrator, PublishSettings, RepositoryProvider, Secrets, TaskQueue,
};
use pagewright_github::GitHubProvider;
use tracing::{info, warn};

use crate::server::{self, IntakeState};

/// Arguments for the serve command
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Address to listen on (e.g. 0.0.0.0:8000)
    #[arg(long)]
    pub bind: Option<String>,

    /// Number of pipeline workers
    #[arg(long)]
    pub workers: Option<usize>,

    /// Repository provider: github or local
    #[arg(long)]
    pub provider: Option<ProviderKind>,

    /// Directory holding repository working copies
    #[arg(long)]
    pub workspace_dir: Option<PathBuf>,
}

impl ServeArgs {
    /// Flags that override the loaded configuration
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            bind: self.bind.clone(),
            workers: self.workers,
            provider: self.provider,
            workspace_dir: self.workspace_dir.clone(),
        }
    }

    /// Execute the serve command
    pub async fn execute(&self, config: &Config, secrets: &Secrets) -> anyhow::Result<()> {
        let secret = secrets.app_secret().context(
            "App secret not found. Set APP_SECRET environment variable \
             or add [app] secret to ~/.config/pagewright/secrets.toml",
        )?;

        let provider = build_provider(config, secrets).await?;
        info!(provider = provider.name(), "Using repository provider");

        let registry = JsonFileRegistry::open(&config.storage.registry_path)
            .with_context(|| {
                format!(
                    "Failed to open task registry at {}",
                    config.storage.registry_path.display()
                )
            })?;

        let api_key = secrets.llm_api_key();
        if api_key.is_none() {
            warn!("No LLM API key configured; generator requests will be unauthenticated");
        }
        let generator = ChatCompletionsGenerator::from_config(&config.generator, api_key)?;

        let materializer = Materializer::new(
            provider,
            config.storage.workspace_dir.clone(),
            PublishSettings::from_config(&config.provider, &config.publish),
        );
        let notifier = Notifier::from_config(&config.notifier)?;

        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(registry),
            Arc::new(generator),
            materializer,
            notifier,
        ));

        let queue = TaskQueue::start(
            orchestrator,
            config.server.workers,
            config.server.queue_capacity,
        );
        let state = Arc::new(
            IntakeState::new(secret, queue.handle())
                .with_max_body_bytes(config.server.max_body_bytes),
        );

        let listener = std::net::TcpListener::bind(&config.server.bind)
            .with_context(|| format!("Failed to bind {}", config.server.bind))?;

        info!(
            bind = %config.server.bind,
            workers = config.server.workers,
            queue_capacity = config.server.queue_capacity,
            "Starting Pagewright"
        );

        server::run(listener, state, shutdown_signal()).await?;

        // the server has dropped its queue handles; drain what is left
        queue.shutdown().await;
        Ok(())
    }
}

async fn build_provider(
    config: &Config,
    secrets: &Secrets,
) -> anyhow::Result<Arc<dyn RepositoryProvider>> {
    match config.provider.kind {
        ProviderKind::Github => {
            let provider = GitHubProvider::connect(&config.provider, secrets)
                .await
                .context("Failed to connect to GitHub")?;
            Ok(Arc::new(provider))
        }
        ProviderKind::Local => Ok(Arc::new(LocalProvider::new(
            config.provider.local_root.clone(),
        ))),
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => warn!(error = %e, "Failed to listen for shutdown signal"),
    }
}
