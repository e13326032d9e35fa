use anyhow::{Context, Result};
use mindmate_backend::config::BackendConfig;
use mindmate_backend::runtime::BackendRuntime;
use mindmate_backend::server::serve_backend;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // A missing .env is normal in deployed environments
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,mindmate_backend=debug")),
        )
        .init();

    let config = BackendConfig::load();
    config
        .validate()
        .context("invalid backend configuration")?;

    tracing::info!(
        "Starting MindMate backend (model {}, bind via MINDMATE_BACKEND_BIND)",
        config.llm_model
    );

    let server_rt = tokio::runtime::Runtime::new().context("failed to start server runtime")?;
    server_rt.block_on(async move {
        let runtime = BackendRuntime::bootstrap(config)
            .context("failed to bootstrap backend runtime")?;
        serve_backend(runtime).await
    })
}
