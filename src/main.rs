use std::panic;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::core::pipeline::executing::Pipeline;
use crate::native::executor::NativeExecutor;

mod config;
mod constants;
mod core;
mod http;
mod native;
#[cfg(test)]
mod stubs;


#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    set_panic_hook();

    let config = Config::parse();
    tracing::debug!("Starting with {:?}", config);

    native::reaper::become_subreaper();

    let work_dir = config.work_dir();
    tokio::fs::create_dir_all(&work_dir).await?;

    let executor = NativeExecutor::new(&work_dir, &config.interpreter)
        .with_memory_limit(config.memory_limit_bytes())
        .with_capture_limit(config.capture_limit_bytes());
    let pipeline = Pipeline::new(Arc::new(executor), config.execution_limits())
        .with_admission_limit(config.max_concurrent_executions);
    if config.max_concurrent_executions.is_none() {
        tracing::warn!("No limit on concurrent executions");
    }

    let app = http::services::router(Arc::new(pipeline), config.static_dir.as_deref());
    let listener = TcpListener::bind(config.bind_addr).await?;

    tracing::info!(
        "HTTP server listening on {} (interpreter {}, time limit {}s, work dir {})",
        config.bind_addr,
        config.interpreter.display(),
        config.timeout_secs,
        work_dir.display()
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}
