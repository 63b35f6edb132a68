use axum::extract::Extension;
use tokio::net::TcpListener;

use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::schedule;
use crate::worker::Worker;

/// High-level runtime that serves a [`Worker`] over a local TCP listener.
pub struct EdgesideRuntime {
    config: RuntimeConfig,
}

impl EdgesideRuntime {
    /// Creates a runtime with the provided configuration.
    pub fn new(config: RuntimeConfig) -> Self {
        Self { config }
    }

    /// Consumes the runtime and starts serving the supplied worker.
    pub async fn serve(self, worker: Worker) -> Result<()> {
        serve(worker, self.config).await
    }
}

/// Serves the worker with the provided configuration.
pub async fn serve(worker: Worker, config: RuntimeConfig) -> Result<()> {
    let listener = TcpListener::bind(config.bind_addr).await?;
    serve_on(worker, listener).await
}

/// Serves the worker on an already bound listener.
///
/// This is the composition point the other entry points funnel into: the env
/// is attached to the router as an extension, and when the worker carries
/// cron triggers the schedule driver is spawned alongside the HTTP server.
pub async fn serve_on(worker: Worker, listener: TcpListener) -> Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(worker = %worker.name, addr = %addr, "edgeside listening");

    let Worker {
        name: _,
        router,
        env,
        triggers,
        scheduled_handler,
    } = worker;

    if let Some(handler) = scheduled_handler {
        if !triggers.is_empty() {
            tokio::spawn(schedule::drive(triggers, handler, env.clone()));
        }
    }

    let service = router.layer(Extension(env)).into_make_service();

    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .into_future()
        .await?;

    Ok(())
}

/// Loads [`RuntimeConfig`] from the environment and starts serving the worker.
pub async fn run(worker: Worker) -> Result<()> {
    let config = RuntimeConfig::from_env()?;
    serve(worker, config).await
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
