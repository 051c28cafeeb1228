//! CodeHelper HTTP 服务
//!
//! 启动: cargo run --bin codehelper-web
//! 访问 http://127.0.0.1:8081/api/ai/chat?memoryId=1&message=hello

use std::time::Duration;

use anyhow::Context;
use codehelper::agent::{create_orchestrator, spawn_session_eviction};
use codehelper::config::{load_config, AppConfig};
use codehelper::web::router;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    codehelper::observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    let orchestrator = create_orchestrator(&cfg).await;

    let shutdown = CancellationToken::new();
    let eviction = spawn_session_eviction(
        orchestrator.memory().clone(),
        Duration::from_secs(cfg.app.session_idle_secs),
        Duration::from_secs(cfg.app.eviction_interval_secs),
        shutdown.clone(),
    );

    let app = router(orchestrator, &cfg.server.context_path);
    let addr = format!("{}:{}", cfg.server.host, cfg.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {}", addr))?;
    tracing::info!("CodeHelper listening on http://{}{}", addr, cfg.server.context_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    shutdown.cancel();
    let _ = eviction.await;
    Ok(())
}
