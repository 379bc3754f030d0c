//! 主应用程序入口
//!
//! 加载配置，组装预约核心，启动 Axum Web API 与后台任务。

use std::sync::Arc;

use application::{Clock, MaintenanceSweeper, SystemClock};
use config::AppConfig;
use infrastructure::Infrastructure;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use web_api::{cors_layer, router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let infrastructure = Infrastructure::build(&config, clock.now()).await?;
    let (state, notification_worker) = AppState::assemble(&config, &infrastructure, clock);

    // 后台清理任务
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = MaintenanceSweeper::new(state.ledger.clone(), config.booking.sweep_interval());
    let sweeper_task = tokio::spawn(sweeper.run(shutdown_rx));

    let app = router(state.clone()).layer(cors_layer(&config.server.cors_origins));
    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!("预约服务启动在 http://{}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 停止后台任务，发送完队列中剩余的通知
    let _ = shutdown_tx.send(true);
    sweeper_task.await?;
    state.notifications.close();
    notification_worker.await?;

    for failed in state.notifications.take_dead_letters() {
        tracing::error!(
            booking_id = %failed.booking_id,
            template = failed.template,
            recipient = %failed.recipient,
            error = %failed.error,
            "notification needs manual follow-up"
        );
    }
    tracing::info!("预约服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("收到停止信号，开始优雅关闭");
}
