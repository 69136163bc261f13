use std::sync::Arc;

use anyhow::Context;
use shared::models::{AvailabilitySettings, WeeklySchedule};
use store_hours::{
    BackgroundTasks, Config, SqliteSettingsStore, StoreAvailabilityResolver, TaskKind,
    setup_environment,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 环境 (dotenv, 日志)
    setup_environment();

    // 2. 配置
    let config = Config::from_env();
    config.validate().context("invalid configuration")?;
    tracing::info!(
        timezone = %config.timezone,
        locale = %config.schedule_locale,
        environment = %config.environment,
        "Store hours daemon starting"
    );

    // 3. 存储
    let store = SqliteSettingsStore::open(&config.database_path)
        .await
        .context("failed to open settings database")?;
    let defaults = AvailabilitySettings::new(WeeklySchedule::all_closed(config.schedule_locale));
    let initial = store
        .get_or_create(&defaults)
        .await
        .context("failed to load store availability settings")?;
    let missing = initial.schedule.missing_days(config.schedule_locale);
    if !missing.is_empty() {
        tracing::warn!(?missing, "Weekly schedule is missing days, they will be treated as closed");
    }

    // 4. 解析器
    let resolver = Arc::new(StoreAvailabilityResolver::new(
        Arc::new(store),
        config.resolver_config(),
    ));
    let state = resolver.refresh_from_store().await?;
    tracing::info!(
        is_open = state.is_open,
        is_manual_override = state.is_manual_override,
        "Store availability loaded"
    );
    resolver.start_reconciliation();

    // 5. 后台任务
    let mut tasks = BackgroundTasks::new();

    let subscription = resolver.clone();
    let shutdown = tasks.shutdown_token();
    tasks.spawn("settings_subscription", TaskKind::Listener, async move {
        subscription.run_subscription(shutdown).await;
    });

    let refresher = resolver.clone();
    let shutdown = tasks.shutdown_token();
    let period = config.refresh_interval();
    tasks.spawn("settings_refresh", TaskKind::Periodic, async move {
        refresher.run_refresh_loop(period, shutdown).await;
    });

    let mut events = resolver.subscribe_events();
    let shutdown = tasks.shutdown_token();
    tasks.spawn("availability_events", TaskKind::Listener, async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Ok(event) => tracing::info!(event = ?event, "{}", event.summary()),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Event logger lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    });

    tasks.log_summary();

    // 6. 等待退出信号
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    resolver.stop_reconciliation();
    tasks.shutdown().await;

    tracing::info!("Store hours daemon stopped");
    Ok(())
}
