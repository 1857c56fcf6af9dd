//! 主应用程序入口
//!
//! 装配各层组件并启动 Axum Web 服务。所有协作方都走显式构造传参，
//! 没有任何环境化的容器或全局状态。

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use application::{
    spawn_audit_worker, spawn_sweeper, AuditSink, ChatService, ChatServiceDependencies,
    ContentFilter, ModerationService, ModerationServiceDependencies, NullUserDirectory,
    PresenceTracker, SystemClock, TracingAuditSink,
};
use config::AppConfig;
use infrastructure::{
    create_pg_pool, HttpAuditSink, PgAlertRepository, PgChatRoomRepository, PgMessageRepository,
    SessionRegistry,
};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env_with_defaults();

    tracing::info!(
        "连接数据库: {}",
        config.database.url.split('@').next_back().unwrap_or("unknown")
    );

    let pg_pool = create_pg_pool(&config.database.url, config.database.max_connections).await?;

    // 运行迁移
    sqlx::migrate!("../../migrations").run(&pg_pool).await?;

    // 仓储
    let room_repository = Arc::new(PgChatRoomRepository::new(pg_pool.clone()));
    let message_repository = Arc::new(PgMessageRepository::new(pg_pool.clone()));
    let alert_repository = Arc::new(PgAlertRepository::new(pg_pool));

    // 共享协作方
    let clock = Arc::new(SystemClock);
    let registry = Arc::new(SessionRegistry::new(config.fanout.session_buffer));
    let content_filter = Arc::new(ContentFilter::new(config.moderation.denylist.clone()));
    if content_filter.is_empty() {
        tracing::warn!("违禁词表为空，消息不会被标记");
    }

    // 在线状态跟踪器 + 后台清扫任务
    let presence = Arc::new(PresenceTracker::new(&config.presence, clock.clone()));
    let _sweeper = spawn_sweeper(presence.clone(), &config.presence);

    // 上线/下线事件监听（面板数据源）
    let mut presence_events = presence.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = presence_events.recv().await {
            match &event {
                application::PresenceEvent::Online { user_id, .. } => {
                    tracing::info!(user_id = %user_id, "用户上线");
                }
                application::PresenceEvent::Offline { user_id, .. } => {
                    tracing::info!(user_id = %user_id, "用户下线");
                }
            }
        }
    });

    // 审计任务：配置了收集端就走 HTTP，否则写本地日志
    let audit_sink: Arc<dyn AuditSink> = match &config.audit.sink_url {
        Some(url) => {
            tracing::info!(url = %url, "审计日志外发到收集端");
            Arc::new(HttpAuditSink::new(
                url.clone(),
                Duration::from_secs(config.audit.request_timeout_secs),
            ))
        }
        None => Arc::new(TracingAuditSink),
    };
    let (audit, _audit_worker) = spawn_audit_worker(audit_sink);

    // 应用层服务
    let chat_service = Arc::new(ChatService::new(ChatServiceDependencies {
        room_repository: room_repository.clone(),
        message_repository,
        alert_repository: alert_repository.clone(),
        fanout: registry.clone(),
        content_filter,
        clock: clock.clone(),
    }));

    let moderation_service = Arc::new(ModerationService::new(ModerationServiceDependencies {
        alert_repository,
        room_repository,
        directory: Arc::new(NullUserDirectory),
        clock,
    }));

    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));

    let state = AppState::new(
        chat_service,
        moderation_service,
        presence,
        registry,
        jwt_service,
        audit,
        config.presence.clone(),
    );

    // 启动 Web 服务器
    let app = router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("marketchat 服务器启动在 http://{}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
    tracing::info!("收到退出信号，开始优雅停机");
}
