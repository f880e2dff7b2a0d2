//! 主应用程序入口
//!
//! 加载配置，装配账本与房间协调器，启动后台任务和 Axum 服务。

use std::sync::Arc;

use anyhow::Context;
use application::{
    BackgroundJobs, ChannelGateway, ChatRoom, Clock, RedPacketLedger, RewardsLedger,
    RoomDependencies, RoomSettings, StarReplyService, SystemClock,
};
use config::AppConfig;
use infrastructure::Infrastructure;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志，未设置 RUST_LOG 时默认 info
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load().context("加载配置失败")?;
    let infra = Infrastructure::build(&config).context("初始化基础设施失败")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let rewards = config.rewards.enabled.then(|| {
        Arc::new(RewardsLedger::new(
            infra.rewards_store.clone(),
            clock.clone(),
            (&config.rewards).into(),
        ))
    });
    if rewards.is_none() {
        tracing::info!("积分功能未开启");
    }
    let red_packets = Arc::new(RedPacketLedger::new(
        infra.red_packet_store.clone(),
        clock.clone(),
        (&config.red_packets).into(),
    ));
    let star_replies = config.star_reply.enabled.then(|| {
        Arc::new(StarReplyService::new(
            &config.star_reply,
            infra.reply_generator.clone(),
        ))
    });

    let room = ChatRoom::spawn(
        RoomSettings::from_config(&config),
        RoomDependencies {
            gateway: Box::new(ChannelGateway::new()),
            clock,
            rewards: rewards.clone(),
            red_packets: red_packets.clone(),
            star_replies,
        },
    );

    let jobs = BackgroundJobs::new(room.clone(), &config.rewards);
    let running = jobs.start().await.context("启动后台任务失败")?;

    let state = AppState::new(room, rewards, red_packets, &config);
    let app = router(state);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("无法监听 {address}"))?;

    tracing::info!("聊天室服务器启动在 http://{}", address);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(running) = running {
        running.shutdown().await;
    }
    tracing::info!("服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("监听停止信号失败: {}", e);
    }
    tracing::info!("收到停止信号，开始优雅关闭");
}
