//! 房间协调器
//!
//! 在线注册表、历史账本与封禁记录都归 `ChatRoom` 独占。所有入站事件、定时任务
//! 与管理请求都以 `RoomCommand` 的形式进入同一个队列，逐条处理完毕后才取下一条，
//! 因此这些状态不需要加锁；同一连接的事件按到达顺序处理。

mod messaging;
mod points;
mod red_packet;
mod session;


use std::sync::Arc;

use chrono::Duration;
use domain::{
    ClientEvent, ConnectionId, HistoryLedger, IdentityRegistry, MessageIdGenerator, ModerationStore,
    RewardKey, RosterEntry, UserId,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::ApplicationError;
use crate::gateway::{EventGateway, OutboundSender};
use crate::red_packets::RedPacketLedger;
use crate::rewards::RewardsLedger;
use crate::star_reply::{StarReply, StarReplyService};

/// 明星回复消息使用的发送者身份
pub const STAR_BOT_ID: &str = "star_bot";

/// 房间运行参数
#[derive(Debug, Clone)]
pub struct RoomSettings {
    pub history_limit: usize,
    pub recall_window: Duration,
    pub nickname_max_chars: usize,
    pub recall_tombstone: String,
    pub command_buffer: usize,
    pub accrual_points: u64,
    pub accrual_minutes: u64,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self::from_config(&config::AppConfig::default())
    }
}

impl RoomSettings {
    pub fn from_config(config: &config::AppConfig) -> Self {
        Self {
            history_limit: config.room.history_limit,
            recall_window: Duration::seconds(config.room.recall_window_secs as i64),
            nickname_max_chars: config.room.nickname_max_chars,
            recall_tombstone: config.room.recall_tombstone.clone(),
            command_buffer: config.room.command_buffer,
            accrual_points: config.rewards.accrual_points,
            accrual_minutes: config.rewards.accrual_minutes,
        }
    }
}

pub struct RoomDependencies {
    pub gateway: Box<dyn EventGateway>,
    pub clock: Arc<dyn Clock>,
    /// 积分功能关闭时为 None
    pub rewards: Option<Arc<RewardsLedger>>,
    pub red_packets: Arc<RedPacketLedger>,
    /// 明星回复关闭时为 None
    pub star_replies: Option<Arc<StarReplyService>>,
}

/// 定时清理的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub removed_accounts: usize,
    pub removed_red_packets: usize,
}

pub enum RoomCommand {
    Connect {
        connection: ConnectionId,
        sender: OutboundSender,
    },
    Inbound {
        connection: ConnectionId,
        event: ClientEvent,
    },
    Disconnect {
        connection: ConnectionId,
    },
    Rename {
        user_id: UserId,
        nickname: String,
        reply: oneshot::Sender<Result<RosterEntry, ApplicationError>>,
    },
    Roster {
        reply: oneshot::Sender<Vec<RosterEntry>>,
    },
    Unban {
        user_id: UserId,
        reply: oneshot::Sender<bool>,
    },
    Sweep {
        reply: Option<oneshot::Sender<Result<SweepReport, ApplicationError>>>,
    },
    AccrualTick,
    StarReplyReady {
        reply: StarReply,
    },
}

/// 房间协调器的句柄，可在任意任务间克隆
#[derive(Clone)]
pub struct RoomHandle {
    commands: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    async fn submit(&self, command: RoomCommand) -> Result<(), ApplicationError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ApplicationError::RoomClosed)
    }

    pub async fn connect(&self, connection: ConnectionId, sender: OutboundSender) -> Result<(), ApplicationError> {
        self.submit(RoomCommand::Connect { connection, sender }).await
    }

    pub async fn dispatch(&self, connection: ConnectionId, event: ClientEvent) -> Result<(), ApplicationError> {
        self.submit(RoomCommand::Inbound { connection, event }).await
    }

    pub async fn disconnect(&self, connection: ConnectionId) -> Result<(), ApplicationError> {
        self.submit(RoomCommand::Disconnect { connection }).await
    }

    pub async fn rename(&self, user_id: UserId, nickname: String) -> Result<RosterEntry, ApplicationError> {
        let (reply, rx) = oneshot::channel();
        self.submit(RoomCommand::Rename {
            user_id,
            nickname,
            reply,
        })
        .await?;
        rx.await.map_err(|_| ApplicationError::RoomClosed)?
    }

    pub async fn roster(&self) -> Result<Vec<RosterEntry>, ApplicationError> {
        let (reply, rx) = oneshot::channel();
        self.submit(RoomCommand::Roster { reply }).await?;
        rx.await.map_err(|_| ApplicationError::RoomClosed)
    }

    pub async fn sweep(&self) -> Result<SweepReport, ApplicationError> {
        let (reply, rx) = oneshot::channel();
        self.submit(RoomCommand::Sweep { reply: Some(reply) }).await?;
        rx.await.map_err(|_| ApplicationError::RoomClosed)?
    }

    /// 解除封禁；返回是否存在封禁记录
    pub async fn unban(&self, user_id: UserId) -> Result<bool, ApplicationError> {
        let (reply, rx) = oneshot::channel();
        self.submit(RoomCommand::Unban { user_id, reply }).await?;
        rx.await.map_err(|_| ApplicationError::RoomClosed)
    }

    /// 定时任务使用：不等待结果
    pub async fn request_sweep(&self) -> Result<(), ApplicationError> {
        self.submit(RoomCommand::Sweep { reply: None }).await
    }

    pub async fn accrual_tick(&self) -> Result<(), ApplicationError> {
        self.submit(RoomCommand::AccrualTick).await
    }
}

pub struct ChatRoom {
    settings: RoomSettings,
    registry: IdentityRegistry,
    history: HistoryLedger,
    bans: ModerationStore,
    ids: MessageIdGenerator,
    gateway: Box<dyn EventGateway>,
    clock: Arc<dyn Clock>,
    rewards: Option<Arc<RewardsLedger>>,
    red_packets: Arc<RedPacketLedger>,
    star_replies: Option<Arc<StarReplyService>>,
    /// 异步任务（明星回复）把结果投递回自身队列
    loopback: mpsc::WeakSender<RoomCommand>,
}

impl ChatRoom {
    /// 启动房间协调器任务，返回句柄
    pub fn spawn(settings: RoomSettings, deps: RoomDependencies) -> RoomHandle {
        let (tx, rx) = mpsc::channel(settings.command_buffer.max(1));
        let room = ChatRoom {
            registry: IdentityRegistry::new(),
            history: HistoryLedger::new(settings.history_limit),
            bans: ModerationStore::new(),
            ids: MessageIdGenerator::default(),
            gateway: deps.gateway,
            clock: deps.clock,
            rewards: deps.rewards,
            red_packets: deps.red_packets,
            star_replies: deps.star_replies,
            loopback: tx.downgrade(),
            settings,
        };
        tokio::spawn(room.run(rx));
        RoomHandle { commands: tx }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<RoomCommand>) {
        info!(history_limit = self.settings.history_limit, "聊天室协调器启动");
        while let Some(command) = commands.recv().await {
            self.handle(command).await;
        }
        info!("聊天室协调器退出");
    }

    async fn handle(&mut self, command: RoomCommand) {
        match command {
            RoomCommand::Connect { connection, sender } => {
                debug!(conn_id = %connection, "新连接");
                self.gateway.register(connection, sender);
            }
            RoomCommand::Inbound { connection, event } => {
                if !self.gateway.is_open(connection) {
                    debug!(conn_id = %connection, event = event.name(), "连接已终止，忽略事件");
                    return;
                }
                self.on_event(connection, event).await;
            }
            RoomCommand::Disconnect { connection } => self.on_disconnect(connection).await,
            RoomCommand::Rename {
                user_id,
                nickname,
                reply,
            } => {
                let result = self.on_rename(&user_id, nickname).await;
                let _ = reply.send(result);
            }
            RoomCommand::Roster { reply } => {
                let roster = self.roster().await;
                let _ = reply.send(roster);
            }
            RoomCommand::Unban { user_id, reply } => {
                let cleared = self.on_unban(&user_id);
                let _ = reply.send(cleared);
            }
            RoomCommand::Sweep { reply } => {
                let result = self.on_sweep().await;
                if let Err(err) = &result {
                    warn!(error = %err, "定时清理失败");
                }
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            RoomCommand::AccrualTick => self.on_accrual_tick().await,
            RoomCommand::StarReplyReady { reply } => self.on_star_reply(reply),
        }
    }

    async fn on_event(&mut self, connection: ConnectionId, event: ClientEvent) {
        match event {
            ClientEvent::Join(payload) => self.on_join(connection, payload).await,
            ClientEvent::ChatMessage(payload) => self.on_chat(connection, payload),
            ClientEvent::DanmuMessage(payload) => self.on_danmu(connection, payload),
            ClientEvent::RecallMessage(payload) => self.on_recall(connection, payload),
            ClientEvent::ClaimDailyPoints => self.on_claim_daily(connection).await,
            ClientEvent::GetPoints => self.on_get_points(connection).await,
            ClientEvent::KickUser(payload) => self.on_kick(connection, payload).await,
            ClientEvent::SendRedPacket(payload) => self.on_send_red_packet(connection, payload).await,
            ClientEvent::ReceiveRedPacket(payload) => {
                self.on_receive_red_packet(connection, payload).await
            }
            ClientEvent::GetRedPacket(payload) => self.on_get_red_packet(connection, payload).await,
        }
    }

    /// 当前在线名单（按加入顺序，附带积分余额）
    async fn roster(&self) -> Vec<RosterEntry> {
        let keys: Vec<RewardKey> = self
            .registry
            .iter()
            .filter_map(|identity| identity.reward_key.clone())
            .collect();
        let balances = match &self.rewards {
            Some(rewards) => rewards.balances(&keys).await.unwrap_or_else(|err| {
                warn!(error = %err, "读取积分余额失败，名单积分按 0 显示");
                Default::default()
            }),
            None => Default::default(),
        };
        self.registry
            .iter()
            .map(|identity| RosterEntry {
                user_id: identity.user_id.clone(),
                username: identity.username.clone(),
                nickname: identity.nickname.clone(),
                points: identity
                    .reward_key
                    .as_ref()
                    .and_then(|key| balances.get(key).copied())
                    .unwrap_or(0),
            })
            .collect()
    }

    fn now_ms(&self) -> i64 {
        self.clock.now_millis()
    }
}
