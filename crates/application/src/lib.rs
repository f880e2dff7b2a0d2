//! 应用层实现。
//!
//! 房间协调器（`ChatRoom`）串行处理所有会改动在线状态的命令，外围是积分与红包
//! 账本、明星回复、后台任务，以及对传输层和持久化的端口抽象。

pub mod clock;
pub mod error;
pub mod gateway;
pub mod jobs;
pub mod red_packets;
pub mod rewards;
pub mod room;
pub mod star_reply;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ApplicationError, ApplicationResult};
pub use gateway::{ChannelGateway, EventGateway, Outbound, OutboundReceiver, OutboundSender};
pub use jobs::{BackgroundJobs, RunningJobs};
pub use red_packets::{RedPacketLedger, RedPacketPolicy};
pub use rewards::{RewardsLedger, RewardsPolicy};
pub use room::{ChatRoom, RoomDependencies, RoomHandle, RoomSettings, SweepReport, STAR_BOT_ID};
pub use star_reply::{LocalReplyGenerator, ReplyGenerator, StarReply, StarReplyService};
pub use store::{LedgerStore, RedPacketStore, RewardsStore};
