//! 出站事件投递
//!
//! 房间协调器通过 `EventGateway` 向连接单播、广播或强制断开。每个连接在传输层
//! 有一个写任务，网关只负责把指令放进该连接的队列。

use std::collections::HashMap;
use std::sync::Arc;

use domain::{ConnectionId, ServerEvent};
use tokio::sync::mpsc;

/// 写任务收到的指令
#[derive(Debug, Clone)]
pub enum Outbound {
    Event(Arc<ServerEvent>),
    /// 发送关闭帧并结束连接
    Close,
}

pub type OutboundSender = mpsc::UnboundedSender<Outbound>;
pub type OutboundReceiver = mpsc::UnboundedReceiver<Outbound>;

pub trait EventGateway: Send + Sync {
    fn register(&mut self, connection: ConnectionId, sender: OutboundSender);

    fn unregister(&mut self, connection: ConnectionId);

    /// 连接是否仍然登记在网关中；未登记的连接视为已终止
    fn is_open(&self, connection: ConnectionId) -> bool;

    fn send(&mut self, connection: ConnectionId, event: ServerEvent);

    fn broadcast(&mut self, event: ServerEvent);

    fn broadcast_except(&mut self, excluded: ConnectionId, event: ServerEvent);

    /// 强制断开：投递关闭指令并注销
    fn close(&mut self, connection: ConnectionId);
}

/// 基于无界 mpsc 的网关实现
#[derive(Debug, Default)]
pub struct ChannelGateway {
    connections: HashMap<ConnectionId, OutboundSender>,
}

impl ChannelGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn deliver(&mut self, connection: ConnectionId, message: Outbound) {
        let closed = match self.connections.get(&connection) {
            Some(sender) => sender.send(message).is_err(),
            None => false,
        };
        if closed {
            tracing::debug!(conn_id = %connection, "写任务已结束，移除连接");
            self.connections.remove(&connection);
        }
    }

    fn fan_out(&mut self, excluded: Option<ConnectionId>, event: ServerEvent) {
        let event = Arc::new(event);
        let mut dead = Vec::new();
        for (connection, sender) in &self.connections {
            if Some(*connection) == excluded {
                continue;
            }
            if sender.send(Outbound::Event(event.clone())).is_err() {
                dead.push(*connection);
            }
        }
        for connection in dead {
            self.connections.remove(&connection);
        }
    }
}

impl EventGateway for ChannelGateway {
    fn register(&mut self, connection: ConnectionId, sender: OutboundSender) {
        self.connections.insert(connection, sender);
    }

    fn unregister(&mut self, connection: ConnectionId) {
        self.connections.remove(&connection);
    }

    fn is_open(&self, connection: ConnectionId) -> bool {
        self.connections.contains_key(&connection)
    }

    fn send(&mut self, connection: ConnectionId, event: ServerEvent) {
        self.deliver(connection, Outbound::Event(Arc::new(event)));
    }

    fn broadcast(&mut self, event: ServerEvent) {
        self.fan_out(None, event);
    }

    fn broadcast_except(&mut self, excluded: ConnectionId, event: ServerEvent) {
        self.fan_out(Some(excluded), event);
    }

    fn close(&mut self, connection: ConnectionId) {
        if let Some(sender) = self.connections.remove(&connection) {
            let _ = sender.send(Outbound::Close);
        }
    }
}
