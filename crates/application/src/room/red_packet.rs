//! 红包的发送、领取与详情查询

use std::sync::Arc;

use domain::{
    ChatMessage, ConnectionId, Identity, MessageKind, NewRedPacket, RedPacketIdPayload, RewardKey,
    SendRedPacketPayload, ServerEvent,
};
use tracing::{error, info, warn};

use super::ChatRoom;
use crate::rewards::RewardsLedger;

impl ChatRoom {
    fn red_packet_context(
        &self,
        connection: ConnectionId,
    ) -> Result<(Identity, Arc<RewardsLedger>, RewardKey), &'static str> {
        let identity = self.registry.identity_of(connection).cloned().ok_or("用户验证失败")?;
        let rewards = self.rewards.clone().ok_or("积分功能未开启")?;
        let key = identity.reward_key.clone().ok_or("缺少积分账户标识")?;
        Ok((identity, rewards, key))
    }

    fn red_packet_failed(&mut self, connection: ConnectionId, message: impl Into<String>) {
        self.gateway.send(
            connection,
            ServerEvent::RedPacketFailed {
                message: message.into(),
            },
        );
    }

    pub(super) async fn on_send_red_packet(&mut self, connection: ConnectionId, payload: SendRedPacketPayload) {
        let (sender, rewards, key) = match self.red_packet_context(connection) {
            Ok(context) => context,
            Err(message) => return self.red_packet_failed(connection, message),
        };

        let request = NewRedPacket {
            sender_id: sender.user_id.clone(),
            sender_name: sender.nickname.clone(),
            sender_key: key.clone(),
            kind: payload.kind,
            total_amount: payload.total_amount,
            total_count: payload.total_count,
            greeting: payload.greeting,
        };
        if let Err(err) = request.validate() {
            return self.red_packet_failed(connection, err.to_string());
        }

        let total = request.total_amount;
        if let Err(err) = rewards.debit(&key, total).await {
            warn!(reward_key = %key, total, error = %err, "发红包扣款失败");
            return self.red_packet_failed(connection, err.to_string());
        }

        let packet = match self.red_packets.create(request).await {
            Ok(packet) => packet,
            Err(err) => {
                warn!(reward_key = %key, error = %err, "创建红包失败，退还积分");
                if let Err(refund) = rewards.credit(&key, total).await {
                    error!(reward_key = %key, total, error = %refund, "退还红包积分失败");
                }
                return self.red_packet_failed(connection, err.to_string());
            }
        };
        info!(red_packet_id = %packet.id, user_id = %sender.user_id, total, count = packet.total_count, "发出红包");

        let now = self.clock.now();
        let mut message = ChatMessage::new(
            self.ids.next(now),
            sender.user_id.clone(),
            sender.nickname.clone(),
            packet.greeting.clone(),
            MessageKind::RedPacket,
            now.timestamp_millis(),
        );
        message.red_packet = Some(packet.summary());
        self.history.append(message.clone());
        self.gateway.broadcast(ServerEvent::ChatMessage(message));

        self.push_points(connection, &rewards, &key).await;
    }

    pub(super) async fn on_receive_red_packet(&mut self, connection: ConnectionId, payload: RedPacketIdPayload) {
        let (receiver, rewards, key) = match self.red_packet_context(connection) {
            Ok(context) => context,
            Err(message) => return self.red_packet_failed(connection, message),
        };

        let result = self
            .red_packets
            .receive(
                &payload.red_packet_id,
                key.clone(),
                receiver.user_id.clone(),
                receiver.nickname.clone(),
            )
            .await;
        let (record, packet) = match result {
            Ok(received) => received,
            Err(err) => {
                warn!(red_packet_id = %payload.red_packet_id, user_id = %receiver.user_id, error = %err, "领取红包失败");
                return self.red_packet_failed(connection, err.to_string());
            }
        };

        if let Err(err) = rewards.credit(&key, record.amount).await {
            error!(red_packet_id = %packet.id, reward_key = %key, amount = record.amount, error = %err, "红包入账失败");
            // 入账失败则退回这一份，允许重新领取
            match self.red_packets.revert_receive(&packet.id, &key).await {
                Ok(true) => {}
                Ok(false) => error!(red_packet_id = %packet.id, reward_key = %key, "领取记录已变化，无法撤销"),
                Err(revert) => error!(red_packet_id = %packet.id, reward_key = %key, error = %revert, "撤销红包领取失败"),
            }
            return self.red_packet_failed(connection, err.to_string());
        }
        info!(red_packet_id = %packet.id, user_id = %receiver.user_id, amount = record.amount, "领取红包");

        self.gateway.send(
            connection,
            ServerEvent::RedPacketReceived {
                red_packet_id: packet.id.clone(),
                amount: record.amount,
                remaining_count: packet.remaining_count,
                status: packet.status,
            },
        );
        self.gateway.broadcast(ServerEvent::RedPacketUpdated {
            red_packet_id: packet.id,
            remaining_count: packet.remaining_count,
            status: packet.status,
            receiver_name: record.username,
        });
        self.push_points(connection, &rewards, &key).await;
    }

    pub(super) async fn on_get_red_packet(&mut self, connection: ConnectionId, payload: RedPacketIdPayload) {
        let viewer = self
            .registry
            .identity_of(connection)
            .and_then(|identity| identity.reward_key.clone());
        match self.red_packets.details(&payload.red_packet_id, viewer.as_ref()).await {
            Ok(details) => self.gateway.send(connection, ServerEvent::RedPacketDetails(details)),
            Err(err) => self.red_packet_failed(connection, err.to_string()),
        }
    }

    /// 余额变动后：私发最新积分，并广播名单
    async fn push_points(&mut self, connection: ConnectionId, rewards: &RewardsLedger, key: &RewardKey) {
        match rewards.info(key).await {
            Ok(info) => self.gateway.send(connection, ServerEvent::PointsInfo(info)),
            Err(err) => warn!(reward_key = %key, error = %err, "读取积分失败"),
        }
        let users = self.roster().await;
        self.gateway.broadcast(ServerEvent::UsersUpdated { users });
    }
}
