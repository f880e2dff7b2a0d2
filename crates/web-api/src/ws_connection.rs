use application::Outbound;
use axum::body::Bytes;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::{ClientEvent, ConnectionId};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::state::AppState;

/// 单个 WebSocket 连接
///
/// 读循环把入站帧按到达顺序转成房间命令；写任务消费房间投递到本连接的出站队列，
/// 收到 `Close` 时发送关闭帧并结束连接。
pub struct WebSocketConnection {
    state: AppState,
    connection: ConnectionId,
}

impl WebSocketConnection {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            connection: ConnectionId::new(),
        }
    }

    pub async fn run(self, socket: WebSocket) {
        let connection = self.connection;
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        if let Err(err) = self.state.room.connect(connection, outbound_tx).await {
            tracing::error!(conn_id = %connection, error = %err, "房间不可用，拒绝连接");
            return;
        }
        tracing::info!(conn_id = %connection, "WebSocket 连接已建立");

        let (mut sender, mut incoming) = socket.split();
        // pong 由读循环产生，但只能由写任务发出
        let (pong_tx, mut pong_rx) = mpsc::channel::<Bytes>(8);

        let mut send_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    outbound = outbound_rx.recv() => {
                        let Some(outbound) = outbound else { break };
                        match outbound {
                            Outbound::Event(event) => {
                                let text = match event.to_json() {
                                    Ok(text) => text,
                                    Err(err) => {
                                        tracing::warn!(error = %err, "出站事件序列化失败");
                                        continue;
                                    }
                                };
                                if sender.send(WsMessage::Text(text.into())).await.is_err() {
                                    tracing::debug!(conn_id = %connection, "发送失败，连接已断开");
                                    break;
                                }
                            }
                            Outbound::Close => {
                                tracing::info!(conn_id = %connection, "服务端强制断开连接");
                                let _ = sender.send(WsMessage::Close(None)).await;
                                break;
                            }
                        }
                    }
                    Some(data) = pong_rx.recv() => {
                        if sender.send(WsMessage::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let room = self.state.room.clone();
        let mut recv_task = tokio::spawn(async move {
            while let Some(Ok(message)) = incoming.next().await {
                match message {
                    WsMessage::Text(text) => match ClientEvent::parse(text.as_str()) {
                        Ok(event) => {
                            if room.dispatch(connection, event).await.is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            tracing::warn!(conn_id = %connection, error = %err, "丢弃无效消息");
                        }
                    },
                    WsMessage::Ping(data) => {
                        if pong_tx.send(data).await.is_err() {
                            break;
                        }
                    }
                    WsMessage::Close(_) => break,
                    WsMessage::Pong(_) | WsMessage::Binary(_) => {}
                }
            }
        });

        // 任意一侧结束即视为连接结束
        tokio::select! {
            _ = &mut send_task => recv_task.abort(),
            _ = &mut recv_task => send_task.abort(),
        }

        if let Err(err) = self.state.room.disconnect(connection).await {
            tracing::warn!(conn_id = %connection, error = %err, "断开通知投递失败");
        }
        tracing::info!(conn_id = %connection, "WebSocket 连接已断开");
    }
}
