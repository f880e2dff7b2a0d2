use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{
    store::memory::MemoryLedgerStore, ChannelGateway, ChatRoom, Clock, RedPacketLedger,
    RewardsLedger, RoomDependencies, RoomSettings, SystemClock,
};
use config::AppConfig;
use domain::{RedPacket, RewardAccount};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::oneshot,
    time::{sleep, timeout},
};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use web_api::{router, AppState};

pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    // 表情包与公告文件所在目录，随服务一起释放
    pub content_dir: tempfile::TempDir,
}

impl TestServer {
    pub fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn connect(&self) -> WsClient {
        let (stream, _) = connect_async(format!("ws://{}/ws", self.addr))
            .await
            .expect("connect websocket");
        WsClient { stream }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn spawn_server() -> TestServer {
    let content_dir = tempfile::tempdir().expect("tempdir");
    let mut config = AppConfig::default();
    config.content.notice_file = content_dir
        .path()
        .join("notice.md")
        .to_string_lossy()
        .into_owned();
    config.content.emoji_dir = content_dir
        .path()
        .join("emojis")
        .to_string_lossy()
        .into_owned();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let rewards = Arc::new(RewardsLedger::new(
        Arc::new(MemoryLedgerStore::<RewardAccount>::new()),
        clock.clone(),
        (&config.rewards).into(),
    ));
    let red_packets = Arc::new(RedPacketLedger::new(
        Arc::new(MemoryLedgerStore::<RedPacket>::new()),
        clock.clone(),
        (&config.red_packets).into(),
    ));
    let room = ChatRoom::spawn(
        RoomSettings::from_config(&config),
        RoomDependencies {
            gateway: Box::new(ChannelGateway::new()),
            clock,
            rewards: Some(rewards.clone()),
            red_packets: red_packets.clone(),
            star_replies: None,
        },
    );
    let state = AppState::new(room, Some(rewards), red_packets, &config);

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let app = router(state);

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });

    // allow server to start
    sleep(Duration::from_millis(50)).await;

    TestServer {
        addr,
        shutdown: Some(shutdown_tx),
        content_dir,
    }
}

pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    pub async fn send(&mut self, event: &str, data: Value) {
        let frame = json!({ "event": event, "data": data }).to_string();
        self.stream
            .send(TungsteniteMessage::Text(frame.into()))
            .await
            .expect("send frame");
    }

    pub async fn join(&mut self, user_id: &str, username: &str, reward_key: &str) {
        self.send(
            "join",
            json!({ "userId": user_id, "username": username, "rewardKey": reward_key }),
        )
        .await;
    }

    /// 读取下一个文本帧；连接关闭时返回 None
    pub async fn next_event(&mut self) -> Option<Value> {
        loop {
            let message = timeout(Duration::from_secs(3), self.stream.next())
                .await
                .expect("timed out waiting for frame")?;
            match message.expect("websocket frame") {
                TungsteniteMessage::Text(text) => {
                    return Some(serde_json::from_str(text.as_str()).expect("json frame"))
                }
                TungsteniteMessage::Close(_) => return None,
                _ => continue,
            }
        }
    }

    /// 跳过其他事件，直到收到指定名称的事件
    pub async fn expect_event(&mut self, name: &str) -> Value {
        loop {
            let frame = self
                .next_event()
                .await
                .unwrap_or_else(|| panic!("connection closed before `{name}`"));
            if frame["event"] == name {
                return frame["data"].clone();
            }
        }
    }
}
