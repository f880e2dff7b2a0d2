mod support;

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use support::spawn_server;

#[tokio::test]
async fn chat_and_recall_are_broadcast() {
    let server = spawn_server().await;

    let mut alice = server.connect().await;
    alice.join("u-alice", "alice", "r-alice").await;
    let history = alice.expect_event("chat_history").await;
    assert_eq!(history, json!([]));
    alice.expect_event("user_join").await;

    let mut bob = server.connect().await;
    bob.join("u-bob", "bob", "r-bob").await;
    bob.expect_event("chat_history").await;
    let joined = alice.expect_event("user_join").await;
    assert_eq!(joined["userId"], "u-bob");
    assert_eq!(joined["users"].as_array().map(Vec::len), Some(2));

    alice
        .send(
            "chat_message",
            json!({ "userId": "u-alice", "content": "hello", "localId": "l-1" }),
        )
        .await;
    let message = bob.expect_event("chat_message").await;
    assert_eq!(message["content"], "hello");
    assert_eq!(message["username"], "alice");
    assert_eq!(message["localId"], "l-1");
    let echoed = alice.expect_event("chat_message").await;
    assert_eq!(echoed["id"], message["id"]);

    alice
        .send(
            "recall_message",
            json!({ "userId": "u-alice", "messageId": message["id"] }),
        )
        .await;
    let recalled = bob.expect_event("message_recalled").await;
    assert_eq!(recalled["messageId"], message["id"]);
    assert_eq!(recalled["userId"], "u-alice");

    // 新加入的连接看到的是墓碑
    let mut carol = server.connect().await;
    carol.join("u-carol", "carol", "r-carol").await;
    let history = carol.expect_event("chat_history").await;
    assert_eq!(history[0]["recalled"], true);
    assert_ne!(history[0]["content"], "hello");
}

#[tokio::test]
async fn impersonated_chat_is_refused() {
    let server = spawn_server().await;
    let mut alice = server.connect().await;
    alice.join("u-alice", "alice", "r-alice").await;
    alice.expect_event("user_join").await;

    alice
        .send("chat_message", json!({ "userId": "u-mallory", "content": "hi" }))
        .await;
    let failed = alice.expect_event("user_id_failed").await;
    assert!(failed["message"].as_str().is_some());
}

#[tokio::test]
async fn rejoin_from_new_connection_closes_old_one() {
    let server = spawn_server().await;
    let mut first = server.connect().await;
    first.join("u-alice", "alice", "r-alice").await;
    first.expect_event("user_join").await;

    let mut second = server.connect().await;
    second.join("u-alice", "alice", "r-alice").await;
    second.expect_event("chat_history").await;

    // 旧连接在收到若干广播后被关闭
    while first.next_event().await.is_some() {}
}

#[tokio::test]
async fn nickname_update_over_http() {
    let server = spawn_server().await;
    let client = Client::new();

    let mut alice = server.connect().await;
    alice.join("u-alice", "alice", "r-alice").await;
    alice.expect_event("user_join").await;

    let missing = client
        .post(server.http("/api/update-nickname"))
        .json(&json!({ "nickname": "Ally" }))
        .send()
        .await
        .expect("request");
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let unknown = client
        .post(server.http("/api/update-nickname"))
        .header("X-User-Id", "u-nobody")
        .json(&json!({ "nickname": "Ally" }))
        .send()
        .await
        .expect("request");
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);

    let too_long = client
        .post(server.http("/api/update-nickname"))
        .header("X-User-Id", "u-alice")
        .json(&json!({ "nickname": "x".repeat(21) }))
        .send()
        .await
        .expect("request");
    assert_eq!(too_long.status(), StatusCode::BAD_REQUEST);

    let renamed: Value = client
        .post(server.http("/api/update-nickname"))
        .header("X-User-Id", "u-alice")
        .json(&json!({ "nickname": "Ally" }))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(renamed["success"], true);
    assert_eq!(renamed["nickname"], "Ally");

    let updated = alice.expect_event("user_nickname_updated").await;
    assert_eq!(updated["newNickname"], "Ally");

    let users: Value = client
        .get(server.http("/api/users"))
        .header("X-User-Id", "u-alice")
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(users["users"][0]["nickname"], "Ally");
}

#[tokio::test]
async fn points_and_red_packet_history_endpoints() {
    let server = spawn_server().await;
    let client = Client::new();

    let mut alice = server.connect().await;
    alice.join("u-alice", "alice", "r-alice").await;
    alice.expect_event("points_info").await;
    alice.send("claim_daily_points", Value::Null).await;
    let claimed = alice.expect_event("claim_points_success").await;
    assert_eq!(claimed["points"], 100);

    let points: Value = client
        .get(server.http("/api/points/r-alice"))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(points["points"], 100);
    assert_eq!(points["canClaimDaily"], false);

    let history: Value = client
        .get(server.http("/api/red-packets/history/r-alice"))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(history["sent"], json!([]));
    assert_eq!(history["received"], json!([]));

    let cleanup: Value = client
        .post(server.http("/api/cleanup-inactive"))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(cleanup["removed"], 0);
}

#[tokio::test]
async fn notices_and_emojis_are_served_from_disk() {
    let server = spawn_server().await;
    let client = Client::new();

    let empty: Value = client
        .get(server.http("/api/notices"))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(empty["content"], "");

    std::fs::write(server.content_dir.path().join("notice.md"), "# 公告").expect("write notice");
    let notice: Value = client
        .get(server.http("/api/notices"))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(notice["content"], "# 公告");

    let missing = client
        .get(server.http("/api/emojis/cats"))
        .send()
        .await
        .expect("request");
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let dir = server.content_dir.path().join("emojis").join("cats");
    std::fs::create_dir_all(&dir).expect("emoji dir");
    std::fs::write(dir.join("wave.gif"), b"GIF89a").expect("write gif");
    std::fs::write(dir.join("readme.txt"), b"skip").expect("write txt");

    let emojis: Value = client
        .get(server.http("/api/emojis/cats"))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(emojis["total"], 1);
    assert_eq!(emojis["data"][0]["name"], "wave");
    assert_eq!(emojis["data"][0]["url"], "/emojis/cats/wave.gif");
    assert_eq!(emojis["data"][0]["ext"], ".gif");

    let sneaky = client
        .get(server.http("/api/emojis/..%2Fsecrets"))
        .send()
        .await
        .expect("request");
    assert!(sneaky.status().is_client_error());
}

#[tokio::test]
async fn unban_over_http_allows_rejoin() {
    let server = spawn_server().await;
    let client = Client::new();

    let mut moderator = server.connect().await;
    moderator.join("u-mod", "mod", "r-mod").await;
    moderator.expect_event("user_join").await;
    let mut troll = server.connect().await;
    troll.join("u-troll", "troll", "r-troll").await;
    troll.expect_event("chat_history").await;

    moderator
        .send("kick_user", json!({ "targetUserId": "u-troll", "duration": 0 }))
        .await;
    moderator.expect_event("kick_success").await;

    let unbanned = client
        .post(server.http("/api/unban"))
        .json(&json!({ "userId": "u-troll" }))
        .send()
        .await
        .expect("request");
    assert_eq!(unbanned.status(), StatusCode::OK);

    let again = client
        .post(server.http("/api/unban"))
        .json(&json!({ "userId": "u-troll" }))
        .send()
        .await
        .expect("request");
    assert_eq!(again.status(), StatusCode::NOT_FOUND);

    let mut back = server.connect().await;
    back.join("u-troll", "troll", "r-troll").await;
    back.expect_event("chat_history").await;
}
