use std::path::Path as FsPath;

use axum::{
    extract::{ws::WebSocketUpgrade, Path, State},
    http::{HeaderMap, HeaderValue, Method},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use domain::{PointsSnapshot, RedPacketHistory, RewardKey, RosterEntry, UserId};

use crate::{error::ApiError, state::AppState, ws_connection::WebSocketConnection};

const EMOJI_EXTENSIONS: &[&str] = &["gif", "jpg", "jpeg", "png", "webp"];

#[derive(Debug, Deserialize)]
struct NicknamePayload {
    nickname: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnbanPayload {
    user_id: String,
}

#[derive(Debug, Serialize)]
struct EmojiFile {
    name: String,
    url: String,
    ext: String,
}

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.cors_origins);

    Router::new()
        .route("/health", get(health))
        .route("/ws", get(websocket_handler))
        .nest("/api", api_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/update-nickname", post(update_nickname))
        .route("/users", get(online_users))
        .route("/cleanup-inactive", post(cleanup_inactive))
        .route("/unban", post(unban))
        .route("/points/{reward_key}", get(points_info))
        .route("/red-packets/history/{reward_key}", get(red_packet_history))
        .route("/notices", get(notices))
        .route("/emojis/{category}", get(emojis))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        return cors.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "忽略无效的 CORS 来源");
                None
            }
        })
        .collect();
    cors.allow_origin(origins)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| WebSocketConnection::new(state).run(socket))
}

/// 从 `X-User-Id` 头取出在线用户
async fn require_online_user(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(UserId, Vec<RosterEntry>), ApiError> {
    let raw = headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::unauthorized("未提供用户ID"))?;
    let user_id = UserId::parse(raw).map_err(|_| ApiError::unauthorized("用户ID无效"))?;
    let roster = state.room.roster().await?;
    if !roster.iter().any(|entry| entry.user_id == user_id) {
        return Err(ApiError::unauthorized("用户ID无效"));
    }
    Ok((user_id, roster))
}

async fn update_nickname(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<NicknamePayload>,
) -> Result<Json<Value>, ApiError> {
    let (user_id, _) = require_online_user(&state, &headers).await?;
    let entry = state.room.rename(user_id, payload.nickname).await?;
    Ok(Json(json!({
        "success": true,
        "message": "昵称更新成功",
        "nickname": entry.nickname,
    })))
}

async fn online_users(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let (_, users) = require_online_user(&state, &headers).await?;
    Ok(Json(json!({ "users": users })))
}

async fn cleanup_inactive(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let report = state.room.sweep().await?;
    Ok(Json(json!({
        "success": true,
        "removed": report.removed_accounts,
        "removedRedPackets": report.removed_red_packets,
    })))
}

async fn unban(
    State(state): State<AppState>,
    Json(payload): Json<UnbanPayload>,
) -> Result<Json<Value>, ApiError> {
    let user_id = UserId::parse(payload.user_id).map_err(|err| ApiError::bad_request(err.to_string()))?;
    if !state.room.unban(user_id.clone()).await? {
        return Err(ApiError::not_found("封禁记录不存在"));
    }
    Ok(Json(json!({ "success": true, "userId": user_id })))
}

async fn points_info(
    State(state): State<AppState>,
    Path(reward_key): Path<String>,
) -> Result<Json<PointsSnapshot>, ApiError> {
    let rewards = state
        .rewards
        .as_ref()
        .ok_or_else(|| ApiError::not_found("积分功能未开启"))?;
    let key = RewardKey::parse(reward_key).map_err(|err| ApiError::bad_request(err.to_string()))?;
    Ok(Json(rewards.info(&key).await?))
}

async fn red_packet_history(
    State(state): State<AppState>,
    Path(reward_key): Path<String>,
) -> Result<Json<RedPacketHistory>, ApiError> {
    let key = RewardKey::parse(reward_key).map_err(|err| ApiError::bad_request(err.to_string()))?;
    Ok(Json(state.red_packets.history(&key).await?))
}

async fn notices(State(state): State<AppState>) -> Json<Value> {
    let content = tokio::fs::read_to_string(&state.content.notice_file)
        .await
        .unwrap_or_default();
    Json(json!({ "content": content }))
}

async fn emojis(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if category.is_empty()
        || category.contains(['/', '\\'])
        || category.starts_with('.')
    {
        return Err(ApiError::bad_request("无效的表情包目录"));
    }

    let dir = FsPath::new(&state.content.emoji_dir).join(&category);
    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(_) => return Err(ApiError::not_found("表情包目录不存在")),
    };

    let mut files = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(err) => {
                tracing::error!(dir = %dir.display(), error = %err, "读取表情包目录失败");
                return Err(ApiError::internal_server_error("服务器错误"));
            }
        };
        let path = entry.path();
        let Some(ext) = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .filter(|ext| EMOJI_EXTENSIONS.contains(&ext.as_str()))
        else {
            continue;
        };
        let (Some(name), Some(file_name)) = (
            path.file_stem().and_then(|stem| stem.to_str()),
            path.file_name().and_then(|name| name.to_str()),
        ) else {
            continue;
        };
        files.push(EmojiFile {
            name: name.to_owned(),
            url: format!("/emojis/{category}/{file_name}"),
            ext: format!(".{ext}"),
        });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(Json(json!({
        "success": true,
        "total": files.len(),
        "data": files,
    })))
}
