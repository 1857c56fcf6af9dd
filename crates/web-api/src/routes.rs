use std::net::SocketAddr;

use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use application::services::PostMessageRequest;
use application::{AlertView, MessageDto, RoomDto};
use domain::{AlertId, AlertStatus, MessageId, RoomId, UserId};

use crate::auth::Identity;
use crate::error::ApiError;
use crate::policy::{OperationPolicy, ANY_ROLE, STAFF};
use crate::state::AppState;
use crate::ws_connection::WsConnection;

const CREATE_ROOM: OperationPolicy = OperationPolicy::new(ANY_ROLE, "room.create", "chat_room");
const VIEW_ROOM: OperationPolicy = OperationPolicy::new(ANY_ROLE, "room.view", "chat_room");
const POST_MESSAGE: OperationPolicy = OperationPolicy::new(ANY_ROLE, "message.post", "message");
const VIEW_HISTORY: OperationPolicy = OperationPolicy::new(ANY_ROLE, "message.history", "message");
const EDIT_MESSAGE: OperationPolicy = OperationPolicy::new(ANY_ROLE, "message.edit", "message");
const DELETE_MESSAGE: OperationPolicy =
    OperationPolicy::new(ANY_ROLE, "message.delete", "message");
const CREATE_REPORT: OperationPolicy = OperationPolicy::new(ANY_ROLE, "report.create", "alert");
const LIST_ALERTS: OperationPolicy = OperationPolicy::new(STAFF, "alert.list", "alert");
const UPDATE_ALERT_STATUS: OperationPolicy =
    OperationPolicy::new(STAFF, "alert.status", "alert");
const ASSIGN_RESPONSIBLE: OperationPolicy = OperationPolicy::new(STAFF, "alert.assign", "alert");

#[derive(Debug, Deserialize)]
struct CreateRoomPayload {
    buyer_id: Uuid,
    seller_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct SendMessagePayload {
    content: String,
}

#[derive(Debug, Deserialize)]
struct EditMessagePayload {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ReportPayload {
    problematic_user_id: Uuid,
    room_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
struct UpdateStatusPayload {
    status: String,
}

#[derive(Debug, Deserialize)]
struct AssignPayload {
    responsible_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    before: Option<Uuid>,
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(websocket_upgrade))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/rooms", post(create_room))
        .route("/rooms/{room_id}", get(get_room))
        .route(
            "/rooms/{room_id}/messages",
            post(send_message).get(get_history),
        )
        .route(
            "/messages/{message_id}",
            patch(edit_message).delete(delete_message),
        )
        .route("/reports", post(create_report))
        .route("/alerts", get(list_alerts))
        .route("/alerts/{alert_id}/status", patch(update_alert_status))
        .route("/alerts/{alert_id}/assign", patch(assign_responsible))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    policy: &OperationPolicy,
) -> Result<Identity, ApiError> {
    let identity = state.jwt_service.identity_from_headers(headers)?;
    policy.authorize(&identity)?;
    Ok(identity)
}

async fn create_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateRoomPayload>,
) -> Result<(StatusCode, Json<RoomDto>), ApiError> {
    let identity = authenticate(&state, &headers, &CREATE_ROOM)?;

    let dto = state
        .chat_service
        .create_room(
            UserId::from(payload.buyer_id),
            UserId::from(payload.seller_id),
            identity.user_id,
            identity.role,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(dto)))
}

async fn get_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<Uuid>,
) -> Result<Json<RoomDto>, ApiError> {
    let identity = authenticate(&state, &headers, &VIEW_ROOM)?;

    let dto = state
        .chat_service
        .get_room(RoomId::from(room_id), identity.user_id, identity.role)
        .await?;
    Ok(Json(dto))
}

async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<Uuid>,
    Json(payload): Json<SendMessagePayload>,
) -> Result<Json<MessageDto>, ApiError> {
    let identity = authenticate(&state, &headers, &POST_MESSAGE)?;

    let dto = state
        .chat_service
        .post_message(PostMessageRequest {
            room_id: RoomId::from(room_id),
            sender_id: identity.user_id,
            sender_role: identity.role,
            content: payload.content,
        })
        .await?;

    Ok(Json(dto))
}

async fn get_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<MessageDto>>, ApiError> {
    let identity = authenticate(&state, &headers, &VIEW_HISTORY)?;

    let limit = query.limit.unwrap_or(50).min(100);
    let items = state
        .chat_service
        .get_history(
            RoomId::from(room_id),
            identity.user_id,
            identity.role,
            limit,
            query.before.map(MessageId::from),
        )
        .await?;

    Ok(Json(items))
}

async fn edit_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(message_id): Path<Uuid>,
    Json(payload): Json<EditMessagePayload>,
) -> Result<Json<MessageDto>, ApiError> {
    let identity = authenticate(&state, &headers, &EDIT_MESSAGE)?;

    let dto = state
        .chat_service
        .edit_message(
            MessageId::from(message_id),
            identity.user_id,
            payload.content,
        )
        .await?;
    Ok(Json(dto))
}

async fn delete_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(message_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let identity = authenticate(&state, &headers, &DELETE_MESSAGE)?;

    state
        .chat_service
        .soft_delete_message(MessageId::from(message_id), identity.user_id, identity.role)
        .await?;

    DELETE_MESSAGE.emit_audit(
        &state.audit,
        &identity,
        Some(message_id.to_string()),
        "message soft-deleted",
        Some(addr.to_string()),
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn create_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<ReportPayload>,
) -> Result<(StatusCode, Json<AlertView>), ApiError> {
    let identity = authenticate(&state, &headers, &CREATE_REPORT)?;

    let view = state
        .moderation_service
        .report_user(
            identity.user_id,
            UserId::from(payload.problematic_user_id),
            payload.room_id.map(RoomId::from),
        )
        .await?;

    CREATE_REPORT.emit_audit(
        &state.audit,
        &identity,
        Some(view.id.to_string()),
        format!("user {} reported", payload.problematic_user_id),
        Some(addr.to_string()),
    );
    Ok((StatusCode::CREATED, Json(view)))
}

async fn list_alerts(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<AlertView>>, ApiError> {
    authenticate(&state, &headers, &LIST_ALERTS)?;

    let views = state.moderation_service.list_alerts().await?;
    Ok(Json(views))
}

async fn update_alert_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(alert_id): Path<Uuid>,
    Json(payload): Json<UpdateStatusPayload>,
) -> Result<Json<AlertView>, ApiError> {
    let identity = authenticate(&state, &headers, &UPDATE_ALERT_STATUS)?;

    if payload.status.trim().is_empty() {
        return Err(ApiError::bad_request("status must not be empty"));
    }
    let next = AlertStatus::parse(payload.status.trim())
        .map_err(|err| ApiError::bad_request(err.to_string()))?;

    let view = state
        .moderation_service
        .update_status(AlertId::from(alert_id), next)
        .await?;

    UPDATE_ALERT_STATUS.emit_audit(
        &state.audit,
        &identity,
        Some(alert_id.to_string()),
        format!("alert status set to {}", next.as_str()),
        Some(addr.to_string()),
    );
    Ok(Json(view))
}

async fn assign_responsible(
    State(state): State<AppState>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(alert_id): Path<Uuid>,
    Json(payload): Json<AssignPayload>,
) -> Result<Json<AlertView>, ApiError> {
    let identity = authenticate(&state, &headers, &ASSIGN_RESPONSIBLE)?;

    let view = state
        .moderation_service
        .assign_responsible(
            AlertId::from(alert_id),
            payload.responsible_id.map(UserId::from),
        )
        .await?;

    ASSIGN_RESPONSIBLE.emit_audit(
        &state.audit,
        &identity,
        Some(alert_id.to_string()),
        match payload.responsible_id {
            Some(id) => format!("alert assigned to {}", id),
            None => "alert unassigned".to_string(),
        },
        Some(addr.to_string()),
    );
    Ok(Json(view))
}

/// WebSocket 握手：凭证在 token 查询参数里（传输不是普通 HTTP）。
/// 校验失败直接拒绝连接，不创建任何会话。
async fn websocket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let token = query
        .token
        .ok_or_else(|| ApiError::unauthenticated("missing token"))?;
    let identity = state.jwt_service.identity_from_token(&token)?;

    Ok(ws.on_upgrade(move |socket| async move {
        WsConnection::establish(socket, state, identity).run().await;
    }))
}
