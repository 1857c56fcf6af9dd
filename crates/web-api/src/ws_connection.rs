//! WebSocket 连接管理器
//!
//! 拥有单条传输层会话的完整生命周期：
//! - 握手成功后注册在线会话并登记到会话注册表
//! - 转发客户端心跳给在线状态跟踪器
//! - 宽限期内没有任何心跳就主动拆除连接（与跟踪器的后台清扫互为冗余，
//!   任一侧先动手都可以）
//! - 断开时恰好注销一次；传输错误与显式关闭赛跑也不会二次递减
//!
//! 重连是客户端的责任：新的握手永远产生全新的会话ID，
//! 历史消息走持久层查询，不从旧会话继承任何状态。

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use application::services::PostMessageRequest;
use application::MessageDto;
use domain::RoomId;

use crate::auth::Identity;
use crate::error::ApiError;
use crate::state::AppState;

/// 客户端入站帧
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientEvent {
    /// 心跳，无额外负载；服务端不显式应答
    Heartbeat,
    /// 发消息
    Send { room_id: Uuid, content: String },
}

/// 服务端出站帧
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerEvent {
    Message { message: MessageDto },
    Error { code: String, message: String },
}

pub struct WsConnection {
    socket: WebSocket,
    state: AppState,
    identity: Identity,
}

impl WsConnection {
    pub fn establish(socket: WebSocket, state: AppState, identity: Identity) -> Self {
        Self {
            socket,
            state,
            identity,
        }
    }

    pub async fn run(self) {
        let Self {
            socket,
            state,
            identity,
        } = self;

        let session_id = state
            .presence
            .register_session(identity.user_id, identity.role)
            .await;
        let outbound = state
            .registry
            .register(session_id, identity.user_id, identity.role)
            .await;

        tracing::info!(
            user_id = %identity.user_id,
            session_id = %session_id,
            "WebSocket 连接已建立"
        );

        Self::run_loop(socket, &state, &identity, session_id, outbound).await;

        // 唯一的拆除点：注册表与跟踪器的注销都幂等
        state.registry.unregister(session_id).await;
        state.presence.unregister_session(session_id).await;

        tracing::info!(
            user_id = %identity.user_id,
            session_id = %session_id,
            "WebSocket 连接已断开，会话已注销"
        );
    }

    async fn run_loop(
        socket: WebSocket,
        state: &AppState,
        identity: &Identity,
        session_id: domain::SessionId,
        mut outbound: mpsc::Receiver<MessageDto>,
    ) {
        let grace = std::time::Duration::from_secs(state.presence_config.grace_period_secs());
        let (mut sender, mut incoming) = socket.split();

        let deadline = tokio::time::sleep(grace);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                frame = incoming.next() => {
                    match frame {
                        None => break,
                        Some(Err(err)) => {
                            tracing::debug!(error = %err, session_id = %session_id, "传输错误，断开连接");
                            break;
                        }
                        Some(Ok(WsMessage::Close(_))) => {
                            tracing::debug!(session_id = %session_id, "收到关闭帧");
                            break;
                        }
                        Some(Ok(WsMessage::Ping(data))) => {
                            // 传输层 ping 同样视为活性信号
                            state.presence.heartbeat(session_id).await;
                            deadline.as_mut().reset(tokio::time::Instant::now() + grace);
                            if sender.send(WsMessage::Pong(data)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(WsMessage::Pong(_))) => {}
                        Some(Ok(WsMessage::Text(text))) => {
                            match serde_json::from_str::<ClientEvent>(&text) {
                                Ok(ClientEvent::Heartbeat) => {
                                    state.presence.heartbeat(session_id).await;
                                    deadline.as_mut().reset(tokio::time::Instant::now() + grace);
                                }
                                Ok(ClientEvent::Send { room_id, content }) => {
                                    let result = state
                                        .chat_service
                                        .post_message(PostMessageRequest {
                                            room_id: RoomId::from(room_id),
                                            sender_id: identity.user_id,
                                            sender_role: identity.role,
                                            content,
                                        })
                                        .await;
                                    // 成功的回显走分发路径（发送者自己的会话也是目标）
                                    if let Err(err) = result {
                                        let api: ApiError = err.into();
                                        if Self::send_event(
                                            &mut sender,
                                            &ServerEvent::Error {
                                                code: api.code().to_string(),
                                                message: api.message().to_string(),
                                            },
                                        )
                                        .await
                                        .is_err()
                                        {
                                            break;
                                        }
                                    }
                                }
                                Err(err) => {
                                    tracing::debug!(error = %err, "无法解析的客户端帧");
                                    if Self::send_event(
                                        &mut sender,
                                        &ServerEvent::Error {
                                            code: "BAD_FRAME".to_string(),
                                            message: "unrecognized client frame".to_string(),
                                        },
                                    )
                                    .await
                                    .is_err()
                                    {
                                        break;
                                    }
                                }
                            }
                        }
                        Some(Ok(WsMessage::Binary(_))) => {
                            tracing::debug!(session_id = %session_id, "忽略二进制帧");
                        }
                    }
                }
                delivery = outbound.recv() => {
                    match delivery {
                        Some(message) => {
                            if Self::send_event(&mut sender, &ServerEvent::Message { message })
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                        // 注册表侧已经移除了句柄
                        None => break,
                    }
                }
                _ = &mut deadline => {
                    tracing::info!(
                        session_id = %session_id,
                        "宽限期内没有心跳，主动拆除连接"
                    );
                    break;
                }
            }
        }
    }

    async fn send_event(
        sender: &mut (impl SinkExt<WsMessage> + Unpin),
        event: &ServerEvent,
    ) -> Result<(), ()> {
        let payload = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize websocket payload");
                return Ok(());
            }
        };
        sender
            .send(WsMessage::Text(payload.into()))
            .await
            .map_err(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_frame_parsing() {
        let heartbeat: ClientEvent = serde_json::from_str(r#"{"type":"heartbeat"}"#).unwrap();
        assert!(matches!(heartbeat, ClientEvent::Heartbeat));

        let room_id = Uuid::new_v4();
        let send: ClientEvent = serde_json::from_str(&format!(
            r#"{{"type":"send","room_id":"{room_id}","content":"hi"}}"#
        ))
        .unwrap();
        match send {
            ClientEvent::Send {
                room_id: parsed,
                content,
            } => {
                assert_eq!(parsed, room_id);
                assert_eq!(content, "hi");
            }
            other => panic!("unexpected frame: {other:?}"),
        }

        assert!(serde_json::from_str::<ClientEvent>(r#"{"type":"subscribe"}"#).is_err());
    }

    #[test]
    fn test_server_error_frame_shape() {
        let frame = ServerEvent::Error {
            code: "ROOM_NOT_FOUND".to_string(),
            message: "room not found".to_string(),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "ROOM_NOT_FOUND");
    }
}
