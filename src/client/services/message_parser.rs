//! Wire format of the real-time channel. Every frame is a JSON text message
//! `{"event": "<name>", "data": {...}}`.

use crate::common::models::{Comment, ContentType, Notification, Post};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NewNotification,
    NewLike,
    NewComment,
    NewPost,
    PostUpdated,
    PostDeleted,
    UserOnline,
    UserOffline,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::NewNotification,
        EventKind::NewLike,
        EventKind::NewComment,
        EventKind::NewPost,
        EventKind::PostUpdated,
        EventKind::PostDeleted,
        EventKind::UserOnline,
        EventKind::UserOffline,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::NewNotification => "new_notification",
            EventKind::NewLike => "new_like",
            EventKind::NewComment => "new_comment",
            EventKind::NewPost => "new_post",
            EventKind::PostUpdated => "post_updated",
            EventKind::PostDeleted => "post_deleted",
            EventKind::UserOnline => "user_online",
            EventKind::UserOffline => "user_offline",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LikeEvent {
    pub content_id: String,
    pub content_type: ContentType,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub like_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostDeleted {
    pub post_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceUser {
    pub user_id: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentCount {
    pub post_id: String,
    pub comment_count: u64,
}

/// Events pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    NewNotification(Notification),
    NewLike(LikeEvent),
    NewComment(Comment),
    NewPost(Post),
    PostUpdated(Post),
    PostDeleted(PostDeleted),
    UserOnline(PresenceUser),
    UserOffline(PresenceUser),
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::NewNotification(_) => EventKind::NewNotification,
            ServerEvent::NewLike(_) => EventKind::NewLike,
            ServerEvent::NewComment(_) => EventKind::NewComment,
            ServerEvent::NewPost(_) => EventKind::NewPost,
            ServerEvent::PostUpdated(_) => EventKind::PostUpdated,
            ServerEvent::PostDeleted(_) => EventKind::PostDeleted,
            ServerEvent::UserOnline(_) => EventKind::UserOnline,
            ServerEvent::UserOffline(_) => EventKind::UserOffline,
        }
    }
}

/// Events emitted by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    Auth {
        token: String,
        #[serde(rename = "userId")]
        user_id: String,
    },
    JoinRoom { room: String },
    LeaveRoom { room: String },
    LikeUpdate(LikeEvent),
    CommentUpdate(CommentCount),
    PostUpdate(Post),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Auth { .. } => "auth",
            ClientEvent::JoinRoom { .. } => "join_room",
            ClientEvent::LeaveRoom { .. } => "leave_room",
            ClientEvent::LikeUpdate(_) => "like_update",
            ClientEvent::CommentUpdate(_) => "comment_update",
            ClientEvent::PostUpdate(_) => "post_update",
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub success: bool,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Event(ServerEvent),
    AuthResponse(AuthResponse),
    /// Well-formed frame with an event name this client does not handle.
    Unknown(String),
}

/// Parses one text frame from the channel.
pub fn parse_frame(text: &str) -> Result<Inbound, String> {
    let generic: serde_json::Value = serde_json::from_str(text).map_err(|e| format!("Invalid JSON: {}", e))?;

    let event = generic
        .get("event")
        .and_then(|v| v.as_str())
        .ok_or("Missing event field")?;

    if event == "auth_response" {
        let data = generic.get("data").cloned().unwrap_or(serde_json::Value::Null);
        let response = serde_json::from_value(data).map_err(|e| format!("Failed to parse auth_response: {}", e))?;
        return Ok(Inbound::AuthResponse(response));
    }

    if EventKind::from_name(event).is_none() {
        return Ok(Inbound::Unknown(event.to_string()));
    }

    serde_json::from_value::<ServerEvent>(generic.clone())
        .map(Inbound::Event)
        .map_err(|e| format!("Failed to parse {}: {}", event, e))
}
