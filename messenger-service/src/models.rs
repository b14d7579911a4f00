use std::str::FromStr;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use messenger_shared::errors::{AppError, ErrorCode};

use crate::schema::{messenger_dialogs, messenger_images, messenger_messages, users};

// --- MessageType ---

/// Supported message kinds. `Image` messages carry the id of a stored image
/// as their payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
        }
    }
}

impl FromStr for MessageType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageType::Text),
            "image" => Ok(MessageType::Image),
            _ => Err(AppError::new(
                ErrorCode::UnsupportedMessageType,
                format!("unsupported message type: {s}"),
            )),
        }
    }
}

// --- User ---

#[derive(Debug, Queryable, Selectable, Identifiable, Clone, PartialEq, Eq)]
#[diesel(table_name = users)]
pub struct User {
    pub id: i64,
    pub username: String,
}

// --- Image ---

#[derive(Debug, Queryable, Selectable, Identifiable, Clone)]
#[diesel(table_name = messenger_images)]
pub struct Image {
    pub id: i64,
    pub data: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = messenger_images)]
pub struct NewImage<'a> {
    pub data: &'a str,
}

// --- Message ---

#[derive(Debug, Queryable, Selectable, Identifiable, Clone, PartialEq, Eq)]
#[diesel(table_name = messenger_messages)]
pub struct Message {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub from_user_id: i64,
    pub to_user_id: i64,
    pub dialog_id: Option<i64>,
    pub message_type: String,
    pub metadata: String,
    pub payload: String,
    pub read: bool,
}

impl Message {
    /// True when both rows carry the same conversation turn, read state aside.
    pub fn same_content(&self, other: &Message) -> bool {
        self.from_user_id == other.from_user_id
            && self.to_user_id == other.to_user_id
            && self.message_type == other.message_type
            && self.metadata == other.metadata
            && self.payload == other.payload
    }
}

#[derive(Debug, Insertable, Clone)]
#[diesel(table_name = messenger_messages)]
pub struct NewMessage {
    pub from_user_id: i64,
    pub to_user_id: i64,
    pub dialog_id: Option<i64>,
    pub message_type: String,
    pub metadata: String,
    pub payload: String,
    pub read: bool,
}

impl NewMessage {
    pub fn new(from_user_id: i64, to_user_id: i64, message_type: MessageType, payload: &str) -> Self {
        Self {
            from_user_id,
            to_user_id,
            dialog_id: None,
            message_type: message_type.as_str().to_string(),
            metadata: String::new(),
            payload: payload.to_string(),
            read: false,
        }
    }

    pub fn in_dialog(mut self, dialog_id: i64) -> Self {
        self.dialog_id = Some(dialog_id);
        self
    }

    pub fn read(mut self, read: bool) -> Self {
        self.read = read;
        self
    }
}

// --- Dialog ---

#[derive(Debug, Queryable, Selectable, Identifiable, Clone, PartialEq, Eq)]
#[diesel(table_name = messenger_dialogs)]
pub struct Dialog {
    pub id: i64,
    pub owner_id: i64,
    pub counterpart_id: i64,
    pub latest_message_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable, Clone, Copy)]
#[diesel(table_name = messenger_dialogs)]
pub struct NewDialog {
    pub owner_id: i64,
    pub counterpart_id: i64,
    pub latest_message_id: i64,
}
