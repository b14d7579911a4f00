use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Dialog, Message, User};

// Field names follow the client protocol, hence the renames.

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserView {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageView {
    pub id: i64,
    #[serde(rename = "created")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "dialog")]
    pub dialog_id: i64,
    pub from: UserView,
    pub to: UserView,
    #[serde(rename = "type")]
    pub message_type: String,
    pub metadata: String,
    #[serde(rename = "data")]
    pub payload: String,
    pub read: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DialogView {
    pub id: i64,
    pub owner: UserView,
    #[serde(rename = "user")]
    pub counterpart: UserView,
    pub message: MessageView,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DialogDetails {
    #[serde(rename = "details")]
    pub dialog: DialogView,
    pub messages: Vec<MessageView>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserStatus {
    pub id: i64,
    #[serde(rename = "status")]
    pub online: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InitSnapshot {
    pub dialogs: Vec<DialogView>,
    #[serde(rename = "userStatus")]
    pub presence: Vec<UserStatus>,
}

/// Both sides of a freshly written dialog turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogPair {
    pub caller: DialogView,
    pub counterpart: DialogView,
}

/// Both copies of an appended message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePair {
    pub caller: MessageView,
    pub counterpart: MessageView,
}

/// Usernames loaded for one operation. Ids without a user row resolve to an
/// empty username rather than failing the whole listing.
pub(crate) struct UserDirectory {
    users: HashMap<i64, User>,
}

impl UserDirectory {
    pub(crate) fn new(users: Vec<User>) -> Self {
        Self {
            users: users.into_iter().map(|u| (u.id, u)).collect(),
        }
    }

    pub(crate) fn contains(&self, id: i64) -> bool {
        self.users.contains_key(&id)
    }

    pub(crate) fn view(&self, id: i64) -> UserView {
        match self.users.get(&id) {
            Some(user) => UserView {
                id: user.id,
                username: user.username.clone(),
            },
            None => UserView {
                id,
                username: String::new(),
            },
        }
    }

    pub(crate) fn message_view(&self, message: &Message, dialog_id: i64) -> MessageView {
        MessageView {
            id: message.id,
            created_at: message.created_at,
            dialog_id: message.dialog_id.unwrap_or(dialog_id),
            from: self.view(message.from_user_id),
            to: self.view(message.to_user_id),
            message_type: message.message_type.clone(),
            metadata: message.metadata.clone(),
            payload: message.payload.clone(),
            read: message.read,
        }
    }

    pub(crate) fn dialog_view(&self, dialog: &Dialog, latest: &Message) -> DialogView {
        DialogView {
            id: dialog.id,
            owner: self.view(dialog.owner_id),
            counterpart: self.view(dialog.counterpart_id),
            message: self.message_view(latest, dialog.id),
        }
    }
}
