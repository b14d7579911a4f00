use serde_json::{Map, Value};

use messenger_shared::errors::{AppError, AppResult};

use crate::models::MessageType;

/// Socket.IO event names. Replies reuse the name of the inbound event.
pub mod events {
    pub const INIT: &str = "init";
    pub const DIALOG_CREATE: &str = "messenger_dialog_create";
    pub const DIALOG_MESSAGES: &str = "messenger_dialog_messages";
    pub const DIALOG_LIST: &str = "messenger_dialog_list";
    pub const SEND_MESSAGE: &str = "messenger_send_message";
    pub const READ_DIALOG: &str = "messenger_read_dialog";
    pub const USER_STATUS: &str = "messenger_user_status";

    pub const ALL: [&str; 7] = [
        INIT,
        DIALOG_CREATE,
        DIALOG_MESSAGES,
        DIALOG_LIST,
        SEND_MESSAGE,
        READ_DIALOG,
        USER_STATUS,
    ];
}

/// A client event with its arguments decoded and validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
    Init,
    CreateDialog {
        counterpart_id: i64,
        message_type: MessageType,
        payload: String,
    },
    ListMessages {
        dialog_id: i64,
    },
    ListDialogs,
    SendMessage {
        dialog_id: i64,
        message_type: MessageType,
        payload: String,
    },
    ReadDialog {
        dialog_id: i64,
    },
    UserStatus,
}

impl ClientRequest {
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientRequest::Init => events::INIT,
            ClientRequest::CreateDialog { .. } => events::DIALOG_CREATE,
            ClientRequest::ListMessages { .. } => events::DIALOG_MESSAGES,
            ClientRequest::ListDialogs => events::DIALOG_LIST,
            ClientRequest::SendMessage { .. } => events::SEND_MESSAGE,
            ClientRequest::ReadDialog { .. } => events::READ_DIALOG,
            ClientRequest::UserStatus => events::USER_STATUS,
        }
    }

    /// Decode the arguments of `event`. Clients send them positionally (a
    /// JSON array, or a bare value when there is only one) or as an object
    /// keyed by field name. Ids may be numbers or decimal strings.
    pub fn decode(event: &str, args: &Value) -> AppResult<Self> {
        let args = Args::new(args);
        let request = match event {
            events::INIT => ClientRequest::Init,
            events::DIALOG_CREATE => ClientRequest::CreateDialog {
                counterpart_id: args.id(0, &["counterpart_id", "user"])?,
                message_type: args.message_type(1)?,
                payload: args.text(2, &["payload", "data"])?,
            },
            events::DIALOG_MESSAGES => ClientRequest::ListMessages {
                dialog_id: args.id(0, &["dialog_id", "dialog"])?,
            },
            events::DIALOG_LIST => ClientRequest::ListDialogs,
            events::SEND_MESSAGE => ClientRequest::SendMessage {
                dialog_id: args.id(0, &["dialog_id", "dialog"])?,
                message_type: args.message_type(1)?,
                payload: args.text(2, &["payload", "data"])?,
            },
            events::READ_DIALOG => ClientRequest::ReadDialog {
                dialog_id: args.id(0, &["dialog_id", "dialog"])?,
            },
            events::USER_STATUS => ClientRequest::UserStatus,
            other => return Err(AppError::Validation(format!("unknown event: {other}"))),
        };
        Ok(request)
    }
}

struct Args<'a> {
    positional: Vec<&'a Value>,
    named: Option<&'a Map<String, Value>>,
}

impl<'a> Args<'a> {
    fn new(value: &'a Value) -> Self {
        match value {
            Value::Null => Self { positional: Vec::new(), named: None },
            Value::Object(map) => Self { positional: Vec::new(), named: Some(map) },
            Value::Array(items) => match items.as_slice() {
                [Value::Object(map)] => Self { positional: Vec::new(), named: Some(map) },
                _ => Self { positional: items.iter().collect(), named: None },
            },
            other => Self { positional: vec![other], named: None },
        }
    }

    fn get(&self, index: usize, names: &[&str]) -> AppResult<&'a Value> {
        let found = match self.named {
            Some(map) => names.iter().find_map(|name| map.get(*name)),
            None => self.positional.get(index).copied(),
        };
        found.ok_or_else(|| AppError::Validation(format!("missing argument `{}`", names[0])))
    }

    fn id(&self, index: usize, names: &[&str]) -> AppResult<i64> {
        let value = self.get(index, names)?;
        let id = match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        id.ok_or_else(|| AppError::Validation(format!("`{}` is not an id: {value}", names[0])))
    }

    fn text(&self, index: usize, names: &[&str]) -> AppResult<String> {
        match self.get(index, names)? {
            Value::String(s) => Ok(s.clone()),
            other => Err(AppError::Validation(format!("`{}` must be a string, got {other}", names[0]))),
        }
    }

    fn message_type(&self, index: usize) -> AppResult<MessageType> {
        self.text(index, &["type"])?.parse()
    }
}
