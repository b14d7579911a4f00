use serde::Serialize;
use serde_json::Value;

use messenger_shared::errors::{AppError, AppResult};

use crate::engine::presence::room_key;
use crate::engine::{DialogEngine, InitSnapshot};
use crate::store::Store;

use super::request::ClientRequest;

/// Where an emission goes: back to the requesting connection, or to every
/// connection in a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Caller,
    Room(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    pub target: Target,
    pub event: &'static str,
    pub payload: Value,
}

impl Emission {
    fn reply<T: Serialize>(event: &'static str, payload: &T) -> AppResult<Self> {
        Ok(Self {
            target: Target::Caller,
            event,
            payload: to_payload(payload)?,
        })
    }

    fn to_user<T: Serialize>(user_id: i64, event: &'static str, payload: &T) -> AppResult<Self> {
        Ok(Self {
            target: Target::Room(room_key(user_id)),
            event,
            payload: to_payload(payload)?,
        })
    }
}

fn to_payload<T: Serialize>(value: &T) -> AppResult<Value> {
    serde_json::to_value(value).map_err(|e| AppError::Internal(e.into()))
}

/// Maps decoded client requests onto engine operations and their replies.
pub struct Gateway<S> {
    engine: DialogEngine<S>,
}

impl<S: Store> Gateway<S> {
    pub fn new(engine: DialogEngine<S>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &DialogEngine<S> {
        &self.engine
    }

    /// Run `request` for `caller` and return what should be emitted. Callers
    /// without an identity get empty listings and nothing else.
    pub fn dispatch(&self, caller: Option<i64>, request: ClientRequest) -> AppResult<Vec<Emission>> {
        let event = request.event_name();
        let Some(caller_id) = caller else {
            return anonymous(request);
        };

        let emissions = match request {
            ClientRequest::Init => {
                vec![Emission::reply(event, &self.engine.initialize(caller_id)?)?]
            }
            ClientRequest::CreateDialog {
                counterpart_id,
                message_type,
                payload,
            } => match self.engine.create_dialog(caller_id, counterpart_id, message_type, &payload)? {
                Some(pair) => vec![
                    Emission::reply(event, &pair.caller)?,
                    Emission::to_user(counterpart_id, event, &pair.counterpart)?,
                ],
                None => Vec::new(),
            },
            ClientRequest::ListMessages { dialog_id } => {
                vec![Emission::reply(event, &self.engine.list_messages(caller_id, dialog_id)?)?]
            }
            ClientRequest::ListDialogs => {
                vec![Emission::reply(event, &self.engine.list_dialogs(caller_id)?)?]
            }
            ClientRequest::SendMessage {
                dialog_id,
                message_type,
                payload,
            } => {
                let pair = self.engine.append_message(caller_id, dialog_id, message_type, &payload)?;
                let recipient = pair.counterpart.to.id;
                vec![
                    Emission::reply(event, &pair.caller)?,
                    Emission::to_user(recipient, event, &pair.counterpart)?,
                ]
            }
            ClientRequest::ReadDialog { dialog_id } => {
                self.engine.mark_read(dialog_id)?;
                Vec::new()
            }
            ClientRequest::UserStatus => {
                vec![Emission::reply(event, &self.engine.query_presence(caller_id)?)?]
            }
        };
        Ok(emissions)
    }

    /// Send room emissions through the transport and hand caller replies to
    /// `reply`.
    pub fn deliver(&self, emissions: Vec<Emission>, mut reply: impl FnMut(&str, &Value)) {
        for emission in emissions {
            match &emission.target {
                Target::Caller => reply(emission.event, &emission.payload),
                Target::Room(room) => {
                    if !self.engine.transport().emit_to_room(room, emission.event, &emission.payload) {
                        tracing::debug!(room = %room, event = emission.event, "counterpart offline, emission dropped");
                    }
                }
            }
        }
    }
}

fn anonymous(request: ClientRequest) -> AppResult<Vec<Emission>> {
    let event = request.event_name();
    match request {
        ClientRequest::Init => Ok(vec![Emission::reply(event, &InitSnapshot::default())?]),
        ClientRequest::ListDialogs | ClientRequest::UserStatus => {
            Ok(vec![Emission::reply(event, &Vec::<Value>::new())?])
        }
        _ => {
            tracing::debug!(event, "ignoring request from anonymous connection");
            Ok(Vec::new())
        }
    }
}
