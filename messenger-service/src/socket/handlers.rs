use std::sync::Arc;

use metrics::counter;
use serde_json::Value;
use socketioxide::extract::{Data, SocketRef};
use socketioxide::socket::DisconnectReason;

use messenger_shared::errors::AppError;
use messenger_shared::types::auth::AuthUser;

use crate::engine::presence::room_key;
use crate::AppState;

use super::identity;
use super::request::{events, ClientRequest};

fn get_user_id(socket: &SocketRef) -> Option<i64> {
    socket.extensions.get::<AuthUser>().map(|user| user.id)
}

pub async fn on_connect_with_state(socket: SocketRef, state: Arc<AppState>) {
    let query = socket.req_parts().uri.query().map(str::to_owned);
    let user_id = identity::resolve(
        query.as_deref(),
        &state.config.jwt_access_key,
        state.config.jwt_leeway_secs,
    );

    match user_id {
        Some(id) => {
            socket.extensions.insert(AuthUser { id });
            // Presence is read from this room.
            socket.join(room_key(id)).ok();
            tracing::info!(user_id = id, sid = %socket.id, "messenger socket connected");
        }
        None => {
            tracing::info!(sid = %socket.id, "anonymous messenger socket connected");
        }
    }

    for event in events::ALL {
        socket.on(event, {
            let state = state.clone();
            move |socket: SocketRef, Data::<Value>(args)| {
                let state = state.clone();
                async move {
                    handle_event(socket, event, args, &state).await;
                }
            }
        });
    }

    socket.on_disconnect(|socket: SocketRef, reason: DisconnectReason| async move {
        match get_user_id(&socket) {
            Some(user_id) => {
                tracing::info!(user_id, sid = %socket.id, reason = ?reason, "messenger socket disconnected")
            }
            None => tracing::debug!(sid = %socket.id, reason = ?reason, "anonymous socket disconnected"),
        }
    });
}

async fn handle_event(socket: SocketRef, event: &'static str, args: Value, state: &Arc<AppState>) {
    counter!("messenger_events_total", "event" => event).increment(1);
    let user_id = get_user_id(&socket);

    let request = match ClientRequest::decode(event, &args) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, event, user_id = ?user_id, sid = %socket.id, "rejected malformed request");
            return;
        }
    };

    let emissions = match state.gateway.dispatch(user_id, request) {
        Ok(emissions) => emissions,
        Err(e) => {
            match &e {
                AppError::Database(_) | AppError::Pool(_) | AppError::Internal(_) => {
                    tracing::error!(error = %e, event, user_id = ?user_id, "request aborted")
                }
                _ => tracing::warn!(error = %e, code = ?e.code(), event, user_id = ?user_id, "request rejected"),
            }
            return;
        }
    };

    state.gateway.deliver(emissions, |event, payload| {
        if let Err(e) = socket.emit(event.to_string(), payload) {
            tracing::warn!(error = %e, event = %event, sid = %socket.id, "reply emit failed");
        }
    });
}
