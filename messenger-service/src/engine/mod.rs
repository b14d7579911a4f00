//! Dialog synchronization engine.
//!
//! Every conversation between two users is stored twice: each side owns a
//! dialog row pointing at the other, and every turn writes one message into
//! each dialog. The sender's copy is born read, the recipient's copy unread,
//! so read state stays independent per owner. All multi-row sequences run
//! inside one store transaction.

pub mod presence;
pub mod views;

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;

use messenger_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{Dialog, Message, MessageType, NewDialog, NewMessage};
use crate::store::{DialogFilter, Repo, Store};
use crate::transport::Transport;

use views::UserDirectory;
pub use views::{
    DialogDetails, DialogPair, DialogView, InitSnapshot, MessagePair, MessageView, UserStatus,
    UserView,
};

pub struct DialogEngine<S> {
    store: Arc<S>,
    transport: Arc<dyn Transport>,
}

impl<S> Clone for DialogEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            transport: self.transport.clone(),
        }
    }
}

impl<S: Store> DialogEngine<S> {
    pub fn new(store: Arc<S>, transport: Arc<dyn Transport>) -> Self {
        Self { store, transport }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Dialogs owned by `caller_id` plus the presence of each counterpart.
    pub fn initialize(&self, caller_id: i64) -> AppResult<InitSnapshot> {
        let dialogs = self.list_dialogs(caller_id)?;
        let rooms = self.transport.active_rooms();
        let presence = presence::statuses(dialogs.iter().map(|d| d.counterpart.id), &rooms);
        Ok(InitSnapshot { dialogs, presence })
    }

    pub fn list_dialogs(&self, caller_id: i64) -> AppResult<Vec<DialogView>> {
        self.store.read(|repo| {
            let dialogs = repo.find_dialogs(&DialogFilter::owned_by(caller_id))?;
            dialog_views(repo, &dialogs)
        })
    }

    pub fn query_presence(&self, caller_id: i64) -> AppResult<Vec<UserStatus>> {
        let dialogs = self
            .store
            .read(|repo| repo.find_dialogs(&DialogFilter::owned_by(caller_id)))?;
        let rooms = self.transport.active_rooms();
        Ok(presence::statuses(dialogs.iter().map(|d| d.counterpart_id), &rooms))
    }

    /// Start a conversation with `counterpart_id`.
    ///
    /// Returns `None` without touching the store when a user addresses
    /// themselves. If the pair already exists the message is appended to it
    /// instead, so there is never more than one dialog per owner/counterpart.
    pub fn create_dialog(
        &self,
        caller_id: i64,
        counterpart_id: i64,
        message_type: MessageType,
        payload: &str,
    ) -> AppResult<Option<DialogPair>> {
        if caller_id == counterpart_id {
            tracing::debug!(user_id = caller_id, "ignoring dialog with self");
            return Ok(None);
        }

        let (pair, created) = self.store.transaction(|repo| {
            let users = UserDirectory::new(repo.find_users(&[caller_id, counterpart_id])?);
            for id in [caller_id, counterpart_id] {
                if !users.contains(id) {
                    return Err(AppError::new(ErrorCode::UserNotFound, format!("user {id} not found")));
                }
            }
            repo.lock_pair(&pair_key(caller_id, counterpart_id))?;

            let own = repo.find_dialog(&DialogFilter::pair(caller_id, counterpart_id))?;
            let mirror = repo.find_dialog(&DialogFilter::pair(counterpart_id, caller_id))?;
            match (own, mirror) {
                (None, None) => {
                    let payload = store_payload(repo, message_type, payload)?;
                    let message = NewMessage::new(caller_id, counterpart_id, message_type, &payload);
                    let (own, own_message) =
                        create_side(repo, caller_id, counterpart_id, message.clone().read(true))?;
                    let (mirror, mirror_message) =
                        create_side(repo, counterpart_id, caller_id, message)?;
                    let pair = DialogPair {
                        caller: users.dialog_view(&own, &own_message),
                        counterpart: users.dialog_view(&mirror, &mirror_message),
                    };
                    Ok((pair, true))
                }
                (Some(own), Some(mirror)) => {
                    let turn = append_turn(repo, &own, &mirror, message_type, payload)?;
                    let pair = DialogPair {
                        caller: users.dialog_view(&turn.own_dialog, &turn.own_message),
                        counterpart: users.dialog_view(&turn.mirror_dialog, &turn.mirror_message),
                    };
                    Ok((pair, false))
                }
                (own, mirror) => {
                    let existing = own.or(mirror).map(|d| d.id);
                    Err(mirror_fault(caller_id, counterpart_id, existing))
                }
            }
        })?;

        if created {
            counter!("messenger_dialogs_created_total").increment(1);
            tracing::info!(
                user_id = caller_id,
                counterpart_id,
                dialog_id = pair.caller.id,
                mirror_dialog_id = pair.counterpart.id,
                "dialog pair created"
            );
        } else {
            counter!("messenger_messages_sent_total").increment(1);
            tracing::info!(
                user_id = caller_id,
                counterpart_id,
                dialog_id = pair.caller.id,
                "dialog pair already existed, message appended"
            );
        }

        Ok(Some(pair))
    }

    /// Write one turn into `dialog_id` (owned by the caller) and its mirror.
    pub fn append_message(
        &self,
        caller_id: i64,
        dialog_id: i64,
        message_type: MessageType,
        payload: &str,
    ) -> AppResult<MessagePair> {
        let pair = self.store.transaction(|repo| {
            let own = owned_dialog(repo, caller_id, dialog_id)?;
            repo.lock_pair(&pair_key(caller_id, own.counterpart_id))?;
            let mirror = repo
                .find_dialog(&DialogFilter::pair(own.counterpart_id, caller_id))?
                .ok_or_else(|| mirror_fault(caller_id, own.counterpart_id, Some(own.id)))?;

            let users = UserDirectory::new(repo.find_users(&[caller_id, own.counterpart_id])?);
            let turn = append_turn(repo, &own, &mirror, message_type, payload)?;
            Ok(MessagePair {
                caller: users.message_view(&turn.own_message, turn.own_dialog.id),
                counterpart: users.message_view(&turn.mirror_message, turn.mirror_dialog.id),
            })
        })?;

        counter!("messenger_messages_sent_total").increment(1);
        tracing::debug!(
            user_id = caller_id,
            dialog_id,
            message_id = pair.caller.id,
            mirror_dialog_id = pair.counterpart.dialog_id,
            "message appended"
        );
        Ok(pair)
    }

    /// Full history of a dialog owned by the caller, oldest first. Opening a
    /// dialog marks all of its messages read; the returned messages carry the
    /// read flags as they were before.
    pub fn list_messages(&self, caller_id: i64, dialog_id: i64) -> AppResult<DialogDetails> {
        self.store.transaction(|repo| {
            let dialog = owned_dialog(repo, caller_id, dialog_id)?;
            let messages = repo.find_messages(dialog.id)?;
            let marked = repo.mark_dialog_read(dialog.id)?;
            let latest = latest_message(repo, &dialog)?;
            let users = UserDirectory::new(repo.find_users(&[dialog.owner_id, dialog.counterpart_id])?);

            tracing::debug!(user_id = caller_id, dialog_id, count = messages.len(), marked, "dialog opened");
            Ok(DialogDetails {
                dialog: users.dialog_view(&dialog, &latest),
                messages: messages
                    .iter()
                    .map(|m| users.message_view(m, dialog.id))
                    .collect(),
            })
        })
    }

    /// Mark every message of `dialog_id` read. Ownership is not checked: any
    /// identified connection that knows the id may do this.
    pub fn mark_read(&self, dialog_id: i64) -> AppResult<usize> {
        let marked = self.store.transaction(|repo| repo.mark_dialog_read(dialog_id))?;
        tracing::debug!(dialog_id, marked, "dialog marked read");
        Ok(marked)
    }
}

/// The dialog rows and messages written by one appended turn.
struct Turn {
    own_dialog: Dialog,
    own_message: Message,
    mirror_dialog: Dialog,
    mirror_message: Message,
}

/// Lock key shared by both directions of a conversation. Every write to a
/// dialog pair holds it, so concurrent creates and appends for the same two
/// users run one after the other.
pub fn pair_key(a: i64, b: i64) -> String {
    format!("messenger:dialog:{}:{}", a.min(b), a.max(b))
}

fn owned_dialog(repo: &mut dyn Repo, caller_id: i64, dialog_id: i64) -> AppResult<Dialog> {
    repo.find_dialog(&DialogFilter::by_id(dialog_id).and_owner(caller_id))?
        .ok_or_else(|| AppError::new(ErrorCode::DialogNotFound, format!("dialog {dialog_id} not found")))
}

fn latest_message(repo: &mut dyn Repo, dialog: &Dialog) -> AppResult<Message> {
    repo.find_messages_by_ids(&[dialog.latest_message_id])?
        .into_iter()
        .next()
        .ok_or_else(|| {
            AppError::internal(format!(
                "dialog {} points at missing message {}",
                dialog.id, dialog.latest_message_id
            ))
        })
}

/// Image payloads are stored first and replaced by the new image id.
fn store_payload(repo: &mut dyn Repo, message_type: MessageType, payload: &str) -> AppResult<String> {
    match message_type {
        MessageType::Text => Ok(payload.to_string()),
        MessageType::Image => Ok(repo.create_image(payload)?.to_string()),
    }
}

/// Message, then the dialog pointing at it, then the message stamped with
/// the new dialog id.
fn create_side(
    repo: &mut dyn Repo,
    owner_id: i64,
    counterpart_id: i64,
    message: NewMessage,
) -> AppResult<(Dialog, Message)> {
    let message = repo.create_message(&message)?;
    let dialog = repo.create_dialog(&NewDialog {
        owner_id,
        counterpart_id,
        latest_message_id: message.id,
    })?;
    let message = repo.stamp_message_dialog(message.id, dialog.id)?;
    Ok((dialog, message))
}

fn append_turn(
    repo: &mut dyn Repo,
    own: &Dialog,
    mirror: &Dialog,
    message_type: MessageType,
    payload: &str,
) -> AppResult<Turn> {
    let payload = store_payload(repo, message_type, payload)?;
    let message = NewMessage::new(own.owner_id, own.counterpart_id, message_type, &payload);

    let own_message = repo.create_message(&message.clone().in_dialog(own.id).read(true))?;
    let mirror_message = repo.create_message(&message.in_dialog(mirror.id))?;

    // Dialog rows are always updated in ascending id order, whichever side sends.
    let (own_dialog, mirror_dialog) = if own.id < mirror.id {
        let own_dialog = repo.set_latest_message(own.id, own_message.id)?;
        (own_dialog, repo.set_latest_message(mirror.id, mirror_message.id)?)
    } else {
        let mirror_dialog = repo.set_latest_message(mirror.id, mirror_message.id)?;
        (repo.set_latest_message(own.id, own_message.id)?, mirror_dialog)
    };

    Ok(Turn {
        own_dialog,
        own_message,
        mirror_dialog,
        mirror_message,
    })
}

fn mirror_fault(owner_id: i64, counterpart_id: i64, dialog_id: Option<i64>) -> AppError {
    counter!("messenger_consistency_faults_total").increment(1);
    tracing::error!(
        user_id = owner_id,
        counterpart_id,
        dialog_id = ?dialog_id,
        "mirrored dialog missing, refusing to write a one-sided turn"
    );
    AppError::with_details(
        ErrorCode::MirrorDialogMissing,
        format!("dialog pair {owner_id} <-> {counterpart_id} is incomplete"),
        serde_json::json!({ "owner_id": owner_id, "counterpart_id": counterpart_id, "dialog_id": dialog_id }),
    )
}

fn dialog_views(repo: &mut dyn Repo, dialogs: &[Dialog]) -> AppResult<Vec<DialogView>> {
    if dialogs.is_empty() {
        return Ok(Vec::new());
    }

    let latest_ids: Vec<i64> = dialogs.iter().map(|d| d.latest_message_id).collect();
    let latest: HashMap<i64, Message> = repo
        .find_messages_by_ids(&latest_ids)?
        .into_iter()
        .map(|m| (m.id, m))
        .collect();

    let mut user_ids: Vec<i64> = dialogs
        .iter()
        .flat_map(|d| [d.owner_id, d.counterpart_id])
        .chain(latest.values().flat_map(|m| [m.from_user_id, m.to_user_id]))
        .collect();
    user_ids.sort_unstable();
    user_ids.dedup();
    let users = UserDirectory::new(repo.find_users(&user_ids)?);

    Ok(dialogs
        .iter()
        .filter_map(|dialog| match latest.get(&dialog.latest_message_id) {
            Some(message) => Some(users.dialog_view(dialog, message)),
            None => {
                tracing::warn!(
                    dialog_id = dialog.id,
                    message_id = dialog.latest_message_id,
                    "dialog points at missing message, skipped"
                );
                None
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreOp};
    use crate::transport::InProcessTransport;

    struct Fixture {
        store: Arc<MemoryStore>,
        transport: Arc<InProcessTransport>,
        engine: DialogEngine<MemoryStore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        store.insert_user(7, "alice");
        store.insert_user(12, "bob");
        store.insert_user(30, "carol");
        let transport = Arc::new(InProcessTransport::new());
        let engine = DialogEngine::new(store.clone(), transport.clone());
        Fixture { store, transport, engine }
    }

    fn messages_of(store: &MemoryStore, dialog_id: i64) -> Vec<Message> {
        store.read(|repo| repo.find_messages(dialog_id)).unwrap()
    }

    fn dialog_row(store: &MemoryStore, dialog_id: i64) -> Dialog {
        store
            .read(|repo| repo.find_dialog(&DialogFilter::by_id(dialog_id)))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn create_dialog_writes_two_mirrored_rows_each() {
        let f = fixture();
        let pair = f
            .engine
            .create_dialog(7, 12, MessageType::Text, "hello")
            .unwrap()
            .unwrap();

        assert_eq!(f.store.dialog_count(), 2);
        assert_eq!(f.store.message_count(), 2);

        assert_eq!(pair.caller.owner.id, 7);
        assert_eq!(pair.caller.counterpart.id, 12);
        assert!(pair.caller.message.read);
        assert_eq!(pair.counterpart.owner.id, 12);
        assert_eq!(pair.counterpart.counterpart.id, 7);
        assert!(!pair.counterpart.message.read);

        let own = messages_of(&f.store, pair.caller.id);
        let mirror = messages_of(&f.store, pair.counterpart.id);
        assert_eq!(own.len(), 1);
        assert_eq!(mirror.len(), 1);
        assert!(own[0].same_content(&mirror[0]));
        assert_ne!(own[0].id, mirror[0].id);
        assert_eq!(own[0].metadata, "");

        assert_eq!(dialog_row(&f.store, pair.caller.id).latest_message_id, own[0].id);
        assert_eq!(dialog_row(&f.store, pair.counterpart.id).latest_message_id, mirror[0].id);
    }

    #[test]
    fn created_messages_are_stamped_with_their_dialog() {
        let f = fixture();
        let pair = f.engine.create_dialog(7, 12, MessageType::Text, "hello").unwrap().unwrap();
        assert_eq!(pair.caller.message.dialog_id, pair.caller.id);
        assert_eq!(pair.counterpart.message.dialog_id, pair.counterpart.id);
        assert_eq!(messages_of(&f.store, pair.caller.id)[0].dialog_id, Some(pair.caller.id));
    }

    #[test]
    fn dialog_with_self_is_a_silent_no_op() {
        let f = fixture();
        let result = f.engine.create_dialog(7, 7, MessageType::Text, "me").unwrap();
        assert!(result.is_none());
        assert_eq!(f.store.dialog_count(), 0);
        assert_eq!(f.store.message_count(), 0);
    }

    #[test]
    fn dialog_with_unknown_user_writes_nothing() {
        let f = fixture();
        let err = f.engine.create_dialog(7, 999, MessageType::Text, "hi").unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::UserNotFound));
        assert_eq!(f.store.message_count(), 0);
    }

    #[test]
    fn failure_midway_through_create_leaves_no_rows() {
        let f = fixture();
        // The counterpart side (steps 4-6) fails after the caller side exists.
        f.store.fail_dialogs_owned_by(12);
        let result = f.engine.create_dialog(7, 12, MessageType::Image, "aGVsbG8=");
        assert!(result.is_err());
        assert_eq!(f.store.dialog_count(), 0);
        assert_eq!(f.store.message_count(), 0);
        assert_eq!(f.store.image_count(), 0);
    }

    #[test]
    fn image_payload_is_replaced_by_image_id() {
        let f = fixture();
        let pair = f.engine.create_dialog(7, 12, MessageType::Image, "aGVsbG8=").unwrap().unwrap();
        assert_eq!(f.store.image_count(), 1);

        let image_id: i64 = pair.caller.message.payload.parse().unwrap();
        let image = f.store.read(|repo| repo.find_image(image_id)).unwrap().unwrap();
        assert_eq!(image.data, "aGVsbG8=");
        assert_eq!(pair.counterpart.message.payload, pair.caller.message.payload);
        assert_eq!(pair.caller.message.message_type, "image");
    }

    #[test]
    fn second_create_reuses_existing_pair() {
        let f = fixture();
        let first = f.engine.create_dialog(7, 12, MessageType::Text, "one").unwrap().unwrap();
        let second = f.engine.create_dialog(12, 7, MessageType::Text, "two").unwrap().unwrap();

        assert_eq!(f.store.dialog_count(), 2);
        assert_eq!(second.caller.id, first.counterpart.id);
        assert_eq!(second.counterpart.id, first.caller.id);
        assert_eq!(second.caller.message.from.id, 12);
        assert_eq!(messages_of(&f.store, first.caller.id).len(), 2);
    }

    #[test]
    fn append_updates_both_sides() {
        let f = fixture();
        let pair = f.engine.create_dialog(7, 12, MessageType::Text, "hello").unwrap().unwrap();
        let sent = f
            .engine
            .append_message(12, pair.counterpart.id, MessageType::Text, "hi back")
            .unwrap();

        assert_eq!(f.store.dialog_count(), 2);
        assert_eq!(f.store.message_count(), 4);
        assert!(sent.caller.read);
        assert!(!sent.counterpart.read);
        assert_eq!(sent.caller.dialog_id, pair.counterpart.id);
        assert_eq!(sent.counterpart.dialog_id, pair.caller.id);
        assert_eq!(sent.caller.from.id, 12);
        assert_eq!(sent.caller.to.id, 7);
        assert_eq!(sent.counterpart.from, sent.caller.from);
        assert_eq!(sent.counterpart.payload, "hi back");

        assert_eq!(dialog_row(&f.store, pair.counterpart.id).latest_message_id, sent.caller.id);
        assert_eq!(dialog_row(&f.store, pair.caller.id).latest_message_id, sent.counterpart.id);
    }

    #[test]
    fn append_to_foreign_dialog_is_rejected() {
        let f = fixture();
        let pair = f.engine.create_dialog(7, 12, MessageType::Text, "hello").unwrap().unwrap();
        let err = f
            .engine
            .append_message(30, pair.caller.id, MessageType::Text, "intrude")
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::DialogNotFound));
        assert_eq!(f.store.message_count(), 2);
    }

    #[test]
    fn append_without_mirror_is_a_consistency_fault() {
        let f = fixture();
        // A one-sided dialog, as left behind by a broken upstream writer.
        let orphan = f
            .store
            .transaction(|repo| {
                let message = repo.create_message(&NewMessage::new(7, 30, MessageType::Text, "x").read(true))?;
                create_side_for_test(repo, 7, 30, message)
            })
            .unwrap();
        let before = f.store.message_count();

        let err = f
            .engine
            .append_message(7, orphan.id, MessageType::Image, "aGk=")
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::MirrorDialogMissing));
        assert_eq!(f.store.message_count(), before);
        assert_eq!(f.store.image_count(), 0);
    }

    fn create_side_for_test(repo: &mut dyn Repo, owner_id: i64, counterpart_id: i64, message: Message) -> AppResult<Dialog> {
        let dialog = repo.create_dialog(&NewDialog {
            owner_id,
            counterpart_id,
            latest_message_id: message.id,
        })?;
        repo.stamp_message_dialog(message.id, dialog.id)?;
        Ok(dialog)
    }

    #[test]
    fn half_pair_blocks_create_dialog() {
        let f = fixture();
        f.store
            .transaction(|repo| {
                let message = repo.create_message(&NewMessage::new(30, 7, MessageType::Text, "x"))?;
                create_side_for_test(repo, 7, 30, message)
            })
            .unwrap();
        let err = f.engine.create_dialog(30, 7, MessageType::Text, "hi").unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::MirrorDialogMissing));
        assert_eq!(f.store.dialog_count(), 1);
    }

    #[test]
    fn list_messages_is_oldest_first_and_marks_read() {
        let f = fixture();
        let pair = f.engine.create_dialog(7, 12, MessageType::Text, "1").unwrap().unwrap();
        f.engine.append_message(7, pair.caller.id, MessageType::Text, "2").unwrap();
        f.engine.append_message(12, pair.counterpart.id, MessageType::Text, "3").unwrap();
        f.engine.append_message(7, pair.caller.id, MessageType::Text, "4").unwrap();

        let details = f.engine.list_messages(12, pair.counterpart.id).unwrap();
        let payloads: Vec<&str> = details.messages.iter().map(|m| m.payload.as_str()).collect();
        assert_eq!(payloads, vec!["1", "2", "3", "4"]);
        assert!(details.messages.windows(2).all(|w| w[0].id < w[1].id));
        assert!(details.messages.windows(2).all(|w| w[0].created_at <= w[1].created_at));

        // Returned as stored before opening; stored as read afterwards.
        assert!(!details.messages[0].read);
        assert!(details.messages[2].read);
        assert!(messages_of(&f.store, pair.counterpart.id).iter().all(|m| m.read));
        assert_eq!(details.dialog.id, pair.counterpart.id);
        assert_eq!(details.dialog.message.payload, "4");
        assert!(details.dialog.message.read);

        // The other side's read state is untouched.
        assert!(!messages_of(&f.store, pair.caller.id)[2].read);
    }

    #[test]
    fn list_messages_requires_ownership() {
        let f = fixture();
        let pair = f.engine.create_dialog(7, 12, MessageType::Text, "1").unwrap().unwrap();
        let err = f.engine.list_messages(12, pair.caller.id).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::DialogNotFound));
        assert!(messages_of(&f.store, pair.counterpart.id).iter().all(|m| !m.read));
    }

    #[test]
    fn pair_key_is_symmetric() {
        assert_eq!(pair_key(7, 12), pair_key(12, 7));
        assert_ne!(pair_key(7, 12), pair_key(7, 120));
    }

    #[test]
    fn writes_hold_the_pair_lock_and_update_dialogs_in_id_order() {
        let f = fixture();
        let pair = f.engine.create_dialog(12, 7, MessageType::Text, "1").unwrap().unwrap();
        assert_eq!(f.store.journal(), vec![StoreOp::LockPair(pair_key(7, 12))]);

        let (low, high) = (pair.caller.id.min(pair.counterpart.id), pair.caller.id.max(pair.counterpart.id));
        // Both senders touch the two dialog rows in the same order, so
        // concurrent turns queue on the first row instead of crossing.
        for (sender, dialog_id) in [(12, pair.caller.id), (7, pair.counterpart.id)] {
            f.store.clear_journal();
            f.engine.append_message(sender, dialog_id, MessageType::Text, "turn").unwrap();
            assert_eq!(
                f.store.journal(),
                vec![
                    StoreOp::LockPair(pair_key(7, 12)),
                    StoreOp::UpdateDialog(low),
                    StoreOp::UpdateDialog(high),
                ]
            );
        }
    }

    #[test]
    fn second_create_from_the_other_side_appends_under_the_same_lock() {
        let f = fixture();
        let first = f.engine.create_dialog(7, 12, MessageType::Text, "from alice").unwrap().unwrap();
        f.store.clear_journal();
        let second = f.engine.create_dialog(12, 7, MessageType::Text, "from bob").unwrap().unwrap();

        assert_eq!(f.store.journal()[0], StoreOp::LockPair(pair_key(7, 12)));
        assert_eq!(f.store.dialog_count(), 2);
        assert_eq!(second.caller.id, first.counterpart.id);
        let payloads: Vec<String> = messages_of(&f.store, first.caller.id)
            .into_iter()
            .map(|m| m.payload)
            .collect();
        assert_eq!(payloads, vec!["from alice", "from bob"]);
    }

    #[test]
    fn mark_read_is_idempotent() {
        let f = fixture();
        let pair = f.engine.create_dialog(7, 12, MessageType::Text, "1").unwrap().unwrap();
        f.engine.append_message(7, pair.caller.id, MessageType::Text, "2").unwrap();

        assert_eq!(f.engine.mark_read(pair.counterpart.id).unwrap(), 2);
        assert_eq!(f.engine.mark_read(pair.counterpart.id).unwrap(), 0);
        assert!(messages_of(&f.store, pair.counterpart.id).iter().all(|m| m.read));
    }

    #[test]
    fn mark_read_on_empty_dialog_succeeds() {
        let f = fixture();
        assert_eq!(f.engine.mark_read(4242).unwrap(), 0);
    }

    #[test]
    fn initialize_without_dialogs_is_empty() {
        let f = fixture();
        let snapshot = f.engine.initialize(30).unwrap();
        assert_eq!(snapshot, InitSnapshot::default());
    }

    #[test]
    fn initialize_lists_dialogs_with_presence() {
        let f = fixture();
        f.engine.create_dialog(7, 12, MessageType::Text, "hi bob").unwrap();
        f.engine.create_dialog(30, 7, MessageType::Text, "hi alice").unwrap();
        f.transport.join("12");

        let snapshot = f.engine.initialize(7).unwrap();
        assert_eq!(snapshot.dialogs.len(), 2);
        assert_eq!(snapshot.dialogs[0].counterpart.username, "bob");
        assert_eq!(snapshot.dialogs[0].message.payload, "hi bob");
        assert_eq!(snapshot.dialogs[1].counterpart.username, "carol");
        assert_eq!(snapshot.dialogs[1].message.from.username, "carol");
        assert!(!snapshot.dialogs[1].message.read);
        assert_eq!(
            snapshot.presence,
            vec![UserStatus { id: 12, online: true }, UserStatus { id: 30, online: false }]
        );
    }

    #[test]
    fn presence_follows_room_membership_without_lag() {
        let f = fixture();
        f.engine.create_dialog(7, 12, MessageType::Text, "hi").unwrap();

        assert!(!f.engine.query_presence(7).unwrap()[0].online);
        f.transport.join("12");
        assert!(f.engine.query_presence(7).unwrap()[0].online);
        f.transport.leave("12");
        assert!(!f.engine.query_presence(7).unwrap()[0].online);
    }

    #[test]
    fn list_dialogs_shows_latest_message() {
        let f = fixture();
        let pair = f.engine.create_dialog(7, 12, MessageType::Text, "first").unwrap().unwrap();
        f.engine.append_message(12, pair.counterpart.id, MessageType::Text, "latest").unwrap();

        let dialogs = f.engine.list_dialogs(7).unwrap();
        assert_eq!(dialogs.len(), 1);
        assert_eq!(dialogs[0].message.payload, "latest");
        assert_eq!(dialogs[0].message.from.id, 12);
        assert!(!dialogs[0].message.read);
        assert!(f.engine.list_dialogs(30).unwrap().is_empty());
    }
}
