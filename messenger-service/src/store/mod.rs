//! Persistence seam for the dialog engine.
//!
//! [`Repo`] exposes the row-level operations the engine needs; [`Store`]
//! hands out a `Repo` either inside a transaction or for plain reads.
//! Production uses [`PgStore`], the test suite uses [`MemoryStore`].

mod memory;
mod pg;

pub use memory::{MemoryStore, StoreOp};
pub use pg::PgStore;

use messenger_shared::errors::AppResult;

use crate::models::{Dialog, Image, Message, NewDialog, NewMessage, User};

/// Equality filter over dialog rows. Unset fields match everything.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DialogFilter {
    pub id: Option<i64>,
    pub owner_id: Option<i64>,
    pub counterpart_id: Option<i64>,
}

impl DialogFilter {
    pub fn by_id(id: i64) -> Self {
        Self { id: Some(id), ..Self::default() }
    }

    pub fn owned_by(owner_id: i64) -> Self {
        Self { owner_id: Some(owner_id), ..Self::default() }
    }

    /// The dialog `owner_id` keeps with `counterpart_id`.
    pub fn pair(owner_id: i64, counterpart_id: i64) -> Self {
        Self {
            id: None,
            owner_id: Some(owner_id),
            counterpart_id: Some(counterpart_id),
        }
    }

    pub fn and_owner(mut self, owner_id: i64) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    pub fn matches(&self, dialog: &Dialog) -> bool {
        self.id.map_or(true, |id| dialog.id == id)
            && self.owner_id.map_or(true, |id| dialog.owner_id == id)
            && self.counterpart_id.map_or(true, |id| dialog.counterpart_id == id)
    }
}

/// Row operations over users, images, messages and dialogs.
pub trait Repo {
    /// Take an exclusive lock on `key` until the surrounding transaction
    /// ends. Only meaningful inside `Store::transaction`.
    fn lock_pair(&mut self, key: &str) -> AppResult<()>;

    fn find_users(&mut self, ids: &[i64]) -> AppResult<Vec<User>>;

    fn create_image(&mut self, data: &str) -> AppResult<i64>;
    fn find_image(&mut self, id: i64) -> AppResult<Option<Image>>;

    fn create_message(&mut self, message: &NewMessage) -> AppResult<Message>;
    /// Second phase of message creation: attach the owning dialog.
    fn stamp_message_dialog(&mut self, message_id: i64, dialog_id: i64) -> AppResult<Message>;
    /// Messages of one dialog, oldest first.
    fn find_messages(&mut self, dialog_id: i64) -> AppResult<Vec<Message>>;
    fn find_messages_by_ids(&mut self, ids: &[i64]) -> AppResult<Vec<Message>>;
    /// Bulk `read = true`. Returns the number of rows that changed.
    fn mark_dialog_read(&mut self, dialog_id: i64) -> AppResult<usize>;

    fn create_dialog(&mut self, dialog: &NewDialog) -> AppResult<Dialog>;
    fn find_dialog(&mut self, filter: &DialogFilter) -> AppResult<Option<Dialog>>;
    /// Matching dialogs ordered by id.
    fn find_dialogs(&mut self, filter: &DialogFilter) -> AppResult<Vec<Dialog>>;
    fn set_latest_message(&mut self, dialog_id: i64, message_id: i64) -> AppResult<Dialog>;
}

pub trait Store: Send + Sync + 'static {
    /// Run `f` outside any transaction.
    fn read<T>(&self, f: impl FnOnce(&mut dyn Repo) -> AppResult<T>) -> AppResult<T>;

    /// Run `f` atomically: every write made through the repo is committed if
    /// `f` returns `Ok` and discarded otherwise.
    fn transaction<T>(&self, f: impl FnOnce(&mut dyn Repo) -> AppResult<T>) -> AppResult<T>;

    /// Cheap liveness probe used by the health route.
    fn ping(&self) -> AppResult<()>;
}
