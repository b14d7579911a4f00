use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use messenger_shared::errors::{AppError, AppResult};

use crate::models::{Dialog, Image, Message, NewDialog, NewMessage, User};

use super::{DialogFilter, Repo, Store};

/// Locks and dialog updates recorded by [`MemoryStore`], in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    LockPair(String),
    UpdateDialog(i64),
}

/// In-process store. Transactions run against a copy of the tables that
/// replaces the live tables only on success; the mutex serializes writers the
/// way the database does for conflicting rows.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

#[derive(Debug, Default, Clone)]
struct Tables {
    users: BTreeMap<i64, User>,
    images: BTreeMap<i64, Image>,
    messages: BTreeMap<i64, Message>,
    dialogs: BTreeMap<i64, Dialog>,
    next_id: i64,
    failing_owners: HashSet<i64>,
    journal: Vec<StoreOp>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, id: i64, username: &str) {
        self.lock().users.insert(
            id,
            User {
                id,
                username: username.to_string(),
            },
        );
    }

    /// Make every later dialog insert for `owner_id` fail like a constraint
    /// violation would.
    pub fn fail_dialogs_owned_by(&self, owner_id: i64) {
        self.lock().failing_owners.insert(owner_id);
    }

    pub fn message_count(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn dialog_count(&self) -> usize {
        self.lock().dialogs.len()
    }

    pub fn image_count(&self) -> usize {
        self.lock().images.len()
    }

    /// Committed locks and dialog updates since the last clear.
    pub fn journal(&self) -> Vec<StoreOp> {
        self.lock().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.lock().journal.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Store for MemoryStore {
    fn read<T>(&self, f: impl FnOnce(&mut dyn Repo) -> AppResult<T>) -> AppResult<T> {
        let mut tables = self.lock();
        f(&mut *tables)
    }

    fn transaction<T>(&self, f: impl FnOnce(&mut dyn Repo) -> AppResult<T>) -> AppResult<T> {
        let mut tables = self.lock();
        let mut working = tables.clone();
        let result = f(&mut working)?;
        *tables = working;
        Ok(result)
    }

    fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn message_mut(&mut self, id: i64) -> AppResult<&mut Message> {
        self.messages
            .get_mut(&id)
            .ok_or(AppError::Database(diesel::result::Error::NotFound))
    }
}

impl Repo for Tables {
    fn lock_pair(&mut self, key: &str) -> AppResult<()> {
        // The store mutex already serializes transactions.
        self.journal.push(StoreOp::LockPair(key.to_string()));
        Ok(())
    }

    fn find_users(&mut self, ids: &[i64]) -> AppResult<Vec<User>> {
        Ok(ids.iter().filter_map(|id| self.users.get(id).cloned()).collect())
    }

    fn create_image(&mut self, data: &str) -> AppResult<i64> {
        let id = self.allocate_id();
        self.images.insert(
            id,
            Image {
                id,
                data: data.to_string(),
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    fn find_image(&mut self, id: i64) -> AppResult<Option<Image>> {
        Ok(self.images.get(&id).cloned())
    }

    fn create_message(&mut self, message: &NewMessage) -> AppResult<Message> {
        let id = self.allocate_id();
        let row = Message {
            id,
            created_at: Utc::now(),
            from_user_id: message.from_user_id,
            to_user_id: message.to_user_id,
            dialog_id: message.dialog_id,
            message_type: message.message_type.clone(),
            metadata: message.metadata.clone(),
            payload: message.payload.clone(),
            read: message.read,
        };
        self.messages.insert(id, row.clone());
        Ok(row)
    }

    fn stamp_message_dialog(&mut self, message_id: i64, dialog_id: i64) -> AppResult<Message> {
        let message = self.message_mut(message_id)?;
        message.dialog_id = Some(dialog_id);
        Ok(message.clone())
    }

    fn find_messages(&mut self, dialog_id: i64) -> AppResult<Vec<Message>> {
        // BTreeMap iteration is id order.
        Ok(self
            .messages
            .values()
            .filter(|m| m.dialog_id == Some(dialog_id))
            .cloned()
            .collect())
    }

    fn find_messages_by_ids(&mut self, ids: &[i64]) -> AppResult<Vec<Message>> {
        Ok(ids.iter().filter_map(|id| self.messages.get(id).cloned()).collect())
    }

    fn mark_dialog_read(&mut self, dialog_id: i64) -> AppResult<usize> {
        let mut updated = 0;
        for message in self.messages.values_mut() {
            if message.dialog_id == Some(dialog_id) && !message.read {
                message.read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }

    fn create_dialog(&mut self, dialog: &NewDialog) -> AppResult<Dialog> {
        if self.failing_owners.contains(&dialog.owner_id) {
            return Err(AppError::internal(format!(
                "dialog insert rejected for owner {}",
                dialog.owner_id
            )));
        }
        let duplicate = self
            .dialogs
            .values()
            .any(|d| DialogFilter::pair(dialog.owner_id, dialog.counterpart_id).matches(d));
        if duplicate {
            return Err(AppError::Database(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                Box::new(format!(
                    "dialog {} -> {} already exists",
                    dialog.owner_id, dialog.counterpart_id
                )),
            )));
        }

        let id = self.allocate_id();
        let now = Utc::now();
        let row = Dialog {
            id,
            owner_id: dialog.owner_id,
            counterpart_id: dialog.counterpart_id,
            latest_message_id: dialog.latest_message_id,
            created_at: now,
            updated_at: now,
        };
        self.dialogs.insert(id, row.clone());
        Ok(row)
    }

    fn find_dialog(&mut self, filter: &DialogFilter) -> AppResult<Option<Dialog>> {
        Ok(self.dialogs.values().find(|d| filter.matches(d)).cloned())
    }

    fn find_dialogs(&mut self, filter: &DialogFilter) -> AppResult<Vec<Dialog>> {
        Ok(self.dialogs.values().filter(|d| filter.matches(d)).cloned().collect())
    }

    fn set_latest_message(&mut self, dialog_id: i64, message_id: i64) -> AppResult<Dialog> {
        let dialog = self
            .dialogs
            .get_mut(&dialog_id)
            .ok_or(AppError::Database(diesel::result::Error::NotFound))?;
        dialog.latest_message_id = message_id;
        dialog.updated_at = Utc::now();
        let dialog = dialog.clone();
        self.journal.push(StoreOp::UpdateDialog(dialog_id));
        Ok(dialog)
    }
}
