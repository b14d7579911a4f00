use chrono::Utc;
use diesel::pg::{Pg, PgConnection};
use diesel::prelude::*;
use diesel::sql_types::Text;

use messenger_shared::clients::db::DbPool;
use messenger_shared::errors::{AppError, AppResult};

use crate::models::{Dialog, Image, Message, NewDialog, NewImage, NewMessage, User};
use crate::schema::{messenger_dialogs, messenger_images, messenger_messages, users};

use super::{DialogFilter, Repo, Store};

/// PostgreSQL store backed by an r2d2 pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl Store for PgStore {
    fn read<T>(&self, f: impl FnOnce(&mut dyn Repo) -> AppResult<T>) -> AppResult<T> {
        let mut pooled = self.pool.get()?;
        let conn: &mut PgConnection = &mut pooled;
        f(&mut PgRepo { conn })
    }

    fn transaction<T>(&self, f: impl FnOnce(&mut dyn Repo) -> AppResult<T>) -> AppResult<T> {
        let mut pooled = self.pool.get()?;
        let conn: &mut PgConnection = &mut pooled;
        conn.transaction::<T, AppError, _>(|conn| f(&mut PgRepo { conn }))
    }

    fn ping(&self) -> AppResult<()> {
        let mut pooled = self.pool.get()?;
        let conn: &mut PgConnection = &mut pooled;
        diesel::sql_query("SELECT 1").execute(conn)?;
        Ok(())
    }
}

struct PgRepo<'a> {
    conn: &'a mut PgConnection,
}

impl Repo for PgRepo<'_> {
    fn lock_pair(&mut self, key: &str) -> AppResult<()> {
        diesel::sql_query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind::<Text, _>(key)
            .execute(self.conn)?;
        Ok(())
    }

    fn find_users(&mut self, ids: &[i64]) -> AppResult<Vec<User>> {
        let rows = users::table
            .filter(users::id.eq_any(ids))
            .select(User::as_select())
            .load(self.conn)?;
        Ok(rows)
    }

    fn create_image(&mut self, data: &str) -> AppResult<i64> {
        let id = diesel::insert_into(messenger_images::table)
            .values(&NewImage { data })
            .returning(messenger_images::id)
            .get_result(self.conn)?;
        Ok(id)
    }

    fn find_image(&mut self, id: i64) -> AppResult<Option<Image>> {
        let image = messenger_images::table
            .find(id)
            .select(Image::as_select())
            .first(self.conn)
            .optional()?;
        Ok(image)
    }

    fn create_message(&mut self, message: &NewMessage) -> AppResult<Message> {
        let row = diesel::insert_into(messenger_messages::table)
            .values(message)
            .returning(Message::as_returning())
            .get_result(self.conn)?;
        Ok(row)
    }

    fn stamp_message_dialog(&mut self, message_id: i64, dialog_id: i64) -> AppResult<Message> {
        let row = diesel::update(messenger_messages::table.find(message_id))
            .set(messenger_messages::dialog_id.eq(Some(dialog_id)))
            .returning(Message::as_returning())
            .get_result(self.conn)?;
        Ok(row)
    }

    fn find_messages(&mut self, dialog_id: i64) -> AppResult<Vec<Message>> {
        let rows = messenger_messages::table
            .filter(messenger_messages::dialog_id.eq(dialog_id))
            .order(messenger_messages::id.asc())
            .select(Message::as_select())
            .load(self.conn)?;
        Ok(rows)
    }

    fn find_messages_by_ids(&mut self, ids: &[i64]) -> AppResult<Vec<Message>> {
        let rows = messenger_messages::table
            .filter(messenger_messages::id.eq_any(ids))
            .select(Message::as_select())
            .load(self.conn)?;
        Ok(rows)
    }

    fn mark_dialog_read(&mut self, dialog_id: i64) -> AppResult<usize> {
        let updated = diesel::update(
            messenger_messages::table
                .filter(messenger_messages::dialog_id.eq(dialog_id))
                .filter(messenger_messages::read.eq(false)),
        )
        .set(messenger_messages::read.eq(true))
        .execute(self.conn)?;
        Ok(updated)
    }

    fn create_dialog(&mut self, dialog: &NewDialog) -> AppResult<Dialog> {
        let row = diesel::insert_into(messenger_dialogs::table)
            .values(dialog)
            .returning(Dialog::as_returning())
            .get_result(self.conn)?;
        Ok(row)
    }

    fn find_dialog(&mut self, filter: &DialogFilter) -> AppResult<Option<Dialog>> {
        let row = filtered_dialogs(filter)
            .order(messenger_dialogs::id.asc())
            .first::<Dialog>(self.conn)
            .optional()?;
        Ok(row)
    }

    fn find_dialogs(&mut self, filter: &DialogFilter) -> AppResult<Vec<Dialog>> {
        let rows = filtered_dialogs(filter)
            .order(messenger_dialogs::id.asc())
            .load::<Dialog>(self.conn)?;
        Ok(rows)
    }

    fn set_latest_message(&mut self, dialog_id: i64, message_id: i64) -> AppResult<Dialog> {
        let row = diesel::update(messenger_dialogs::table.find(dialog_id))
            .set((
                messenger_dialogs::latest_message_id.eq(message_id),
                messenger_dialogs::updated_at.eq(Utc::now()),
            ))
            .returning(Dialog::as_returning())
            .get_result(self.conn)?;
        Ok(row)
    }
}

// Column order of `messenger_dialogs` matches `Dialog`, so the default
// selection loads straight into it.
fn filtered_dialogs(filter: &DialogFilter) -> messenger_dialogs::BoxedQuery<'static, Pg> {
    let mut query = messenger_dialogs::table.into_boxed();
    if let Some(id) = filter.id {
        query = query.filter(messenger_dialogs::id.eq(id));
    }
    if let Some(owner_id) = filter.owner_id {
        query = query.filter(messenger_dialogs::owner_id.eq(owner_id));
    }
    if let Some(counterpart_id) = filter.counterpart_id {
        query = query.filter(messenger_dialogs::counterpart_id.eq(counterpart_id));
    }
    query
}
