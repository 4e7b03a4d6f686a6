//! Writes against a database handle.
//!
//! Every public method here creates its table from the schema catalog when
//! missing, takes the one-time backup if configured, commits before
//! returning and drops the caches of the tables it touched.

use crate::cache::CacheScope;
use crate::database::{quote_ident, to_sql_value, ColumnInfo, SkypeDatabase};
use crate::{schema, StorageError};
use chrono::Utc;
use rusqlite::params_from_iter;
use skyp_core::{
    Account, Chat, Contact, ContactGroup, Message, Participant, Row, SqlValue,
    MESSAGE_TYPE_FILE, MESSAGE_TYPE_SMS, TRANSFER_TYPE_OUTBOUND,
};
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

const QUERY_OPERATORS: [&str; 11] = [
    "=", "!=", "<>", "<", "<=", ">", ">=", "LIKE", "NOT LIKE", "IS", "IS NOT",
];

/// One `column op value` condition for [`SkypeDatabase::query_table`].
#[derive(Debug, Clone, PartialEq)]
pub struct QueryFilter {
    pub column: String,
    pub op: String,
    pub value: SqlValue,
}

impl QueryFilter {
    pub fn new(column: impl Into<String>, op: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self {
            column: column.into(),
            op: op.into(),
            value: value.into(),
        }
    }
}

impl SkypeDatabase {
    /// Creates a table from its canonical statement.
    pub fn create_table(&mut self, table: &str) -> Result<(), StorageError> {
        let sql = schema::create_statement(table)
            .ok_or_else(|| StorageError::UnknownTable(table.to_string()))?;
        self.ensure_backup()?;
        self.conn.execute_batch(sql)?;
        self.refresh_tables(Some(table))?;
        self.touch();
        info!(
            event = "table_created",
            table,
            path = %self.filename.display()
        );
        Ok(())
    }

    fn ensure_table(&mut self, table: &str) -> Result<(), StorageError> {
        if self.has_table(table) {
            return Ok(());
        }
        self.create_table(table)
    }

    pub fn backup_path(&self) -> PathBuf {
        let mut path = OsString::from(self.filename.as_os_str());
        path.push(".bak");
        PathBuf::from(path)
    }

    /// Copies the file aside before the first write of this handle.
    pub(crate) fn ensure_backup(&mut self) -> Result<(), StorageError> {
        if !self.config.db_do_backup || self.backup_created {
            return Ok(());
        }
        let backup = self.backup_path();
        fs::copy(&self.filename, &backup)?;
        self.backup_created = true;
        info!(
            event = "database_backup",
            path = %self.filename.display(),
            backup = %backup.display()
        );
        Ok(())
    }

    fn touch(&mut self) {
        self.update_fileinfo();
        self.last_modified = Some(Utc::now());
    }

    fn table_name(&self, table: &str) -> String {
        self.tables
            .borrow()
            .get(&table.to_lowercase())
            .map(|info| info.name.clone())
            .unwrap_or_else(|| table.to_string())
    }

    /// Inserts every column of the table, NULL where the row has no value.
    fn insert_filled(&self, table: &str, row: &Row, exclude: &[&str]) -> Result<i64, StorageError> {
        let columns: Vec<ColumnInfo> = self
            .get_table_columns(table)?
            .into_iter()
            .filter(|column| {
                !exclude
                    .iter()
                    .any(|excluded| excluded.eq_ignore_ascii_case(&column.name))
            })
            .collect();
        let name = quote_ident(&self.table_name(table));
        if columns.is_empty() {
            self.conn
                .execute(&format!("INSERT INTO {name} DEFAULT VALUES"), [])?;
            return Ok(self.conn.last_insert_rowid());
        }

        let row = row.fill_missing(
            &columns
                .iter()
                .map(|column| column.name.clone())
                .collect::<Vec<_>>(),
        );
        let values = column_values(&columns, &row);
        let sql = format!(
            "INSERT INTO {name} ({}) VALUES ({})",
            columns
                .iter()
                .map(|column| quote_ident(&column.name))
                .collect::<Vec<_>>()
                .join(", "),
            vec!["?"; columns.len()].join(", ")
        );
        self.conn.execute(&sql, params_from_iter(values.iter()))?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_filled(
        &self,
        table: &str,
        row: &Row,
        key_column: &str,
        key: &SqlValue,
    ) -> Result<usize, StorageError> {
        let columns: Vec<ColumnInfo> = self
            .get_table_columns(table)?
            .into_iter()
            .filter(|column| !column.name.eq_ignore_ascii_case(key_column))
            .collect();
        if columns.is_empty() {
            return Ok(0);
        }
        let row = row.fill_missing(
            &columns
                .iter()
                .map(|column| column.name.clone())
                .collect::<Vec<_>>(),
        );
        let mut values = column_values(&columns, &row);
        values.push(to_sql_value(key));
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            quote_ident(&self.table_name(table)),
            columns
                .iter()
                .map(|column| format!("{} = ?", quote_ident(&column.name)))
                .collect::<Vec<_>>()
                .join(", "),
            quote_ident(key_column)
        );
        Ok(self.conn.execute(&sql, params_from_iter(values.iter()))?)
    }

    /// Inserts the source's account row when this file has none.
    pub fn ensure_account_from(&mut self, source: &SkypeDatabase) -> Result<(), StorageError> {
        if self.account.is_some() {
            return Ok(());
        }
        match source.account() {
            Some(account) => self.insert_account(account).map(|_| ()),
            None => Ok(()),
        }
    }

    pub fn insert_account(&mut self, account: &Account) -> Result<i64, StorageError> {
        self.ensure_table("accounts")?;
        self.ensure_backup()?;
        let id = self.insert_filled("accounts", &account.row, &["id"])?;
        self.invalidate(CacheScope::Table("accounts"));
        self.load_account();
        self.touch();
        info!(
            event = "account_inserted",
            account = account.identity().unwrap_or_default(),
            path = %self.filename.display()
        );
        Ok(id)
    }

    /// Copies a chat row from `source`; returns the new chat id.
    pub fn insert_chat(&mut self, chat: &Chat, source: &SkypeDatabase) -> Result<i64, StorageError> {
        self.ensure_account_from(source)?;
        self.ensure_table("conversations")?;
        self.ensure_backup()?;
        let id = self.insert_filled("conversations", &chat.row, &["id"])?;
        self.invalidate(CacheScope::Table("conversations"));
        self.touch();
        info!(
            event = "chat_inserted",
            chat = %chat.identity,
            id,
            path = %self.filename.display()
        );
        Ok(id)
    }

    /// Copies messages of `source_chat` into `chat`, along with the
    /// Chats, Transfers and SMSes rows they depend on.
    ///
    /// Lowers the chat's creation timestamp if a copied message predates it.
    /// Returns the new message ids in input order.
    pub fn insert_messages(
        &mut self,
        chat: &mut Chat,
        messages: &[Message],
        source: &SkypeDatabase,
        source_chat: &Chat,
    ) -> Result<Vec<i64>, StorageError> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }
        self.ensure_account_from(source)?;
        self.ensure_table("messages")?;
        self.ensure_table("chats")?;
        if messages.iter().any(|message| message.msg_type == MESSAGE_TYPE_FILE) {
            self.ensure_table("transfers")?;
        }
        if messages.iter().any(|message| message.msg_type == MESSAGE_TYPE_SMS) {
            self.ensure_table("smses")?;
        }
        self.ensure_backup()?;

        let source_id = source.id().map(str::to_string);
        let target_id = self.id().map(str::to_string);
        let remap = |identity: Option<&str>| -> Option<String> {
            match (identity, &source_id, &target_id) {
                (Some(identity), Some(from), Some(to)) if identity == from => Some(to.clone()),
                (identity, _, _) => identity.map(str::to_string),
            }
        };
        let source_transfers = if source.has_table("transfers") {
            Some(source.get_transfers()?)
        } else {
            None
        };
        let source_smses = source.get_smses()?;

        let tx = self.conn.unchecked_transaction()?;

        if source.has_table("chats") {
            let legacy = source.select_rows(
                "SELECT * FROM chats WHERE conv_dbid = ?1",
                [source_chat.id],
            )?;
            for mut row in legacy {
                let name = row.text("name").unwrap_or_default().to_string();
                let present: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM chats WHERE name = ?1",
                    [&name],
                    |found| found.get(0),
                )?;
                if present == 0 {
                    row.set("conv_dbid", chat.id);
                    self.insert_filled("chats", &row, &["id"])?;
                }
            }
        }

        let mut ids = Vec::with_capacity(messages.len());
        for message in messages {
            let mut row = message.row.clone();
            row.set("convo_id", chat.id);
            row.set("author", remap(message.author.as_deref()));
            let id = self.insert_filled("messages", &row, &["id"])?;
            ids.push(id);

            if message.msg_type == MESSAGE_TYPE_FILE {
                match &source_transfers {
                    Some(transfers) => {
                        let mut matching: Vec<_> = transfers
                            .iter()
                            .filter(|transfer| {
                                message.guid.is_some() && transfer.chatmsg_guid == message.guid
                            })
                            .collect();
                        matching.sort_by_key(|transfer| transfer.chatmsg_index);
                        for transfer in matching {
                            let mut row = transfer.row.clone();
                            row.set("convo_id", chat.id);
                            row.set("partner_handle", remap(transfer.partner_handle.as_deref()));
                            self.insert_filled("transfers", &row, &["id"])?;
                        }
                    }
                    None => {
                        for element in message.file_elements() {
                            let row = Row::new()
                                .with("type", TRANSFER_TYPE_OUTBOUND)
                                .with("partner_handle", remap(message.author.as_deref()))
                                .with("partner_dispname", message.from_dispname.clone())
                                .with("starttime", message.timestamp)
                                .with("filename", element.filename.as_str())
                                .with("filesize", element.size.map(|size| size.to_string()))
                                .with("chatmsg_guid", message.guid.clone())
                                .with("chatmsg_index", element.index)
                                .with("convo_id", chat.id);
                            self.insert_filled("transfers", &row, &["id"])?;
                        }
                    }
                }
            } else if message.msg_type == MESSAGE_TYPE_SMS {
                for sms in source_smses
                    .iter()
                    .filter(|sms| sms.chatmsg_id == Some(message.id))
                {
                    let mut row = sms.row.clone();
                    row.set("chatmsg_id", id);
                    self.insert_filled("smses", &row, &["id"])?;
                }
            }
        }

        let earliest = messages
            .iter()
            .map(|message| message.timestamp)
            .filter(|timestamp| *timestamp > 0)
            .min();
        if let (Some(created), Some(earliest)) = (chat.creation_timestamp, earliest) {
            if created != 0 && earliest < created {
                tx.execute(
                    "UPDATE conversations SET creation_timestamp = ?1 WHERE id = ?2",
                    [earliest, chat.id],
                )?;
                chat.set_creation_timestamp(earliest);
            }
        }
        tx.commit()?;

        for table in ["messages", "chats", "transfers", "smses", "conversations"] {
            self.invalidate(CacheScope::Table(table));
        }
        self.touch();
        info!(
            event = "merge_messages",
            count = ids.len(),
            chat = %chat.identity,
            target = %self.filename.display()
        );
        Ok(ids)
    }

    pub fn insert_participants(
        &mut self,
        chat: &Chat,
        participants: &[Participant],
        source: &SkypeDatabase,
    ) -> Result<usize, StorageError> {
        if participants.is_empty() {
            return Ok(0);
        }
        self.ensure_account_from(source)?;
        self.ensure_table("participants")?;
        self.ensure_backup()?;
        let target_id = self.id().map(str::to_string);
        let tx = self.conn.unchecked_transaction()?;
        for participant in participants {
            let mut row = participant.row.clone();
            row.set("convo_id", chat.id);
            let identity = match &target_id {
                Some(own) if source.id() == Some(participant.identity.as_str()) => own.as_str(),
                _ => participant.identity.as_str(),
            };
            row.set("identity", identity);
            self.insert_filled("participants", &row, &["id"])?;
        }
        tx.commit()?;
        self.invalidate(CacheScope::Table("participants"));
        self.touch();
        info!(
            event = "merge_participants",
            count = participants.len(),
            chat = %chat.identity,
            target = %self.filename.display()
        );
        Ok(participants.len())
    }

    pub fn insert_contacts(
        &mut self,
        contacts: &[Contact],
        source: &SkypeDatabase,
    ) -> Result<usize, StorageError> {
        if contacts.is_empty() {
            return Ok(0);
        }
        self.ensure_account_from(source)?;
        self.ensure_table("contacts")?;
        self.ensure_backup()?;
        let tx = self.conn.unchecked_transaction()?;
        for contact in contacts {
            self.insert_filled("contacts", &contact.row, &["id"])?;
        }
        tx.commit()?;
        self.invalidate(CacheScope::Table("contacts"));
        self.touch();
        info!(
            event = "merge_contacts",
            count = contacts.len(),
            target = %self.filename.display()
        );
        Ok(contacts.len())
    }

    /// Updates groups with a matching name in place and inserts the rest.
    pub fn replace_contactgroups(
        &mut self,
        groups: &[ContactGroup],
        source: &SkypeDatabase,
    ) -> Result<usize, StorageError> {
        if groups.is_empty() {
            return Ok(0);
        }
        self.ensure_account_from(source)?;
        self.ensure_table("contactgroups")?;
        let key = self.primary_key("contactgroups")?.name;
        self.ensure_backup()?;

        let existing: HashMap<String, SqlValue> = self
            .select_rows(
                &format!(
                    "SELECT {} AS pk, given_displayname AS name FROM contactgroups",
                    quote_ident(&key)
                ),
                [],
            )?
            .into_iter()
            .filter_map(|row| {
                let name = row.text("name")?.to_string();
                Some((name, row.get("pk").cloned().unwrap_or_default()))
            })
            .collect();

        let tx = self.conn.unchecked_transaction()?;
        for group in groups {
            let current = group.name.as_ref().and_then(|name| existing.get(name));
            match current {
                Some(pk) => {
                    self.update_filled("contactgroups", &group.row, &key, pk)?;
                }
                None => {
                    self.insert_filled("contactgroups", &group.row, &[key.as_str()])?;
                }
            }
        }
        tx.commit()?;
        self.invalidate(CacheScope::Table("contactgroups"));
        self.touch();
        info!(
            event = "merge_contact_groups",
            count = groups.len(),
            target = %self.filename.display()
        );
        Ok(groups.len())
    }

    /// Inserts a row; a NULL primary key is assigned by SQLite.
    pub fn insert_row(&mut self, table: &str, row: &Row) -> Result<i64, StorageError> {
        self.ensure_table(table)?;
        let key = self.primary_key(table)?.name;
        self.ensure_backup()?;
        let exclude: Vec<&str> = match row.get(&key) {
            Some(value) if !value.is_null() => Vec::new(),
            _ => vec![key.as_str()],
        };
        let id = self.insert_filled(table, row, &exclude)?;
        self.invalidate(CacheScope::Table(table));
        self.touch();
        debug!(event = "row_inserted", table, id);
        Ok(id)
    }

    /// Updates the row identified by the primary key value of `original`.
    pub fn update_row(
        &mut self,
        table: &str,
        row: &Row,
        original: &Row,
    ) -> Result<usize, StorageError> {
        let key = self.primary_key(table)?.name;
        let value = key_value(table, &key, original)?;
        self.ensure_backup()?;
        let changed = self.update_filled(table, row, &key, &value)?;
        self.invalidate(CacheScope::Table(table));
        self.touch();
        debug!(event = "row_updated", table, key = %value, changed);
        Ok(changed)
    }

    /// Updates when `original` is given, inserts otherwise; returns the
    /// primary key value of the saved row.
    pub fn save_row(
        &mut self,
        table: &str,
        row: &Row,
        original: Option<&Row>,
    ) -> Result<SqlValue, StorageError> {
        match original {
            Some(original) => {
                self.update_row(table, row, original)?;
                let key = self.primary_key(table)?.name;
                Ok(row
                    .get(&key)
                    .filter(|value| !value.is_null())
                    .or_else(|| original.get(&key))
                    .cloned()
                    .unwrap_or_default())
            }
            None => {
                let id = self.insert_row(table, row)?;
                let key = self.primary_key(table)?.name;
                Ok(row
                    .get(&key)
                    .filter(|value| !value.is_null())
                    .cloned()
                    .unwrap_or(SqlValue::Integer(id)))
            }
        }
    }

    pub fn delete_row(&mut self, table: &str, row: &Row) -> Result<usize, StorageError> {
        let key = self.primary_key(table)?.name;
        let value = key_value(table, &key, row)?;
        self.ensure_backup()?;
        let deleted = self.conn.execute(
            &format!(
                "DELETE FROM {} WHERE {} = ?1",
                quote_ident(&self.table_name(table)),
                quote_ident(&key)
            ),
            [to_sql_value(&value)],
        )?;
        self.invalidate(CacheScope::Table(table));
        self.touch();
        debug!(event = "row_deleted", table, key = %value, deleted);
        Ok(deleted)
    }

    /// Runs arbitrary SQL; all caches are dropped afterwards.
    pub fn execute_action(&mut self, sql: &str) -> Result<usize, StorageError> {
        self.ensure_backup()?;
        let changed = self.conn.execute(sql, [])?;
        self.clear_cache()?;
        self.touch();
        Ok(changed)
    }

    /// Moves messages dated after `since` back by the given amount.
    pub fn move_future_dates(
        &mut self,
        since: i64,
        days: i64,
        hours: i64,
    ) -> Result<usize, StorageError> {
        if !self.has_table("messages") {
            return Ok(0);
        }
        self.ensure_backup()?;
        let seconds = (days * 24 + hours) * 3600;
        let moved = self.conn.execute(
            "UPDATE messages SET timestamp = timestamp - ?1 WHERE timestamp > ?2",
            [seconds, since],
        )?;
        self.invalidate(CacheScope::Table("messages"));
        self.touch();
        info!(
            event = "future_dates_moved",
            moved,
            seconds,
            path = %self.filename.display()
        );
        Ok(moved)
    }

    /// Rows of a table matching all filters, optionally ordered by one
    /// column.
    pub fn query_table(
        &self,
        table: &str,
        order: Option<(&str, bool)>,
        filters: &[QueryFilter],
    ) -> Result<Vec<Row>, StorageError> {
        if !self.has_table(table) {
            return Ok(Vec::new());
        }
        let columns = self.get_table_columns(table)?;
        let known = |name: &str| {
            columns
                .iter()
                .find(|column| column.name.eq_ignore_ascii_case(name))
                .map(|column| column.name.clone())
                .ok_or_else(|| StorageError::InvalidQuery(format!("no column {name} in {table}")))
        };

        let mut sql = format!("SELECT * FROM {}", quote_ident(&self.table_name(table)));
        let mut values = Vec::with_capacity(filters.len());
        for (index, filter) in filters.iter().enumerate() {
            let column = known(&filter.column)?;
            let op = filter.op.trim().to_uppercase();
            if !QUERY_OPERATORS.contains(&op.as_str()) {
                return Err(StorageError::InvalidQuery(format!(
                    "unsupported operator {}",
                    filter.op
                )));
            }
            sql.push_str(if index == 0 { " WHERE " } else { " AND " });
            sql.push_str(&format!("{} {op} ?", quote_ident(&column)));
            values.push(to_sql_value(&filter.value));
        }
        if let Some((column, ascending)) = order {
            let column = known(column)?;
            sql.push_str(&format!(
                " ORDER BY {} {}",
                quote_ident(&column),
                if ascending { "ASC" } else { "DESC" }
            ));
        }
        self.select_rows(&sql, params_from_iter(values.iter()))
    }
}

fn column_values(columns: &[ColumnInfo], row: &Row) -> Vec<rusqlite::types::Value> {
    columns
        .iter()
        .map(|column| {
            let value = row.get(&column.name).cloned().unwrap_or_default();
            let value = if column.is_blob() {
                value.into_blob()
            } else {
                value
            };
            to_sql_value(&value)
        })
        .collect()
}

fn key_value(table: &str, key: &str, row: &Row) -> Result<SqlValue, StorageError> {
    row.get(key)
        .filter(|value| !value.is_null())
        .cloned()
        .ok_or_else(|| StorageError::MissingPrimaryKey {
            table: table.to_string(),
        })
}
