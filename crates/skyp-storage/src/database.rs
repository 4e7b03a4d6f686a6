use crate::cache::{CacheManager, CacheScope};
use crate::stream::{MessageQuery, MessageStream};
use crate::{OpenFailure, StorageError};
use chrono::{DateTime, Utc};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{Connection, ErrorCode, OpenFlags, Params};
use skyp_core::records::timestamp_to_datetime;
use skyp_core::{
    Account, Call, Chat, ChatStats, Contact, ContactGroup, Message, Participant, Row, Sms,
    SkypConfig, SqlValue, StatusSink, Transfer, TracingSink, Video, MESSAGE_TYPES_STATS,
};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One table of the live file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    pub sql: String,
    pub rows: i64,
    pub columns: Option<Vec<ColumnInfo>>,
}

/// A `PRAGMA table_info` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub cid: i64,
    pub name: String,
    pub col_type: String,
    pub notnull: bool,
    pub pk: i64,
}

impl ColumnInfo {
    pub fn is_blob(&self) -> bool {
        self.col_type.eq_ignore_ascii_case("blob")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub path: PathBuf,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Result of looking for messages dated after the check time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FutureDates {
    pub count: i64,
    pub latest: Option<DateTime<Utc>>,
    pub checked_at: i64,
}

/// Access to one Skype database file.
pub struct SkypeDatabase {
    pub(crate) filename: PathBuf,
    pub(crate) conn: Connection,
    pub(crate) config: SkypConfig,
    pub(crate) sink: Arc<dyn StatusSink>,
    pub(crate) account: Option<Account>,
    pub(crate) tables: RefCell<BTreeMap<String, TableInfo>>,
    pub(crate) cache: RefCell<CacheManager>,
    pub(crate) backup_created: bool,
    pub(crate) last_modified: Option<DateTime<Utc>>,
    pub(crate) filesize: u64,
    consumers: BTreeSet<crate::ConsumerId>,
}

impl std::fmt::Debug for SkypeDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkypeDatabase")
            .field("filename", &self.filename)
            .field("id", &self.id())
            .field("tables", &self.tables.borrow().len())
            .finish()
    }
}

impl SkypeDatabase {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::open_with(path, SkypConfig::default(), Arc::new(TracingSink))
    }

    /// Opens an existing database file.
    ///
    /// Missing files, non-database files and locked files fail with
    /// [`StorageError::Open`]. A missing or unreadable account row is
    /// tolerated.
    pub fn open_with(
        path: impl AsRef<Path>,
        config: SkypConfig,
        sink: Arc<dyn StatusSink>,
    ) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(StorageError::Open {
                path: path.to_path_buf(),
                reason: OpenFailure::Missing,
            });
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|err| open_error(path, err))?;
        Self::from_connection(path, conn, config, sink)
    }

    /// Creates a new empty database file, for use as a merge target.
    pub fn create(
        path: impl AsRef<Path>,
        config: SkypConfig,
        sink: Arc<dyn StatusSink>,
    ) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|err| open_error(path, err))?;
        Self::from_connection(path, conn, config, sink)
    }

    fn from_connection(
        path: &Path,
        conn: Connection,
        config: SkypConfig,
        sink: Arc<dyn StatusSink>,
    ) -> Result<Self, StorageError> {
        conn.busy_timeout(config.open_retry_sleep())
            .map_err(|err| open_error(path, err))?;
        let mut db = Self {
            filename: path.to_path_buf(),
            conn,
            config,
            sink,
            account: None,
            tables: RefCell::new(BTreeMap::new()),
            cache: RefCell::new(CacheManager::new()),
            backup_created: false,
            last_modified: None,
            filesize: 0,
            consumers: BTreeSet::new(),
        };
        db.refresh_tables(None).map_err(|err| match err {
            StorageError::Sqlite(err) => open_error(path, err),
            other => other,
        })?;
        db.update_fileinfo();
        db.load_account();
        debug!(
            event = "database_opened",
            path = %db.filename.display(),
            tables = db.tables.borrow().len(),
            account = db.id().unwrap_or_default()
        );
        Ok(db)
    }

    pub(crate) fn load_account(&mut self) {
        self.account = None;
        if !self.has_table("accounts") {
            return;
        }
        let result = self.select_rows(
            "SELECT *, COALESCE(fullname, displayname, skypename) AS name, \
             skypename AS identity FROM accounts LIMIT 1",
            [],
        );
        match result {
            Ok(rows) => self.account = rows.into_iter().next().map(Account::from_row),
            Err(err) => {
                warn!(
                    event = "account_load_failed",
                    path = %self.filename.display(),
                    error = %err
                );
                self.sink.log(&format!(
                    "Error getting account information from {} ({err}).",
                    self.filename.display()
                ));
            }
        }
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }

    pub fn config(&self) -> &SkypConfig {
        &self.config
    }

    pub fn sink(&self) -> &Arc<dyn StatusSink> {
        &self.sink
    }

    pub fn account(&self) -> Option<&Account> {
        self.account.as_ref()
    }

    /// Skype identity of the database owner.
    pub fn id(&self) -> Option<&str> {
        self.account.as_ref().and_then(Account::identity)
    }

    /// Display name of the database owner.
    pub fn account_name(&self) -> Option<&str> {
        self.account
            .as_ref()
            .map(|account| account.name.as_str())
            .filter(|name| !name.is_empty())
    }

    pub fn register_consumer(&mut self, consumer: crate::ConsumerId) {
        self.consumers.insert(consumer);
    }

    pub fn unregister_consumer(&mut self, consumer: crate::ConsumerId) {
        self.consumers.remove(&consumer);
    }

    pub fn has_consumers(&self) -> bool {
        !self.consumers.is_empty()
    }

    pub fn file_info(&self) -> FileInfo {
        FileInfo {
            path: self.filename.clone(),
            size: self.filesize,
            last_modified: self.last_modified,
        }
    }

    pub(crate) fn update_fileinfo(&mut self) {
        if let Ok(metadata) = fs::metadata(&self.filename) {
            self.filesize = metadata.len();
            self.last_modified = metadata.modified().ok().map(DateTime::<Utc>::from);
        }
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.borrow().contains_key(&table.to_lowercase())
    }

    /// Re-reads table names, DDL and row counts; only `this_table` if given.
    pub(crate) fn refresh_tables(&self, this_table: Option<&str>) -> Result<(), StorageError> {
        let sql = if this_table.is_some() {
            "SELECT name, sql FROM sqlite_master WHERE type = 'table' \
             AND LOWER(name) = LOWER(?1) ORDER BY name"
        } else {
            "SELECT name, sql FROM sqlite_master WHERE type = 'table' ORDER BY name"
        };
        let mut statement = self.conn.prepare(sql)?;
        let rows = statement.query_map(rusqlite::params_from_iter(this_table.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })?;
        let mut found = Vec::new();
        for row in rows {
            found.push(row?);
        }

        let mut tables = BTreeMap::new();
        for (name, sql) in found {
            let count: i64 = self.conn.query_row(
                &format!("SELECT COUNT(*) FROM {}", quote_ident(&name)),
                [],
                |row| row.get(0),
            )?;
            tables.insert(
                name.to_lowercase(),
                TableInfo {
                    name,
                    sql: sql.unwrap_or_default(),
                    rows: count,
                    columns: None,
                },
            );
        }

        let mut current = self.tables.borrow_mut();
        match this_table {
            Some(table) => {
                current.remove(&table.to_lowercase());
                current.extend(tables);
            }
            None => *current = tables,
        }
        Ok(())
    }

    /// Tables of the file ordered by name, with row counts as last read.
    pub fn get_tables(
        &self,
        refresh: bool,
        this_table: Option<&str>,
    ) -> Result<Vec<TableInfo>, StorageError> {
        if refresh {
            self.refresh_tables(this_table)?;
        }
        Ok(self.tables.borrow().values().cloned().collect())
    }

    /// Columns of a table; empty if the table does not exist.
    pub fn get_table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, StorageError> {
        let key = table.to_lowercase();
        let name = match self.tables.borrow().get(&key) {
            None => return Ok(Vec::new()),
            Some(info) => {
                if let Some(columns) = &info.columns {
                    return Ok(columns.clone());
                }
                info.name.clone()
            }
        };
        let mut statement = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(&name)))?;
        let rows = statement.query_map([], |row| {
            Ok(ColumnInfo {
                cid: row.get(0)?,
                name: row.get(1)?,
                col_type: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                notnull: row.get::<_, i64>(3)? != 0,
                pk: row.get(5)?,
            })
        })?;
        let mut columns = Vec::new();
        for row in rows {
            columns.push(row?);
        }
        if let Some(info) = self.tables.borrow_mut().get_mut(&key) {
            info.columns = Some(columns.clone());
        }
        Ok(columns)
    }

    /// The single-column primary key of a table.
    pub fn primary_key(&self, table: &str) -> Result<ColumnInfo, StorageError> {
        let mut keys: Vec<ColumnInfo> = self
            .get_table_columns(table)?
            .into_iter()
            .filter(|column| column.pk > 0)
            .collect();
        if keys.len() != 1 {
            return Err(StorageError::UnsupportedPrimaryKey {
                table: table.to_string(),
            });
        }
        Ok(keys.remove(0))
    }

    pub(crate) fn select_rows<P: Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<Row>, StorageError> {
        let mut statement = self.conn.prepare(sql)?;
        let names: Vec<String> = statement
            .column_names()
            .iter()
            .map(|name| name.to_lowercase())
            .collect();
        let rows = statement.query_map(params, |row| read_row(row, &names))?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Drops all row caches and re-reads table metadata.
    pub fn clear_cache(&self) -> Result<(), StorageError> {
        self.invalidate(CacheScope::All);
        self.refresh_tables(None)
    }

    pub fn invalidate(&self, scope: CacheScope<'_>) {
        self.cache.borrow_mut().invalidate(scope);
    }

    pub fn cache_is_empty(&self) -> bool {
        self.cache.borrow().is_empty()
    }

    pub fn get_messages(&self, query: MessageQuery) -> MessageStream<'_> {
        MessageStream::new(self, query)
    }

    /// All messages of a chat, oldest first. Never reads or fills the
    /// message cache.
    pub fn chat_messages(&self, chat: &Chat) -> Result<Vec<Message>, StorageError> {
        self.get_messages(MessageQuery::for_chat(chat).uncached())
            .collect()
    }

    /// Messages whose body contains `text`, newest first.
    pub fn search_messages(
        &self,
        text: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, StorageError> {
        let limit = limit.unwrap_or(self.config.max_search_messages);
        self.get_messages(MessageQuery::all().descending().body_like(text))
            .take(limit)
            .collect()
    }

    /// Chats with a display name, most recently active first.
    ///
    /// The list is cached and shared; statistics are not filled in.
    pub fn get_conversations(&self) -> Result<Arc<Vec<Chat>>, StorageError> {
        if !self.has_table("conversations") {
            return Ok(Arc::new(Vec::new()));
        }
        if let Some(chats) = self.cache.borrow().conversations() {
            return Ok(chats);
        }

        let mut participants: HashMap<i64, Vec<Participant>> = HashMap::new();
        if self.has_table("participants") {
            let contacts = self.get_contacts()?;
            let by_identity: HashMap<&str, &Contact> = contacts
                .iter()
                .map(|contact| (contact.identity.as_str(), contact))
                .collect();
            let own_id = self.id();
            for row in self.get_table_rows("participants")?.iter() {
                let identity = row.text("identity").unwrap_or_default();
                let contact = match (&self.account, own_id) {
                    (Some(account), Some(own)) if own == identity => account.as_contact(),
                    _ => by_identity
                        .get(identity)
                        .map(|contact| (*contact).clone())
                        .unwrap_or_else(|| Contact::placeholder(identity)),
                };
                let participant = Participant::from_row(row.clone(), contact);
                participants
                    .entry(participant.convo_id)
                    .or_default()
                    .push(participant);
            }
            for list in participants.values_mut() {
                list.sort_by_key(|participant| participant.contact.name.to_lowercase());
            }
        }

        let rows = self.select_rows(
            "SELECT *, COALESCE(displayname, meta_topic) AS title FROM conversations \
             WHERE displayname IS NOT NULL ORDER BY last_activity_timestamp DESC",
            [],
        )?;
        let chats: Vec<Chat> = rows
            .into_iter()
            .map(|row| {
                let mut chat = Chat::from_row(row);
                chat.participants = participants.remove(&chat.id).unwrap_or_default();
                chat
            })
            .collect();
        info!(
            event = "conversations_loaded",
            chats = chats.len(),
            path = %self.filename.display()
        );
        Ok(self.cache.borrow_mut().store_conversations(chats))
    }

    /// Fills message count and first/last message time into the given chats.
    ///
    /// Chats without counted messages get zeroed statistics.
    pub fn get_conversations_stats(&self, chats: &mut [Chat]) -> Result<(), StorageError> {
        let mut stats: HashMap<i64, ChatStats> = HashMap::new();
        if self.has_table("messages") && !chats.is_empty() {
            let types = MESSAGE_TYPES_STATS
                .iter()
                .map(i64::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "SELECT convo_id, COUNT(*), MIN(timestamp), MAX(timestamp) FROM messages \
                 WHERE type IN ({types}) GROUP BY convo_id"
            );
            let mut statement = self.conn.prepare(&sql)?;
            let rows = statement.query_map([], |row| {
                Ok((
                    row.get::<_, Option<i64>>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                ))
            })?;
            for row in rows {
                let (convo_id, count, first, last) = row?;
                if let Some(convo_id) = convo_id {
                    stats.insert(convo_id, ChatStats::new(count, first, last));
                }
            }
        }
        for chat in chats.iter_mut() {
            chat.stats = Some(stats.remove(&chat.id).unwrap_or_default());
        }
        debug!(
            event = "conversation_stats_collected",
            chats = chats.len(),
            path = %self.filename.display()
        );
        Ok(())
    }

    /// Conversations with statistics, cached once collected.
    pub fn get_conversations_with_stats(&self) -> Result<Arc<Vec<Chat>>, StorageError> {
        let chats = self.get_conversations()?;
        if chats.iter().all(|chat| chat.stats.is_some()) {
            return Ok(chats);
        }
        let mut chats = chats.as_ref().clone();
        self.get_conversations_stats(&mut chats)?;
        Ok(self.cache.borrow_mut().store_conversations(chats))
    }

    pub fn get_conversation(&self, identity: &str) -> Result<Option<Chat>, StorageError> {
        Ok(self
            .get_conversations_with_stats()?
            .iter()
            .find(|chat| chat.identity == identity)
            .cloned())
    }

    /// Contacts ordered by name, identity being skypename or phone number.
    pub fn get_contacts(&self) -> Result<Arc<Vec<Contact>>, StorageError> {
        if !self.has_table("contacts") {
            return Ok(Arc::new(Vec::new()));
        }
        if let Some(contacts) = self.cache.borrow().contacts() {
            return Ok(contacts);
        }
        let rows = self.select_rows(
            "SELECT *, COALESCE(skypename, pstnnumber) AS identity, \
             COALESCE(fullname, displayname, skypename, pstnnumber) AS name \
             FROM contacts ORDER BY name",
            [],
        )?;
        let contacts = rows.into_iter().map(Contact::from_row).collect();
        Ok(self.cache.borrow_mut().store_contacts(contacts))
    }

    pub fn get_contact(&self, identity: &str) -> Result<Option<Contact>, StorageError> {
        if !self.has_table("contacts") {
            return Ok(None);
        }
        self.get_contacts()?;
        if let Some(contact) = self.cache.borrow().contact(identity) {
            return Ok(Some(contact));
        }
        let rows = self.select_rows(
            "SELECT *, COALESCE(fullname, displayname, skypename, pstnnumber) AS name, \
             COALESCE(skypename, pstnnumber) AS identity FROM contacts \
             WHERE skypename = ?1 OR pstnnumber = ?1 LIMIT 1",
            [identity],
        )?;
        Ok(rows.into_iter().next().map(Contact::from_row))
    }

    /// Display name for an identity, falling back to the identity itself.
    pub fn get_contact_name(&self, identity: &str) -> Result<String, StorageError> {
        if let Some(account) = &self.account {
            if account.identity() == Some(identity) {
                return Ok(account.name.clone());
            }
        }
        Ok(self
            .get_contact(identity)?
            .map(|contact| contact.name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| identity.to_string()))
    }

    /// Contact groups that have members, by id.
    pub fn get_contactgroups(&self) -> Result<Arc<Vec<ContactGroup>>, StorageError> {
        if !self.has_table("contactgroups") {
            return Ok(Arc::new(Vec::new()));
        }
        if let Some(groups) = self.cache.borrow().contact_groups() {
            return Ok(groups);
        }
        let rows = self.select_rows(
            "SELECT *, given_displayname AS name FROM contactgroups \
             WHERE members IS NOT NULL ORDER BY id",
            [],
        )?;
        let groups = rows.into_iter().map(ContactGroup::from_row).collect();
        Ok(self.cache.borrow_mut().store_contact_groups(groups))
    }

    /// All rows of a table, cached and indexed by primary key when it is a
    /// single column.
    pub fn get_table_rows(&self, table: &str) -> Result<Arc<Vec<Row>>, StorageError> {
        let name = match self.tables.borrow().get(&table.to_lowercase()) {
            Some(info) => info.name.clone(),
            None => return Ok(Arc::new(Vec::new())),
        };
        if let Some(cached) = self.cache.borrow().table_rows(table) {
            return Ok(Arc::clone(&cached.rows));
        }
        let key = self.primary_key(table).ok().map(|column| column.name);
        let rows = self.select_rows(&format!("SELECT * FROM {}", quote_ident(&name)), [])?;
        Ok(self
            .cache
            .borrow_mut()
            .store_table_rows(table, rows, key.as_deref()))
    }

    /// One cached table row by primary key value.
    pub fn get_table_row(&self, table: &str, key: &SqlValue) -> Result<Option<Row>, StorageError> {
        let rows = self.get_table_rows(table)?;
        let cache = self.cache.borrow();
        let index = cache
            .table_rows(table)
            .and_then(|cached| cached.by_key.get(&key.to_string()).copied());
        Ok(index.and_then(|index| rows.get(index).cloned()))
    }

    pub fn get_transfers(&self) -> Result<Arc<Vec<Transfer>>, StorageError> {
        if !self.has_table("transfers") {
            return Ok(Arc::new(Vec::new()));
        }
        if let Some(transfers) = self.cache.borrow().transfers() {
            return Ok(transfers);
        }
        let rows = self.select_rows("SELECT * FROM transfers ORDER BY id", [])?;
        let transfers = rows.into_iter().map(Transfer::from_row).collect();
        Ok(self.cache.borrow_mut().store_transfers(transfers))
    }

    pub fn get_smses(&self) -> Result<Arc<Vec<Sms>>, StorageError> {
        if !self.has_table("smses") {
            return Ok(Arc::new(Vec::new()));
        }
        if let Some(smses) = self.cache.borrow().smses() {
            return Ok(smses);
        }
        let rows = self.select_rows("SELECT * FROM smses ORDER BY id", [])?;
        let smses = rows.into_iter().map(Sms::from_row).collect();
        Ok(self.cache.borrow_mut().store_smses(smses))
    }

    /// Calls, optionally only those under the given chat.
    pub fn get_calls(&self, chat: Option<&Chat>) -> Result<Vec<Call>, StorageError> {
        if !self.has_table("calls") {
            return Ok(Vec::new());
        }
        let cached = self.cache.borrow().calls();
        let calls = match cached {
            Some(calls) => calls,
            None => {
                let rows = self.select_rows("SELECT * FROM calls ORDER BY calls.id", [])?;
                let calls = rows.into_iter().map(Call::from_row).collect();
                self.cache.borrow_mut().store_calls(calls)
            }
        };
        Ok(calls
            .iter()
            .filter(|call| chat.map_or(true, |chat| call.conv_dbid == Some(chat.id)))
            .cloned()
            .collect())
    }

    /// Videos that have a matching call, optionally only under the given chat.
    pub fn get_videos(&self, chat: Option<&Chat>) -> Result<Vec<Video>, StorageError> {
        if !self.has_table("videos") || !self.has_table("calls") {
            return Ok(Vec::new());
        }
        let cached = self.cache.borrow().videos();
        let videos = match cached {
            Some(videos) => videos,
            None => {
                let rows = self.select_rows(
                    "SELECT videos.* FROM videos INNER JOIN calls \
                     ON videos.convo_id = calls.id ORDER BY videos.id",
                    [],
                )?;
                let videos = rows.into_iter().map(Video::from_row).collect();
                self.cache.borrow_mut().store_videos(videos)
            }
        };
        Ok(videos
            .iter()
            .filter(|video| chat.map_or(true, |chat| video.convo_id == Some(chat.id)))
            .cloned()
            .collect())
    }

    /// Counts messages dated after now.
    pub fn check_future_dates(&self) -> Result<FutureDates, StorageError> {
        let checked_at = Utc::now().timestamp();
        if !self.has_table("messages") {
            return Ok(FutureDates {
                count: 0,
                latest: None,
                checked_at,
            });
        }
        let latest: Option<i64> =
            self.conn
                .query_row("SELECT MAX(timestamp) FROM messages", [], |row| row.get(0))?;
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE timestamp > ?1",
            [checked_at],
            |row| row.get(0),
        )?;
        Ok(FutureDates {
            count,
            latest: latest.and_then(timestamp_to_datetime),
            checked_at,
        })
    }
}

fn open_error(path: &Path, err: rusqlite::Error) -> StorageError {
    let reason = match &err {
        rusqlite::Error::SqliteFailure(failure, message) => match failure.code {
            ErrorCode::NotADatabase => OpenFailure::NotADatabase,
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => OpenFailure::Locked,
            ErrorCode::CannotOpen => OpenFailure::Missing,
            _ => OpenFailure::Other(message.clone().unwrap_or_else(|| failure.to_string())),
        },
        other => OpenFailure::Other(other.to_string()),
    };
    StorageError::Open {
        path: path.to_path_buf(),
        reason,
    }
}

fn read_row(row: &rusqlite::Row<'_>, names: &[String]) -> rusqlite::Result<Row> {
    let mut values = Row::new();
    for (index, name) in names.iter().enumerate() {
        let value = match row.get_ref(index)? {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(value) => SqlValue::Integer(value),
            ValueRef::Real(value) => SqlValue::Real(value),
            ValueRef::Text(bytes) => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => SqlValue::Blob(bytes.to_vec()),
        };
        values.set(name, value);
    }
    Ok(values)
}

pub(crate) fn to_sql_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(value) => Value::Integer(*value),
        SqlValue::Real(value) => Value::Real(*value),
        SqlValue::Text(value) => Value::Text(value.clone()),
        SqlValue::Blob(value) => Value::Blob(value.clone()),
    }
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
