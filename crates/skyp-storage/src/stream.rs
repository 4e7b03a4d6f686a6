//! Lazy retrieval of messages in timestamp order.
//!
//! A stream pages through the Messages table with a keyset cursor, so it
//! never holds more than one page of rows it has not yet yielded. Streams
//! over a whole chat fill the handle's message cache once fully consumed,
//! unless built with `uncached`; later streams over that chat are served
//! from the cache.

use crate::database::SkypeDatabase;
use crate::StorageError;
use rusqlite::types::Value;
use skyp_core::{Chat, Message, MESSAGE_TYPES_SUPPORTED};
use std::collections::{BTreeSet, VecDeque};
use std::vec;
use tracing::debug;

const PAGE_SIZE: usize = 500;

/// Which messages to retrieve and in what order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageQuery {
    chat: Option<i64>,
    ascending: bool,
    timestamp_from: Option<i64>,
    body_like: Option<String>,
    use_cache: bool,
}

impl Default for MessageQuery {
    fn default() -> Self {
        Self::all()
    }
}

impl MessageQuery {
    /// Messages of all chats, oldest first.
    pub fn all() -> Self {
        Self {
            chat: None,
            ascending: true,
            timestamp_from: None,
            body_like: None,
            use_cache: true,
        }
    }

    pub fn chat(chat_id: i64) -> Self {
        Self {
            chat: Some(chat_id),
            ..Self::all()
        }
    }

    pub fn for_chat(chat: &Chat) -> Self {
        Self::chat(chat.id)
    }

    pub fn descending(mut self) -> Self {
        self.ascending = false;
        self
    }

    /// Only messages strictly after `timestamp` when ascending, strictly
    /// before it when descending.
    pub fn timestamp_from(mut self, timestamp: i64) -> Self {
        self.timestamp_from = Some(timestamp);
        self
    }

    /// Only messages whose body contains `text`, ignoring ASCII case.
    pub fn body_like(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.body_like = (!text.is_empty()).then_some(text);
        self
    }

    /// Neither served from nor stored into the message cache.
    pub fn uncached(mut self) -> Self {
        self.use_cache = false;
        self
    }

    pub fn chat_id(&self) -> Option<i64> {
        self.chat
    }

    pub fn is_ascending(&self) -> bool {
        self.ascending
    }

    fn caches_whole_chat(&self) -> bool {
        self.use_cache
            && self.chat.is_some()
            && self.timestamp_from.is_none()
            && self.body_like.is_none()
    }

    fn passes_bound(&self, timestamp: i64) -> bool {
        match self.timestamp_from {
            None => true,
            Some(from) if self.ascending => timestamp > from,
            Some(from) => timestamp < from,
        }
    }
}

enum Source {
    Cached(vec::IntoIter<Message>),
    Query(Cursor),
    Done,
}

struct Cursor {
    page: VecDeque<Message>,
    last: Option<(i64, i64)>,
    exhausted: bool,
}

/// Finite, restartable sequence of messages.
///
/// Creating a new stream never resumes an earlier one.
pub struct MessageStream<'a> {
    db: &'a SkypeDatabase,
    query: MessageQuery,
    source: Source,
    accumulate: bool,
    cached_so_far: Vec<Message>,
    from_cache: bool,
}

impl<'a> MessageStream<'a> {
    pub(crate) fn new(db: &'a SkypeDatabase, query: MessageQuery) -> Self {
        let mut stream = Self {
            db,
            accumulate: false,
            cached_so_far: Vec::new(),
            from_cache: false,
            source: Source::Done,
            query,
        };
        if !db.has_table("messages") {
            return stream;
        }

        let cached = match (stream.query.chat, &stream.query.body_like) {
            (Some(chat_id), None) if stream.query.use_cache => db.cache.borrow().messages(chat_id),
            _ => None,
        };
        stream.source = match cached {
            Some(messages) => {
                let mut messages: Vec<Message> = messages
                    .iter()
                    .filter(|message| stream.query.passes_bound(message.timestamp))
                    .cloned()
                    .collect();
                if !stream.query.ascending {
                    messages.reverse();
                }
                stream.from_cache = true;
                Source::Cached(messages.into_iter())
            }
            None => {
                stream.accumulate = stream.query.caches_whole_chat();
                Source::Query(Cursor {
                    page: VecDeque::new(),
                    last: None,
                    exhausted: false,
                })
            }
        };
        stream
    }

    /// Messages of a whole-chat stream yielded so far, in yield order.
    pub fn cached_so_far(&self) -> &[Message] {
        &self.cached_so_far
    }

    pub fn is_from_cache(&self) -> bool {
        self.from_cache
    }

    fn fetch_page(&self, last: Option<(i64, i64)>) -> Result<Vec<Message>, StorageError> {
        let query = &self.query;
        let types = MESSAGE_TYPES_SUPPORTED
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let (cmp, direction) = if query.ascending {
            (">", "ASC")
        } else {
            ("<", "DESC")
        };

        let mut sql = format!("SELECT * FROM messages WHERE type IN ({types})");
        let mut params: Vec<Value> = Vec::new();
        if let Some(chat_id) = query.chat {
            sql.push_str(" AND convo_id = ?");
            params.push(Value::Integer(chat_id));
        }
        if let Some(from) = query.timestamp_from {
            sql.push_str(&format!(" AND timestamp {cmp} ?"));
            params.push(Value::Integer(from));
        }
        if let Some(text) = &query.body_like {
            sql.push_str(" AND body_xml LIKE ? ESCAPE '\\'");
            params.push(Value::Text(format!("%{}%", escape_like(text))));
        }
        if let Some((timestamp, id)) = last {
            sql.push_str(&format!(
                " AND (IFNULL(timestamp, 0) {cmp} ? OR (IFNULL(timestamp, 0) = ? AND id {cmp} ?))"
            ));
            params.extend([
                Value::Integer(timestamp),
                Value::Integer(timestamp),
                Value::Integer(id),
            ]);
        }
        sql.push_str(&format!(
            " ORDER BY IFNULL(timestamp, 0) {direction}, id {direction} LIMIT {PAGE_SIZE}"
        ));

        let rows = self
            .db
            .select_rows(&sql, rusqlite::params_from_iter(params.iter()))?;
        Ok(rows.into_iter().map(Message::from_row).collect())
    }

    fn finish(&mut self) {
        self.source = Source::Done;
        if let Some(chat_id) = self.query.chat.filter(|_| self.accumulate) {
            debug!(
                event = "chat_messages_cached",
                chat = chat_id,
                count = self.cached_so_far.len()
            );
            self.db
                .cache
                .borrow_mut()
                .store_messages(chat_id, self.cached_so_far.clone());
        }
    }
}

impl Iterator for MessageStream<'_> {
    type Item = Result<Message, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (last, exhausted) = match &mut self.source {
            Source::Done => return None,
            Source::Cached(messages) => return messages.next().map(Ok),
            Source::Query(cursor) => {
                if let Some(message) = cursor.page.pop_front() {
                    if self.accumulate {
                        self.cached_so_far.push(message.clone());
                    }
                    return Some(Ok(message));
                }
                (cursor.last, cursor.exhausted)
            }
        };
        if exhausted {
            self.finish();
            return None;
        }

        let page = match self.fetch_page(last) {
            Ok(page) => page,
            Err(err) => {
                self.source = Source::Done;
                return Some(Err(err));
            }
        };
        let Source::Query(cursor) = &mut self.source else {
            return None;
        };
        cursor.exhausted = page.len() < PAGE_SIZE;
        cursor.last = page.last().map(|message| (message.timestamp, message.id));
        cursor.page = page.into();
        match cursor.page.pop_front() {
            Some(message) => {
                if self.accumulate {
                    self.cached_so_far.push(message.clone());
                }
                Some(Ok(message))
            }
            None => {
                self.finish();
                None
            }
        }
    }
}

/// Escapes LIKE wildcards so `text` matches literally.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Prepends messages older than the first loaded one, down to `bound`.
///
/// Returns how many messages were added.
pub fn extend_older(
    db: &SkypeDatabase,
    chat_id: i64,
    loaded: &mut VecDeque<Message>,
    bound: i64,
) -> Result<usize, StorageError> {
    let mut query = MessageQuery::chat(chat_id).descending();
    let mut seen = BTreeSet::new();
    if let Some(oldest) = loaded.front().map(|message| message.timestamp) {
        query = query.timestamp_from(oldest.saturating_add(1));
        seen = loaded
            .iter()
            .take_while(|message| message.timestamp == oldest)
            .map(|message| message.id)
            .collect();
    }
    let mut added = 0;
    for message in db.get_messages(query) {
        let message = message?;
        if message.timestamp < bound {
            break;
        }
        if seen.contains(&message.id) {
            continue;
        }
        loaded.push_front(message);
        added += 1;
    }
    Ok(added)
}

/// Appends messages newer than the last loaded one, up to `bound` if given.
pub fn extend_newer(
    db: &SkypeDatabase,
    chat_id: i64,
    loaded: &mut VecDeque<Message>,
    bound: Option<i64>,
) -> Result<usize, StorageError> {
    let mut query = MessageQuery::chat(chat_id);
    let mut seen = BTreeSet::new();
    if let Some(newest) = loaded.back().map(|message| message.timestamp) {
        query = query.timestamp_from(newest.saturating_sub(1));
        seen = loaded
            .iter()
            .rev()
            .take_while(|message| message.timestamp == newest)
            .map(|message| message.id)
            .collect();
    }
    let mut added = 0;
    for message in db.get_messages(query) {
        let message = message?;
        if bound.is_some_and(|bound| message.timestamp > bound) {
            break;
        }
        if seen.contains(&message.id) {
            continue;
        }
        loaded.push_back(message);
        added += 1;
    }
    Ok(added)
}
