use skyp_core::{Call, Chat, Contact, ContactGroup, Message, Row, Sms, Transfer, Video};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// What to drop from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheScope<'a> {
    Table(&'a str),
    All,
}

/// Rows of one table plus an index by single-column primary key.
#[derive(Debug, Clone, Default)]
pub(crate) struct TableRows {
    pub rows: Arc<Vec<Row>>,
    pub by_key: HashMap<String, usize>,
}

/// Row and object caches of one database handle.
///
/// A cached entry stays authoritative until invalidated; nothing here
/// notices writes made behind the handle's back.
#[derive(Debug, Default)]
pub struct CacheManager {
    conversations: Option<Arc<Vec<Chat>>>,
    contacts: Option<Arc<Vec<Contact>>>,
    contacts_by_identity: HashMap<String, usize>,
    contact_groups: Option<Arc<Vec<ContactGroup>>>,
    transfers: Option<Arc<Vec<Transfer>>>,
    smses: Option<Arc<Vec<Sms>>>,
    calls: Option<Arc<Vec<Call>>>,
    videos: Option<Arc<Vec<Video>>>,
    messages: BTreeMap<i64, Arc<Vec<Message>>>,
    tables: BTreeMap<String, TableRows>,
}

impl CacheManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops cached data for one table, or everything.
    ///
    /// Conversations embed participants, contacts and message statistics,
    /// so invalidating any of those tables drops conversations too.
    pub fn invalidate(&mut self, scope: CacheScope<'_>) {
        let table = match scope {
            CacheScope::All => {
                *self = Self::default();
                return;
            }
            CacheScope::Table(table) => table.to_lowercase(),
        };
        self.tables.remove(&table);
        match table.as_str() {
            "conversations" | "participants" | "accounts" => {
                self.conversations = None;
            }
            "contacts" => {
                self.contacts = None;
                self.contacts_by_identity.clear();
                self.conversations = None;
            }
            "messages" => {
                self.messages.clear();
                self.conversations = None;
            }
            "contactgroups" => self.contact_groups = None,
            "transfers" => self.transfers = None,
            "smses" => self.smses = None,
            "calls" => {
                self.calls = None;
                self.videos = None;
            }
            "videos" => self.videos = None,
            _ => {}
        }
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_none()
            && self.contacts.is_none()
            && self.contact_groups.is_none()
            && self.transfers.is_none()
            && self.smses.is_none()
            && self.calls.is_none()
            && self.videos.is_none()
            && self.messages.is_empty()
            && self.tables.is_empty()
    }

    pub fn conversations(&self) -> Option<Arc<Vec<Chat>>> {
        self.conversations.clone()
    }

    pub fn store_conversations(&mut self, chats: Vec<Chat>) -> Arc<Vec<Chat>> {
        let chats = Arc::new(chats);
        self.conversations = Some(Arc::clone(&chats));
        chats
    }

    pub fn contacts(&self) -> Option<Arc<Vec<Contact>>> {
        self.contacts.clone()
    }

    pub fn contact(&self, identity: &str) -> Option<Contact> {
        let contacts = self.contacts.as_ref()?;
        let index = *self.contacts_by_identity.get(identity)?;
        contacts.get(index).cloned()
    }

    pub fn store_contacts(&mut self, contacts: Vec<Contact>) -> Arc<Vec<Contact>> {
        self.contacts_by_identity = contacts
            .iter()
            .enumerate()
            .map(|(index, contact)| (contact.identity.clone(), index))
            .collect();
        let contacts = Arc::new(contacts);
        self.contacts = Some(Arc::clone(&contacts));
        contacts
    }

    pub fn contact_groups(&self) -> Option<Arc<Vec<ContactGroup>>> {
        self.contact_groups.clone()
    }

    pub fn store_contact_groups(&mut self, groups: Vec<ContactGroup>) -> Arc<Vec<ContactGroup>> {
        let groups = Arc::new(groups);
        self.contact_groups = Some(Arc::clone(&groups));
        groups
    }

    pub fn transfers(&self) -> Option<Arc<Vec<Transfer>>> {
        self.transfers.clone()
    }

    pub fn store_transfers(&mut self, transfers: Vec<Transfer>) -> Arc<Vec<Transfer>> {
        let transfers = Arc::new(transfers);
        self.transfers = Some(Arc::clone(&transfers));
        transfers
    }

    pub fn smses(&self) -> Option<Arc<Vec<Sms>>> {
        self.smses.clone()
    }

    pub fn store_smses(&mut self, smses: Vec<Sms>) -> Arc<Vec<Sms>> {
        let smses = Arc::new(smses);
        self.smses = Some(Arc::clone(&smses));
        smses
    }

    pub fn calls(&self) -> Option<Arc<Vec<Call>>> {
        self.calls.clone()
    }

    pub fn store_calls(&mut self, calls: Vec<Call>) -> Arc<Vec<Call>> {
        let calls = Arc::new(calls);
        self.calls = Some(Arc::clone(&calls));
        calls
    }

    pub fn videos(&self) -> Option<Arc<Vec<Video>>> {
        self.videos.clone()
    }

    pub fn store_videos(&mut self, videos: Vec<Video>) -> Arc<Vec<Video>> {
        let videos = Arc::new(videos);
        self.videos = Some(Arc::clone(&videos));
        videos
    }

    /// Messages of one chat in ascending (timestamp, id) order.
    pub fn messages(&self, chat_id: i64) -> Option<Arc<Vec<Message>>> {
        self.messages.get(&chat_id).cloned()
    }

    pub fn store_messages(&mut self, chat_id: i64, mut messages: Vec<Message>) {
        messages.sort_by_key(|message| (message.timestamp, message.id));
        self.messages.insert(chat_id, Arc::new(messages));
    }

    pub(crate) fn table_rows(&self, table: &str) -> Option<&TableRows> {
        self.tables.get(&table.to_lowercase())
    }

    pub(crate) fn store_table_rows(
        &mut self,
        table: &str,
        rows: Vec<Row>,
        key_column: Option<&str>,
    ) -> Arc<Vec<Row>> {
        let by_key = key_column
            .map(|column| {
                rows.iter()
                    .enumerate()
                    .filter_map(|(index, row)| {
                        row.get(column)
                            .filter(|value| !value.is_null())
                            .map(|value| (value.to_string(), index))
                    })
                    .collect()
            })
            .unwrap_or_default();
        let rows = Arc::new(rows);
        self.tables.insert(
            table.to_lowercase(),
            TableRows {
                rows: Arc::clone(&rows),
                by_key,
            },
        );
        rows
    }
}
