use crate::diff::{participant_key, ChatDiffEntry, ContactsDiff, Direction, MessageKey, ScanResult};
use crate::MergeError;
use serde::Serialize;
use skyp_core::{plural, Chat, Contact, ContactGroup, Message, Participant, SkypConfig, StatusSink};
use skyp_storage::SkypeDatabase;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Counts of what a merge copied, plus per-chat failures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub chats: usize,
    pub contacts: usize,
    pub contact_groups: usize,
    pub participants: usize,
    pub messages: usize,
    /// Chat identity or "contacts", and the error text.
    pub errors: Vec<(String, String)>,
}

impl MergeReport {
    pub fn absorb(&mut self, other: MergeReport) {
        self.chats += other.chats;
        self.contacts += other.contacts;
        self.contact_groups += other.contact_groups;
        self.participants += other.participants;
        self.messages += other.messages;
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.chats == 0
            && self.contacts == 0
            && self.contact_groups == 0
            && self.participants == 0
            && self.messages == 0
    }

    /// "2 chats and 1 contact and 12 messages".
    pub fn summary(&self) -> String {
        let parts: Vec<String> = [
            ("chat", self.chats),
            ("contact", self.contacts),
            ("contact group", self.contact_groups),
            ("participant", self.participants),
            ("message", self.messages),
        ]
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(word, count)| plural(word, count))
        .collect();
        if parts.is_empty() {
            "nothing".to_string()
        } else {
            parts.join(" and ")
        }
    }
}

/// Copies differences from one database into another.
pub struct Merger {
    config: SkypConfig,
    sink: Arc<dyn StatusSink>,
}

impl Merger {
    pub fn new(config: SkypConfig, sink: Arc<dyn StatusSink>) -> Self {
        Self { config, sink }
    }

    pub fn config(&self) -> &SkypConfig {
        &self.config
    }

    /// Merges one scanned chat and drops it from the outstanding list.
    pub fn merge_scanned_chat(
        &self,
        source: &SkypeDatabase,
        target: &mut SkypeDatabase,
        scan: &mut ScanResult,
        direction: Direction,
        identity: &str,
    ) -> Result<MergeReport, MergeError> {
        let entry = scan
            .find(direction, identity)
            .cloned()
            .ok_or_else(|| MergeError::ChatNotFound(identity.to_string()))?;
        let report = self.merge_chat(source, target, &entry)?;
        scan.remove(direction, identity);
        Ok(report)
    }

    /// Copies a chat's missing participants and messages into `target`,
    /// creating the chat there first if needed.
    ///
    /// Rows the target gained since the diff are skipped.
    pub fn merge_chat(
        &self,
        source: &SkypeDatabase,
        target: &mut SkypeDatabase,
        entry: &ChatDiffEntry,
    ) -> Result<MergeReport, MergeError> {
        let mut report = MergeReport::default();
        self.merge_chat_into(source, target, entry, &mut report)?;
        Ok(report)
    }

    /// Adds to `report` whatever the chat merge committed, including the
    /// steps before a failing one.
    fn merge_chat_into(
        &self,
        source: &SkypeDatabase,
        target: &mut SkypeDatabase,
        entry: &ChatDiffEntry,
        report: &mut MergeReport,
    ) -> Result<(), MergeError> {
        self.sink.status(&format!("Merging {}.", entry.title_long));
        let mut merged = MergeReport::default();
        let copied = self.copy_chat(source, target, entry, &mut merged);
        let cleared = target.clear_cache();
        let outcome = copied.and(cleared.map_err(MergeError::from));

        if outcome.is_ok() {
            info!(
                event = "chat_merged",
                chat = %entry.identity,
                messages = merged.messages,
                participants = merged.participants,
                target = %target.filename().display()
            );
            if !merged.is_empty() {
                self.sink.log(&format!(
                    "Merged {} of {} into {}.",
                    merged.summary(),
                    entry.title_long,
                    target.filename().display()
                ));
            }
        }
        report.absorb(merged);
        outcome
    }

    fn copy_chat(
        &self,
        source: &SkypeDatabase,
        target: &mut SkypeDatabase,
        entry: &ChatDiffEntry,
        report: &mut MergeReport,
    ) -> Result<(), MergeError> {
        let mut chat = match target.get_conversation(&entry.identity)? {
            Some(chat) => chat,
            None => {
                let id = target.insert_chat(&entry.chat, source)?;
                report.chats += 1;
                target
                    .get_conversations()?
                    .iter()
                    .find(|chat| chat.id == id)
                    .cloned()
                    .ok_or_else(|| MergeError::ChatNotFound(entry.identity.clone()))?
            }
        };

        let participants = self.missing_participants(source, target, &chat, &entry.participants);
        if !participants.is_empty() {
            let contacts = self.missing_participant_contacts(source, target, &participants)?;
            report.contacts += target.insert_contacts(&contacts, source)?;
            report.participants += target.insert_participants(&chat, &participants, source)?;
        }

        let messages = self.missing_messages(source, target, &chat, &entry.messages)?;
        if !messages.is_empty() {
            let ids = target.insert_messages(&mut chat, &messages, source, &entry.chat)?;
            report.messages += ids.len();
        }
        Ok(())
    }

    fn missing_participants(
        &self,
        source: &SkypeDatabase,
        target: &SkypeDatabase,
        chat: &Chat,
        participants: &[Participant],
    ) -> Vec<Participant> {
        let present: HashSet<Option<String>> = chat
            .participants
            .iter()
            .map(|participant| participant_key(target.id(), &participant.identity))
            .collect();
        let mut seen = HashSet::new();
        participants
            .iter()
            .filter(|participant| {
                let key = participant_key(source.id(), &participant.identity);
                !present.contains(&key) && seen.insert(key)
            })
            .cloned()
            .collect()
    }

    /// Contacts behind new participants that exist in the source's Contacts
    /// table but not in the target's.
    fn missing_participant_contacts(
        &self,
        source: &SkypeDatabase,
        target: &SkypeDatabase,
        participants: &[Participant],
    ) -> Result<Vec<Contact>, MergeError> {
        let existing = target.get_contacts()?;
        let mut known: HashSet<String> = existing
            .iter()
            .map(|contact| contact.identity.clone())
            .collect();
        known.extend(source.id().map(str::to_string));
        known.extend(target.id().map(str::to_string));
        Ok(participants
            .iter()
            .map(|participant| &participant.contact)
            .filter(|contact| contact.id.is_some() && known.insert(contact.identity.clone()))
            .cloned()
            .collect())
    }

    fn missing_messages(
        &self,
        source: &SkypeDatabase,
        target: &SkypeDatabase,
        chat: &Chat,
        messages: &[Message],
    ) -> Result<Vec<Message>, MergeError> {
        let present: HashSet<MessageKey> = target
            .chat_messages(chat)?
            .iter()
            .map(|message| MessageKey::new(target.id(), message))
            .collect();
        let mut seen = HashSet::new();
        Ok(messages
            .iter()
            .filter(|message| {
                let key = MessageKey::new(source.id(), message);
                !present.contains(&key) && seen.insert(key)
            })
            .cloned()
            .collect())
    }

    /// Inserts selected contacts, plus members of selected groups the
    /// target lacks, then inserts or updates the groups.
    pub fn merge_contacts(
        &self,
        source: &SkypeDatabase,
        target: &mut SkypeDatabase,
        contacts: &[Contact],
        groups: &[ContactGroup],
    ) -> Result<MergeReport, MergeError> {
        let mut report = MergeReport::default();
        let mut known: HashSet<String> = target
            .get_contacts()?
            .iter()
            .map(|contact| contact.identity.clone())
            .collect();
        let mut selected: Vec<Contact> = contacts
            .iter()
            .filter(|contact| known.insert(contact.identity.clone()))
            .cloned()
            .collect();
        for group in groups {
            for member in group.member_identities() {
                if known.contains(member) {
                    continue;
                }
                if let Some(contact) = source.get_contact(member)? {
                    known.insert(member.to_string());
                    selected.push(contact);
                }
            }
        }

        report.contacts += target.insert_contacts(&selected, source)?;
        report.contact_groups += target.replace_contactgroups(groups, source)?;
        target.clear_cache()?;
        if !report.is_empty() {
            info!(
                event = "contacts_merged",
                contacts = report.contacts,
                groups = report.contact_groups,
                target = %target.filename().display()
            );
        }
        Ok(report)
    }

    /// Merges every outstanding chat of one direction plus that direction's
    /// contacts and groups.
    ///
    /// A failing chat is recorded in the report and the rest still merge.
    /// Whatever the failing chat committed before the error is counted;
    /// merged chats are dropped from `scan`.
    pub fn merge_all(
        &self,
        source: &SkypeDatabase,
        target: &mut SkypeDatabase,
        scan: &mut ScanResult,
        contacts: &ContactsDiff,
        direction: Direction,
    ) -> MergeReport {
        let mut report = MergeReport::default();
        let entries = scan.entries(direction).to_vec();
        for (index, entry) in entries.iter().enumerate() {
            self.sink.status(&format!(
                "Merging chat {} of {}: {}.",
                index + 1,
                entries.len(),
                entry.title_long
            ));
            match self.merge_chat_into(source, target, entry, &mut report) {
                Ok(()) => {
                    scan.remove(direction, &entry.identity);
                }
                Err(err) => {
                    warn!(
                        event = "chat_merge_failed",
                        chat = %entry.identity,
                        error = %err
                    );
                    report.errors.push((entry.identity.clone(), err.to_string()));
                }
            }
        }

        let side = direction.index();
        match self.merge_contacts(source, target, &contacts.contacts[side], &contacts.groups[side])
        {
            Ok(merged) => report.absorb(merged),
            Err(err) => {
                warn!(event = "contact_merge_failed", error = %err);
                report.errors.push(("contacts".to_string(), err.to_string()));
            }
        }
        info!(
            event = "merge_all_finished",
            summary = %report.summary(),
            errors = report.errors.len(),
            target = %target.filename().display()
        );
        self.sink
            .status(&format!("Merged {} into {}.", report.summary(), target.filename().display()));
        report
    }
}
