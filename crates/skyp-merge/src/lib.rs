//! Chat and contact comparison between two Skype databases, and merging of
//! what one side lacks into the other.

pub mod diff;
pub mod merge;
pub mod worker;

use skyp_storage::StorageError;
use thiserror::Error;

pub use diff::{
    compare_chats, compare_contacts, get_chat_diff, scan_chats, ChatDiff, ChatDiffEntry,
    ComparedChat, ContactsDiff, Direction, DiffStatus, ScanChunk, ScanResult,
};
pub use merge::{MergeReport, Merger};
pub use worker::{DiffJob, DiffWorker, WorkerEvent};

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("chat {0} not found")]
    ChatNotFound(String),
    #[error("diff worker stopped")]
    WorkerStopped,
}
