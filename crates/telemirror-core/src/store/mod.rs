//! Identity store: original message -> mirrored copies.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    domain::{ChatId, MessageId, MessageRef},
    Result,
};

pub mod file;
pub mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

/// One mirrored copy of one original message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MirrorMessage {
    pub original_id: i32,
    pub original_channel: i64,
    pub mirror_id: i32,
    pub mirror_channel: i64,
}

impl MirrorMessage {
    pub fn new(original_id: MessageId, original_channel: ChatId, mirror: MessageRef) -> Self {
        Self {
            original_id: original_id.0,
            original_channel: original_channel.0,
            mirror_id: mirror.message_id.0,
            mirror_channel: mirror.chat_id.0,
        }
    }

    pub fn key(&self) -> OriginalKey {
        OriginalKey {
            original_id: MessageId(self.original_id),
            original_channel: ChatId(self.original_channel),
        }
    }

    pub fn mirror_ref(&self) -> MessageRef {
        MessageRef::new(ChatId(self.mirror_channel), MessageId(self.mirror_id))
    }
}

/// Message ids are only unique within their chat, so rows are keyed by both.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OriginalKey {
    pub original_id: MessageId,
    pub original_channel: ChatId,
}

impl OriginalKey {
    pub fn new(original_id: MessageId, original_channel: ChatId) -> Self {
        Self {
            original_id,
            original_channel,
        }
    }
}

/// Durable mapping shared by every in-flight handler.
///
/// Implementations must be safe for concurrent use on distinct keys; callers
/// hold no lock across calls.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Append a row. Inserts never overwrite.
    async fn insert(&self, row: MirrorMessage) -> Result<()>;

    /// Rows for one original, in insertion order. Empty when unknown.
    async fn get_messages(
        &self,
        original_id: MessageId,
        original_channel: ChatId,
    ) -> Result<Vec<MirrorMessage>>;

    /// Remove every row for one original.
    async fn delete_messages(&self, original_id: MessageId, original_channel: ChatId)
        -> Result<()>;
}
