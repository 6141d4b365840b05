use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    domain::{ChatId, MessageId},
    store::{IdentityStore, MirrorMessage, OriginalKey},
    Result,
};

/// Process-local store; contents are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<OriginalKey, Vec<MirrorMessage>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every row, grouped by original and sorted for stable output.
    pub async fn snapshot(&self) -> Vec<MirrorMessage> {
        let map = self.rows.lock().await;
        let mut out: Vec<MirrorMessage> = map.values().flatten().copied().collect();
        out.sort_by_key(|r| (r.original_channel, r.original_id));
        out
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn insert(&self, row: MirrorMessage) -> Result<()> {
        let mut map = self.rows.lock().await;
        map.entry(row.key()).or_default().push(row);
        Ok(())
    }

    async fn get_messages(
        &self,
        original_id: MessageId,
        original_channel: ChatId,
    ) -> Result<Vec<MirrorMessage>> {
        let map = self.rows.lock().await;
        Ok(map
            .get(&OriginalKey::new(original_id, original_channel))
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_messages(
        &self,
        original_id: MessageId,
        original_channel: ChatId,
    ) -> Result<()> {
        let mut map = self.rows.lock().await;
        map.remove(&OriginalKey::new(original_id, original_channel));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MessageRef;

    fn row(orig: i32, chan: i64, mirror: i32, mchan: i64) -> MirrorMessage {
        MirrorMessage::new(
            MessageId(orig),
            ChatId(chan),
            MessageRef::new(ChatId(mchan), MessageId(mirror)),
        )
    }

    #[tokio::test]
    async fn rows_are_scoped_by_chat() {
        let store = MemoryStore::new();
        store.insert(row(5, 100, 50, 200)).await.unwrap();
        store.insert(row(5, 101, 70, 200)).await.unwrap();

        let rows = store.get_messages(MessageId(5), ChatId(100)).await.unwrap();
        assert_eq!(rows, vec![row(5, 100, 50, 200)]);
    }

    #[tokio::test]
    async fn insert_appends_and_delete_removes_all() {
        let store = MemoryStore::new();
        store.insert(row(5, 100, 50, 200)).await.unwrap();
        store.insert(row(5, 100, 60, 300)).await.unwrap();
        store.insert(row(6, 100, 61, 300)).await.unwrap();

        let rows = store.get_messages(MessageId(5), ChatId(100)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].mirror_channel, 200);
        assert_eq!(rows[1].mirror_channel, 300);

        store
            .delete_messages(MessageId(5), ChatId(100))
            .await
            .unwrap();
        assert!(store
            .get_messages(MessageId(5), ChatId(100))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn delete_of_unknown_original_is_noop() {
        let store = MemoryStore::new();
        store
            .delete_messages(MessageId(1), ChatId(1))
            .await
            .unwrap();
        assert!(store.is_empty().await);
    }
}
