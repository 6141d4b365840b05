use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    domain::{ChatId, MessageId},
    store::{IdentityStore, MirrorMessage, OriginalKey},
    utils::iso_timestamp_utc,
    Result,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoreFileData {
    saved_at: String,
    messages: Vec<MirrorMessage>,
}

/// Write-through JSON file store.
///
/// Every mutation rewrites the file while the row lock is held, so the file
/// never lags behind a committed insert or delete.
pub struct JsonFileStore {
    path: PathBuf,
    rows: Mutex<HashMap<OriginalKey, Vec<MirrorMessage>>>,
}

impl JsonFileStore {
    /// Open (or create on first write) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut rows: HashMap<OriginalKey, Vec<MirrorMessage>> = HashMap::new();
        if let Some(data) = load_store_file(&path)? {
            for row in data.messages {
                rows.entry(row.key()).or_default().push(row);
            }
        }
        Ok(Self {
            path,
            rows: Mutex::new(rows),
        })
    }

    async fn persist(&self, rows: &HashMap<OriginalKey, Vec<MirrorMessage>>) -> Result<()> {
        let mut messages: Vec<MirrorMessage> = rows.values().flatten().copied().collect();
        messages.sort_by_key(|r| (r.original_channel, r.original_id));
        let data = StoreFileData {
            saved_at: iso_timestamp_utc(),
            messages,
        };
        save_store_file(&self.path, &data).await
    }
}

#[async_trait]
impl IdentityStore for JsonFileStore {
    async fn insert(&self, row: MirrorMessage) -> Result<()> {
        let mut map = self.rows.lock().await;
        map.entry(row.key()).or_default().push(row);
        if let Err(e) = self.persist(&map).await {
            // Keep memory and disk consistent: the insert did not happen.
            if let Some(rows) = map.get_mut(&row.key()) {
                rows.pop();
                if rows.is_empty() {
                    map.remove(&row.key());
                }
            }
            return Err(e);
        }
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
        let key = OriginalKey::new(original_id, original_channel);
        let mut map = self.rows.lock().await;
        let Some(removed) = map.remove(&key) else {
            return Ok(());
        };
        if let Err(e) = self.persist(&map).await {
            // The file still holds these rows; keep memory in step with it.
            map.insert(key, removed);
            return Err(e);
        }
        Ok(())
    }
}

fn load_store_file(path: &Path) -> Result<Option<StoreFileData>> {
    if !path.exists() {
        return Ok(None);
    }
    let txt = std::fs::read_to_string(path)?;
    if txt.trim().is_empty() {
        return Ok(None);
    }
    let data: StoreFileData = serde_json::from_str(&txt)?;
    Ok(Some(data))
}

async fn save_store_file(path: &Path, data: &StoreFileData) -> Result<()> {
    let txt = serde_json::to_string(data)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, txt).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MessageRef;

    fn tmp_file(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let pid = std::process::id();
        std::env::temp_dir().join(format!("{prefix}-{pid}-{ts}.json"))
    }

    fn row(orig: i32, chan: i64, mirror: i32, mchan: i64) -> MirrorMessage {
        MirrorMessage::new(
            MessageId(orig),
            ChatId(chan),
            MessageRef::new(ChatId(mchan), MessageId(mirror)),
        )
    }

    #[tokio::test]
    async fn rows_survive_reopen() {
        let path = tmp_file("telemirror-store");
        {
            let store = JsonFileStore::open(&path).unwrap();
            store.insert(row(5, 100, 50, 200)).await.unwrap();
            store.insert(row(5, 100, 60, 300)).await.unwrap();
            store.insert(row(6, 100, 61, 300)).await.unwrap();
            store
                .delete_messages(MessageId(6), ChatId(100))
                .await
                .unwrap();
        }

        let reopened = JsonFileStore::open(&path).unwrap();
        let rows = reopened
            .get_messages(MessageId(5), ChatId(100))
            .await
            .unwrap();
        assert_eq!(rows, vec![row(5, 100, 50, 200), row(5, 100, 60, 300)]);
        assert!(reopened
            .get_messages(MessageId(6), ChatId(100))
            .await
            .unwrap()
            .is_empty());

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("saved_at"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn missing_or_empty_file_opens_empty() {
        let path = tmp_file("telemirror-store-empty");
        let store = JsonFileStore::open(&path).unwrap();
        assert!(store
            .get_messages(MessageId(1), ChatId(1))
            .await
            .unwrap()
            .is_empty());

        std::fs::write(&path, "  ").unwrap();
        let store = JsonFileStore::open(&path).unwrap();
        assert!(store
            .get_messages(MessageId(1), ChatId(1))
            .await
            .unwrap()
            .is_empty());
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn failed_persist_keeps_rows_in_memory_and_on_disk() {
        let path = tmp_file("telemirror-store-rollback");
        let store = JsonFileStore::open(&path).unwrap();
        store.insert(row(5, 100, 50, 200)).await.unwrap();

        // A directory where the tmp file goes makes every write fail.
        let tmp = path.with_extension("json.tmp");
        std::fs::create_dir_all(&tmp).unwrap();

        assert!(store
            .delete_messages(MessageId(5), ChatId(100))
            .await
            .is_err());
        assert_eq!(
            store.get_messages(MessageId(5), ChatId(100)).await.unwrap(),
            vec![row(5, 100, 50, 200)]
        );
        assert!(store.insert(row(6, 100, 51, 200)).await.is_err());
        assert!(store
            .get_messages(MessageId(6), ChatId(100))
            .await
            .unwrap()
            .is_empty());

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(
            reopened
                .get_messages(MessageId(5), ChatId(100))
                .await
                .unwrap(),
            vec![row(5, 100, 50, 200)]
        );

        let _ = std::fs::remove_dir_all(&tmp);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let path = tmp_file("telemirror-store-bad");
        std::fs::write(&path, "{not json").unwrap();
        assert!(JsonFileStore::open(&path).is_err());
        let _ = std::fs::remove_file(&path);
    }
}
