use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use telemirror_core::{domain::ChatId, messaging::types::IncomingMessage};

/// Called with a complete album, members sorted by message id.
pub type FlushFn = Arc<dyn Fn(ChatId, Vec<IncomingMessage>) + Send + Sync>;

struct PendingAlbum {
    messages: Vec<IncomingMessage>,
    cancel: CancellationToken,
}

/// Collects Bot API album members (one update each) into a single album.
///
/// An album is flushed once no new member arrived for `timeout`.
pub struct AlbumBuffer {
    timeout: Duration,
    flush: FlushFn,
    pending: tokio::sync::Mutex<HashMap<(ChatId, String), PendingAlbum>>,
}

impl AlbumBuffer {
    pub fn new(timeout: Duration, flush: FlushFn) -> Arc<Self> {
        Arc::new(Self {
            timeout,
            flush,
            pending: tokio::sync::Mutex::new(HashMap::new()),
        })
    }

    /// Buffer one member. Messages without a group id are ignored.
    pub async fn add(self: &Arc<Self>, chat_id: ChatId, message: IncomingMessage) {
        let Some(group_id) = message.grouped_id.clone() else {
            return;
        };
        let key = (chat_id, group_id);

        let mut map = self.pending.lock().await;
        let cancel = CancellationToken::new();
        match map.get_mut(&key) {
            Some(album) => {
                // Existing album: push and reset the timer.
                album.messages.push(message);
                album.cancel.cancel();
                album.cancel = cancel.clone();
            }
            None => {
                map.insert(
                    key.clone(),
                    PendingAlbum {
                        messages: vec![message],
                        cancel: cancel.clone(),
                    },
                );
            }
        }
        drop(map);

        self.spawn_timer(key, cancel);
    }

    pub async fn pending(&self) -> usize {
        self.pending.lock().await.len()
    }

    fn spawn_timer(self: &Arc<Self>, key: (ChatId, String), cancel: CancellationToken) {
        let buffer = Arc::clone(self);
        let timeout = self.timeout;
        tokio::spawn(async move {
            tokio::select! {
              _ = cancel.cancelled() => {}
              _ = tokio::time::sleep(timeout) => {
                buffer.flush_album(&key).await;
              }
            }
        });
    }

    async fn flush_album(&self, key: &(ChatId, String)) {
        let album = {
            let mut map = self.pending.lock().await;
            map.remove(key)
        };
        let Some(mut album) = album else {
            return;
        };

        album.messages.sort_by_key(|m| m.id);
        album.messages.dedup_by_key(|m| m.id);
        debug!(
            chat_id = key.0 .0,
            grouped_id = %key.1,
            members = album.messages.len(),
            "album complete"
        );
        (self.flush)(key.0, album.messages);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemirror_core::{
        domain::MessageId,
        messaging::types::{MediaKind, MediaRef},
    };
    use tokio::sync::mpsc;

    fn member(id: i32, group: &str) -> IncomingMessage {
        IncomingMessage::media(
            MessageId(id),
            MediaRef::new(MediaKind::Photo, format!("f{id}")),
            "",
        )
        .in_group(group)
    }

    fn buffer(
        timeout: Duration,
    ) -> (
        Arc<AlbumBuffer>,
        mpsc::UnboundedReceiver<(ChatId, Vec<MessageId>)>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let flush: FlushFn = Arc::new(move |chat, msgs| {
            let ids = msgs.iter().map(|m| m.id).collect();
            let _ = tx.send((chat, ids));
        });
        (AlbumBuffer::new(timeout, flush), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn flushes_members_sorted_after_quiet_period() {
        let (buf, mut rx) = buffer(Duration::from_millis(500));
        buf.add(ChatId(100), member(3, "g")).await;
        buf.add(ChatId(100), member(1, "g")).await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        buf.add(ChatId(100), member(2, "g")).await;

        // Timer was reset by the third member.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(rx.try_recv().is_err());

        let (chat, ids) = rx.recv().await.unwrap();
        assert_eq!(chat, ChatId(100));
        assert_eq!(ids, vec![MessageId(1), MessageId(2), MessageId(3)]);
        assert_eq!(buf.pending().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_groups_apart_per_chat() {
        let (buf, mut rx) = buffer(Duration::from_millis(100));
        buf.add(ChatId(1), member(1, "g")).await;
        buf.add(ChatId(2), member(2, "g")).await;
        assert_eq!(buf.pending().await, 2);

        let mut got = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
        got.sort_by_key(|(chat, _)| *chat);
        assert_eq!(
            got,
            vec![
                (ChatId(1), vec![MessageId(1)]),
                (ChatId(2), vec![MessageId(2)])
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ignores_ungrouped_messages() {
        let (buf, _rx) = buffer(Duration::from_millis(100));
        buf.add(
            ChatId(1),
            IncomingMessage::text(MessageId(1), "plain"),
        )
        .await;
        assert_eq!(buf.pending().await, 0);
    }
}
