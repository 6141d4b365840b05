//! Event dispatcher: turns source chat events into relay actions and keeps the
//! identity store in step with them.
//!
//! Every handler isolates failures at the smallest unit it works on (one
//! target, one mirror row, one deleted id). Nothing is ever returned to the
//! event source; the only visible effect of a failure is a missing or stale
//! mirror copy plus a log line.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::{
    domain::{ChatId, MessageId, MessageRef},
    filter::ContentFilter,
    messaging::{
        port::RelayPort,
        types::{IncomingMessage, MessageContent, MirrorEvent},
    },
    router::MirrorRouter,
    store::{IdentityStore, MirrorMessage},
    utils::log_preview,
    Result,
};

pub struct MirrorDispatcher {
    router: Arc<MirrorRouter>,
    filter: Arc<dyn ContentFilter>,
    relay: Arc<dyn RelayPort>,
    store: Arc<dyn IdentityStore>,
}

impl MirrorDispatcher {
    pub fn new(
        router: Arc<MirrorRouter>,
        filter: Arc<dyn ContentFilter>,
        relay: Arc<dyn RelayPort>,
        store: Arc<dyn IdentityStore>,
    ) -> Self {
        Self {
            router,
            filter,
            relay,
            store,
        }
    }

    pub fn router(&self) -> &MirrorRouter {
        &self.router
    }

    /// Handle one event to completion. Never fails.
    pub async fn dispatch(&self, event: MirrorEvent) {
        let kind = event.kind();
        let source_chat = event.chat_id();

        let res = match event {
            MirrorEvent::NewMessage { chat_id, message } => {
                self.on_new_message(chat_id, message).await
            }
            MirrorEvent::Album { chat_id, messages } => self.on_album(chat_id, messages).await,
            MirrorEvent::MessageEdited { chat_id, message } => {
                self.on_edit_message(chat_id, message).await
            }
            MirrorEvent::MessageDeleted {
                chat_id,
                deleted_ids,
            } => self.on_deleted_messages(chat_id, deleted_ids).await,
        };

        if let Err(e) = res {
            error!(?kind, source_chat = source_chat.0, error = %e, "event handler failed");
        }
    }

    /// Run `dispatch` on its own task so a panicking handler only loses its
    /// own event.
    pub fn spawn(self: &Arc<Self>, event: MirrorEvent) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        let kind = event.kind();
        let source_chat = event.chat_id().0;

        tokio::spawn(async move {
            let task = tokio::spawn(async move { this.dispatch(event).await });
            match task.await {
                Ok(()) => {}
                Err(e) if e.is_panic() => {
                    let panic = e.into_panic();
                    let msg = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "<non-string panic>".to_string());
                    error!(?kind, source_chat, panic = %msg, "event handler panicked; event dropped");
                }
                Err(e) => {
                    warn!(?kind, source_chat, error = %e, "event handler cancelled");
                }
            }
        })
    }

    async fn on_new_message(&self, chat_id: ChatId, message: IncomingMessage) -> Result<()> {
        // Album members arrive again as one Album event.
        if message.is_album_member() {
            debug!(
                source_chat = chat_id.0,
                message_id = message.id.0,
                "skipping album member"
            );
            return Ok(());
        }

        info!(
            source_chat = chat_id.0,
            message_id = message.id.0,
            text = %log_preview(&message.text),
            "new message"
        );

        let targets = self.router.targets(chat_id);
        if targets.is_empty() {
            warn!(source_chat = chat_id.0, "no target chats");
            return Ok(());
        }

        let original_id = message.id;
        let message = self.filter.process(message);

        for &target in targets {
            let sent = match &message.content {
                MessageContent::Poll(poll) => self.relay.send_poll(target, &poll.fresh()).await,
                MessageContent::Text | MessageContent::Media(_) => {
                    self.relay.send_message(target, &message).await
                }
            };

            match sent {
                Ok(Some(out)) => {
                    self.record(original_id, chat_id, MessageRef::new(target, out.message_id))
                        .await;
                }
                Ok(None) => {
                    warn!(
                        source_chat = chat_id.0,
                        target_chat = target.0,
                        message_id = original_id.0,
                        "relay returned no message; copy not mapped"
                    );
                }
                Err(e) => {
                    error!(
                        source_chat = chat_id.0,
                        target_chat = target.0,
                        message_id = original_id.0,
                        error = %e,
                        "failed to relay message"
                    );
                }
            }
        }

        Ok(())
    }

    async fn on_album(&self, chat_id: ChatId, messages: Vec<IncomingMessage>) -> Result<()> {
        info!(
            source_chat = chat_id.0,
            count = messages.len(),
            "new album"
        );

        let targets = self.router.targets(chat_id);
        if targets.is_empty() {
            warn!(source_chat = chat_id.0, "no target chats");
            return Ok(());
        }

        let mut files = Vec::with_capacity(messages.len());
        let mut captions = Vec::with_capacity(messages.len());
        let mut source_ids = Vec::with_capacity(messages.len());

        for message in messages {
            let original_id = message.id;
            let message = self.filter.process(message);
            match message.content {
                MessageContent::Media(media) => {
                    files.push(media);
                    captions.push(message.text);
                    source_ids.push(original_id);
                }
                MessageContent::Text | MessageContent::Poll(_) => {
                    debug!(
                        source_chat = chat_id.0,
                        message_id = original_id.0,
                        "album member has no media; skipped"
                    );
                }
            }
        }

        if files.is_empty() {
            warn!(source_chat = chat_id.0, "album has no relayable media");
            return Ok(());
        }

        for &target in targets {
            match self.relay.send_album(target, &captions, &files).await {
                // A grouped send that yields a single message is ambiguous; only
                // multi-message results are mapped.
                Ok(Some(outgoing)) if outgoing.len() > 1 => {
                    for (&original_id, out) in source_ids.iter().zip(outgoing.iter()) {
                        self.record(original_id, chat_id, MessageRef::new(target, out.message_id))
                            .await;
                    }
                }
                Ok(outgoing) => {
                    warn!(
                        source_chat = chat_id.0,
                        target_chat = target.0,
                        returned = outgoing.map(|o| o.len()).unwrap_or(0),
                        "album relay returned fewer than two messages; copies not mapped"
                    );
                }
                Err(e) => {
                    error!(
                        source_chat = chat_id.0,
                        target_chat = target.0,
                        error = %e,
                        "failed to relay album"
                    );
                }
            }
        }

        Ok(())
    }

    async fn on_edit_message(&self, chat_id: ChatId, message: IncomingMessage) -> Result<()> {
        if message.edit_hidden {
            // Reactions and similar; not a content change.
            return Ok(());
        }

        info!(
            source_chat = chat_id.0,
            message_id = message.id.0,
            "edit message"
        );

        let rows = self.store.get_messages(message.id, chat_id).await?;
        if rows.is_empty() {
            warn!(
                source_chat = chat_id.0,
                message_id = message.id.0,
                "no target messages"
            );
            return Ok(());
        }

        let message = self.filter.process(message);
        for row in rows {
            if let Err(e) = self.relay.edit_message(row.mirror_ref(), &message.text).await {
                error!(
                    source_chat = chat_id.0,
                    message_id = message.id.0,
                    target_chat = row.mirror_channel,
                    mirror_id = row.mirror_id,
                    error = %e,
                    "failed to edit mirror message"
                );
            }
        }

        Ok(())
    }

    async fn on_deleted_messages(&self, chat_id: ChatId, deleted_ids: Vec<MessageId>) -> Result<()> {
        info!(
            source_chat = chat_id.0,
            count = deleted_ids.len(),
            "delete messages"
        );

        for deleted_id in deleted_ids {
            let rows = match self.store.get_messages(deleted_id, chat_id).await {
                Ok(rows) => rows,
                Err(e) => {
                    error!(
                        source_chat = chat_id.0,
                        message_id = deleted_id.0,
                        error = %e,
                        "failed to look up mirror messages"
                    );
                    continue;
                }
            };

            if rows.is_empty() {
                warn!(
                    source_chat = chat_id.0,
                    message_id = deleted_id.0,
                    "no target messages"
                );
                continue;
            }

            // Drop the mapping first so a retried delete for this id finds nothing.
            if let Err(e) = self.store.delete_messages(deleted_id, chat_id).await {
                error!(
                    source_chat = chat_id.0,
                    message_id = deleted_id.0,
                    error = %e,
                    "failed to remove mirror mapping; mirror copies left in place"
                );
                continue;
            }

            for row in rows {
                let mirror = row.mirror_ref();
                if let Err(e) = self
                    .relay
                    .delete_messages(mirror.chat_id, &[mirror.message_id])
                    .await
                {
                    error!(
                        source_chat = chat_id.0,
                        message_id = deleted_id.0,
                        target_chat = row.mirror_channel,
                        mirror_id = row.mirror_id,
                        error = %e,
                        "failed to delete mirror message"
                    );
                }
            }
        }

        Ok(())
    }

    async fn record(&self, original_id: MessageId, original_chat: ChatId, mirror: MessageRef) {
        let row = MirrorMessage::new(original_id, original_chat, mirror);
        match self.store.insert(row).await {
            Ok(()) => debug!(
                source_chat = original_chat.0,
                message_id = original_id.0,
                target_chat = mirror.chat_id.0,
                mirror_id = mirror.message_id.0,
                "mirror mapped"
            ),
            Err(e) => error!(
                source_chat = original_chat.0,
                message_id = original_id.0,
                target_chat = mirror.chat_id.0,
                mirror_id = mirror.message_id.0,
                error = %e,
                "failed to store mirror mapping"
            ),
        }
    }
}
