//! Telegram update endpoints.
//!
//! Each endpoint drops updates from chats that are not mirror sources,
//! converts the message and hands it to the core dispatcher on its own task.
//! Album members are buffered first and dispatched as one album.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};
use tracing::debug;

use telemirror_core::messaging::types::MirrorEvent;

use crate::{convert, router::AppState};

pub mod album;

pub async fn handle_new(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let chat_id = convert::chat_id(&msg);
    if !state.dispatcher.router().is_source(chat_id) {
        return Ok(());
    }

    let Some(message) = convert::incoming_message(&msg) else {
        debug!(source_chat = chat_id.0, message_id = msg.id.0, "unsupported message kind");
        return Ok(());
    };

    if message.is_album_member() {
        state.albums.add(chat_id, message).await;
        return Ok(());
    }

    state
        .dispatcher
        .spawn(MirrorEvent::NewMessage { chat_id, message });
    Ok(())
}

pub async fn handle_edited(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let chat_id = convert::chat_id(&msg);
    if !state.dispatcher.router().is_source(chat_id) {
        return Ok(());
    }

    let Some(message) = convert::incoming_message(&msg) else {
        return Ok(());
    };

    state
        .dispatcher
        .spawn(MirrorEvent::MessageEdited { chat_id, message });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::mpsc;

    use telemirror_core::{
        config::parse_chat_mapping,
        dispatcher::MirrorDispatcher,
        domain::{ChatId, MessageId, MessageRef},
        filter::EmptyMessageFilter,
        messaging::{
            port::RelayPort,
            types::{IncomingMessage, MediaRef, NewPoll},
        },
        router::MirrorRouter,
        store::MemoryStore,
        Result,
    };

    struct ChannelRelay {
        tx: mpsc::UnboundedSender<(i64, String)>,
    }

    #[async_trait]
    impl RelayPort for ChannelRelay {
        async fn send_message(
            &self,
            chat_id: ChatId,
            message: &IncomingMessage,
        ) -> Result<Option<MessageRef>> {
            let _ = self.tx.send((chat_id.0, message.text.clone()));
            Ok(Some(MessageRef::new(chat_id, MessageId(1))))
        }

        async fn send_poll(&self, chat_id: ChatId, poll: &NewPoll) -> Result<Option<MessageRef>> {
            let _ = self.tx.send((chat_id.0, poll.question.clone()));
            Ok(Some(MessageRef::new(chat_id, MessageId(1))))
        }

        async fn send_album(
            &self,
            chat_id: ChatId,
            _captions: &[String],
            files: &[MediaRef],
        ) -> Result<Option<Vec<MessageRef>>> {
            let _ = self.tx.send((chat_id.0, format!("album:{}", files.len())));
            Ok(None)
        }

        async fn edit_message(&self, msg: MessageRef, text: &str) -> Result<()> {
            let _ = self.tx.send((msg.chat_id.0, format!("edit:{text}")));
            Ok(())
        }

        async fn delete_messages(&self, _chat_id: ChatId, _ids: &[MessageId]) -> Result<()> {
            Ok(())
        }
    }

    fn state() -> (Arc<AppState>, mpsc::UnboundedReceiver<(i64, String)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let router = Arc::new(MirrorRouter::new(parse_chat_mapping("-1001:200").unwrap()));
        let dispatcher = Arc::new(MirrorDispatcher::new(
            router,
            Arc::new(EmptyMessageFilter),
            Arc::new(ChannelRelay { tx }),
            Arc::new(MemoryStore::new()),
        ));
        (
            Arc::new(AppState::new(dispatcher, Duration::from_millis(50))),
            rx,
        )
    }

    fn post(chat: i64, id: i32, extra: serde_json::Value) -> Message {
        let mut v = json!({
            "message_id": id,
            "date": 1700000000,
            "chat": { "id": chat, "type": "channel", "title": "chan" }
        });
        if let (Some(base), Some(extra)) = (v.as_object_mut(), extra.as_object()) {
            for (k, val) in extra {
                base.insert(k.clone(), val.clone());
            }
        }
        serde_json::from_value(v).unwrap()
    }

    fn photo(id: i32) -> serde_json::Value {
        json!({
            "media_group_id": "g-7",
            "photo": [
                { "file_id": format!("p{id}"), "file_unique_id": format!("u{id}"), "width": 90, "height": 90, "file_size": 10 }
            ]
        })
    }

    #[tokio::test]
    async fn relays_source_post_to_targets() {
        let (state, mut rx) = state();
        handle_new(post(-1001, 5, json!({ "text": "hello" })), state)
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some((200, "hello".to_string())));
    }

    #[tokio::test]
    async fn ignores_chats_that_are_not_sources() {
        let (state, mut rx) = state();
        handle_new(post(-42, 5, json!({ "text": "hello" })), state.clone())
            .await
            .unwrap();
        handle_edited(post(-42, 5, json!({ "text": "edited" })), state.clone())
            .await
            .unwrap();
        let got = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(got.is_err());
        assert_eq!(state.albums.pending().await, 0);
    }

    #[tokio::test]
    async fn buffers_album_members_into_one_album() {
        let (state, mut rx) = state();
        handle_new(post(-1001, 10, photo(10)), state.clone())
            .await
            .unwrap();
        handle_new(post(-1001, 11, photo(11)), state.clone())
            .await
            .unwrap();
        assert_eq!(state.albums.pending().await, 1);

        assert_eq!(rx.recv().await, Some((200, "album:2".to_string())));
        assert_eq!(state.albums.pending().await, 0);
    }
}
