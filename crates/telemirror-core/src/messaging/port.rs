use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageId, MessageRef},
    messaging::types::{IncomingMessage, MediaRef, NewPoll},
    Result,
};

/// Outbound relay port.
///
/// Telegram is the first implementation. Sends return `Ok(None)` when the
/// platform accepted the call but yielded no message to map.
#[async_trait]
pub trait RelayPort: Send + Sync {
    /// Relay a (filtered) non-poll message.
    async fn send_message(
        &self,
        chat_id: ChatId,
        message: &IncomingMessage,
    ) -> Result<Option<MessageRef>>;

    /// Create a new poll in `chat_id`; never forwards the source poll handle.
    async fn send_poll(&self, chat_id: ChatId, poll: &NewPoll) -> Result<Option<MessageRef>>;

    /// Relay a whole album as one grouped send. `captions` and `files` are
    /// aligned by position.
    async fn send_album(
        &self,
        chat_id: ChatId,
        captions: &[String],
        files: &[MediaRef],
    ) -> Result<Option<Vec<MessageRef>>>;

    async fn edit_message(&self, msg: MessageRef, text: &str) -> Result<()>;

    async fn delete_messages(&self, chat_id: ChatId, ids: &[MessageId]) -> Result<()>;
}
