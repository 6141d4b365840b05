//! Telegram adapter (teloxide).
//!
//! This crate implements the `telemirror-core` RelayPort over the Telegram Bot
//! API and turns incoming updates into core mirror events.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{
        InputFile, InputMedia, InputMediaAudio, InputMediaDocument, InputMediaPhoto,
        InputMediaVideo, PollType,
    },
};

use tokio::time::sleep;

pub mod convert;
pub mod handlers;
pub mod router;

use telemirror_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::{
        port::RelayPort,
        types::{IncomingMessage, MediaKind, MediaRef, MessageContent, NewPoll, PollKind},
    },
    Result,
};

#[derive(Clone)]
pub struct TelegramRelay {
    bot: Bot,
}

impl TelegramRelay {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn from_token(token: impl Into<String>) -> Self {
        Self::new(Bot::new(token))
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn msg_ref(chat_id: ChatId, msg: &Message) -> MessageRef {
        MessageRef::new(chat_id, MessageId(msg.id.0))
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        self.with_retry_raw(&mut op).await.map_err(Self::map_err)
    }

    async fn with_retry_raw<T, Fut>(
        &self,
        op: &mut impl FnMut() -> Fut,
    ) -> std::result::Result<T, teloxide::RequestError>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(teloxide::RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    sleep(d).await;
                }
                Err(other) => return Err(other),
            }
        }
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<Message> {
        if text.trim().is_empty() {
            return Err(Error::Unsupported("empty text message".to_string()));
        }
        self.with_retry(|| self.bot.send_message(Self::tg_chat(chat_id), text.to_string()))
            .await
    }

    async fn send_media(&self, chat_id: ChatId, media: &MediaRef, caption: &str) -> Result<Message> {
        let chat = Self::tg_chat(chat_id);
        let file = || InputFile::file_id(media.file_id.clone());
        let caption = (!caption.is_empty()).then(|| caption.to_string());

        match media.kind {
            MediaKind::Photo => {
                self.with_retry(|| {
                    let req = self.bot.send_photo(chat, file());
                    match caption.clone() {
                        Some(c) => req.caption(c),
                        None => req,
                    }
                })
                .await
            }
            MediaKind::Video => {
                self.with_retry(|| {
                    let req = self.bot.send_video(chat, file());
                    match caption.clone() {
                        Some(c) => req.caption(c),
                        None => req,
                    }
                })
                .await
            }
            MediaKind::Document => {
                self.with_retry(|| {
                    let req = self.bot.send_document(chat, file());
                    match caption.clone() {
                        Some(c) => req.caption(c),
                        None => req,
                    }
                })
                .await
            }
            MediaKind::Audio => {
                self.with_retry(|| {
                    let req = self.bot.send_audio(chat, file());
                    match caption.clone() {
                        Some(c) => req.caption(c),
                        None => req,
                    }
                })
                .await
            }
            MediaKind::Animation => {
                self.with_retry(|| {
                    let req = self.bot.send_animation(chat, file());
                    match caption.clone() {
                        Some(c) => req.caption(c),
                        None => req,
                    }
                })
                .await
            }
            MediaKind::Voice => {
                self.with_retry(|| {
                    let req = self.bot.send_voice(chat, file());
                    match caption.clone() {
                        Some(c) => req.caption(c),
                        None => req,
                    }
                })
                .await
            }
            // Stickers carry no caption.
            MediaKind::Sticker => {
                self.with_retry(|| self.bot.send_sticker(chat, file()))
                    .await
            }
        }
    }
}

/// Build one album item. Only kinds the Bot API accepts in a media group.
fn input_media(media: &MediaRef, caption: Option<String>) -> Result<InputMedia> {
    let file = InputFile::file_id(media.file_id.clone());
    let item = match media.kind {
        MediaKind::Photo => {
            let m = InputMediaPhoto::new(file);
            InputMedia::Photo(match caption {
                Some(c) => m.caption(c),
                None => m,
            })
        }
        MediaKind::Video => {
            let m = InputMediaVideo::new(file);
            InputMedia::Video(match caption {
                Some(c) => m.caption(c),
                None => m,
            })
        }
        MediaKind::Document => {
            let m = InputMediaDocument::new(file);
            InputMedia::Document(match caption {
                Some(c) => m.caption(c),
                None => m,
            })
        }
        MediaKind::Audio => {
            let m = InputMediaAudio::new(file);
            InputMedia::Audio(match caption {
                Some(c) => m.caption(c),
                None => m,
            })
        }
        other => {
            return Err(Error::Unsupported(format!(
                "{other:?} cannot be sent in an album"
            )))
        }
    };
    Ok(item)
}

#[async_trait]
impl RelayPort for TelegramRelay {
    async fn send_message(
        &self,
        chat_id: ChatId,
        message: &IncomingMessage,
    ) -> Result<Option<MessageRef>> {
        let sent = match &message.content {
            MessageContent::Text => self.send_text(chat_id, &message.text).await?,
            MessageContent::Media(media) => self.send_media(chat_id, media, &message.text).await?,
            MessageContent::Poll(_) => {
                return Err(Error::Unsupported(
                    "polls are relayed with send_poll".to_string(),
                ))
            }
        };
        Ok(Some(Self::msg_ref(chat_id, &sent)))
    }

    async fn send_poll(&self, chat_id: ChatId, poll: &NewPoll) -> Result<Option<MessageRef>> {
        let sent = self
            .with_retry(|| {
                let req = self
                    .bot
                    .send_poll(
                        Self::tg_chat(chat_id),
                        poll.question.clone(),
                        poll.options.clone(),
                    )
                    .is_anonymous(poll.is_anonymous)
                    .allows_multiple_answers(poll.allows_multiple_answers);
                match poll.kind {
                    PollKind::Regular => req.type_(PollType::Regular),
                    PollKind::Quiz { correct_option } => {
                        req.type_(PollType::Quiz).correct_option_id(correct_option)
                    }
                }
            })
            .await?;
        Ok(Some(Self::msg_ref(chat_id, &sent)))
    }

    async fn send_album(
        &self,
        chat_id: ChatId,
        captions: &[String],
        files: &[MediaRef],
    ) -> Result<Option<Vec<MessageRef>>> {
        let media = files
            .iter()
            .enumerate()
            .map(|(i, file)| {
                let caption = captions.get(i).filter(|c| !c.is_empty()).cloned();
                input_media(file, caption)
            })
            .collect::<Result<Vec<_>>>()?;

        let sent = self
            .with_retry(|| {
                self.bot
                    .send_media_group(Self::tg_chat(chat_id), media.clone())
            })
            .await?;

        Ok(Some(
            sent.iter().map(|m| Self::msg_ref(chat_id, m)).collect(),
        ))
    }

    async fn edit_message(&self, msg: MessageRef, text: &str) -> Result<()> {
        let chat = Self::tg_chat(msg.chat_id);
        let id = Self::tg_msg_id(msg.message_id);

        let text_edit = self
            .with_retry_raw(&mut || self.bot.edit_message_text(chat, id, text.to_string()))
            .await;
        match text_edit {
            Ok(_) => Ok(()),
            // Media mirrors have a caption instead of text.
            Err(teloxide::RequestError::Api(_)) => {
                self.with_retry(|| {
                    self.bot
                        .edit_message_caption(chat, id)
                        .caption(text.to_string())
                })
                .await?;
                Ok(())
            }
            Err(e) => Err(Self::map_err(e)),
        }
    }

    async fn delete_messages(&self, chat_id: ChatId, ids: &[MessageId]) -> Result<()> {
        let mut first_err = None;
        for &id in ids {
            let res = self
                .with_retry(|| {
                    self.bot
                        .delete_message(Self::tg_chat(chat_id), Self::tg_msg_id(id))
                })
                .await;
            if let Err(e) = res {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
