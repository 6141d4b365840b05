use crate::domain::{ChatId, MessageId};

/// Cross-messenger incoming event model.
///
/// Telegram-specific fields live in the Telegram adapter; the dispatcher only
/// ever matches on these four variants.
#[derive(Clone, Debug)]
pub enum MirrorEvent {
    NewMessage {
        chat_id: ChatId,
        message: IncomingMessage,
    },
    Album {
        chat_id: ChatId,
        messages: Vec<IncomingMessage>,
    },
    MessageEdited {
        chat_id: ChatId,
        message: IncomingMessage,
    },
    MessageDeleted {
        chat_id: ChatId,
        deleted_ids: Vec<MessageId>,
    },
}

impl MirrorEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            MirrorEvent::NewMessage { .. } => EventKind::NewMessage,
            MirrorEvent::Album { .. } => EventKind::Album,
            MirrorEvent::MessageEdited { .. } => EventKind::MessageEdited,
            MirrorEvent::MessageDeleted { .. } => EventKind::MessageDeleted,
        }
    }

    pub fn chat_id(&self) -> ChatId {
        match self {
            MirrorEvent::NewMessage { chat_id, .. }
            | MirrorEvent::Album { chat_id, .. }
            | MirrorEvent::MessageEdited { chat_id, .. }
            | MirrorEvent::MessageDeleted { chat_id, .. } => *chat_id,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    NewMessage,
    Album,
    MessageEdited,
    MessageDeleted,
}

/// Which event subscriptions an event source should install.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Subscriptions {
    pub edit: bool,
    pub delete: bool,
}

impl Subscriptions {
    pub fn new(disable_edit: bool, disable_delete: bool) -> Self {
        Self {
            edit: !disable_edit,
            delete: !disable_delete,
        }
    }

    /// New messages and albums are always subscribed.
    pub fn enabled(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::NewMessage | EventKind::Album => true,
            EventKind::MessageEdited => self.edit,
            EventKind::MessageDeleted => self.delete,
        }
    }
}

impl Default for Subscriptions {
    fn default() -> Self {
        Self::new(false, false)
    }
}

/// A message as seen in a source chat.
#[derive(Clone, Debug, PartialEq)]
pub struct IncomingMessage {
    pub id: MessageId,
    /// Message text, or the caption for media messages.
    pub text: String,
    pub content: MessageContent,
    /// Album grouping id; set for every member of a grouped send.
    pub grouped_id: Option<String>,
    /// Edits the platform marks as hidden (reaction updates and similar).
    pub edit_hidden: bool,
}

impl IncomingMessage {
    pub fn text(id: MessageId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            content: MessageContent::Text,
            grouped_id: None,
            edit_hidden: false,
        }
    }

    pub fn media(id: MessageId, media: MediaRef, caption: impl Into<String>) -> Self {
        Self {
            id,
            text: caption.into(),
            content: MessageContent::Media(media),
            grouped_id: None,
            edit_hidden: false,
        }
    }

    pub fn poll(id: MessageId, poll: Poll) -> Self {
        Self {
            id,
            text: String::new(),
            content: MessageContent::Poll(poll),
            grouped_id: None,
            edit_hidden: false,
        }
    }

    pub fn in_group(mut self, grouped_id: impl Into<String>) -> Self {
        self.grouped_id = Some(grouped_id.into());
        self
    }

    pub fn is_album_member(&self) -> bool {
        self.grouped_id.is_some()
    }

    pub fn media_ref(&self) -> Option<&MediaRef> {
        match &self.content {
            MessageContent::Media(m) => Some(m),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum MessageContent {
    Text,
    Media(MediaRef),
    Poll(Poll),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Photo,
    Video,
    Document,
    Audio,
    Animation,
    Voice,
    Sticker,
}

/// Platform handle to an uploaded file; re-sendable without downloading.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MediaRef {
    pub kind: MediaKind,
    pub file_id: String,
}

impl MediaRef {
    pub fn new(kind: MediaKind, file_id: impl Into<String>) -> Self {
        Self {
            kind,
            file_id: file_id.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollKind {
    Regular,
    Quiz { correct_option: u8 },
}

/// A poll as observed in the source chat, including its live vote state.
#[derive(Clone, Debug, PartialEq)]
pub struct Poll {
    pub poll_id: String,
    pub question: String,
    pub options: Vec<PollOption>,
    pub total_voter_count: u32,
    pub is_closed: bool,
    pub is_anonymous: bool,
    pub allows_multiple_answers: bool,
    pub kind: PollKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollOption {
    pub text: String,
    pub voter_count: u32,
}

impl Poll {
    /// Build an unlinked poll with the same question and options but no votes.
    pub fn fresh(&self) -> NewPoll {
        NewPoll {
            question: self.question.clone(),
            options: self.options.iter().map(|o| o.text.clone()).collect(),
            is_anonymous: self.is_anonymous,
            allows_multiple_answers: self.allows_multiple_answers,
            kind: self.kind,
        }
    }
}

/// Poll to be created in a target chat. Carries no vote state or source handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewPoll {
    pub question: String,
    pub options: Vec<String>,
    pub is_anonymous: bool,
    pub allows_multiple_answers: bool,
    pub kind: PollKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_poll() -> Poll {
        Poll {
            poll_id: "p1".to_string(),
            question: "Lunch?".to_string(),
            options: vec![
                PollOption {
                    text: "Pizza".to_string(),
                    voter_count: 12,
                },
                PollOption {
                    text: "Sushi".to_string(),
                    voter_count: 3,
                },
            ],
            total_voter_count: 15,
            is_closed: false,
            is_anonymous: true,
            allows_multiple_answers: false,
            kind: PollKind::Regular,
        }
    }

    #[test]
    fn fresh_poll_keeps_question_and_option_order() {
        let fresh = sample_poll().fresh();
        assert_eq!(fresh.question, "Lunch?");
        assert_eq!(fresh.options, vec!["Pizza".to_string(), "Sushi".to_string()]);
        assert!(fresh.is_anonymous);
        assert_eq!(fresh.kind, PollKind::Regular);
    }

    #[test]
    fn subscriptions_honor_disable_flags() {
        let subs = Subscriptions::new(true, false);
        assert!(subs.enabled(EventKind::NewMessage));
        assert!(subs.enabled(EventKind::Album));
        assert!(!subs.enabled(EventKind::MessageEdited));
        assert!(subs.enabled(EventKind::MessageDeleted));

        let all = Subscriptions::default();
        assert!(all.enabled(EventKind::MessageEdited));
        assert!(all.enabled(EventKind::MessageDeleted));
    }

    #[test]
    fn event_kind_and_chat() {
        let ev = MirrorEvent::MessageDeleted {
            chat_id: ChatId(100),
            deleted_ids: vec![MessageId(5)],
        };
        assert_eq!(ev.kind(), EventKind::MessageDeleted);
        assert_eq!(ev.chat_id(), ChatId(100));
    }

    #[test]
    fn grouped_messages_are_album_members() {
        let m = IncomingMessage::media(MessageId(1), MediaRef::new(MediaKind::Photo, "f"), "")
            .in_group("g1");
        assert!(m.is_album_member());
        assert!(!IncomingMessage::text(MessageId(2), "hi").is_album_member());
    }
}
