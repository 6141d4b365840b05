//! teloxide `Message` -> core `IncomingMessage`.

use teloxide::types::{Message, PollType};

use telemirror_core::{
    domain::{ChatId, MessageId},
    messaging::types::{IncomingMessage, MediaKind, MediaRef, Poll, PollKind, PollOption},
};

pub fn chat_id(msg: &Message) -> ChatId {
    ChatId(msg.chat.id.0)
}

/// Convert a Bot API message into the core model.
///
/// Returns `None` for service messages and content the mirror cannot relay
/// (contacts, locations, dice, ...).
pub fn incoming_message(msg: &Message) -> Option<IncomingMessage> {
    let id = MessageId(msg.id.0);
    let grouped_id = msg.media_group_id().map(|s| s.to_string());

    let mut incoming = if let Some(poll) = msg.poll() {
        IncomingMessage::poll(id, convert_poll(poll))
    } else if let Some(media) = media_ref(msg) {
        IncomingMessage::media(id, media, msg.caption().unwrap_or_default())
    } else if let Some(text) = msg.text() {
        IncomingMessage::text(id, text)
    } else {
        return None;
    };

    incoming.grouped_id = grouped_id;
    Some(incoming)
}

fn media_ref(msg: &Message) -> Option<MediaRef> {
    if let Some(sizes) = msg.photo() {
        // Largest size last.
        let best = sizes.last()?;
        return Some(MediaRef::new(MediaKind::Photo, best.file.id.clone()));
    }
    // Animations also carry a document; check them first.
    if let Some(a) = msg.animation() {
        return Some(MediaRef::new(MediaKind::Animation, a.file.id.clone()));
    }
    if let Some(v) = msg.video() {
        return Some(MediaRef::new(MediaKind::Video, v.file.id.clone()));
    }
    if let Some(d) = msg.document() {
        return Some(MediaRef::new(MediaKind::Document, d.file.id.clone()));
    }
    if let Some(a) = msg.audio() {
        return Some(MediaRef::new(MediaKind::Audio, a.file.id.clone()));
    }
    if let Some(v) = msg.voice() {
        return Some(MediaRef::new(MediaKind::Voice, v.file.id.clone()));
    }
    if let Some(s) = msg.sticker() {
        return Some(MediaRef::new(MediaKind::Sticker, s.file.id.clone()));
    }
    None
}

fn convert_poll(poll: &teloxide::types::Poll) -> Poll {
    let kind = match (poll.poll_type.clone(), poll.correct_option_id) {
        (PollType::Quiz, Some(correct_option)) => PollKind::Quiz { correct_option },
        // Quiz answers are hidden from bots that did not send the poll;
        // without one the copy can only be a regular poll.
        _ => PollKind::Regular,
    };

    Poll {
        poll_id: poll.id.clone(),
        question: poll.question.clone(),
        options: poll
            .options
            .iter()
            .map(|o| PollOption {
                text: o.text.clone(),
                voter_count: u32::try_from(o.voter_count).unwrap_or(0),
            })
            .collect(),
        total_voter_count: u32::try_from(poll.total_voter_count).unwrap_or(0),
        is_closed: poll.is_closed,
        is_anonymous: poll.is_anonymous,
        allows_multiple_answers: poll.allows_multiple_answers,
        kind,
    }
}
