//! Addressed message decoding and encoding

use crate::types::{Callsign, MessageKind, Payload};
use crate::{FeedError, Result};

/// Width of the space-padded addressee field.
pub const ADDRESSEE_WIDTH: usize = 9;

/// Longest message text the APRS message format allows.
pub const MAX_MESSAGE_TEXT: usize = 67;

/// Longest message number.
pub const MAX_MSG_ID_LEN: usize = 5;

/// Decode the part of a message payload after the `:` data type identifier.
pub(crate) fn decode(body: &str) -> Result<Payload> {
    let addressee = body
        .get(..ADDRESSEE_WIDTH)
        .ok_or_else(|| FeedError::parse_error("message", "addressee field too short"))?;
    if body.get(ADDRESSEE_WIDTH..=ADDRESSEE_WIDTH) != Some(":") {
        return Err(FeedError::parse_error("message", "missing ':' after addressee"));
    }
    let addressee = Callsign::parse(addressee)
        .map_err(|_| FeedError::parse_error("message", format!("invalid addressee '{addressee}'")))?;
    let text = &body[ADDRESSEE_WIDTH + 1..];

    for (prefix, kind) in [("ack", MessageKind::Ack), ("rej", MessageKind::Reject)] {
        if let Some(id) = text.strip_prefix(prefix).and_then(message_id) {
            return Ok(Payload::Message {
                addressee,
                kind,
                text: String::new(),
                msg_id: Some(id.to_string()),
            });
        }
    }

    let (text, msg_id) = match text.rsplit_once('{') {
        Some((text, id)) => match message_id(id) {
            Some(id) => (text, Some(id.to_string())),
            None => (text, None),
        },
        None => (text, None),
    };

    Ok(Payload::Message { addressee, kind: MessageKind::Text, text: text.to_string(), msg_id })
}

/// Extract a message number, dropping a reply-ack suffix (`MM}AA`).
fn message_id(raw: &str) -> Option<&str> {
    let id = raw.split('}').next().unwrap_or(raw).trim_end();
    let valid = !id.is_empty()
        && id.len() <= MAX_MSG_ID_LEN
        && id.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then_some(id)
}

/// Information field for an outbound text message.
pub fn encode_text(addressee: &Callsign, text: &str, msg_id: &str) -> Result<String> {
    validate_text(text)?;
    Ok(format!(":{:<width$}:{}{{{}", addressee.as_str(), text, msg_id, width = ADDRESSEE_WIDTH))
}

/// Information field acknowledging a received message number.
pub fn encode_ack(addressee: &Callsign, msg_id: &str) -> String {
    format!(":{:<width$}:ack{}", addressee.as_str(), msg_id, width = ADDRESSEE_WIDTH)
}

/// Check message text fits the APRS message format.
pub fn validate_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(FeedError::invalid_message("message text is empty"));
    }
    if text.chars().count() > MAX_MESSAGE_TEXT {
        return Err(FeedError::invalid_message(format!(
            "message text is {} characters, limit is {}",
            text.chars().count(),
            MAX_MESSAGE_TEXT
        )));
    }
    if let Some(bad) = text.chars().find(|c| matches!(c, '|' | '~' | '{') || c.is_control()) {
        return Err(FeedError::invalid_message(format!("character {bad:?} is not allowed")));
    }
    Ok(())
}
