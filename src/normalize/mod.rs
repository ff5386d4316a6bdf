//! Packet normalizer: raw TNC2 frames to typed [`Packet`]s.
//!
//! Parsing is best-effort. A frame that cannot be understood yields a
//! [`FeedError::Parse`]; the pipeline counts it and moves on. Payloads with a
//! recognised header but an unsupported data type become [`Payload::Other`]
//! rather than errors, so unusual traffic still reaches the feed.
//!
//! [`normalize`] is pure: the same frame (same text and arrival time) always
//! produces a field-for-field identical packet.

mod message;
mod position;

pub use message::{
    ADDRESSEE_WIDTH, MAX_MESSAGE_TEXT, MAX_MSG_ID_LEN, encode_ack, encode_text, validate_text,
};

use std::sync::Arc;

use crate::types::{Callsign, Packet, Payload, RawFrame};
use crate::{FeedError, Result};

/// Length of the timestamp preceding timestamped positions (`DDHHMMz`).
const TIMESTAMP_LEN: usize = 7;

/// Normalize one raw frame into a packet.
///
/// A [`FeedError::Parse`] carries the frame text in its `raw` field.
pub fn normalize(frame: &RawFrame) -> Result<Packet> {
    parse_frame(frame).map_err(|e| e.with_raw(Arc::clone(&frame.data)))
}

fn parse_frame(frame: &RawFrame) -> Result<Packet> {
    let text: &str = &frame.data;

    if frame.is_server_comment() {
        return Err(FeedError::parse_error("frame", "server comment line"));
    }

    let (header, information) = text
        .split_once(':')
        .ok_or_else(|| FeedError::parse_error("frame", "missing ':' between header and body"))?;

    let (source, route) = header
        .split_once('>')
        .ok_or_else(|| FeedError::parse_error("header", "missing '>' after source"))?;
    let source = Callsign::parse(source)
        .map_err(|_| FeedError::parse_error("header", format!("invalid source '{source}'")))?;

    let mut hops = route.split(',');
    let destination = hops.next().unwrap_or_default().trim();
    if destination.is_empty() {
        return Err(FeedError::parse_error("header", "empty destination"));
    }
    let path = hops.map(str::to_string).collect::<Vec<_>>();
    if path.iter().any(|hop| hop.is_empty()) {
        return Err(FeedError::parse_error("header", "empty path element"));
    }

    let payload = decode_payload(information)?;

    Ok(Packet {
        source,
        destination: destination.to_string(),
        path,
        payload,
        received_at: frame.arrival,
        raw: Arc::clone(&frame.data),
    })
}

/// Decode the information field according to its data type identifier.
fn decode_payload(information: &str) -> Result<Payload> {
    let mut chars = information.chars();
    let data_type =
        chars.next().ok_or_else(|| FeedError::parse_error("payload", "empty information field"))?;
    let body = chars.as_str();

    match data_type {
        '!' | '=' => decode_position(body, data_type == '='),
        '/' | '@' => {
            let body = body
                .get(TIMESTAMP_LEN..)
                .ok_or_else(|| FeedError::parse_error("position", "truncated timestamp"))?;
            decode_position(body, data_type == '@')
        }
        ':' => message::decode(body),
        '>' => Ok(Payload::Status { text: body.to_string() }),
        'T' if body.starts_with('#') => decode_telemetry(&body[1..]),
        other => Ok(Payload::Other { data_type: Some(other), text: information.to_string() }),
    }
}

fn decode_position(body: &str, messaging: bool) -> Result<Payload> {
    let (position, comment) = position::decode(body)?;
    Ok(Payload::Position { position, comment: comment.trim().to_string(), messaging })
}

/// `T#sss,aaa,aaa,aaa,aaa,aaa,bbbbbbbb`
fn decode_telemetry(body: &str) -> Result<Payload> {
    let mut fields = body.split(',');
    let sequence = fields.next().unwrap_or_default().trim().to_string();
    if sequence.is_empty() {
        return Err(FeedError::parse_error("telemetry", "missing sequence number"));
    }

    let mut values = Vec::with_capacity(5);
    let mut bits = None;
    for (index, field) in fields.enumerate() {
        let field = field.trim();
        if index < 5 {
            let value = field.parse::<f64>().ok().filter(|v| v.is_finite()).ok_or_else(|| {
                FeedError::parse_error("telemetry", format!("invalid analog value '{field}'"))
            })?;
            values.push(value);
        } else if index == 5 {
            let digits: String = field.chars().take(8).collect();
            if !digits.chars().all(|c| c == '0' || c == '1') {
                return Err(FeedError::parse_error(
                    "telemetry",
                    format!("invalid digital bits '{field}'"),
                ));
            }
            bits = Some(digits);
        }
    }

    Ok(Payload::Telemetry { sequence, values, bits })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MessageKind, PacketKind};
    use proptest::prelude::*;
    use std::time::{Duration, SystemTime};

    fn frame(text: &str) -> RawFrame {
        RawFrame::new(text, SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000), 1)
    }

    #[test]
    fn parses_header_and_path() {
        let packet = normalize(&frame("N0CALL-9>APDR16,WIDE1-1,qAR,K1ABC:>Status")).unwrap();
        assert_eq!(packet.source.as_str(), "N0CALL-9");
        assert_eq!(packet.destination, "APDR16");
        assert_eq!(packet.path, vec!["WIDE1-1", "qAR", "K1ABC"]);
        assert_eq!(packet.kind(), PacketKind::Status);
        assert_eq!(packet.payload.text(), "Status");
    }

    #[test]
    fn classifies_packet_types() {
        let cases = [
            ("A1A>APRS:!4903.50N/07201.75W-", PacketKind::Position),
            ("A1A>APRS:=4903.50N/07201.75W-", PacketKind::Position),
            ("A1A>APRS:@092345z4903.50N/07201.75W>", PacketKind::Position),
            ("A1A>APRS::N0CALL   :hello{1", PacketKind::Message),
            ("A1A>APRS:>status", PacketKind::Status),
            ("A1A>APRS:T#005,199,000,255,073,123,01101001", PacketKind::Telemetry),
            ("A1A>APRS:;OBJECT   *092345z4903.50N/07201.75W>", PacketKind::Other),
            ("A1A>APRS:`c9&l!n>/]\"4W}", PacketKind::Other),
        ];

        for (text, kind) in cases {
            let packet = normalize(&frame(text)).unwrap_or_else(|e| panic!("{text}: {e}"));
            assert_eq!(packet.kind(), kind, "{text}");
        }
    }

    #[test]
    fn timestamped_position_sets_messaging_flag() {
        let packet = normalize(&frame("A1A>APRS:@092345z4903.50N/07201.75W>mobile")).unwrap();
        match packet.payload {
            Payload::Position { messaging, ref comment, position } => {
                assert!(messaging);
                assert_eq!(comment, "mobile");
                assert_eq!(position.symbol_code, '>');
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn decodes_telemetry_fields() {
        let packet = normalize(&frame("A1A>APRS:T#005,199,000,255,073,123,01101001")).unwrap();
        assert_eq!(
            packet.payload,
            Payload::Telemetry {
                sequence: "005".into(),
                values: vec![199.0, 0.0, 255.0, 73.0, 123.0],
                bits: Some("01101001".into()),
            }
        );
    }

    #[test]
    fn decodes_ack_for_operator() {
        let packet = normalize(&frame("K1ABC>APRS,TCPIP*,qAC,T2TEST::N0CALL   :ack12")).unwrap();
        assert_eq!(packet.addressee(), "N0CALL");
        assert!(matches!(packet.payload, Payload::Message { kind: MessageKind::Ack, .. }));
    }

    #[test]
    fn malformed_frames_are_parse_errors() {
        let garbage = [
            "",
            "no separators here",
            "N0CALL:>missing destination",
            ">APRS:>missing source",
            "N0 CALL>APRS:>bad source",
            "N0CALL>:>empty destination",
            "N0CALL>APRS,,WIDE:>empty hop",
            "N0CALL>APRS:",
            "N0CALL>APRS:!4903.50N",
            "N0CALL>APRS:@0923",
            "N0CALL>APRS:T#005,abc",
            "# logresp N0CALL verified",
        ];

        for text in garbage {
            let err = normalize(&frame(text)).expect_err(text);
            match err {
                FeedError::Parse { raw: Some(raw), .. } => assert_eq!(&*raw, text),
                other => panic!("{text}: expected a parse error carrying the frame, got {other:?}"),
            }
        }
    }

    #[test]
    fn packet_keeps_raw_text_and_arrival() {
        let raw = frame("N0CALL>APRS:>hi");
        let packet = normalize(&raw).unwrap();
        assert!(Arc::ptr_eq(&packet.raw, &raw.data));
        assert_eq!(packet.received_at, raw.arrival);
    }

    proptest! {
        #[test]
        fn normalization_is_deterministic(
            source in "[A-Z0-9]{3,6}",
            path in prop::collection::vec("[A-Z0-9*-]{1,8}", 0..4),
            body in "[ -~]{0,40}",
            secs in 0u64..4_000_000_000u64,
        ) {
            let mut text = format!("{source}>APRS");
            for hop in &path {
                text.push(',');
                text.push_str(hop);
            }
            text.push(':');
            text.push_str(&body);

            let arrival = SystemTime::UNIX_EPOCH + Duration::from_secs(secs);
            let first = normalize(&RawFrame::new(text.as_str(), arrival, 1));
            let second = normalize(&RawFrame::new(text.as_str(), arrival, 7));

            match (first, second) {
                (Ok(a), Ok(b)) => prop_assert_eq!(a, b),
                (Err(a), Err(b)) => prop_assert_eq!(a.to_string(), b.to_string()),
                (a, b) => prop_assert!(false, "diverged: {:?} vs {:?}", a, b),
            }
        }

        #[test]
        fn arbitrary_input_never_panics(text in "\\PC{0,120}") {
            let _ = normalize(&frame(&text));
        }
    }
}
