//! Event-stream framing for outbound deliveries.
//!
//! Each delivery is one event made of `data:` lines followed by a blank line:
//!
//! ```text
//! data: ansible://alice/#cap1
//! data: hi
//!
//! ```
//!
//! The client reassembles the event data as `<address>\n<content>`.

use axum::body::Bytes;

/// `Content-Type` of the streaming response.
pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

const DATA_FIELD: &str = "data: ";

/// Encode one delivery frame.
///
/// Line breaks (`\n`, `\r\n` or `\r`) inside either value start a new
/// `data:` line, so a value can never end the event early.
pub fn encode_event(address: &str, content: &str) -> Bytes {
    let mut frame = String::with_capacity(address.len() + content.len() + 2 * DATA_FIELD.len() + 3);
    push_data(&mut frame, address);
    push_data(&mut frame, content);
    frame.push('\n');
    Bytes::from(frame)
}

fn push_data(frame: &mut String, value: &str) {
    for line in value.split("\r\n").flat_map(|part| part.split(['\r', '\n'])) {
        frame.push_str(DATA_FIELD);
        frame.push_str(line);
        frame.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_event() {
        let frame = encode_event("ansible://alice/#cap1", "hi");
        assert_eq!(&frame[..], b"data: ansible://alice/#cap1\ndata: hi\n\n");
    }

    #[test]
    fn test_encode_empty_content() {
        let frame = encode_event("ansible://alice/#cap1", "");
        assert_eq!(&frame[..], b"data: ansible://alice/#cap1\ndata: \n\n");
    }

    #[test]
    fn test_multiline_content_stays_in_one_event() {
        let frame = encode_event("ansible://alice/#cap1", "one\ntwo\r\nthree\rfour");
        assert_eq!(
            &frame[..],
            b"data: ansible://alice/#cap1\ndata: one\ndata: two\ndata: three\ndata: four\n\n"
        );
        // Exactly one blank line, at the end
        let text = std::str::from_utf8(&frame).unwrap();
        assert_eq!(text.matches("\n\n").count(), 1);
        assert!(text.ends_with("\n\n"));
    }
}
