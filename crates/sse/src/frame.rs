use bytes::{BufMut, Bytes, BytesMut};

/// One unit of output.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Frame {
    /// `retry: <ms>\n`, the client reconnection delay.
    Retry(u64),

    /// `event: <name>\n`, naming the event whose data follows.
    Event(String),

    /// One or more `data: <line>\n` lines closed by a blank line.
    Data(Bytes),
}

impl Frame {
    /// Renders the frame to its wire representation.
    ///
    /// Line breaks in event names become spaces. Data containing line breaks
    /// (`\n`, `\r\n` or `\r`) is written as one `data:` line per line, so a
    /// payload can never end its event early.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        match self {
            Self::Retry(interval_ms) => Bytes::from(format!("retry: {interval_ms}\n")),
            Self::Event(name) => {
                let name = name.replace("\r\n", " ").replace(['\r', '\n'], " ");
                Bytes::from(format!("event: {name}\n"))
            }
            Self::Data(payload) => encode_data(payload),
        }
    }
}

fn encode_data(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(payload.len() + 8);
    let mut rest = payload;

    loop {
        buf.put_slice(b"data: ");
        match rest.iter().position(|b| *b == b'\n' || *b == b'\r') {
            Some(end) => {
                buf.put_slice(&rest[..end]);
                buf.put_u8(b'\n');
                let skip = if rest[end] == b'\r' && rest.get(end + 1) == Some(&b'\n') {
                    2
                } else {
                    1
                };
                rest = &rest[end + skip..];
            }
            None => {
                buf.put_slice(rest);
                buf.put_u8(b'\n');
                break;
            }
        }
    }

    buf.put_u8(b'\n');
    buf.freeze()
}

/// Renders the frames for one message: an optional event name, then the data.
///
/// Returned frames must be written together and in order.
#[must_use]
pub fn message_frames(channel: &str, payload: Bytes, channels_as_events: bool) -> Vec<Bytes> {
    let mut frames = Vec::with_capacity(2);
    if channels_as_events {
        frames.push(Frame::Event(channel.to_string()).encode());
    }
    frames.push(Frame::Data(payload).encode());
    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry() {
        assert_eq!(Frame::Retry(5000).encode(), "retry: 5000\n");
    }

    #[test]
    fn test_event() {
        assert_eq!(
            Frame::Event("named-channel".into()).encode(),
            "event: named-channel\n"
        );
        assert_eq!(
            Frame::Event("two\r\nlines\nhere".into()).encode(),
            "event: two lines here\n"
        );
    }

    #[test]
    fn test_data() {
        assert_eq!(
            Frame::Data(Bytes::from("test-message")).encode(),
            "data: test-message\n\n"
        );
        assert_eq!(Frame::Data(Bytes::new()).encode(), "data: \n\n");
    }

    #[test]
    fn test_multiline_data() {
        assert_eq!(
            Frame::Data(Bytes::from("one\ntwo\r\nthree\rfour")).encode(),
            "data: one\ndata: two\ndata: three\ndata: four\n\n"
        );
        assert_eq!(
            Frame::Data(Bytes::from("trailing\n")).encode(),
            "data: trailing\ndata: \n\n"
        );
    }

    #[test]
    fn test_binary_data_passes_through() {
        let payload = Bytes::from_static(&[0xff, 0x00, 0xfe]);

        assert_eq!(
            Frame::Data(payload).encode(),
            Bytes::from_static(b"data: \xff\x00\xfe\n\n")
        );
    }

    #[test]
    fn test_message_frames() {
        assert_eq!(
            message_frames("test", Bytes::from("m1"), false),
            vec![Bytes::from("data: m1\n\n")]
        );
        assert_eq!(
            message_frames("named-channel", Bytes::from("test-message"), true),
            vec![
                Bytes::from("event: named-channel\n"),
                Bytes::from("data: test-message\n\n"),
            ]
        );
    }
}
