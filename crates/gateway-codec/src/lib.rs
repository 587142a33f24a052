//! Newline-delimited frame codec shared by the TCP and stdio-facing sides
//! of the gateway.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] the same way the stdio and TCP
//! transports in the wider MCP stack do, but exposes a size-bounded,
//! restartable decoder dedicated to this gateway's framing needs: one JSON
//! value per line, capped at a configurable byte budget.

use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Errors produced while decoding or encoding frames.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame exceeds the maximum configured size of {max} bytes")]
    TooLarge { max: usize },

    #[error("frame is not valid UTF-8")]
    InvalidUtf8,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A decoder/encoder for newline-delimited frames with a hard size cap.
///
/// Unlike [`tokio_util::codec::LinesCodec`], exceeding the cap does not
/// poison the stream: the offending bytes up to the next newline are
/// discarded and decoding resumes cleanly on the following frame, matching
/// the "restartable after partial reads" requirement for this gateway.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_bytes: usize,
    // Set once a frame has been rejected for size and we are discarding
    // bytes up to the next newline.
    discarding: bool,
}

impl FrameCodec {
    #[must_use]
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            max_frame_bytes,
            discarding: false,
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Vec<u8>;
    type Error = FrameError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let newline_pos = buf.iter().position(|&b| b == b'\n');

            if self.discarding {
                match newline_pos {
                    Some(pos) => {
                        buf.advance(pos + 1);
                        self.discarding = false;
                        continue;
                    }
                    None => {
                        buf.clear();
                        return Ok(None);
                    }
                }
            }

            let Some(pos) = newline_pos else {
                if buf.len() > self.max_frame_bytes {
                    self.discarding = true;
                    let max = self.max_frame_bytes;
                    buf.clear();
                    return Err(FrameError::TooLarge { max });
                }
                return Ok(None);
            };

            if pos > self.max_frame_bytes {
                self.discarding = true;
                buf.advance(pos + 1);
                return Err(FrameError::TooLarge {
                    max: self.max_frame_bytes,
                });
            }

            let mut line = buf.split_to(pos + 1);
            line.truncate(pos); // drop the newline
            let trimmed = if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
                line
            } else {
                line
            };
            return Ok(Some(trimmed.to_vec()));
        }
    }
}

impl Encoder<Vec<u8>> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Vec<u8>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if std::str::from_utf8(&item).is_err() {
            return Err(FrameError::InvalidUtf8);
        }
        dst.reserve(item.len() + 1);
        dst.extend_from_slice(&item);
        dst.extend_from_slice(b"\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_single_frame() {
        let mut codec = FrameCodec::new(1024);
        let mut buf = BytesMut::from(&b"hello\n"[..]);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame, b"hello");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn decodes_multiple_frames_in_one_buffer() {
        let mut codec = FrameCodec::new(1024);
        let mut buf = BytesMut::from(&b"a\nb\nc\n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), b"a");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), b"b");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), b"c");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn strips_trailing_carriage_return() {
        let mut codec = FrameCodec::new(1024);
        let mut buf = BytesMut::from(&b"hello\r\n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), b"hello");
    }

    #[test]
    fn partial_frame_returns_none_until_newline_arrives() {
        let mut codec = FrameCodec::new(1024);
        let mut buf = BytesMut::from(&b"partia"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"l\n");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), b"partial");
    }

    #[test]
    fn oversize_frame_is_rejected_and_stream_recovers() {
        let mut codec = FrameCodec::new(4);
        let mut buf = BytesMut::from(&b"toolong\nshort\n"[..]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, FrameError::TooLarge { max: 4 }));
        // decoding resumes cleanly on the next frame
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), b"short");
    }

    #[test]
    fn oversize_frame_without_trailing_newline_yet_discards_until_one_arrives() {
        let mut codec = FrameCodec::new(4);
        let mut buf = BytesMut::from(&b"way too long"[..]);
        // No newline seen yet, but the buffered bytes already exceed the
        // cap: reject now and start discarding until the next newline.
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, FrameError::TooLarge { max: 4 }));
        buf.extend_from_slice(b" trailer\nok\n");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), b"ok");
    }

    #[test]
    fn encode_appends_newline() {
        let mut codec = FrameCodec::new(1024);
        let mut buf = BytesMut::new();
        codec.encode(b"hi".to_vec(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"hi\n");
    }

    #[test]
    fn encode_rejects_invalid_utf8() {
        let mut codec = FrameCodec::new(1024);
        let mut buf = BytesMut::new();
        let err = codec.encode(vec![0xFF, 0xFE], &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::InvalidUtf8));
    }
}
