//! Incremental `text/event-stream` parser.
//!
//! # Design
//! - Accept partial chunks and emit complete frames when a blank line arrives.
//! - Raw byte chunks may split a UTF-8 sequence; the incomplete tail is held
//!   until the next chunk completes it.
//! - Stay transport-free so both hosts and tests can drive it.
//! - Only `episode` frames (or unnamed frames carrying a descriptor) matter to
//!   the watcher; everything else is dropped by [`decode_episode`].

use submaker_events::StreamDescriptor;

/// Event name used by the stream-activity endpoint.
pub const EPISODE_EVENT: &str = "episode";

/// One dispatched event-stream frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// Event name.
    pub event: Option<String>,
    /// Event id.
    pub id: Option<String>,
    /// Reconnect hint in milliseconds.
    pub retry: Option<u64>,
    /// Data lines joined with `\n`.
    pub data: String,
}

impl SseFrame {
    fn is_empty(&self) -> bool {
        self.event.is_none() && self.id.is_none() && self.retry.is_none() && self.data.is_empty()
    }
}

/// Incremental parser for streamed chunks.
#[derive(Debug, Default)]
pub struct SseParser {
    carry: Vec<u8>,
    line: String,
    pending_cr: bool,
    builder: FrameBuilder,
}

impl SseParser {
    /// Feed a chunk and collect every frame it completes.
    pub fn push(&mut self, chunk: &str) -> Vec<SseFrame> {
        let mut frames = Vec::new();
        for ch in chunk.chars() {
            if self.pending_cr {
                self.pending_cr = false;
                if ch == '\n' {
                    continue;
                }
            }
            match ch {
                '\n' => self.finish_line(&mut frames),
                '\r' => {
                    self.pending_cr = true;
                    self.finish_line(&mut frames);
                }
                _ => self.line.push(ch),
            }
        }
        frames
    }

    /// Feed a raw network chunk.
    ///
    /// A multi-byte character cut at the chunk boundary is decoded once the
    /// following chunk arrives. Invalid sequences become U+FFFD.
    pub fn push_bytes(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.carry.extend_from_slice(chunk);
        let mut frames = Vec::new();
        loop {
            let (valid, invalid) = match std::str::from_utf8(&self.carry) {
                Ok(_) => (self.carry.len(), None),
                Err(err) => (err.valid_up_to(), err.error_len()),
            };
            let decoded: Vec<u8> = self.carry.drain(..valid).collect();
            frames.extend(self.push(&String::from_utf8_lossy(&decoded)));
            let Some(len) = invalid else {
                break;
            };
            self.carry.drain(..len);
            frames.extend(self.push("\u{FFFD}"));
        }
        frames
    }

    /// Flush a trailing frame when the stream ends without a blank line.
    pub fn finish(&mut self) -> Option<SseFrame> {
        if !self.carry.is_empty() {
            let tail = std::mem::take(&mut self.carry);
            self.push(&String::from_utf8_lossy(&tail));
        }
        if !self.line.is_empty() {
            self.finish_line(&mut Vec::new());
        }
        self.builder.take_frame()
    }

    fn finish_line(&mut self, frames: &mut Vec<SseFrame>) {
        let line = std::mem::take(&mut self.line);
        if line.is_empty() {
            if let Some(frame) = self.builder.take_frame() {
                frames.push(frame);
            }
            return;
        }
        if line.starts_with(':') {
            return;
        }
        let (field, value) = line
            .split_once(':')
            .map_or((line.as_str(), ""), |(field, value)| {
                (field, value.strip_prefix(' ').unwrap_or(value))
            });
        self.builder.apply_field(field, value);
    }
}

/// Extract the stream descriptor carried by an `episode` frame.
///
/// Unnamed frames are accepted when their data decodes as a descriptor with a
/// video id; frames named anything else (`ping`, `hello`) are ignored.
#[must_use]
pub fn decode_episode(frame: &SseFrame) -> Option<StreamDescriptor> {
    match frame.event.as_deref() {
        Some(EPISODE_EVENT) | None => {}
        Some(_) => return None,
    }
    let data = frame.data.trim();
    if data.is_empty() {
        return None;
    }
    serde_json::from_str::<StreamDescriptor>(data)
        .ok()
        .filter(StreamDescriptor::has_video_id)
}

#[derive(Debug, Default)]
struct FrameBuilder {
    event: Option<String>,
    id: Option<String>,
    retry: Option<u64>,
    data: String,
}

impl FrameBuilder {
    fn apply_field(&mut self, field: &str, value: &str) {
        match field {
            "event" => self.event = Some(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            "retry" => self.retry = value.parse::<u64>().ok(),
            "data" => {
                if !self.data.is_empty() {
                    self.data.push('\n');
                }
                self.data.push_str(value);
            }
            _ => {}
        }
    }

    fn take_frame(&mut self) -> Option<SseFrame> {
        let frame = SseFrame {
            event: self.event.take(),
            id: self.id.take(),
            retry: self.retry.take(),
            data: std::mem::take(&mut self.data),
        };
        if frame.is_empty() { None } else { Some(frame) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parser_emits_frames_on_blank_lines() {
        let mut parser = SseParser::default();
        let input = "event: episode\ndata: {\"videoId\":\"tt1\"}\n\nid: 42\ndata: world\n\n";
        let frames = parser.push(input);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event.as_deref(), Some("episode"));
        assert_eq!(frames[1].id.as_deref(), Some("42"));
        assert_eq!(frames[1].data, "world");
    }

    #[test]
    fn parser_handles_split_chunks_and_crlf() {
        let mut parser = SseParser::default();
        assert!(parser.push("event: epi").is_empty());
        assert!(parser.push("sode\r\ndata: a\r").is_empty());
        let frames = parser.push("\ndata: b\r\n\r\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "a\nb");
    }

    #[test]
    fn multibyte_character_split_across_chunks_survives() {
        let payload = "event: episode\ndata: {\"videoId\":\"tt1\",\"filename\":\"Amélie.mkv\"}\n\n";
        let bytes = payload.as_bytes();
        let split = payload.find('é').expect("accent") + 1;

        let mut parser = SseParser::default();
        assert!(parser.push_bytes(&bytes[..split]).is_empty());
        let frames = parser.push_bytes(&bytes[split..]);
        assert_eq!(frames.len(), 1);
        let descriptor = decode_episode(&frames[0]).expect("descriptor");
        assert_eq!(descriptor.filename, "Amélie.mkv");
    }

    #[test]
    fn four_byte_character_split_three_ways() {
        let bytes = "data: 🎬\n\n".as_bytes();
        let mut parser = SseParser::default();
        assert!(parser.push_bytes(&bytes[..7]).is_empty());
        assert!(parser.push_bytes(&bytes[7..9]).is_empty());
        let frames = parser.push_bytes(&bytes[9..]);
        assert_eq!(frames[0].data, "🎬");
    }

    #[test]
    fn invalid_bytes_are_replaced_not_held() {
        let mut parser = SseParser::default();
        let frames = parser.push_bytes(b"data: a\xFFb\n\n");
        assert_eq!(frames[0].data, "a\u{FFFD}b");

        assert!(parser.push_bytes(b"data: x\xC3").is_empty());
        let frame = parser.finish().expect("tail frame");
        assert_eq!(frame.data, "x\u{FFFD}");
    }

    #[test]
    fn comments_are_ignored_and_tail_is_flushed() {
        let mut parser = SseParser::default();
        assert!(parser.push(": keep-alive\n\n").is_empty());
        assert!(parser.push("retry: 2500\ndata: tail").is_empty());
        let frame = parser.finish().expect("tail frame");
        assert_eq!(frame.retry, Some(2_500));
        assert_eq!(frame.data, "tail");
    }

    #[test]
    fn only_episode_frames_decode() {
        let episode = SseFrame {
            event: Some("episode".into()),
            data: r#"{"videoId":"tt1","filename":"a.mkv"}"#.into(),
            ..SseFrame::default()
        };
        assert_eq!(
            decode_episode(&episode).map(|d| d.filename),
            Some("a.mkv".to_string())
        );

        let unnamed = SseFrame {
            data: r#"{"videoId":"tt2"}"#.into(),
            ..SseFrame::default()
        };
        assert!(decode_episode(&unnamed).is_some());

        let other = SseFrame {
            event: Some("ping".into()),
            data: r#"{"videoId":"tt3"}"#.into(),
            ..SseFrame::default()
        };
        assert!(decode_episode(&other).is_none());

        let no_video = SseFrame {
            event: Some("episode".into()),
            data: r#"{"filename":"x"}"#.into(),
            ..SseFrame::default()
        };
        assert!(decode_episode(&no_video).is_none());
    }
}
