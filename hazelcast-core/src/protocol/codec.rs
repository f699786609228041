//! Stream codec for encoding/decoding Hazelcast protocol messages.

use std::collections::HashMap;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use super::constants::*;
use super::frame::Frame;
use super::registry::CodecRegistry;
use super::ClientMessage;
use crate::error::{HazelcastError, Result};

/// Codec for encoding and decoding Hazelcast client messages.
///
/// Implements the `tokio_util::codec::{Encoder, Decoder}` traits for use
/// with tokio's framed I/O. Frames are accumulated until one carries the
/// IS_FINAL flag; fragmented messages are reassembled per fragment id.
#[derive(Debug, Default)]
pub struct ClientMessageCodec {
    /// Frames accumulated since the last final frame.
    pending_frames: Vec<Frame>,
    /// Partially received fragmented messages keyed by fragment id.
    fragments: HashMap<i64, Vec<Frame>>,
    /// When set, decoded message types must be known to this registry.
    registry: Option<&'static CodecRegistry>,
}

impl ClientMessageCodec {
    /// Creates a new codec instance that accepts any message type.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a codec that rejects message types unknown to `registry`.
    pub fn with_registry(registry: &'static CodecRegistry) -> Self {
        Self {
            registry: Some(registry),
            ..Self::default()
        }
    }

    /// Returns true if bytes of an unfinished message have been consumed.
    pub fn has_partial(&self) -> bool {
        !self.pending_frames.is_empty() || !self.fragments.is_empty()
    }

    fn check(&self, message: &ClientMessage) -> Result<()> {
        message.validate()?;
        if let Some(registry) = self.registry {
            let message_type = message.message_type().unwrap_or_default();
            if registry.lookup(message_type).is_none() {
                return Err(HazelcastError::Protocol(format!(
                    "unknown message type {:#08x}",
                    message_type
                )));
            }
        }
        Ok(())
    }

    fn assemble(&mut self, frames: Vec<Frame>) -> Result<Option<ClientMessage>> {
        let head_flags = frames.first().map(|f| f.flags).unwrap_or_default();
        if head_flags & UNFRAGMENTED_MESSAGE == UNFRAGMENTED_MESSAGE {
            let message = ClientMessage::from_frames(frames);
            self.check(&message)?;
            return Ok(Some(message));
        }

        let mut frames = frames.into_iter();
        let head = frames
            .next()
            .ok_or_else(|| HazelcastError::Protocol("empty fragment".to_string()))?;
        let id_bytes = head
            .content
            .get(FRAGMENTATION_ID_OFFSET..FRAGMENTATION_ID_OFFSET + LONG_SIZE_IN_BYTES)
            .ok_or_else(|| {
                HazelcastError::Protocol("fragment frame too short for its id".to_string())
            })?;
        let mut raw = [0u8; LONG_SIZE_IN_BYTES];
        raw.copy_from_slice(id_bytes);
        let fragment_id = i64::from_le_bytes(raw);

        let body = frames.map(|mut frame| {
            frame.flags &= !IS_FINAL_FLAG;
            frame
        });

        if head.is_begin_fragment() {
            self.fragments.insert(fragment_id, body.collect());
            return Ok(None);
        }

        let accumulated = self.fragments.get_mut(&fragment_id).ok_or_else(|| {
            HazelcastError::Protocol(format!(
                "fragment {} continued without its first fragment",
                fragment_id
            ))
        })?;
        accumulated.extend(body);

        if !head.is_end_fragment() {
            return Ok(None);
        }

        let frames = self.fragments.remove(&fragment_id).unwrap_or_default();
        let message = ClientMessage::from_frames(frames);
        self.check(&message)?;
        Ok(Some(message))
    }
}

impl Encoder<ClientMessage> for ClientMessageCodec {
    type Error = HazelcastError;

    fn encode(&mut self, item: ClientMessage, dst: &mut BytesMut) -> Result<()> {
        if item.is_empty() {
            return Err(HazelcastError::Protocol(
                "cannot encode empty message".to_string(),
            ));
        }

        item.write_to(dst);
        Ok(())
    }
}

impl Decoder for ClientMessageCodec {
    type Item = ClientMessage;
    type Error = HazelcastError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            let Some(frame) = Frame::read_from(src)? else {
                return Ok(None);
            };

            let is_final = frame.is_final_frame();
            self.pending_frames.push(frame);
            if !is_final {
                continue;
            }

            let frames = std::mem::take(&mut self.pending_frames);
            if let Some(message) = self.assemble(frames)? {
                return Ok(Some(message));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(message) = self.decode(src)? {
            return Ok(Some(message));
        }
        if src.is_empty() && !self.has_partial() {
            return Ok(None);
        }
        Err(HazelcastError::Protocol(
            "stream ended before the final frame of a message".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec_registry;

    fn create_simple_message(message_type: i32) -> ClientMessage {
        ClientMessage::create_for_encode(message_type, PARTITION_ID_ANY)
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut codec = ClientMessageCodec::new();
        let original = create_simple_message(CLIENT_AUTHENTICATION);
        let original_correlation = original.correlation_id();

        let mut buf = BytesMut::new();
        codec.encode(original, &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.message_type(), Some(CLIENT_AUTHENTICATION));
        assert_eq!(decoded.correlation_id(), original_correlation);
        assert_eq!(decoded.partition_id(), Some(PARTITION_ID_ANY));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_encode_empty_message_fails() {
        let mut codec = ClientMessageCodec::new();
        let mut buf = BytesMut::new();

        assert!(codec.encode(ClientMessage::new(), &mut buf).is_err());
    }

    #[test]
    fn test_decode_incomplete_frame() {
        let mut codec = ClientMessageCodec::new();
        let mut buf = BytesMut::from(&[
            0x10, 0x00, 0x00, 0x00, // length = 16
            0x00, 0xE0, // UNFRAGMENTED | IS_FINAL
            0x01, 0x02, // only 2 bytes of content
        ][..]);

        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(!codec.has_partial());
    }

    #[test]
    fn test_decode_waits_for_final_frame() {
        let mut codec = ClientMessageCodec::new();
        let mut msg = create_simple_message(TOPIC_PUBLISH);
        msg.add_frame(Frame::with_content(BytesMut::from(&b"news"[..])));

        let mut full = BytesMut::new();
        codec.encode(msg, &mut full).unwrap();
        let first_frame_len = REQUEST_HEADER_SIZE + FRAME_HEADER_SIZE;
        let mut partial = full.split_to(first_frame_len);

        assert!(codec.decode(&mut partial).unwrap().is_none());
        assert!(codec.has_partial());

        partial.unsplit(full);
        let decoded = codec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(decoded.frame_count(), 2);
        assert!(!codec.has_partial());
    }

    #[test]
    fn test_decode_multiple_messages() {
        let mut codec = ClientMessageCodec::new();

        let mut buf = BytesMut::new();
        codec.encode(create_simple_message(CLIENT_PING), &mut buf).unwrap();
        codec.encode(create_simple_message(TOPIC_PUBLISH), &mut buf).unwrap();

        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();

        assert_eq!(first.message_type(), Some(CLIENT_PING));
        assert_eq!(second.message_type(), Some(TOPIC_PUBLISH));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_rejects_short_length_field() {
        let mut codec = ClientMessageCodec::new();
        let mut buf = BytesMut::from(&[0x02, 0x00, 0x00, 0x00, 0x00, 0x20][..]);

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, HazelcastError::Protocol(_)));
    }

    #[test]
    fn test_decode_rejects_short_initial_frame() {
        let mut codec = ClientMessageCodec::new();
        let mut buf = BytesMut::new();
        Frame::new(BytesMut::from(&[1, 2, 3][..]), UNFRAGMENTED_MESSAGE | IS_FINAL_FLAG)
            .write_to(&mut buf);

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, HazelcastError::Protocol(_)));
    }

    #[test]
    fn test_decode_eof_without_final_frame_is_error() {
        let mut codec = ClientMessageCodec::new();
        let mut buf = BytesMut::new();
        let msg = create_simple_message(CLIENT_PING);
        msg.initial_frame().unwrap().write_to(&mut buf);

        assert!(codec.decode(&mut buf).unwrap().is_none());
        let err = codec.decode_eof(&mut buf).unwrap_err();
        assert!(matches!(err, HazelcastError::Protocol(_)));
    }

    #[test]
    fn test_decode_eof_on_clean_stream() {
        let mut codec = ClientMessageCodec::new();
        let mut buf = BytesMut::new();

        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_registry_rejects_unknown_type() {
        let mut codec = ClientMessageCodec::with_registry(codec_registry());
        let mut buf = BytesMut::new();
        codec.encode(create_simple_message(0x7F7F00), &mut buf).unwrap();

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, HazelcastError::Protocol(_)));
    }

    #[test]
    fn test_registry_accepts_known_type() {
        let mut codec = ClientMessageCodec::with_registry(codec_registry());
        let mut buf = BytesMut::new();
        codec.encode(create_simple_message(CLIENT_PING), &mut buf).unwrap();

        assert!(codec.decode(&mut buf).unwrap().is_some());
    }

    #[test]
    fn test_reassembles_fragments() {
        let mut codec = ClientMessageCodec::new();
        let mut msg = create_simple_message(TOPIC_PUBLISH);
        for i in 0..5u8 {
            msg.add_frame(Frame::with_content(BytesMut::from(&[i; 50][..])));
        }

        let fragments = msg.fragment(80);
        assert!(fragments.len() > 2);

        let mut buf = BytesMut::new();
        for fragment in fragments {
            codec.encode(fragment, &mut buf).unwrap();
        }

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.frame_count(), msg.frame_count());
        assert_eq!(decoded.message_type(), Some(TOPIC_PUBLISH));
        assert_eq!(decoded.correlation_id(), msg.correlation_id());
        for (got, want) in decoded.frames().iter().zip(msg.frames()).skip(1) {
            assert_eq!(got.content, want.content);
        }
        assert!(!codec.has_partial());
    }

    #[test]
    fn test_fragment_continuation_without_begin_is_error() {
        let mut codec = ClientMessageCodec::new();
        let mut msg = create_simple_message(TOPIC_PUBLISH);
        for _ in 0..3 {
            msg.add_frame(Frame::with_content(BytesMut::from(&[9u8; 50][..])));
        }

        let mut buf = BytesMut::new();
        for fragment in msg.fragment(60).into_iter().skip(1) {
            codec.encode(fragment, &mut buf).unwrap();
        }

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, HazelcastError::Protocol(_)));
    }
}
