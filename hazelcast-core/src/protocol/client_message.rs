//! ClientMessage type for multi-frame Hazelcast protocol messages.

use bytes::{BufMut, BytesMut};
use std::sync::atomic::{AtomicI64, Ordering};

use super::constants::*;
use super::frame::Frame;
use crate::error::{HazelcastError, Result};

/// Global correlation ID counter.
static CORRELATION_ID_COUNTER: AtomicI64 = AtomicI64::new(1);

/// Global fragment ID counter.
static FRAGMENT_ID_COUNTER: AtomicI64 = AtomicI64::new(1);

/// Generates a unique correlation ID for a request.
pub fn next_correlation_id() -> i64 {
    CORRELATION_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A client message composed of one or more frames.
///
/// The first frame is the "initial frame" containing the message header
/// (type, correlation ID, and partition ID for requests and events or the
/// backup acknowledgement count for responses). Additional frames contain
/// the message payload.
///
/// The retryable flag and operation name travel with the message inside the
/// client; they are not part of the wire format.
#[derive(Debug, Clone)]
pub struct ClientMessage {
    frames: Vec<Frame>,
    retryable: bool,
    operation_name: Option<&'static str>,
}

impl ClientMessage {
    /// Creates a new empty client message.
    pub fn new() -> Self {
        Self {
            frames: Vec::new(),
            retryable: false,
            operation_name: None,
        }
    }

    /// Creates a request message with the given type and partition ID.
    pub fn create_for_encode(message_type: i32, partition_id: i32) -> Self {
        let mut initial_frame = Frame::with_capacity(REQUEST_HEADER_SIZE, UNFRAGMENTED_MESSAGE);
        initial_frame.content.put_i32_le(message_type);
        initial_frame.content.put_i64_le(next_correlation_id());
        initial_frame.content.put_i32_le(partition_id);

        Self::from_frames(vec![initial_frame])
    }

    /// Creates a response message with the given type.
    ///
    /// The correlation ID is zero until the responder copies it from the request.
    pub fn create_response(message_type: i32) -> Self {
        let mut initial_frame = Frame::with_capacity(RESPONSE_HEADER_SIZE, UNFRAGMENTED_MESSAGE);
        initial_frame.content.put_i32_le(message_type);
        initial_frame.content.put_i64_le(0);
        initial_frame.content.put_u8(0);

        Self::from_frames(vec![initial_frame])
    }

    /// Creates an event message with the given type and partition ID.
    pub fn create_event(message_type: i32, partition_id: i32) -> Self {
        let mut initial_frame =
            Frame::with_capacity(EVENT_HEADER_SIZE, UNFRAGMENTED_MESSAGE | IS_EVENT_FLAG);
        initial_frame.content.put_i32_le(message_type);
        initial_frame.content.put_i64_le(0);
        initial_frame.content.put_i32_le(partition_id);

        Self::from_frames(vec![initial_frame])
    }

    /// Creates a client message from received frames.
    pub fn from_frames(frames: Vec<Frame>) -> Self {
        Self {
            frames,
            retryable: false,
            operation_name: None,
        }
    }

    /// Checks the invariants every decoded message must satisfy.
    pub fn validate(&self) -> Result<()> {
        let initial = self
            .frames
            .first()
            .ok_or_else(|| HazelcastError::Protocol("message has no frames".to_string()))?;
        if initial.content.len() < CORRELATION_ID_OFFSET + LONG_SIZE_IN_BYTES {
            return Err(HazelcastError::Protocol(format!(
                "initial frame of {} bytes is too short for a message header",
                initial.content.len()
            )));
        }
        Ok(())
    }

    fn read_header_i32(&self, offset: usize) -> Option<i32> {
        let content = &self.frames.first()?.content;
        let bytes = content.get(offset..offset + INT_SIZE_IN_BYTES)?;
        Some(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn write_header(&mut self, offset: usize, bytes: &[u8]) {
        if let Some(frame) = self.frames.first_mut() {
            if frame.content.len() >= offset + bytes.len() {
                frame.content[offset..offset + bytes.len()].copy_from_slice(bytes);
            }
        }
    }

    /// Returns the message type from the initial frame.
    ///
    /// Returns `None` if there is no initial frame or if the frame content
    /// is too short to contain a message type field.
    pub fn message_type(&self) -> Option<i32> {
        self.read_header_i32(TYPE_FIELD_OFFSET)
    }

    /// Returns the correlation ID from the initial frame.
    pub fn correlation_id(&self) -> Option<i64> {
        let content = &self.frames.first()?.content;
        let bytes = content.get(CORRELATION_ID_OFFSET..CORRELATION_ID_OFFSET + LONG_SIZE_IN_BYTES)?;
        let mut raw = [0u8; LONG_SIZE_IN_BYTES];
        raw.copy_from_slice(bytes);
        Some(i64::from_le_bytes(raw))
    }

    /// Sets the correlation ID in the initial frame.
    pub fn set_correlation_id(&mut self, correlation_id: i64) {
        self.write_header(CORRELATION_ID_OFFSET, &correlation_id.to_le_bytes());
    }

    /// Returns the partition ID from the initial frame (requests and events).
    pub fn partition_id(&self) -> Option<i32> {
        self.read_header_i32(PARTITION_ID_OFFSET)
    }

    /// Sets the partition ID in the initial frame.
    pub fn set_partition_id(&mut self, partition_id: i32) {
        self.write_header(PARTITION_ID_OFFSET, &partition_id.to_le_bytes());
    }

    /// Returns the backup acknowledgement count of a response.
    pub fn backup_acks(&self) -> Option<u8> {
        self.frames
            .first()
            .and_then(|f| f.content.get(RESPONSE_BACKUP_ACKS_OFFSET).copied())
    }

    /// Returns true if the operation may be retried after its connection is lost.
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Marks the operation as retryable or not.
    pub fn set_retryable(&mut self, retryable: bool) {
        self.retryable = retryable;
    }

    /// Returns the name of the operation that produced this message.
    pub fn operation_name(&self) -> Option<&'static str> {
        self.operation_name
    }

    /// Sets the operation name.
    pub fn set_operation_name(&mut self, name: &'static str) {
        self.operation_name = Some(name);
    }

    /// Returns a copy of this message carrying a fresh correlation ID.
    pub fn copy_with_new_correlation_id(&self) -> Self {
        let mut copy = self.clone();
        copy.set_correlation_id(next_correlation_id());
        copy
    }

    /// Adds a frame to the message.
    pub fn add_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    /// Returns a reference to the initial (first) frame, if present.
    pub fn initial_frame(&self) -> Option<&Frame> {
        self.frames.first()
    }

    /// Returns the content of the initial frame for appending fixed-size fields.
    ///
    /// An empty message gets a default initial frame first.
    pub fn initial_frame_content_mut(&mut self) -> &mut BytesMut {
        if self.frames.is_empty() {
            self.frames.push(Frame::default());
        }
        &mut self.frames[0].content
    }

    /// Returns a reference to all frames.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Returns a forward-only cursor over the frames.
    pub fn frame_iter(&self) -> ForwardFrameIterator<'_> {
        ForwardFrameIterator::new(&self.frames)
    }

    /// Returns the number of frames in the message.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Returns true if the message has no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Calculates the total size of the message on the wire.
    pub fn wire_size(&self) -> usize {
        self.frames.iter().map(Frame::frame_length).sum()
    }

    /// Writes all frames to the destination buffer, marking the last one final.
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(self.wire_size());
        let last = self.frames.len().saturating_sub(1);
        for (index, frame) in self.frames.iter().enumerate() {
            if index == last && !frame.is_final_frame() {
                let mut last_frame = frame.clone();
                last_frame.flags |= IS_FINAL_FLAG;
                last_frame.write_to(dst);
            } else {
                frame.write_to(dst);
            }
        }
    }

    /// Returns true if this message is flagged as an event.
    pub fn is_event(&self) -> bool {
        self.frames
            .first()
            .map(|f| f.is_event_frame())
            .unwrap_or(false)
    }

    /// Splits this message into fragments of roughly `max_frame_bytes` each.
    ///
    /// Frames are never split. Each fragment starts with a frame carrying the
    /// shared fragment id; the first is flagged BEGIN_FRAGMENT and the last
    /// END_FRAGMENT. A message that fits is returned unchanged.
    pub fn fragment(&self, max_frame_bytes: usize) -> Vec<ClientMessage> {
        if self.wire_size() <= max_frame_bytes {
            return vec![self.clone()];
        }

        let mut chunks: Vec<Vec<Frame>> = Vec::new();
        let mut current: Vec<Frame> = Vec::new();
        let mut current_size = 0;
        for frame in &self.frames {
            let size = frame.frame_length();
            if !current.is_empty() && current_size + size > max_frame_bytes {
                chunks.push(std::mem::take(&mut current));
                current_size = 0;
            }
            current.push(frame.clone());
            current_size += size;
        }
        if !current.is_empty() {
            chunks.push(current);
        }
        if chunks.len() < 2 {
            return vec![self.clone()];
        }

        let fragment_id = FRAGMENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        let last = chunks.len() - 1;
        chunks
            .into_iter()
            .enumerate()
            .map(|(index, frames)| {
                let flags = if index == 0 {
                    BEGIN_FRAGMENT_FLAG
                } else if index == last {
                    END_FRAGMENT_FLAG
                } else {
                    DEFAULT_FLAGS
                };
                let mut id = BytesMut::with_capacity(LONG_SIZE_IN_BYTES);
                id.put_i64_le(fragment_id);

                let mut fragment = Vec::with_capacity(frames.len() + 1);
                fragment.push(Frame::new(id, flags));
                fragment.extend(frames);
                ClientMessage::from_frames(fragment)
            })
            .collect()
    }
}

impl Default for ClientMessage {
    fn default() -> Self {
        Self::new()
    }
}

/// Forward-only cursor over the frames of a message.
///
/// Every decode step consumes frames strictly left to right. Running past the
/// last frame is a protocol error rather than a panic.
#[derive(Debug, Clone)]
pub struct ForwardFrameIterator<'a> {
    frames: &'a [Frame],
    position: usize,
}

impl<'a> ForwardFrameIterator<'a> {
    /// Creates a cursor positioned before the first frame.
    pub fn new(frames: &'a [Frame]) -> Self {
        Self {
            frames,
            position: 0,
        }
    }

    /// Returns true if at least one frame remains.
    pub fn has_next(&self) -> bool {
        self.position < self.frames.len()
    }

    /// Returns the next frame without consuming it.
    pub fn peek(&self) -> Option<&'a Frame> {
        self.frames.get(self.position)
    }

    /// Consumes and returns the next frame.
    pub fn next_frame(&mut self) -> Result<&'a Frame> {
        let frame = self.frames.get(self.position).ok_or_else(|| {
            HazelcastError::Protocol(format!(
                "message ended after {} frames while more were expected",
                self.frames.len()
            ))
        })?;
        self.position += 1;
        Ok(frame)
    }

    /// Consumes the next frame if it is a null frame and reports whether it was.
    pub fn next_is_null_frame(&mut self) -> bool {
        match self.peek() {
            Some(frame) if frame.is_null_frame() => {
                self.position += 1;
                true
            }
            _ => false,
        }
    }

    /// Returns true if the next frame closes a nested structure.
    pub fn next_is_end_data_structure(&self) -> bool {
        self.peek()
            .map(Frame::is_end_data_structure)
            .unwrap_or(false)
    }

    /// Consumes a frame that must open a nested structure.
    pub fn expect_begin_data_structure(&mut self) -> Result<()> {
        let frame = self.next_frame()?;
        if !frame.is_begin_data_structure() {
            return Err(HazelcastError::Protocol(format!(
                "expected a begin-structure frame, found flags {:#06x}",
                frame.flags
            )));
        }
        Ok(())
    }

    /// Skips frames until the end marker of the structure currently being read.
    ///
    /// Nested structures are skipped whole, so fields appended by newer
    /// members are ignored.
    pub fn fast_forward_to_end_frame(&mut self) -> Result<()> {
        let mut depth = 1usize;
        while depth > 0 {
            let frame = self.next_frame()?;
            if frame.is_end_data_structure() {
                depth -= 1;
            } else if frame.is_begin_data_structure() {
                depth += 1;
            }
        }
        Ok(())
    }
}

impl<'a> Iterator for ForwardFrameIterator<'a> {
    type Item = &'a Frame;

    fn next(&mut self) -> Option<Self::Item> {
        let frame = self.frames.get(self.position)?;
        self.position += 1;
        Some(frame)
    }
}

/// Computes a partition hash for the given key data.
///
/// Uses MurmurHash3 algorithm compatible with Hazelcast.
pub fn compute_partition_hash(key: &[u8]) -> i32 {
    murmur_hash3_x86_32(key, 0x01000193)
}

/// MurmurHash3 x86 32-bit implementation.
fn murmur_hash3_x86_32(data: &[u8], seed: u32) -> i32 {
    const C1: u32 = 0xcc9e2d51;
    const C2: u32 = 0x1b873593;

    let mix = |k: u32| k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);

    let mut h1 = seed;
    let mut blocks = data.chunks_exact(4);
    for block in &mut blocks {
        let k1 = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        h1 ^= mix(k1);
        h1 = h1.rotate_left(13).wrapping_mul(5).wrapping_add(0xe6546b64);
    }

    let tail = blocks.remainder();
    if !tail.is_empty() {
        let k1 = tail
            .iter()
            .enumerate()
            .fold(0u32, |acc, (i, byte)| acc ^ ((*byte as u32) << (8 * i)));
        h1 ^= mix(k1);
    }

    h1 ^= data.len() as u32;
    h1 ^= h1 >> 16;
    h1 = h1.wrapping_mul(0x85ebca6b);
    h1 ^= h1 >> 13;
    h1 = h1.wrapping_mul(0xc2b2ae35);
    h1 ^= h1 >> 16;

    h1 as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_message() {
        let msg = ClientMessage::create_for_encode(CLIENT_PING, PARTITION_ID_ANY);

        assert_eq!(msg.message_type(), Some(CLIENT_PING));
        assert_eq!(msg.partition_id(), Some(PARTITION_ID_ANY));
        assert!(msg.correlation_id().is_some());
        assert_eq!(msg.frame_count(), 1);
        assert!(msg.initial_frame().unwrap().is_unfragmented());
        assert!(!msg.is_event());
    }

    #[test]
    fn test_create_response_has_backup_acks() {
        let msg = ClientMessage::create_response(CLIENT_PING_RESPONSE);

        assert_eq!(msg.message_type(), Some(CLIENT_PING_RESPONSE));
        assert_eq!(msg.backup_acks(), Some(0));
        assert_eq!(
            msg.initial_frame().unwrap().content.len(),
            RESPONSE_HEADER_SIZE
        );
    }

    #[test]
    fn test_create_event_sets_event_flag() {
        let msg = ClientMessage::create_event(TOPIC_EVENT, 7);

        assert!(msg.is_event());
        assert_eq!(msg.partition_id(), Some(7));
    }

    #[test]
    fn test_correlation_id_increments() {
        let first = ClientMessage::create_for_encode(CLIENT_PING, PARTITION_ID_ANY);
        let second = ClientMessage::create_for_encode(CLIENT_PING, PARTITION_ID_ANY);

        assert!(second.correlation_id().unwrap() > first.correlation_id().unwrap());
    }

    #[test]
    fn test_copy_with_new_correlation_id_keeps_metadata() {
        let mut msg = ClientMessage::create_for_encode(CLIENT_PING, 3);
        msg.set_retryable(true);
        msg.set_operation_name("Client.Ping");

        let copy = msg.copy_with_new_correlation_id();

        assert_ne!(copy.correlation_id(), msg.correlation_id());
        assert_eq!(copy.partition_id(), Some(3));
        assert!(copy.is_retryable());
        assert_eq!(copy.operation_name(), Some("Client.Ping"));
    }

    #[test]
    fn test_set_header_fields() {
        let mut msg = ClientMessage::create_for_encode(CLIENT_PING, PARTITION_ID_ANY);
        msg.set_correlation_id(12345);
        msg.set_partition_id(42);

        assert_eq!(msg.correlation_id(), Some(12345));
        assert_eq!(msg.partition_id(), Some(42));
    }

    #[test]
    fn test_header_accessors_on_short_content() {
        let msg = ClientMessage::from_frames(vec![Frame::with_content(BytesMut::from(
            &[1, 0][..],
        ))]);

        assert!(msg.message_type().is_none());
        assert!(msg.correlation_id().is_none());
        assert!(msg.partition_id().is_none());
        assert!(msg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_message() {
        let err = ClientMessage::new().validate().unwrap_err();
        assert!(matches!(err, HazelcastError::Protocol(_)));
    }

    #[test]
    fn test_write_to_marks_only_last_frame_final() {
        let mut msg = ClientMessage::create_for_encode(CLIENT_PING, PARTITION_ID_ANY);
        msg.add_frame(Frame::with_content(BytesMut::from(&b"abc"[..])));

        let mut buf = BytesMut::new();
        msg.write_to(&mut buf);

        let first = Frame::read_from(&mut buf).unwrap().unwrap();
        let second = Frame::read_from(&mut buf).unwrap().unwrap();
        assert!(!first.is_final_frame());
        assert!(second.is_final_frame());
        assert!(buf.is_empty());
        assert!(!msg.frames()[1].is_final_frame());
    }

    #[test]
    fn test_request_wire_layout_is_bit_exact() {
        let mut msg = ClientMessage::create_for_encode(CLIENT_PING, PARTITION_ID_ANY);
        msg.set_correlation_id(2);

        let mut buf = BytesMut::new();
        msg.write_to(&mut buf);

        assert_eq!(
            &buf[..],
            &[
                22, 0, 0, 0, // frame length including header
                0x00, 0xE0, // UNFRAGMENTED | IS_FINAL
                0x00, 0x0B, 0x00, 0x00, // message type
                2, 0, 0, 0, 0, 0, 0, 0, // correlation id
                0xFF, 0xFF, 0xFF, 0xFF, // partition id -1
            ]
        );
    }

    #[test]
    fn test_iterator_reports_exhaustion() {
        let msg = ClientMessage::create_for_encode(CLIENT_PING, PARTITION_ID_ANY);
        let mut iter = msg.frame_iter();

        assert!(iter.next_frame().is_ok());
        assert!(!iter.has_next());
        assert!(matches!(
            iter.next_frame().unwrap_err(),
            HazelcastError::Protocol(_)
        ));
    }

    #[test]
    fn test_fast_forward_skips_nested_structures() {
        let msg = ClientMessage::from_frames(vec![
            Frame::with_content(BytesMut::from(&b"field"[..])),
            Frame::new_begin_data_structure_frame(),
            Frame::with_content(BytesMut::from(&b"nested"[..])),
            Frame::new_end_data_structure_frame(),
            Frame::new_end_data_structure_frame(),
            Frame::with_content(BytesMut::from(&b"after"[..])),
        ]);
        let mut iter = msg.frame_iter();

        iter.fast_forward_to_end_frame().unwrap();
        assert_eq!(&iter.next_frame().unwrap().content[..], b"after");
    }

    #[test]
    fn test_next_is_null_frame_consumes_only_null() {
        let msg = ClientMessage::from_frames(vec![Frame::new_null_frame(), Frame::default()]);
        let mut iter = msg.frame_iter();

        assert!(iter.next_is_null_frame());
        assert!(!iter.next_is_null_frame());
        assert!(iter.has_next());
    }

    #[test]
    fn test_fragment_small_message_is_unchanged() {
        let msg = ClientMessage::create_for_encode(CLIENT_PING, PARTITION_ID_ANY);
        let fragments = msg.fragment(1024);

        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].frames(), msg.frames());
    }

    #[test]
    fn test_fragment_marks_first_and_last() {
        let mut msg = ClientMessage::create_for_encode(CLIENT_PING, PARTITION_ID_ANY);
        for _ in 0..4 {
            msg.add_frame(Frame::with_content(BytesMut::from(&[7u8; 40][..])));
        }

        let fragments = msg.fragment(64);

        assert!(fragments.len() >= 3);
        let first_flags = fragments[0].frames()[0].flags;
        let last_flags = fragments.last().unwrap().frames()[0].flags;
        assert_eq!(first_flags, BEGIN_FRAGMENT_FLAG);
        assert_eq!(last_flags, END_FRAGMENT_FLAG);
        assert_eq!(fragments[1].frames()[0].flags, DEFAULT_FLAGS);

        let carried: usize = fragments.iter().map(|f| f.frame_count() - 1).sum();
        assert_eq!(carried, msg.frame_count());
    }

    #[test]
    fn test_partition_hash_deterministic() {
        let key = b"test-key";
        assert_eq!(compute_partition_hash(key), compute_partition_hash(key));
        assert_ne!(compute_partition_hash(b"key1"), compute_partition_hash(b"key2"));
    }

    #[test]
    fn test_murmur_hash_known_vectors() {
        assert_eq!(murmur_hash3_x86_32(b"", 0), 0);
        assert_eq!(murmur_hash3_x86_32(b"", 1) as u32, 0x514E28B7);
        assert_eq!(murmur_hash3_x86_32(b"test", 0) as u32, 0xBA6BD213);
        assert_eq!(murmur_hash3_x86_32(b"Hello, world!", 0) as u32, 0xC0363E43);
    }
}
