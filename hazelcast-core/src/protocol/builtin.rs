//! Field codecs shared by every operation codec.
//!
//! Fixed-size fields are packed into the initial frame of a message (or of a
//! nested structure). Everything else travels as one or more child frames,
//! decoded in order through a [`ForwardFrameIterator`].

use std::collections::HashMap;
use std::hash::Hash;

use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

use super::client_message::{ClientMessage, ForwardFrameIterator};
use super::constants::*;
use super::frame::Frame;
use crate::error::{HazelcastError, Result};

/// Opaque serialized application data.
///
/// Keys, values and topic items travel as `Data`; their serialization format
/// is the application's concern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Data(pub Bytes);

impl Data {
    /// Wraps already-serialized bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Returns the serialized bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the serialized length.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no bytes are held.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&'static str> for Data {
    fn from(value: &'static str) -> Self {
        Self(Bytes::from_static(value.as_bytes()))
    }
}

impl From<Vec<u8>> for Data {
    fn from(value: Vec<u8>) -> Self {
        Self(Bytes::from(value))
    }
}

/// A value with a constant encoded size, packed into an initial frame.
pub trait FixedSizeCodec: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Appends the encoded value to `buf`.
    fn encode_fixed(&self, buf: &mut BytesMut);

    /// Decodes a value starting at `offset`.
    fn decode_fixed(buf: &[u8], offset: usize) -> Result<Self>;
}

/// A value encoded as one or more frames.
pub trait FrameCodec: Sized {
    /// Appends the frames for this value to `message`.
    fn encode_frames(&self, message: &mut ClientMessage);

    /// Consumes the frames for one value.
    fn decode_frames(frames: &mut ForwardFrameIterator<'_>) -> Result<Self>;
}

/// The parameter set of a request, response or event.
///
/// Usually produced by `#[derive(HazelcastCodec)]`.
pub trait MessageCodec: Sized {
    /// Writes fixed fields into the initial frame and appends variable fields.
    fn encode_fields(&self, message: &mut ClientMessage);

    /// Reads the fields back; fixed fields start at `header_size`.
    fn decode_fields(message: &ClientMessage, header_size: usize) -> Result<Self>;
}

impl MessageCodec for () {
    fn encode_fields(&self, _message: &mut ClientMessage) {}

    fn decode_fields(_message: &ClientMessage, _header_size: usize) -> Result<Self> {
        Ok(())
    }
}

fn fixed_slice(buf: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    buf.get(offset..offset + len).ok_or_else(|| {
        HazelcastError::Protocol(format!(
            "fixed field at offset {} needs {} bytes, frame has {}",
            offset,
            len,
            buf.len()
        ))
    })
}

impl FixedSizeCodec for u8 {
    const SIZE: usize = BYTE_SIZE_IN_BYTES;

    fn encode_fixed(&self, buf: &mut BytesMut) {
        buf.put_u8(*self);
    }

    fn decode_fixed(buf: &[u8], offset: usize) -> Result<Self> {
        Ok(fixed_slice(buf, offset, Self::SIZE)?[0])
    }
}

impl FixedSizeCodec for bool {
    const SIZE: usize = BOOLEAN_SIZE_IN_BYTES;

    fn encode_fixed(&self, buf: &mut BytesMut) {
        buf.put_u8(u8::from(*self));
    }

    fn decode_fixed(buf: &[u8], offset: usize) -> Result<Self> {
        Ok(fixed_slice(buf, offset, Self::SIZE)?[0] != 0)
    }
}

impl FixedSizeCodec for i32 {
    const SIZE: usize = INT_SIZE_IN_BYTES;

    fn encode_fixed(&self, buf: &mut BytesMut) {
        buf.put_i32_le(*self);
    }

    fn decode_fixed(buf: &[u8], offset: usize) -> Result<Self> {
        let b = fixed_slice(buf, offset, Self::SIZE)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

impl FixedSizeCodec for i64 {
    const SIZE: usize = LONG_SIZE_IN_BYTES;

    fn encode_fixed(&self, buf: &mut BytesMut) {
        buf.put_i64_le(*self);
    }

    fn decode_fixed(buf: &[u8], offset: usize) -> Result<Self> {
        let mut raw = [0u8; LONG_SIZE_IN_BYTES];
        raw.copy_from_slice(fixed_slice(buf, offset, Self::SIZE)?);
        Ok(i64::from_le_bytes(raw))
    }
}

impl FixedSizeCodec for Uuid {
    const SIZE: usize = UUID_SIZE_IN_BYTES;

    fn encode_fixed(&self, buf: &mut BytesMut) {
        Some(*self).encode_fixed(buf);
    }

    fn decode_fixed(buf: &[u8], offset: usize) -> Result<Self> {
        Option::<Uuid>::decode_fixed(buf, offset)?
            .ok_or_else(|| HazelcastError::Protocol("unexpected null UUID".to_string()))
    }
}

impl FixedSizeCodec for Option<Uuid> {
    const SIZE: usize = UUID_SIZE_IN_BYTES;

    fn encode_fixed(&self, buf: &mut BytesMut) {
        match self {
            Some(uuid) => {
                let (msb, lsb) = uuid.as_u64_pair();
                buf.put_u8(0);
                buf.put_i64_le(msb as i64);
                buf.put_i64_le(lsb as i64);
            }
            None => {
                buf.put_u8(1);
                buf.put_bytes(0, 2 * LONG_SIZE_IN_BYTES);
            }
        }
    }

    fn decode_fixed(buf: &[u8], offset: usize) -> Result<Self> {
        fixed_slice(buf, offset, Self::SIZE)?;
        if bool::decode_fixed(buf, offset)? {
            return Ok(None);
        }
        let msb = i64::decode_fixed(buf, offset + BOOLEAN_SIZE_IN_BYTES)? as u64;
        let lsb = i64::decode_fixed(buf, offset + BOOLEAN_SIZE_IN_BYTES + LONG_SIZE_IN_BYTES)?
            as u64;
        Ok(Some(Uuid::from_u64_pair(msb, lsb)))
    }
}

/// Nullable fixed fields: a null flag byte followed by the value (zeroed when null).
macro_rules! nullable_fixed {
    ($($ty:ty),*) => {$(
        impl FixedSizeCodec for Option<$ty> {
            const SIZE: usize = BOOLEAN_SIZE_IN_BYTES + <$ty as FixedSizeCodec>::SIZE;

            fn encode_fixed(&self, buf: &mut BytesMut) {
                match self {
                    Some(value) => {
                        buf.put_u8(0);
                        value.encode_fixed(buf);
                    }
                    None => {
                        buf.put_u8(1);
                        buf.put_bytes(0, <$ty as FixedSizeCodec>::SIZE);
                    }
                }
            }

            fn decode_fixed(buf: &[u8], offset: usize) -> Result<Self> {
                if bool::decode_fixed(buf, offset)? {
                    fixed_slice(buf, offset, Self::SIZE)?;
                    return Ok(None);
                }
                <$ty as FixedSizeCodec>::decode_fixed(buf, offset + BOOLEAN_SIZE_IN_BYTES).map(Some)
            }
        }
    )*};
}

nullable_fixed!(u8, bool, i32);

/// Primitives that also appear inside collections travel as one frame each.
macro_rules! fixed_as_frame {
    ($($ty:ty),*) => {$(
        impl FrameCodec for $ty {
            fn encode_frames(&self, message: &mut ClientMessage) {
                let mut content = BytesMut::with_capacity(<$ty as FixedSizeCodec>::SIZE);
                self.encode_fixed(&mut content);
                message.add_frame(Frame::with_content(content));
            }

            fn decode_frames(frames: &mut ForwardFrameIterator<'_>) -> Result<Self> {
                <$ty as FixedSizeCodec>::decode_fixed(&frames.next_frame()?.content, 0)
            }
        }
    )*};
}

fixed_as_frame!(u8, bool, i32, i64, Uuid);

impl FrameCodec for String {
    fn encode_frames(&self, message: &mut ClientMessage) {
        message.add_frame(Frame::with_content(BytesMut::from(self.as_bytes())));
    }

    fn decode_frames(frames: &mut ForwardFrameIterator<'_>) -> Result<Self> {
        let frame = frames.next_frame()?;
        String::from_utf8(frame.content.to_vec())
            .map_err(|e| HazelcastError::Protocol(format!("invalid UTF-8 string frame: {}", e)))
    }
}

impl FrameCodec for Bytes {
    fn encode_frames(&self, message: &mut ClientMessage) {
        message.add_frame(Frame::with_content(BytesMut::from(&self[..])));
    }

    fn decode_frames(frames: &mut ForwardFrameIterator<'_>) -> Result<Self> {
        Ok(Bytes::copy_from_slice(&frames.next_frame()?.content))
    }
}

impl FrameCodec for Data {
    fn encode_frames(&self, message: &mut ClientMessage) {
        self.0.encode_frames(message);
    }

    fn decode_frames(frames: &mut ForwardFrameIterator<'_>) -> Result<Self> {
        Bytes::decode_frames(frames).map(Data)
    }
}

impl<T: FrameCodec> FrameCodec for Option<T> {
    fn encode_frames(&self, message: &mut ClientMessage) {
        match self {
            Some(value) => value.encode_frames(message),
            None => message.add_frame(Frame::new_null_frame()),
        }
    }

    fn decode_frames(frames: &mut ForwardFrameIterator<'_>) -> Result<Self> {
        if frames.next_is_null_frame() {
            return Ok(None);
        }
        T::decode_frames(frames).map(Some)
    }
}

impl<T: FrameCodec> FrameCodec for Vec<T> {
    fn encode_frames(&self, message: &mut ClientMessage) {
        message.add_frame(Frame::new_begin_data_structure_frame());
        for item in self {
            item.encode_frames(message);
        }
        message.add_frame(Frame::new_end_data_structure_frame());
    }

    fn decode_frames(frames: &mut ForwardFrameIterator<'_>) -> Result<Self> {
        frames.expect_begin_data_structure()?;
        let mut items = Vec::new();
        while !frames.next_is_end_data_structure() {
            items.push(T::decode_frames(frames)?);
        }
        frames.next_frame()?;
        Ok(items)
    }
}

impl<K, V> FrameCodec for HashMap<K, V>
where
    K: FrameCodec + Eq + Hash,
    V: FrameCodec,
{
    fn encode_frames(&self, message: &mut ClientMessage) {
        message.add_frame(Frame::new_begin_data_structure_frame());
        for (key, value) in self {
            key.encode_frames(message);
            value.encode_frames(message);
        }
        message.add_frame(Frame::new_end_data_structure_frame());
    }

    fn decode_frames(frames: &mut ForwardFrameIterator<'_>) -> Result<Self> {
        frames.expect_begin_data_structure()?;
        let mut entries = HashMap::new();
        while !frames.next_is_end_data_structure() {
            let key = K::decode_frames(frames)?;
            let value = V::decode_frames(frames)?;
            entries.insert(key, value);
        }
        frames.next_frame()?;
        Ok(entries)
    }
}

impl<A: FrameCodec, B: FrameCodec> FrameCodec for (A, B) {
    fn encode_frames(&self, message: &mut ClientMessage) {
        self.0.encode_frames(message);
        self.1.encode_frames(message);
    }

    fn decode_frames(frames: &mut ForwardFrameIterator<'_>) -> Result<Self> {
        let first = A::decode_frames(frames)?;
        let second = B::decode_frames(frames)?;
        Ok((first, second))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_back<T: FrameCodec>(value: &T) -> Result<T> {
        let mut message = ClientMessage::new();
        value.encode_frames(&mut message);
        let mut frames = message.frame_iter();
        let decoded = T::decode_frames(&mut frames)?;
        assert!(!frames.has_next(), "decoder left frames behind");
        Ok(decoded)
    }

    #[test]
    fn test_uuid_fixed_layout() {
        let uuid = Uuid::from_u64_pair(0x0102030405060708, 0x1112131415161718);
        let mut buf = BytesMut::new();
        uuid.encode_fixed(&mut buf);

        assert_eq!(buf.len(), UUID_SIZE_IN_BYTES);
        assert_eq!(buf[0], 0);
        assert_eq!(&buf[1..9], &0x0102030405060708u64.to_le_bytes());
        assert_eq!(&buf[9..17], &0x1112131415161718u64.to_le_bytes());
        assert_eq!(Uuid::decode_fixed(&buf, 0).unwrap(), uuid);
    }

    #[test]
    fn test_null_uuid() {
        let mut buf = BytesMut::new();
        None::<Uuid>.encode_fixed(&mut buf);

        assert_eq!(buf.len(), UUID_SIZE_IN_BYTES);
        assert_eq!(Option::<Uuid>::decode_fixed(&buf, 0).unwrap(), None);
        assert!(matches!(
            Uuid::decode_fixed(&buf, 0),
            Err(HazelcastError::Protocol(_))
        ));
    }

    #[test]
    fn test_nullable_fixed_fields() {
        let mut buf = BytesMut::new();
        Some(2u8).encode_fixed(&mut buf);
        None::<bool>.encode_fixed(&mut buf);
        Some(-7i32).encode_fixed(&mut buf);

        assert_eq!(buf.len(), 2 + 2 + 5);
        assert_eq!(Option::<u8>::decode_fixed(&buf, 0).unwrap(), Some(2));
        assert_eq!(Option::<bool>::decode_fixed(&buf, 2).unwrap(), None);
        assert_eq!(Option::<i32>::decode_fixed(&buf, 4).unwrap(), Some(-7));
    }

    #[test]
    fn test_fixed_decode_out_of_bounds() {
        let buf = [0u8; 3];
        assert!(matches!(
            i32::decode_fixed(&buf, 0),
            Err(HazelcastError::Protocol(_))
        ));
        assert!(i64::decode_fixed(&buf, 2).is_err());
    }

    #[test]
    fn test_empty_string_and_collections() {
        assert_eq!(decode_back(&String::new()).unwrap(), "");
        assert!(decode_back(&Vec::<String>::new()).unwrap().is_empty());
        assert!(decode_back(&HashMap::<String, String>::new())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_nullable_frames() {
        let value: Option<String> = None;
        let mut message = ClientMessage::new();
        value.encode_frames(&mut message);
        assert!(message.frames()[0].is_null_frame());

        assert_eq!(decode_back(&value).unwrap(), None);
        assert_eq!(
            decode_back(&Some("x".to_string())).unwrap(),
            Some("x".to_string())
        );
    }

    #[test]
    fn test_nested_collections() {
        let owners = vec![
            (Uuid::new_v4(), vec![0, 1, 2]),
            (Uuid::new_v4(), Vec::new()),
        ];
        assert_eq!(decode_back(&owners).unwrap(), owners);
    }

    #[test]
    fn test_map_of_strings() {
        let mut attributes = HashMap::new();
        attributes.insert("cluster.name".to_string(), "dev".to_string());
        attributes.insert("zone".to_string(), String::new());
        assert_eq!(decode_back(&attributes).unwrap(), attributes);
    }

    #[test]
    fn test_large_data() {
        let data = Data::from(vec![0xAB; 64 * 1024]);
        assert_eq!(decode_back(&data).unwrap(), data);
    }

    #[test]
    fn test_invalid_utf8_is_protocol_error() {
        let mut message = ClientMessage::new();
        message.add_frame(Frame::with_content(BytesMut::from(&[0xFF, 0xFE][..])));

        let err = String::decode_frames(&mut message.frame_iter()).unwrap_err();
        assert!(matches!(err, HazelcastError::Protocol(_)));
    }

    #[test]
    fn test_unterminated_list_is_protocol_error() {
        let mut message = ClientMessage::new();
        message.add_frame(Frame::new_begin_data_structure_frame());
        message.add_frame(Frame::with_content(BytesMut::from(&b"a"[..])));

        let err = Vec::<String>::decode_frames(&mut message.frame_iter()).unwrap_err();
        assert!(matches!(err, HazelcastError::Protocol(_)));
    }

    #[test]
    fn test_list_without_begin_is_protocol_error() {
        let mut message = ClientMessage::new();
        message.add_frame(Frame::with_content(BytesMut::from(&b"a"[..])));

        assert!(Vec::<String>::decode_frames(&mut message.frame_iter()).is_err());
    }
}
