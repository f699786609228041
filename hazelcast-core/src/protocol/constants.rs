//! Protocol constants for the Hazelcast Open Binary Protocol.

/// Size of the frame length field in bytes.
pub const SIZE_OF_FRAME_LENGTH_FIELD: usize = 4;

/// Size of the frame flags field in bytes.
pub const SIZE_OF_FRAME_FLAGS_FIELD: usize = 2;

/// Total frame header size (length + flags). The length field counts these bytes too.
pub const FRAME_HEADER_SIZE: usize = SIZE_OF_FRAME_LENGTH_FIELD + SIZE_OF_FRAME_FLAGS_FIELD;

/// Bytes a client writes once, before its first frame, to select protocol version 2.
pub const CLIENT_PROTOCOL_HEADER: &[u8; 3] = b"CP2";

/// Begin fragment flag - marks the first frame of a message or fragment.
pub const BEGIN_FRAGMENT_FLAG: u16 = 1 << 15;

/// End fragment flag - marks the last fragment of a fragmented message.
pub const END_FRAGMENT_FLAG: u16 = 1 << 14;

/// Final flag - marks the last frame of a message.
pub const IS_FINAL_FLAG: u16 = 1 << 13;

/// Opens a nested structure (list, map, or custom type).
pub const BEGIN_DATA_STRUCTURE_FLAG: u16 = 1 << 12;

/// Closes a nested structure.
pub const END_DATA_STRUCTURE_FLAG: u16 = 1 << 11;

/// Null frame flag - indicates a null value.
pub const IS_NULL_FLAG: u16 = 1 << 10;

/// Event flag - set on the initial frame of server-pushed events.
pub const IS_EVENT_FLAG: u16 = 1 << 9;

/// Backup-aware flag - the client accepts backup acknowledgements for this request.
pub const BACKUP_AWARE_FLAG: u16 = 1 << 8;

/// Backup event flag.
pub const BACKUP_EVENT_FLAG: u16 = 1 << 7;

/// Flags of the initial frame of a message that is not split into fragments.
pub const UNFRAGMENTED_MESSAGE: u16 = BEGIN_FRAGMENT_FLAG | END_FRAGMENT_FLAG;

/// Default frame flags (no special flags set).
pub const DEFAULT_FLAGS: u16 = 0;

/// Offset of message type in initial frame content.
pub const TYPE_FIELD_OFFSET: usize = 0;

/// Offset of correlation ID in initial frame content.
pub const CORRELATION_ID_OFFSET: usize = TYPE_FIELD_OFFSET + INT_SIZE_IN_BYTES;

/// Offset of partition ID in request and event initial frames.
pub const PARTITION_ID_OFFSET: usize = CORRELATION_ID_OFFSET + LONG_SIZE_IN_BYTES;

/// Size of the request initial frame header.
pub const REQUEST_HEADER_SIZE: usize = PARTITION_ID_OFFSET + INT_SIZE_IN_BYTES;

/// Size of the event initial frame header.
pub const EVENT_HEADER_SIZE: usize = REQUEST_HEADER_SIZE;

/// Offset of backup acks count in response initial frame.
pub const RESPONSE_BACKUP_ACKS_OFFSET: usize = CORRELATION_ID_OFFSET + LONG_SIZE_IN_BYTES;

/// Size of the response initial frame header.
pub const RESPONSE_HEADER_SIZE: usize = RESPONSE_BACKUP_ACKS_OFFSET + BYTE_SIZE_IN_BYTES;

/// Offset of the fragment id in the first frame of every fragment.
pub const FRAGMENTATION_ID_OFFSET: usize = 0;

/// Partition ID indicating no specific partition (-1).
pub const PARTITION_ID_ANY: i32 = -1;

/// Encoded size of a byte.
pub const BYTE_SIZE_IN_BYTES: usize = 1;
/// Encoded size of a boolean.
pub const BOOLEAN_SIZE_IN_BYTES: usize = 1;
/// Encoded size of an `i32`.
pub const INT_SIZE_IN_BYTES: usize = 4;
/// Encoded size of an `i64`.
pub const LONG_SIZE_IN_BYTES: usize = 8;
/// Encoded size of a UUID: a null flag followed by two longs.
pub const UUID_SIZE_IN_BYTES: usize = BOOLEAN_SIZE_IN_BYTES + 2 * LONG_SIZE_IN_BYTES;

// Message types. Requests end in 0x00, responses in 0x01, events from 0x02.

/// Error response sent by a member in place of a regular response.
pub const EXCEPTION_MESSAGE_TYPE: i32 = 0;

/// Client authentication request.
pub const CLIENT_AUTHENTICATION: i32 = 0x000100;
/// Client authentication response.
pub const CLIENT_AUTHENTICATION_RESPONSE: i32 = 0x000101;

/// Client authentication with custom credentials request.
pub const CLIENT_AUTHENTICATION_CUSTOM: i32 = 0x000200;
/// Client authentication with custom credentials response.
pub const CLIENT_AUTHENTICATION_CUSTOM_RESPONSE: i32 = 0x000201;

/// Cluster view listener registration request.
pub const CLIENT_ADD_CLUSTER_VIEW_LISTENER: i32 = 0x000300;
/// Cluster view listener registration response.
pub const CLIENT_ADD_CLUSTER_VIEW_LISTENER_RESPONSE: i32 = 0x000301;
/// Members view event.
pub const CLIENT_MEMBERS_VIEW_EVENT: i32 = 0x000302;
/// Partitions view event.
pub const CLIENT_PARTITIONS_VIEW_EVENT: i32 = 0x000303;

/// Heartbeat request.
pub const CLIENT_PING: i32 = 0x000B00;
/// Heartbeat response.
pub const CLIENT_PING_RESPONSE: i32 = 0x000B01;

/// Topic publish request.
pub const TOPIC_PUBLISH: i32 = 0x040100;
/// Topic publish response.
pub const TOPIC_PUBLISH_RESPONSE: i32 = 0x040101;
/// Topic add message listener request.
pub const TOPIC_ADD_MESSAGE_LISTENER: i32 = 0x040200;
/// Topic add message listener response.
pub const TOPIC_ADD_MESSAGE_LISTENER_RESPONSE: i32 = 0x040201;
/// Topic message event.
pub const TOPIC_EVENT: i32 = 0x040202;
/// Topic remove message listener request.
pub const TOPIC_REMOVE_MESSAGE_LISTENER: i32 = 0x040300;
/// Topic remove message listener response.
pub const TOPIC_REMOVE_MESSAGE_LISTENER_RESPONSE: i32 = 0x040301;

/// Map remove entry listener request.
pub const MAP_REMOVE_ENTRY_LISTENER: i32 = 0x011A00;
/// Map remove entry listener response.
pub const MAP_REMOVE_ENTRY_LISTENER_RESPONSE: i32 = 0x011A01;
/// Map near-cache invalidation listener request.
pub const MAP_ADD_NEAR_CACHE_INVALIDATION_LISTENER: i32 = 0x013F00;
/// Map near-cache invalidation listener response.
pub const MAP_ADD_NEAR_CACHE_INVALIDATION_LISTENER_RESPONSE: i32 = 0x013F01;
/// Single-key map invalidation event.
pub const MAP_INVALIDATION_EVENT: i32 = 0x013F02;
/// Batched map invalidation event.
pub const MAP_BATCH_INVALIDATION_EVENT: i32 = 0x013F03;

/// Replicated map remove entry listener request.
pub const REPLICATED_MAP_REMOVE_ENTRY_LISTENER: i32 = 0x0D0E00;
/// Replicated map remove entry listener response.
pub const REPLICATED_MAP_REMOVE_ENTRY_LISTENER_RESPONSE: i32 = 0x0D0E01;
/// Replicated map key set request.
pub const REPLICATED_MAP_KEY_SET: i32 = 0x0D0F00;
/// Replicated map key set response.
pub const REPLICATED_MAP_KEY_SET_RESPONSE: i32 = 0x0D0F01;
/// Replicated map near-cache entry listener request.
pub const REPLICATED_MAP_ADD_NEAR_CACHE_ENTRY_LISTENER: i32 = 0x0D1200;
/// Replicated map near-cache entry listener response.
pub const REPLICATED_MAP_ADD_NEAR_CACHE_ENTRY_LISTENER_RESPONSE: i32 = 0x0D1201;
/// Replicated map entry event.
pub const REPLICATED_MAP_ENTRY_EVENT: i32 = 0x0D1202;

/// XA transaction rollback request.
pub const XA_TRANSACTION_ROLLBACK: i32 = 0x140700;
/// XA transaction rollback response.
pub const XA_TRANSACTION_ROLLBACK_RESPONSE: i32 = 0x140701;
