//! Client-level operations: authentication, cluster view and heartbeat.

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use hazelcast_derive::HazelcastCodec;
use uuid::Uuid;

use crate::protocol::constants::*;
use crate::protocol::operation::{Event, Operation};

/// A member address as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, HazelcastCodec)]
#[hazelcast(data_structure)]
pub struct WireAddress {
    /// TCP port.
    #[hazelcast(fixed)]
    pub port: i32,
    /// Host name or IP literal.
    pub host: String,
}

impl WireAddress {
    /// Creates a wire address.
    pub fn new(host: impl Into<String>, port: i32) -> Self {
        Self {
            port,
            host: host.into(),
        }
    }
}

impl fmt::Display for WireAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Codebase version of a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, HazelcastCodec)]
#[hazelcast(data_structure)]
pub struct MemberVersion {
    /// Major version.
    #[hazelcast(fixed)]
    pub major: u8,
    /// Minor version.
    #[hazelcast(fixed)]
    pub minor: u8,
    /// Patch version.
    #[hazelcast(fixed)]
    pub patch: u8,
}

/// One entry of a member list snapshot.
#[derive(Debug, Clone, PartialEq, Eq, HazelcastCodec)]
#[hazelcast(data_structure)]
pub struct MemberInfo {
    /// Member UUID.
    #[hazelcast(fixed)]
    pub uuid: Uuid,
    /// True for members that own no partitions.
    #[hazelcast(fixed)]
    pub lite_member: bool,
    /// Client-facing address.
    pub address: WireAddress,
    /// Member attributes.
    pub attributes: HashMap<String, String>,
    /// Member version.
    pub version: MemberVersion,
}

/// Authentication request with username/password credentials.
#[derive(Debug, Clone, PartialEq, Eq, HazelcastCodec)]
pub struct AuthenticationRequest {
    /// Client instance UUID.
    #[hazelcast(fixed)]
    pub uuid: Uuid,
    /// Serialization version the client speaks.
    #[hazelcast(fixed)]
    pub serialization_version: u8,
    /// Requested routing mode byte, if the client states one.
    #[hazelcast(fixed)]
    pub routing_mode: Option<u8>,
    /// Preference for sending CP requests to group leaders.
    #[hazelcast(fixed)]
    pub cp_direct_to_leader_routing: Option<bool>,
    /// Cluster the client expects to join.
    pub cluster_name: String,
    /// Username, if any.
    pub username: Option<String>,
    /// Password, if any.
    pub password: Option<String>,
    /// Client type string.
    pub client_type: String,
    /// Client library version.
    pub client_hazelcast_version: String,
    /// Client instance name.
    pub client_name: String,
    /// Client labels.
    pub labels: Vec<String>,
}

/// Authentication request with opaque token or custom credentials.
#[derive(Debug, Clone, PartialEq, Eq, HazelcastCodec)]
pub struct AuthenticationCustomRequest {
    /// Client instance UUID.
    #[hazelcast(fixed)]
    pub uuid: Uuid,
    /// Serialization version the client speaks.
    #[hazelcast(fixed)]
    pub serialization_version: u8,
    /// Requested routing mode byte, if the client states one.
    #[hazelcast(fixed)]
    pub routing_mode: Option<u8>,
    /// Preference for sending CP requests to group leaders.
    #[hazelcast(fixed)]
    pub cp_direct_to_leader_routing: Option<bool>,
    /// Cluster the client expects to join.
    pub cluster_name: String,
    /// Serialized credentials.
    pub credentials: Bytes,
    /// Client type string.
    pub client_type: String,
    /// Client library version.
    pub client_hazelcast_version: String,
    /// Client instance name.
    pub client_name: String,
    /// Client labels.
    pub labels: Vec<String>,
}

/// Authentication status byte: accepted.
pub const AUTHENTICATED: u8 = 0;
/// Authentication status byte: credentials rejected.
pub const CREDENTIALS_FAILED: u8 = 1;
/// Authentication status byte: serialization version mismatch.
pub const SERIALIZATION_VERSION_MISMATCH: u8 = 2;
/// Authentication status byte: member refuses this client.
pub const NOT_ALLOWED_IN_CLUSTER: u8 = 3;

/// Response to both authentication requests.
#[derive(Debug, Clone, PartialEq, Eq, HazelcastCodec)]
pub struct AuthenticationResponse {
    /// Zero on success.
    #[hazelcast(fixed)]
    pub status: u8,
    /// UUID of the member that answered.
    #[hazelcast(fixed)]
    pub member_uuid: Option<Uuid>,
    /// Serialization version of the member.
    #[hazelcast(fixed)]
    pub serialization_version: u8,
    /// Number of partitions in the cluster.
    #[hazelcast(fixed)]
    pub partition_count: i32,
    /// Cluster id; changes when the client lands on a different cluster.
    #[hazelcast(fixed)]
    pub cluster_id: Uuid,
    /// Whether the member allows failover clients.
    #[hazelcast(fixed)]
    pub failover_supported: bool,
    /// Version of the member list snapshot below.
    #[hazelcast(fixed)]
    pub member_list_version: i32,
    /// Version of the partition table snapshot below.
    #[hazelcast(fixed)]
    pub partition_list_version: i32,
    /// Address of the member that answered.
    pub address: Option<WireAddress>,
    /// Version string of the member.
    pub server_hazelcast_version: String,
    /// Member list snapshot.
    pub members: Vec<MemberInfo>,
    /// Partition table snapshot: owner UUID to partition ids.
    pub partitions: Vec<(Uuid, Vec<i32>)>,
    /// Free-form member attributes, e.g. `cluster.name`.
    pub key_value_pairs: HashMap<String, String>,
}

/// Payload of a member list push.
#[derive(Debug, Clone, PartialEq, Eq, HazelcastCodec)]
pub struct MembersViewPayload {
    /// Member list version.
    #[hazelcast(fixed)]
    pub version: i32,
    /// Every current member.
    pub members: Vec<MemberInfo>,
}

/// Payload of a partition table push.
#[derive(Debug, Clone, PartialEq, Eq, HazelcastCodec)]
pub struct PartitionsViewPayload {
    /// Partition table version.
    #[hazelcast(fixed)]
    pub version: i32,
    /// Owner UUID to partition ids.
    pub partitions: Vec<(Uuid, Vec<i32>)>,
}

/// `Client.Authentication`.
pub struct ClientAuthentication;

impl Operation for ClientAuthentication {
    const NAME: &'static str = "Client.Authentication";
    const REQUEST_MESSAGE_TYPE: i32 = CLIENT_AUTHENTICATION;
    const RESPONSE_MESSAGE_TYPE: i32 = CLIENT_AUTHENTICATION_RESPONSE;
    const RETRYABLE: bool = true;

    type Request = AuthenticationRequest;
    type Response = AuthenticationResponse;
}

/// `Client.AuthenticationCustom`.
pub struct ClientAuthenticationCustom;

impl Operation for ClientAuthenticationCustom {
    const NAME: &'static str = "Client.AuthenticationCustom";
    const REQUEST_MESSAGE_TYPE: i32 = CLIENT_AUTHENTICATION_CUSTOM;
    const RESPONSE_MESSAGE_TYPE: i32 = CLIENT_AUTHENTICATION_CUSTOM_RESPONSE;
    const RETRYABLE: bool = true;

    type Request = AuthenticationCustomRequest;
    type Response = AuthenticationResponse;
}

/// `Client.AddClusterViewListener`.
pub struct ClientAddClusterViewListener;

impl Operation for ClientAddClusterViewListener {
    const NAME: &'static str = "Client.AddClusterViewListener";
    const REQUEST_MESSAGE_TYPE: i32 = CLIENT_ADD_CLUSTER_VIEW_LISTENER;
    const RESPONSE_MESSAGE_TYPE: i32 = CLIENT_ADD_CLUSTER_VIEW_LISTENER_RESPONSE;
    const RETRYABLE: bool = false;

    type Request = ();
    type Response = ();
}

/// Member list push of `Client.AddClusterViewListener`.
pub struct MembersViewEvent;

impl Event for MembersViewEvent {
    const NAME: &'static str = "Client.AddClusterViewListener.MembersView";
    const MESSAGE_TYPE: i32 = CLIENT_MEMBERS_VIEW_EVENT;

    type Payload = MembersViewPayload;
}

/// Partition table push of `Client.AddClusterViewListener`.
pub struct PartitionsViewEvent;

impl Event for PartitionsViewEvent {
    const NAME: &'static str = "Client.AddClusterViewListener.PartitionsView";
    const MESSAGE_TYPE: i32 = CLIENT_PARTITIONS_VIEW_EVENT;

    type Payload = PartitionsViewPayload;
}

/// `Client.Ping`, the heartbeat.
pub struct ClientPing;

impl Operation for ClientPing {
    const NAME: &'static str = "Client.Ping";
    const REQUEST_MESSAGE_TYPE: i32 = CLIENT_PING;
    const RESPONSE_MESSAGE_TYPE: i32 = CLIENT_PING_RESPONSE;
    const RETRYABLE: bool = true;

    type Request = ();
    type Response = ();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ClientMessage, ClientMessageCodec, FrameCodec};
    use bytes::BytesMut;
    use tokio_util::codec::{Decoder, Encoder};

    fn member(port: i32) -> MemberInfo {
        let mut attributes = HashMap::new();
        attributes.insert("zone".to_string(), "a".to_string());
        MemberInfo {
            uuid: Uuid::new_v4(),
            lite_member: port % 2 == 0,
            address: WireAddress::new("127.0.0.1", port),
            attributes,
            version: MemberVersion {
                major: 5,
                minor: 5,
                patch: 0,
            },
        }
    }

    fn over_the_wire(message: ClientMessage) -> ClientMessage {
        let mut codec = ClientMessageCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(message, &mut buf).unwrap();
        codec.decode(&mut buf).unwrap().unwrap()
    }

    #[test]
    fn test_authentication_request_through_codec() {
        let request = AuthenticationRequest {
            uuid: Uuid::new_v4(),
            serialization_version: 1,
            routing_mode: Some(1),
            cp_direct_to_leader_routing: None,
            cluster_name: "dev".to_string(),
            username: Some("admin".to_string()),
            password: None,
            client_type: "RST".to_string(),
            client_hazelcast_version: "0.3.0".to_string(),
            client_name: "hz.client_1".to_string(),
            labels: vec!["blue".to_string(), String::new()],
        };

        let message = ClientAuthentication::encode_request(&request);
        assert_eq!(
            message.initial_frame().unwrap().content.len(),
            REQUEST_HEADER_SIZE + UUID_SIZE_IN_BYTES + 1 + 2 + 2
        );

        let decoded = ClientAuthentication::decode_request(&over_the_wire(message)).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_custom_authentication_carries_credentials() {
        let request = AuthenticationCustomRequest {
            uuid: Uuid::new_v4(),
            serialization_version: 1,
            routing_mode: None,
            cp_direct_to_leader_routing: Some(true),
            cluster_name: "dev".to_string(),
            credentials: Bytes::from_static(b"token-bytes"),
            client_type: "RST".to_string(),
            client_hazelcast_version: "0.3.0".to_string(),
            client_name: "hz.client_2".to_string(),
            labels: Vec::new(),
        };

        let message = ClientAuthenticationCustom::encode_request(&request);
        assert_eq!(message.message_type(), Some(CLIENT_AUTHENTICATION_CUSTOM));
        let decoded = ClientAuthenticationCustom::decode_request(&message).unwrap();
        assert_eq!(decoded.credentials, request.credentials);
        assert_eq!(decoded.routing_mode, None);
    }

    #[test]
    fn test_authentication_response_with_snapshots() {
        let members = vec![member(5701), member(5702)];
        let mut key_value_pairs = HashMap::new();
        key_value_pairs.insert("cluster.name".to_string(), "dev".to_string());
        let response = AuthenticationResponse {
            status: AUTHENTICATED,
            member_uuid: Some(members[0].uuid),
            serialization_version: 1,
            partition_count: 271,
            cluster_id: Uuid::new_v4(),
            failover_supported: false,
            member_list_version: 3,
            partition_list_version: 7,
            address: Some(WireAddress::new("127.0.0.1", 5701)),
            server_hazelcast_version: "5.5.0".to_string(),
            partitions: vec![(members[0].uuid, vec![0, 2]), (members[1].uuid, vec![1])],
            members,
            key_value_pairs,
        };

        let mut message = ClientAuthentication::encode_response(&response);
        message.set_correlation_id(99);
        let decoded_message = over_the_wire(message);
        assert_eq!(decoded_message.correlation_id(), Some(99));

        let decoded = ClientAuthentication::decode_response(&decoded_message).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn test_data_structure_skips_unknown_trailing_frames() {
        let address = WireAddress::new("10.0.0.1", 5701);
        let mut message = ClientMessage::new();
        address.encode_frames(&mut message);

        // Simulate a newer member appending a field to the structure.
        let mut frames = message.frames().to_vec();
        let end = frames.pop().unwrap();
        frames.push(crate::protocol::Frame::with_content(BytesMut::from(
            &b"extra"[..],
        )));
        frames.push(end);
        frames.push(crate::protocol::Frame::with_content(BytesMut::from(
            &b"next"[..],
        )));
        let extended = ClientMessage::from_frames(frames);

        let mut iter = extended.frame_iter();
        assert_eq!(WireAddress::decode_frames(&mut iter).unwrap(), address);
        assert_eq!(String::decode_frames(&mut iter).unwrap(), "next");
    }

    #[test]
    fn test_members_view_event() {
        let payload = MembersViewPayload {
            version: 4,
            members: vec![member(5701)],
        };

        let message = MembersViewEvent::encode_event(&payload, PARTITION_ID_ANY);
        assert!(message.is_event());
        assert_eq!(MembersViewEvent::decode_event(&message).unwrap(), payload);
    }

    #[test]
    fn test_address_display() {
        assert_eq!(WireAddress::new("127.0.0.1", 5701).to_string(), "127.0.0.1:5701");
        assert_eq!(WireAddress::new("::1", 5701).to_string(), "[::1]:5701");
    }

    #[test]
    fn test_empty_requests_and_responses() {
        let ping = over_the_wire(ClientPing::encode_request(&()));
        ClientPing::decode_request(&ping).unwrap();
        assert!(ClientPing::decode_response(&ping).is_err());
        ClientPing::decode_response(&ClientPing::encode_response(&())).unwrap();

        let view = over_the_wire(ClientAddClusterViewListener::encode_request(&()));
        assert_eq!(
            view.message_type(),
            Some(ClientAddClusterViewListener::REQUEST_MESSAGE_TYPE)
        );
        ClientAddClusterViewListener::decode_request(&view).unwrap();
        ClientAddClusterViewListener::decode_response(
            &ClientAddClusterViewListener::encode_response(&()),
        )
        .unwrap();
    }
}
