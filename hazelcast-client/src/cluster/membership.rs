//! Cluster members and membership change events.

use std::collections::HashMap;

use hazelcast_core::protocol::codecs::client::{MemberInfo, MemberVersion};
use hazelcast_core::Result;
use uuid::Uuid;

use crate::connection::Address;

/// Type of membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberEventType {
    /// A member joined the cluster.
    Added,
    /// A member left the cluster.
    Removed,
}

impl std::fmt::Display for MemberEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Added => write!(f, "ADDED"),
            Self::Removed => write!(f, "REMOVED"),
        }
    }
}

/// A member of the cluster, as reported in the member list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    uuid: Uuid,
    address: Address,
    attributes: HashMap<String, String>,
    lite_member: bool,
    version: MemberVersion,
}

impl Member {
    /// Creates a member with no attributes.
    pub fn new(uuid: Uuid, address: Address) -> Self {
        Self {
            uuid,
            address,
            attributes: HashMap::new(),
            lite_member: false,
            version: MemberVersion::default(),
        }
    }

    /// Converts a member list entry.
    pub fn from_info(info: &MemberInfo) -> Result<Self> {
        Ok(Self {
            uuid: info.uuid,
            address: Address::from_wire(&info.address)?,
            attributes: info.attributes.clone(),
            lite_member: info.lite_member,
            version: info.version,
        })
    }

    /// Adds an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Returns the member's UUID.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Returns the client-facing address.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Returns the member's attributes.
    pub fn attributes(&self) -> &HashMap<String, String> {
        &self.attributes
    }

    /// Returns the value of one attribute.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Returns whether this is a lite member.
    pub fn is_lite_member(&self) -> bool {
        self.lite_member
    }

    /// Returns the member's codebase version.
    pub fn version(&self) -> MemberVersion {
        self.version
    }
}

impl std::fmt::Display for Member {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Member[uuid={}, address={}]", self.uuid, self.address)
    }
}

/// A member joined or left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberEvent {
    /// The member concerned.
    pub member: Member,
    /// The type of change.
    pub event_type: MemberEventType,
}

impl MemberEvent {
    /// Creates an event for a member that joined.
    pub fn member_added(member: Member) -> Self {
        Self {
            member,
            event_type: MemberEventType::Added,
        }
    }

    /// Creates an event for a member that left.
    pub fn member_removed(member: Member) -> Self {
        Self {
            member,
            event_type: MemberEventType::Removed,
        }
    }
}

impl std::fmt::Display for MemberEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MemberEvent[{} {}]", self.member, self.event_type)
    }
}
