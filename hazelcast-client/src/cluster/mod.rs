//! Cluster view: members, partitions and the listener that keeps them current.

mod cluster_service;
mod membership;
mod partition_service;
mod view_listener;

pub use cluster_service::ClusterService;
pub use membership::{Member, MemberEvent, MemberEventType};
pub use partition_service::PartitionService;

pub(crate) use view_listener::ClusterViewListener;
