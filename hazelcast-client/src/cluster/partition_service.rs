//! Partition table and key-to-partition mapping.

use std::collections::HashMap;

use hazelcast_core::protocol::compute_partition_hash;
use parking_lot::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct PartitionTable {
    partition_count: i32,
    version: Option<i32>,
    owners: HashMap<i32, Uuid>,
}

/// Tracks which member owns each partition.
#[derive(Debug, Default)]
pub struct PartitionService {
    state: RwLock<PartitionTable>,
}

impl PartitionService {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the number of partitions, or zero before the first connection.
    pub fn partition_count(&self) -> i32 {
        self.state.read().partition_count
    }

    /// Returns the version of the current partition table.
    pub fn partition_table_version(&self) -> Option<i32> {
        self.state.read().version
    }

    /// Maps serialized key bytes to a partition id.
    ///
    /// Returns `None` while the partition count is unknown.
    pub fn partition_id(&self, key: &[u8]) -> Option<i32> {
        let count = self.partition_count();
        if count <= 0 {
            return None;
        }
        Some(hash_to_index(compute_partition_hash(key), count))
    }

    /// Returns the owner of a partition, if known.
    pub fn partition_owner(&self, partition_id: i32) -> Option<Uuid> {
        self.state.read().owners.get(&partition_id).copied()
    }

    /// Records the partition count reported on authentication.
    pub(crate) fn set_partition_count(&self, count: i32) {
        let mut state = self.state.write();
        if state.partition_count != count {
            if state.partition_count != 0 {
                tracing::warn!(
                    previous = state.partition_count,
                    count,
                    "partition count changed"
                );
            }
            state.partition_count = count;
        }
    }

    /// Applies a partition table unless it is older than or equal to the current one.
    pub(crate) fn apply_partition_table(&self, version: i32, partitions: &[(Uuid, Vec<i32>)]) -> bool {
        let mut state = self.state.write();
        if state.version.is_some_and(|current| current >= version) {
            return false;
        }
        state.owners = partitions
            .iter()
            .flat_map(|(owner, ids)| ids.iter().map(move |id| (*id, *owner)))
            .collect();
        state.version = Some(version);
        tracing::debug!(version, partitions = state.owners.len(), "applied partition table");
        true
    }

    /// Forgets the partition table and count.
    pub(crate) fn reset(&self) {
        *self.state.write() = PartitionTable::default();
    }
}

fn hash_to_index(hash: i32, length: i32) -> i32 {
    if hash == i32::MIN {
        0
    } else {
        hash.abs() % length
    }
}
