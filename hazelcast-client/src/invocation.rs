//! Routes requests to connections and retries them within the invocation timeout.

use std::sync::Arc;
use std::time::Duration;

use hazelcast_core::protocol::Operation;
use hazelcast_core::{ClientMessage, HazelcastError, Result};
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::{ReconnectMode, RoutingMode};
use crate::connection::{Connection, ConnectionManager};

/// Where a request is sent.
#[derive(Debug, Clone)]
pub enum InvocationTarget {
    /// Any live connection.
    Any,
    /// The owner of a partition, or any connection if the owner is not connected.
    Partition(i32),
    /// A specific member.
    Member(Uuid),
    /// A specific connection. Never retried elsewhere.
    Connection(Arc<Connection>),
}

/// Whether a failed attempt may be sent again.
///
/// A request that never left the client is always retried. One lost in
/// flight is retried only if the operation is retryable or redo is enabled.
fn should_retry(error: &HazelcastError, retryable: bool, redo_operation: bool) -> bool {
    match error {
        HazelcastError::ClientNotActive(_) | HazelcastError::ClientOffline(_) => false,
        e if e.is_retryable_before_send() => true,
        e if e.is_connection_lost() => retryable || redo_operation,
        _ => false,
    }
}

/// Sends operations through the connection manager.
#[derive(Debug, Clone)]
pub struct InvocationService {
    manager: Arc<ConnectionManager>,
    timeout: Duration,
    retry_pause: Duration,
    redo_operation: bool,
}

impl InvocationService {
    pub(crate) fn new(manager: Arc<ConnectionManager>) -> Self {
        let config = Arc::clone(manager.config());
        Self {
            manager,
            timeout: config.invocation_timeout(),
            retry_pause: config.invocation_retry_pause(),
            redo_operation: config.network().redo_operation(),
        }
    }

    /// Encodes, sends and decodes one operation.
    ///
    /// A response that cannot be decoded closes the connection it came from.
    pub async fn invoke<Op: Operation>(
        &self,
        request: &Op::Request,
        target: InvocationTarget,
    ) -> Result<Op::Response> {
        let message = match target {
            InvocationTarget::Partition(partition_id) => {
                Op::encode_request_on_partition(request, partition_id)
            }
            _ => Op::encode_request(request),
        };
        let (connection, response) = self.invoke_message(message, target).await?;
        Op::decode_response(&response).map_err(|e| {
            tracing::warn!(
                connection = %connection.id(),
                operation = Op::NAME,
                error = %e,
                "undecodable response, closing connection"
            );
            connection.close(format!("undecodable response: {}", e));
            e
        })
    }

    /// Sends an encoded request, retrying until the invocation timeout.
    ///
    /// Returns the connection that answered together with the response.
    pub async fn invoke_message(
        &self,
        message: ClientMessage,
        target: InvocationTarget,
    ) -> Result<(Arc<Connection>, ClientMessage)> {
        let deadline = Instant::now() + self.timeout;
        let retryable = message.is_retryable();
        let pinned = matches!(target, InvocationTarget::Connection(_));
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let result = match self.select_connection(&target) {
                Ok(connection) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    connection
                        .invoke_with_timeout(message.clone(), remaining)
                        .await
                        .map(|response| (connection, response))
                }
                Err(e) => Err(e),
            };

            let error = match result {
                Ok(answered) => return Ok(answered),
                Err(e) => e,
            };
            if pinned || !should_retry(&error, retryable, self.redo_operation) {
                return Err(error);
            }

            if Instant::now() + self.retry_pause >= deadline {
                return Err(HazelcastError::Timeout(format!(
                    "{} gave up after {} attempts within {:?}: {}",
                    message.operation_name().unwrap_or("invocation"),
                    attempt,
                    self.timeout,
                    error
                )));
            }
            tracing::debug!(
                operation = message.operation_name().unwrap_or("invocation"),
                attempt,
                error = %error,
                "retrying invocation"
            );
            tokio::time::sleep(self.retry_pause).await;
        }
    }

    fn select_connection(&self, target: &InvocationTarget) -> Result<Arc<Connection>> {
        if self.manager.is_shutdown() {
            return Err(HazelcastError::ClientNotActive("client closed".to_string()));
        }

        let selected = match target {
            InvocationTarget::Any => self.manager.random_connection(),
            InvocationTarget::Partition(partition_id) => {
                let owner = if self.manager.routing_mode() == RoutingMode::AllMembers {
                    self.manager
                        .partition_service()
                        .partition_owner(*partition_id)
                        .and_then(|owner| self.manager.connection_for_member(&owner))
                } else {
                    None
                };
                owner.or_else(|| self.manager.random_connection())
            }
            InvocationTarget::Member(uuid) => {
                return self.manager.connection_for_member(uuid).ok_or_else(|| {
                    HazelcastError::Connection(format!("no connection to member {}", uuid))
                });
            }
            InvocationTarget::Connection(connection) => {
                return if connection.is_alive() {
                    Ok(Arc::clone(connection))
                } else {
                    Err(HazelcastError::Connection(format!("{} is closed", connection)))
                };
            }
        };

        match selected {
            Some(connection) => Ok(connection),
            None if self.manager.reconnect_mode() == ReconnectMode::Async => Err(
                HazelcastError::ClientOffline("client is disconnected from the cluster".to_string()),
            ),
            None => Err(HazelcastError::Connection(
                "no connection to the cluster is available".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfigBuilder;
    use hazelcast_core::protocol::codecs::client::ClientPing;

    #[test]
    fn test_never_sent_is_always_retried() {
        let error = HazelcastError::Connection("refused".to_string());
        assert!(should_retry(&error, false, false));
    }

    #[test]
    fn test_lost_in_flight_requires_retryable_or_redo() {
        let error = HazelcastError::ConnectionLost("reset".to_string());
        assert!(!should_retry(&error, false, false));
        assert!(should_retry(&error, true, false));
        assert!(should_retry(&error, false, true));
    }

    #[test]
    fn test_terminal_errors_are_not_retried() {
        assert!(!should_retry(&HazelcastError::ClientNotActive("closed".into()), true, true));
        assert!(!should_retry(&HazelcastError::ClientOffline("offline".into()), true, true));
        assert!(!should_retry(&HazelcastError::Timeout("slow".into()), true, true));
        let server = HazelcastError::Server {
            error_code: 6,
            class_name: "com.hazelcast.core.HazelcastException".to_string(),
            message: None,
        };
        assert!(!should_retry(&server, true, true));
    }

    #[tokio::test]
    async fn test_invoke_on_shut_down_manager() {
        let manager = ConnectionManager::new(ClientConfigBuilder::new().build().unwrap());
        manager.shutdown().await;
        let service = InvocationService::new(manager);

        let err = service
            .invoke::<ClientPing>(&(), InvocationTarget::Any)
            .await
            .unwrap_err();
        assert!(matches!(err, HazelcastError::ClientNotActive(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnected_invocation_times_out() {
        let config = ClientConfigBuilder::new()
            .invocation_timeout(Duration::from_secs(3))
            .invocation_retry_pause(Duration::from_secs(1))
            .build()
            .unwrap();
        let manager = ConnectionManager::new(config);
        let service = InvocationService::new(manager);

        let err = service
            .invoke::<ClientPing>(&(), InvocationTarget::Any)
            .await
            .unwrap_err();
        assert!(matches!(err, HazelcastError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_async_reconnect_mode_fails_fast_when_offline() {
        let config = ClientConfigBuilder::new()
            .connection_strategy(|s| s.reconnect_mode(ReconnectMode::Async))
            .build()
            .unwrap();
        let manager = ConnectionManager::new(config);
        let service = InvocationService::new(manager);

        let err = service
            .invoke::<ClientPing>(&(), InvocationTarget::Any)
            .await
            .unwrap_err();
        assert!(matches!(err, HazelcastError::ClientOffline(_)));
    }
}
