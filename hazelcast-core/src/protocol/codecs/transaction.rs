//! XA transaction operations.

use hazelcast_derive::HazelcastCodec;
use uuid::Uuid;

use crate::protocol::constants::*;
use crate::protocol::operation::Operation;

/// Identifies the transaction to roll back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, HazelcastCodec)]
pub struct RollbackRequest {
    /// Transaction id.
    #[hazelcast(fixed)]
    pub transaction_id: Uuid,
}

/// `XATransaction.Rollback`. Not retryable: a lost rollback must not run twice.
pub struct XaTransactionRollback;

impl Operation for XaTransactionRollback {
    const NAME: &'static str = "XATransaction.Rollback";
    const REQUEST_MESSAGE_TYPE: i32 = XA_TRANSACTION_ROLLBACK;
    const RESPONSE_MESSAGE_TYPE: i32 = XA_TRANSACTION_ROLLBACK_RESPONSE;
    const RETRYABLE: bool = false;

    type Request = RollbackRequest;
    type Response = ();
}
