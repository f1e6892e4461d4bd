//! Messaging access policy.
//!
//! A sender may message a receiver on an order only when one of them is the
//! order's client and the other holds an active assignment on that order.

use std::sync::Arc;

use crate::store::{Directory, StoreError};

#[derive(Clone)]
pub struct AccessPolicy {
    directory: Arc<dyn Directory>,
}

impl AccessPolicy {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }

    /// Evaluate one (sender, receiver, order) triple at `now`.
    ///
    /// Re-reads the order and assignments on every call; callers must not
    /// cache the answer across receivers.
    pub fn is_authorized(
        &self,
        sender_id: u64,
        receiver_id: u64,
        order_id: u64,
        now: u64,
    ) -> Result<bool, StoreError> {
        let Some(order) = self.directory.order(order_id)? else {
            return Ok(false);
        };

        if sender_id == receiver_id {
            return Ok(false);
        }

        if order.client_id == sender_id {
            return self
                .directory
                .has_active_assignment(order_id, receiver_id, now);
        }
        if order.client_id == receiver_id {
            return self
                .directory
                .has_active_assignment(order_id, sender_id, now);
        }
        Ok(false)
    }
}
