//! Multi-recipient message dispatch.
//!
//! One sender, one order, many receivers, one body. The sender and order
//! tokens gate the whole call; every receiver after that succeeds or fails
//! on its own and lands in exactly one list of the outcome.

use std::collections::HashSet;
use std::sync::Arc;

use patrol_core::codec::{EntityType, IdCodec};
use patrol_core::config::MessagingSettings;
use patrol_core::model::{now_millis, Message, NewMessage};
use serde::Serialize;

use crate::access::AccessPolicy;
use crate::notify::Notifier;
use crate::store::{Directory, MessageRepository, StoreError};
use crate::validation::{validate_content, Violation};

// ── Outcome ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    InvalidReceiverId,
    Unauthorized,
    StorageError,
}

impl FailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidReceiverId => "invalid_receiver_id",
            Self::Unauthorized => "unauthorized",
            Self::StorageError => "storage_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuccessfulConversation {
    pub conversation_id: String,
    /// The receiver token exactly as submitted.
    pub receiver_id: String,
    #[serde(skip)]
    pub message_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedConversation {
    pub receiver_id: String,
    pub error: FailureReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    pub total_sent: usize,
    pub total_failed: usize,
    #[serde(rename = "successful_conversations")]
    pub successful: Vec<SuccessfulConversation>,
    #[serde(rename = "failed_conversations")]
    pub failed: Vec<FailedConversation>,
}

impl DispatchOutcome {
    fn succeed(&mut self, entry: SuccessfulConversation) {
        self.total_sent += 1;
        self.successful.push(entry);
    }

    fn fail(&mut self, receiver_id: &str, error: FailureReason) {
        self.total_failed += 1;
        self.failed.push(FailedConversation {
            receiver_id: receiver_id.to_string(),
            error,
        });
    }

    /// Human-readable one-liner for API responses.
    pub fn summary(&self) -> String {
        match (self.total_sent, self.total_failed) {
            (0, 0) => "no receivers".to_string(),
            (sent, 0) => format!("{sent} message(s) sent"),
            (sent, failed) => format!("{sent} message(s) sent, {failed} failed"),
        }
    }
}

/// Stored result of a single send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub message: Message,
    pub conversation_id: String,
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Whole-call failures of a multi-recipient dispatch. Nothing is stored.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("malformed request ({} violation(s))", .0.len())]
    Malformed(Vec<Violation>),
    #[error("invalid identifier: {field}")]
    InvalidIdentifier { field: &'static str },
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("malformed request ({} violation(s))", .0.len())]
    Malformed(Vec<Violation>),
    #[error("invalid identifier: {field}")]
    InvalidIdentifier { field: &'static str },
    #[error("sender may not message this receiver on this order")]
    Unauthorized,
    #[error(transparent)]
    Storage(#[from] StoreError),
}

// ── Conversation id ───────────────────────────────────────────────────────────

/// Stable id for the (order, participants) scope. Symmetric in `a` and `b`.
pub fn conversation_id(order_id: u64, a: u64, b: u64) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut h = blake3::Hasher::new_derive_key("patrol 2024 conversation id");
    h.update(&order_id.to_le_bytes());
    h.update(&lo.to_le_bytes());
    h.update(&hi.to_le_bytes());
    hex::encode(&h.finalize().as_bytes()[..16])
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

enum ReceiverResult {
    Sent(Message),
    Failed(FailureReason),
}

#[derive(Clone)]
pub struct Dispatcher {
    codec: Arc<IdCodec>,
    access: AccessPolicy,
    messages: Arc<dyn MessageRepository>,
    notifier: Arc<dyn Notifier>,
    settings: MessagingSettings,
}

impl Dispatcher {
    pub fn new(
        codec: Arc<IdCodec>,
        directory: Arc<dyn Directory>,
        messages: Arc<dyn MessageRepository>,
        notifier: Arc<dyn Notifier>,
        settings: MessagingSettings,
    ) -> Self {
        Self {
            codec,
            access: AccessPolicy::new(directory),
            messages,
            notifier,
            settings,
        }
    }

    fn decode(&self, token: &str, entity: EntityType) -> Option<u64> {
        self.codec.decode(token, entity).ok()
    }

    /// Send `content` from `sender_token` to every receiver on `order_token`.
    ///
    /// Receivers are processed in submission order. A receiver token seen
    /// before (or decoding to an id seen before) is skipped.
    pub fn dispatch(
        &self,
        sender_token: &str,
        order_token: &str,
        receiver_tokens: &[String],
        content: &str,
    ) -> Result<DispatchOutcome, DispatchError> {
        if let Some(violation) = validate_content(content, self.settings.multi_send_max_chars) {
            return Err(DispatchError::Malformed(vec![violation]));
        }
        let sender_id = self
            .decode(sender_token, EntityType::User)
            .ok_or(DispatchError::InvalidIdentifier { field: "sender_id" })?;
        let order_id = self
            .decode(order_token, EntityType::Order)
            .ok_or(DispatchError::InvalidIdentifier { field: "order_id" })?;

        let mut outcome = DispatchOutcome::default();
        if receiver_tokens.is_empty() {
            return Ok(outcome);
        }

        let mut seen_ids: HashSet<u64> = HashSet::new();
        let mut seen_invalid: HashSet<&str> = HashSet::new();
        let mut last_sent_at = 0u64;

        for token in receiver_tokens {
            let Some(receiver_id) = self.decode(token, EntityType::User) else {
                if seen_invalid.insert(token.as_str()) {
                    tracing::debug!(order_id, "receiver token failed to decode");
                    outcome.fail(token, FailureReason::InvalidReceiverId);
                }
                continue;
            };
            if !seen_ids.insert(receiver_id) {
                continue;
            }

            let sent_at = now_millis().max(last_sent_at);
            match self.deliver(sender_id, receiver_id, order_id, content, sent_at) {
                ReceiverResult::Sent(message) => {
                    last_sent_at = message.sent_at;
                    outcome.succeed(SuccessfulConversation {
                        conversation_id: conversation_id(order_id, sender_id, receiver_id),
                        receiver_id: token.clone(),
                        message_id: message.id,
                    });
                }
                ReceiverResult::Failed(reason) => outcome.fail(token, reason),
            }
        }

        tracing::info!(
            sender_id,
            order_id,
            total_sent = outcome.total_sent,
            total_failed = outcome.total_failed,
            "multi-recipient dispatch complete"
        );
        Ok(outcome)
    }

    /// Authorize, store, notify. Never fails the enclosing dispatch.
    fn deliver(
        &self,
        sender_id: u64,
        receiver_id: u64,
        order_id: u64,
        content: &str,
        sent_at: u64,
    ) -> ReceiverResult {
        match self.access.is_authorized(sender_id, receiver_id, order_id, now_millis()) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(sender_id, receiver_id, order_id, "receiver not authorized");
                return ReceiverResult::Failed(FailureReason::Unauthorized);
            }
            Err(e) => {
                tracing::warn!(receiver_id, order_id, error = %e, "authorization lookup failed");
                return ReceiverResult::Failed(FailureReason::StorageError);
            }
        }

        let new = NewMessage {
            sender_id,
            receiver_id,
            order_id,
            content: content.to_string(),
            sent_at,
        };
        match self.messages.insert(new) {
            Ok(message) => {
                self.notify(&message);
                ReceiverResult::Sent(message)
            }
            Err(e) => {
                tracing::warn!(receiver_id, order_id, error = %e, "message insert failed");
                ReceiverResult::Failed(FailureReason::StorageError)
            }
        }
    }

    fn notify(&self, message: &Message) {
        if let Err(e) = self.notifier.notify(message) {
            tracing::warn!(message_id = message.id, error = %e, "notification failed");
        }
    }

    /// Send to exactly one receiver. Unlike `dispatch`, every failure is a
    /// whole-call error.
    pub fn send_one(
        &self,
        sender_token: &str,
        order_token: &str,
        receiver_token: &str,
        content: &str,
    ) -> Result<SentMessage, SendError> {
        if let Some(violation) = validate_content(content, self.settings.single_send_max_chars) {
            return Err(SendError::Malformed(vec![violation]));
        }
        let sender_id = self
            .decode(sender_token, EntityType::User)
            .ok_or(SendError::InvalidIdentifier { field: "sender_id" })?;
        let order_id = self
            .decode(order_token, EntityType::Order)
            .ok_or(SendError::InvalidIdentifier { field: "order_id" })?;
        let receiver_id = self
            .decode(receiver_token, EntityType::User)
            .ok_or(SendError::InvalidIdentifier { field: "receiver_id" })?;

        if !self
            .access
            .is_authorized(sender_id, receiver_id, order_id, now_millis())?
        {
            return Err(SendError::Unauthorized);
        }

        let message = self.messages.insert(NewMessage {
            sender_id,
            receiver_id,
            order_id,
            content: content.to_string(),
            sent_at: now_millis(),
        })?;
        self.notify(&message);

        tracing::info!(sender_id, receiver_id, order_id, message_id = message.id, "message sent");
        Ok(SentMessage {
            conversation_id: conversation_id(order_id, sender_id, receiver_id),
            message,
        })
    }
}
