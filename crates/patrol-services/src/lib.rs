//! patrol-services — stores, access policy, validation, notification, and
//! the multi-recipient dispatch engine.

pub mod access;
pub mod dispatch;
pub mod memory_store;
pub mod notify;
pub mod sqlite_store;
pub mod store;
pub mod validation;

pub use access::AccessPolicy;
pub use dispatch::{
    conversation_id, DispatchError, DispatchOutcome, Dispatcher, FailedConversation,
    FailureReason, SendError, SentMessage, SuccessfulConversation,
};
pub use memory_store::{MemoryDirectory, MemoryMessageStore};
pub use notify::{BroadcastNotifier, NotifyError, Notifier};
pub use sqlite_store::SqliteStore;
pub use store::{Directory, DirectoryCounts, MessageRepository, StoreError};
pub use validation::{MultiSendRequest, SingleSendRequest, Violation};
