//! Repository seams over the relational store.
//!
//! `Directory` answers who is who: users, service orders, and task
//! assignments. `MessageRepository` is insert-only message persistence.
//! Both are object-safe so the daemon can pick a backend at startup.

use patrol_core::model::{
    Message, NewAssignment, NewMessage, OrderStatus, Role, ServiceOrder, TaskAssignment, User,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

/// Row counts, reported by `/status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectoryCounts {
    pub users: usize,
    pub orders: usize,
    pub assignments: usize,
}

/// Identity and authorization data source.
pub trait Directory: Send + Sync {
    fn register_user(&self, name: &str, role: Role) -> Result<User, StoreError>;

    fn user(&self, id: u64) -> Result<Option<User>, StoreError>;

    /// Open a new pending order. The client must exist and have the client role.
    fn create_order(&self, client_id: u64) -> Result<ServiceOrder, StoreError>;

    fn order(&self, id: u64) -> Result<Option<ServiceOrder>, StoreError>;

    fn set_order_status(&self, id: u64, status: OrderStatus) -> Result<ServiceOrder, StoreError>;

    /// Assign an agent to an order. See [`check_new_assignment`].
    fn assign_agent(&self, new: NewAssignment) -> Result<TaskAssignment, StoreError>;

    /// Mark an assignment removed. Assignments are never deleted.
    fn remove_assignment(&self, id: u64) -> Result<TaskAssignment, StoreError>;

    fn assignments_for_order(&self, order_id: u64) -> Result<Vec<TaskAssignment>, StoreError>;

    /// True if `agent_id` holds at least one active assignment on `order_id` at `now`.
    fn has_active_assignment(
        &self,
        order_id: u64,
        agent_id: u64,
        now: u64,
    ) -> Result<bool, StoreError>;

    fn counts(&self) -> Result<DirectoryCounts, StoreError>;
}

/// Insert-only message persistence.
pub trait MessageRepository: Send + Sync {
    /// Persist a new message and return it with its assigned id.
    fn insert(&self, new: NewMessage) -> Result<Message, StoreError>;

    /// All messages on an order, in insertion order.
    fn for_order(&self, order_id: u64) -> Result<Vec<Message>, StoreError>;

    /// Messages exchanged between `a` and `b` on an order, in insertion order.
    fn conversation(&self, order_id: u64, a: u64, b: u64) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .for_order(order_id)?
            .into_iter()
            .filter(|m| {
                (m.sender_id == a && m.receiver_id == b) || (m.sender_id == b && m.receiver_id == a)
            })
            .collect())
    }

    fn count(&self) -> Result<usize, StoreError>;
}

// ── Shared preconditions ──────────────────────────────────────────────────────

/// The client of a new order must exist and be a client.
pub fn check_order_client<D: Directory + ?Sized>(dir: &D, client_id: u64) -> Result<(), StoreError> {
    match dir.user(client_id)? {
        None => Err(StoreError::NotFound("client")),
        Some(user) if user.role != Role::Client => {
            Err(StoreError::Conflict(format!("user {client_id} is not a client")))
        }
        Some(_) => Ok(()),
    }
}

/// An assignment needs an existing order, an existing agent, a sane window,
/// and a point on the globe.
pub fn check_new_assignment<D: Directory + ?Sized>(
    dir: &D,
    new: &NewAssignment,
) -> Result<(), StoreError> {
    if dir.order(new.order_id)?.is_none() {
        return Err(StoreError::NotFound("order"));
    }
    match dir.user(new.agent_id)? {
        None => return Err(StoreError::NotFound("agent")),
        Some(user) if user.role != Role::Agent => {
            return Err(StoreError::Conflict(format!(
                "user {} is not an agent",
                new.agent_id
            )))
        }
        Some(_) => {}
    }
    if let (Some(start), Some(end)) = (new.starts_at, new.ends_at) {
        if end <= start {
            return Err(StoreError::Conflict(
                "assignment must end after it starts".to_string(),
            ));
        }
    }
    if !new.point.is_valid() {
        return Err(StoreError::Conflict(
            "assignment point is outside valid coordinates".to_string(),
        ));
    }
    Ok(())
}
