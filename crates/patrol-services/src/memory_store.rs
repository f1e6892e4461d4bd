use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use patrol_core::model::{
    now_millis, Message, NewAssignment, NewMessage, OrderStatus, Role, ServiceOrder,
    TaskAssignment, User,
};

use crate::store::{
    check_new_assignment, check_order_client, Directory, DirectoryCounts, MessageRepository,
    StoreError,
};

/// Monotonic id source. First id handed out is 1.
#[derive(Clone, Default)]
struct IdSequence(Arc<AtomicU64>);

impl IdSequence {
    fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

// ── Directory ─────────────────────────────────────────────────────────────────

/// In-memory directory of users, orders, and assignments.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    users: Arc<DashMap<u64, User>>,
    orders: Arc<DashMap<u64, ServiceOrder>>,
    assignments: Arc<DashMap<u64, TaskAssignment>>,
    user_ids: IdSequence,
    order_ids: IdSequence,
    assignment_ids: IdSequence,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Directory for MemoryDirectory {
    fn register_user(&self, name: &str, role: Role) -> Result<User, StoreError> {
        let user = User {
            id: self.user_ids.next(),
            name: name.to_string(),
            role,
            created_at: now_millis(),
        };
        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn user(&self, id: u64) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    fn create_order(&self, client_id: u64) -> Result<ServiceOrder, StoreError> {
        check_order_client(self, client_id)?;
        let order = ServiceOrder {
            id: self.order_ids.next(),
            client_id,
            status: OrderStatus::Pending,
            created_at: now_millis(),
        };
        self.orders.insert(order.id, order.clone());
        Ok(order)
    }

    fn order(&self, id: u64) -> Result<Option<ServiceOrder>, StoreError> {
        Ok(self.orders.get(&id).map(|o| o.clone()))
    }

    fn set_order_status(&self, id: u64, status: OrderStatus) -> Result<ServiceOrder, StoreError> {
        let mut order = self
            .orders
            .get_mut(&id)
            .ok_or(StoreError::NotFound("order"))?;
        order.status = status;
        Ok(order.clone())
    }

    fn assign_agent(&self, new: NewAssignment) -> Result<TaskAssignment, StoreError> {
        check_new_assignment(self, &new)?;
        let assignment = TaskAssignment {
            id: self.assignment_ids.next(),
            order_id: new.order_id,
            agent_id: new.agent_id,
            starts_at: new.starts_at,
            ends_at: new.ends_at,
            point: new.point,
            removed: false,
        };
        self.assignments.insert(assignment.id, assignment.clone());
        Ok(assignment)
    }

    fn remove_assignment(&self, id: u64) -> Result<TaskAssignment, StoreError> {
        let mut assignment = self
            .assignments
            .get_mut(&id)
            .ok_or(StoreError::NotFound("assignment"))?;
        assignment.removed = true;
        Ok(assignment.clone())
    }

    fn assignments_for_order(&self, order_id: u64) -> Result<Vec<TaskAssignment>, StoreError> {
        let mut found: Vec<TaskAssignment> = self
            .assignments
            .iter()
            .filter(|a| a.order_id == order_id)
            .map(|a| a.clone())
            .collect();
        found.sort_by_key(|a| a.id);
        Ok(found)
    }

    fn has_active_assignment(
        &self,
        order_id: u64,
        agent_id: u64,
        now: u64,
    ) -> Result<bool, StoreError> {
        Ok(self
            .assignments
            .iter()
            .any(|a| a.order_id == order_id && a.agent_id == agent_id && a.is_active(now)))
    }

    fn counts(&self) -> Result<DirectoryCounts, StoreError> {
        Ok(DirectoryCounts {
            users: self.users.len(),
            orders: self.orders.len(),
            assignments: self.assignments.len(),
        })
    }
}

// ── Messages ──────────────────────────────────────────────────────────────────

/// In-memory message store, keyed by order.
#[derive(Clone, Default)]
pub struct MemoryMessageStore {
    /// Messages per order: order_id -> Vec<Message>, in insertion order
    messages: Arc<DashMap<u64, Vec<Message>>>,
    ids: IdSequence,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageRepository for MemoryMessageStore {
    fn insert(&self, new: NewMessage) -> Result<Message, StoreError> {
        let message = Message {
            id: self.ids.next(),
            sender_id: new.sender_id,
            receiver_id: new.receiver_id,
            order_id: new.order_id,
            content: new.content,
            sent_at: new.sent_at,
        };
        self.messages
            .entry(message.order_id)
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    fn for_order(&self, order_id: u64) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .messages
            .get(&order_id)
            .map(|msgs| msgs.clone())
            .unwrap_or_default())
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.messages.iter().map(|entry| entry.value().len()).sum())
    }
}
