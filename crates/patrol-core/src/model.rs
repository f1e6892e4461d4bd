//! Domain records shared by the stores, the dispatch engine, and the API.
//!
//! Ids here are internal numeric keys. They are converted to opaque tokens
//! (see [`crate::codec`]) before leaving the process.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Unix timestamp in milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ── Users ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Agent,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Agent => "agent",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(Self::Client),
            "agent" => Ok(Self::Agent),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub role: Role,
    pub created_at: u64,
}

// ── Service orders ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Active,
    Closed,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "closed" => Ok(Self::Closed),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

/// A client's request for agent coverage of a secured zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOrder {
    pub id: u64,
    pub client_id: u64,
    pub status: OrderStatus,
    pub created_at: u64,
}

// ── Task assignments ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Links one agent to one service order for a time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub id: u64,
    pub order_id: u64,
    pub agent_id: u64,
    pub starts_at: Option<u64>,
    pub ends_at: Option<u64>,
    pub point: GeoPoint,
    pub removed: bool,
}

impl TaskAssignment {
    /// Active means not removed and not yet expired at `now`.
    pub fn is_active(&self, now: u64) -> bool {
        !self.removed && self.ends_at.map_or(true, |end| end > now)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAssignment {
    pub order_id: u64,
    pub agent_id: u64,
    pub starts_at: Option<u64>,
    pub ends_at: Option<u64>,
    pub point: GeoPoint,
}

// ── Messages ──────────────────────────────────────────────────────────────────

/// One unit of communication, scoped to an order. Never mutated once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub sender_id: u64,
    pub receiver_id: u64,
    pub order_id: u64,
    pub content: String,
    pub sent_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: u64,
    pub receiver_id: u64,
    pub order_id: u64,
    pub content: String,
    pub sent_at: u64,
}
