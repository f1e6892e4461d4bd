//! /orders and /assignments handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use patrol_core::codec::EntityType;
use patrol_core::model::{
    now_millis, GeoPoint, NewAssignment, OrderStatus, ServiceOrder, TaskAssignment,
};
use patrol_services::Violation;

use super::{parse_body, success, ApiError, ApiResult, ApiState};

#[derive(Serialize)]
pub struct OrderJson {
    pub id: String,
    pub client_id: String,
    pub status: OrderStatus,
    pub created_at: u64,
}

impl OrderJson {
    fn from_order(state: &ApiState, order: ServiceOrder) -> Result<Self, ApiError> {
        Ok(Self {
            id: state.encode(EntityType::Order, order.id)?,
            client_id: state.encode(EntityType::User, order.client_id)?,
            status: order.status,
            created_at: order.created_at,
        })
    }
}

#[derive(Serialize)]
pub struct AssignmentJson {
    pub id: String,
    pub order_id: String,
    pub agent_id: String,
    pub starts_at: Option<u64>,
    pub ends_at: Option<u64>,
    pub latitude: f64,
    pub longitude: f64,
    pub removed: bool,
    pub active: bool,
}

impl AssignmentJson {
    fn from_assignment(
        state: &ApiState,
        a: TaskAssignment,
        now: u64,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            id: state.encode(EntityType::Assignment, a.id)?,
            order_id: state.encode(EntityType::Order, a.order_id)?,
            agent_id: state.encode(EntityType::User, a.agent_id)?,
            starts_at: a.starts_at,
            ends_at: a.ends_at,
            latitude: a.point.latitude,
            longitude: a.point.longitude,
            removed: a.removed,
            active: a.is_active(now),
        })
    }
}

// ── /orders (POST) ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub client_id: String,
}

pub async fn handle_create_order(
    State(state): State<ApiState>,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> ApiResult<OrderJson> {
    let req = parse_body(body)?;
    let client_id = state.decode(&req.client_id, EntityType::User)?;

    let order = state.directory.create_order(client_id)?;
    tracing::info!(order_id = order.id, client_id, "service order created");

    success(OrderJson::from_order(&state, order)?)
}

// ── /orders/{order_id}/status (PATCH) ─────────────────────────────────────────

#[derive(Deserialize)]
pub struct SetStatusRequest {
    pub status: String,
}

pub async fn handle_set_order_status(
    State(state): State<ApiState>,
    Path(order_token): Path<String>,
    body: Result<Json<SetStatusRequest>, JsonRejection>,
) -> ApiResult<OrderJson> {
    let req = parse_body(body)?;
    let status: OrderStatus = req
        .status
        .parse()
        .map_err(|e: String| ApiError::Unprocessable(vec![Violation::new("status", e)]))?;
    let order_id = state.decode(&order_token, EntityType::Order)?;

    let order = state.directory.set_order_status(order_id, status)?;
    tracing::info!(order_id, status = status.as_str(), "order status changed");

    success(OrderJson::from_order(&state, order)?)
}

// ── /orders/{order_id}/assignments (POST, GET) ────────────────────────────────

#[derive(Deserialize)]
pub struct AssignAgentRequest {
    pub agent_id: String,
    #[serde(default)]
    pub starts_at: Option<u64>,
    #[serde(default)]
    pub ends_at: Option<u64>,
    pub latitude: f64,
    pub longitude: f64,
}

pub async fn handle_assign_agent(
    State(state): State<ApiState>,
    Path(order_token): Path<String>,
    body: Result<Json<AssignAgentRequest>, JsonRejection>,
) -> ApiResult<AssignmentJson> {
    let req = parse_body(body)?;
    let point = GeoPoint {
        latitude: req.latitude,
        longitude: req.longitude,
    };
    if !point.is_valid() {
        return Err(ApiError::Unprocessable(vec![Violation::new(
            "latitude/longitude",
            "must be within [-90, 90] and [-180, 180]",
        )]));
    }
    let order_id = state.decode(&order_token, EntityType::Order)?;
    let agent_id = state.decode(&req.agent_id, EntityType::User)?;

    let assignment = state.directory.assign_agent(NewAssignment {
        order_id,
        agent_id,
        starts_at: req.starts_at,
        ends_at: req.ends_at,
        point,
    })?;
    tracing::info!(
        assignment_id = assignment.id,
        order_id,
        agent_id,
        "agent assigned"
    );

    success(AssignmentJson::from_assignment(
        &state,
        assignment,
        now_millis(),
    )?)
}

pub async fn handle_list_assignments(
    State(state): State<ApiState>,
    Path(order_token): Path<String>,
) -> ApiResult<Vec<AssignmentJson>> {
    let order_id = state.decode(&order_token, EntityType::Order)?;
    if state.directory.order(order_id)?.is_none() {
        return Err(ApiError::NotFound("order not found".to_string()));
    }

    let now = now_millis();
    let assignments = state
        .directory
        .assignments_for_order(order_id)?
        .into_iter()
        .map(|a| AssignmentJson::from_assignment(&state, a, now))
        .collect::<Result<Vec<_>, _>>()?;

    success(assignments)
}

// ── /assignments/{assignment_id} (DELETE) ─────────────────────────────────────

pub async fn handle_remove_assignment(
    State(state): State<ApiState>,
    Path(assignment_token): Path<String>,
) -> ApiResult<AssignmentJson> {
    let assignment_id = state.decode(&assignment_token, EntityType::Assignment)?;

    let assignment = state.directory.remove_assignment(assignment_id)?;
    tracing::info!(
        assignment_id,
        order_id = assignment.order_id,
        "assignment removed"
    );

    success(AssignmentJson::from_assignment(
        &state,
        assignment,
        now_millis(),
    )?)
}
