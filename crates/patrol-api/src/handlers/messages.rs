//! /messages handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use patrol_core::codec::EntityType;
use patrol_core::model::Message;
use patrol_services::{DispatchOutcome, MultiSendRequest, SingleSendRequest, Violation};

use super::{parse_body, success, ApiError, ApiResult, ApiState};

#[derive(Serialize)]
pub struct MessageJson {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub order_id: String,
    pub content: String,
    pub sent_at: u64,
}

impl MessageJson {
    fn from_message(state: &ApiState, m: Message) -> Result<Self, ApiError> {
        Ok(Self {
            id: state.encode(EntityType::Message, m.id)?,
            sender_id: state.encode(EntityType::User, m.sender_id)?,
            receiver_id: state.encode(EntityType::User, m.receiver_id)?,
            order_id: state.encode(EntityType::Order, m.order_id)?,
            content: m.content,
            sent_at: m.sent_at,
        })
    }
}

// ── /messages (POST) ──────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct SentMessageJson {
    pub message_id: String,
    pub conversation_id: String,
    pub sent_at: u64,
}

pub async fn handle_send_message(
    State(state): State<ApiState>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> ApiResult<SentMessageJson> {
    let body = parse_body(body)?;
    let req = SingleSendRequest::from_json(&body, state.settings.single_send_max_chars)
        .map_err(ApiError::Unprocessable)?;

    let sent = state
        .dispatcher
        .send_one(&req.sender_id, &req.order_id, &req.receiver_id, &req.content)?;

    success(SentMessageJson {
        message_id: state.encode(EntityType::Message, sent.message.id)?,
        conversation_id: sent.conversation_id,
        sent_at: sent.message.sent_at,
    })
}

// ── /messages/multi (POST) ────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct MultiSendJson {
    #[serde(flatten)]
    pub outcome: DispatchOutcome,
    pub message: String,
}

pub async fn handle_send_multi(
    State(state): State<ApiState>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> ApiResult<MultiSendJson> {
    let body = parse_body(body)?;
    let req = MultiSendRequest::from_json(&body, state.settings.multi_send_max_chars)
        .map_err(ApiError::Unprocessable)?;

    let outcome = state.dispatcher.dispatch(
        &req.sender_id,
        &req.order_id,
        &req.receiver_ids,
        &req.content,
    )?;

    success(MultiSendJson {
        message: outcome.summary(),
        outcome,
    })
}

// ── /orders/{order_id}/messages (GET) ─────────────────────────────────────────

#[derive(Deserialize)]
pub struct ConversationQuery {
    pub with: Option<String>,
    pub and: Option<String>,
}

pub async fn handle_order_messages(
    State(state): State<ApiState>,
    Path(order_token): Path<String>,
    Query(query): Query<ConversationQuery>,
) -> ApiResult<Vec<MessageJson>> {
    let order_id = state.decode(&order_token, EntityType::Order)?;
    if state.directory.order(order_id)?.is_none() {
        return Err(ApiError::NotFound("order not found".to_string()));
    }

    let messages = match (query.with.as_deref(), query.and.as_deref()) {
        (None, None) => state.messages.for_order(order_id)?,
        (Some(a), Some(b)) => {
            let a = state.decode(a, EntityType::User)?;
            let b = state.decode(b, EntityType::User)?;
            state.messages.conversation(order_id, a, b)?
        }
        _ => {
            return Err(ApiError::Unprocessable(vec![Violation::new(
                "with/and",
                "both participants are required to select a conversation",
            )]))
        }
    };

    let messages = messages
        .into_iter()
        .map(|m| MessageJson::from_message(&state, m))
        .collect::<Result<Vec<_>, _>>()?;
    success(messages)
}
