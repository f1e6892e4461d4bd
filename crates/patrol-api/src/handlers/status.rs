//! /status handler.

use axum::extract::State;
use serde::Serialize;

use super::{success, ApiResult, ApiState};

#[derive(Serialize)]
pub struct StatusResponse {
    pub storage_backend: &'static str,
    pub uptime_secs: u64,
    pub users: usize,
    pub orders: usize,
    pub assignments: usize,
    pub messages: usize,
    pub multi_send_max_chars: usize,
    pub single_send_max_chars: usize,
}

pub async fn handle_status(State(state): State<ApiState>) -> ApiResult<StatusResponse> {
    let counts = state.directory.counts()?;
    let messages = state.messages.count()?;

    success(StatusResponse {
        storage_backend: state.backend.as_str(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        users: counts.users,
        orders: counts.orders,
        assignments: counts.assignments,
        messages,
        multi_send_max_chars: state.settings.multi_send_max_chars,
        single_send_max_chars: state.settings.single_send_max_chars,
    })
}
