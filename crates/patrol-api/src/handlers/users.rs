//! /users handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use patrol_core::codec::EntityType;
use patrol_core::model::Role;
use patrol_services::Violation;

use super::{parse_body, success, ApiError, ApiResult, ApiState};

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub role: String,
}

#[derive(Serialize)]
pub struct UserJson {
    pub id: String,
    pub name: String,
    pub role: Role,
    pub created_at: u64,
}

pub async fn handle_create_user(
    State(state): State<ApiState>,
    body: Result<Json<CreateUserRequest>, JsonRejection>,
) -> ApiResult<UserJson> {
    let req = parse_body(body)?;

    let mut violations = Vec::new();
    let name = req.name.trim();
    if name.is_empty() {
        violations.push(Violation::new("name", "must not be blank"));
    }
    let role = match req.role.parse::<Role>() {
        Ok(role) => Some(role),
        Err(e) => {
            violations.push(Violation::new("role", e));
            None
        }
    };
    let role = match role {
        Some(role) if violations.is_empty() => role,
        _ => return Err(ApiError::Unprocessable(violations)),
    };

    let user = state.directory.register_user(name, role)?;
    tracing::info!(user_id = user.id, role = %user.role, "user registered");

    success(UserJson {
        id: state.encode(EntityType::User, user.id)?,
        name: user.name,
        role: user.role,
        created_at: user.created_at,
    })
}
