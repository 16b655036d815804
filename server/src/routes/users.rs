//! Connected-user listing.

use axum::extract::State;
use axum::response::Json;
use serde::{Deserialize, Serialize};

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsersResponse {
    pub users: Vec<String>,
}

/// `GET /api/users`: usernames of all open connections, in connection order.
pub async fn list_users(State(state): State<AppState>) -> Json<UsersResponse> {
    Json(UsersResponse { users: state.registry.usernames().await })
}

#[cfg(test)]
#[path = "users_test.rs"]
mod tests;
