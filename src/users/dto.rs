use serde::{Deserialize, Serialize};

use crate::auth::dto::PublicUser;

/// Request body for PUT /users/update. Only supplied fields change.
#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(rename = "currentEmail", default)]
    pub current_email: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UpdateUserResponse {
    pub success: bool,
    pub user: PublicUser,
    pub changed: bool,
}
