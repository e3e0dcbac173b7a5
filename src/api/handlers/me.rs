use axum::{extract::Extension, response::Json};
use std::sync::Arc;
use tracing::instrument;

use crate::auth::{AuthState, UserId};
use crate::error::{ApiError, ErrorBody};
use crate::users::User;

#[utoipa::path(
    get,
    path = "/api/me",
    responses (
        (status = 200, description = "The authenticated user", body = User),
        (status = 401, description = "Missing, malformed, forged or expired credential", body = ErrorBody),
        (status = 404, description = "The credential names a user that no longer exists", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn me(
    user_id: Option<Extension<UserId>>,
    Extension(auth_state): Extension<Arc<AuthState>>,
) -> Result<Json<User>, ApiError> {
    // Only reachable without a user id when mounted outside `require_user`.
    let Some(Extension(UserId(id))) = user_id else {
        return Err(ApiError::internal(anyhow::anyhow!(
            "no user id in request context"
        )));
    };

    auth_state
        .users()
        .find_user_by_id(id)
        .await
        .map_err(ApiError::Internal)?
        .map(Json)
        .ok_or(ApiError::NotFound("user not found"))
}
