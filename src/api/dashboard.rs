//! Dashboard endpoints

use axum::{extract::State, Json};

use crate::{
    error::AppResult,
    models::dashboard::{AdminDashboard, UserDashboard},
};

use super::AuthenticatedUser;

/// Library-wide figures
#[utoipa::path(
    get,
    path = "/dashboard/admin",
    tag = "dashboard",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Library statistics", body = AdminDashboard),
        (status = 403, description = "Staff only")
    )
)]
pub async fn admin_dashboard(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<AdminDashboard>> {
    claims.require_staff()?;

    let dashboard = state.services.dashboard.admin().await?;
    Ok(Json(dashboard))
}

/// The caller's own figures
#[utoipa::path(
    get,
    path = "/dashboard/me",
    tag = "dashboard",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Personal statistics", body = UserDashboard)
    )
)]
pub async fn my_dashboard(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<UserDashboard>> {
    let dashboard = state.services.dashboard.for_user(claims.user_id).await?;
    Ok(Json(dashboard))
}
