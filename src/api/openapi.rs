//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, books, borrowings, dashboard, health, messages, password_resets, reviews, users};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Libris API",
        version = "0.3.0",
        description = "Digital library management REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    modifiers(&BearerAuth),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::login,
        auth::register,
        auth::me,
        auth::update_profile,
        // Users
        users::list_users,
        users::get_user,
        users::create_user,
        users::update_role,
        users::update_status,
        // Books
        books::list_books,
        books::get_book,
        books::list_categories,
        books::create_book,
        books::update_book,
        books::delete_book,
        books::toggle_favorite,
        books::list_favorites,
        // Reviews
        reviews::list_reviews,
        reviews::create_review,
        reviews::update_review,
        reviews::delete_review,
        // Borrowings
        borrowings::create_borrowing,
        borrowings::my_borrowings,
        borrowings::list_borrowings,
        borrowings::overdue_borrowings,
        borrowings::get_borrowing,
        borrowings::cancel,
        borrowings::approve,
        borrowings::reject,
        borrowings::checkout,
        borrowings::request_return,
        borrowings::confirm_return,
        borrowings::pay_fine,
        // Messages
        messages::list_messages,
        messages::unread_count,
        messages::mark_read,
        messages::mark_all_read,
        messages::send_message,
        messages::delete_message,
        // Password resets
        password_resets::submit_request,
        password_resets::request_status,
        password_resets::list_requests,
        password_resets::decide_request,
        password_resets::complete_reset,
        // Dashboard
        dashboard::admin_dashboard,
        dashboard::my_dashboard,
    ),
    components(
        schemas(
            // Auth
            auth::LoginRequest,
            auth::LoginResponse,
            auth::UserInfo,
            // Users
            crate::models::user::Role,
            crate::models::user::AccountStatus,
            crate::models::user::User,
            crate::models::user::UserShort,
            crate::models::user::RegisterUser,
            crate::models::user::CreateUser,
            crate::models::user::UpdateProfile,
            crate::models::user::UpdateRole,
            crate::models::user::UpdateStatus,
            // Books
            crate::models::book::Book,
            crate::models::book::BookDetails,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            crate::models::book::FavoriteStatus,
            // Reviews
            crate::models::review::Review,
            crate::models::review::ReviewInput,
            // Borrowings
            crate::models::borrowing::BorrowingStatus,
            crate::models::borrowing::Borrowing,
            crate::models::borrowing::BorrowingDetails,
            crate::models::borrowing::CreateBorrowing,
            crate::models::borrowing::TransitionNote,
            // Messages
            crate::models::message::MessageKind,
            crate::models::message::Message,
            crate::models::message::SendMessage,
            messages::UnreadCount,
            messages::MarkedRead,
            // Password resets
            crate::models::password_reset::ResetStatus,
            crate::models::password_reset::ResetAction,
            crate::models::password_reset::PasswordReset,
            crate::models::password_reset::PasswordResetView,
            crate::models::password_reset::CreateResetRequest,
            crate::models::password_reset::ResetSubmitted,
            crate::models::password_reset::ResetStatusResponse,
            crate::models::password_reset::ReviewResetRequest,
            crate::models::password_reset::CompleteReset,
            // Dashboard
            crate::models::dashboard::TopBook,
            crate::models::dashboard::AdminDashboard,
            crate::models::dashboard::UserDashboard,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Authentication endpoints"),
        (name = "users", description = "User management"),
        (name = "books", description = "Catalog management"),
        (name = "favorites", description = "Favorite books"),
        (name = "reviews", description = "Book reviews"),
        (name = "borrowings", description = "Borrowing lifecycle"),
        (name = "messages", description = "Messages and notifications"),
        (name = "password-resets", description = "Admin-approved password resets"),
        (name = "dashboard", description = "Statistics")
    )
)]
pub struct ApiDoc;

/// Registers the `bearer_auth` scheme referenced by secured paths
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_lifecycle_paths_and_bearer_scheme() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/borrowings/{id}/confirm-return"));
        assert!(doc.paths.paths.contains_key("/password-resets/{id}/status"));
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
