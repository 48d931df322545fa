//! Business logic services

pub mod borrowings;
pub mod catalog;
pub mod dashboard;
pub mod email;
pub mod messages;
pub mod password_resets;
pub mod reviews;
pub mod sweeper;
pub mod users;

use crate::{config::AppConfig, error::AppResult, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub users: users::UsersService,
    pub catalog: catalog::CatalogService,
    pub borrowings: borrowings::BorrowingsService,
    pub reviews: reviews::ReviewsService,
    pub messages: messages::MessagesService,
    pub password_resets: password_resets::PasswordResetsService,
    pub dashboard: dashboard::DashboardService,
    repository: Repository,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, config: &AppConfig) -> Self {
        let email = email::EmailService::new(config.email.clone());
        let messages = messages::MessagesService::new(repository.clone());

        Self {
            users: users::UsersService::new(repository.clone(), config.auth.clone()),
            catalog: catalog::CatalogService::new(repository.clone()),
            borrowings: borrowings::BorrowingsService::new(
                repository.clone(),
                messages.clone(),
                config.library.clone(),
            ),
            reviews: reviews::ReviewsService::new(repository.clone()),
            password_resets: password_resets::PasswordResetsService::new(
                repository.clone(),
                email,
                messages.clone(),
                config.library.reset_token_validity_hours,
            ),
            dashboard: dashboard::DashboardService::new(repository.clone(), config.library.clone()),
            messages,
            repository,
        }
    }

    /// Database round-trip for readiness probes
    pub async fn ping(&self) -> AppResult<()> {
        self.repository.ping().await
    }
}
