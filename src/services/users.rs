//! Authentication and user management service

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::user::{
        AccountStatus, CreateUser, RegisterUser, Role, UpdateProfile, User, UserClaims, UserQuery,
        UserShort,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    config: AuthConfig,
}

impl UsersService {
    pub fn new(repository: Repository, config: AuthConfig) -> Self {
        Self { repository, config }
    }

    /// Authenticate user by login and return a JWT token
    pub async fn authenticate(&self, login: &str, password: &str) -> AppResult<(String, User)> {
        let user = self
            .repository
            .users
            .get_by_login(login.trim())
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid login or password".to_string()))?;

        if !verify_password(&user.password_hash, password)? {
            return Err(AppError::Authentication("Invalid login or password".to_string()));
        }

        // Checked after the password so blocked status is not revealed to guessers
        if user.is_blocked() {
            return Err(AppError::Authentication("Account is blocked".to_string()));
        }

        let token = self.create_token_for_user(&user)?;
        tracing::info!(user_id = user.id, "user logged in");
        Ok((token, user))
    }

    /// Create the configured administrator if no active one exists yet
    pub async fn ensure_admin(&self) -> AppResult<()> {
        let (Some(login), Some(password)) = (
            self.config.bootstrap_admin_login.clone(),
            self.config.bootstrap_admin_password.clone(),
        ) else {
            return Ok(());
        };

        if self.repository.users.count_active_admins().await? > 0 {
            return Ok(());
        }

        if let Some(existing) = self.repository.users.get_by_login(&login).await? {
            tracing::warn!(user_id = existing.id, "no active administrator and bootstrap login is taken");
            return Ok(());
        }

        let admin = self
            .create_user(CreateUser {
                login,
                password,
                email: None,
                firstname: None,
                lastname: None,
                role: Some(Role::Admin),
            })
            .await?;
        tracing::warn!(user_id = admin.id, login = %admin.login, "bootstrap administrator created, change its password");
        Ok(())
    }

    /// Self-service registration; always creates a `user` account
    pub async fn register(&self, data: RegisterUser) -> AppResult<(String, User)> {
        let mut data: CreateUser = data.into();
        data.role = Some(Role::User);
        let user = self.create_user(data).await?;
        let token = self.create_token_for_user(&user)?;
        Ok((token, user))
    }

    /// Create JWT token for a user
    pub fn create_token_for_user(&self, user: &User) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let exp = now + (self.config.jwt_expiration_hours as i64 * 3600);

        let claims = UserClaims {
            sub: user.login.clone(),
            user_id: user.id,
            role: user.role,
            exp,
            iat: now,
        };

        claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<User> {
        self.repository.users.get_by_id(id).await
    }

    /// Search users
    pub async fn search_users(&self, query: &UserQuery) -> AppResult<(Vec<UserShort>, i64)> {
        self.repository.users.search(query).await
    }

    /// Create a new user
    pub async fn create_user(&self, user: CreateUser) -> AppResult<User> {
        if self.repository.users.login_exists(user.login.trim()).await? {
            return Err(AppError::Conflict("Login already exists".to_string()));
        }
        if let Some(ref email) = user.email {
            if self.repository.users.email_exists(email, None).await? {
                return Err(AppError::Conflict("Email already in use".to_string()));
            }
        }

        let password_hash = hash_password(&user.password)?;
        let role = user.role.unwrap_or(Role::User);
        let created = self.repository.users.create(&user, &password_hash, role).await?;

        tracing::info!(user_id = created.id, role = %created.role, "user created");
        Ok(created)
    }

    /// Update own profile. Changing the password requires the current one.
    pub async fn update_profile(&self, user_id: i32, profile: UpdateProfile) -> AppResult<User> {
        let user = self.repository.users.get_by_id(user_id).await?;

        if let Some(ref email) = profile.email {
            if self.repository.users.email_exists(email, Some(user_id)).await? {
                return Err(AppError::Conflict("Email already in use".to_string()));
            }
        }

        let password_hash = match profile.new_password {
            Some(ref new_password) => {
                let current = profile.current_password.as_deref().ok_or_else(|| {
                    AppError::Validation("Current password is required to change password".to_string())
                })?;
                if !verify_password(&user.password_hash, current)? {
                    return Err(AppError::Authentication("Current password is incorrect".to_string()));
                }
                Some(hash_password(new_password)?)
            }
            None => None,
        };

        self.repository
            .users
            .update_profile(user_id, &profile, password_hash)
            .await
    }

    /// Change a user's role. Admins cannot demote themselves.
    pub async fn update_role(&self, actor_id: i32, user_id: i32, role: Role) -> AppResult<User> {
        if actor_id == user_id && role != Role::Admin {
            return Err(AppError::BusinessRule(
                "Administrators cannot demote themselves".to_string(),
            ));
        }

        let user = self.repository.users.update_role(user_id, role).await?;
        tracing::info!(user_id, actor_id, role = %role, "role changed");
        Ok(user)
    }

    /// Block or unblock a user. Admins cannot block themselves.
    pub async fn update_status(&self, actor_id: i32, user_id: i32, status: AccountStatus) -> AppResult<User> {
        if actor_id == user_id && status == AccountStatus::Blocked {
            return Err(AppError::BusinessRule("You cannot block your own account".to_string()));
        }

        let target = self.repository.users.get_by_id(user_id).await?;
        if target.role == Role::Admin
            && status == AccountStatus::Blocked
            && !target.is_blocked()
            && self.repository.users.count_active_admins().await? <= 1
        {
            return Err(AppError::BusinessRule(
                "The last active administrator cannot be blocked".to_string(),
            ));
        }

        let user = self.repository.users.update_status(user_id, status).await?;
        tracing::info!(user_id, actor_id, status = %status, "account status changed");
        Ok(user)
    }
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored Argon2 hash
pub fn verify_password(hash: &str, password: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_verifies_only_the_right_password() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password(&hash, "correct horse").unwrap());
        assert!(!verify_password(&hash, "battery staple").unwrap());
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        assert_ne!(hash_password("secret123").unwrap(), hash_password("secret123").unwrap());
    }

    #[test]
    fn malformed_hash_is_an_internal_error() {
        assert!(matches!(verify_password("not-a-hash", "x"), Err(AppError::Internal(_))));
    }
}
