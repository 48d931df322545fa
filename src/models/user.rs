//! User model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::Pagination;
use crate::error::AppError;

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Staff,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Staff => "staff",
            Role::Admin => "admin",
        }
    }

    /// Staff and admins manage the circulation desk
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Staff | Role::Admin)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "staff" => Ok(Role::Staff),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

impl_text_enum!(Role);

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Blocked,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Blocked => "blocked",
        }
    }
}

impl std::str::FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(AccountStatus::Active),
            "blocked" => Ok(AccountStatus::Blocked),
            _ => Err(format!("Invalid account status: {}", s)),
        }
    }
}

impl_text_enum!(AccountStatus);

/// Full user model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct User {
    pub id: i32,
    pub login: String,
    pub email: Option<String>,
    /// Hashed password (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub role: Role,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// "Firstname Lastname", falling back to the login
    pub fn display_name(&self) -> String {
        display_name(self.firstname.as_deref(), self.lastname.as_deref(), &self.login)
    }

    pub fn is_blocked(&self) -> bool {
        self.status == AccountStatus::Blocked
    }
}

pub(crate) fn display_name(firstname: Option<&str>, lastname: Option<&str>, login: &str) -> String {
    let name = [firstname, lastname]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if name.is_empty() {
        login.to_string()
    } else {
        name
    }
}

/// Short user representation for lists
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct UserShort {
    pub id: i32,
    pub login: String,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub role: Role,
    pub status: AccountStatus,
    /// Borrowings currently borrowed or awaiting return
    pub active_borrowings: i64,
}

/// User query parameters
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct UserQuery {
    /// Search in login, first name and last name
    pub name: Option<String>,
    pub role: Option<Role>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl UserQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination {
            page: self.page,
            per_page: self.per_page,
        }
    }
}

/// Self-service registration
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterUser {
    #[validate(length(min = 3, max = 64, message = "Login must be 3 to 64 characters"))]
    pub login: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
}

/// Account creation by an administrator
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUser {
    #[validate(length(min = 3, max = 64, message = "Login must be 3 to 64 characters"))]
    pub login: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub role: Option<Role>,
}

impl From<RegisterUser> for CreateUser {
    fn from(r: RegisterUser) -> Self {
        CreateUser {
            login: r.login,
            password: r.password,
            email: r.email,
            firstname: r.firstname,
            lastname: r.lastname,
            role: Some(Role::User),
        }
    }
}

/// Update own profile request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProfile {
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    /// Email address (must be unique)
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    /// Current password (required to change password)
    pub current_password: Option<String>,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: Option<String>,
}

/// Change role request (admin only)
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRole {
    pub role: Role,
}

/// Block or unblock request (admin only)
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatus {
    pub status: AccountStatus,
}

/// JWT Claims for authenticated users
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    pub sub: String,
    pub user_id: i32,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

impl UserClaims {
    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Require staff or admin privileges
    pub fn require_staff(&self) -> Result<(), AppError> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(AppError::Authorization("Staff privileges required".to_string()))
        }
    }

    /// Require admin privileges
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Authorization("Administrator privileges required".to_string()))
        }
    }

    /// Re-apply the stored account to token claims: blocked accounts lose
    /// access and role changes take effect before the token expires.
    pub fn refreshed(mut self, account: &User) -> Result<Self, AppError> {
        if account.id != self.user_id {
            return Err(AppError::Authentication("Token does not match account".to_string()));
        }
        if account.is_blocked() {
            return Err(AppError::Authentication("Account is blocked".to_string()));
        }
        self.role = account.role;
        Ok(self)
    }

    /// Owners see their own records, staff see everyone's
    pub fn require_self_or_staff(&self, owner_id: i32) -> Result<(), AppError> {
        if self.user_id == owner_id || self.is_staff() {
            Ok(())
        } else {
            Err(AppError::Authorization("Not allowed to access this resource".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: Role) -> UserClaims {
        let now = Utc::now().timestamp();
        UserClaims {
            sub: "jdoe".to_string(),
            user_id: 7,
            role,
            exp: now + 3600,
            iat: now,
        }
    }

    #[test]
    fn token_round_trip_keeps_role() {
        let token = claims(Role::Staff).create_token("secret").unwrap();
        let parsed = UserClaims::from_token(&token, "secret").unwrap();
        assert_eq!(parsed.user_id, 7);
        assert_eq!(parsed.role, Role::Staff);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = claims(Role::User).create_token("secret").unwrap();
        assert!(UserClaims::from_token(&token, "other").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let mut c = claims(Role::User);
        c.iat -= 10_000;
        c.exp = c.iat + 60;
        let token = c.create_token("secret").unwrap();
        assert!(UserClaims::from_token(&token, "secret").is_err());
    }

    #[test]
    fn role_guards() {
        assert!(claims(Role::User).require_staff().is_err());
        assert!(claims(Role::Staff).require_staff().is_ok());
        assert!(claims(Role::Staff).require_admin().is_err());
        assert!(claims(Role::Admin).require_staff().is_ok());
        assert!(claims(Role::Admin).require_admin().is_ok());
    }

    #[test]
    fn owners_and_staff_may_access() {
        assert!(claims(Role::User).require_self_or_staff(7).is_ok());
        assert!(claims(Role::User).require_self_or_staff(8).is_err());
        assert!(claims(Role::Staff).require_self_or_staff(8).is_ok());
    }

    fn account(role: Role, status: AccountStatus) -> User {
        let now = Utc::now();
        User {
            id: 7,
            login: "jdoe".to_string(),
            email: None,
            password_hash: String::new(),
            firstname: None,
            lastname: None,
            role,
            status,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn refreshed_claims_follow_stored_role() {
        let refreshed = claims(Role::Staff)
            .refreshed(&account(Role::User, AccountStatus::Active))
            .unwrap();
        assert_eq!(refreshed.role, Role::User);
        assert!(refreshed.require_staff().is_err());
    }

    #[test]
    fn refreshed_claims_reject_blocked_account() {
        let result = claims(Role::Admin).refreshed(&account(Role::Admin, AccountStatus::Blocked));
        assert!(matches!(result, Err(AppError::Authentication(_))));
    }

    #[test]
    fn refreshed_claims_reject_other_account() {
        let mut other = account(Role::User, AccountStatus::Active);
        other.id = 8;
        assert!(claims(Role::User).refreshed(&other).is_err());
    }

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("ADMIN".parse::<Role>(), Ok(Role::Admin));
        assert!("librarian".parse::<Role>().is_err());
    }

    #[test]
    fn display_name_falls_back_to_login() {
        assert_eq!(display_name(Some("Ada"), Some("Lovelace"), "ada"), "Ada Lovelace");
        assert_eq!(display_name(None, Some(" "), "ada"), "ada");
        assert_eq!(display_name(Some("Ada"), None, "ada"), "Ada");
    }
}
