//! Account service
//!
//! Registration, sign-in and account lookups. Successful registration and
//! sign-in both return a freshly issued access token.

use anyhow::Context;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::repositories::{is_unique_violation, UserRepository};
use crate::models::User;
use crate::services::password::{hash_password, verify_password};
use crate::services::token::TokenService;

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 50;
pub const EMAIL_MAX: usize = 100;
pub const PASSWORD_MIN: usize = 6;
pub const PASSWORD_MAX: usize = 100;

const INVALID_CREDENTIALS: &str = "Invalid username or password";

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9\-._@+]+$").expect("valid username pattern"));
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+$").expect("valid email pattern"));

#[derive(Debug, thiserror::Error)]
pub enum AuthServiceError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    /// Bad credentials; the message never says which part was wrong
    #[error("{0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RegisterInput {
    pub fn new(username: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    pub username_or_email: String,
    pub password: String,
}

/// Token plus the identity it was issued for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub username: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

/// Public view of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl UserResponse {
    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            created_at: user.created_at,
            last_login_at: user.last_login_at,
        }
    }
}

pub struct AuthService {
    user_repo: Arc<dyn UserRepository>,
    tokens: Arc<TokenService>,
}

impl AuthService {
    pub fn new(user_repo: Arc<dyn UserRepository>, tokens: Arc<TokenService>) -> Self {
        Self { user_repo, tokens }
    }

    /// Create an account and sign it in.
    ///
    /// # Errors
    ///
    /// - `Validation` if a field breaks the length or character rules
    /// - `Conflict` if the username or email is taken
    pub async fn register(&self, input: RegisterInput) -> Result<AuthResponse, AuthServiceError> {
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_string();
        validate_registration(&username, &email, &input.password)?;

        if self
            .user_repo
            .get_by_username(&username)
            .await
            .context("Failed to check username")?
            .is_some()
        {
            return Err(AuthServiceError::Conflict(format!(
                "Username '{}' is already taken",
                username
            )));
        }

        if self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(AuthServiceError::Conflict(format!(
                "Email '{}' is already registered",
                email
            )));
        }

        let password_hash = hash_password(&input.password)?;
        let user = User::new(username, email, password_hash);

        // A concurrent registration can still win the race to the unique index
        let user = match self.user_repo.create(&user).await {
            Ok(created) => created,
            Err(e) if is_unique_violation(&e) => {
                return Err(AuthServiceError::Conflict(
                    "Username or email is already registered".to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(user_id = %user.id, username = %user.username, "User registered");
        self.sign_in(user).await
    }

    /// Sign in by username, or by email when the input contains `@`.
    pub async fn login(&self, input: LoginInput) -> Result<AuthResponse, AuthServiceError> {
        let user = self
            .find_by_username_or_email(input.username_or_email.trim())
            .await?
            .filter(|u| u.is_active);

        let Some(user) = user else {
            tracing::debug!("Login rejected: unknown or inactive account");
            return Err(AuthServiceError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        };

        let password_valid =
            verify_password(&input.password, &user.password_hash).context("Failed to verify password")?;
        if !password_valid {
            tracing::debug!(user_id = %user.id, "Login rejected: wrong password");
            return Err(AuthServiceError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }

        self.sign_in(user).await
    }

    /// Active account by id
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<UserResponse>, AuthServiceError> {
        let user = self.user_repo.get_by_id(id).await.context("Failed to get user")?;
        Ok(user.filter(|u| u.is_active).map(|u| UserResponse::from_user(&u)))
    }

    /// Active account by username
    pub async fn get_by_username(&self, username: &str) -> Result<Option<UserResponse>, AuthServiceError> {
        let user = self
            .user_repo
            .get_by_username(username)
            .await
            .context("Failed to get user")?;
        Ok(user.filter(|u| u.is_active).map(|u| UserResponse::from_user(&u)))
    }

    /// Whether a username, or an email when the input contains `@`, is taken
    pub async fn exists(&self, username_or_email: &str) -> Result<bool, AuthServiceError> {
        Ok(self
            .find_by_username_or_email(username_or_email.trim())
            .await?
            .is_some())
    }

    async fn sign_in(&self, mut user: User) -> Result<AuthResponse, AuthServiceError> {
        let now = Utc::now();
        self.user_repo
            .touch_last_login(user.id, now)
            .await
            .context("Failed to record login")?;
        user.last_login_at = Some(now);

        let (token, expires_at) = self.tokens.issue(&user)?;
        tracing::info!(user_id = %user.id, "User signed in");

        Ok(AuthResponse {
            token,
            username: user.username,
            email: user.email,
            expires_at,
        })
    }

    async fn find_by_username_or_email(&self, value: &str) -> Result<Option<User>, AuthServiceError> {
        let user = if value.contains('@') {
            self.user_repo.get_by_email(value).await
        } else {
            self.user_repo.get_by_username(value).await
        };
        Ok(user.context("Failed to look up user")?)
    }
}

fn validate_registration(username: &str, email: &str, password: &str) -> Result<(), AuthServiceError> {
    let username_len = username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&username_len) {
        return Err(AuthServiceError::Validation(format!(
            "Username must be between {} and {} characters",
            USERNAME_MIN, USERNAME_MAX
        )));
    }
    if !USERNAME_RE.is_match(username) {
        return Err(AuthServiceError::Validation(
            "Username may only contain letters, digits and - . _ @ +".to_string(),
        ));
    }

    if email.is_empty() {
        return Err(AuthServiceError::Validation("Email cannot be empty".to_string()));
    }
    if email.chars().count() > EMAIL_MAX {
        return Err(AuthServiceError::Validation(format!(
            "Email must be at most {} characters",
            EMAIL_MAX
        )));
    }
    if !EMAIL_RE.is_match(email) {
        return Err(AuthServiceError::Validation("Invalid email format".to_string()));
    }

    let password_len = password.chars().count();
    if !(PASSWORD_MIN..=PASSWORD_MAX).contains(&password_len) {
        return Err(AuthServiceError::Validation(format!(
            "Password must be between {} and {} characters",
            PASSWORD_MIN, PASSWORD_MAX
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::db::repositories::SqlxUserRepository;
    use crate::db::{create_test_pool, migrations, DynDatabasePool};

    async fn setup_test_service() -> (DynDatabasePool, AuthService, Arc<TokenService>) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let tokens = Arc::new(TokenService::new(&AuthConfig::default()));
        let service = AuthService::new(SqlxUserRepository::boxed(pool.clone()), tokens.clone());
        (pool, service, tokens)
    }

    fn login(username_or_email: &str, password: &str) -> LoginInput {
        LoginInput {
            username_or_email: username_or_email.to_string(),
            password: password.to_string(),
        }
    }

    // ========================================================================
    // Registration
    // ========================================================================

    #[tokio::test]
    async fn test_register_returns_valid_token() {
        let (_pool, service, tokens) = setup_test_service().await;

        let response = service
            .register(RegisterInput::new("alice", "alice@example.com", "secret1"))
            .await
            .expect("Failed to register");

        assert_eq!(response.username, "alice");
        assert_eq!(response.email, "alice@example.com");
        let claims = tokens.validate(&response.token).unwrap();
        assert_eq!(claims.name, "alice");
        assert_eq!(claims.exp, response.expires_at.timestamp());
    }

    #[tokio::test]
    async fn test_register_stamps_last_login() {
        let (_pool, service, _) = setup_test_service().await;
        service
            .register(RegisterInput::new("alice", "alice@example.com", "secret1"))
            .await
            .unwrap();

        let user = service.get_by_username("alice").await.unwrap().unwrap();
        assert!(user.last_login_at.is_some());
    }

    #[tokio::test]
    async fn test_register_duplicate_username_conflicts() {
        let (_pool, service, _) = setup_test_service().await;
        service
            .register(RegisterInput::new("alice", "a1@example.com", "secret1"))
            .await
            .unwrap();

        let result = service
            .register(RegisterInput::new("ALICE", "a2@example.com", "secret1"))
            .await;
        assert!(matches!(result, Err(AuthServiceError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_register_duplicate_email_conflicts() {
        let (_pool, service, _) = setup_test_service().await;
        service
            .register(RegisterInput::new("alice", "same@example.com", "secret1"))
            .await
            .unwrap();

        let result = service
            .register(RegisterInput::new("bob", "same@example.com", "secret1"))
            .await;
        assert!(matches!(result, Err(AuthServiceError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (_pool, service, _) = setup_test_service().await;

        let cases = [
            RegisterInput::new("ab", "a@example.com", "secret1"),
            RegisterInput::new("a".repeat(51), "a@example.com", "secret1"),
            RegisterInput::new("bad name", "a@example.com", "secret1"),
            RegisterInput::new("alice", "not-an-email", "secret1"),
            RegisterInput::new("alice", format!("{}@example.com", "a".repeat(100)), "secret1"),
            RegisterInput::new("alice", "a@example.com", "12345"),
            RegisterInput::new("alice", "a@example.com", "x".repeat(101)),
        ];

        for input in cases {
            let result = service.register(input.clone()).await;
            assert!(
                matches!(result, Err(AuthServiceError::Validation(_))),
                "expected validation error for {:?}",
                input.username
            );
        }
    }

    #[tokio::test]
    async fn test_register_accepts_allowed_punctuation() {
        let (_pool, service, _) = setup_test_service().await;
        assert!(service
            .register(RegisterInput::new("a.b-c_d@e+f", "x@example.com", "secret1"))
            .await
            .is_ok());
    }

    // ========================================================================
    // Login
    // ========================================================================

    #[tokio::test]
    async fn test_login_by_username_and_email() {
        let (_pool, service, _) = setup_test_service().await;
        service
            .register(RegisterInput::new("alice", "alice@example.com", "secret1"))
            .await
            .unwrap();

        let by_name = service.login(login("alice", "secret1")).await.unwrap();
        assert_eq!(by_name.username, "alice");

        let by_email = service.login(login("alice@example.com", "secret1")).await.unwrap();
        assert_eq!(by_email.email, "alice@example.com");
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let (_pool, service, _) = setup_test_service().await;
        service
            .register(RegisterInput::new("alice", "alice@example.com", "secret1"))
            .await
            .unwrap();

        let wrong_password = service.login(login("alice", "nope123")).await.unwrap_err();
        let unknown_user = service.login(login("nobody", "secret1")).await.unwrap_err();

        match (wrong_password, unknown_user) {
            (AuthServiceError::Unauthorized(a), AuthServiceError::Unauthorized(b)) => assert_eq!(a, b),
            other => panic!("expected two Unauthorized errors, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_inactive_user_cannot_login_and_is_hidden() {
        let (pool, service, _) = setup_test_service().await;
        service
            .register(RegisterInput::new("alice", "alice@example.com", "secret1"))
            .await
            .unwrap();

        sqlx::query("UPDATE users SET is_active = 0")
            .execute(pool.sqlite().unwrap())
            .await
            .unwrap();

        let result = service.login(login("alice", "secret1")).await;
        assert!(matches!(result, Err(AuthServiceError::Unauthorized(_))));
        assert!(service.get_by_username("alice").await.unwrap().is_none());
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    #[tokio::test]
    async fn test_exists_uses_at_sign_rule() {
        let (_pool, service, _) = setup_test_service().await;
        service
            .register(RegisterInput::new("alice", "alice@example.com", "secret1"))
            .await
            .unwrap();

        assert!(service.exists("alice").await.unwrap());
        assert!(service.exists("alice@example.com").await.unwrap());
        assert!(!service.exists("bob").await.unwrap());
        assert!(!service.exists("bob@example.com").await.unwrap());

        assert!(service.exists("ALICE").await.unwrap());
        assert!(service.exists(" Alice@Example.com ").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_by_id_from_token_subject() {
        let (_pool, service, tokens) = setup_test_service().await;
        let response = service
            .register(RegisterInput::new("alice", "alice@example.com", "secret1"))
            .await
            .unwrap();

        let id = tokens.validate(&response.token).unwrap().user_id().unwrap();
        let user = service.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.username, "alice");
        assert!(service.get_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }
}
