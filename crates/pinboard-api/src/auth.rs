use std::sync::Arc;

use anyhow::anyhow;
use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::SaltString,
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand_core::OsRng;
use tracing::{debug, info, warn};

use pinboard_db::{Store, next_id};
use pinboard_types::api::{Claims, LoginRequest, LoginResponse, MessageResponse, RegisterRequest};
use pinboard_types::models::{Role, User};

use crate::error::{ApiError, Result};
use crate::extract::ApiJson;
use crate::{AppState, run_blocking};

/// Lifetime of an issued session token, in seconds.
pub const TOKEN_TTL_SECS: i64 = 3600;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl HashCost {
    fn hasher(&self) -> anyhow::Result<Argon2<'static>> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(|e| anyhow!("Invalid argon2 parameters: {}", e))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub hash_cost: HashCost,
}

/// Registration, login and session-token verification.
pub struct AuthService {
    store: Arc<Store>,
    hasher: Argon2<'static>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    /// Verified against when a login names an unknown user, so both failure
    /// paths cost one argon2 run.
    dummy_hash: String,
}

impl AuthService {
    pub fn new(store: Arc<Store>, config: &AuthConfig) -> anyhow::Result<Self> {
        let mut validation = Validation::default();
        validation.leeway = 0;

        let hasher = config.hash_cost.hasher()?;
        let dummy_hash = hasher
            .hash_password(b"pinboard-dummy-password", &SaltString::generate(&mut OsRng))
            .map_err(|e| anyhow!("Password hashing failed: {}", e))?
            .to_string();

        Ok(Self {
            store,
            hasher,
            dummy_hash,
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
        })
    }

    /// Create a new account. A missing role means `user`.
    pub fn register(&self, username: &str, password: &str, role: Option<&str>) -> Result<User> {
        let role = match role {
            Some(name) => name.parse::<Role>().map_err(ApiError::InvalidRole)?,
            None => Role::User,
        };

        // Skip the slow hash for names that are obviously taken; the check is
        // repeated under the collection lock below.
        if username_taken(&self.store.read::<User>()?, username) {
            return Err(ApiError::DuplicateUsername);
        }

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = self
            .hasher
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow!("Password hashing failed: {}", e))?
            .to_string();

        self.store.update(|users: &mut Vec<User>| {
            if username_taken(users, username) {
                return Err(ApiError::DuplicateUsername);
            }

            let user = User {
                id: next_id(users)?,
                username: username.to_string(),
                password: password_hash,
                role,
                followers: Default::default(),
                following: Default::default(),
            };
            users.push(user.clone());
            Ok(user)
        })
    }

    /// Check credentials and issue a session token. Unknown usernames and
    /// wrong passwords fail identically.
    pub fn login(&self, username: &str, password: &str) -> Result<String> {
        let users = self.store.read::<User>()?;
        let Some(user) = users.iter().find(|u| u.username == username) else {
            if let Ok(dummy) = PasswordHash::new(&self.dummy_hash) {
                let _ = self.hasher.verify_password(password.as_bytes(), &dummy);
            }
            return Err(ApiError::InvalidCredentials);
        };

        let parsed_hash = PasswordHash::new(&user.password)
            .map_err(|e| anyhow!("Stored hash for user {} is corrupt: {}", user.id, e))?;

        self.hasher
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| ApiError::InvalidCredentials)?;

        self.issue_token(user.id, user.role, Utc::now())
    }

    pub fn issue_token(&self, id: i64, role: Role, issued_at: DateTime<Utc>) -> Result<String> {
        let claims = Claims {
            id,
            role,
            iat: issued_at.timestamp() as usize,
            exp: (issued_at + Duration::seconds(TOKEN_TTL_SECS)).timestamp() as usize,
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| anyhow!("Token signing failed: {}", e))?;
        Ok(token)
    }

    /// Validate the value of an `Authorization` header. Both a bare token and
    /// `Bearer <token>` are accepted; a bare `Bearer` counts as no token.
    pub fn verify_token(&self, header: Option<&str>) -> Result<Claims> {
        let token = header
            .map(str::trim)
            .map(|v| match v {
                "Bearer" => "",
                v => v.strip_prefix("Bearer ").map(str::trim_start).unwrap_or(v),
            })
            .filter(|t| !t.is_empty())
            .ok_or(ApiError::MissingToken)?;

        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("Rejected session token: {}", e);
                ApiError::InvalidToken
            })
    }
}

fn username_taken(users: &[User], username: &str) -> bool {
    users.iter().any(|u| u.username == username)
}

/// POST /register
pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse> {
    let user = run_blocking(move || {
        state
            .auth
            .register(&req.username, &req.password, req.role.as_deref())
    })
    .await?;

    info!("Registered user {} ({}) as {}", user.username, user.id, user.role);

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("User registered successfully")),
    ))
}

/// POST /login
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse> {
    let username = req.username.clone();
    let token = run_blocking(move || state.auth.login(&req.username, &req.password))
        .await
        .inspect_err(|e| {
            if matches!(e, ApiError::InvalidCredentials) {
                warn!("Failed login for '{}'", username);
            }
        })?;

    Ok(Json(LoginResponse { token }))
}
