use std::sync::OnceLock;

use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use password_hash::rand_core::OsRng;
use sea_orm::{ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, EntityTrait, QueryFilter, Set};
use secrecy::ExposeSecret;
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit,
    config::JwtConfig,
    dto::auth::{Claims, LoginRequest, RegisterRequest, TokenResponse},
    entity::{
        Role,
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users, Model as UserModel},
    },
    error::{AppError, AppResult},
    models::User,
    state::AppState,
};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(password: &str, password_hash: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Credential check for login: an unreadable stored hash counts as a mismatch.
fn password_matches(password: &str, password_hash: &str) -> bool {
    verify_password(password, password_hash).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "stored password hash could not be parsed");
        false
    })
}

/// Hash checked when the email is unknown, so a failed login costs the same
/// whether or not the account exists.
fn dummy_hash() -> &'static str {
    static DUMMY: OnceLock<String> = OnceLock::new();
    DUMMY.get_or_init(|| hash_password("not-a-real-password").unwrap_or_default())
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn issue_token(jwt: &JwtConfig, user_id: Uuid, role: Role) -> AppResult<String> {
    let now = Utc::now();
    let expiration = now
        .checked_add_signed(
            chrono::Duration::from_std(jwt.expires_in)
                .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?,
        )
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user_id.to_string(),
        role,
        iat: now.timestamp() as u64,
        exp: expiration.timestamp() as u64,
    };

    encode(
        &Header::new(jwt.algorithm),
        &claims,
        &EncodingKey::from_secret(jwt.secret.expose_secret().as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

pub fn decode_token(jwt: &JwtConfig, token: &str) -> AppResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt.secret.expose_secret().as_bytes()),
        &Validation::new(jwt.algorithm),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))
}

/// Resolve a bearer token to an active user.
pub async fn authenticate(state: &AppState, token: &str) -> AppResult<UserModel> {
    let claims = decode_token(&state.config.jwt, token)?;
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Unauthorized("Invalid token".into()))?;

    Users::find_by_id(user_id)
        .filter(UserCol::IsActive.eq(true))
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found or inactive".into()))
}

pub async fn register_user(state: &AppState, mut payload: RegisterRequest) -> AppResult<User> {
    payload.email = normalize_email(&payload.email);
    payload.validate()?;
    let RegisterRequest {
        email,
        password,
        first_name,
        last_name,
    } = payload;

    let exist = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .one(&state.orm)
        .await?;
    if exist.is_some() {
        return Err(AppError::Conflict("Email is already registered".into()));
    }

    let password_hash = hash_password(&password)?;

    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email),
        password_hash: Set(password_hash),
        first_name: Set(first_name.filter(|s| !s.trim().is_empty())),
        last_name: Set(last_name.filter(|s| !s.trim().is_empty())),
        role: Set(Role::Customer),
        is_active: Set(true),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await
    .map_err(|err| match err.sql_err() {
        Some(sea_orm::SqlErr::UniqueConstraintViolation(_)) => {
            AppError::Conflict("Email is already registered".into())
        }
        _ => AppError::OrmError(err),
    })?;

    tracing::info!(user_id = %user.id, "user registered");
    audit::record(
        &state.orm,
        Some(user.id),
        "user_register",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(User::from(user))
}

pub async fn login_user(state: &AppState, payload: LoginRequest) -> AppResult<TokenResponse> {
    let email = normalize_email(&payload.email);
    let user = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .one(&state.orm)
        .await?;

    let user = match user {
        Some(u) => u,
        None => {
            let _ = password_matches(&payload.password, dummy_hash());
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.into()));
        }
    };

    if !password_matches(&payload.password, &user.password_hash) || !user.is_active {
        return Err(AppError::Unauthorized(INVALID_CREDENTIALS.into()));
    }

    let token = issue_token(&state.config.jwt, user.id, user.role)?;

    audit::record(
        &state.orm,
        Some(user.id),
        "user_login",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(TokenResponse::bearer(token))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use jsonwebtoken::Algorithm;
    use secrecy::SecretString;

    use super::*;

    fn jwt_config(expires_in: Duration) -> JwtConfig {
        JwtConfig {
            secret: SecretString::from("unit-test-secret".to_string()),
            algorithm: Algorithm::HS256,
            expires_in,
        }
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong horse", &hash).unwrap());
    }

    #[test]
    fn dummy_hash_never_matches_empty_password() {
        assert!(!verify_password("", dummy_hash()).unwrap());
    }

    #[test]
    fn unparseable_stored_hash_is_a_mismatch() {
        assert!(verify_password("secret", "not-a-hash").is_err());
        assert!(!password_matches("secret", "not-a-hash"));
        assert!(!password_matches("secret", ""));
    }

    #[test]
    fn token_carries_subject_and_role() {
        let jwt = jwt_config(Duration::from_secs(30 * 60));
        let user_id = Uuid::new_v4();
        let token = issue_token(&jwt, user_id, Role::Admin).unwrap();

        let claims = decode_token(&jwt, &token).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.role, Role::Admin);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let jwt = jwt_config(Duration::from_secs(60));
        let token = issue_token(&jwt, Uuid::new_v4(), Role::Customer).unwrap();

        let other = JwtConfig {
            secret: SecretString::from("another-secret".to_string()),
            ..jwt
        };
        let err = decode_token(&other, &token).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let jwt = jwt_config(Duration::from_secs(60));
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            role: Role::Customer,
            iat: 1_000,
            exp: 2_000,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"unit-test-secret"),
        )
        .unwrap();

        assert!(matches!(
            decode_token(&jwt, &token),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn emails_are_trimmed_and_lowercased() {
        assert_eq!(normalize_email("  Reader@Example.COM "), "reader@example.com");
    }
}
