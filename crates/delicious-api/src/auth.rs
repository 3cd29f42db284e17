use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Form, Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use delicious_db::EmailTaken;
use delicious_types::api::{AuthResponse, Claims, LoginRequest, RegisterRequest};

use crate::error::ApiError;
use crate::middleware::{CurrentUser, TOKEN_COOKIE};
use crate::state::{AppState, run_db};
use crate::views::{self, LoginTemplate, RegisterTemplate};

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, rename = "password-confirm")]
    pub password_confirm: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Trimmed, lowercased email.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Every problem with a registration, in form order.
pub fn validate_registration(name: &str, email: &str, password: &str) -> Vec<String> {
    let mut errors = Vec::new();
    if name.trim().is_empty() {
        errors.push("You must supply a name!".to_string());
    }
    let email = email.trim();
    if email.is_empty() || !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        errors.push("That email is not valid!".to_string());
    }
    if password.len() < MIN_PASSWORD_LEN {
        errors.push(format!("Password must be at least {} characters!", MIN_PASSWORD_LEN));
    }
    errors
}

fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {}", e)))
}

fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}

pub fn create_token(secret: &str, user_id: Uuid, name: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        name: name.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((TOKEN_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

enum Registration {
    Created(Uuid),
    EmailTaken,
}

/// Hash the password and insert the user. The unique email index decides
/// who wins when two registrations race.
async fn register_user(state: &AppState, name: &str, email: &str, password: &str) -> Result<Registration, ApiError> {
    let password_hash = hash_password(password)?;
    let (name, email) = (name.trim().to_string(), email.to_string());

    run_db(state, move |db| match db.create_user(&email, &name, &password_hash) {
        Ok(id) => Ok(Registration::Created(id)),
        Err(e) if e.downcast_ref::<EmailTaken>().is_some() => Ok(Registration::EmailTaken),
        Err(e) => Err(e),
    })
    .await
}

/// Look up the user and check the password. `None` on any mismatch.
async fn authenticate(state: &AppState, email: String, password: String) -> Result<Option<(Uuid, String)>, ApiError> {
    let user = run_db(state, move |db| db.get_user_by_email(&email)).await?;
    Ok(user
        .filter(|u| verify_password(&password, &u.password))
        .map(|u| (u.id, u.name)))
}

// -- JSON API --

#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = normalize_email(&req.email);
    let errors = validate_registration(&req.name, &email, &req.password);
    if !errors.is_empty() {
        return Err(ApiError::BadRequest(errors.join(" ")));
    }

    let user_id = match register_user(&state, &req.name, &email, &req.password).await? {
        Registration::Created(id) => id,
        Registration::EmailTaken => {
            return Err(ApiError::Conflict("That email is already registered".to_string()));
        }
    };

    let name = req.name.trim().to_string();
    let token = create_token(&state.jwt_secret, user_id, &name)?;
    info!("Registered user {}", user_id);

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user_id,
            name,
            token,
        }),
    ))
}

#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (user_id, name) = authenticate(&state, normalize_email(&req.email), req.password)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let token = create_token(&state.jwt_secret, user_id, &name)?;
    Ok(Json(AuthResponse {
        user_id,
        name,
        token,
    }))
}

// -- HTML forms --

pub async fn login_page(CurrentUser(user): CurrentUser) -> Result<Response, ApiError> {
    let page = LoginTemplate::new(user.as_ref(), "", String::new());
    Ok(views::render(&page)?.into_response())
}

pub async fn register_page(CurrentUser(user): CurrentUser) -> Result<Response, ApiError> {
    let page = RegisterTemplate::new(user.as_ref(), vec![], String::new(), String::new());
    Ok(views::render(&page)?.into_response())
}

#[instrument(skip_all)]
pub async fn login_form(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, ApiError> {
    let email = normalize_email(&form.email);
    match authenticate(&state, email.clone(), form.password).await? {
        Some((user_id, name)) => {
            let token = create_token(&state.jwt_secret, user_id, &name)?;
            Ok((jar.add(session_cookie(token)), Redirect::to("/")).into_response())
        }
        None => {
            let page = LoginTemplate::new(None, "Invalid email or password", email);
            Ok((StatusCode::UNAUTHORIZED, views::render(&page)?).into_response())
        }
    }
}

#[instrument(skip_all)]
pub async fn register_form(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<RegisterForm>,
) -> Result<Response, ApiError> {
    let email = normalize_email(&form.email);
    let mut errors = validate_registration(&form.name, &email, &form.password);
    if form.password != form.password_confirm {
        errors.push("Oops! Your passwords do not match".to_string());
    }

    if errors.is_empty() {
        if let Registration::Created(user_id) = register_user(&state, &form.name, &email, &form.password).await? {
            let token = create_token(&state.jwt_secret, user_id, form.name.trim())?;
            info!("Registered user {}", user_id);
            return Ok((jar.add(session_cookie(token)), Redirect::to("/")).into_response());
        }
        errors.push("That email is already registered".to_string());
    }

    let page = RegisterTemplate::new(None, errors, form.name, email);
    Ok((StatusCode::BAD_REQUEST, views::render(&page)?).into_response())
}

pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    (jar.remove(Cookie::build(TOKEN_COOKIE).path("/")), Redirect::to("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::decode_claims;

    #[test]
    fn registration_validation_collects_errors() {
        assert!(validate_registration("Wes", "wes@example.com", "hunter22!").is_empty());
        let errors = validate_registration(" ", "nope", "short");
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Wes@Example.COM "), "wes@example.com");
    }

    #[test]
    fn password_hash_roundtrip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("anything", "not-a-hash"));
    }

    #[test]
    fn tokens_decode_with_the_same_secret_only() {
        let id = Uuid::new_v4();
        let token = create_token("secret-a", id, "Wes").unwrap();
        let claims = decode_claims(&token, "secret-a").unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(claims.name, "Wes");
        assert!(decode_claims(&token, "secret-b").is_none());
    }
}
