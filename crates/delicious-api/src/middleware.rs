use std::convert::Infallible;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, StatusCode, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{DecodingKey, Validation, decode};

use delicious_types::api::Claims;

use crate::state::AppState;

/// Cookie carrying the session token for browser requests.
pub const TOKEN_COOKIE: &str = "token";

/// Find a session token in the Authorization header or the token cookie.
fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::to_string);

    bearer.or_else(|| {
        CookieJar::from_headers(headers)
            .get(TOKEN_COOKIE)
            .map(|c| c.value().to_string())
    })
}

pub fn decode_claims(token: &str, secret: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .ok()
}

/// Reject requests without a valid session. Pages redirect to the login
/// form; `/api/` routes get a bare 401.
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let claims = token_from_headers(req.headers()).and_then(|t| decode_claims(&t, &state.jwt_secret));

    match claims {
        Some(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        None if req.uri().path().starts_with("/api/") => StatusCode::UNAUTHORIZED.into_response(),
        None => Redirect::to("/login").into_response(),
    }
}

/// The logged-in user, if any. Never rejects.
pub struct CurrentUser(pub Option<Claims>);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(claims) = parts.extensions.get::<Claims>() {
            return Ok(Self(Some(claims.clone())));
        }
        let claims = token_from_headers(&parts.headers).and_then(|t| decode_claims(&t, &state.jwt_secret));
        Ok(Self(claims))
    }
}
