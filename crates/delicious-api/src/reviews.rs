use axum::{
    Extension, Form,
    extract::{Path, State},
    response::Redirect,
};
use tracing::{info, instrument};
use uuid::Uuid;

use delicious_db::models::NewReview;
use delicious_types::api::{Claims, ReviewForm};

use crate::error::ApiError;
use crate::state::{AppState, run_db};

/// Parse and check a submitted review. Returns the trimmed text and rating.
pub fn validate_review(form: &ReviewForm) -> Result<(String, u8), ApiError> {
    let text = form.text.trim();
    if text.is_empty() {
        return Err(ApiError::BadRequest("Your review needs some text!".to_string()));
    }
    let rating = form
        .rating
        .trim()
        .parse::<u8>()
        .ok()
        .filter(|r| (1..=5).contains(r))
        .ok_or_else(|| ApiError::BadRequest("Rating must be between 1 and 5".to_string()))?;
    Ok((text.to_string(), rating))
}

#[instrument(skip_all, fields(user = %claims.sub, store = %store_id))]
pub async fn add_review(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(store_id): Path<Uuid>,
    Form(form): Form<ReviewForm>,
) -> Result<Redirect, ApiError> {
    let (text, rating) = validate_review(&form)?;

    let store = run_db(&state, move |db| db.get_store(store_id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("store {}", store_id)))?;

    let new = NewReview {
        store: store.id,
        author: claims.sub,
        text,
        rating,
    };
    let review = run_db(&state, move |db| db.create_review(&new)).await?;

    info!("Review {} added to {}", review.id, store.slug);
    Ok(Redirect::to(&format!("/store/{}", store.slug)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(text: &str, rating: &str) -> ReviewForm {
        ReviewForm {
            text: text.to_string(),
            rating: rating.to_string(),
        }
    }

    #[test]
    fn accepts_ratings_one_to_five() {
        assert_eq!(validate_review(&form(" Great ", "5")).unwrap(), ("Great".to_string(), 5));
        assert_eq!(validate_review(&form("ok", "1")).unwrap().1, 1);
    }

    #[test]
    fn rejects_bad_reviews() {
        assert!(validate_review(&form("", "3")).is_err());
        assert!(validate_review(&form("fine", "0")).is_err());
        assert!(validate_review(&form("fine", "6")).is_err());
        assert!(validate_review(&form("fine", "")).is_err());
        assert!(validate_review(&form("fine", "four")).is_err());
    }
}
