use axum::{
    Extension, Json,
    extract::{Multipart, Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use bytes::Bytes;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use delicious_db::geo::valid_coordinates;
use delicious_db::models::{NewStore, StoreChanges};
use delicious_types::api::{Claims, NearQuery, NearbyStore, SearchHit, SearchQuery};
use delicious_types::models::{Location, Store};

use crate::error::ApiError;
use crate::flash::{set_flash, take_flash};
use crate::middleware::CurrentUser;
use crate::pagination::{PageWindow, page_count};
use crate::photos::PhotoStore;
use crate::state::{AppState, run_db};
use crate::views::{self, EditStoreTemplate, MapTemplate, Nav, StoreCard, StoreTemplate, StoresTemplate, TagTemplate, TopStoresTemplate};

const SEARCH_LIMIT: u32 = 5;
const NEAR_RADIUS_M: f64 = 10_000.0;
const NEAR_LIMIT: usize = 10;
const TOP_LIMIT: u32 = 10;

const NOT_OWNER: &str = "You must own a store in order to edit it!";

/// Ids of the stores the user has hearted; empty when logged out.
pub(crate) async fn user_hearts(state: &AppState, user: Option<Uuid>) -> Result<Vec<Uuid>, ApiError> {
    match user {
        Some(id) => run_db(state, move |db| db.hearts_for(id)).await,
        None => Ok(Vec::new()),
    }
}

// -- Listing --

pub async fn index(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    list_page(state, user, jar, 1).await
}

pub async fn page(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
    Path(page): Path<u32>,
) -> Result<Response, ApiError> {
    list_page(state, user, jar, page).await
}

#[instrument(skip(state, user, jar))]
async fn list_page(state: AppState, user: Option<Claims>, jar: CookieJar, page: u32) -> Result<Response, ApiError> {
    let window = PageWindow::for_page(page);
    let user_id = user.as_ref().map(|c| c.sub);

    let (stores, count, hearts) = tokio::try_join!(
        run_db(&state, move |db| db.list_stores(window.skip, window.limit)),
        run_db(&state, |db| db.count_stores()),
        user_hearts(&state, user_id),
    )?;

    if let Some(last) = window.overflow_redirect(count, stores.len()) {
        debug!("Page {} is past the end, redirecting to {}", window.page, last);
        let message = format!(
            "Hey! You asked for page {}. But that doesn't exist. So I put you on page {}",
            window.page, last
        );
        return Ok((set_flash(jar, message), Redirect::to(&format!("/stores/page/{}", last))).into_response());
    }

    let (jar, flash) = take_flash(jar);
    let cards = StoreCard::list(&stores, user.as_ref(), &hearts);
    let pages = page_count(count).max(1);
    let nav = Nav::new(user.as_ref()).with_flash(flash);
    let page = StoresTemplate::page(nav, cards, window.page, pages, count);
    Ok((jar, views::render(&page)?).into_response())
}

// -- Create / edit --

/// Fields of the add/edit store form, as submitted.
#[derive(Debug, Default)]
struct StoreForm {
    name: String,
    description: String,
    tags: Vec<String>,
    address: String,
    lng: String,
    lat: String,
    photo: Option<(String, Bytes)>,
}

impl StoreForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Invalid form data: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == "photo" {
                let content_type = field.content_type().unwrap_or_default().to_string();
                let has_file = field.file_name().is_some_and(|f| !f.is_empty());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Invalid photo upload: {}", e)))?;
                // browsers send an empty part when no file was chosen
                if has_file && !data.is_empty() {
                    form.photo = Some((content_type, data));
                }
                continue;
            }

            let value = field
                .text()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Invalid form data: {}", e)))?;
            match name.as_str() {
                "name" => form.name = value,
                "description" => form.description = value,
                "tags" => form.tags.push(value),
                "address" => form.address = value,
                "lng" => form.lng = value,
                "lat" => form.lat = value,
                _ => {}
            }
        }

        Ok(form)
    }

    /// Check the text fields and build the location.
    fn location(&self) -> Result<Location, ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::BadRequest("Please enter a store name!".to_string()));
        }
        if self.address.trim().is_empty() {
            return Err(ApiError::BadRequest("You must supply an address!".to_string()));
        }
        let lng: f64 = self.lng.trim().parse().map_err(|_| ApiError::BadRequest("You must supply coordinates!".to_string()))?;
        let lat: f64 = self.lat.trim().parse().map_err(|_| ApiError::BadRequest("You must supply coordinates!".to_string()))?;
        if !valid_coordinates(lat, lng) {
            return Err(ApiError::BadRequest("Coordinates are out of range".to_string()));
        }
        Ok(Location::point(lng, lat, self.address.trim()))
    }

    async fn save_photo(&mut self, photos: &PhotoStore) -> Result<Option<String>, ApiError> {
        match self.photo.take() {
            Some((content_type, data)) => Ok(Some(photos.save(&content_type, data).await?)),
            None => Ok(None),
        }
    }
}

/// Drop a photo saved for a store write that then failed.
async fn discard_photo(photos: &PhotoStore, photo: Option<String>) {
    if let Some(name) = photo {
        photos.remove(&name).await;
    }
}

pub async fn add_page(Extension(claims): Extension<Claims>) -> Result<Response, ApiError> {
    let page = EditStoreTemplate::blank(Nav::new(Some(&claims)));
    Ok(views::render(&page)?.into_response())
}

#[instrument(skip_all, fields(user = %claims.sub))]
pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    jar: CookieJar,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut form = StoreForm::read(multipart).await?;
    let location = form.location()?;
    let photo = form.save_photo(&state.photos).await?;

    let new = NewStore {
        name: form.name.trim().to_string(),
        description: form.description.trim().to_string(),
        tags: form.tags,
        location,
        photo: photo.clone(),
        author: claims.sub,
    };
    let store = match run_db(&state, move |db| db.create_store(&new)).await {
        Ok(store) => store,
        Err(e) => {
            discard_photo(&state.photos, photo).await;
            return Err(e);
        }
    };

    info!("Created store {} ({})", store.slug, store.id);
    let message = format!("Successfully Created {}. Care to leave a review?", store.name);
    Ok((set_flash(jar, message), Redirect::to(&format!("/store/{}", store.slug))).into_response())
}

/// Load a store the current user is allowed to edit.
async fn owned_store(state: &AppState, id: Uuid, claims: &Claims) -> Result<Store, ApiError> {
    let store = run_db(state, move |db| db.get_store(id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("store {}", id)))?;
    if store.author != claims.sub {
        return Err(ApiError::Forbidden(NOT_OWNER.to_string()));
    }
    Ok(store)
}

pub async fn edit_page(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    jar: CookieJar,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let store = owned_store(&state, id, &claims).await?;
    let (jar, flash) = take_flash(jar);
    let page = EditStoreTemplate::for_store(Nav::new(Some(&claims)).with_flash(flash), &store);
    Ok((jar, views::render(&page)?).into_response())
}

#[instrument(skip_all, fields(user = %claims.sub, store = %id))]
pub async fn update(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    jar: CookieJar,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    owned_store(&state, id, &claims).await?;

    let mut form = StoreForm::read(multipart).await?;
    let location = form.location()?;
    let photo = form.save_photo(&state.photos).await?;

    let changes = StoreChanges {
        name: form.name.trim().to_string(),
        description: form.description.trim().to_string(),
        tags: form.tags,
        location,
        photo: photo.clone(),
    };
    let store = match run_db(&state, move |db| db.update_store(id, &changes)).await {
        Ok(Some(store)) => store,
        Ok(None) => {
            discard_photo(&state.photos, photo).await;
            return Err(ApiError::NotFound(format!("store {}", id)));
        }
        Err(e) => {
            discard_photo(&state.photos, photo).await;
            return Err(e);
        }
    };

    info!("Updated store {} ({})", store.slug, store.id);
    let message = format!("Successfully updated {}!", store.name);
    Ok((set_flash(jar, message), Redirect::to(&format!("/stores/{}/edit", store.id))).into_response())
}

// -- Single store --

pub async fn show(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
    Path(slug): Path<String>,
) -> Result<Response, ApiError> {
    let lookup = slug.clone();
    let detail = run_db(&state, move |db| db.store_detail(&lookup))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("store {}", slug)))?;

    let (jar, flash) = take_flash(jar);
    let page = StoreTemplate::new(Nav::new(user.as_ref()).with_flash(flash), &detail, user.as_ref());
    Ok((jar, views::render(&page)?).into_response())
}

// -- Tags --

pub async fn tags(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> Result<Response, ApiError> {
    tag_page(state, user, None).await
}

pub async fn tag(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(tag): Path<String>,
) -> Result<Response, ApiError> {
    tag_page(state, user, Some(tag)).await
}

#[instrument(skip(state, user))]
async fn tag_page(state: AppState, user: Option<Claims>, tag: Option<String>) -> Result<Response, ApiError> {
    let filter = tag.clone();
    let (counts, stores, hearts) = tokio::try_join!(
        run_db(&state, |db| db.tag_counts()),
        run_db(&state, move |db| db.stores_by_tag(filter.as_deref())),
        user_hearts(&state, user.as_ref().map(|c| c.sub)),
    )?;

    let cards = StoreCard::list(&stores, user.as_ref(), &hearts);
    let page = TagTemplate::new(Nav::new(user.as_ref()), tag.as_deref(), &counts, cards);
    Ok(views::render(&page)?.into_response())
}

// -- JSON endpoints --

#[instrument(skip_all, fields(q = %query.q))]
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<SearchHit>>, ApiError> {
    let q = query.q.trim().to_string();
    if q.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let hits = run_db(&state, move |db| db.search_stores(&q, SEARCH_LIMIT)).await?;
    Ok(Json(
        hits.into_iter()
            .map(|(store, score)| SearchHit { store, score })
            .collect(),
    ))
}

#[instrument(skip_all, fields(lat = query.lat, lng = query.lng))]
pub async fn near(
    State(state): State<AppState>,
    Query(query): Query<NearQuery>,
) -> Result<Json<Vec<NearbyStore>>, ApiError> {
    let NearQuery { lat, lng } = query;
    if !valid_coordinates(lat, lng) {
        return Err(ApiError::BadRequest("Coordinates are out of range".to_string()));
    }

    let stores = run_db(&state, move |db| db.stores_near(lat, lng, NEAR_RADIUS_M, NEAR_LIMIT)).await?;
    Ok(Json(stores))
}

// -- Other pages --

pub async fn map_page(CurrentUser(user): CurrentUser) -> Result<Response, ApiError> {
    let page = MapTemplate {
        nav: Nav::new(user.as_ref()),
        title: "Map".to_string(),
    };
    Ok(views::render(&page)?.into_response())
}

pub async fn top(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> Result<Response, ApiError> {
    let stores = run_db(&state, |db| db.top_stores(TOP_LIMIT)).await?;
    let page = TopStoresTemplate::new(Nav::new(user.as_ref()), &stores);
    Ok(views::render(&page)?.into_response())
}
