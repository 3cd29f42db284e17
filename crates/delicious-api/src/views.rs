//! Page templates and the flattened view models they render.
//!
//! Templates only ever see plain strings, numbers and flags; every
//! decision (is this the author, is it hearted, which tag is active) is
//! made here.

use askama::Template;
use axum::response::Html;
use uuid::Uuid;

use delicious_types::api::Claims;
use delicious_types::models::{Review, Store, StoreDetail, TagCount, TopStore};

use crate::error::ApiError;

/// Tags offered on the store form.
pub const TAG_CHOICES: [&str; 5] = ["Wifi", "Open Late", "Family Friendly", "Vegetarian", "Licensed"];

/// Shown for stores without an uploaded photo.
const PLACEHOLDER_PHOTO: &str = "store.png";

const EXCERPT_WORDS: usize = 25;

pub fn render<T: Template>(page: &T) -> Result<Html<String>, ApiError> {
    Ok(Html(page.render()?))
}

/// Navigation state shared by every page.
pub struct Nav {
    pub logged_in: bool,
    pub user_name: String,
    /// Message left by the previous redirect; empty when there is none.
    pub flash: String,
}

impl Nav {
    pub fn new(user: Option<&Claims>) -> Self {
        Self {
            logged_in: user.is_some(),
            user_name: user.map(|c| c.name.clone()).unwrap_or_default(),
            flash: String::new(),
        }
    }

    pub fn with_flash(mut self, flash: String) -> Self {
        self.flash = flash;
        self
    }
}

pub fn photo_url(photo: Option<&str>) -> String {
    format!("/uploads/{}", photo.unwrap_or(PLACEHOLDER_PHOTO))
}

fn excerpt(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= EXCERPT_WORDS {
        words.join(" ")
    } else {
        format!("{}...", words[..EXCERPT_WORDS].join(" "))
    }
}

pub struct StoreCard {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub excerpt: String,
    pub photo_url: String,
    pub review_count: u32,
    pub hearted: bool,
    pub can_edit: bool,
}

impl StoreCard {
    pub fn new(store: &Store, user: Option<&Claims>, hearts: &[Uuid]) -> Self {
        Self {
            id: store.id.to_string(),
            slug: store.slug.clone(),
            name: store.name.clone(),
            excerpt: excerpt(&store.description),
            photo_url: photo_url(store.photo.as_deref()),
            review_count: store.review_count,
            hearted: hearts.contains(&store.id),
            can_edit: user.is_some_and(|c| c.sub == store.author),
        }
    }

    pub fn list(stores: &[Store], user: Option<&Claims>, hearts: &[Uuid]) -> Vec<Self> {
        stores.iter().map(|s| Self::new(s, user, hearts)).collect()
    }
}

// -- Store listing --

#[derive(Template)]
#[template(path = "stores.html")]
pub struct StoresTemplate {
    pub nav: Nav,
    pub title: String,
    pub stores: Vec<StoreCard>,
    pub paged: bool,
    pub page: u32,
    pub pages: u32,
    pub count: u32,
    pub has_prev: bool,
    pub has_next: bool,
}

impl StoresTemplate {
    pub fn page(nav: Nav, stores: Vec<StoreCard>, page: u32, pages: u32, count: u32) -> Self {
        Self {
            nav,
            title: "Stores".to_string(),
            stores,
            paged: true,
            page,
            pages,
            count,
            has_prev: page > 1,
            has_next: page < pages,
        }
    }

    pub fn unpaged(nav: Nav, title: &str, stores: Vec<StoreCard>) -> Self {
        let count = stores.len() as u32;
        Self {
            nav,
            title: title.to_string(),
            stores,
            paged: false,
            page: 1,
            pages: 1,
            count,
            has_prev: false,
            has_next: false,
        }
    }
}

// -- Single store --

pub struct ReviewView {
    pub author: String,
    pub text: String,
    pub stars: String,
    pub created: String,
}

impl From<&Review> for ReviewView {
    fn from(review: &Review) -> Self {
        let rating = review.rating.min(5) as usize;
        Self {
            author: review.author.name.clone(),
            text: review.text.clone(),
            stars: format!("{}{}", "★".repeat(rating), "☆".repeat(5 - rating)),
            created: review.created.format("%B %e, %Y").to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "store.html")]
pub struct StoreTemplate {
    pub nav: Nav,
    pub title: String,
    pub id: String,
    pub name: String,
    pub description: String,
    pub address: String,
    pub tags: Vec<String>,
    pub photo_url: String,
    pub author: String,
    pub can_edit: bool,
    pub reviews: Vec<ReviewView>,
}

impl StoreTemplate {
    pub fn new(nav: Nav, detail: &StoreDetail, user: Option<&Claims>) -> Self {
        let store = &detail.store;
        Self {
            nav,
            title: store.name.clone(),
            id: store.id.to_string(),
            name: store.name.clone(),
            description: store.description.clone(),
            address: store.location.address.clone(),
            tags: store.tags.clone(),
            photo_url: photo_url(store.photo.as_deref()),
            author: detail.author.as_ref().map(|a| a.name.clone()).unwrap_or_default(),
            can_edit: user.is_some_and(|c| c.sub == store.author),
            reviews: detail.reviews.iter().map(ReviewView::from).collect(),
        }
    }
}

// -- Add / edit form --

pub struct TagOption {
    pub value: String,
    pub checked: bool,
}

#[derive(Template)]
#[template(path = "edit_store.html")]
pub struct EditStoreTemplate {
    pub nav: Nav,
    pub title: String,
    pub action: String,
    pub name: String,
    pub description: String,
    pub address: String,
    pub lng: String,
    pub lat: String,
    pub tag_options: Vec<TagOption>,
}

impl EditStoreTemplate {
    pub fn blank(nav: Nav) -> Self {
        Self {
            nav,
            title: "Add Store".to_string(),
            action: "/add".to_string(),
            name: String::new(),
            description: String::new(),
            address: String::new(),
            lng: String::new(),
            lat: String::new(),
            tag_options: tag_options(&[]),
        }
    }

    pub fn for_store(nav: Nav, store: &Store) -> Self {
        Self {
            nav,
            title: format!("Edit {}", store.name),
            action: format!("/add/{}", store.id),
            name: store.name.clone(),
            description: store.description.clone(),
            address: store.location.address.clone(),
            lng: store.location.lng().to_string(),
            lat: store.location.lat().to_string(),
            tag_options: tag_options(&store.tags),
        }
    }
}

fn tag_options(selected: &[String]) -> Vec<TagOption> {
    TAG_CHOICES
        .iter()
        .map(|choice| TagOption {
            value: choice.to_string(),
            checked: selected.iter().any(|t| t == choice),
        })
        .collect()
}

// -- Tags --

pub struct TagLink {
    pub tag: String,
    pub count: u32,
    pub active: bool,
}

#[derive(Template)]
#[template(path = "tag.html")]
pub struct TagTemplate {
    pub nav: Nav,
    pub title: String,
    pub tags: Vec<TagLink>,
    pub stores: Vec<StoreCard>,
}

impl TagTemplate {
    pub fn new(nav: Nav, active: Option<&str>, counts: &[TagCount], stores: Vec<StoreCard>) -> Self {
        Self {
            nav,
            title: active.unwrap_or("Tags").to_string(),
            tags: counts
                .iter()
                .map(|c| TagLink {
                    tag: c.tag.clone(),
                    count: c.count,
                    active: active == Some(c.tag.as_str()),
                })
                .collect(),
            stores,
        }
    }
}

// -- Top stores --

pub struct TopRow {
    pub rank: usize,
    pub name: String,
    pub slug: String,
    pub photo_url: String,
    pub review_count: u32,
    pub average: String,
}

#[derive(Template)]
#[template(path = "top_stores.html")]
pub struct TopStoresTemplate {
    pub nav: Nav,
    pub title: String,
    pub stores: Vec<TopRow>,
}

impl TopStoresTemplate {
    pub fn new(nav: Nav, stores: &[TopStore]) -> Self {
        Self {
            nav,
            title: format!("Top {} Stores", stores.len()),
            stores: stores
                .iter()
                .enumerate()
                .map(|(i, s)| TopRow {
                    rank: i + 1,
                    name: s.name.clone(),
                    slug: s.slug.clone(),
                    photo_url: photo_url(s.photo.as_deref()),
                    review_count: s.review_count,
                    average: format!("{:.1}", s.average_rating),
                })
                .collect(),
        }
    }
}

#[derive(Template)]
#[template(path = "map.html")]
pub struct MapTemplate {
    pub nav: Nav,
    pub title: String,
}

// -- Auth pages --

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub nav: Nav,
    pub title: String,
    pub error: String,
    pub email: String,
}

impl LoginTemplate {
    pub fn new(user: Option<&Claims>, error: &str, email: String) -> Self {
        Self {
            nav: Nav::new(user),
            title: "Login".to_string(),
            error: error.to_string(),
            email,
        }
    }
}

#[derive(Template)]
#[template(path = "register.html")]
pub struct RegisterTemplate {
    pub nav: Nav,
    pub title: String,
    pub errors: Vec<String>,
    pub name: String,
    pub email: String,
}

impl RegisterTemplate {
    pub fn new(user: Option<&Claims>, errors: Vec<String>, name: String, email: String) -> Self {
        Self {
            nav: Nav::new(user),
            title: "Register".to_string(),
            errors,
            name,
            email,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_truncates_long_descriptions() {
        let long = "word ".repeat(40);
        let short = excerpt(&long);
        assert_eq!(short.split_whitespace().count(), EXCERPT_WORDS);
        assert!(short.ends_with("..."));
        assert_eq!(excerpt("tasty  pizza"), "tasty pizza");
    }

    #[test]
    fn missing_photos_use_placeholder() {
        assert_eq!(photo_url(None), "/uploads/store.png");
        assert_eq!(photo_url(Some("abc.jpeg")), "/uploads/abc.jpeg");
    }

    #[test]
    fn login_page_escapes_user_input() {
        let page = LoginTemplate::new(None, "", "<script>@x".to_string());
        let html = page.render().unwrap();
        assert!(!html.contains("<script>@x"));
        assert!(html.contains("&lt;script&gt;@x"));
    }

    #[test]
    fn tag_page_marks_active_tag() {
        let counts = vec![
            TagCount { tag: "Wifi".into(), count: 3 },
            TagCount { tag: "Licensed".into(), count: 1 },
        ];
        let page = TagTemplate::new(Nav::new(None), Some("Licensed"), &counts, vec![]);
        assert!(!page.tags[0].active);
        assert!(page.tags[1].active);
        assert_eq!(page.title, "Licensed");
    }
}
