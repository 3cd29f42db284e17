//! One-shot messages carried across a redirect in a short-lived cookie.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

pub const FLASH_COOKIE: &str = "flash";

/// Queue a message for the next page render.
pub fn set_flash(jar: CookieJar, message: impl Into<String>) -> CookieJar {
    jar.add(
        Cookie::build((FLASH_COOKIE, message.into()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .build(),
    )
}

/// Take the pending message, if any, and clear the cookie.
pub fn take_flash(jar: CookieJar) -> (CookieJar, String) {
    match jar.get(FLASH_COOKIE).map(|c| c.value().to_string()) {
        Some(message) => (jar.remove(Cookie::build(FLASH_COOKIE).path("/")), message),
        None => (jar, String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flash_is_read_once() {
        let jar = set_flash(CookieJar::new(), "Saved!");
        let (jar, message) = take_flash(jar);
        assert_eq!(message, "Saved!");

        let (_, again) = take_flash(jar);
        assert!(again.is_empty());
    }
}
