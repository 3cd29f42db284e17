//! Slug derivation and de-duplication.
//!
//! A store's slug is its slugified name, suffixed with `-<n>` when other
//! stores already use that slug or a numbered variant of it. The suffix is
//! computed by counting matches of `^(slug)(-[0-9]*)?$`; the `stores.slug`
//! UNIQUE constraint catches anything the count misses, in which case the
//! caller bumps the suffix and retries.

use regex::RegexBuilder;
use thiserror::Error;

/// Attempts made before giving up on a unique slug.
pub const MAX_SLUG_ATTEMPTS: u32 = 8;

#[derive(Debug, Error)]
#[error("could not find a free slug for '{base}' after {attempts} attempts")]
pub struct SlugConflict {
    pub base: String,
    pub attempts: u32,
}

/// Derive a URL-safe slug from a store name.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;

    for ch in name.chars() {
        let piece: &str = match ch {
            '&' => "and",
            c if c.is_ascii_alphanumeric() => {
                if pending_dash && !out.is_empty() {
                    out.push('-');
                }
                pending_dash = false;
                out.push(c.to_ascii_lowercase());
                continue;
            }
            _ => {
                pending_dash = true;
                continue;
            }
        };
        if !out.is_empty() {
            out.push('-');
        }
        out.push_str(piece);
        pending_dash = true;
    }

    if out.is_empty() {
        "store".to_string()
    } else {
        out
    }
}

/// Count how many of `existing` collide with `base` (the slug itself or a
/// numbered variant), ignoring case.
pub fn count_collisions<'a, I>(base: &str, existing: I) -> usize
where
    I: IntoIterator<Item = &'a str>,
{
    let pattern = format!("^({})(-[0-9]*)?$", regex::escape(base));
    let Ok(re) = RegexBuilder::new(&pattern).case_insensitive(true).build() else {
        return 0;
    };
    existing.into_iter().filter(|s| re.is_match(s)).count()
}

/// The slug to try on the given attempt, given `collisions` existing matches.
pub fn candidate(base: &str, collisions: usize, attempt: u32) -> String {
    if collisions == 0 && attempt == 0 {
        base.to_string()
    } else {
        format!("{}-{}", base, collisions + 1 + attempt as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_basic_names() {
        assert_eq!(slugify("Pizza Place"), "pizza-place");
        assert_eq!(slugify("  Wes's   Coffee!! "), "wes-s-coffee");
        assert_eq!(slugify("Fish & Chips"), "fish-and-chips");
        assert_eq!(slugify("Café 42"), "caf-42");
    }

    #[test]
    fn slugify_empty_falls_back() {
        assert_eq!(slugify(""), "store");
        assert_eq!(slugify("!!!"), "store");
    }

    #[test]
    fn collisions_match_numbered_variants_only() {
        let existing = ["pizza-place", "Pizza-Place-2", "pizza-place-party", "pizza"];
        assert_eq!(count_collisions("pizza-place", existing), 2);
        assert_eq!(count_collisions("pizza", existing), 1);
        assert_eq!(count_collisions("burger", existing), 0);
    }

    #[test]
    fn candidates_follow_count_then_bump() {
        assert_eq!(candidate("pizza-place", 0, 0), "pizza-place");
        assert_eq!(candidate("pizza-place", 1, 0), "pizza-place-2");
        assert_eq!(candidate("pizza-place", 1, 1), "pizza-place-3");
        assert_eq!(candidate("pizza-place", 0, 1), "pizza-place-2");
    }
}
