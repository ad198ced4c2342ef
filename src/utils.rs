//! Utility functions for token generation and URL inspection.

use rand::distr::Alphanumeric;
use rand::Rng;
use std::path::Path;
use url::Url;

/// File extensions that Telegram plays back as animations.
const ANIMATION_EXTENSIONS: &[&str] = &["gif", "mp4"];

/// Generates a random token of `len` ASCII letters and digits.
///
/// Uses the thread-local CSPRNG, so tokens are unpredictable.
///
/// # Examples
///
/// ```
/// use inline_units::utils::rand_token;
/// let token = rand_token(30);
/// assert_eq!(token.len(), 30);
/// assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
/// ```
#[must_use]
pub fn rand_token(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Returns `true` if `url` is an absolute URL with a scheme and a host.
///
/// # Examples
///
/// ```
/// use inline_units::utils::check_url;
/// assert!(check_url("https://t.me/durov"));
/// assert!(!check_url("t.me/durov"));
/// assert!(!check_url("mailto:someone@example.com"));
/// ```
#[must_use]
pub fn check_url(url: &str) -> bool {
    parse_url(url).is_some()
}

/// Parses `url`, keeping it only if it has a host.
#[must_use]
pub fn parse_url(url: &str) -> Option<Url> {
    Url::parse(url)
        .ok()
        .filter(|parsed| parsed.host_str().is_some_and(|host| !host.is_empty()))
}

/// Returns `true` if the URL path ends in an extension Telegram treats as an animation.
#[must_use]
pub fn is_animation_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };

    Path::new(parsed.path())
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            ANIMATION_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Picks a file extension for an uploaded document from its MIME type.
#[must_use]
pub fn extension_for_mime(mime_type: &str) -> &str {
    match mime_type {
        "application/pdf" => "pdf",
        "application/zip" => "zip",
        "application/json" => "json",
        "text/plain" => "txt",
        other => other
            .rsplit_once('/')
            .map_or("bin", |(_, subtype)| subtype),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rand_token_length_and_alphabet() {
        for len in [0, 1, 10, 30, 64] {
            let token = rand_token(len);
            assert_eq!(token.len(), len);
            assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn test_rand_token_is_not_repeated() {
        assert_ne!(rand_token(30), rand_token(30));
    }

    #[test]
    fn test_check_url() {
        assert!(check_url("https://example.com"));
        assert!(check_url("http://example.com/path?q=1"));
        assert!(check_url("tg://resolve?domain=durov"));
        assert!(!check_url(""));
        assert!(!check_url("not a url"));
        assert!(!check_url("/relative/path"));
        assert!(!check_url("file:///etc/passwd"));
    }

    #[test]
    fn test_is_animation_url() {
        assert!(is_animation_url("https://example.com/cat.gif"));
        assert!(is_animation_url("https://example.com/clip.MP4?x=1"));
        assert!(!is_animation_url("https://example.com/cat.png"));
        assert!(!is_animation_url("https://example.com/gif"));
        assert!(!is_animation_url("garbage"));
    }

    #[test]
    fn test_extension_for_mime() {
        assert_eq!(extension_for_mime("application/pdf"), "pdf");
        assert_eq!(extension_for_mime("application/zip"), "zip");
        assert_eq!(extension_for_mime("image/webp"), "webp");
        assert_eq!(extension_for_mime("weird"), "bin");
    }
}
