//! Click-tracking tokens and redirect URLs.
//!
//! Each history record gets a fresh random token. Only its SHA-256 is
//! stored; the plain token travels inside the CTA links.

use base64::Engine as _;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use url::Url;

use super::template::RenderedCta;
use crate::{Error, Result};

/// Path prefix of the redirect endpoint.
pub const TRACK_PATH: &str = "/api/v1/notification/track";

/// 32 random bytes, base64url encoded.
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    URL_SAFE.encode(bytes)
}

/// Hex-encoded SHA-256 of a token.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Check a presented token against the stored hash.
pub fn verify_token(token: &str, stored_hash: &str) -> bool {
    let presented = hash_token(token);
    // Fixed-length hex strings; compare without early exit.
    presented.len() == stored_hash.len()
        && presented
            .bytes()
            .zip(stored_hash.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

/// Redirect URL for CTA `cta_index` of history record `history_id`.
pub fn tracking_url(
    base_url: &str,
    history_id: &str,
    cta_index: usize,
    token: &str,
    original_url: &str,
) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("token", token)
        .append_pair("url", &URL_SAFE.encode(original_url.as_bytes()))
        .finish();
    format!(
        "{}{}/{}/{}?{}",
        base_url.trim_end_matches('/'),
        TRACK_PATH,
        history_id,
        cta_index,
        query
    )
}

/// Point every CTA at the redirect endpoint. `original_url` is left untouched.
pub fn rewrite_ctas(ctas: &mut [RenderedCta], base_url: &str, history_id: &str, token: &str) {
    for (index, cta) in ctas.iter_mut().enumerate() {
        cta.action = tracking_url(base_url, history_id, index, token, &cta.original_url);
    }
}

/// Decode the `url` query parameter back into an http(s) URL.
pub fn decode_target(encoded: &str) -> Result<Url> {
    let bytes = URL_SAFE
        .decode(encoded)
        .or_else(|_| URL_SAFE_NO_PAD.decode(encoded))
        .map_err(|e| Error::validation(format!("invalid url encoding: {e}")))?;
    let text = String::from_utf8(bytes)
        .map_err(|_| Error::validation("decoded url is not valid UTF-8"))?;
    let target =
        Url::parse(&text).map_err(|e| Error::validation(format!("invalid target url: {e}")))?;

    match target.scheme() {
        "http" | "https" => Ok(target),
        other => Err(Error::validation(format!(
            "unsupported target scheme: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert_eq!(URL_SAFE.decode(&a).unwrap().len(), 32);
        assert!(!a.contains('+') && !a.contains('/'));
    }

    #[test]
    fn test_verify_token() {
        let token = generate_token();
        let hash = hash_token(&token);
        assert_eq!(hash.len(), 64);
        assert!(verify_token(&token, &hash));
        assert!(!verify_token("other", &hash));
        assert!(!verify_token(&token, "short"));
    }

    #[test]
    fn test_tracking_url_round_trip() {
        let link = tracking_url(
            "https://api.example.com/",
            "h1",
            2,
            "tok=",
            "https://shop/o?id=1",
        );
        let parsed = Url::parse(&link).unwrap();
        assert_eq!(parsed.path(), "/api/v1/notification/track/h1/2");

        let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(pairs["token"], "tok=");
        assert_eq!(
            decode_target(&pairs["url"]).unwrap().as_str(),
            "https://shop/o?id=1"
        );
    }

    #[test]
    fn test_rewrite_ctas_keeps_original() {
        let mut ctas = vec![
            RenderedCta {
                label: "A".into(),
                action: "https://a".into(),
                style: String::new(),
                original_url: "https://a".into(),
            },
            RenderedCta {
                label: "B".into(),
                action: "https://b".into(),
                style: "primary".into(),
                original_url: "https://b".into(),
            },
        ];
        rewrite_ctas(&mut ctas, "http://localhost:12580", "h", "t");

        assert!(
            ctas[1]
                .action
                .starts_with("http://localhost:12580/api/v1/notification/track/h/1?token=t&url=")
        );
        assert_eq!(ctas[1].original_url, "https://b");
    }

    #[test]
    fn test_decode_target_rejects_bad_input() {
        assert!(decode_target("***").is_err());
        assert!(decode_target(&URL_SAFE.encode("javascript:alert(1)")).is_err());
        assert!(decode_target(&URL_SAFE.encode("not a url")).is_err());
        assert!(decode_target(&URL_SAFE_NO_PAD.encode("http://x/")).is_ok());
    }
}
