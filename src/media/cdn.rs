//! Signed CDN URLs
//!
//! The edge verifies links with a shared key rather than asking the object
//! store. The scheme:
//! - string-to-sign is the unescaped URL path followed directly by the
//!   expiry as decimal Unix seconds, e.g. `/images/cat.png1700000000`
//! - the URL carries the path percent-encoded per segment, so the edge
//!   decodes it back to exactly the signed bytes
//! - signature is lowercase hex HMAC-SHA256 of that string
//! - the URL carries `expires=<secs>&signature=<hex>`
//!
//! Verifiers in other deployments depend on this exact byte layout.

use crate::{Error, Result};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use std::time::Duration;
use url::{form_urlencoded, Url};

type HmacSha256 = Hmac<Sha256>;

pub const EXPIRES_PARAM: &str = "expires";
pub const SIGNATURE_PARAM: &str = "signature";

#[derive(Clone)]
pub struct CdnSigner {
    domain: String,
    sign_key: String,
}

impl fmt::Debug for CdnSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CdnSigner")
            .field("domain", &self.domain)
            .field("sign_key", &"<redacted>")
            .finish()
    }
}

impl CdnSigner {
    pub fn new(domain: impl Into<String>, sign_key: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            sign_key: sign_key.into(),
        }
    }

    fn check_configured(&self) -> Result<()> {
        if self.domain.is_empty() {
            return Err(Error::Configuration("CDN URL not configured".to_string()));
        }
        if self.sign_key.is_empty() {
            return Err(Error::Configuration(
                "CDN signing key not configured".to_string(),
            ));
        }
        Ok(())
    }

    /// Signed URL for `/<bucket>/<filename>` valid for `ttl` from now.
    pub fn signed_url(&self, bucket: &str, filename: &str, ttl: Duration) -> Result<String> {
        self.check_configured()?;

        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| Error::Signing(format!("invalid CDN URL lifetime: {}", e)))?;
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .ok_or_else(|| Error::Signing("CDN URL expiry out of range".to_string()))?
            .timestamp();

        self.signed_url_at(bucket, filename, expires_at)
    }

    /// Signed URL with an explicit expiry timestamp (Unix seconds).
    pub fn signed_url_at(&self, bucket: &str, filename: &str, expires_at: i64) -> Result<String> {
        self.check_configured()?;

        let mut url = Url::parse(&self.domain)
            .map_err(|e| Error::Configuration(format!("invalid CDN URL: {}", e)))?;
        if url.cannot_be_a_base() {
            return Err(Error::Configuration(format!(
                "invalid CDN URL: {}",
                self.domain
            )));
        }

        let path = format!("/{}/{}", bucket, filename);
        url.set_path(&encode_path(&path)?);

        let signature = sign(&self.sign_key, &path, expires_at)?;

        // Existing parameters survive; ours replace any of the same name.
        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| *k != EXPIRES_PARAM && *k != SIGNATURE_PARAM)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        pairs.push((EXPIRES_PARAM.to_string(), expires_at.to_string()));
        pairs.push((SIGNATURE_PARAM.to_string(), signature));
        pairs.sort_by(|a, b| a.0.cmp(&b.0));

        url.query_pairs_mut().clear().extend_pairs(pairs);

        tracing::debug!(bucket, filename, expires_at, "Signed CDN URL");
        Ok(url.to_string())
    }
}

/// Percent-encode every segment of `path`, keeping `/` as the separator.
///
/// URL parsers resolve `.` and `..` segments even when escaped as `%2E`, so
/// such paths cannot reach the edge unchanged and are refused.
fn encode_path(path: &str) -> Result<String> {
    let mut encoded = String::with_capacity(path.len());
    for (i, segment) in path.split('/').enumerate() {
        if segment == "." || segment == ".." {
            return Err(Error::Signing(format!(
                "CDN path {} contains a dot segment",
                path
            )));
        }
        if i > 0 {
            encoded.push('/');
        }
        // byte_serialize leaves a literal '+' only where the input had a space.
        let segment: String = form_urlencoded::byte_serialize(segment.as_bytes()).collect();
        encoded.push_str(&segment.replace('+', "%20"));
    }
    Ok(encoded)
}

pub fn string_to_sign(path: &str, expires_at: i64) -> String {
    format!("{}{}", path, expires_at)
}

/// Lowercase hex HMAC-SHA256 over [`string_to_sign`].
pub fn sign(key: &str, path: &str, expires_at: i64) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|e| Error::Signing(format!("invalid CDN signing key: {}", e)))?;
    mac.update(string_to_sign(path, expires_at).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check a signature the way the edge does. Expired links (`now` past
/// `expires_at`) never verify. Comparison is constant time.
pub fn verify(key: &str, path: &str, expires_at: i64, signature: &str, now: i64) -> bool {
    if now > expires_at {
        return false;
    }

    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(key.as_bytes()) else {
        return false;
    };
    mac.update(string_to_sign(path, expires_at).as_bytes());
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const GOLDEN_SIGNATURE: &str =
        "4e4cc7ff790662561a95d9431c7d6e6721d5c52e7107503c19da02690973bbd1";

    #[test]
    fn test_string_to_sign_has_no_separator() {
        assert_eq!(
            string_to_sign("/images/cat.png", 1700000000),
            "/images/cat.png1700000000"
        );
    }

    #[test]
    fn test_golden_signature() {
        let signature = sign("secret", "/images/cat.png", 1700000000).unwrap();
        assert_eq!(signature, GOLDEN_SIGNATURE);
    }

    #[test]
    fn test_second_vector() {
        let signature = sign("key", "/videos/clip.mp4", 1700003600).unwrap();
        assert_eq!(
            signature,
            "3591dcb435d9ca04e312dc65cb691ed5b6394973af85d22ecdd4b91f99778550"
        );
    }

    #[test]
    fn test_signed_url_at_layout() {
        let signer = CdnSigner::new("https://cdn.example.com", "secret");
        let url = signer
            .signed_url_at("images", "cat.png", 1700000000)
            .unwrap();

        assert_eq!(
            url,
            format!(
                "https://cdn.example.com/images/cat.png?expires=1700000000&signature={}",
                GOLDEN_SIGNATURE
            )
        );
    }

    #[test]
    fn test_existing_query_parameters_preserved() {
        let signer = CdnSigner::new("https://cdn.example.com/?zone=eu&token=a b", "secret");
        let url = signer
            .signed_url_at("images", "cat.png", 1700000000)
            .unwrap();

        assert_eq!(
            url,
            format!(
                "https://cdn.example.com/images/cat.png?expires=1700000000&signature={}&token=a+b&zone=eu",
                GOLDEN_SIGNATURE
            )
        );
    }

    #[test]
    fn test_stale_signature_parameters_replaced() {
        let signer = CdnSigner::new(
            "https://cdn.example.com/?signature=old&expires=1",
            "secret",
        );
        let url = signer
            .signed_url_at("images", "cat.png", 1700000000)
            .unwrap();

        assert_eq!(url.matches("signature=").count(), 1);
        assert_eq!(url.matches("expires=").count(), 1);
        assert!(url.contains(GOLDEN_SIGNATURE));
    }

    #[test]
    fn test_missing_domain_is_configuration_error() {
        let signer = CdnSigner::new("", "secret");
        let err = signer
            .signed_url("images", "cat.png", Duration::from_secs(60))
            .unwrap_err();

        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("CDN URL not configured"));
    }

    #[test]
    fn test_missing_key_is_configuration_error() {
        let signer = CdnSigner::new("https://cdn.example.com", "");
        let err = signer
            .signed_url("images", "cat.png", Duration::from_secs(60))
            .unwrap_err();

        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("CDN signing key not configured"));
    }

    #[test]
    fn test_unparseable_domain_rejected() {
        let signer = CdnSigner::new("cdn.example.com", "secret");
        assert!(matches!(
            signer.signed_url_at("images", "cat.png", 1700000000),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_signed_url_expiry_tracks_ttl() {
        let signer = CdnSigner::new("https://cdn.example.com", "secret");
        let before = Utc::now().timestamp();
        let url = signer
            .signed_url("videos", "clip.mp4", Duration::from_secs(3600))
            .unwrap();
        let after = Utc::now().timestamp();

        let parsed = Url::parse(&url).unwrap();
        let expires: i64 = parsed
            .query_pairs()
            .find(|(k, _)| k == EXPIRES_PARAM)
            .map(|(_, v)| v.parse().unwrap())
            .unwrap();
        let signature = parsed
            .query_pairs()
            .find(|(k, _)| k == SIGNATURE_PARAM)
            .map(|(_, v)| v.into_owned())
            .unwrap();

        assert!(expires >= before + 3600 && expires <= after + 3600);
        assert!(verify(
            "secret",
            "/videos/clip.mp4",
            expires,
            &signature,
            after
        ));
    }

    #[test]
    fn test_verify_rejects_tampering_and_expiry() {
        assert!(verify(
            "secret",
            "/images/cat.png",
            1700000000,
            GOLDEN_SIGNATURE,
            1700000000
        ));
        assert!(!verify(
            "secret",
            "/images/dog.png",
            1700000000,
            GOLDEN_SIGNATURE,
            1699999999
        ));
        assert!(!verify(
            "other",
            "/images/cat.png",
            1700000000,
            GOLDEN_SIGNATURE,
            1699999999
        ));
        assert!(!verify(
            "secret",
            "/images/cat.png",
            1700000000,
            GOLDEN_SIGNATURE,
            1700000001
        ));
        assert!(!verify(
            "secret",
            "/images/cat.png",
            1700000000,
            "not-hex",
            1699999999
        ));
    }

    /// Decode a URL path the way the edge does before checking it.
    fn decode_path(path: &str) -> String {
        let bytes = path.as_bytes();
        let mut out = Vec::with_capacity(bytes.len());
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'%' && i + 2 < bytes.len() {
                out.push(u8::from_str_radix(&path[i + 1..i + 3], 16).unwrap());
                i += 3;
            } else {
                out.push(bytes[i]);
                i += 1;
            }
        }
        String::from_utf8(out).unwrap()
    }

    fn edge_accepts(url: &str, key: &str) -> bool {
        let parsed = Url::parse(url).unwrap();
        let expires: i64 = parsed
            .query_pairs()
            .find(|(k, _)| k == EXPIRES_PARAM)
            .map(|(_, v)| v.parse().unwrap())
            .unwrap();
        let signature = parsed
            .query_pairs()
            .find(|(k, _)| k == SIGNATURE_PARAM)
            .map(|(_, v)| v.into_owned())
            .unwrap();
        verify(key, &decode_path(parsed.path()), expires, &signature, expires)
    }

    #[test]
    fn test_special_filenames_reach_edge_unchanged() {
        let signer = CdnSigner::new("https://cdn.example.com", "secret");

        for (filename, encoded) in [
            ("100%41.png", "/images/100%2541.png"),
            ("a\\b.png", "/images/a%5Cb.png"),
            ("cat png.png", "/images/cat%20png.png"),
            ("a+b.png", "/images/a%2Bb.png"),
            ("q?x#y.png", "/images/q%3Fx%23y.png"),
            ("caf\u{e9}.png", "/images/caf%C3%A9.png"),
            ("2024/05/cat.png", "/images/2024/05/cat.png"),
        ] {
            let url = signer.signed_url_at("images", filename, 1700000000).unwrap();
            let parsed = Url::parse(&url).unwrap();

            assert_eq!(parsed.path(), encoded);
            assert_eq!(decode_path(parsed.path()), format!("/images/{}", filename));
            assert!(edge_accepts(&url, "secret"), "{} does not verify", filename);
        }
    }

    #[test]
    fn test_dot_segments_rejected() {
        let signer = CdnSigner::new("https://cdn.example.com", "secret");

        for filename in ["../secrets/cat.png", "a/./b.png", ".."] {
            assert!(matches!(
                signer.signed_url_at("images", filename, 1700000000),
                Err(Error::Signing(_))
            ));
        }
        // Dots inside a name are ordinary characters.
        let url = signer.signed_url_at("images", "..cat.png", 1700000000).unwrap();
        assert!(edge_accepts(&url, "secret"));
    }

    #[test]
    fn test_debug_redacts_key() {
        let signer = CdnSigner::new("https://cdn.example.com", "top-secret");
        let debug = format!("{:?}", signer);
        assert!(!debug.contains("top-secret"));
    }
}
