//! HMAC-SHA256 request signatures for inbound action webhooks.
//!
//! The signature header is `<scheme>=<hex digest>` and the timestamp header is
//! unix seconds. The digest always covers the raw body bytes.

use std::str::FromStr;
use std::time::Duration;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use time::OffsetDateTime;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-signature";
pub const TIMESTAMP_HEADER: &str = "x-request-timestamp";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("missing {0} header")]
    MissingHeader(&'static str),
    #[error("timestamp is not a unix time")]
    InvalidTimestamp,
    #[error("timestamp is {skew}s away from now")]
    Expired { skew: u64 },
    #[error("malformed signature header")]
    MalformedSignature,
    #[error("unsupported signature scheme {0}")]
    UnknownScheme(String),
    #[error("signature mismatch")]
    Mismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    /// Vendor format, signs `v0:{ts}:{body}`.
    V0,
    /// Generic format, signs `{ts}.{body}`.
    Sha256,
}

impl SignatureScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureScheme::V0 => "v0",
            SignatureScheme::Sha256 => "sha256",
        }
    }

    fn feed(&self, mac: &mut HmacSha256, timestamp: &str, body: &[u8]) {
        match self {
            SignatureScheme::V0 => {
                mac.update(b"v0:");
                mac.update(timestamp.as_bytes());
                mac.update(b":");
            }
            SignatureScheme::Sha256 => {
                mac.update(timestamp.as_bytes());
                mac.update(b".");
            }
        }
        mac.update(body);
    }
}

impl FromStr for SignatureScheme {
    type Err = VerifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "v0" => Ok(SignatureScheme::V0),
            "sha256" => Ok(SignatureScheme::Sha256),
            other => Err(VerifyError::UnknownScheme(other.to_string())),
        }
    }
}

#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Vec<u8>,
    tolerance: Duration,
}

impl SignatureVerifier {
    pub fn new(secret: impl AsRef<[u8]>, tolerance: Duration) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            tolerance,
        }
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length.
        HmacSha256::new_from_slice(&self.secret).expect("hmac key of any size")
    }

    pub fn verify(
        &self,
        signature: Option<&str>,
        timestamp: Option<&str>,
        body: &[u8],
    ) -> Result<(), VerifyError> {
        self.verify_at(signature, timestamp, body, OffsetDateTime::now_utc().unix_timestamp())
    }

    pub fn verify_at(
        &self,
        signature: Option<&str>,
        timestamp: Option<&str>,
        body: &[u8],
        now: i64,
    ) -> Result<(), VerifyError> {
        let signature = signature.ok_or(VerifyError::MissingHeader(SIGNATURE_HEADER))?;
        let timestamp = timestamp
            .ok_or(VerifyError::MissingHeader(TIMESTAMP_HEADER))?
            .trim();

        let ts: i64 = timestamp.parse().map_err(|_| VerifyError::InvalidTimestamp)?;
        let skew = now.abs_diff(ts);
        if skew > self.tolerance.as_secs() {
            return Err(VerifyError::Expired { skew });
        }

        let (scheme, digest) = signature
            .trim()
            .split_once('=')
            .ok_or(VerifyError::MalformedSignature)?;
        let scheme: SignatureScheme = scheme.parse()?;
        let expected = hex::decode(digest).map_err(|_| VerifyError::MalformedSignature)?;

        let mut mac = self.mac();
        scheme.feed(&mut mac, timestamp, body);
        mac.verify_slice(&expected).map_err(|_| VerifyError::Mismatch)
    }

    /// Produces a header value for `body`; used by callers that sign outbound requests.
    pub fn sign(&self, scheme: SignatureScheme, timestamp: i64, body: &[u8]) -> String {
        let mut mac = self.mac();
        scheme.feed(&mut mac, &timestamp.to_string(), body);
        format!("{}={}", scheme.as_str(), hex::encode(mac.finalize().into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;
    const BODY: &[u8] = br#"{"resource":{"id":"a1","type":"file"}}"#;

    fn verifier() -> SignatureVerifier {
        SignatureVerifier::new("shh", Duration::from_secs(300))
    }

    fn check(sig: &str, ts: i64) -> Result<(), VerifyError> {
        verifier().verify_at(Some(sig), Some(&ts.to_string()), BODY, NOW)
    }

    #[test]
    fn accepts_both_schemes_within_tolerance() {
        let v = verifier();
        for scheme in [SignatureScheme::V0, SignatureScheme::Sha256] {
            assert_eq!(check(&v.sign(scheme, NOW - 299, BODY), NOW - 299), Ok(()));
            assert_eq!(check(&v.sign(scheme, NOW + 300, BODY), NOW + 300), Ok(()));
        }
    }

    #[test]
    fn rejects_stale_timestamps() {
        let v = verifier();
        let sig = v.sign(SignatureScheme::V0, NOW - 301, BODY);
        assert_eq!(check(&sig, NOW - 301), Err(VerifyError::Expired { skew: 301 }));
    }

    #[test]
    fn schemes_are_not_interchangeable() {
        let v = verifier();
        let generic = v.sign(SignatureScheme::Sha256, NOW, BODY);
        let digest = generic.split_once('=').unwrap().1;
        assert_eq!(check(&format!("v0={}", digest), NOW), Err(VerifyError::Mismatch));
    }

    #[test]
    fn rejects_tampered_body_and_bad_headers() {
        let v = verifier();
        let sig = v.sign(SignatureScheme::V0, NOW, BODY);
        assert_eq!(
            v.verify_at(Some(&sig), Some(&NOW.to_string()), b"{}", NOW),
            Err(VerifyError::Mismatch)
        );
        assert_eq!(
            v.verify_at(None, Some(&NOW.to_string()), BODY, NOW),
            Err(VerifyError::MissingHeader(SIGNATURE_HEADER))
        );
        assert_eq!(
            v.verify_at(Some(&sig), None, BODY, NOW),
            Err(VerifyError::MissingHeader(TIMESTAMP_HEADER))
        );
        assert_eq!(
            v.verify_at(Some(&sig), Some("yesterday"), BODY, NOW),
            Err(VerifyError::InvalidTimestamp)
        );
        assert_eq!(check("v0", NOW), Err(VerifyError::MalformedSignature));
        assert_eq!(check("v0=zz", NOW), Err(VerifyError::MalformedSignature));
        assert_eq!(
            check("md5=abcd", NOW),
            Err(VerifyError::UnknownScheme("md5".into()))
        );
    }
}
