//! Observation fingerprints.
//!
//! A fingerprint identifies the state of a target at one point in time:
//! either the SHA3-512 digest of its extracted text, or its normalized
//! `Last-Modified` header.

use chrono::{DateTime, NaiveDateTime, Utc};
use sha3::{Digest, Sha3_512};

use crate::error::{AppError, Result};
use crate::models::{DetectionMode, FetchedContent, NewObservation};

/// IMF-fixdate, the preferred HTTP date form.
const IMF_FIXDATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Identity of one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    /// Hex digest or normalized HTTP date
    pub value: String,
    /// Comparable timestamp (last-modified mode only)
    pub modified_at: Option<DateTime<Utc>>,
    /// Literal header value (last-modified mode only)
    pub raw_signal: Option<String>,
}

impl Fingerprint {
    /// Compute the fingerprint of fetched content for the given mode.
    pub fn compute(mode: DetectionMode, content: &FetchedContent) -> Result<Self> {
        match (mode, content) {
            (DetectionMode::ByContentHash, FetchedContent::Text(text)) => Ok(Self {
                value: sha3_512_hex(text),
                modified_at: None,
                raw_signal: None,
            }),
            (DetectionMode::ByLastModified, FetchedContent::LastModified(header)) => {
                let modified_at = parse_http_date(header)?;
                Ok(Self {
                    value: modified_at.format(IMF_FIXDATE).to_string(),
                    modified_at: Some(modified_at),
                    raw_signal: Some(header.clone()),
                })
            }
            (mode, _) => Err(AppError::validation(format!(
                "fetched content does not match detection mode {mode}"
            ))),
        }
    }

    /// Build the observation row to persist.
    pub fn into_observation(self, target_id: i64, observed_at: DateTime<Utc>) -> NewObservation {
        NewObservation {
            target_id,
            fingerprint: Some(self.value),
            observed_at,
            modified_at: self.modified_at,
            raw_signal: self.raw_signal,
        }
    }
}

/// Lowercase hex SHA3-512 of the UTF-8 bytes of `text`.
pub fn sha3_512_hex(text: &str) -> String {
    hex::encode(Sha3_512::digest(text.as_bytes()))
}

/// Parse an HTTP date (IMF-fixdate, RFC 850 or asctime) into UTC.
pub fn parse_http_date(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();

    // IMF-fixdate and other RFC 2822 shapes, including "GMT"
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Obsolete forms carry no offset and are always GMT
    let obsolete = [
        "%A, %d-%b-%y %H:%M:%S GMT", // RFC 850
        "%a %b %e %H:%M:%S %Y",      // asctime
    ];
    for format in obsolete {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }

    Err(AppError::InvalidDate(value.to_string()))
}

/// Parse a timestamp read back from storage.
///
/// Accepts HTTP dates, RFC 3339, and naive `YYYY-MM-DD HH:MM:SS` values;
/// naive values are treated as UTC.
pub fn parse_stored_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = parse_http_date(value) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_hash_is_deterministic() {
        let a = Fingerprint::compute(
            DetectionMode::ByContentHash,
            &FetchedContent::Text("お知らせ 2026".into()),
        )
        .unwrap();
        let b = Fingerprint::compute(
            DetectionMode::ByContentHash,
            &FetchedContent::Text("お知らせ 2026".into()),
        )
        .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.value.len(), 128);
        assert!(a.modified_at.is_none());
    }

    #[test]
    fn test_hash_sees_whitespace() {
        assert_ne!(sha3_512_hex("abc"), sha3_512_hex("abc "));
        assert_ne!(sha3_512_hex("a\nb"), sha3_512_hex("a\r\nb"));
    }

    #[test]
    fn test_known_digest() {
        // SHA3-512 of the empty string
        assert!(sha3_512_hex("").starts_with("a69f73cca23a9ac5c8b567dc185a756e97c982164fe25859e0d1dcc1475c80a6"));
    }

    #[test]
    fn test_last_modified_fingerprint() {
        let fp = Fingerprint::compute(
            DetectionMode::ByLastModified,
            &FetchedContent::LastModified("Wed, 21 Oct 2015 07:28:00 GMT".into()),
        )
        .unwrap();
        assert_eq!(fp.value, "Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(
            fp.modified_at,
            Some(Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap())
        );
        assert_eq!(fp.raw_signal.as_deref(), Some("Wed, 21 Oct 2015 07:28:00 GMT"));
    }

    #[test]
    fn test_http_date_forms_agree() {
        let expected = Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap();
        assert_eq!(parse_http_date("Sun, 06 Nov 1994 08:49:37 GMT").unwrap(), expected);
        assert_eq!(parse_http_date("Sunday, 06-Nov-94 08:49:37 GMT").unwrap(), expected);
        assert_eq!(parse_http_date("Sun Nov  6 08:49:37 1994").unwrap(), expected);
        // Offsets normalize to UTC
        assert_eq!(parse_http_date("Sun, 06 Nov 1994 17:49:37 +0900").unwrap(), expected);
    }

    #[test]
    fn test_invalid_http_date() {
        assert!(matches!(
            parse_http_date("yesterday"),
            Err(AppError::InvalidDate(_))
        ));
    }

    #[test]
    fn test_stored_naive_timestamp_is_utc() {
        assert_eq!(
            parse_stored_timestamp("2026-01-05 09:30:00"),
            Some(Utc.with_ymd_and_hms(2026, 1, 5, 9, 30, 0).unwrap())
        );
        assert_eq!(
            parse_stored_timestamp("2026-01-05T18:30:00+09:00"),
            Some(Utc.with_ymd_and_hms(2026, 1, 5, 9, 30, 0).unwrap())
        );
        assert_eq!(parse_stored_timestamp("n/a"), None);
    }

    #[test]
    fn test_mode_mismatch_rejected() {
        assert!(
            Fingerprint::compute(
                DetectionMode::ByLastModified,
                &FetchedContent::Text("body".into())
            )
            .is_err()
        );
    }
}
