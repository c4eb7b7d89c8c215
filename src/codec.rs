//! JSON boundary between typed values and adapter bytes
//!
//! Values are wrapped in a small envelope carrying the write time and, for
//! profile-based writes, the moment a background revalidation becomes due.
//! The envelope travels with the bytes, so the revalidate window works on any
//! backend, remote ones included.
//!
//! Envelope timestamps come from [`now`]: wall-clock time anchored once and
//! then advanced by the tokio clock, the same clock entry expiry runs on.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use tokio::time::Instant;

/// Current wall-clock time as seen through the tokio clock
///
/// Pausing or advancing tokio time moves this clock with it.
pub fn now() -> DateTime<Utc> {
    static ANCHOR: OnceLock<(DateTime<Utc>, Instant)> = OnceLock::new();
    let (wall, mono) = *ANCHOR.get_or_init(|| (Utc::now(), Instant::now()));

    // Another runtime's paused clock may sit behind the anchor.
    let current = Instant::now();
    if current >= mono {
        wall + to_chrono(current.duration_since(mono))
    } else {
        wall - to_chrono(mono.duration_since(current))
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::zero())
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    v: &'a T,
    stored_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    revalidate_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    v: T,
    stored_at: DateTime<Utc>,
    #[serde(default)]
    revalidate_at: Option<DateTime<Utc>>,
}

/// A decoded value with its envelope metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Stored<T> {
    pub value: T,
    pub stored_at: DateTime<Utc>,
    pub revalidate_at: Option<DateTime<Utc>>,
}

impl<T> Stored<T> {
    /// Whether the revalidate window has passed
    pub fn needs_revalidation(&self) -> bool {
        self.revalidate_at.is_some_and(|at| now() >= at)
    }
}

/// Encode a value; `revalidate_after` marks when a refresh becomes due
pub fn encode<T: Serialize>(value: &T, revalidate_after: Option<Duration>) -> Result<Vec<u8>> {
    let stored_at = now();
    let revalidate_at = revalidate_after
        .and_then(|d| chrono::Duration::from_std(d).ok())
        .map(|d| stored_at + d);

    Ok(serde_json::to_vec(&EnvelopeRef {
        v: value,
        stored_at,
        revalidate_at,
    })?)
}

/// Decode bytes written by [`encode`]
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<Stored<T>> {
    let envelope: Envelope<T> = serde_json::from_slice(bytes)?;
    Ok(Stored {
        value: envelope.v,
        stored_at: envelope.stored_at,
        revalidate_at: envelope.revalidate_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Product {
        id: u64,
        name: String,
    }

    #[test]
    fn test_typed_value_survives_envelope() {
        let product = Product {
            id: 42,
            name: "Widget".to_string(),
        };
        let bytes = encode(&product, None).unwrap();
        let stored: Stored<Product> = decode(&bytes).unwrap();

        assert_eq!(stored.value, product);
        assert!(stored.revalidate_at.is_none());
        assert!(!stored.needs_revalidation());
    }

    #[test]
    fn test_revalidation_due() {
        let bytes = encode(&"v", Some(Duration::ZERO)).unwrap();
        let stored: Stored<String> = decode(&bytes).unwrap();
        assert!(stored.needs_revalidation());

        let bytes = encode(&"v", Some(Duration::from_secs(3600))).unwrap();
        let stored: Stored<String> = decode(&bytes).unwrap();
        assert!(!stored.needs_revalidation());
    }

    #[tokio::test(start_paused = true)]
    async fn test_revalidation_follows_tokio_clock() {
        let bytes = encode(&"v", Some(Duration::from_secs(10))).unwrap();
        let stored: Stored<String> = decode(&bytes).unwrap();
        assert!(!stored.needs_revalidation());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(stored.needs_revalidation());
    }

    #[test]
    fn test_corrupt_bytes_are_serialization_errors() {
        let err = decode::<Product>(b"\xff\x00garbage").unwrap_err();
        assert!(matches!(err, CacheError::Serialization(_)));
        assert!(err.is_degradable());

        // Valid JSON of the wrong shape is corruption too
        let bytes = encode(&"not a product", None).unwrap();
        assert!(decode::<Product>(&bytes).is_err());
    }
}
