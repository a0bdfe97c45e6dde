//! Serialized entry codec.
//!
//! Every value written through the facade is wrapped in a small envelope
//! carrying the wall-clock write time, so readers can judge freshness
//! independently of the physical TTL. This is what lets
//! stale-while-revalidate keep an entry alive past its logical TTL.

use crate::Result;
use once_cell::sync::Lazy;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// Wall-clock reading paired with a monotonic instant, captured once per
/// process. Timestamps are the anchor plus monotonic elapsed time, so they
/// stay comparable across processes while following the tokio clock.
static CLOCK_ANCHOR: Lazy<(u64, Instant)> = Lazy::new(|| {
    let epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    (epoch, Instant::now())
});

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    v: serde_json::Value,
    /// Write time, milliseconds since the Unix epoch.
    at: u64,
}

/// Current time in epoch milliseconds, advanced by the monotonic clock.
/// Under a paused tokio runtime this follows `tokio::time::advance`.
pub fn epoch_ms() -> u64 {
    let (epoch, anchor) = &*CLOCK_ANCHOR;
    epoch + anchor.elapsed().as_millis() as u64
}

/// Encode a value into transport-safe bytes, stamped with the current time.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let envelope = Envelope {
        v: serde_json::to_value(value)?,
        at: epoch_ms(),
    };
    Ok(serde_json::to_vec(&envelope)?)
}

/// Decode bytes produced by [`encode`], returning the value and its
/// write timestamp (epoch ms).
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<(T, u64)> {
    let envelope: Envelope = serde_json::from_slice(bytes)?;
    let value = serde_json::from_value(envelope.v)?;
    Ok((value, envelope.at))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, serde::Deserialize)]
    struct Payload {
        id: u64,
        name: String,
    }

    #[test]
    fn round_trip_preserves_value() {
        let payload = Payload {
            id: 7,
            name: "widget".into(),
        };
        let bytes = encode(&payload).unwrap();
        let (decoded, at) = decode::<Payload>(&bytes).unwrap();
        assert_eq!(decoded, payload);
        assert!(at > 0);
    }

    #[test]
    fn corrupt_bytes_surface_as_serialization_error() {
        let err = decode::<Payload>(b"{not json").unwrap_err();
        assert!(matches!(err, crate::Error::Serialization(_)));
    }

    #[test]
    fn type_mismatch_is_an_error_not_a_miss() {
        let bytes = encode(&42u32).unwrap();
        assert!(decode::<Payload>(&bytes).is_err());
    }
}
