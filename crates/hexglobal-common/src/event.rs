//! The broadcast event and its JSON wire encoding.
//!
//! An [`Event`] travels as a single JSON object per WebSocket message. Field
//! names are part of the contract and use camelCase (`countryCode`). Every
//! field is required on decode; unknown fields are ignored.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while encoding or decoding an [`Event`].
#[derive(Error, Debug)]
pub enum EventError {
    /// The payload was not a well-formed event object.
    #[error("malformed event: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Latitude or longitude is NaN or infinite and has no JSON representation.
    #[error("non-finite coordinate (latitude {latitude}, longitude {longitude})")]
    NonFiniteCoordinate {
        /// Offending latitude.
        latitude: f64,
        /// Offending longitude.
        longitude: f64,
    },
}

/// A chat message tagged with the sender's location.
///
/// Coordinates are not range-checked and `timestamp` is whatever the producer
/// stamped (epoch milliseconds by convention); the hub passes both through
/// untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Display name of the sender. Not unique.
    pub username: String,
    /// Free-text payload.
    pub message: String,
    /// Human-readable country name.
    pub country: String,
    /// Country code, usually ISO 3166 alpha-2.
    pub country_code: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Producer-supplied epoch time.
    pub timestamp: i64,
}

impl Event {
    /// Encode the event as a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::NonFiniteCoordinate`] if either coordinate is NaN
    /// or infinite.
    pub fn to_json(&self) -> Result<String, EventError> {
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return Err(EventError::NonFiniteCoordinate {
                latitude: self.latitude,
                longitude: self.longitude,
            });
        }
        Ok(serde_json::to_string(self)?)
    }

    /// Decode an event from a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Malformed`] if the text is not an event object.
    pub fn from_json(text: &str) -> Result<Self, EventError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Decode an event from raw bytes (binary frames carry the same JSON).
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Malformed`] if the bytes are not an event object.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, EventError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_coordinate() -> impl Strategy<Value = f64> {
        prop_oneof![
            -180.0f64..=180.0,
            any::<f64>().prop_filter("finite", |f| f.is_finite()),
        ]
    }

    prop_compose! {
        fn arb_event()(
            username in ".{0,32}",
            message in ".{0,256}",
            country in "[A-Za-z ]{0,24}",
            country_code in "[A-Z]{0,3}",
            latitude in arb_coordinate(),
            longitude in arb_coordinate(),
            timestamp in any::<i64>(),
        ) -> Event {
            Event { username, message, country, country_code, latitude, longitude, timestamp }
        }
    }

    proptest! {
        #[test]
        fn json_roundtrip_preserves_every_field(event in arb_event()) {
            let json = event.to_json().unwrap();
            prop_assert_eq!(Event::from_json(&json).unwrap(), event.clone());
            prop_assert_eq!(Event::from_slice(json.as_bytes()).unwrap(), event);
        }

        #[test]
        fn arbitrary_text_never_panics(text in ".{0,128}") {
            let _ = Event::from_json(&text);
        }
    }
}
