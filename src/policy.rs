//! Unlock checks for time-locked and geofenced messages.
//!
//! Metadata travels in the clear next to the ciphertext, so the receiver can
//! run these checks before spending a message key. A fence is only enforced
//! when the caller knows where the device is; without a location the check
//! passes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::envelope::{EnvelopeMetadata, Geofence};
use crate::error::PolicyError;

/// Mean earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A device position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance to `other` in metres.
    pub fn distance_to(&self, other: &Location) -> f64 {
        haversine_distance(self.lat, self.lon, other.lat, other.lon)
    }
}

impl From<Geofence> for Location {
    fn from(fence: Geofence) -> Self {
        Self::new(fence.lat, fence.lon)
    }
}

/// Check whether a message may be shown at `now` from `location`.
pub fn evaluate(
    metadata: &EnvelopeMetadata,
    now: DateTime<Utc>,
    location: Option<Location>,
) -> Result<(), PolicyError> {
    if let Some(unlock_time) = metadata.unlock_time {
        let now_ms = now.timestamp_millis();
        if now_ms < unlock_time {
            return Err(PolicyError::TimeLocked {
                remaining_ms: unlock_time - now_ms,
            });
        }
    }

    if let Some(fence) = metadata.geofence {
        match location {
            Some(here) => {
                let distance_m = here.distance_to(&fence.into());
                if distance_m > f64::from(fence.radius) {
                    return Err(PolicyError::OutsideGeofence { distance_m });
                }
            }
            None => log::warn!("no device location; geofence check skipped"),
        }
    }

    Ok(())
}

/// Haversine distance between two points given in degrees, in metres.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}
