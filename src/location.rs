//! Location sharing.
//!
//! Sharing is best-effort: the local fix is requested lazily, replaced by a
//! default coordinate when the platform refuses, and sent to the peer once
//! when a connection opens.

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// A single latitude/longitude reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lng")]
    pub longitude: f64,
}

impl LocationFix {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Used whenever a real reading cannot be obtained.
pub const DEFAULT_FIX: LocationFix = LocationFix::new(37.7749, -122.4194);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    pub maximum_age: Duration,
}

impl Default for LocationOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_secs(10),
            maximum_age: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("location unavailable: {0}")]
    Unavailable(String),

    #[error("location request timed out")]
    Timeout,
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_fix(&self, options: &LocationOptions) -> Result<LocationFix, LocationError>;
}

/// Provider that always answers with the same reading, or always refuses.
#[derive(Debug, Clone)]
pub struct FixedLocation(pub Option<LocationFix>);

impl FixedLocation {
    pub fn at(fix: LocationFix) -> Self {
        Self(Some(fix))
    }

    pub fn denied() -> Self {
        Self(None)
    }
}

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn current_fix(&self, _options: &LocationOptions) -> Result<LocationFix, LocationError> {
        self.0.ok_or(LocationError::PermissionDenied)
    }
}

/// Ask the provider for one reading, bounded by `options.timeout`.
///
/// Never fails: refusals and timeouts yield `fallback`.
pub async fn resolve_fix(
    provider: Arc<dyn LocationProvider>,
    options: LocationOptions,
    fallback: LocationFix,
) -> LocationFix {
    let result = match tokio::time::timeout(options.timeout, provider.current_fix(&options)).await
    {
        Ok(result) => result,
        Err(_) => Err(LocationError::Timeout),
    };
    match result {
        Ok(fix) => {
            debug!(target: "Session/Location", "Location obtained: {fix:?}");
            fix
        }
        Err(e) => {
            warn!(target: "Session/Location", "Location error ({e}), using default location");
            fallback
        }
    }
}

/// Holds our fix and the peer's.
#[derive(Debug)]
pub struct LocationExchange {
    mine: Option<LocationFix>,
    peer: Option<LocationFix>,
    in_flight: bool,
}

impl Default for LocationExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationExchange {
    pub fn new() -> Self {
        Self {
            mine: None,
            peer: None,
            in_flight: false,
        }
    }

    pub fn mine(&self) -> Option<LocationFix> {
        self.mine
    }

    pub fn peer(&self) -> Option<LocationFix> {
        self.peer
    }

    /// Returns true when the caller should start a request: no fix yet and
    /// none already under way. Marks the request as under way.
    pub fn begin_request(&mut self) -> bool {
        if self.mine.is_some() || self.in_flight {
            return false;
        }
        self.in_flight = true;
        true
    }

    pub fn is_requesting(&self) -> bool {
        self.in_flight
    }

    pub fn complete_request(&mut self, fix: LocationFix) {
        self.in_flight = false;
        self.mine = Some(fix);
    }

    /// The fix to announce on a freshly opened connection, if we have one.
    pub fn announcement(&self) -> Option<LocationFix> {
        self.mine
    }

    pub fn set_peer(&mut self, fix: LocationFix) {
        self.peer = Some(fix);
    }

    pub fn clear_peer(&mut self) {
        self.peer = None;
    }
}
