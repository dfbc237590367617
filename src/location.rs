//! User-selected location.
//!
//! A [`LocationWatcher`] turns the three location inputs (device geolocation,
//! map click, text search) into one sequence of [`LocationSelection`]s. Each
//! selection fully replaces the previous one; only the latest is meaningful.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocationSource {
    Device,
    Map,
    Search,
}

/// A validated geographic point.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationSelection {
    latitude: f64,
    longitude: f64,
    source_label: Option<String>,
    source: LocationSource,
}

impl LocationSelection {
    /// # Errors
    ///
    /// Returns [`Error::InvalidLocation`] unless latitude is within
    /// [-90, 90] and longitude within [-180, 180].
    pub fn new(latitude: f64, longitude: f64, source: LocationSource) -> Result<Self, Error> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::InvalidLocation {
                latitude,
                longitude,
            });
        }
        Ok(Self {
            latitude,
            longitude,
            source_label: None,
            source,
        })
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.source_label = Some(label.into());
        self
    }

    #[must_use]
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    #[must_use]
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    #[must_use]
    pub fn source_label(&self) -> Option<&str> {
        self.source_label.as_deref()
    }

    #[must_use]
    pub fn source(&self) -> LocationSource {
        self.source
    }
}

/// Raw result of a geolocation or geocoding lookup, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub latitude: f64,
    pub longitude: f64,
    pub label: Option<String>,
}

/// Device position provider.
pub trait Geolocator: Send + Sync {
    fn current_position(&self) -> impl Future<Output = Result<Place, Error>> + Send;
}

/// Free-text place lookup. `Ok(None)` means nothing matched.
pub trait Geocoder: Send + Sync {
    fn resolve(&self, query: &str) -> impl Future<Output = Result<Option<Place>, Error>> + Send;
}

/// Single source of the current location.
///
/// Every accepted input bumps a selection epoch. A search whose result
/// arrives after the epoch moved on (a newer search, a map click, a device
/// fix) is dropped, so a slow geocoder can never overwrite a newer choice.
pub struct LocationWatcher {
    current: watch::Sender<Option<LocationSelection>>,
    epoch: AtomicU64,
}

enum Emitted {
    Published,
    Unchanged,
    Superseded,
}

impl Default for LocationWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationWatcher {
    /// A watcher with no selection yet.
    #[must_use]
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            current,
            epoch: AtomicU64::new(0),
        }
    }

    /// The latest selection, if any.
    #[must_use]
    pub fn current(&self) -> Option<LocationSelection> {
        self.current.borrow().clone()
    }

    /// Selections from now on, starting with the current one if any.
    #[must_use]
    pub fn subscribe(&self) -> LocationStream {
        let rx = self.current.subscribe();
        let pending = rx.borrow().clone();
        LocationStream { rx, pending }
    }

    /// Asks the device for its position once. Failures are logged and emit
    /// nothing.
    pub async fn mount<G: Geolocator>(&self, geolocator: &G) -> Option<LocationSelection> {
        let place = match geolocator.current_position().await {
            Ok(place) => place,
            Err(e) => {
                tracing::warn!(error = %e, "Device geolocation failed");
                return None;
            }
        };
        self.accept(place, LocationSource::Device, None)
    }

    /// Selection from a map click.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLocation`] for out-of-range coordinates; the
    /// current selection is kept.
    pub fn select_on_map(&self, latitude: f64, longitude: f64) -> Result<LocationSelection, Error> {
        let selection = LocationSelection::new(latitude, longitude, LocationSource::Map)?;
        self.emit(selection.clone(), None);
        Ok(selection)
    }

    /// Resolves `query` and selects the first match.
    ///
    /// A blank query, no match, a lookup failure, or any newer selection made
    /// meanwhile all leave the current selection in place.
    pub async fn search<C: Geocoder>(&self, geocoder: &C, query: &str) -> Option<LocationSelection> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        let place = match geocoder.resolve(query).await {
            Ok(Some(place)) => place,
            Ok(None) => {
                tracing::debug!(query, "No place matched search");
                return None;
            }
            Err(e) => {
                tracing::warn!(query, error = %e, "Location search failed");
                return None;
            }
        };
        self.accept(place, LocationSource::Search, Some(epoch))
    }

    fn accept(
        &self,
        place: Place,
        source: LocationSource,
        epoch: Option<u64>,
    ) -> Option<LocationSelection> {
        let selection = match LocationSelection::new(place.latitude, place.longitude, source) {
            Ok(selection) => selection,
            Err(e) => {
                tracing::warn!(error = %e, ?source, "Rejecting location");
                return None;
            }
        };
        let selection = match place.label {
            Some(label) => selection.with_label(label),
            None => selection,
        };
        match self.emit(selection.clone(), epoch) {
            Emitted::Superseded => None,
            Emitted::Published | Emitted::Unchanged => Some(selection),
        }
    }

    /// Publishes `selection` unless it equals the current one. With an
    /// `expected` epoch, publishes only if no other selection was made since.
    ///
    /// The epoch is checked and bumped inside the channel's write lock.
    fn emit(&self, selection: LocationSelection, expected: Option<u64>) -> Emitted {
        let mut outcome = Emitted::Unchanged;
        self.current.send_if_modified(|current| {
            if expected.is_some_and(|epoch| self.epoch.load(Ordering::SeqCst) != epoch) {
                tracing::debug!(
                    latitude = selection.latitude,
                    longitude = selection.longitude,
                    "Dropping result of superseded search"
                );
                outcome = Emitted::Superseded;
                return false;
            }
            self.epoch.fetch_add(1, Ordering::SeqCst);
            if current.as_ref() == Some(&selection) {
                return false;
            }
            tracing::debug!(
                latitude = selection.latitude,
                longitude = selection.longitude,
                source = ?selection.source,
                "Location changed"
            );
            *current = Some(selection.clone());
            outcome = Emitted::Published;
            true
        });
        outcome
    }
}

/// Receiving end of a [`LocationWatcher`].
pub struct LocationStream {
    rx: watch::Receiver<Option<LocationSelection>>,
    pending: Option<LocationSelection>,
}

impl LocationStream {
    /// Next selection; `None` once the watcher is dropped. Selections that
    /// were replaced before being read are skipped.
    pub async fn next(&mut self) -> Option<LocationSelection> {
        if let Some(selection) = self.pending.take() {
            return Some(selection);
        }
        loop {
            self.rx.changed().await.ok()?;
            if let Some(selection) = self.rx.borrow_and_update().clone() {
                return Some(selection);
            }
        }
    }
}

pub use nominatim::NominatimGeocoder;

mod nominatim {
    use serde::Deserialize;
    use url::Url;

    use super::{Geocoder, Place};
    use crate::config::{endpoint, with_trailing_slash};
    use crate::error::Error;

    #[derive(Deserialize)]
    struct Hit {
        lat: String,
        lon: String,
        #[serde(default)]
        display_name: Option<String>,
    }

    /// OpenStreetMap Nominatim search.
    #[derive(Debug, Clone)]
    pub struct NominatimGeocoder {
        http: reqwest::Client,
        base_url: Url,
    }

    impl NominatimGeocoder {
        #[must_use]
        pub fn new(http: reqwest::Client, base_url: Url) -> Self {
            Self {
                http,
                base_url: with_trailing_slash(base_url),
            }
        }
    }

    impl Geocoder for NominatimGeocoder {
        async fn resolve(&self, query: &str) -> Result<Option<Place>, Error> {
            let response = self
                .http
                .get(endpoint(&self.base_url, "search")?)
                .query(&[("format", "json"), ("q", query)])
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(Error::Geocode(format!("HTTP {}", response.status().as_u16())));
            }

            let hits: Vec<Hit> = response.json().await?;
            let Some(hit) = hits.into_iter().next() else {
                return Ok(None);
            };

            let latitude = hit
                .lat
                .parse()
                .map_err(|e| Error::Geocode(format!("lat {:?}: {e}", hit.lat)))?;
            let longitude = hit
                .lon
                .parse()
                .map_err(|e| Error::Geocode(format!("lon {:?}: {e}", hit.lon)))?;

            Ok(Some(Place {
                latitude,
                longitude,
                label: hit.display_name,
            }))
        }
    }
}
