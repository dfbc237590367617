use super::ApiClient;
use crate::error::Error;
use crate::location::LocationSelection;
use crate::models::{FloodRisk, WeatherData};

impl ApiClient {
    /// Current conditions at `location`.
    ///
    /// # Errors
    ///
    /// See the [module documentation](super) for the failure classes.
    pub async fn current_weather(&self, location: &LocationSelection) -> Result<WeatherData, Error> {
        let request = self.get("weather/current")?.query(&[
            ("latitude", location.latitude()),
            ("longitude", location.longitude()),
        ]);
        self.send(request).await
    }

    /// Flood-risk level, score and contributing factors at `location`.
    ///
    /// # Errors
    ///
    /// See the [module documentation](super) for the failure classes.
    pub async fn flood_risk(&self, location: &LocationSelection) -> Result<FloodRisk, Error> {
        let request = self.get("weather/flood-risk")?.query(&[
            ("latitude", location.latitude()),
            ("longitude", location.longitude()),
        ]);
        self.send(request).await
    }
}
