use std::{num::NonZeroU32, sync::Arc};

use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use serde::Deserialize;

use crate::{
    error::{AppError, AppResult},
    models::{GeoPoint, TravelInfo},
};

/// OSRM routing client. One request per origin/destination pair, rate-limited
/// out of courtesy to the public router.
pub struct RoutingClient {
    client: reqwest::Client,
    base_url: String,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl RoutingClient {
    pub fn new(client: reqwest::Client, base_url: String, rps: u32) -> Self {
        let limiter =
            Arc::new(RateLimiter::direct(Quota::per_second(NonZeroU32::new(rps.max(1)).unwrap())));
        Self { client, base_url, limiter }
    }

    /// Driving distance (km) and duration (minutes) from `origin` to the
    /// given destination, both rounded to 2 decimals.
    pub async fn route(&self, origin: GeoPoint, dest_lng: f64, dest_lat: f64) -> AppResult<TravelInfo> {
        self.limiter.until_ready().await;

        let url = format!(
            "{}/route/v1/driving/{},{};{},{}?overview=false",
            self.base_url.trim_end_matches('/'),
            origin.lng,
            origin.lat,
            dest_lng,
            dest_lat,
        );

        let resp: RouteResponse = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::upstream("osrm", e))?
            .error_for_status()
            .map_err(|e| AppError::upstream("osrm", e))?
            .json()
            .await
            .map_err(|e| AppError::upstream("osrm", e))?;

        let route = resp
            .routes
            .into_iter()
            .next()
            .ok_or_else(|| AppError::upstream("osrm", anyhow::anyhow!("no route in response")))?;

        Ok(TravelInfo {
            distance: round2(route.distance / 1000.0),
            duration: round2(route.duration / 60.0),
        })
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Deserialize)]
struct RouteResponse {
    routes: Vec<Route>,
}

#[derive(Debug, Deserialize)]
struct Route {
    /// Metres.
    distance: f64,
    /// Seconds.
    duration: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_two_decimals() {
        assert_eq!(round2(2004.0 / 1000.0), 2.0);
        assert_eq!(round2(1234.5 / 1000.0), 1.23);
        assert_eq!(round2(785.0 / 60.0), 13.08);
    }
}
