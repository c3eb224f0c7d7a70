use jiff::civil::Date;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// One film block scraped from a cinema's showtimes page. Fields the page
/// failed to yield stay `None`; the reconciler decides whether the record is
/// usable.
#[derive(Clone, Debug, Default)]
pub struct ExtractedFilm {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub image: Option<String>,
    pub duration: Option<i32>,
}

#[derive(Clone, Debug)]
pub struct ExtractedShowtime {
    pub time: String,
    pub price: Option<String>,
    pub order_link: String,
}

#[derive(Clone, Debug)]
pub struct ExtractedRecord {
    pub film: ExtractedFilm,
    pub showtimes: Vec<ExtractedShowtime>,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Clone, Copy, Debug)]
pub struct TravelInfo {
    /// Kilometres, rounded to 2 decimals.
    pub distance: f64,
    /// Minutes, rounded to 2 decimals.
    pub duration: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLocation {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// Wire-level request body for `/api/choose`. Everything is optional so that
/// missing fields produce our own 400 messages instead of a deserializer
/// rejection.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChooseRequest {
    pub film_name: Option<String>,
    pub view_date: Option<String>,
    pub location: Option<RawLocation>,
    pub radius: Option<f64>,
    pub limit: Option<usize>,
}

pub const DEFAULT_LIMIT: usize = 10;

#[derive(Clone, Debug)]
pub struct ChooseQuery {
    pub film_name: String,
    pub view_date: Date,
    pub location: GeoPoint,
    pub radius_km: f64,
    pub limit: usize,
}

impl ChooseRequest {
    pub fn validate(self) -> AppResult<ChooseQuery> {
        let film_name = self
            .film_name
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::validation("filmName is required"))?;

        let view_date: Date = self
            .view_date
            .as_deref()
            .ok_or_else(|| AppError::validation("viewDate is required"))?
            .parse()
            .map_err(|_| AppError::validation("viewDate must be a YYYY-MM-DD date"))?;

        let location = self
            .location
            .ok_or_else(|| AppError::validation("location is required"))?;
        let (Some(lat), Some(lng)) = (location.lat, location.lng) else {
            return Err(AppError::validation("location must have lat and lng"));
        };

        let radius_km = self.radius.ok_or_else(|| AppError::validation("radius is required"))?;
        if !radius_km.is_finite() || radius_km <= 0.0 {
            return Err(AppError::validation("radius must be a positive number"));
        }

        Ok(ChooseQuery {
            film_name,
            view_date,
            location: GeoPoint { lat, lng },
            radius_km,
            limit: self.limit.unwrap_or(DEFAULT_LIMIT),
        })
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowtimeSlot {
    pub time: String,
    pub price: Option<String>,
    pub order_link: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CinemaPick {
    pub name: String,
    pub slug: String,
    pub address: String,
    pub distance: f64,
    pub duration: f64,
    pub showtimes: Vec<ShowtimeSlot>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChooseResponse {
    pub message: String,
    pub data: Vec<CinemaPick>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_cinema: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_request() -> ChooseRequest {
        ChooseRequest {
            film_name: Some("Mission".to_string()),
            view_date: Some("2024-06-01".to_string()),
            location: Some(RawLocation { lat: Some(16.07), lng: Some(108.22) }),
            radius: Some(5.0),
            limit: None,
        }
    }

    #[test]
    fn valid_request_passes_with_default_limit() {
        let q = full_request().validate().unwrap();
        assert_eq!(q.film_name, "Mission");
        assert_eq!(q.view_date.to_string(), "2024-06-01");
        assert_eq!(q.limit, DEFAULT_LIMIT);
    }

    #[test]
    fn missing_film_name_is_rejected() {
        let mut req = full_request();
        req.film_name = Some("   ".to_string());
        assert!(matches!(req.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn malformed_view_date_is_rejected() {
        let mut req = full_request();
        req.view_date = Some("01/06/2024".to_string());
        assert!(matches!(req.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn location_without_lng_is_rejected() {
        let mut req = full_request();
        req.location = Some(RawLocation { lat: Some(16.07), lng: None });
        assert!(matches!(req.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn non_positive_radius_is_rejected() {
        let mut req = full_request();
        req.radius = Some(0.0);
        assert!(matches!(req.validate(), Err(AppError::Validation(_))));
    }
}
