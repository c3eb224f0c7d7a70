use std::collections::HashMap;

use futures::{StreamExt, stream};
use jiff::civil::Date;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use tracing::{debug, warn};

use crate::{
    entities::{cinema, film, showtime, showtime_detail},
    error::{AppError, AppResult},
    gemini::{self, GeminiClient},
    models::{ChooseQuery, ChooseResponse, CinemaPick, GeoPoint, ShowtimeSlot, TravelInfo},
    routing::RoutingClient,
};

/// A cinema that survived the spatial and temporal filters, with its
/// remaining screening slots. `proximity_km` is the provisional straight-line
/// ordering; real travel distance replaces it during ranking.
#[derive(Debug)]
pub struct Candidate {
    pub cinema: cinema::Model,
    pub proximity_km: f64,
    pub slots: Vec<ShowtimeSlot>,
}

/// Answers "which cinemas near me show film X on date D", ranked by travel
/// distance with a narrated single pick attached.
pub async fn choose(
    db: &DatabaseConnection,
    routing: &RoutingClient,
    gemini: &GeminiClient,
    tz: &jiff::tz::TimeZone,
    max_concurrent: usize,
    query: ChooseQuery,
) -> AppResult<ChooseResponse> {
    let now = jiff::Timestamp::now().to_zoned(tz.clone());
    let today = now.date();
    let now_time = format!("{:02}:{:02}", now.time().hour(), now.time().minute());

    let (film, candidates) = assemble_candidates(db, &query, today, &now_time).await?;
    debug!(
        film = %film.title,
        candidates = candidates.len(),
        nearest_km = candidates[0].proximity_km,
        "assembled candidate set"
    );

    let travel = fetch_travel(routing, query.location, &candidates, max_concurrent).await;

    let picks: Vec<CinemaPick> = candidates
        .into_iter()
        .zip(travel)
        .filter_map(|(candidate, info)| {
            let Some(info) = info else {
                warn!(cinema = %candidate.cinema.slug, "no travel info, excluding candidate");
                return None;
            };
            Some(CinemaPick {
                name: candidate.cinema.name,
                slug: candidate.cinema.slug,
                address: candidate.cinema.address,
                distance: info.distance,
                duration: info.duration,
                showtimes: candidate.slots,
            })
        })
        .collect();

    if picks.is_empty() {
        return Err(AppError::upstream(
            "osrm",
            anyhow::anyhow!("travel lookup failed for every candidate"),
        ));
    }

    let picks = rank(picks, query.limit);

    let narrative = match gemini
        .recommend(
            &picks,
            &film.title,
            &query.view_date.to_string(),
            &today.to_string(),
            &now_time,
        )
        .await
    {
        Ok(text) if gemini::names_candidate(&text, &picks) => Some(text),
        Ok(_) => {
            warn!("synthesizer named a cinema outside the candidate list, dropping narrative");
            None
        },
        Err(err) => {
            warn!(error = %err, "recommendation synthesis failed, returning structured data only");
            None
        },
    };

    Ok(ChooseResponse {
        message: "Cinemas matching your request, nearest first".to_string(),
        data: picks,
        recommended_cinema: narrative,
    })
}

/// Steps 1-4: film resolution, spatial candidates, temporal candidates,
/// now-aware detail filtering. Each stage fails with a stage-specific
/// NotFound when it empties the set.
pub async fn assemble_candidates(
    db: &DatabaseConnection,
    query: &ChooseQuery,
    today: Date,
    now_time: &str,
) -> AppResult<(film::Model, Vec<Candidate>)> {
    let film = film::Entity::find()
        .filter(film::Column::Title.contains(query.film_name.as_str()))
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found("no film matching that name"))?;

    let mut nearby: Vec<(cinema::Model, f64)> = cinema::Entity::find()
        .all(db)
        .await?
        .into_iter()
        .filter_map(|c| {
            let km = haversine_km(query.location.lat, query.location.lng, c.lat, c.lng);
            (km <= query.radius_km).then_some((c, km))
        })
        .collect();
    nearby.sort_by(|a, b| a.1.total_cmp(&b.1));

    if nearby.is_empty() {
        return Err(AppError::not_found("no cinema within the requested radius"));
    }

    let cinema_ids: Vec<i32> = nearby.iter().map(|(c, _)| c.id).collect();
    let showtimes = showtime::Entity::find()
        .filter(showtime::Column::FilmId.eq(film.id))
        .filter(showtime::Column::CinemaId.is_in(cinema_ids))
        .filter(showtime::Column::Date.eq(query.view_date.to_string()))
        .all(db)
        .await?;

    if showtimes.is_empty() {
        return Err(AppError::not_found("no showtime for this film on the requested date"));
    }

    let showtime_ids: Vec<i32> = showtimes.iter().map(|s| s.id).collect();
    let details = showtime_detail::Entity::find()
        .filter(showtime_detail::Column::ShowtimeId.is_in(showtime_ids))
        .all(db)
        .await?;

    let mut by_showtime: HashMap<i32, Vec<ShowtimeSlot>> = HashMap::new();
    for d in details {
        by_showtime.entry(d.showtime_id).or_default().push(ShowtimeSlot {
            time: d.time,
            price: d.price,
            order_link: d.order_link,
        });
    }

    let mut by_cinema: HashMap<i32, Vec<ShowtimeSlot>> = HashMap::new();
    for st in &showtimes {
        if let Some(slots) = by_showtime.remove(&st.id) {
            by_cinema.entry(st.cinema_id).or_default().extend(slots);
        }
    }

    let is_today = query.view_date == today;

    let mut candidates = Vec::new();
    for (cinema, km) in nearby {
        let Some(slots) = by_cinema.remove(&cinema.id) else {
            continue;
        };
        let mut slots = filter_started(slots, is_today, now_time);
        if slots.is_empty() {
            // Every slot already started: the cinema drops out entirely
            // rather than appearing with zero showtimes.
            continue;
        }
        slots.sort_by(|a, b| a.time.cmp(&b.time));
        candidates.push(Candidate { cinema, proximity_km: km, slots });
    }

    if candidates.is_empty() {
        return Err(AppError::not_found("no cinema has a remaining screening on that date"));
    }

    Ok((film, candidates))
}

/// Only relevant when the requested date is today: a slot strictly before
/// "now" has already started. Zero-padded HH:mm makes the string comparison
/// correct, and a slot equal to now is kept.
fn filter_started(slots: Vec<ShowtimeSlot>, is_today: bool, now_time: &str) -> Vec<ShowtimeSlot> {
    if !is_today {
        return slots;
    }
    slots.into_iter().filter(|s| s.time.as_str() >= now_time).collect()
}

/// One routing call per candidate, issued concurrently and joined back by
/// index. A failed call excludes only its candidate.
async fn fetch_travel(
    routing: &RoutingClient,
    origin: GeoPoint,
    candidates: &[Candidate],
    max_concurrent: usize,
) -> Vec<Option<TravelInfo>> {
    let inputs: Vec<(usize, f64, f64, String)> = candidates
        .iter()
        .enumerate()
        .map(|(i, candidate)| {
            (i, candidate.cinema.lng, candidate.cinema.lat, candidate.cinema.slug.clone())
        })
        .collect();
    let results: Vec<(usize, Option<TravelInfo>)> = stream::iter(inputs)
        .map(|(i, lng, lat, slug)| async move {
            match routing.route(origin, lng, lat).await {
                Ok(info) => (i, Some(info)),
                Err(err) => {
                    warn!(cinema = %slug, error = %err, "distance lookup failed");
                    (i, None)
                },
            }
        })
        .buffer_unordered(max_concurrent.max(1))
        .collect()
        .await;

    let mut travel = vec![None; candidates.len()];
    for (i, info) in results {
        travel[i] = info;
    }
    travel
}

/// Distance is the ranking key at this layer; duration is the synthesizer's
/// concern.
fn rank(mut picks: Vec<CinemaPick>, limit: usize) -> Vec<CinemaPick> {
    picks.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    picks.truncate(limit);
    picks
}

fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6_371.0;

    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}
