use std::collections::HashMap;

use jiff::civil::Date;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use tracing::{debug, info, warn};

use crate::{
    cache::{self, CacheManager, DetailDigest, FilmDigest},
    entities::{cinema, film, showtime, showtime_detail},
    error::AppResult,
    extractor::MoveekExtractor,
    models::ExtractedRecord,
};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SyncStats {
    pub films_created: u64,
    pub showtimes_created: u64,
    pub details_created: u64,
    pub records_skipped: u64,
}

impl SyncStats {
    fn merge(&mut self, other: &SyncStats) {
        self.films_created += other.films_created;
        self.showtimes_created += other.showtimes_created;
        self.details_created += other.details_created;
        self.records_skipped += other.records_skipped;
    }
}

/// One full pipeline pass: purge stale data, re-seed the cache from the
/// store, then extract and reconcile every cinema/date pair in the forward
/// window. Safe to re-run; store and cache failures abort, extractor
/// failures only skip their pair.
pub async fn run(
    db: &DatabaseConnection,
    cache: &CacheManager,
    http: &reqwest::Client,
    extractor: &MoveekExtractor,
    city: &str,
    window_days: i64,
    tz: &jiff::tz::TimeZone,
) -> AppResult<SyncStats> {
    let today = jiff::Timestamp::now().to_zoned(tz.clone()).date();

    purge(db, cache, today).await?;
    rebuild_cache(db, cache, today).await?;

    let cinemas =
        cinema::Entity::find().filter(cinema::Column::City.eq(city)).all(db).await?;
    info!(cinemas = cinemas.len(), city = %city, window_days = window_days, "starting extraction");

    let mut stats = SyncStats::default();
    for cinema in &cinemas {
        for offset in 0..window_days.max(1) {
            let date = (today + jiff::Span::new().days(offset)).to_string();

            let records = match extractor.extract(&cinema.slug, &date).await {
                Ok(records) => records,
                Err(err) => {
                    warn!(cinema = %cinema.slug, date = %date, error = %err, "extraction failed, continuing with next pair");
                    continue;
                },
            };

            cache_posters(http, cache, &records).await?;

            let batch = reconcile(db, cache, cinema, &date, &records).await?;
            debug!(
                cinema = %cinema.slug,
                date = %date,
                films = batch.films_created,
                showtimes = batch.showtimes_created,
                details = batch.details_created,
                "reconciled extraction batch"
            );
            stats.merge(&batch);
        }
    }

    info!(
        films = stats.films_created,
        showtimes = stats.showtimes_created,
        details = stats.details_created,
        skipped = stats.records_skipped,
        "sync run complete"
    );

    Ok(stats)
}

/// Phase A. Showtime cache namespaces are rebuilt wholesale, so they are
/// dropped unconditionally; past screenings leave the store for good.
async fn purge(db: &DatabaseConnection, cache: &CacheManager, today: Date) -> AppResult<()> {
    let dropped = cache.delete_prefix(cache::SHOWTIME_NS).await?
        + cache.delete_prefix(cache::DETAIL_NS).await?;
    let expired = cache.purge_expired().await?;
    info!(dropped = dropped, expired = expired, "cleared showtime cache namespaces");

    let today = today.to_string();

    let stale: Vec<i32> = showtime::Entity::find()
        .filter(showtime::Column::Date.lt(today.as_str()))
        .all(db)
        .await?
        .into_iter()
        .map(|s| s.id)
        .collect();

    if !stale.is_empty() {
        // Details first, then their parents.
        let details = showtime_detail::Entity::delete_many()
            .filter(showtime_detail::Column::ShowtimeId.is_in(stale))
            .exec(db)
            .await?;
        let showtimes = showtime::Entity::delete_many()
            .filter(showtime::Column::Date.lt(today.as_str()))
            .exec(db)
            .await?;
        info!(
            showtimes = showtimes.rows_affected,
            details = details.rows_affected,
            "purged past screenings from store"
        );
    }

    Ok(())
}

/// Phase B. Projects the whole forward catalog into the cache in one batched
/// write so Phase C's idempotency checks mostly hit.
async fn rebuild_cache(db: &DatabaseConnection, cache: &CacheManager, today: Date) -> AppResult<()> {
    let films = film::Entity::find().all(db).await?;
    let cinemas = cinema::Entity::find().all(db).await?;
    let showtimes = showtime::Entity::find()
        .filter(showtime::Column::Date.gte(today.to_string()))
        .all(db)
        .await?;

    let showtime_ids: Vec<i32> = showtimes.iter().map(|s| s.id).collect();
    let details = if showtime_ids.is_empty() {
        Vec::new()
    } else {
        showtime_detail::Entity::find()
            .filter(showtime_detail::Column::ShowtimeId.is_in(showtime_ids))
            .all(db)
            .await?
    };

    let films_by_id: HashMap<i32, &film::Model> = films.iter().map(|f| (f.id, f)).collect();
    let cinema_slugs: HashMap<i32, &str> =
        cinemas.iter().map(|c| (c.id, c.slug.as_str())).collect();

    let mut entries = Vec::new();

    for f in &films {
        let digest = FilmDigest { id: f.id, title: f.title.clone(), slug: f.slug.clone() };
        let bytes = serde_json::to_vec(&digest).map_err(anyhow::Error::new)?;
        entries.push((cache::film_key(&f.slug), bytes));
    }

    // showtime id -> (date, film slug, cinema slug), for detail keys below.
    let mut resolved: HashMap<i32, (&str, &str, &str)> = HashMap::new();
    for st in &showtimes {
        let (Some(f), Some(cinema_slug)) =
            (films_by_id.get(&st.film_id), cinema_slugs.get(&st.cinema_id))
        else {
            warn!(showtime = st.id, "showtime with dangling film/cinema reference, skipping");
            continue;
        };
        entries.push((
            cache::showtime_key(&st.date, &f.slug, cinema_slug),
            st.id.to_string().into_bytes(),
        ));
        resolved.insert(st.id, (st.date.as_str(), f.slug.as_str(), *cinema_slug));
    }

    for d in &details {
        let Some((date, film_slug, cinema_slug)) = resolved.get(&d.showtime_id) else {
            warn!(detail = d.id, "showtime detail with dangling parent, skipping");
            continue;
        };
        let digest =
            DetailDigest { id: d.id, price: d.price.clone(), order_link: d.order_link.clone() };
        let bytes = serde_json::to_vec(&digest).map_err(anyhow::Error::new)?;
        entries.push((cache::detail_key(date, &d.time, film_slug, cinema_slug), bytes));
    }

    info!(
        films = films.len(),
        showtimes = showtimes.len(),
        details = details.len(),
        entries = entries.len(),
        "re-seeded cache from store"
    );
    cache.put_many(entries).await
}

/// Phase C reconciliation for one extraction batch. Insert-if-absent only:
/// no step overwrites an existing store record's fields. Correcting bad data
/// takes a purge-and-reingest, not a patch.
pub async fn reconcile(
    db: &DatabaseConnection,
    cache: &CacheManager,
    cinema: &cinema::Model,
    date: &str,
    records: &[ExtractedRecord],
) -> AppResult<SyncStats> {
    let mut stats = SyncStats::default();

    for record in records {
        let raw = &record.film;
        let (Some(title), Some(slug), Some(image), Some(duration)) = (
            raw.title.as_deref(),
            raw.slug.as_deref(),
            raw.image.as_deref(),
            raw.duration.filter(|d| *d > 0),
        ) else {
            warn!(title = ?raw.title, slug = ?raw.slug, "incomplete film record discarded");
            stats.records_skipped += 1;
            continue;
        };

        // Two-tier lookup: a cache hit is proof the store already holds a
        // consistent film; a miss means ask the store, never "does not exist".
        let film_digest = match cache.get_film(slug).await? {
            Some(digest) => digest,
            None => {
                let digest = match film::Entity::find()
                    .filter(film::Column::Slug.eq(slug))
                    .one(db)
                    .await?
                {
                    Some(model) => {
                        debug!(slug = %slug, "film in store but not in cache");
                        FilmDigest { id: model.id, title: model.title, slug: model.slug }
                    },
                    None => {
                        let model = film::ActiveModel {
                            id: Default::default(),
                            title: Set(title.to_string()),
                            slug: Set(slug.to_string()),
                            image: Set(image.to_string()),
                            duration: Set(duration),
                        };
                        let res = film::Entity::insert(model).exec(db).await?;
                        stats.films_created += 1;
                        debug!(slug = %slug, title = %title, "inserted new film");
                        FilmDigest {
                            id: res.last_insert_id,
                            title: title.to_string(),
                            slug: slug.to_string(),
                        }
                    },
                };
                cache.put_film(&digest).await?;
                digest
            },
        };

        let marker_key = cache::showtime_key(date, &film_digest.slug, &cinema.slug);
        if cache.get(&marker_key).await?.is_some() {
            debug!(key = %marker_key, "showtime already reconciled, skipping record");
            continue;
        }

        let showtime_id = match showtime::Entity::find()
            .filter(showtime::Column::FilmId.eq(film_digest.id))
            .filter(showtime::Column::CinemaId.eq(cinema.id))
            .filter(showtime::Column::Date.eq(date))
            .one(db)
            .await?
        {
            Some(model) => {
                debug!(key = %marker_key, "showtime in store but not in cache");
                model.id
            },
            None => {
                let model = showtime::ActiveModel {
                    id: Default::default(),
                    film_id: Set(film_digest.id),
                    cinema_id: Set(cinema.id),
                    date: Set(date.to_string()),
                };
                let res = showtime::Entity::insert(model).exec(db).await?;
                stats.showtimes_created += 1;
                debug!(key = %marker_key, "inserted new showtime");
                res.last_insert_id
            },
        };
        cache.put_showtime_marker(&marker_key, showtime_id).await?;

        for slot in &record.showtimes {
            let key = cache::detail_key(date, &slot.time, &film_digest.slug, &cinema.slug);
            if cache.get(&key).await?.is_some() {
                continue;
            }

            let digest = match showtime_detail::Entity::find()
                .filter(showtime_detail::Column::ShowtimeId.eq(showtime_id))
                .filter(showtime_detail::Column::Time.eq(slot.time.as_str()))
                .one(db)
                .await?
            {
                Some(model) => DetailDigest {
                    id: model.id,
                    price: model.price,
                    order_link: model.order_link,
                },
                None => {
                    let model = showtime_detail::ActiveModel {
                        id: Default::default(),
                        showtime_id: Set(showtime_id),
                        time: Set(slot.time.clone()),
                        price: Set(slot.price.clone()),
                        order_link: Set(Some(slot.order_link.clone())),
                    };
                    let res = showtime_detail::Entity::insert(model).exec(db).await?;
                    stats.details_created += 1;
                    DetailDigest {
                        id: res.last_insert_id,
                        price: slot.price.clone(),
                        order_link: Some(slot.order_link.clone()),
                    }
                },
            };
            cache.put_detail(&key, &digest).await?;
        }
    }

    Ok(stats)
}

/// Poster bytes for freshly seen films, served later by the image route.
/// Fetch failures are logged and skipped; the catalog does not depend on
/// poster availability.
async fn cache_posters(
    http: &reqwest::Client,
    cache: &CacheManager,
    records: &[ExtractedRecord],
) -> AppResult<()> {
    for record in records {
        let (Some(slug), Some(image)) = (record.film.slug.as_deref(), record.film.image.as_deref())
        else {
            continue;
        };

        let key = cache::image_key(slug);
        if cache.get(&key).await?.is_some() {
            continue;
        }

        match fetch_image(http, image).await {
            Ok(bytes) => cache.put(&key, bytes).await?,
            Err(err) => {
                warn!(slug = %slug, url = %image, error = %err, "failed to fetch poster");
            },
        }
    }

    Ok(())
}

async fn fetch_image(http: &reqwest::Client, url: &str) -> Result<Vec<u8>, reqwest::Error> {
    let bytes = http.get(url).send().await?.error_for_status()?.bytes().await?;
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use migration::Migrator;
    use sea_orm::{ConnectOptions, Database, PaginatorTrait};
    use sea_orm_migration::MigratorTrait;

    use super::*;
    use crate::models::{ExtractedFilm, ExtractedShowtime};

    async fn test_db() -> DatabaseConnection {
        let mut opts = ConnectOptions::new("sqlite::memory:".to_string());
        opts.max_connections(1);
        let db = Database::connect(opts).await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        db
    }

    async fn insert_cinema(db: &DatabaseConnection, slug: &str) -> cinema::Model {
        let model = cinema::ActiveModel {
            id: Default::default(),
            slug: Set(slug.to_string()),
            name: Set(format!("Cinema {slug}")),
            address: Set("1 Test St".to_string()),
            city: Set("Testville".to_string()),
            lng: Set(108.22),
            lat: Set(16.07),
        };
        let id = cinema::Entity::insert(model).exec(db).await.unwrap().last_insert_id;
        cinema::Entity::find_by_id(id).one(db).await.unwrap().unwrap()
    }

    fn record(slug: &str, times: &[&str]) -> ExtractedRecord {
        ExtractedRecord {
            film: ExtractedFilm {
                title: Some(format!("Film {slug}")),
                slug: Some(slug.to_string()),
                image: Some(format!("https://cdn.example.com/{slug}.webp")),
                duration: Some(120),
            },
            showtimes: times
                .iter()
                .map(|t| ExtractedShowtime {
                    time: (*t).to_string(),
                    price: Some("100.000đ".to_string()),
                    order_link: format!("/booking/{slug}/{t}"),
                })
                .collect(),
        }
    }

    async fn row_counts(db: &DatabaseConnection) -> (u64, u64, u64) {
        (
            film::Entity::find().count(db).await.unwrap(),
            showtime::Entity::find().count(db).await.unwrap(),
            showtime_detail::Entity::find().count(db).await.unwrap(),
        )
    }

    #[tokio::test]
    async fn reconciliation_is_idempotent() {
        let db = test_db().await;
        let cache = CacheManager::new(db.clone(), 24);
        let cinema = insert_cinema(&db, "cgv-test").await;
        let records = vec![record("dune-2", &["14:30", "20:00"]), record("oppenheimer", &["18:00"])];

        let first = reconcile(&db, &cache, &cinema, "2099-06-01", &records).await.unwrap();
        assert_eq!(first.films_created, 2);
        assert_eq!(first.showtimes_created, 2);
        assert_eq!(first.details_created, 3);
        let counts_after_first = row_counts(&db).await;

        let second = reconcile(&db, &cache, &cinema, "2099-06-01", &records).await.unwrap();
        assert_eq!(second, SyncStats::default());
        assert_eq!(row_counts(&db).await, counts_after_first);
    }

    #[tokio::test]
    async fn cold_cache_reconciliation_creates_no_duplicates() {
        let db = test_db().await;
        let cache = CacheManager::new(db.clone(), 24);
        let cinema = insert_cinema(&db, "cgv-test").await;
        let records = vec![record("dune-2", &["14:30"])];

        reconcile(&db, &cache, &cinema, "2099-06-01", &records).await.unwrap();
        let counts = row_counts(&db).await;

        // Losing the whole cache must not change what the store ends up
        // holding; the store lookups take over.
        cache.delete_prefix(cache::FILM_NS).await.unwrap();
        cache.delete_prefix(cache::SHOWTIME_NS).await.unwrap();
        cache.delete_prefix(cache::DETAIL_NS).await.unwrap();

        let rerun = reconcile(&db, &cache, &cinema, "2099-06-01", &records).await.unwrap();
        assert_eq!(rerun, SyncStats::default());
        assert_eq!(row_counts(&db).await, counts);
    }

    #[tokio::test]
    async fn incomplete_film_record_is_discarded() {
        let db = test_db().await;
        let cache = CacheManager::new(db.clone(), 24);
        let cinema = insert_cinema(&db, "cgv-test").await;

        let mut broken = record("half-film", &["20:00"]);
        broken.film.image = None;

        let stats = reconcile(&db, &cache, &cinema, "2099-06-01", &[broken]).await.unwrap();
        assert_eq!(stats.records_skipped, 1);
        assert_eq!(row_counts(&db).await, (0, 0, 0));
    }

    #[tokio::test]
    async fn purge_removes_past_screenings_and_their_details() {
        let db = test_db().await;
        let cache = CacheManager::new(db.clone(), 24);
        let cinema = insert_cinema(&db, "cgv-test").await;

        let today = jiff::Zoned::now().date();
        let yesterday = (today - jiff::Span::new().days(1)).to_string();

        reconcile(&db, &cache, &cinema, &yesterday, &[record("old-film", &["10:00"])])
            .await
            .unwrap();
        reconcile(&db, &cache, &cinema, &today.to_string(), &[record("new-film", &["20:00"])])
            .await
            .unwrap();
        assert_eq!(row_counts(&db).await, (2, 2, 2));

        purge(&db, &cache, today).await.unwrap();

        let (films, showtimes, details) = row_counts(&db).await;
        assert_eq!(films, 2, "films are never purged");
        assert_eq!(showtimes, 1);
        assert_eq!(details, 1);

        let survivor = showtime::Entity::find().one(&db).await.unwrap().unwrap();
        assert_eq!(survivor.date, today.to_string());
    }

    #[tokio::test]
    async fn rebuild_projects_forward_catalog_into_cache() {
        let db = test_db().await;
        let cache = CacheManager::new(db.clone(), 24);
        let cinema = insert_cinema(&db, "cgv-test").await;

        let today = jiff::Zoned::now().date();
        let date = today.to_string();
        reconcile(&db, &cache, &cinema, &date, &[record("dune-2", &["20:00"])]).await.unwrap();

        // Orphan detail: parent showtime id does not exist. Must be skipped,
        // not fatal.
        let orphan = showtime_detail::ActiveModel {
            id: Default::default(),
            showtime_id: Set(9_999),
            time: Set("21:00".to_string()),
            price: Set(None),
            order_link: Set(None),
        };
        showtime_detail::Entity::insert(orphan).exec(&db).await.unwrap();

        cache.delete_prefix(cache::FILM_NS).await.unwrap();
        cache.delete_prefix(cache::SHOWTIME_NS).await.unwrap();
        cache.delete_prefix(cache::DETAIL_NS).await.unwrap();

        rebuild_cache(&db, &cache, today).await.unwrap();

        assert!(cache.get_film("dune-2").await.unwrap().is_some());
        assert!(
            cache.get(&cache::showtime_key(&date, "dune-2", "cgv-test")).await.unwrap().is_some()
        );
        assert!(
            cache
                .get(&cache::detail_key(&date, "20:00", "dune-2", "cgv-test"))
                .await
                .unwrap()
                .is_some()
        );
    }
}
