use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};

use crate::{entities::cache_entry, error::AppResult};

pub const FILM_NS: &str = "film:";
pub const SHOWTIME_NS: &str = "showtime:";
pub const DETAIL_NS: &str = "showtime-details:";
pub const IMAGE_NS: &str = "image:";

pub fn film_key(slug: &str) -> String {
    format!("{FILM_NS}{slug}")
}

pub fn showtime_key(date: &str, film_slug: &str, cinema_slug: &str) -> String {
    format!("{SHOWTIME_NS}{date}_{film_slug}_{cinema_slug}")
}

pub fn detail_key(date: &str, time: &str, film_slug: &str, cinema_slug: &str) -> String {
    format!("{DETAIL_NS}{date}_{time}_{film_slug}_{cinema_slug}")
}

pub fn image_key(slug: &str) -> String {
    format!("{IMAGE_NS}{slug}")
}

/// Cached projection of a film row. Proof that the store holds a consistent
/// record for this slug.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FilmDigest {
    pub id: i32,
    pub title: String,
    pub slug: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailDigest {
    pub id: i32,
    pub price: Option<String>,
    pub order_link: Option<String>,
}

/// TTL'd key/value projection of the catalog. Disposable: the store is the
/// source of truth, a miss here only means "go ask the store".
#[derive(Clone)]
pub struct CacheManager {
    db: DatabaseConnection,
    ttl_seconds: i64,
}

// Rows per batched INSERT, kept well under SQLite's bind-parameter limit.
const WRITE_CHUNK: usize = 300;

impl CacheManager {
    pub fn new(db: DatabaseConnection, ttl_hours: i64) -> Self {
        Self { db, ttl_seconds: ttl_hours * 3_600 }
    }

    pub async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        let entry = cache_entry::Entity::find_by_id(key.to_string()).one(&self.db).await?;
        Ok(entry.filter(|e| e.expires_at > now_sec()).map(|e| e.value))
    }

    pub async fn put(&self, key: &str, value: Vec<u8>) -> AppResult<()> {
        let model = cache_entry::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value),
            expires_at: Set(now_sec() + self.ttl_seconds),
        };

        cache_entry::Entity::insert(model)
            .on_conflict(
                sea_orm::sea_query::OnConflict::column(cache_entry::Column::Key)
                    .update_columns([cache_entry::Column::Value, cache_entry::Column::ExpiresAt])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;

        Ok(())
    }

    /// Batched upsert for the rebuild phase: one INSERT per chunk instead of
    /// one round-trip per key.
    pub async fn put_many(&self, entries: Vec<(String, Vec<u8>)>) -> AppResult<()> {
        let expires_at = now_sec() + self.ttl_seconds;

        for chunk in entries.chunks(WRITE_CHUNK) {
            let models = chunk.iter().map(|(key, value)| cache_entry::ActiveModel {
                key: Set(key.clone()),
                value: Set(value.clone()),
                expires_at: Set(expires_at),
            });

            cache_entry::Entity::insert_many(models)
                .on_conflict(
                    sea_orm::sea_query::OnConflict::column(cache_entry::Column::Key)
                        .update_columns([
                            cache_entry::Column::Value,
                            cache_entry::Column::ExpiresAt,
                        ])
                        .to_owned(),
                )
                .exec(&self.db)
                .await?;
        }

        Ok(())
    }

    pub async fn delete_prefix(&self, prefix: &str) -> AppResult<u64> {
        let res = cache_entry::Entity::delete_many()
            .filter(cache_entry::Column::Key.starts_with(prefix))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected)
    }

    /// Drops rows past their TTL. Reads already treat them as misses; this
    /// keeps the table bounded.
    pub async fn purge_expired(&self) -> AppResult<u64> {
        let res = cache_entry::Entity::delete_many()
            .filter(cache_entry::Column::ExpiresAt.lte(now_sec()))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected)
    }

    pub async fn get_film(&self, slug: &str) -> AppResult<Option<FilmDigest>> {
        let Some(bytes) = self.get(&film_key(slug)).await? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(digest) => Ok(Some(digest)),
            Err(err) => {
                // Corrupt digest counts as a miss; the store lookup will
                // repopulate it.
                tracing::warn!(slug = %slug, error = %err, "unreadable film digest in cache");
                Ok(None)
            },
        }
    }

    pub async fn put_film(&self, digest: &FilmDigest) -> AppResult<()> {
        let bytes = serde_json::to_vec(digest).map_err(anyhow::Error::new)?;
        self.put(&film_key(&digest.slug), bytes).await
    }

    pub async fn put_showtime_marker(&self, key: &str, showtime_id: i32) -> AppResult<()> {
        self.put(key, showtime_id.to_string().into_bytes()).await
    }

    pub async fn put_detail(&self, key: &str, digest: &DetailDigest) -> AppResult<()> {
        let bytes = serde_json::to_vec(digest).map_err(anyhow::Error::new)?;
        self.put(key, bytes).await
    }
}

fn now_sec() -> i64 {
    jiff::Timestamp::now().as_second()
}

#[cfg(test)]
mod tests {
    use migration::Migrator;
    use sea_orm::{ConnectOptions, Database, PaginatorTrait};
    use sea_orm_migration::MigratorTrait;

    use super::*;

    async fn test_db() -> DatabaseConnection {
        let mut opts = ConnectOptions::new("sqlite::memory:".to_string());
        opts.max_connections(1);
        let db = Database::connect(opts).await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        db
    }

    #[tokio::test]
    async fn put_get_roundtrip() {
        let cache = CacheManager::new(test_db().await, 24);

        cache.put("film:dune-2", b"digest".to_vec()).await.unwrap();
        let got = cache.get("film:dune-2").await.unwrap();
        assert_eq!(got, Some(b"digest".to_vec()));

        assert_eq!(cache.get("film:missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_overwrites_existing_value() {
        let cache = CacheManager::new(test_db().await, 24);

        cache.put("k", b"old".to_vec()).await.unwrap();
        cache.put("k", b"new".to_vec()).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"new".to_vec()));
    }

    #[tokio::test]
    async fn expired_entry_reads_as_miss() {
        let db = test_db().await;
        let cache = CacheManager::new(db.clone(), 24);

        let stale = cache_entry::ActiveModel {
            key: Set("showtime:stale".to_string()),
            value: Set(b"1".to_vec()),
            expires_at: Set(now_sec() - 10),
        };
        cache_entry::Entity::insert(stale).exec(&db).await.unwrap();

        assert_eq!(cache.get("showtime:stale").await.unwrap(), None);

        let swept = cache.purge_expired().await.unwrap();
        assert_eq!(swept, 1);
        assert_eq!(cache_entry::Entity::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_prefix_leaves_other_namespaces() {
        let cache = CacheManager::new(test_db().await, 24);

        cache.put(&showtime_key("2024-06-01", "dune-2", "cgv"), b"1".to_vec()).await.unwrap();
        cache
            .put(&detail_key("2024-06-01", "20:00", "dune-2", "cgv"), b"{}".to_vec())
            .await
            .unwrap();
        cache.put(&film_key("dune-2"), b"{}".to_vec()).await.unwrap();

        let deleted = cache.delete_prefix(SHOWTIME_NS).await.unwrap();
        // "showtime-details:" shares the "showtime" prefix only up to the
        // colon, so the namespace delete must not touch it.
        assert_eq!(deleted, 1);
        assert!(cache.get(&film_key("dune-2")).await.unwrap().is_some());
        assert!(
            cache
                .get(&detail_key("2024-06-01", "20:00", "dune-2", "cgv"))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn put_many_upserts_in_one_pass() {
        let cache = CacheManager::new(test_db().await, 24);

        cache.put("a", b"old".to_vec()).await.unwrap();
        cache
            .put_many(vec![
                ("a".to_string(), b"new".to_vec()),
                ("b".to_string(), b"fresh".to_vec()),
            ])
            .await
            .unwrap();

        assert_eq!(cache.get("a").await.unwrap(), Some(b"new".to_vec()));
        assert_eq!(cache.get("b").await.unwrap(), Some(b"fresh".to_vec()));
    }

    #[tokio::test]
    async fn film_digest_roundtrip() {
        let cache = CacheManager::new(test_db().await, 24);

        let digest = FilmDigest { id: 7, title: "Dune: Part Two".to_string(), slug: "dune-2".to_string() };
        cache.put_film(&digest).await.unwrap();

        let got = cache.get_film("dune-2").await.unwrap().unwrap();
        assert_eq!(got.id, 7);
        assert_eq!(got.title, "Dune: Part Two");
    }
}
