use std::net::SocketAddr;

use anyhow::Context;
use jiff::tz::TimeZone;

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub database_url: String,
    pub cache_ttl_hours: i64,
    pub moveek_base_url: String,
    pub osrm_base_url: String,
    pub osrm_rps: u32,
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub city: String,
    pub sync_window_days: i64,
    pub max_concurrent: usize,
    pub tz: TimeZone,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 =
            std::env::var("PORT").unwrap_or_else(|_| "3000".to_string()).parse().context("PORT")?;

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://cinepick.db?mode=rwc".to_string());

        let cache_ttl_hours: i64 =
            std::env::var("CACHE_TTL_HOURS").ok().and_then(|s| s.parse().ok()).unwrap_or(24);

        let moveek_base_url = std::env::var("MOVEEK_BASE_URL")
            .unwrap_or_else(|_| "https://moveek.com".to_string());

        let osrm_base_url = std::env::var("OSRM_BASE_URL")
            .unwrap_or_else(|_| "https://router.project-osrm.org".to_string());

        let osrm_rps: u32 =
            std::env::var("OSRM_RPS").ok().and_then(|s| s.parse().ok()).unwrap_or(4);

        let gemini_api_key = std::env::var("GEMINI_API_KEY").unwrap_or_else(|_| "".to_string());
        let gemini_base_url = std::env::var("GEMINI_BASE_URL")
            .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".to_string());
        let gemini_model = std::env::var("GEMINI_MODEL")
            .unwrap_or_else(|_| "gemini-2.5-flash".to_string());

        let city = std::env::var("CITY").unwrap_or_else(|_| "Đà Nẵng".to_string());

        let sync_window_days: i64 =
            std::env::var("SYNC_WINDOW_DAYS").ok().and_then(|s| s.parse().ok()).unwrap_or(6);

        let max_concurrent: usize =
            std::env::var("MAX_CONCURRENT_REQUESTS").ok().and_then(|s| s.parse().ok()).unwrap_or(5);

        let tz_name =
            std::env::var("TIMEZONE").unwrap_or_else(|_| "Asia/Ho_Chi_Minh".to_string());
        let tz = TimeZone::get(&tz_name).context("TIMEZONE")?;

        Ok(Self {
            addr: format!("{host}:{port}").parse().context("HOST/PORT")?,
            database_url,
            cache_ttl_hours,
            moveek_base_url,
            osrm_base_url,
            osrm_rps,
            gemini_api_key,
            gemini_base_url,
            gemini_model,
            city,
            sync_window_days,
            max_concurrent,
            tz,
        })
    }
}
