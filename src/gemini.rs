use serde::Deserialize;
use serde_json::json;

use crate::{
    error::{AppError, AppResult},
    models::CinemaPick,
};

/// Client for the text-synthesis service that turns the ranked candidate
/// list into a single narrated pick.
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(client: reqwest::Client, api_key: String, base_url: String, model: String) -> Self {
        if api_key.trim().is_empty() {
            tracing::warn!("no GEMINI_API_KEY provided, recommendations will be skipped");
        }
        Self { client, api_key, base_url, model }
    }

    pub async fn recommend(
        &self,
        candidates: &[CinemaPick],
        film_name: &str,
        view_date: &str,
        today: &str,
        now_time: &str,
    ) -> AppResult<String> {
        if self.api_key.trim().is_empty() {
            return Err(AppError::upstream("gemini", anyhow::anyhow!("no API key configured")));
        }

        let prompt = build_prompt(candidates, film_name, view_date, today, now_time);

        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model,
        );

        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let resp: GenerateContentResponse = self
            .client
            .post(&url)
            .query(&[("key", &self.api_key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::upstream("gemini", e))?
            .error_for_status()
            .map_err(|e| AppError::upstream("gemini", e))?
            .json()
            .await
            .map_err(|e| AppError::upstream("gemini", e))?;

        let text = resp
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::upstream("gemini", anyhow::anyhow!("empty response")))?;

        Ok(text)
    }
}

/// The analysis steps and their order are a hard contract: filter past
/// showtimes (today only), drop emptied cinemas, earliest slot per cinema,
/// price only when universally known, then duration > distance > price.
pub fn build_prompt(
    candidates: &[CinemaPick],
    film_name: &str,
    view_date: &str,
    today: &str,
    now_time: &str,
) -> String {
    let is_today = view_date == today;

    let mut cinema_blocks = String::new();
    for (i, cinema) in candidates.iter().enumerate() {
        let mut slots = String::new();
        for slot in &cinema.showtimes {
            let price = slot.price.as_deref().unwrap_or("unknown");
            slots.push_str(&format!("  - {} (price: {})\n", slot.time, price));
        }
        if slots.is_empty() {
            slots.push_str("  (no showtimes)\n");
        }

        cinema_blocks.push_str(&format!(
            "Cinema {}:\n- Name: {}\n- Address: {}\n- Distance: {} km\n- Travel duration: {} minutes\n- Available showtimes (HH:mm, 24-hour):\n{}\n--------------------\n",
            i + 1,
            cinema.name,
            cinema.address,
            cinema.distance,
            cinema.duration,
            slots,
        ));
    }

    let time_filter_rule = if is_today {
        format!(
            "Because the viewing date ({view_date}) is today, you MUST discard every showtime strictly earlier than {now_time} and keep only showtimes from {now_time} onwards."
        )
    } else {
        format!(
            "Because the viewing date ({view_date}) is NOT today, do not discard any showtime; keep every showtime of that day."
        )
    };

    format!(
        r#"You are an assistant that picks the single best cinema for a film outing.

Your task is to analyse the data below and recommend exactly ONE cinema for watching "{film_name}".

CONTEXT:
- Requested viewing date: {view_date}
- Today's date: {today}
- Current time: {now_time} (24-hour)
- The analysis applies to {view_date} only.

CINEMA DATA:
{cinema_blocks}
ANALYSIS STEPS (follow in this exact order):

1. Filter valid showtimes:
   - {time_filter_rule}
   - After filtering, remove any cinema left with zero showtimes from consideration.

2. Earliest showtime:
   - For each remaining cinema, identify its EARLIEST remaining showtime.

3. Price comparison (conditional):
   - Only if EVERY remaining cinema has a known ticket price (none marked "unknown"), prefer the cheaper ticket.
   - If ANY cinema's price is unknown, ignore price entirely.

4. Decision criteria, in priority order:
   1. A valid showtime must exist (step 1).
   2. SHORTEST travel duration.
   3. If durations tie, shorter distance.
   4. Price, only under the step-3 condition.

RESPONSE FORMAT:
A short, friendly paragraph naming the chosen cinema, its travel duration, its earliest suitable showtime, and the price comparison if one was used."#
    )
}

/// The synthesizer's reasoning is unverifiable, so its pick is only trusted
/// when it names a cinema we actually offered.
pub fn names_candidate(text: &str, candidates: &[CinemaPick]) -> bool {
    let lowered = text.to_lowercase();
    candidates.iter().any(|c| lowered.contains(&c.name.to_lowercase()))
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Debug, Deserialize)]
struct ResponseCandidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ShowtimeSlot;

    fn picks() -> Vec<CinemaPick> {
        vec![
            CinemaPick {
                name: "CGV Vincom Đà Nẵng".to_string(),
                slug: "cgv-vincom-da-nang".to_string(),
                address: "910A Ngô Quyền".to_string(),
                distance: 2.0,
                duration: 8.5,
                showtimes: vec![ShowtimeSlot {
                    time: "20:00".to_string(),
                    price: Some("100,000".to_string()),
                    order_link: None,
                }],
            },
            CinemaPick {
                name: "Metiz Cinema".to_string(),
                slug: "metiz-cinema".to_string(),
                address: "36 Bạch Đằng".to_string(),
                distance: 3.4,
                duration: 12.0,
                showtimes: vec![ShowtimeSlot {
                    time: "18:30".to_string(),
                    price: None,
                    order_link: None,
                }],
            },
        ]
    }

    #[test]
    fn prompt_lists_every_candidate_with_travel_data() {
        let prompt = build_prompt(&picks(), "Mission", "2024-06-01", "2024-06-01", "09:00");
        assert!(prompt.contains("CGV Vincom Đà Nẵng"));
        assert!(prompt.contains("Metiz Cinema"));
        assert!(prompt.contains("2 km"));
        assert!(prompt.contains("8.5 minutes"));
        assert!(prompt.contains("20:00 (price: 100,000)"));
        assert!(prompt.contains("18:30 (price: unknown)"));
    }

    #[test]
    fn prompt_filters_by_time_only_for_today() {
        let today = build_prompt(&picks(), "Mission", "2024-06-01", "2024-06-01", "09:00");
        assert!(today.contains("strictly earlier than 09:00"));

        let future = build_prompt(&picks(), "Mission", "2024-06-02", "2024-06-01", "09:00");
        assert!(future.contains("NOT today"));
        assert!(!future.contains("strictly earlier than 09:00"));
    }

    #[test]
    fn pick_must_name_a_supplied_cinema() {
        let picks = picks();
        assert!(names_candidate("Go to Metiz Cinema, it is closest.", &picks));
        assert!(names_candidate("metiz cinema is the best option today", &picks));
        assert!(!names_candidate("I recommend Galaxy Cinema downtown.", &picks));
    }
}
