use scraper::{Html, Selector};
use tracing::debug;

use crate::{
    error::{AppError, AppResult},
    models::{ExtractedFilm, ExtractedRecord, ExtractedShowtime},
};

/// Fetches and parses the source site's per-cinema showtimes page. Stands in
/// for the browser-automation extractor as a plain HTTP fetch; the output
/// contract is the same structured records.
pub struct MoveekExtractor {
    client: reqwest::Client,
    base_url: String,
}

impl MoveekExtractor {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    pub async fn extract(&self, cinema_slug: &str, date: &str) -> AppResult<Vec<ExtractedRecord>> {
        let url = format!(
            "{}/rap/{}/?date={}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(cinema_slug),
            date,
        );

        debug!(cinema = %cinema_slug, date = %date, "fetching showtimes page");
        let html = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::upstream("moveek", e))?
            .error_for_status()
            .map_err(|e| AppError::upstream("moveek", e))?
            .text()
            .await
            .map_err(|e| AppError::upstream("moveek", e))?;

        let records = parse_showtimes_page(&html);
        debug!(cinema = %cinema_slug, date = %date, films_found = records.len(), "parsed showtimes page");
        Ok(records)
    }
}

pub fn parse_showtimes_page(html: &str) -> Vec<ExtractedRecord> {
    let doc = Html::parse_document(html);
    let film_sel = Selector::parse("div[data-movie-id]").unwrap();
    let title_sel = Selector::parse("h4.card-title.mb-1.name a").unwrap();
    let image_sel = Selector::parse("img.rounded.img-fluid").unwrap();
    let desc_sel = Selector::parse("p.card-text.small.text-muted.mb-0").unwrap();
    let group_sel = Selector::parse(".mt-2 .mb-1").unwrap();
    let button_sel = Selector::parse("a.btn-showtime").unwrap();
    let time_sel = Selector::parse("span.time").unwrap();
    let price_sel = Selector::parse("span.amenity.price").unwrap();

    let mut out = Vec::new();

    for el in doc.select(&film_sel) {
        let title_link = el.select(&title_sel).next();
        let title = title_link
            .map(|a| a.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty());
        let slug = title_link
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| href.split('/').nth(2))
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let image = el
            .select(&image_sel)
            .next()
            .and_then(|img| img.value().attr("src"))
            .map(str::to_string);
        let duration = el
            .select(&desc_sel)
            .next()
            .map(|p| p.text().collect::<String>())
            .and_then(|desc| parse_duration(&desc));

        let mut showtimes = Vec::new();
        for group in el.select(&group_sel) {
            for btn in group.select(&button_sel) {
                let time = btn
                    .select(&time_sel)
                    .next()
                    .map(|t| t.text().collect::<String>().trim().to_string())
                    .filter(|t| !t.is_empty());
                let price = btn
                    .select(&price_sel)
                    .next()
                    .map(|p| p.text().collect::<String>().trim().to_string())
                    .filter(|p| !p.is_empty());
                let order_link = btn.value().attr("href").map(str::to_string);

                // A slot without a time or booking link is noise on the page,
                // not a screening.
                if let (Some(time), Some(order_link)) = (time, order_link) {
                    showtimes.push(ExtractedShowtime { time, price, order_link });
                }
            }
        }

        out.push(ExtractedRecord {
            film: ExtractedFilm { title, slug, image, duration },
            showtimes,
        });
    }

    out
}

/// Pulls minutes out of the page's `XhYY'` duration notation, wherever it
/// sits in the description line.
pub fn parse_duration(text: &str) -> Option<i32> {
    text.split(|c: char| !c.is_ascii_alphanumeric()).find_map(|token| {
        let (hours, minutes) = token.split_once('h')?;
        if hours.is_empty()
            || minutes.is_empty()
            || !hours.bytes().all(|b| b.is_ascii_digit())
            || !minutes.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        Some(hours.parse::<i32>().ok()? * 60 + minutes.parse::<i32>().ok()?)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<html><body>
<div data-movie-id="101">
  <img class="rounded img-fluid" src="https://cdn.example.com/mission.webp">
  <h4 class="card-title mb-1 name"><a href="/phim/nhiem-vu-bat-kha-thi">Nhiệm Vụ Bất Khả Thi</a></h4>
  <p class="card-text small text-muted mb-0">Hành động, Phiêu lưu · 2h43'</p>
  <div class="mt-2">
    <div class="mb-1">
      <a class="btn-showtime" href="/booking/8201"><span class="time">14:30</span><span class="amenity price">100.000đ</span></a>
      <a class="btn-showtime" href="/booking/8202"><span class="time">20:00</span></a>
    </div>
  </div>
</div>
<div data-movie-id="102">
  <h4 class="card-title mb-1 name"><a href="/phim/phim-thieu-anh">Phim Thiếu Ảnh</a></h4>
  <p class="card-text small text-muted mb-0">Kinh dị · 1h45'</p>
  <div class="mt-2">
    <div class="mb-1">
      <a class="btn-showtime" href="/booking/8300"><span class="time">18:15</span></a>
      <a class="btn-showtime" href="/booking/8301"></a>
    </div>
  </div>
</div>
</body></html>
"#;

    #[test]
    fn parses_complete_film_block() {
        let records = parse_showtimes_page(PAGE);
        assert_eq!(records.len(), 2);

        let film = &records[0].film;
        assert_eq!(film.title.as_deref(), Some("Nhiệm Vụ Bất Khả Thi"));
        assert_eq!(film.slug.as_deref(), Some("nhiem-vu-bat-kha-thi"));
        assert_eq!(film.image.as_deref(), Some("https://cdn.example.com/mission.webp"));
        assert_eq!(film.duration, Some(163));

        let slots = &records[0].showtimes;
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].time, "14:30");
        assert_eq!(slots[0].price.as_deref(), Some("100.000đ"));
        assert_eq!(slots[0].order_link, "/booking/8201");
        assert_eq!(slots[1].price, None);
    }

    #[test]
    fn incomplete_film_keeps_missing_fields_as_none() {
        let records = parse_showtimes_page(PAGE);
        let film = &records[1].film;
        assert_eq!(film.title.as_deref(), Some("Phim Thiếu Ảnh"));
        assert_eq!(film.image, None);
        assert_eq!(film.duration, Some(105));
    }

    #[test]
    fn slot_without_time_is_dropped() {
        let records = parse_showtimes_page(PAGE);
        assert_eq!(records[1].showtimes.len(), 1);
        assert_eq!(records[1].showtimes[0].time, "18:15");
    }

    #[test]
    fn duration_notation_variants() {
        assert_eq!(parse_duration("Hành động · 2h43'"), Some(163));
        assert_eq!(parse_duration("1h05'"), Some(65));
        assert_eq!(parse_duration("Phiêu lưu · 2h00'"), Some(120));
        assert_eq!(parse_duration("no duration here"), None);
        assert_eq!(parse_duration("4h"), None);
        assert_eq!(parse_duration(""), None);
    }
}
