pub mod cache_entry;
pub mod cinema;
pub mod film;
pub mod showtime;
pub mod showtime_detail;
