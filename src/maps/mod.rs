//! Google Maps スクレイパーモジュール
//!
//! 検索結果のカードからリード情報を収集する

mod extract;
mod scraper;

pub use extract::{clean_text, find_email, parse_rating, parse_review_count, RawCard};
pub use scraper::MapsScraper;
