//! 結果カードの生データ → LeadRecord 変換
//!
//! ブラウザに依存しない純粋な処理のみ

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::types::LeadRecord;

/// ページ側のJavaScriptが返すカード1件分（すべて生テキスト）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawCard {
    pub name: Option<String>,
    pub category: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub rating: Option<String>,
    pub reviews: Option<String>,
}

impl RawCard {
    /// 名前が無いカードは None
    pub fn into_record(self) -> Option<LeadRecord> {
        let name = clean_text(self.name.as_deref())?;

        Some(LeadRecord {
            name,
            category: clean_text(self.category.as_deref()),
            address: clean_text(self.address.as_deref()),
            phone: clean_text(self.phone.as_deref()),
            website: clean_text(self.website.as_deref()).filter(|w| w.starts_with("http")),
            email: None,
            rating: self.rating.as_deref().and_then(parse_rating),
            review_count: self.reviews.as_deref().and_then(parse_review_count),
        })
    }
}

/// アイコングリフ（私用領域）や制御文字を除去し、空白を詰める。空なら None
pub fn clean_text(raw: Option<&str>) -> Option<String> {
    let raw = raw?;
    let cleaned: String = raw
        .chars()
        .filter(|c| !is_private_use(*c))
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let cleaned = cleaned.trim_start_matches('·').trim().to_string();

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

fn is_private_use(c: char) -> bool {
    matches!(c, '\u{E000}'..='\u{F8FF}')
}

/// "4.6" / "4,6" / "4.6 stars" → 4.6 （0.0〜5.0 の範囲外は None）
pub fn parse_rating(raw: &str) -> Option<f64> {
    static RATING: OnceLock<Option<Regex>> = OnceLock::new();
    let re = RATING
        .get_or_init(|| Regex::new(r"(\d+(?:[.,]\d+)?)").ok())
        .as_ref()?;

    let value: f64 = re
        .captures(raw)?
        .get(1)?
        .as_str()
        .replace(',', ".")
        .parse()
        .ok()?;

    (0.0..=5.0).contains(&value).then_some(value)
}

/// "(1,234)" / "1,234 reviews" / "1.2K" → 件数
pub fn parse_review_count(raw: &str) -> Option<u64> {
    static REVIEWS: OnceLock<Option<Regex>> = OnceLock::new();
    let re = REVIEWS
        .get_or_init(|| Regex::new(r"(\d[\d,.]*)\s*([KkMm]?)").ok())
        .as_ref()?;

    let caps = re.captures(raw)?;
    let number = caps.get(1)?.as_str();
    let suffix = caps.get(2).map(|m| m.as_str()).unwrap_or_default();

    let multiplier = match suffix {
        "K" | "k" => 1_000.0,
        "M" | "m" => 1_000_000.0,
        _ => 1.0,
    };

    if multiplier > 1.0 {
        let value: f64 = number.replace(',', ".").parse().ok()?;
        Some((value * multiplier).round() as u64)
    } else {
        number.replace([',', '.'], "").parse().ok()
    }
}

/// HTMLから最初の有効そうなメールアドレスを探す
pub fn find_email(html: &str) -> Option<String> {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    let re = EMAIL
        .get_or_init(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").ok())
        .as_ref()?;

    re.find_iter(html)
        .map(|m| m.as_str().trim_end_matches('.').to_string())
        .find(|email| is_plausible_email(email))
}

fn is_plausible_email(email: &str) -> bool {
    const IGNORED_DOMAINS: &[&str] = &["example.com", "example.org", "domain.com", "sentry.io"];
    const ASSET_SUFFIXES: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp"];

    let lower = email.to_ascii_lowercase();
    let domain = lower.rsplit('@').next().unwrap_or_default();

    !IGNORED_DOMAINS.iter().any(|d| domain.ends_with(d))
        && !ASSET_SUFFIXES.iter().any(|s| lower.ends_with(s))
}
