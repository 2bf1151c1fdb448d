use std::time::Duration;

use lead_scraper::{Collector, CollectorConfig, MapsScraper, Query};

#[tokio::main]
async fn main() {
    // ログ設定
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let niche = std::env::var("DEMO_NICHE").unwrap_or_else(|_| "coffee shop".to_string());
    let city = std::env::var("DEMO_CITY").unwrap_or_else(|_| "Austin".to_string());

    let query = match Query::new(niche, city, "USA", 10) {
        Ok(query) => query,
        Err(e) => {
            eprintln!("エラー: {}", e);
            return;
        }
    };

    // デバッグ用に表示モード。DEMO_EMAILS=0 でメール探索を省く
    let extract_emails = std::env::var("DEMO_EMAILS").map_or(true, |v| v != "0");
    let config = CollectorConfig::default()
        .with_headless(false)
        .with_timeout(Duration::from_secs(90))
        .with_extract_emails(extract_emails);
    let mut scraper = MapsScraper::new(config);

    println!("=== Maps Collector Demo: {} ===", query.search_text());

    match scraper.execute(&query).await {
        Ok(leads) => {
            println!("成功! {} 件", leads.len());
            for lead in leads.iter() {
                println!(
                    "  - {} | {} | {} | {:?}",
                    lead.name,
                    lead.phone.as_deref().unwrap_or("-"),
                    lead.website.as_deref().unwrap_or("-"),
                    lead.rating
                );
            }
        }
        Err(e) => {
            eprintln!("エラー: {}", e);
        }
    }
}
