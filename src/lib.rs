//! リードスクレイパーライブラリ
//!
//! - Google Maps の検索結果からリード（店名・住所・電話・Webサイト・評価）を収集
//! - `data/leads/{niche}_{city}_{country}.xlsx` に出力
//! - 必要に応じて SMTP でレポートを送信
//!
//! # 使用例
//!
//! ```rust,ignore
//! use lead_scraper::{AppConfig, LeadService, Query, RunRequest};
//! use tower::Service;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::load("config.toml").unwrap();
//!     let mut service = LeadService::new(config);
//!
//!     let query = Query::new("roofing contractor", "Dallas", "USA", 60).unwrap();
//!     let outcome = service.call(RunRequest::new(query).with_email(true)).await.unwrap();
//!     println!("Report: {:?}", outcome.report.path());
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod logger;
pub mod maps;
pub mod notify;
pub mod pipeline;
pub mod service;
pub mod traits;
pub mod types;

// 主要な型をリエクスポート
pub use cli::Cli;
pub use config::{
    AppConfig, CollectorConfig, Credentials, EmailSettings, ExportConfig, SmtpSecurity,
};
pub use error::LeadError;
pub use export::Exporter;
pub use maps::MapsScraper;
pub use notify::{Notifier, SmtpMailer};
pub use pipeline::{Delivery, Pipeline, RunOutcome, RunRequest, Stage};
pub use service::LeadService;
pub use traits::{Collector, Mailer};
pub use types::{EmailJob, LeadRecord, LeadSet, Query, ReportFile, ReportFormat};
