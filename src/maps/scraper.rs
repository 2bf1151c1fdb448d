//! Google Maps スクレイパー実装
//!
//! 検索 → フィードをスクロール → 各カードを開いて詳細を読む

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::CollectorConfig;
use crate::error::LeadError;
use crate::traits::Collector;
use crate::types::{LeadSet, Query};

use super::extract::{find_email, RawCard};

const MAPS_SEARCH_URL: &str = "https://www.google.com/maps/search/";
const FEED_SELECTOR: &str = "div[role='feed']";
const CARD_SELECTOR: &str = "div[role='feed'] div[role='article'], div.Nv2PK";

/// スクロール1回あたりの移動量（px）
const SCROLL_STEP_PX: u32 = 2600;
const SCROLL_PAUSE_MS: u64 = 800;
/// 結果フィードの出現待ち（秒）
const FEED_WAIT_SECS: u32 = 12;
/// カードクリック後の詳細パネル待ち
const DETAIL_WAIT_MS: u64 = 1300;
const DETAIL_POLL_ATTEMPTS: u32 = 10;
/// Webサイトからのメール探索タイムアウト（秒）
const WEBSITE_TIMEOUT_SECS: u64 = 15;

const CONSENT_SCRIPT: &str = r#"
    (() => {
        const labels = ['Accept all', 'I agree', 'Accept', 'Got it'];
        const buttons = Array.from(document.querySelectorAll('button'));
        for (const label of labels) {
            const btn = buttons.find(b => (b.innerText || '').trim() === label);
            if (btn) {
                btn.click();
                return true;
            }
        }
        return false;
    })()
"#;

const DETAIL_SCRIPT: &str = r#"
    (() => {
        const text = (sel) => {
            const el = document.querySelector(sel);
            return el ? (el.innerText || el.textContent || '') : null;
        };
        const attr = (sel, name) => {
            const el = document.querySelector(sel);
            return el ? el.getAttribute(name) : null;
        };
        const reviewsEl = document.querySelector("div.F7nice span[aria-label*='review']");
        return JSON.stringify({
            name: text("h1.DUwDvf, h1[aria-level='1']"),
            category: text("button.DkEaL, button[jsaction*='category']"),
            address: text("button[data-item-id*='address']"),
            phone: text("button[data-item-id*='phone']"),
            website: attr("a[data-item-id*='authority'], a[aria-label^='Website']", 'href'),
            rating: text("div.F7nice span[aria-hidden='true']"),
            reviews: reviewsEl
                ? (reviewsEl.getAttribute('aria-label') || reviewsEl.textContent)
                : null,
        });
    })()
"#;

/// スクロール後のフィード状態
#[derive(Debug, Deserialize)]
struct FeedState {
    count: usize,
    end: bool,
}

/// Google Maps スクレイパー
pub struct MapsScraper {
    config: CollectorConfig,
    browser: Option<Browser>,
    handler_task: Option<JoinHandle<()>>,
    user_data_dir: Option<PathBuf>,
    website_timeout: Duration,
}

impl MapsScraper {
    pub fn new(config: CollectorConfig) -> Self {
        Self {
            config,
            browser: None,
            handler_task: None,
            user_data_dir: None,
            website_timeout: Duration::from_secs(WEBSITE_TIMEOUT_SECS),
        }
    }

    fn get_browser(&self) -> Result<&Browser, LeadError> {
        self.browser
            .as_ref()
            .ok_or_else(|| LeadError::Collection("ブラウザが初期化されていません".into()))
    }

    /// 検索URLを構築
    pub fn search_url(query: &Query) -> String {
        let encoded: String =
            url::form_urlencoded::byte_serialize(query.search_text().as_bytes()).collect();
        format!("{}{}?hl=en&gl=us", MAPS_SEARCH_URL, encoded)
    }

    fn chrome_path(&self) -> String {
        self.config
            .chrome_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .or_else(|| std::env::var("CHROME_PATH").ok())
            .or_else(|| std::env::var("CHROMIUM_PATH").ok())
            .unwrap_or_else(|| "chromium".to_string())
    }

    async fn eval_bool(page: &Page, script: &str) -> bool {
        page.evaluate(script)
            .await
            .ok()
            .and_then(|v| v.into_value::<bool>().ok())
            .unwrap_or(false)
    }

    async fn eval_string(page: &Page, script: &str) -> Result<String, LeadError> {
        page.evaluate(script)
            .await
            .map_err(|e| LeadError::Collection(format!("JavaScript実行: {}", e)))?
            .into_value::<String>()
            .map_err(|e| LeadError::Collection(format!("JavaScript結果: {}", e)))
    }

    async fn navigate(&self, page: &Page, url: &str) -> Result<(), LeadError> {
        match timeout(self.config.timeout, page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(LeadError::Collection(format!("ナビゲーション: {}", e))),
            Err(_) => Err(LeadError::Collection(format!(
                "ナビゲーションが{}秒以内に完了しませんでした",
                self.config.timeout.as_secs()
            ))),
        }
    }

    async fn dismiss_consent(&self, page: &Page) {
        if Self::eval_bool(page, CONSENT_SCRIPT).await {
            info!("Consent dialog dismissed");
            sleep(Duration::from_secs(2)).await;
        }
    }

    async fn wait_for_feed(&self, page: &Page) -> bool {
        let script = format!("document.querySelector(\"{}\") !== null", FEED_SELECTOR);
        for i in 0..FEED_WAIT_SECS {
            if Self::eval_bool(page, &script).await {
                debug!("Results feed detected after {}s", i);
                return true;
            }
            sleep(Duration::from_secs(1)).await;
        }
        false
    }

    async fn scroll_feed(&self, page: &Page) -> Result<FeedState, LeadError> {
        let script = format!(
            r#"
            (() => {{
                const feed = document.querySelector("{feed}");
                if (feed) {{
                    feed.scrollBy(0, {step});
                }}
                const text = feed ? (feed.innerText || '') : '';
                return JSON.stringify({{
                    count: document.querySelectorAll("{cards}").length,
                    end: text.includes("You've reached the end of the list"),
                }});
            }})()
            "#,
            feed = FEED_SELECTOR,
            step = SCROLL_STEP_PX,
            cards = CARD_SELECTOR,
        );

        let json = Self::eval_string(page, &script).await?;
        serde_json::from_str(&json)
            .map_err(|e| LeadError::Collection(format!("フィード状態の解析: {}", e)))
    }

    /// 件数が `row_limit` に達する / リスト終端 / 増加停止 / 試行上限 までスクロール
    async fn load_results(&self, page: &Page, row_limit: usize) -> Result<usize, LeadError> {
        let mut last_count = 0;
        let mut stalled = 0;

        for attempt in 1..=self.config.max_scroll_attempts {
            let state = self.scroll_feed(page).await?;
            debug!(
                "Scroll {}/{}: {} cards, end={}",
                attempt, self.config.max_scroll_attempts, state.count, state.end
            );

            if state.count >= row_limit || state.end {
                return Ok(state.count);
            }

            if state.count == last_count {
                stalled += 1;
                if stalled >= self.config.stall_limit && state.count > 0 {
                    info!("No new results after {} scrolls, stopping", stalled);
                    return Ok(state.count);
                }
            } else {
                stalled = 0;
                last_count = state.count;
            }

            sleep(Duration::from_millis(SCROLL_PAUSE_MS)).await;
        }

        Ok(last_count)
    }

    async fn log_debug_screenshot(&self, page: &Page) {
        if !self.config.debug {
            return;
        }
        if let Ok(screenshot) = page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
        {
            use base64::Engine;
            let encoded = base64::engine::general_purpose::STANDARD.encode(&screenshot);
            debug!("Empty results screenshot: data:image/png;base64,{}", encoded);
        }
    }

    /// index番目のカードを開き、詳細パネルが切り替わるのを待って読む
    async fn read_card(
        &self,
        page: &Page,
        index: usize,
        previous_name: Option<&str>,
    ) -> Result<RawCard, LeadError> {
        let click_script = format!(
            r#"
            (() => {{
                const card = document.querySelectorAll("{cards}")[{index}];
                if (!card) return false;
                card.scrollIntoView({{ block: 'center' }});
                const link = card.querySelector('a.hfpxzc') || card.querySelector('a');
                (link || card).click();
                return true;
            }})()
            "#,
            cards = CARD_SELECTOR,
            index = index,
        );

        if !Self::eval_bool(page, &click_script).await {
            return Err(LeadError::Collection(format!("カード {} が見つかりません", index)));
        }

        sleep(Duration::from_millis(DETAIL_WAIT_MS)).await;

        let mut card = RawCard::default();
        for _ in 0..DETAIL_POLL_ATTEMPTS {
            let json = Self::eval_string(page, DETAIL_SCRIPT).await?;
            card = serde_json::from_str(&json)
                .map_err(|e| LeadError::Collection(format!("カード解析: {}", e)))?;

            let name = card.name.as_deref().map(str::trim).unwrap_or_default();
            if !name.is_empty() && Some(name) != previous_name {
                break;
            }
            sleep(Duration::from_millis(300)).await;
        }

        Ok(card)
    }

    /// Webサイトを別タブで開いてメールアドレスを探す。失敗は None
    ///
    /// タブはタイムアウトの外で作り、どの経路でも閉じる。
    async fn discover_email(&self, website: &str) -> Option<String> {
        let browser = self.browser.as_ref()?;

        let page = match timeout(self.website_timeout, browser.new_page("about:blank")).await {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => {
                debug!("Failed to open website tab: {}", e);
                return None;
            }
            Err(_) => {
                debug!("Opening website tab timed out: {}", website);
                return None;
            }
        };

        let fetched = timeout(self.website_timeout, async {
            page.goto(website).await?;
            page.content().await
        })
        .await;

        if let Err(e) = page.close().await {
            debug!("Failed to close website tab: {}", e);
        }

        match fetched {
            Ok(Ok(html)) => find_email(&html),
            Ok(Err(e)) => {
                debug!("Website fetch failed {}: {}", website, e);
                None
            }
            Err(_) => {
                debug!("Website email lookup timed out: {}", website);
                None
            }
        }
    }
}

#[async_trait]
impl Collector for MapsScraper {
    async fn initialize(&mut self) -> Result<(), LeadError> {
        info!("Initializing browser for maps scraper...");

        let unique_id = format!(
            "{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );
        let user_data_dir = std::env::temp_dir().join(format!("lead-scraper-{}", unique_id));

        let mut builder = BrowserConfig::builder()
            .chrome_executable(self.chrome_path())
            .user_data_dir(&user_data_dir)
            .window_size(1280, 900);

        if !self.config.headless {
            builder = builder.with_head();
        }

        builder = builder
            .no_sandbox()
            .request_timeout(self.config.timeout)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--lang=en-US");

        if self.config.debug {
            builder = builder.arg("--enable-logging=stderr").arg("--v=1");
        }

        let browser_config = builder
            .build()
            .map_err(|e| LeadError::Collection(format!("ブラウザ設定エラー: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| LeadError::Collection(format!("ブラウザ起動失敗: {}", e)))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                debug!("Browser event: {:?}", event);
            }
        });

        self.browser = Some(browser);
        self.handler_task = Some(handler_task);
        self.user_data_dir = Some(user_data_dir);

        info!("Browser initialized successfully");
        Ok(())
    }

    async fn collect(&mut self, query: &Query) -> Result<LeadSet, LeadError> {
        info!("Searching for: {}", query.search_text());

        let page = self
            .get_browser()?
            .new_page("about:blank")
            .await
            .map_err(|e| LeadError::Collection(e.to_string()))?;

        let url = Self::search_url(query);
        debug!("Navigating to {}", url);
        self.navigate(&page, &url).await?;

        self.dismiss_consent(&page).await;

        if !self.wait_for_feed(&page).await {
            warn!("Results feed not found after {}s", FEED_WAIT_SECS);
        }

        let found = self.load_results(&page, query.row_limit()).await?;
        info!("Found {} cards", found);

        if found == 0 {
            self.log_debug_screenshot(&page).await;
            return Err(LeadError::Collection(format!(
                "検索結果が0件です ({}回スクロール後): {}",
                self.config.max_scroll_attempts,
                query.search_text()
            )));
        }

        let mut leads = LeadSet::for_query(query);
        let mut previous_name: Option<String> = None;

        for index in 0..found.min(query.row_limit()) {
            let card = match self.read_card(&page, index, previous_name.as_deref()).await {
                Ok(card) => card,
                Err(e) => {
                    warn!("Card {} error: {}", index, e);
                    continue;
                }
            };

            let Some(mut record) = card.into_record() else {
                debug!("Card {} has no name, skipped", index);
                continue;
            };

            if self.config.extract_emails {
                if let Some(website) = record.website.clone() {
                    record.email = self.discover_email(&website).await;
                }
            }

            debug!("Card {}: {:?}", index, record);
            previous_name = Some(record.name.clone());

            if !leads.push(record) {
                break;
            }
        }

        if let Err(e) = page.close().await {
            debug!("Failed to close page: {}", e);
        }

        if leads.is_empty() {
            return Err(LeadError::Collection(format!(
                "{}件のカードから名前を読み取れませんでした",
                found
            )));
        }

        info!("Collected {} leads", leads.len());
        Ok(leads)
    }

    async fn close(&mut self) -> Result<(), LeadError> {
        if let Some(mut browser) = self.browser.take() {
            info!("Closing browser...");
            if let Err(e) = browser.close().await {
                debug!("Browser close command failed: {}", e);
            }
            if let Err(e) = browser.wait().await {
                debug!("Browser wait failed: {}", e);
            }
        }

        if let Some(task) = self.handler_task.take() {
            task.abort();
        }

        if let Some(dir) = self.user_data_dir.take() {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                debug!("Failed to remove profile dir {:?}: {}", dir, e);
            }
        }

        Ok(())
    }
}
