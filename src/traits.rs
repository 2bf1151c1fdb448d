use async_trait::async_trait;
use tracing::warn;

use crate::error::LeadError;
use crate::types::{EmailJob, LeadSet, Query};

#[async_trait]
pub trait Collector: Send {
    /// ブラウザ初期化
    async fn initialize(&mut self) -> Result<(), LeadError>;

    /// 検索して最大 `row_limit` 件のリードを収集
    async fn collect(&mut self, query: &Query) -> Result<LeadSet, LeadError>;

    /// リソース解放
    async fn close(&mut self) -> Result<(), LeadError>;

    /// 一括実行（initialize → collect → close）
    ///
    /// collect の成否にかかわらず close を必ず呼ぶ
    async fn execute(&mut self, query: &Query) -> Result<LeadSet, LeadError> {
        let result = match self.initialize().await {
            Ok(()) => self.collect(query).await,
            Err(e) => Err(e),
        };

        if let Err(e) = self.close().await {
            warn!("Collector close failed: {}", e);
        }

        result
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// メールを1回だけ送信する
    async fn deliver(&self, job: &EmailJob) -> Result<(), LeadError>;
}
