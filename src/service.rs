use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::Service;
use tracing::info;

use crate::config::{AppConfig, CollectorConfig};
use crate::error::LeadError;
use crate::export::Exporter;
use crate::maps::MapsScraper;
use crate::pipeline::{Pipeline, RunOutcome, RunRequest};
use crate::traits::Collector;

type CollectorFactory = Arc<dyn Fn() -> Box<dyn Collector> + Send + Sync>;

/// tower::Serviceを実装したリード収集サービス
///
/// リクエストごとに新しい Collector（ブラウザセッション）を作る
#[derive(Clone)]
pub struct LeadService {
    pipeline: Arc<Pipeline>,
    make_collector: CollectorFactory,
}

impl LeadService {
    /// Google Maps スクレイパーを使うサービス
    pub fn new(config: AppConfig) -> Self {
        let collector_config = config.collector.clone();
        Self::with_collector(
            Pipeline::new(Exporter::new(config.export), config.email),
            move || maps_collector(collector_config.clone()),
        )
    }

    /// 任意の Collector を使うサービス
    pub fn with_collector<F>(pipeline: Pipeline, make_collector: F) -> Self
    where
        F: Fn() -> Box<dyn Collector> + Send + Sync + 'static,
    {
        Self {
            pipeline: Arc::new(pipeline),
            make_collector: Arc::new(make_collector),
        }
    }
}

fn maps_collector(config: CollectorConfig) -> Box<dyn Collector> {
    Box::new(MapsScraper::new(config))
}

impl Service<RunRequest> for LeadService {
    type Response = RunOutcome;
    type Error = LeadError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: RunRequest) -> Self::Future {
        info!(
            "Run request: query=\"{}\" rows={} email={}",
            req.query.search_text(),
            req.query.row_limit(),
            req.send_email
        );

        let pipeline = self.pipeline.clone();
        let mut collector = (self.make_collector)();

        Box::pin(async move {
            let outcome = pipeline.run(collector.as_mut(), req).await?;

            info!(
                "Run complete: path={:?}, rows={}, delivery={:?}",
                outcome.report.path(),
                outcome.report.rows(),
                outcome.delivery
            );

            Ok(outcome)
        })
    }
}
