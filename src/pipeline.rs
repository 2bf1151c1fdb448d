//! 収集 → 出力 → 送信 の直列パイプライン
//!
//! 各ステージは前のステージが成功した場合のみ開始する。
//! 送信はフラグと設定の両方が有効な場合のみ行い、それ以外はスキップ（失敗ではない）。

use std::fmt;

use tracing::{info, warn};

use crate::config::EmailSettings;
use crate::error::LeadError;
use crate::export::Exporter;
use crate::notify::Notifier;
use crate::traits::Collector;
use crate::types::{Query, ReportFile};

/// パイプラインの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    Collecting,
    Exporting,
    Sending,
    Done,
    Failed,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Start => "start",
            Stage::Collecting => "collecting",
            Stage::Exporting => "exporting",
            Stage::Sending => "sending",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 1回の実行リクエスト
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub query: Query,
    /// `--email` フラグ
    pub send_email: bool,
}

impl RunRequest {
    pub fn new(query: Query) -> Self {
        Self {
            query,
            send_email: false,
        }
    }

    pub fn with_email(mut self, send_email: bool) -> Self {
        self.send_email = send_email;
        self
    }
}

/// 送信ステージの結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent { recipients: usize },
    /// フラグなし
    NotRequested,
    /// フラグありだが設定で無効
    Disabled,
}

/// 成功時の結果
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: ReportFile,
    pub delivery: Delivery,
    /// 通過したステージ（START から DONE まで）
    pub stages: Vec<Stage>,
}

pub struct Pipeline {
    exporter: Exporter,
    email: EmailSettings,
    notifier: Option<Notifier>,
}

impl Pipeline {
    /// SMTP送信を使うパイプライン。Notifier は送信が必要になった時点で検証して作る
    pub fn new(exporter: Exporter, email: EmailSettings) -> Self {
        Self {
            exporter,
            email,
            notifier: None,
        }
    }

    /// 作成済みの Notifier を使う
    pub fn with_notifier(exporter: Exporter, notifier: Notifier) -> Self {
        Self {
            exporter,
            email: notifier.settings().clone(),
            notifier: Some(notifier),
        }
    }

    /// 送信が必要なら Notifier を用意する。収集前に呼び、設定不備はここで失敗させる
    fn prepare_notifier(&self, send_email: bool) -> Result<Option<NotifierRef<'_>>, LeadError> {
        if !send_email {
            return Ok(None);
        }
        if !self.email.enabled {
            info!("--email given but email delivery is disabled in config, sending will be skipped");
            return Ok(None);
        }

        match &self.notifier {
            Some(notifier) => {
                notifier.settings().validate()?;
                Ok(Some(NotifierRef::Borrowed(notifier)))
            }
            None => Ok(Some(NotifierRef::Owned(Notifier::new(self.email.clone())?))),
        }
    }

    /// パイプラインを実行する
    pub async fn run(
        &self,
        collector: &mut dyn Collector,
        request: RunRequest,
    ) -> Result<RunOutcome, LeadError> {
        let RunRequest { query, send_email } = request;
        let mut stages = vec![Stage::Start];

        let notifier = self.prepare_notifier(send_email).map_err(log_failure)?;

        stages.push(Stage::Collecting);
        info!(stage = %Stage::Collecting, "Collecting leads for {}", query.search_text());
        let leads = collector.execute(&query).await.map_err(log_failure)?;
        info!(stage = %Stage::Collecting, "Collected {} leads", leads.len());

        stages.push(Stage::Exporting);
        info!(stage = %Stage::Exporting, "Exporting to {:?}", self.exporter.report_path(&query));
        let report = self.exporter.export(&query, leads).map_err(log_failure)?;

        let delivery = match notifier {
            Some(notifier) => {
                stages.push(Stage::Sending);
                let notifier = notifier.get();
                let recipients = notifier.settings().recipients.len();
                let job = notifier.build_job(&query, report.clone());
                notifier.send(job).await.map_err(log_failure)?;
                Delivery::Sent { recipients }
            }
            None if send_email => Delivery::Disabled,
            None => Delivery::NotRequested,
        };

        stages.push(Stage::Done);
        info!(stage = %Stage::Done, "Pipeline finished: {:?}", report.path());

        Ok(RunOutcome {
            report,
            delivery,
            stages,
        })
    }
}

enum NotifierRef<'a> {
    Borrowed(&'a Notifier),
    Owned(Notifier),
}

impl NotifierRef<'_> {
    fn get(&self) -> &Notifier {
        match self {
            NotifierRef::Borrowed(n) => n,
            NotifierRef::Owned(n) => n,
        }
    }
}

fn log_failure(e: LeadError) -> LeadError {
    warn!(stage = %e.stage(), next = %Stage::Failed, "Pipeline aborted: {}", e);
    e
}
