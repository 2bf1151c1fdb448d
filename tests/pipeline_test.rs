use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use calamine::{open_workbook, Reader, Xlsx};
use lead_scraper::{
    Collector, Credentials, Delivery, EmailJob, EmailSettings, ExportConfig, Exporter, LeadError,
    LeadRecord, LeadSet, Mailer, Notifier, Pipeline, Query, ReportFormat, RunRequest, Stage,
};
use tempfile::TempDir;

/// 決まった件数のリードを返すフェイク
struct FakeCollector {
    available: usize,
    ignore_limit: bool,
    collect_calls: usize,
    closed: bool,
}

impl FakeCollector {
    fn with_results(available: usize) -> Self {
        Self {
            available,
            ignore_limit: false,
            collect_calls: 0,
            closed: false,
        }
    }

    /// row_limit を無視して全件を返す
    fn ignoring_limit(available: usize) -> Self {
        Self {
            ignore_limit: true,
            ..Self::with_results(available)
        }
    }
}

#[async_trait]
impl Collector for FakeCollector {
    async fn initialize(&mut self) -> Result<(), LeadError> {
        Ok(())
    }

    async fn collect(&mut self, query: &Query) -> Result<LeadSet, LeadError> {
        self.collect_calls += 1;
        if self.available == 0 {
            return Err(LeadError::Collection("no results".into()));
        }

        let mut leads = if self.ignore_limit {
            LeadSet::new(self.available)
        } else {
            LeadSet::for_query(query)
        };
        leads.extend((0..self.available).map(|i| LeadRecord {
            name: format!("{} #{}", query.niche(), i),
            address: Some(format!("{} Main St, {}", i, query.city())),
            phone: (i % 2 == 0).then(|| format!("555-{:04}", i)),
            rating: Some(4.0 + (i % 10) as f64 / 10.0),
            review_count: Some(i as u64 * 3),
            ..Default::default()
        }));
        Ok(leads)
    }

    async fn close(&mut self) -> Result<(), LeadError> {
        self.closed = true;
        Ok(())
    }
}

/// 常に認証エラーを返すSMTPのフェイク
struct RejectingMailer {
    attempts: AtomicUsize,
}

#[async_trait]
impl Mailer for RejectingMailer {
    async fn deliver(&self, job: &EmailJob) -> Result<(), LeadError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(LeadError::Delivery {
            report: job.attachment.path().to_path_buf(),
            message: "535 5.7.8 Username and Password not accepted".into(),
        })
    }
}

struct AcceptingMailer {
    attempts: AtomicUsize,
}

#[async_trait]
impl Mailer for AcceptingMailer {
    async fn deliver(&self, _job: &EmailJob) -> Result<(), LeadError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn enabled_email() -> EmailSettings {
    EmailSettings {
        enabled: true,
        credentials: Some(Credentials {
            sender: "reports@example.org".into(),
            password: "app-password".into(),
        }),
        ..Default::default()
    }
    .with_extra_recipients(["sales@example.org"])
}

fn exporter(dir: &TempDir, format: ReportFormat) -> Exporter {
    Exporter::new(
        ExportConfig::default()
            .with_output_dir(dir.path().join("data/leads"))
            .with_format(format),
    )
}

fn xlsx_data_rows(path: &std::path::Path) -> usize {
    let mut workbook: Xlsx<_> = open_workbook(path).unwrap();
    let range = workbook.worksheet_range("Leads").unwrap();
    range.height() - 1
}

#[tokio::test]
async fn test_dallas_roofing_scenario_writes_60_rows() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::new(exporter(&dir, ReportFormat::Xlsx), EmailSettings::default());
    let mut collector = FakeCollector::with_results(60);
    let query = Query::new("roofing contractor", "Dallas", "USA", 60).unwrap();

    let outcome = pipeline
        .run(&mut collector, RunRequest::new(query))
        .await
        .unwrap();

    assert!(outcome
        .report
        .path()
        .ends_with("data/leads/roofing_contractor_Dallas_USA.xlsx"));
    assert!(outcome.report.path().exists());
    assert_eq!(outcome.report.rows(), 60);
    assert_eq!(xlsx_data_rows(outcome.report.path()), 60);
    assert!(collector.closed);
}

#[tokio::test]
async fn test_row_count_is_min_of_found_and_limit() {
    for (available, limit, expected) in [(5, 20, 5), (50, 20, 20), (20, 20, 20), (1, 1, 1)] {
        let dir = TempDir::new().unwrap();
        let pipeline = Pipeline::new(exporter(&dir, ReportFormat::Csv), EmailSettings::default());
        let mut collector = FakeCollector::with_results(available);
        let query = Query::new("plumber", "Leeds", "UK", limit).unwrap();

        let outcome = pipeline
            .run(&mut collector, RunRequest::new(query))
            .await
            .unwrap();

        let content = std::fs::read_to_string(outcome.report.path()).unwrap();
        assert_eq!(
            content.lines().count() - 1,
            expected,
            "available={} limit={}",
            available,
            limit
        );
        assert_eq!(outcome.report.rows(), expected);
    }
}

#[tokio::test]
async fn test_rerun_overwrites_with_identical_bytes() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::new(exporter(&dir, ReportFormat::Csv), EmailSettings::default());
    let query = Query::new("hair salon", "Osaka", "Japan", 15).unwrap();

    let first = pipeline
        .run(
            &mut FakeCollector::with_results(30),
            RunRequest::new(query.clone()),
        )
        .await
        .unwrap();
    let first_bytes = std::fs::read(first.report.path()).unwrap();

    let second = pipeline
        .run(&mut FakeCollector::with_results(30), RunRequest::new(query))
        .await
        .unwrap();
    let second_bytes = std::fs::read(second.report.path()).unwrap();

    assert_eq!(first.report.path(), second.report.path());
    assert_eq!(first_bytes, second_bytes);
}

#[tokio::test]
async fn test_xlsx_rerun_is_byte_identical_across_seconds() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::new(exporter(&dir, ReportFormat::Xlsx), EmailSettings::default());
    let query = Query::new("roofing contractor", "Dallas", "USA", 12).unwrap();

    let first = pipeline
        .run(
            &mut FakeCollector::with_results(12),
            RunRequest::new(query.clone()),
        )
        .await
        .unwrap();
    let first_bytes = std::fs::read(first.report.path()).unwrap();

    // xlsx内のタイムスタンプは秒単位なので、秒をまたがせる
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    let second = pipeline
        .run(&mut FakeCollector::with_results(12), RunRequest::new(query))
        .await
        .unwrap();
    let second_bytes = std::fs::read(second.report.path()).unwrap();

    assert_eq!(first.report.path(), second.report.path());
    assert_eq!(first_bytes, second_bytes);
}

#[tokio::test]
async fn test_oversized_collection_is_capped_at_row_limit() {
    for format in [ReportFormat::Xlsx, ReportFormat::Csv] {
        let dir = TempDir::new().unwrap();
        let pipeline = Pipeline::new(exporter(&dir, format), EmailSettings::default());
        let mut collector = FakeCollector::ignoring_limit(100);
        let query = Query::new("roofing contractor", "Dallas", "USA", 10).unwrap();

        let outcome = pipeline
            .run(&mut collector, RunRequest::new(query))
            .await
            .unwrap();

        assert_eq!(outcome.report.rows(), 10);
        let written = match format {
            ReportFormat::Xlsx => xlsx_data_rows(outcome.report.path()),
            ReportFormat::Csv => {
                std::fs::read_to_string(outcome.report.path())
                    .unwrap()
                    .lines()
                    .count()
                    - 1
            }
        };
        assert_eq!(written, 10, "format={:?}", format);
    }
}

#[test]
fn test_zero_or_negative_rows_rejected_before_collection() {
    for rows in [0, -1] {
        let err = Query::new("dentist", "Kobe", "Japan", rows).unwrap_err();
        assert!(matches!(err, LeadError::Config(_)));
        assert_eq!(err.stage(), Stage::Start);
    }
}

#[tokio::test]
async fn test_email_flag_with_disabled_config_skips_sending() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::new(exporter(&dir, ReportFormat::Csv), EmailSettings::default());
    let mut collector = FakeCollector::with_results(3);
    let query = Query::new("florist", "Austin", "USA", 3).unwrap();

    let outcome = pipeline
        .run(&mut collector, RunRequest::new(query).with_email(true))
        .await
        .unwrap();

    assert_eq!(outcome.delivery, Delivery::Disabled);
    assert!(!outcome.stages.contains(&Stage::Sending));
    assert_eq!(outcome.stages.last(), Some(&Stage::Done));
}

#[tokio::test]
async fn test_smtp_auth_failure_keeps_report_on_disk() {
    let dir = TempDir::new().unwrap();
    let mailer = Arc::new(RejectingMailer {
        attempts: AtomicUsize::new(0),
    });
    let notifier = Notifier::with_mailer(enabled_email(), mailer.clone()).unwrap();
    let pipeline = Pipeline::with_notifier(exporter(&dir, ReportFormat::Xlsx), notifier);
    let mut collector = FakeCollector::with_results(8);
    let query = Query::new("roofing contractor", "Dallas", "USA", 8).unwrap();

    let err = pipeline
        .run(&mut collector, RunRequest::new(query).with_email(true))
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Stage::Sending);
    assert_ne!(err.exit_code(), 0);
    match err {
        LeadError::Delivery { report, .. } => {
            assert!(report.exists());
            assert_eq!(xlsx_data_rows(&report), 8);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(mailer.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_successful_delivery_visits_sending() {
    let dir = TempDir::new().unwrap();
    let mailer = Arc::new(AcceptingMailer {
        attempts: AtomicUsize::new(0),
    });
    let notifier = Notifier::with_mailer(enabled_email(), mailer.clone()).unwrap();
    let pipeline = Pipeline::with_notifier(exporter(&dir, ReportFormat::Csv), notifier);
    let query = Query::new("bakery", "Lyon", "France", 2).unwrap();

    let outcome = pipeline
        .run(
            &mut FakeCollector::with_results(2),
            RunRequest::new(query).with_email(true),
        )
        .await
        .unwrap();

    assert_eq!(outcome.delivery, Delivery::Sent { recipients: 1 });
    assert_eq!(
        outcome.stages,
        vec![
            Stage::Start,
            Stage::Collecting,
            Stage::Exporting,
            Stage::Sending,
            Stage::Done
        ]
    );
    assert_eq!(mailer.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_mailer_not_used_without_email_flag() {
    let dir = TempDir::new().unwrap();
    let mailer = Arc::new(AcceptingMailer {
        attempts: AtomicUsize::new(0),
    });
    let notifier = Notifier::with_mailer(enabled_email(), mailer.clone()).unwrap();
    let pipeline = Pipeline::with_notifier(exporter(&dir, ReportFormat::Csv), notifier);
    let query = Query::new("bakery", "Lyon", "France", 2).unwrap();

    let outcome = pipeline
        .run(&mut FakeCollector::with_results(2), RunRequest::new(query))
        .await
        .unwrap();

    assert_eq!(outcome.delivery, Delivery::NotRequested);
    assert_eq!(mailer.attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_collection_failure_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let exporter = exporter(&dir, ReportFormat::Csv);
    let pipeline = Pipeline::new(exporter.clone(), EmailSettings::default());
    let mut collector = FakeCollector::with_results(0);
    let query = Query::new("yeti outfitter", "Nowhere", "Atlantis", 10).unwrap();

    let err = pipeline
        .run(&mut collector, RunRequest::new(query.clone()))
        .await
        .unwrap_err();

    assert!(matches!(err, LeadError::Collection(_)));
    assert_eq!(err.stage(), Stage::Collecting);
    assert!(!exporter.report_path(&query).exists());
    assert!(collector.closed, "browser teardown must run on failure");
}
