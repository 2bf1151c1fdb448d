//! レポートのメール送信

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials as SmtpCredentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use crate::config::{Credentials, EmailSettings, SmtpSecurity};
use crate::error::LeadError;
use crate::traits::Mailer;
use crate::types::{EmailJob, Query, ReportFile};

/// lettre による SMTP 送信（465は暗黙TLS、587はSTARTTLS）
pub struct SmtpMailer {
    host: String,
    port: u16,
    security: SmtpSecurity,
    credentials: Credentials,
    timeout: std::time::Duration,
}

impl SmtpMailer {
    pub fn new(settings: &EmailSettings) -> Result<Self, LeadError> {
        let credentials = settings
            .credentials
            .clone()
            .ok_or_else(|| LeadError::Config("SMTP認証情報がありません".into()))?;

        Ok(Self {
            host: settings.smtp_host.clone(),
            port: settings.smtp_port,
            security: settings.security()?,
            credentials,
            timeout: settings.timeout,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn deliver(&self, job: &EmailJob) -> Result<(), LeadError> {
        let report = job.attachment.path().to_path_buf();
        let delivery_error = |message: String| LeadError::Delivery {
            report: report.clone(),
            message,
        };

        let message = build_message(&self.credentials.sender, job)?;

        let creds = SmtpCredentials::new(
            self.credentials.sender.clone(),
            self.credentials.password.clone(),
        );
        let relay = match self.security {
            SmtpSecurity::ImplicitTls => AsyncSmtpTransport::<Tokio1Executor>::relay(&self.host),
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)
            }
        };
        let transport = relay
            .map_err(|e| delivery_error(format!("SMTPリレー設定: {}", e)))?
            .port(self.port)
            .credentials(creds)
            .timeout(Some(self.timeout))
            .build();

        transport
            .send(message)
            .await
            .map_err(|e| delivery_error(format!("SMTP送信失敗: {}", e)))?;

        Ok(())
    }
}

/// 添付付きのメッセージを組み立てる
pub fn build_message(sender: &str, job: &EmailJob) -> Result<Message, LeadError> {
    let from: Mailbox = sender
        .parse()
        .map_err(|e| LeadError::Config(format!("送信元アドレスが不正: {}", e)))?;

    let mut builder = Message::builder().from(from).subject(job.subject.clone());
    for recipient in &job.recipients {
        let to: Mailbox = recipient
            .parse()
            .map_err(|e| LeadError::Config(format!("宛先アドレスが不正 {}: {}", recipient, e)))?;
        builder = builder.to(to);
    }

    let report = job.attachment.path();
    let content = std::fs::read(report).map_err(|e| LeadError::Delivery {
        report: report.to_path_buf(),
        message: format!("添付ファイルの読み込み失敗: {}", e),
    })?;
    let content_type = ContentType::parse(job.attachment.format().mime_type())
        .map_err(|e| LeadError::Config(format!("MIMEタイプ: {}", e)))?;

    let attachment = Attachment::new(job.attachment.file_name()).body(content, content_type);

    builder
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(job.body.clone()))
                .singlepart(attachment),
        )
        .map_err(|e| LeadError::Delivery {
            report: report.to_path_buf(),
            message: format!("メッセージ作成失敗: {}", e),
        })
}

/// 送信ステージ
pub struct Notifier {
    settings: EmailSettings,
    mailer: Arc<dyn Mailer>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Notifier {
    /// 設定を検証して SMTP 送信の Notifier を作る。ネットワークには触れない
    pub fn new(settings: EmailSettings) -> Result<Self, LeadError> {
        settings.validate()?;
        let mailer = SmtpMailer::new(&settings)?;
        Ok(Self {
            settings,
            mailer: Arc::new(mailer),
        })
    }

    /// 任意の Mailer を使う（テスト用のフェイクなど）
    pub fn with_mailer(settings: EmailSettings, mailer: Arc<dyn Mailer>) -> Result<Self, LeadError> {
        settings.validate()?;
        Ok(Self { settings, mailer })
    }

    pub fn settings(&self) -> &EmailSettings {
        &self.settings
    }

    /// 送信ジョブを作成
    pub fn build_job(&self, query: &Query, report: ReportFile) -> EmailJob {
        let body = format!(
            "{}\n\n{} leads for \"{}\" ({}).\nGenerated at {}.",
            self.settings.body,
            report.rows(),
            query.search_text(),
            report.file_name(),
            Local::now().format("%Y-%m-%d %H:%M:%S %Z"),
        );

        EmailJob {
            recipients: self.settings.recipients.clone(),
            subject: self.settings.subject.clone(),
            body,
            attachment: report,
        }
    }

    /// 1回だけ送信する（リトライなし）
    pub async fn send(&self, job: EmailJob) -> Result<(), LeadError> {
        info!(
            "Sending {} to {} recipient(s)",
            job.attachment.file_name(),
            job.recipients.len()
        );
        self.mailer.deliver(&job).await?;
        info!("Sent {} to: {:?}", job.attachment.file_name(), job.recipients);
        Ok(())
    }
}
