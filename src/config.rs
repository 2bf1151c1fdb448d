//! 設定
//!
//! `config.toml` を読み込み、各ステージ用の設定値に解決する。
//! ファイルが無い場合はすべてデフォルト（メール送信は無効）。

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lettre::message::Mailbox;
use regex::{Captures, Regex};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::LeadError;
use crate::types::ReportFormat;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const DEFAULT_OUTPUT_DIR: &str = "data/leads";

/// ブラウザ収集の設定
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub headless: bool,
    pub debug: bool,
    /// ナビゲーション / CDPリクエストのタイムアウト
    pub timeout: Duration,
    pub max_scroll_attempts: u32,
    /// 件数が増えないスクロールがこの回数続いたら終了
    pub stall_limit: u32,
    pub extract_emails: bool,
    pub chrome_path: Option<PathBuf>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            headless: true,
            debug: false,
            timeout: Duration::from_secs(60),
            max_scroll_attempts: 18,
            stall_limit: 3,
            extract_emails: true,
            chrome_path: None,
        }
    }
}

impl CollectorConfig {
    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_extract_emails(mut self, extract_emails: bool) -> Self {
        self.extract_emails = extract_emails;
        self
    }

    pub fn with_chrome_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chrome_path = Some(path.into());
        self
    }
}

/// 出力の設定
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
    pub format: ReportFormat,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            format: ReportFormat::Xlsx,
        }
    }
}

impl ExportConfig {
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_format(mut self, format: ReportFormat) -> Self {
        self.format = format;
        self
    }
}

/// SMTP認証情報
#[derive(Clone)]
pub struct Credentials {
    pub sender: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("sender", &self.sender)
            .field("password", &"***")
            .finish()
    }
}

/// SMTP接続の暗号化方式。ポート番号で決まる
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpSecurity {
    /// 465: 接続直後からTLS
    ImplicitTls,
    /// 587: 平文で接続してSTARTTLSで昇格
    StartTls,
}

impl SmtpSecurity {
    pub fn for_port(port: u16) -> Result<Self, LeadError> {
        match port {
            465 => Ok(SmtpSecurity::ImplicitTls),
            587 => Ok(SmtpSecurity::StartTls),
            other => Err(LeadError::Config(format!(
                "email.smtp_port {} は未対応です (465 または 587)",
                other
            ))),
        }
    }
}

/// 解決済みのメール送信設定
#[derive(Debug, Clone)]
pub struct EmailSettings {
    pub enabled: bool,
    pub credentials: Option<Credentials>,
    pub recipients: BTreeSet<String>,
    pub subject: String,
    pub body: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub timeout: Duration,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            credentials: None,
            recipients: BTreeSet::new(),
            subject: "Lead Report".to_string(),
            body: "Lead report attached.".to_string(),
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 465,
            timeout: Duration::from_secs(30),
        }
    }
}

impl EmailSettings {
    pub fn with_extra_recipients<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recipients.extend(
            extra
                .into_iter()
                .map(Into::into)
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty()),
        );
        self
    }

    /// 送信前の検証。ネットワークには触れない
    pub fn validate(&self) -> Result<(), LeadError> {
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            LeadError::Config("email.sender / email.app_password が設定されていません".into())
        })?;

        if self.recipients.is_empty() {
            return Err(LeadError::Config(
                "email.recipients が設定されていません".into(),
            ));
        }

        credentials.sender.parse::<Mailbox>().map_err(|e| {
            LeadError::Config(format!("送信元アドレスが不正: {}: {}", credentials.sender, e))
        })?;

        for recipient in &self.recipients {
            recipient.parse::<Mailbox>().map_err(|e| {
                LeadError::Config(format!("宛先アドレスが不正: {}: {}", recipient, e))
            })?;
        }

        if self.smtp_host.trim().is_empty() {
            return Err(LeadError::Config("email.smtp_host が空です".into()));
        }

        self.security()?;

        Ok(())
    }

    pub fn security(&self) -> Result<SmtpSecurity, LeadError> {
        SmtpSecurity::for_port(self.smtp_port)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EmailSection {
    enable: bool,
    sender: Option<String>,
    app_password: Option<String>,
    recipients: Vec<String>,
    subject: Option<String>,
    body: Option<String>,
    smtp_host: Option<String>,
    smtp_port: Option<u16>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CollectorSection {
    headless: Option<bool>,
    debug: Option<bool>,
    timeout_secs: Option<u64>,
    max_scroll_attempts: Option<u32>,
    stall_limit: Option<u32>,
    extract_emails: Option<bool>,
    chrome_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExportSection {
    output_dir: Option<PathBuf>,
    format: Option<ReportFormat>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    email: EmailSection,
    collector: CollectorSection,
    export: ExportSection,
}

/// アプリケーション設定
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub collector: CollectorConfig,
    pub export: ExportConfig,
    pub email: EmailSettings,
}

impl AppConfig {
    /// 設定ファイルを読み込む。ファイルが無ければデフォルト
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LeadError> {
        let path = path.as_ref();
        if !path.exists() {
            info!("Config file {:?} not found, using defaults (email disabled)", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| LeadError::Config(format!("{:?} の読み込み失敗: {}", path, e)))?;
        debug!("Loaded config from {:?}", path);
        Self::from_toml_str(&content)
    }

    /// TOML文字列から解析（`${VAR}` は環境変数で置換）
    pub fn from_toml_str(content: &str) -> Result<Self, LeadError> {
        let content = substitute_env_vars(content)?;
        let file: ConfigFile = toml::from_str(&content)?;
        Ok(file.into())
    }
}

impl From<ConfigFile> for AppConfig {
    fn from(file: ConfigFile) -> Self {
        let collector_defaults = CollectorConfig::default();
        let c = file.collector;
        let collector = CollectorConfig {
            headless: c.headless.unwrap_or(collector_defaults.headless),
            debug: c.debug.unwrap_or(collector_defaults.debug),
            timeout: c
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(collector_defaults.timeout),
            max_scroll_attempts: c
                .max_scroll_attempts
                .unwrap_or(collector_defaults.max_scroll_attempts),
            stall_limit: c.stall_limit.unwrap_or(collector_defaults.stall_limit),
            extract_emails: c
                .extract_emails
                .unwrap_or(collector_defaults.extract_emails),
            chrome_path: c.chrome_path,
        };

        let export_defaults = ExportConfig::default();
        let export = ExportConfig {
            output_dir: file.export.output_dir.unwrap_or(export_defaults.output_dir),
            format: file.export.format.unwrap_or(export_defaults.format),
        };

        let email_defaults = EmailSettings::default();
        let e = file.email;
        let credentials = match (non_blank(e.sender), non_blank(e.app_password)) {
            (Some(sender), Some(password)) => Some(Credentials { sender, password }),
            _ => None,
        };
        let email = EmailSettings {
            enabled: e.enable,
            credentials,
            recipients: BTreeSet::new(),
            subject: e.subject.unwrap_or(email_defaults.subject),
            body: e.body.unwrap_or(email_defaults.body),
            smtp_host: e.smtp_host.unwrap_or(email_defaults.smtp_host),
            smtp_port: e.smtp_port.unwrap_or(email_defaults.smtp_port),
            timeout: e
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(email_defaults.timeout),
        }
        .with_extra_recipients(e.recipients);

        Self {
            collector,
            export,
            email,
        }
    }
}

/// 未置換の `${VAR}` が残った値は未設定とみなす
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.starts_with("${"))
}

/// `${VAR_NAME}` を環境変数で置換する。未定義の変数はそのまま残す
fn substitute_env_vars(content: &str) -> Result<String, LeadError> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
        .map_err(|e| LeadError::Config(e.to_string()))?;

    let result = re.replace_all(content, |caps: &Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
    });

    Ok(result.into_owned())
}
