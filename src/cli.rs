use std::path::PathBuf;

use clap::Parser;

use crate::config::{AppConfig, DEFAULT_CONFIG_PATH};
use crate::error::LeadError;
use crate::pipeline::RunRequest;
use crate::types::{Query, ReportFormat};

#[derive(Debug, Clone, Parser)]
#[command(name = "lead-scraper")]
#[command(about = "Scrape business leads from Google Maps into a spreadsheet and optionally email it")]
pub struct Cli {
    #[arg(long, help = "Business niche to search for, e.g. \"roofing contractor\"")]
    pub niche: String,

    #[arg(long)]
    pub city: String,

    #[arg(long)]
    pub country: String,

    /// 負の値も受け付けて検証で弾く
    #[arg(long, allow_negative_numbers = true, help = "Maximum number of leads to collect")]
    pub rows: i64,

    #[arg(long, help = "Email the report using the [email] section of the config")]
    pub email: bool,

    #[arg(long = "recipient", help = "Additional recipient (repeatable)")]
    pub recipients: Vec<String>,

    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    #[arg(long, help = "Output format: xlsx or csv (overrides config)")]
    pub format: Option<String>,

    #[arg(long, help = "Output directory (overrides config)")]
    pub output_dir: Option<PathBuf>,

    #[arg(long, help = "Show the browser window")]
    pub headed: bool,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,
}

impl Cli {
    /// 検証済みの実行リクエスト
    pub fn run_request(&self) -> Result<RunRequest, LeadError> {
        let query = Query::new(&self.niche, &self.city, &self.country, self.rows)?;
        Ok(RunRequest::new(query).with_email(self.email))
    }

    /// CLIフラグで設定を上書きする
    pub fn apply_overrides(&self, mut config: AppConfig) -> Result<AppConfig, LeadError> {
        if let Some(format) = &self.format {
            config.export.format = format.parse::<ReportFormat>()?;
        }
        if let Some(dir) = &self.output_dir {
            config.export.output_dir = dir.clone();
        }
        if self.headed {
            config.collector.headless = false;
        }
        config.email = config.email.with_extra_recipients(self.recipients.clone());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("lead-scraper").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_parse_documented_usage() {
        let cli = parse(&[
            "--niche",
            "roofing contractor",
            "--city",
            "Dallas",
            "--country",
            "USA",
            "--rows",
            "60",
            "--email",
        ]);
        assert_eq!(cli.niche, "roofing contractor");
        assert_eq!(cli.rows, 60);
        assert!(cli.email);
        assert_eq!(cli.config, PathBuf::from("config.toml"));

        let request = cli.run_request().unwrap();
        assert!(request.send_email);
        assert_eq!(request.query.row_limit(), 60);
    }

    #[test]
    fn test_required_arguments() {
        let result = Cli::try_parse_from(["lead-scraper", "--niche", "x", "--city", "y"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_negative_rows_reach_validation() {
        let cli = parse(&[
            "--niche", "dentist", "--city", "Kobe", "--country", "Japan", "--rows", "-5",
        ]);
        assert_eq!(cli.rows, -5);
        assert!(matches!(cli.run_request(), Err(LeadError::Config(_))));
    }

    #[test]
    fn test_overrides() {
        let cli = parse(&[
            "--niche",
            "dentist",
            "--city",
            "Kobe",
            "--country",
            "Japan",
            "--rows",
            "5",
            "--format",
            "csv",
            "--output-dir",
            "/tmp/leads",
            "--headed",
            "--recipient",
            "a@example.org",
            "--recipient",
            "b@example.org",
        ]);
        let config = cli.apply_overrides(AppConfig::default()).unwrap();
        assert_eq!(config.export.format, ReportFormat::Csv);
        assert_eq!(config.export.output_dir, PathBuf::from("/tmp/leads"));
        assert!(!config.collector.headless);
        assert_eq!(config.email.recipients.len(), 2);
    }

    #[test]
    fn test_bad_format_is_config_error() {
        let cli = parse(&[
            "--niche", "dentist", "--city", "Kobe", "--country", "Japan", "--rows", "5",
            "--format", "pdf",
        ]);
        assert!(matches!(
            cli.apply_overrides(AppConfig::default()),
            Err(LeadError::Config(_))
        ));
    }
}
