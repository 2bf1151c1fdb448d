use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::Stage;

#[derive(Error, Debug)]
pub enum LeadError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("収集エラー: {0}")]
    Collection(String),

    #[error("出力エラー: {0}")]
    Export(String),

    /// 送信失敗でもレポートファイルは残る
    #[error("送信エラー: {message} (レポートは保存済み: {})", .report.display())]
    Delivery { report: PathBuf, message: String },
}

impl LeadError {
    /// エラーが中断させたパイプラインのステージ
    pub fn stage(&self) -> Stage {
        match self {
            LeadError::Config(_) => Stage::Start,
            LeadError::Collection(_) => Stage::Collecting,
            LeadError::Export(_) => Stage::Exporting,
            LeadError::Delivery { .. } => Stage::Sending,
        }
    }

    /// CLIの終了コード
    pub fn exit_code(&self) -> i32 {
        match self {
            LeadError::Config(_) => 2,
            LeadError::Collection(_) => 3,
            LeadError::Export(_) => 4,
            LeadError::Delivery { .. } => 5,
        }
    }
}

impl From<std::io::Error> for LeadError {
    fn from(e: std::io::Error) -> Self {
        LeadError::Export(e.to_string())
    }
}

impl From<csv::Error> for LeadError {
    fn from(e: csv::Error) -> Self {
        LeadError::Export(format!("CSV書き込み: {}", e))
    }
}

impl From<rust_xlsxwriter::XlsxError> for LeadError {
    fn from(e: rust_xlsxwriter::XlsxError) -> Self {
        LeadError::Export(format!("XLSX書き込み: {}", e))
    }
}

impl From<toml::de::Error> for LeadError {
    fn from(e: toml::de::Error) -> Self {
        LeadError::Config(format!("TOML解析: {}", e))
    }
}
