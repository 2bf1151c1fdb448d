//! リード関連の型定義

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::LeadError;

/// 検索条件 (1回の実行につき1つ)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    niche: String,
    city: String,
    country: String,
    row_limit: usize,
}

impl Query {
    /// 検証付きコンストラクタ
    ///
    /// `row_limit` が0以下、または niche/city/country が空の場合は `LeadError::Config`
    pub fn new(
        niche: impl Into<String>,
        city: impl Into<String>,
        country: impl Into<String>,
        row_limit: i64,
    ) -> Result<Self, LeadError> {
        let niche = niche.into().trim().to_string();
        let city = city.into().trim().to_string();
        let country = country.into().trim().to_string();

        for (field, value) in [("niche", &niche), ("city", &city), ("country", &country)] {
            if value.is_empty() {
                return Err(LeadError::Config(format!("{} が空です", field)));
            }
        }

        if row_limit <= 0 {
            return Err(LeadError::Config(format!(
                "rows は1以上を指定してください: {}",
                row_limit
            )));
        }

        let row_limit = usize::try_from(row_limit)
            .map_err(|_| LeadError::Config(format!("rows が大きすぎます: {}", row_limit)))?;

        Ok(Self {
            niche,
            city,
            country,
            row_limit,
        })
    }

    pub fn niche(&self) -> &str {
        &self.niche
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn country(&self) -> &str {
        &self.country
    }

    pub fn row_limit(&self) -> usize {
        self.row_limit
    }

    /// 検索ボックスに入力するテキスト
    pub fn search_text(&self) -> String {
        format!("{} in {}, {}", self.niche, self.city, self.country)
    }
}

/// 抽出した1件のリード
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadRecord {
    pub name: String,
    pub category: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub email: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<u64>,
}

impl LeadRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// 発見順のリード一覧。上限を超える追加は拒否する
#[derive(Debug, Clone, PartialEq)]
pub struct LeadSet {
    limit: usize,
    records: Vec<LeadRecord>,
}

impl LeadSet {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            records: Vec::new(),
        }
    }

    pub fn for_query(query: &Query) -> Self {
        Self::new(query.row_limit())
    }

    /// 追加できた場合は true
    pub fn push(&mut self, record: LeadRecord) -> bool {
        if self.is_full() {
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.limit
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[LeadRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LeadRecord> {
        self.records.iter()
    }
}

impl Extend<LeadRecord> for LeadSet {
    fn extend<T: IntoIterator<Item = LeadRecord>>(&mut self, iter: T) {
        for record in iter {
            if !self.push(record) {
                break;
            }
        }
    }
}

/// 出力形式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Xlsx,
    Csv,
}

impl ReportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Xlsx => "xlsx",
            ReportFormat::Csv => "csv",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ReportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ReportFormat::Csv => "text/csv",
        }
    }
}

impl std::str::FromStr for ReportFormat {
    type Err = LeadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xlsx" => Ok(ReportFormat::Xlsx),
            "csv" => Ok(ReportFormat::Csv),
            other => Err(LeadError::Config(format!(
                "未対応の出力形式: {} (xlsx / csv)",
                other
            ))),
        }
    }
}

/// 書き込み済みのレポートファイル。作成後は変更しない
#[derive(Debug, Clone, PartialEq)]
pub struct ReportFile {
    path: PathBuf,
    format: ReportFormat,
    rows: usize,
}

impl ReportFile {
    pub(crate) fn new(path: PathBuf, format: ReportFormat, rows: usize) -> Self {
        Self { path, format, rows }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> ReportFormat {
        self.format
    }

    /// ヘッダーを除くデータ行数
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("leads.{}", self.format.extension()))
    }
}

/// 送信するメール (本文 + 添付レポート)
#[derive(Debug, Clone)]
pub struct EmailJob {
    pub recipients: BTreeSet<String>,
    pub subject: String,
    pub body: String,
    pub attachment: ReportFile,
}
