//! レポート出力
//!
//! `{output_dir}/{niche}_{city}_{country}.{ext}` に1回だけ書き込む。
//! 既存ファイルは上書きする。

use std::fs::File;
use std::path::{Path, PathBuf};

use rust_xlsxwriter::{DocProperties, ExcelDateTime, Format, Workbook};
use tracing::{debug, info, warn};

use crate::config::ExportConfig;
use crate::error::LeadError;
use crate::types::{LeadRecord, LeadSet, Query, ReportFile, ReportFormat};

/// 列順は固定
pub const COLUMNS: [&str; 11] = [
    "Business Name",
    "Category",
    "Address",
    "Phone",
    "Website",
    "Email",
    "Rating",
    "Review Count",
    "City",
    "Country",
    "Niche",
];

const SHEET_NAME: &str = "Leads";

enum Cell<'a> {
    Text(&'a str),
    Float(f64),
    Integer(u64),
    Empty,
}

impl<'a> Cell<'a> {
    fn from_opt(value: Option<&'a str>) -> Self {
        value.map(Cell::Text).unwrap_or(Cell::Empty)
    }

    fn to_csv_field(&self) -> String {
        match self {
            Cell::Text(s) => s.to_string(),
            Cell::Float(v) => v.to_string(),
            Cell::Integer(v) => v.to_string(),
            Cell::Empty => String::new(),
        }
    }
}

fn row_cells<'a>(record: &'a LeadRecord, query: &'a Query) -> [Cell<'a>; 11] {
    [
        Cell::Text(&record.name),
        Cell::from_opt(record.category.as_deref()),
        Cell::from_opt(record.address.as_deref()),
        Cell::from_opt(record.phone.as_deref()),
        Cell::from_opt(record.website.as_deref()),
        Cell::from_opt(record.email.as_deref()),
        record.rating.map(Cell::Float).unwrap_or(Cell::Empty),
        record.review_count.map(Cell::Integer).unwrap_or(Cell::Empty),
        Cell::Text(query.city()),
        Cell::Text(query.country()),
        Cell::Text(query.niche()),
    ]
}

/// ファイル名に使えない文字を `_` に置換し、連続する `_` をまとめる
pub fn sanitize_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        let unsafe_char = c.is_whitespace()
            || c.is_control()
            || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|');
        if unsafe_char {
            if !out.ends_with('_') {
                out.push('_');
            }
        } else {
            out.push(c);
        }
    }

    let trimmed = out.trim_matches(|c| c == '_' || c == '.');
    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

/// 出力先パスを決定（同じQueryなら常に同じパス）
pub fn report_path(output_dir: &Path, query: &Query, format: ReportFormat) -> PathBuf {
    let file_name = format!(
        "{}_{}_{}.{}",
        sanitize_component(query.niche()),
        sanitize_component(query.city()),
        sanitize_component(query.country()),
        format.extension()
    );
    output_dir.join(file_name)
}

#[derive(Debug, Clone, Default)]
pub struct Exporter {
    config: ExportConfig,
}

impl Exporter {
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    pub fn report_path(&self, query: &Query) -> PathBuf {
        report_path(&self.config.output_dir, query, self.config.format)
    }

    /// LeadSet をファイルに書き出す
    pub fn export(&self, query: &Query, leads: LeadSet) -> Result<ReportFile, LeadError> {
        let path = self.report_path(query);

        std::fs::create_dir_all(&self.config.output_dir).map_err(|e| {
            LeadError::Export(format!(
                "ディレクトリ作成失敗 {:?}: {}",
                self.config.output_dir, e
            ))
        })?;

        if leads.is_empty() {
            warn!("No leads to export, writing header only");
        }

        // 書き込む行数は常に row_limit 以下
        if leads.limit() > query.row_limit() {
            warn!(
                "LeadSet limit {} exceeds row limit {}, truncating",
                leads.limit(),
                query.row_limit()
            );
        }
        let rows = leads.len().min(query.row_limit());
        let records = &leads.records()[..rows];

        match self.config.format {
            ReportFormat::Xlsx => write_xlsx(&path, query, records)?,
            ReportFormat::Csv => write_csv(&path, query, records)?,
        }

        info!("Saved {} leads -> {:?}", rows, path);
        Ok(ReportFile::new(path, self.config.format, rows))
    }
}

fn write_xlsx(path: &Path, query: &Query, records: &[LeadRecord]) -> Result<(), LeadError> {
    let mut workbook = Workbook::new();

    // 作成日時を固定して、同じ入力から同じバイト列を得る
    let created = ExcelDateTime::from_ymd(2000, 1, 1)?;
    let properties = DocProperties::new()
        .set_title("Lead Report")
        .set_creation_datetime(&created);
    workbook.set_properties(&properties);

    let header = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    for (col, title) in COLUMNS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, &header)?;
    }

    for (i, record) in records.iter().enumerate() {
        let row = (i + 1) as u32;
        for (col, cell) in row_cells(record, query).iter().enumerate() {
            let col = col as u16;
            match cell {
                Cell::Text(s) => {
                    sheet.write_string(row, col, *s)?;
                }
                Cell::Float(v) => {
                    sheet.write_number(row, col, *v)?;
                }
                Cell::Integer(v) => {
                    sheet.write_number(row, col, *v as f64)?;
                }
                Cell::Empty => {}
            }
        }
    }

    workbook.save(path)?;
    debug!("XLSX written: {:?}", path);
    Ok(())
}

fn write_csv(path: &Path, query: &Query, records: &[LeadRecord]) -> Result<(), LeadError> {
    let file = File::create(path)
        .map_err(|e| LeadError::Export(format!("ファイル作成失敗 {:?}: {}", path, e)))?;
    let mut writer = csv::Writer::from_writer(file);

    writer.write_record(COLUMNS)?;
    for record in records {
        let fields: Vec<String> = row_cells(record, query)
            .iter()
            .map(Cell::to_csv_field)
            .collect();
        writer.write_record(&fields)?;
    }

    writer.flush()?;
    debug!("CSV written: {:?}", path);
    Ok(())
}
