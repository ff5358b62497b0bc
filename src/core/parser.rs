//! 排名報表解析器。
//!
//! 先從標頭列建立不可變的欄位索引（[`ColumnMap`]），再逐列解碼成
//! [`ModelRecord`]。任何格式錯誤都只會略過該列或該環境，不會中斷整份報表。

use crate::domain::model::{ModelRecord, ParsedReport, ScoreCell};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

const DEFAULT_UID_COLUMN: usize = 1;
const DEFAULT_MODEL_COLUMN: usize = 2;
const DEFAULT_FIRST_BLK_COLUMN: usize = 3;
const DEFAULT_SCORE_START: usize = 4;
const MIN_ROW_CELLS: usize = 6;
const SKIPPED_PREFIXES: [&str; 4] = ["=", "Statistics:", "Total", "Active"];
const DEFAULT_ELIGIBLE: &str = "N";

static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)MINER RANKING TABLE\s*-\s*Block\s+(\d+)").expect("valid block pattern")
});

static SCORE_CELL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(-?\d*\.?\d+)\[(-?\d*\.?\d+)\]/(\d+)(!)?$").expect("valid score cell pattern")
});

static DIGITS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+$").expect("valid digits pattern"));

static TRAILING_COLUMN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[Ll]\d+$").expect("valid trailing column pattern"));

/// 分數欄位的位置
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreColumns {
    /// 標頭中的 (欄位索引, 環境名稱)
    Named(Vec<(usize, String)>),
    /// 沒有標頭時，自固定位置延伸到每列結尾
    Positional { start: usize },
}

/// 由標頭推導出的欄位索引
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMap {
    pub uid: usize,
    pub model: usize,
    pub first_blk: usize,
    pub total: Option<usize>,
    pub weight: Option<usize>,
    pub eligible: Option<usize>,
    pub scores: ScoreColumns,
}

impl ColumnMap {
    pub fn positional() -> Self {
        Self {
            uid: DEFAULT_UID_COLUMN,
            model: DEFAULT_MODEL_COLUMN,
            first_blk: DEFAULT_FIRST_BLK_COLUMN,
            total: None,
            weight: None,
            eligible: None,
            scores: ScoreColumns::Positional {
                start: DEFAULT_SCORE_START,
            },
        }
    }

    pub fn from_header(line: &str) -> Self {
        let headers = split_cells(line);
        let lower: Vec<String> = headers.iter().map(|h| h.to_lowercase()).collect();

        let find_exact = |name: &str| lower.iter().position(|h| h == name);
        let find_containing = |needle: &str| lower.iter().position(|h| h.contains(needle));

        let first_blk = find_containing("firstblk");
        let total = find_exact("total").or_else(|| find_containing("total"));
        let start = first_blk.map(|i| i + 1).unwrap_or(DEFAULT_SCORE_START);
        let trailing = headers
            .iter()
            .position(|h| TRAILING_COLUMN_RE.is_match(h))
            .filter(|&i| i >= start);
        let end = trailing
            .or(total.filter(|&i| i >= start))
            .unwrap_or(headers.len());

        let mut seen = HashSet::new();
        let environments = (start..end)
            .filter_map(|i| {
                let name = headers.get(i)?;
                if name.is_empty() || !seen.insert(*name) {
                    return None;
                }
                Some((i, name.to_string()))
            })
            .collect();

        Self {
            uid: find_exact("uid").unwrap_or(DEFAULT_UID_COLUMN),
            model: find_exact("model")
                .or_else(|| find_containing("model"))
                .unwrap_or(DEFAULT_MODEL_COLUMN),
            first_blk: first_blk.unwrap_or(DEFAULT_FIRST_BLK_COLUMN),
            total,
            weight: find_exact("weight").or_else(|| find_containing("weight")),
            eligible: find_exact("v"),
            scores: ScoreColumns::Named(environments),
        }
    }

    pub fn environment_names(&self) -> Vec<String> {
        match &self.scores {
            ScoreColumns::Named(columns) => columns.iter().map(|(_, name)| name.clone()).collect(),
            ScoreColumns::Positional { .. } => Vec::new(),
        }
    }
}

/// 解析整份報表文字，永不失敗
pub fn parse(report_text: &str) -> ParsedReport {
    let lines: Vec<&str> = report_text.lines().collect();

    let header = lines.iter().copied().find(|line| is_header_line(line));
    let current_block = lines
        .iter()
        .find_map(|line| BLOCK_RE.captures(line))
        .and_then(|caps| caps[1].parse::<u64>().ok());

    let columns = match header {
        Some(line) => ColumnMap::from_header(line),
        None => {
            tracing::debug!("No header line found, falling back to positional columns");
            ColumnMap::positional()
        }
    };

    let mut models = Vec::new();
    let mut seen_uids = HashSet::new();
    // 無標頭時依首次出現的順序記錄欄位
    let mut positional_columns = Vec::new();
    let mut seen_columns = HashSet::new();
    let mut skipped = 0usize;

    for line in &lines {
        if !is_data_candidate(line) {
            continue;
        }

        let Some((record, positions)) = decode_row(line, &columns) else {
            skipped += 1;
            continue;
        };

        if !seen_uids.insert(record.uid) {
            tracing::debug!("Duplicate uid {} ignored", record.uid);
            skipped += 1;
            continue;
        }

        positional_columns.extend(positions.into_iter().filter(|i| seen_columns.insert(*i)));
        models.push(record);
    }

    let environment_order = match &columns.scores {
        ScoreColumns::Named(_) => columns.environment_names(),
        ScoreColumns::Positional { .. } => positional_columns
            .into_iter()
            .map(positional_env_name)
            .collect(),
    };

    tracing::debug!(
        "Parsed {} models across {} environments ({} rows skipped, block {:?})",
        models.len(),
        environment_order.len(),
        skipped,
        current_block
    );

    ParsedReport {
        models,
        environment_order,
        current_block,
    }
}

/// 解析 `<score>[<epsilon>]/<samples>` 分數格，可選結尾 `!`
pub fn parse_score_cell(cell: &str) -> Option<ScoreCell> {
    let caps = SCORE_CELL_RE.captures(cell.trim())?;
    let score = parse_number(&caps[1])?;
    let epsilon = parse_number(&caps[2])?;
    let samples = caps[3].parse::<u64>().ok()?;

    Some(ScoreCell {
        score,
        epsilon,
        samples,
        incomplete: caps.get(4).is_some(),
    })
}

fn is_header_line(line: &str) -> bool {
    line.contains('|') && line.trim().starts_with("Hotkey")
}

fn is_data_candidate(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() || !trimmed.contains('|') || is_header_line(trimmed) {
        return false;
    }
    !SKIPPED_PREFIXES
        .iter()
        .any(|prefix| trimmed.starts_with(prefix))
}

fn decode_row(line: &str, columns: &ColumnMap) -> Option<(ModelRecord, Vec<usize>)> {
    let cells = split_cells(line);
    if cells.len() < MIN_ROW_CELLS {
        return None;
    }

    let uid = cells.get(columns.uid)?.parse::<u32>().ok()?;
    let model_name = cells.get(columns.model).copied().unwrap_or_default();
    let first_blk = cells
        .get(columns.first_blk)
        .filter(|cell| DIGITS_RE.is_match(cell))
        .and_then(|cell| cell.parse::<i64>().ok())
        .unwrap_or(0);

    let mut record = ModelRecord::new(uid, model_name, first_blk);
    let mut positions = Vec::new();

    match &columns.scores {
        ScoreColumns::Named(environments) => {
            for (index, env) in environments {
                if let Some(cell) = cells.get(*index).and_then(|c| parse_score_cell(c)) {
                    record.insert_cell(env, cell);
                }
            }
        }
        ScoreColumns::Positional { start } => {
            for (index, raw) in cells.iter().enumerate().skip(*start) {
                if let Some(cell) = parse_score_cell(raw) {
                    record.insert_cell(&positional_env_name(index), cell);
                    positions.push(index);
                }
            }
        }
    }

    if record.scores.is_empty() {
        return None;
    }

    record.points = optional_number(&cells, columns.total).unwrap_or(0.0);
    record.weight = optional_number(&cells, columns.weight).unwrap_or(0.0);
    record.eligible = columns
        .eligible
        .and_then(|i| cells.get(i))
        .filter(|cell| !cell.is_empty())
        .map(|cell| cell.to_string())
        .unwrap_or_else(|| DEFAULT_ELIGIBLE.to_string());
    record.line = line.to_string();

    Some((record, positions))
}

fn split_cells(line: &str) -> Vec<&str> {
    line.split('|').map(str::trim).collect()
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn optional_number(cells: &[&str], column: Option<usize>) -> Option<f64> {
    column.and_then(|i| cells.get(i)).and_then(|cell| parse_number(cell))
}

fn positional_env_name(index: usize) -> String {
    format!("col{}", index)
}
