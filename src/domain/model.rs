use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// 排名報表中的一列（一個 miner 模型）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub uid: u32,
    pub model_name: String,
    /// 首次提交的區塊，<= 0 表示未知
    pub first_blk: i64,
    pub scores: BTreeMap<String, f64>,
    pub epsilon_thresholds: BTreeMap<String, f64>,
    pub sample_counts: BTreeMap<String, u64>,
    pub incomplete_problems: BTreeSet<String>,
    pub points: f64,
    pub weight: f64,
    pub eligible: String,
    pub line: String,
}

impl ModelRecord {
    pub fn new(uid: u32, model_name: impl Into<String>, first_blk: i64) -> Self {
        Self {
            uid,
            model_name: model_name.into(),
            first_blk,
            scores: BTreeMap::new(),
            epsilon_thresholds: BTreeMap::new(),
            sample_counts: BTreeMap::new(),
            incomplete_problems: BTreeSet::new(),
            points: 0.0,
            weight: 0.0,
            eligible: "N".to_string(),
            line: String::new(),
        }
    }

    /// 寫入單一環境的分數格
    pub fn with_cell(mut self, env: &str, cell: ScoreCell) -> Self {
        self.insert_cell(env, cell);
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn insert_cell(&mut self, env: &str, cell: ScoreCell) {
        self.scores.insert(env.to_string(), cell.score);
        self.epsilon_thresholds
            .insert(env.to_string(), cell.epsilon);
        self.sample_counts.insert(env.to_string(), cell.samples);
        if cell.incomplete {
            self.incomplete_problems.insert(env.to_string());
        }
    }

    pub fn is_active(&self) -> bool {
        self.weight > 0.0
    }

    pub fn has_data(&self) -> bool {
        self.sample_counts.values().any(|&n| n > 0)
    }
}

/// `<score>[<epsilon>]/<samples>[!]` 格式的分數格
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreCell {
    pub score: f64,
    pub epsilon: f64,
    pub samples: u64,
    pub incomplete: bool,
}

impl ScoreCell {
    pub fn new(score: f64, epsilon: f64, samples: u64) -> Self {
        Self {
            score,
            epsilon,
            samples,
            incomplete: false,
        }
    }

    pub fn incomplete(mut self) -> Self {
        self.incomplete = true;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedReport {
    pub models: Vec<ModelRecord>,
    pub environment_order: Vec<String>,
    pub current_block: Option<u64>,
}

/// 支配者描述，含計算當下的分數快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dominator {
    pub uid: u32,
    pub model_name: String,
    pub margins: BTreeMap<String, f64>,
    pub scores: BTreeMap<String, f64>,
    pub epsilon_thresholds: BTreeMap<String, f64>,
    pub sample_counts: BTreeMap<String, u64>,
    pub incomplete_problems: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DominanceResult {
    pub is_dominated: bool,
    pub dominators: Vec<Dominator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportOrigin {
    File,
    Command,
    Http,
    Cache,
    Inline,
}

/// 從來源取得的原始報表文字
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReport {
    pub text: String,
    pub origin: ReportOrigin,
    pub fetched_at: DateTime<Utc>,
}

impl RawReport {
    pub fn new(text: impl Into<String>, origin: ReportOrigin) -> Self {
        Self {
            text: text.into(),
            origin,
            fetched_at: Utc::now(),
        }
    }
}

/// 外部指令取得的輔助資訊
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub chute_id: Option<String>,
    pub model_full_name: Option<String>,
    pub hotkey: Option<String>,
    pub coldkey: Option<String>,
    pub model_size_gb: Option<f64>,
}

impl ModelMetadata {
    pub fn is_empty(&self) -> bool {
        self.chute_id.is_none()
            && self.model_full_name.is_none()
            && self.hotkey.is_none()
            && self.coldkey.is_none()
            && self.model_size_gb.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinerStatus {
    pub uid: u32,
    pub model_name: String,
    pub first_blk: i64,
    pub points: f64,
    pub weight: f64,
    pub eligible: String,
    pub is_active: bool,
    pub has_data: bool,
    pub is_dominated: bool,
    pub on_pareto_frontier: bool,
    pub dominators: Vec<Dominator>,
    pub dominated_by_count: usize,
    pub dominating_active_count: usize,
    pub dominating_non_active_count: usize,
    /// 此模型直接支配的 uid
    pub dominates: Vec<u32>,
    pub scores: BTreeMap<String, f64>,
    pub epsilon_thresholds: BTreeMap<String, f64>,
    pub sample_counts: BTreeMap<String, u64>,
    pub incomplete_problems: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ModelMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DominanceSnapshot {
    pub block: Option<u64>,
    pub generated_at: DateTime<Utc>,
    pub origin: ReportOrigin,
    pub environments: Vec<String>,
    pub miners: Vec<MinerStatus>,
    pub total_models: usize,
    pub pareto_frontier_count: usize,
    pub dominated_count: usize,
    pub warnings: Vec<String>,
}

impl DominanceSnapshot {
    pub fn miner(&self, uid: u32) -> Option<&MinerStatus> {
        self.miners.iter().find(|m| m.uid == uid)
    }

    pub fn dominators_of(&self, uid: u32) -> &[Dominator] {
        self.miner(uid)
            .map(|m| m.dominators.as_slice())
            .unwrap_or(&[])
    }
}
