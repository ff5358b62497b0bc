use crate::core::dominance::{compute_dominance, derive_environments};
use crate::core::parser::parse;
use crate::core::summary::build_snapshot;
use crate::core::{ConfigProvider, MetadataProvider, Pipeline, ReportSource, Storage};
use crate::domain::model::{DominanceSnapshot, MinerStatus, RawReport};
use crate::utils::error::{DominanceError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use zip::write::{FileOptions, ZipWriter};

pub const JSON_OUTPUT: &str = "dominance.json";
pub const CSV_OUTPUT: &str = "dominance.csv";

/// 報表來源 → 支配關係快照 → 輸出檔案
pub struct ReportPipeline<S: Storage, C: ConfigProvider> {
    storage: S,
    config: C,
    source: Box<dyn ReportSource>,
    metadata: Option<Box<dyn MetadataProvider>>,
}

impl<S: Storage, C: ConfigProvider> ReportPipeline<S, C> {
    pub fn new(storage: S, config: C, source: Box<dyn ReportSource>) -> Self {
        Self {
            storage,
            config,
            source,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, provider: Box<dyn MetadataProvider>) -> Self {
        self.metadata = Some(provider);
        self
    }

    fn render_json(snapshot: &DominanceSnapshot) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(snapshot)?)
    }

    fn render_csv(snapshot: &DominanceSnapshot) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for miner in &snapshot.miners {
            writer.serialize(CsvRow::from_status(miner, &snapshot.environments))?;
        }
        writer
            .into_inner()
            .map_err(|e| DominanceError::processing(e.to_string()))
    }

    /// 依設定的格式產生 (檔名, 內容)
    fn render_outputs(&self, snapshot: &DominanceSnapshot) -> Result<Vec<(&'static str, Vec<u8>)>> {
        let mut outputs = Vec::new();
        for format in self.config.output_formats() {
            match format.as_str() {
                "json" => outputs.push((JSON_OUTPUT, Self::render_json(snapshot)?)),
                "csv" => outputs.push((CSV_OUTPUT, Self::render_csv(snapshot)?)),
                other => tracing::warn!("⚠️ Skipping unsupported output format: {}", other),
            }
        }
        Ok(outputs)
    }
}

/// CSV 每列一個模型，分數以 `env=score;...` 表示
#[derive(Debug, Serialize)]
struct CsvRow {
    uid: u32,
    model_name: String,
    first_blk: i64,
    weight: f64,
    points: f64,
    is_active: bool,
    has_data: bool,
    is_dominated: bool,
    on_pareto_frontier: bool,
    dominated_by_count: usize,
    dominating_active_count: usize,
    dominating_non_active_count: usize,
    dominators: String,
    dominates: String,
    scores: String,
}

impl CsvRow {
    fn from_status(miner: &MinerStatus, environments: &[String]) -> Self {
        let join_uids = |uids: Vec<u32>| {
            uids.iter()
                .map(|uid| uid.to_string())
                .collect::<Vec<_>>()
                .join(";")
        };
        let scores = environments
            .iter()
            .filter_map(|env| {
                miner
                    .scores
                    .get(env)
                    .map(|score| format!("{}={}", env, score))
            })
            .collect::<Vec<_>>()
            .join(";");

        Self {
            uid: miner.uid,
            model_name: miner.model_name.clone(),
            first_blk: miner.first_blk,
            weight: miner.weight,
            points: miner.points,
            is_active: miner.is_active,
            has_data: miner.has_data,
            is_dominated: miner.is_dominated,
            on_pareto_frontier: miner.on_pareto_frontier,
            dominated_by_count: miner.dominated_by_count,
            dominating_active_count: miner.dominating_active_count,
            dominating_non_active_count: miner.dominating_non_active_count,
            dominators: join_uids(miner.dominators.iter().map(|d| d.uid).collect()),
            dominates: join_uids(miner.dominates.clone()),
            scores,
        }
    }
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider> Pipeline for ReportPipeline<S, C> {
    async fn extract(&self) -> Result<RawReport> {
        tracing::debug!("Fetching report from {}", self.source.describe());
        let report = self.source.fetch().await?;
        tracing::debug!(
            "Fetched {} bytes ({:?})",
            report.text.len(),
            report.origin
        );
        Ok(report)
    }

    async fn transform(&self, report: RawReport) -> Result<DominanceSnapshot> {
        let parsed = parse(&report.text);
        let mut warnings = Vec::new();

        if parsed.models.is_empty() {
            tracing::warn!("⚠️ Report contained no model rows");
            warnings.push("report contained no model rows".to_string());
        }

        // 設定覆寫 > 報表標頭 > 第一個有分數的模型
        let environments = if !self.config.environments().is_empty() {
            self.config.environments().to_vec()
        } else if !parsed.environment_order.is_empty() {
            parsed.environment_order.clone()
        } else {
            derive_environments(&parsed.models)
        };

        let dominance = compute_dominance(&parsed.models, Some(environments.as_slice()));

        let metadata = match &self.metadata {
            Some(provider) if !parsed.models.is_empty() => {
                match provider.lookup(&parsed.models).await {
                    Ok(found) => found,
                    Err(e) => {
                        tracing::warn!("⚠️ Metadata lookup failed: {}", e);
                        warnings.push(format!("metadata unavailable: {}", e));
                        BTreeMap::new()
                    }
                }
            }
            _ => BTreeMap::new(),
        };

        let mut snapshot =
            build_snapshot(&parsed, environments, &dominance, &metadata, report.origin);
        snapshot.warnings.extend(warnings);
        Ok(snapshot)
    }

    async fn load(&self, snapshot: &DominanceSnapshot) -> Result<String> {
        let outputs = self.render_outputs(snapshot)?;

        if let Some(bundle) = self.config.bundle_filename() {
            tracing::debug!("Creating ZIP file with {} files", outputs.len());

            let zip_data = {
                let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
                for (name, data) in &outputs {
                    zip.start_file::<_, ()>(*name, FileOptions::default())?;
                    zip.write_all(data)?;
                }
                let cursor = zip.finish()?;
                cursor.into_inner()
            };

            tracing::debug!("Writing ZIP file ({} bytes) to storage", zip_data.len());
            self.storage.write_file(bundle, &zip_data).await?;
            return Ok(format!("{}/{}", self.config.output_path(), bundle));
        }

        for (name, data) in &outputs {
            tracing::debug!("Writing {} ({} bytes) to storage", name, data.len());
            self.storage.write_file(name, data).await?;
        }

        // 回傳第一個輸出檔的路徑
        Ok(match outputs.first() {
            Some((name, _)) => format!("{}/{}", self.config.output_path(), name),
            None => self.config.output_path().to_string(),
        })
    }
}
