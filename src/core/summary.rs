use crate::domain::model::{
    DominanceResult, DominanceSnapshot, MinerStatus, ModelMetadata, ParsedReport, ReportOrigin,
};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};

/// 合併解析結果、支配關係與輔助資訊
pub fn build_snapshot(
    report: &ParsedReport,
    environments: Vec<String>,
    dominance: &BTreeMap<u32, DominanceResult>,
    metadata: &BTreeMap<u32, ModelMetadata>,
    origin: ReportOrigin,
) -> DominanceSnapshot {
    let active: HashMap<u32, bool> = report
        .models
        .iter()
        .map(|m| (m.uid, m.is_active()))
        .collect();

    // 反向關係：誰被此模型支配
    let mut dominates: HashMap<u32, Vec<u32>> = HashMap::new();
    for model in &report.models {
        if let Some(result) = dominance.get(&model.uid) {
            for dominator in &result.dominators {
                dominates.entry(dominator.uid).or_default().push(model.uid);
            }
        }
    }

    let miners: Vec<MinerStatus> = report
        .models
        .iter()
        .map(|model| {
            let result = dominance.get(&model.uid).cloned().unwrap_or_default();
            let dominating_active_count = result
                .dominators
                .iter()
                .filter(|d| active.get(&d.uid).copied().unwrap_or(false))
                .count();
            let has_data = model.has_data();

            MinerStatus {
                uid: model.uid,
                model_name: model.model_name.clone(),
                first_blk: model.first_blk,
                points: model.points,
                weight: model.weight,
                eligible: model.eligible.clone(),
                is_active: model.is_active(),
                has_data,
                is_dominated: result.is_dominated,
                on_pareto_frontier: has_data && !result.is_dominated,
                dominated_by_count: result.dominators.len(),
                dominating_active_count,
                dominating_non_active_count: result.dominators.len() - dominating_active_count,
                dominators: result.dominators,
                dominates: dominates.remove(&model.uid).unwrap_or_default(),
                scores: model.scores.clone(),
                epsilon_thresholds: model.epsilon_thresholds.clone(),
                sample_counts: model.sample_counts.clone(),
                incomplete_problems: model.incomplete_problems.clone(),
                metadata: metadata.get(&model.uid).filter(|m| !m.is_empty()).cloned(),
            }
        })
        .collect();

    let pareto_frontier_count = miners.iter().filter(|m| m.on_pareto_frontier).count();
    let dominated_count = miners.iter().filter(|m| m.is_dominated).count();

    tracing::info!(
        "Dominance summary: {} models, {} on Pareto frontier, {} dominated",
        miners.len(),
        pareto_frontier_count,
        dominated_count
    );

    DominanceSnapshot {
        block: report.current_block,
        generated_at: Utc::now(),
        origin,
        environments,
        total_models: miners.len(),
        pareto_frontier_count,
        dominated_count,
        miners,
        warnings: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dominance::compute_dominance;
    use crate::domain::model::{ModelRecord, ScoreCell};

    fn report() -> ParsedReport {
        let env = |s: f64, e: f64| ScoreCell::new(s, e, 10);
        ParsedReport {
            models: vec![
                ModelRecord::new(1, "a/early", 100)
                    .with_cell("X", env(80.0, 75.0))
                    .with_weight(0.5),
                ModelRecord::new(2, "b/late", 200).with_cell("X", env(70.0, 65.0)),
                ModelRecord::new(3, "c/later", 300)
                    .with_cell("X", env(60.0, 55.0))
                    .with_weight(0.1),
                ModelRecord::new(4, "d/no-samples", 400).with_cell("X", ScoreCell::new(1.0, 1.0, 0)),
            ],
            environment_order: vec!["X".to_string()],
            current_block: Some(9_000),
        }
    }

    #[test]
    fn test_snapshot_counts_and_inverse_relation() {
        let report = report();
        let dominance = compute_dominance(&report.models, Some(report.environment_order.as_slice()));
        let snapshot = build_snapshot(
            &report,
            report.environment_order.clone(),
            &dominance,
            &BTreeMap::new(),
            ReportOrigin::Inline,
        );

        assert_eq!(snapshot.block, Some(9_000));
        assert_eq!(snapshot.total_models, 4);
        assert_eq!(snapshot.dominated_count, 2);
        // uid 4 沒有樣本，不算在前沿
        assert_eq!(snapshot.pareto_frontier_count, 1);

        let early = snapshot.miner(1).unwrap();
        assert!(early.on_pareto_frontier);
        assert_eq!(early.dominates, vec![2, 3]);

        let later = snapshot.miner(3).unwrap();
        assert_eq!(later.dominated_by_count, 2);
        assert_eq!(later.dominating_active_count, 1);
        assert_eq!(later.dominating_non_active_count, 1);
        assert!(later.is_active);

        let empty = snapshot.miner(4).unwrap();
        assert!(!empty.has_data);
        assert!(!empty.is_dominated);
        assert!(!empty.on_pareto_frontier);
    }

    #[test]
    fn test_metadata_is_attached_when_present() {
        let report = report();
        let dominance = compute_dominance(&report.models, None);
        let mut metadata = BTreeMap::new();
        metadata.insert(
            2,
            ModelMetadata {
                model_full_name: Some("b/late-full".to_string()),
                model_size_gb: Some(16.4),
                ..Default::default()
            },
        );
        metadata.insert(3, ModelMetadata::default());

        let snapshot = build_snapshot(
            &report,
            vec!["X".to_string()],
            &dominance,
            &metadata,
            ReportOrigin::File,
        );

        let late = snapshot.miner(2).unwrap();
        assert_eq!(late.metadata.as_ref().unwrap().model_size_gb, Some(16.4));
        assert!(snapshot.miner(3).unwrap().metadata.is_none());
        assert_eq!(snapshot.dominators_of(2).len(), 1);
        assert!(snapshot.dominators_of(99).is_empty());
    }
}
