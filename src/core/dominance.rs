//! 模型之間的直接支配關係。
//!
//! 兩個模型中 `first_blk` 較小者為先提交者（earlier）。每個環境的勝負只看
//! 先提交者的門檻：後提交者的分數必須超過 `threshold_earlier + SCORE_EPSILON`
//! 才算勝出。候選者必須贏下所有可比較的環境才構成支配。

use crate::domain::model::{DominanceResult, Dominator, ModelRecord};
use std::collections::BTreeMap;

/// 吸收浮點誤差
pub const SCORE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Comparison {
    pub dominates: bool,
    /// 只包含參與判定的環境
    pub margins: BTreeMap<String, f64>,
}

impl Comparison {
    fn rejected() -> Self {
        Self::default()
    }
}

/// 單一環境中，可比較的兩方數值
struct EnvironmentDuel {
    score_later: f64,
    threshold_earlier: f64,
}

impl EnvironmentDuel {
    fn between(earlier: &ModelRecord, later: &ModelRecord, env: &str) -> Option<Self> {
        let score_earlier = *earlier.scores.get(env)?;
        let score_later = *later.scores.get(env)?;
        let threshold_earlier = *earlier.epsilon_thresholds.get(env)?;
        let samples_earlier = *earlier.sample_counts.get(env)?;
        let samples_later = *later.sample_counts.get(env)?;

        let finite = score_earlier.is_finite()
            && score_later.is_finite()
            && threshold_earlier.is_finite();
        if !finite || samples_earlier == 0 || samples_later == 0 {
            return None;
        }

        Some(Self {
            score_later,
            threshold_earlier,
        })
    }

    fn later_wins(&self) -> bool {
        self.score_later > self.threshold_earlier + SCORE_EPSILON
    }

    /// 勝方越過門檻的幅度，不做截斷
    fn margin(&self) -> f64 {
        if self.later_wins() {
            self.score_later - self.threshold_earlier
        } else {
            self.threshold_earlier - self.score_later
        }
    }
}

/// `candidate` 是否直接支配 `target`
pub fn directly_dominates(
    candidate: &ModelRecord,
    target: &ModelRecord,
    environments: &[String],
) -> Comparison {
    if std::ptr::eq(candidate, target) || candidate.uid == target.uid {
        return Comparison::rejected();
    }
    if environments.is_empty() {
        return Comparison::rejected();
    }
    if candidate.first_blk <= 0 || target.first_blk <= 0 {
        return Comparison::rejected();
    }
    if candidate.first_blk == target.first_blk {
        return Comparison::rejected();
    }

    let candidate_is_earlier = candidate.first_blk < target.first_blk;
    let (earlier, later) = if candidate_is_earlier {
        (candidate, target)
    } else {
        (target, candidate)
    };

    let mut margins = BTreeMap::new();
    for env in environments {
        let Some(duel) = EnvironmentDuel::between(earlier, later, env) else {
            continue;
        };

        let candidate_won = duel.later_wins() != candidate_is_earlier;
        if !candidate_won {
            return Comparison::rejected();
        }
        margins.insert(env.clone(), duel.margin());
    }

    if margins.is_empty() {
        // 沒有任何可比較的環境
        return Comparison::rejected();
    }

    Comparison {
        dominates: true,
        margins,
    }
}

/// 未指定環境時，取第一個有分數的模型的環境
pub fn derive_environments(models: &[ModelRecord]) -> Vec<String> {
    models
        .iter()
        .find(|m| !m.scores.is_empty())
        .map(|m| m.scores.keys().cloned().collect())
        .unwrap_or_default()
}

/// 計算每個模型的直接支配者（不展開遞移關係）
pub fn compute_dominance(
    models: &[ModelRecord],
    environment_names: Option<&[String]>,
) -> BTreeMap<u32, DominanceResult> {
    let environments = match environment_names {
        Some(names) if !names.is_empty() => names.to_vec(),
        _ => derive_environments(models),
    };

    let mut results = BTreeMap::new();
    for target in models {
        let dominators: Vec<Dominator> = models
            .iter()
            .filter(|other| !std::ptr::eq(*other, target))
            .filter_map(|other| {
                let comparison = directly_dominates(other, target, &environments);
                comparison.dominates.then(|| Dominator {
                    uid: other.uid,
                    model_name: other.model_name.clone(),
                    margins: comparison.margins,
                    scores: other.scores.clone(),
                    epsilon_thresholds: other.epsilon_thresholds.clone(),
                    sample_counts: other.sample_counts.clone(),
                    incomplete_problems: other.incomplete_problems.clone(),
                })
            })
            .collect();

        results.insert(
            target.uid,
            DominanceResult {
                is_dominated: !dominators.is_empty(),
                dominators,
            },
        );
    }

    tracing::debug!(
        "Computed dominance for {} models over {} environments",
        models.len(),
        environments.len()
    );

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::ScoreCell;

    fn envs(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn model(uid: u32, first_blk: i64, cells: &[(&str, f64, f64, u64)]) -> ModelRecord {
        let base = ModelRecord::new(uid, format!("m/{}", uid), first_blk);
        cells.iter().fold(base, |m, (env, score, eps, n)| {
            m.with_cell(env, ScoreCell::new(*score, *eps, *n))
        })
    }

    #[test]
    fn test_model_never_dominates_itself() {
        let m = model(1, 100, &[("X", 90.0, 10.0, 10)]);
        assert!(!directly_dominates(&m, &m, &envs(&["X"])).dominates);
    }

    #[test]
    fn test_concrete_scenario_neither_dominates() {
        let p = model(1, 100, &[("X", 80.0, 75.0, 10), ("Y", 70.0, 65.0, 10)]);
        let q = model(2, 200, &[("X", 90.0, 85.0, 10), ("Y", 60.0, 55.0, 10)]);
        let environments = envs(&["X", "Y"]);

        assert!(!directly_dominates(&p, &q, &environments).dominates);
        assert!(!directly_dominates(&q, &p, &environments).dominates);

        let results = compute_dominance(&[p, q], Some(environments.as_slice()));
        assert!(!results[&1].is_dominated);
        assert!(!results[&2].is_dominated);
        assert!(results[&1].dominators.is_empty());
        assert!(results[&2].dominators.is_empty());
    }

    #[test]
    fn test_earlier_model_dominates_when_threshold_holds() {
        let earlier = model(1, 100, &[("X", 80.0, 75.0, 10), ("Y", 70.0, 65.0, 10)]);
        let later = model(2, 200, &[("X", 74.0, 70.0, 10), ("Y", 60.0, 55.0, 10)]);
        let environments = envs(&["X", "Y"]);

        let comparison = directly_dominates(&earlier, &later, &environments);
        assert!(comparison.dominates);
        assert_eq!(comparison.margins["X"], 1.0);
        assert_eq!(comparison.margins["Y"], 5.0);
        assert!(!directly_dominates(&later, &earlier, &environments).dominates);
    }

    #[test]
    fn test_later_model_dominates_by_clearing_every_threshold() {
        let earlier = model(1, 100, &[("X", 80.0, 75.0, 10), ("Y", 70.0, 65.0, 10)]);
        let later = model(2, 200, &[("X", 78.0, 70.0, 10), ("Y", 67.0, 60.0, 10)]);
        let environments = envs(&["X", "Y"]);

        // 後提交者的門檻不參與判定
        let comparison = directly_dominates(&later, &earlier, &environments);
        assert!(comparison.dominates);
        assert_eq!(comparison.margins["X"], 3.0);
        assert_eq!(comparison.margins["Y"], 2.0);
    }

    #[test]
    fn test_equal_first_blk_is_never_comparable() {
        let a = model(1, 100, &[("X", 99.0, 1.0, 10)]);
        let b = model(2, 100, &[("X", 1.0, 0.5, 10)]);
        let environments = envs(&["X"]);
        assert!(!directly_dominates(&a, &b, &environments).dominates);
        assert!(!directly_dominates(&b, &a, &environments).dominates);
    }

    #[test]
    fn test_non_positive_first_blk_disqualifies_both_sides() {
        let environments = envs(&["X"]);
        for bad in [0, -5] {
            let a = model(1, bad, &[("X", 99.0, 1.0, 10)]);
            let b = model(2, 100, &[("X", 1.0, 0.5, 10)]);
            assert!(!directly_dominates(&a, &b, &environments).dominates);
            assert!(!directly_dominates(&b, &a, &environments).dominates);
        }
    }

    #[test]
    fn test_single_lost_environment_vetoes_dominance() {
        let earlier = model(
            1,
            100,
            &[("X", 80.0, 75.0, 10), ("Y", 80.0, 75.0, 10), ("Z", 80.0, 75.0, 10)],
        );
        let later = model(
            2,
            200,
            &[("X", 70.0, 65.0, 10), ("Y", 70.0, 65.0, 10), ("Z", 90.0, 85.0, 10)],
        );
        let comparison = directly_dominates(&earlier, &later, &envs(&["X", "Y", "Z"]));
        assert!(!comparison.dominates);
        assert!(comparison.margins.is_empty());
    }

    #[test]
    fn test_disjoint_samples_leave_no_decision() {
        let a = model(1, 100, &[("X", 80.0, 75.0, 10), ("Y", 80.0, 75.0, 0)]);
        let b = model(2, 200, &[("Y", 10.0, 5.0, 10), ("Z", 10.0, 5.0, 10)]);
        let environments = envs(&["X", "Y", "Z"]);
        assert!(!directly_dominates(&a, &b, &environments).dominates);
        assert!(!directly_dominates(&b, &a, &environments).dominates);
    }

    #[test]
    fn test_non_finite_scores_are_not_comparable() {
        let a = model(1, 100, &[("X", f64::NAN, 75.0, 10), ("Y", 80.0, 75.0, 10)]);
        let b = model(2, 200, &[("X", 99.0, 95.0, 10), ("Y", 70.0, 65.0, 10)]);
        let comparison = directly_dominates(&a, &b, &envs(&["X", "Y"]));
        assert!(comparison.dominates);
        assert!(!comparison.margins.contains_key("X"));
    }

    #[test]
    fn test_margin_keeps_raw_sign_within_epsilon() {
        let earlier = model(1, 100, &[("X", 80.0, 75.0, 10)]);
        let later = model(2, 200, &[("X", 75.0 + 1e-10, 70.0, 10)]);
        let comparison = directly_dominates(&earlier, &later, &envs(&["X"]));
        assert!(comparison.dominates);
        assert!(comparison.margins["X"] < 0.0);
    }

    #[test]
    fn test_empty_environment_list_cannot_dominate() {
        let a = model(1, 100, &[("X", 80.0, 75.0, 10)]);
        let b = model(2, 200, &[("X", 10.0, 5.0, 10)]);
        assert!(!directly_dominates(&a, &b, &[]).dominates);
    }

    #[test]
    fn test_dominance_is_not_transitively_materialized() {
        let a = model(1, 10, &[("X", 80.0, 75.0, 10), ("Y", 80.0, 75.0, 10)]);
        let b = model(2, 20, &[("X", 70.0, 85.0, 10), ("Y", 70.0, 85.0, 10)]);
        let c = model(3, 30, &[("X", 80.0, 70.0, 10), ("Y", 60.0, 50.0, 10)]);
        let environments = envs(&["X", "Y"]);

        assert!(directly_dominates(&a, &b, &environments).dominates);
        assert!(directly_dominates(&b, &c, &environments).dominates);
        assert!(!directly_dominates(&a, &c, &environments).dominates);

        let results = compute_dominance(&[a, b, c], Some(environments.as_slice()));
        let c_dominators: Vec<u32> = results[&3].dominators.iter().map(|d| d.uid).collect();
        assert_eq!(c_dominators, vec![2]);
        assert_eq!(
            results[&2].dominators.iter().map(|d| d.uid).collect::<Vec<_>>(),
            vec![1]
        );
        assert!(!results[&1].is_dominated);
    }

    #[test]
    fn test_dominators_follow_model_order_and_snapshot_scores() {
        let target = model(9, 300, &[("X", 10.0, 5.0, 10)]);
        let first = model(4, 100, &[("X", 80.0, 75.0, 10)]);
        let second = model(2, 200, &[("X", 70.0, 65.0, 10)]);
        let models = vec![first, target, second];

        let results = compute_dominance(&models, None);
        let dominators = &results[&9].dominators;
        assert_eq!(dominators.iter().map(|d| d.uid).collect::<Vec<_>>(), vec![4, 2]);
        assert_eq!(dominators[0].scores["X"], 80.0);
        assert_eq!(dominators[0].epsilon_thresholds["X"], 75.0);
        assert_eq!(dominators[0].sample_counts["X"], 10);
        assert_eq!(dominators[0].margins["X"], 65.0);
    }

    #[test]
    fn test_environments_derived_from_first_scored_model() {
        let models = vec![
            ModelRecord::new(1, "empty", 10),
            model(2, 20, &[("B", 1.0, 1.0, 1), ("A", 1.0, 1.0, 1)]),
        ];
        assert_eq!(derive_environments(&models), envs(&["A", "B"]));
        assert!(derive_environments(&[ModelRecord::new(1, "empty", 10)]).is_empty());
    }

    #[test]
    fn test_no_scored_models_reports_everyone_undominated() {
        let models = vec![ModelRecord::new(1, "a", 10), ModelRecord::new(2, "b", 20)];
        let no_environments: Vec<String> = Vec::new();
        let results = compute_dominance(&models, Some(no_environments.as_slice()));
        assert_eq!(results.len(), 2);
        assert!(results.values().all(|r| !r.is_dominated && r.dominators.is_empty()));
    }
}
