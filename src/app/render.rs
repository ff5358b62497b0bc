use crate::domain::model::DominanceSnapshot;
use std::fmt::Write;

/// 終端機用的摘要
pub fn format_summary(snapshot: &DominanceSnapshot) -> String {
    let mut out = String::new();
    let block = snapshot
        .block
        .map(|b| b.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let _ = writeln!(
        out,
        "📊 Block {} | {} models | {} on Pareto frontier | {} dominated",
        block, snapshot.total_models, snapshot.pareto_frontier_count, snapshot.dominated_count
    );
    let _ = writeln!(out, "  Environments: {}", snapshot.environments.join(", "));

    for miner in snapshot.miners.iter().filter(|m| m.on_pareto_frontier) {
        let _ = writeln!(
            out,
            "  ⭐ uid {:>4}  {}  (first block {}, weight {:.4})",
            miner.uid, miner.model_name, miner.first_blk, miner.weight
        );
    }

    for warning in &snapshot.warnings {
        let _ = writeln!(out, "  ⚠️ {}", warning);
    }
    out
}

/// 單一 uid 的支配者明細
pub fn format_miner_detail(snapshot: &DominanceSnapshot, uid: u32) -> String {
    let mut out = String::new();
    let Some(miner) = snapshot.miner(uid) else {
        let _ = writeln!(out, "uid {} not found in report", uid);
        return out;
    };

    if !miner.is_dominated {
        let _ = writeln!(
            out,
            "✅ uid {} ({}) is not dominated; it dominates {} model(s)",
            miner.uid,
            miner.model_name,
            miner.dominates.len()
        );
        return out;
    }

    let _ = writeln!(
        out,
        "uid {} ({}) is dominated by {} model(s): {} active, {} inactive",
        miner.uid,
        miner.model_name,
        miner.dominated_by_count,
        miner.dominating_active_count,
        miner.dominating_non_active_count
    );
    for dominator in &miner.dominators {
        let margins = dominator
            .margins
            .iter()
            .map(|(env, margin)| format!("{} {:+.2}", env, margin))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(
            out,
            "  ↳ uid {:>4}  {}  [{}]",
            dominator.uid, dominator.model_name, margins
        );
    }
    out
}
