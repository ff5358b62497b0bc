//! 快照刷新服務。
//!
//! 持有目前的快照、上次嘗試刷新的時間，以及最後一份成功解析的報表文字。
//! 來源失敗或回傳空報表時，改用最後一份成功的報表重新計算。

use crate::core::Pipeline;
use crate::domain::model::{DominanceSnapshot, RawReport};
use crate::utils::error::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct SnapshotOutcome {
    pub snapshot: Arc<DominanceSnapshot>,
    /// 本次呼叫是否重新計算
    pub fresh: bool,
    /// 是否改用最後一份成功的報表
    pub fell_back: bool,
    pub warning: Option<String>,
}

#[derive(Default)]
struct SnapshotState {
    current: Option<Arc<DominanceSnapshot>>,
    last_attempt: Option<Instant>,
    last_good: Option<RawReport>,
}

pub struct SnapshotService<P: Pipeline> {
    pipeline: P,
    min_refresh_interval: Duration,
    state: Mutex<SnapshotState>,
}

impl<P: Pipeline> SnapshotService<P> {
    pub fn new(pipeline: P, min_refresh_interval: Duration) -> Self {
        Self {
            pipeline,
            min_refresh_interval,
            state: Mutex::new(SnapshotState::default()),
        }
    }

    /// 目前的快照，不觸發刷新
    pub async fn current(&self) -> Option<Arc<DominanceSnapshot>> {
        self.state.lock().await.current.clone()
    }

    pub async fn get(&self, force: bool) -> Result<SnapshotOutcome> {
        let mut state = self.state.lock().await;

        if !force {
            if let (Some(current), Some(attempt)) = (&state.current, state.last_attempt) {
                if attempt.elapsed() < self.min_refresh_interval {
                    tracing::debug!(
                        "Serving cached snapshot ({}s old)",
                        attempt.elapsed().as_secs()
                    );
                    return Ok(SnapshotOutcome {
                        snapshot: current.clone(),
                        fresh: false,
                        fell_back: false,
                        warning: None,
                    });
                }
            }
        }

        state.last_attempt = Some(Instant::now());

        let (snapshot, fell_back, warning) = match self.pipeline.extract().await {
            Ok(report) => {
                let snapshot = self.pipeline.transform(report.clone()).await?;
                if snapshot.total_models > 0 {
                    state.last_good = Some(report);
                    (snapshot, false, None)
                } else if let Some(good) = state.last_good.clone() {
                    self.recompute_from(good, "report contained no model rows".to_string())
                        .await?
                } else {
                    (snapshot, false, None)
                }
            }
            Err(e) => match state.last_good.clone() {
                Some(good) => self.recompute_from(good, format!("refresh failed: {}", e)).await?,
                None => {
                    tracing::error!("❌ Refresh failed with no previous report: {}", e);
                    return Err(e);
                }
            },
        };

        let snapshot = Arc::new(snapshot);
        state.current = Some(snapshot.clone());

        Ok(SnapshotOutcome {
            snapshot,
            fresh: true,
            fell_back,
            warning,
        })
    }

    /// 以刷新後的快照寫出輸出檔
    pub async fn export(&self, snapshot: &DominanceSnapshot) -> Result<String> {
        self.pipeline.load(snapshot).await
    }

    async fn recompute_from(
        &self,
        good: RawReport,
        reason: String,
    ) -> Result<(DominanceSnapshot, bool, Option<String>)> {
        tracing::warn!(
            "⚠️ {}; using last good report from {}",
            reason,
            good.fetched_at.to_rfc3339()
        );
        let mut snapshot = self.pipeline.transform(good).await?;
        let warning = format!("{}; showing last good report", reason);
        snapshot.warnings.push(warning.clone());
        Ok((snapshot, true, Some(warning)))
    }
}
