use crate::core::Pipeline;
use crate::domain::model::DominanceSnapshot;
use crate::utils::error::Result;

/// 單次執行 extract → transform → load
pub struct DominanceEngine<P: Pipeline> {
    pipeline: P,
}

impl<P: Pipeline> DominanceEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self { pipeline }
    }

    pub async fn run(&self) -> Result<(DominanceSnapshot, String)> {
        tracing::info!("🚀 Starting dominance run");

        tracing::info!("📥 Extracting report...");
        let report = self.pipeline.extract().await?;
        tracing::info!("Extracted {} bytes ({:?})", report.text.len(), report.origin);

        tracing::info!("🔄 Computing dominance...");
        let snapshot = self.pipeline.transform(report).await?;
        tracing::info!(
            "📊 {} models, {} dominated, {} on the Pareto frontier",
            snapshot.total_models,
            snapshot.dominated_count,
            snapshot.pareto_frontier_count
        );
        for warning in &snapshot.warnings {
            tracing::warn!("⚠️ {}", warning);
        }

        tracing::info!("💾 Loading outputs...");
        let output_path = self.pipeline.load(&snapshot).await?;
        tracing::info!("Output saved to: {}", output_path);

        Ok((snapshot, output_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{RawReport, ReportOrigin};
    use crate::utils::error::DominanceError;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingPipeline {
        loads: Arc<AtomicUsize>,
        fail_extract: bool,
    }

    #[async_trait]
    impl Pipeline for CountingPipeline {
        async fn extract(&self) -> Result<RawReport> {
            if self.fail_extract {
                return Err(DominanceError::source_error("no report"));
            }
            Ok(RawReport::new("text", ReportOrigin::Inline))
        }

        async fn transform(&self, report: RawReport) -> Result<DominanceSnapshot> {
            Ok(DominanceSnapshot {
                block: None,
                generated_at: Utc::now(),
                origin: report.origin,
                environments: vec![],
                miners: vec![],
                total_models: 0,
                pareto_frontier_count: 0,
                dominated_count: 0,
                warnings: vec!["empty".to_string()],
            })
        }

        async fn load(&self, _snapshot: &DominanceSnapshot) -> Result<String> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok("out/dominance.json".to_string())
        }
    }

    #[tokio::test]
    async fn test_run_drives_all_stages() {
        let loads = Arc::new(AtomicUsize::new(0));
        let engine = DominanceEngine::new(CountingPipeline {
            loads: loads.clone(),
            fail_extract: false,
        });

        let (snapshot, path) = engine.run().await.unwrap();
        assert_eq!(path, "out/dominance.json");
        assert_eq!(snapshot.warnings, vec!["empty"]);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_extract_error() {
        let loads = Arc::new(AtomicUsize::new(0));
        let engine = DominanceEngine::new(CountingPipeline {
            loads: loads.clone(),
            fail_extract: true,
        });

        assert!(engine.run().await.is_err());
        assert_eq!(loads.load(Ordering::SeqCst), 0);
    }
}
