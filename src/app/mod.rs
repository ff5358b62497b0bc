pub mod render;
pub mod snapshot;

pub use snapshot::{SnapshotOutcome, SnapshotService};

use crate::core::Pipeline;
use crate::utils::error::Result;
use std::time::Duration;

/// 定期刷新並輸出，直到收到 Ctrl-C
pub async fn watch<P: Pipeline>(
    service: &SnapshotService<P>,
    interval: Duration,
    uid: Option<u32>,
) -> Result<()> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("🛑 Stopping watch loop");
                return Ok(());
            }
        }

        match service.get(false).await {
            Ok(outcome) if outcome.fresh => {
                if let Some(warning) = &outcome.warning {
                    tracing::warn!("⚠️ {}", warning);
                }
                let output_path = service.export(&outcome.snapshot).await?;
                tracing::info!("📁 Output saved to: {}", output_path);
                print!("{}", render::format_summary(&outcome.snapshot));
                if let Some(uid) = uid {
                    print!("{}", render::format_miner_detail(&outcome.snapshot, uid));
                }
            }
            Ok(_) => tracing::debug!("Snapshot still fresh, skipping export"),
            // 沒有任何成功報表時，等下一輪再試
            Err(e) => tracing::error!("❌ Refresh failed: {} ({})", e, e.recovery_suggestion()),
        }
    }
}
