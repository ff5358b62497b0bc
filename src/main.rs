use clap::Parser;
use miner_dominance::adapters::report_source::{build_report_source, with_report_cache};
use miner_dominance::app::{self, render};
use miner_dominance::core::ReportSource;
use miner_dominance::utils::{logger, validation::Validate};
use miner_dominance::{
    CliConfig, DominanceEngine, DominanceError, LocalStorage, ReportPipeline, SnapshotService,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = CliConfig::parse();

    // 初始化日誌
    logger::init_logger(config.verbose, config.log_json);

    tracing::info!("Starting miner-dominance CLI");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    if let Err(e) = run(config).await {
        // 記錄詳細錯誤信息
        tracing::error!(
            "❌ Dominance run failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 建議: {}", e.recovery_suggestion());

        std::process::exit(e.exit_code());
    }

    Ok(())
}

async fn run(config: CliConfig) -> Result<(), DominanceError> {
    let source = with_report_cache(
        build_report_source(&config.source_config()?)?,
        config.report_cache.as_deref(),
    );
    tracing::info!("📡 Report source: {}", source.describe());

    let metadata = config.metadata_provider().await;
    let storage = LocalStorage::new(config.output_path.clone());
    let mut pipeline = ReportPipeline::new(storage, config.clone(), source);
    if let Some(provider) = metadata {
        pipeline = pipeline.with_metadata(Box::new(provider));
    }

    if config.watch {
        tracing::info!(
            "👀 Watching every {}s (minimum refresh {}s)",
            config.interval_seconds,
            config.min_refresh_seconds
        );
        let service = SnapshotService::new(pipeline, config.min_refresh_interval());
        return app::watch(&service, config.watch_interval(), config.uid).await;
    }

    let engine = DominanceEngine::new(pipeline);
    let (snapshot, output_path) = engine.run().await?;

    tracing::info!("✅ Dominance run completed successfully!");
    println!("✅ Dominance run completed successfully!");
    println!("📁 Output saved to: {}", output_path);
    print!("{}", render::format_summary(&snapshot));
    if let Some(uid) = config.uid {
        print!("{}", render::format_miner_detail(&snapshot, uid));
    }

    Ok(())
}
