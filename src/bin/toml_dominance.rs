use clap::Parser;
use miner_dominance::adapters::report_source::{build_report_source, with_report_cache};
use miner_dominance::app::{self, render};
use miner_dominance::config::toml_config::TomlConfig;
use miner_dominance::core::{ConfigProvider, ReportSource};
use miner_dominance::utils::{logger, validation::Validate};
use miner_dominance::{DominanceEngine, LocalStorage, ReportPipeline, SnapshotService};

#[derive(Parser)]
#[command(name = "toml-dominance")]
#[command(about = "Miner dominance analysis with TOML configuration support")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "dominance.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Keep refreshing on the configured interval
    #[arg(long)]
    watch: bool,

    /// Print the dominators of this uid
    #[arg(long)]
    uid: Option<u32>,

    /// Dry run - show what would be processed without executing
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // 載入 TOML 配置
    let config = match TomlConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    // 初始化日誌；命令列 --verbose 優先
    logger::init_logger(args.verbose || config.verbose(), config.json_logs());

    tracing::info!("🚀 Starting TOML-based dominance tool");
    tracing::info!("📁 Loaded configuration from: {}", args.config);

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    tracing::info!("✅ Configuration loaded and validated successfully");

    display_config_summary(&config, &args);

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No actual processing will occur");
        perform_dry_run(&config)?;
        return Ok(());
    }

    let source = match build_report_source(&config.source) {
        Ok(source) => with_report_cache(source, config.cache_file()),
        Err(e) => {
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(e.exit_code());
        }
    };
    let metadata = config.metadata_provider().await;
    let watch_interval = config.watch_interval();
    let min_refresh = config.min_refresh_interval();

    let storage = LocalStorage::new(config.output_path().to_string());
    let mut pipeline = ReportPipeline::new(storage, config, source);
    if let Some(provider) = metadata {
        pipeline = pipeline.with_metadata(Box::new(provider));
    }

    let result = if args.watch {
        tracing::info!("👀 Watching every {}s", watch_interval.as_secs());
        let service = SnapshotService::new(pipeline, min_refresh);
        app::watch(&service, watch_interval, args.uid).await
    } else {
        let engine = DominanceEngine::new(pipeline);
        engine.run().await.map(|(snapshot, output_path)| {
            tracing::info!("✅ Dominance run completed successfully!");
            println!("✅ Dominance run completed successfully!");
            println!("📁 Output saved to: {}", output_path);
            print!("{}", render::format_summary(&snapshot));
            if let Some(uid) = args.uid {
                print!("{}", render::format_miner_detail(&snapshot, uid));
            }
        })
    };

    if let Err(e) = result {
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

fn display_config_summary(config: &TomlConfig, args: &Args) {
    println!("📋 Configuration Summary:");
    println!(
        "  Pipeline: {} v{}",
        config.pipeline.name,
        config.pipeline.version.as_deref().unwrap_or("0.0.0")
    );
    println!("  Source: {}", config.source.describe());
    println!("  Output: {}", config.output_path());
    println!("  Formats: {}", config.load.output_formats.join(", "));

    if !config.environments().is_empty() {
        println!("  Environments: {}", config.environments().join(", "));
    }

    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }

    println!();
}

fn perform_dry_run(config: &TomlConfig) -> anyhow::Result<()> {
    println!("🔍 Dry Run Analysis:");
    println!();

    // 報表來源分析
    let source = build_report_source(&config.source)?;
    println!("📡 Report Source:");
    println!("  {}", source.describe());
    if let Some(headers) = &config.source.headers {
        println!("  Headers: {} custom headers", headers.len());
    }
    if let Some(cache_file) = config.cache_file() {
        println!("  Fallback cache: {}", cache_file);
    }

    println!();
    println!("⏱️ Refresh:");
    println!("  Minimum interval: {}s", config.min_refresh_interval().as_secs());
    println!("  Watch interval: {}s", config.watch_interval().as_secs());

    if let Some(metadata) = &config.metadata {
        println!();
        println!("🏷️ Metadata:");
        if let Some(command) = &metadata.commits_command {
            println!("  Commits: {}", command.join(" "));
        }
        if let Some(command) = &metadata.keys_command {
            println!("  Keys: {}", command.join(" "));
        }
        if let Some(command) = &metadata.sizes_command {
            println!("  Sizes: {}", command.join(" "));
        }
        if let Some(path) = &metadata.model_sizes_path {
            println!("  Size store: {}", path);
        }
    }

    // 輸出分析
    println!();
    println!("💾 Output Configuration:");
    println!("  Path: {}", config.output_path());
    println!("  Formats: {}", config.load.output_formats.join(", "));
    if let Some(bundle) = config.bundle_filename() {
        println!("  Compression: {} (ZIP)", bundle);
    }

    println!();
    println!("✅ Dry run analysis complete. Use --verbose for more details during actual run.");

    Ok(())
}
