use anyhow::Result;
use clap::Parser;
use road_watch::{config::Config, web::serve};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "road-watch")]
#[command(about = "Traffic violation and pothole detection service")]
struct Args {
    /// Server bind address
    #[arg(long, default_value = "127.0.0.1:5000")]
    bind: String,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Model directory path
    #[arg(long, default_value = "models")]
    models_dir: String,

    /// Root directory for uploads and processed outputs
    #[arg(long, default_value = "static")]
    static_root: String,

    /// TTF/OTF font used for box labels
    #[arg(long)]
    label_font: Option<String>,

    /// Seconds to keep processed outputs (0 keeps them forever)
    #[arg(long, default_value_t = 3600)]
    output_ttl_secs: u64,

    /// Seconds between output cleanup sweeps
    #[arg(long, default_value_t = 300)]
    cleanup_interval_secs: u64,

    /// Enable development mode
    #[arg(long)]
    dev: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志系统
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_target(false)
        .init();

    tracing::info!("Starting road-watch detection service...");
    tracing::info!("Bind address: {}", args.bind);
    tracing::info!("Models directory: {}", args.models_dir);
    tracing::info!("Static root: {}", args.static_root);

    // 创建配置
    let config = Config::new(
        args.bind,
        args.models_dir,
        args.static_root,
        args.label_font,
        args.output_ttl_secs,
        args.cleanup_interval_secs,
        args.dev,
    )?;

    // 启动服务器
    serve(config).await?;

    Ok(())
}
