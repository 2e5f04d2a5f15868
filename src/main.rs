use anyhow::{Context, Result};
use blob_block_uploader::{
    logging, AppConfig, AzureBlockBlobClient, LocalFileSource, ProgressEvent, UploadCallbacks,
    UploadCoordinator,
};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// 默认配置文件路径
const DEFAULT_CONFIG_PATH: &str = "config/app.toml";

#[derive(Parser)]
#[command(name = "blob-block-uploader")]
#[command(about = "分片并发上传大文件到 Blob 存储，支持逐分片 AES-256-GCM 加密")]
#[command(version)]
struct Cli {
    /// 配置文件路径
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 上传文件
    Upload(UploadArgs),
}

#[derive(Args)]
struct UploadArgs {
    /// 本地文件路径
    file: PathBuf,

    /// 目标 blob 地址（带 SAS 签名）
    url: String,

    /// 32 字节加密密钥（十六进制），提供时逐分片加密
    #[arg(long, env = "BLOB_UPLOAD_KEY_HEX")]
    key_hex: Option<String>,

    /// 分片大小（字节），覆盖配置文件
    #[arg(long)]
    block_size: Option<u64>,

    /// 同时上传的分片数，覆盖配置文件
    #[arg(long)]
    concurrency: Option<usize>,

    /// 分片 ID 前缀，覆盖配置文件
    #[arg(long)]
    prefix: Option<String>,

    /// blob 内容类型，覆盖配置文件
    #[arg(long)]
    content_type: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_or_default(&cli.config).await;
    let _log_guard = logging::init_logging(&config.log);

    match cli.command {
        Commands::Upload(args) => upload(config, args).await,
    }
}

async fn upload(config: AppConfig, args: UploadArgs) -> Result<()> {
    let mut options = config.upload;
    if let Some(block_size) = args.block_size {
        options.block_size = block_size;
    }
    if let Some(concurrency) = args.concurrency {
        options.simultaneous_uploads = concurrency;
    }
    if let Some(prefix) = args.prefix {
        options.block_id_prefix = prefix;
    }
    if let Some(content_type) = args.content_type {
        options.content_type = content_type;
    }

    let key = args
        .key_hex
        .as_deref()
        .map(|k| hex::decode(k.trim()))
        .transpose()
        .context("加密密钥不是有效的十六进制字符串")?;

    let source = LocalFileSource::open(&args.file).await?;
    info!("待上传文件: {}", source.path().display());
    let store = AzureBlockBlobClient::new()?;

    let callbacks = UploadCallbacks::default()
        .on_progress(|event: &ProgressEvent| {
            info!(
                "上传进度: {} {:.1}% ({}/{} 分片完成)",
                event.file_name,
                event.progress * 100.0,
                event.completed_blocks,
                event.total_blocks
            );
        })
        .on_error(|err| warn!("上传出错: {}", err));

    let coordinator =
        UploadCoordinator::new(&args.url, Arc::new(source), Arc::new(store), options)?
            .with_callbacks(callbacks);

    // Ctrl-C 时停止调度新分片
    let cancel_token = coordinator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("收到中断信号，停止调度新分片");
            cancel_token.cancel();
        }
    });

    let result = coordinator.start(key.as_deref()).await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&result).context("序列化上传结果失败")?
    );
    Ok(())
}
