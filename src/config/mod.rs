// 配置管理模块

use crate::uploader::{
    UploadError, DEFAULT_BLOCK_ID_PREFIX, DEFAULT_BLOCK_SIZE, DEFAULT_SIMULTANEOUS_UPLOADS,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// 上传配置
    #[serde(default)]
    pub upload: UploadOptions,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数（默认 7 天）
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_enabled() -> bool {
    false
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
        }
    }
}

/// 上传配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadOptions {
    /// 分片 ID 前缀
    #[serde(default = "default_block_id_prefix")]
    pub block_id_prefix: String,
    /// 分片大小（字节）
    #[serde(default = "default_block_size")]
    pub block_size: u64,
    /// 同时上传的分片数
    #[serde(default = "default_simultaneous_uploads")]
    pub simultaneous_uploads: usize,
    /// 提交分片列表时设置的 blob 内容类型
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

fn default_block_id_prefix() -> String {
    DEFAULT_BLOCK_ID_PREFIX.to_string()
}

fn default_block_size() -> u64 {
    DEFAULT_BLOCK_SIZE
}

fn default_simultaneous_uploads() -> usize {
    DEFAULT_SIMULTANEOUS_UPLOADS
}

fn default_content_type() -> String {
    "application/octet-stream".to_string()
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            block_id_prefix: default_block_id_prefix(),
            block_size: default_block_size(),
            simultaneous_uploads: default_simultaneous_uploads(),
            content_type: default_content_type(),
        }
    }
}

impl UploadOptions {
    /// 校验上传配置
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.block_size == 0 {
            return Err(UploadError::InvalidConfiguration(
                "block_size 必须大于 0".to_string(),
            ));
        }
        if self.simultaneous_uploads == 0 {
            return Err(UploadError::InvalidConfiguration(
                "simultaneous_uploads 必须大于 0".to_string(),
            ));
        }
        if self.block_id_prefix.is_empty() {
            return Err(UploadError::InvalidConfiguration(
                "block_id_prefix 不能为空".to_string(),
            ));
        }
        if self.content_type.trim().is_empty() {
            return Err(UploadError::InvalidConfiguration(
                "content_type 不能为空".to_string(),
            ));
        }
        Ok(())
    }
}

impl AppConfig {
    /// 从文件加载配置
    pub async fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;

        let config: AppConfig = toml::from_str(&content).context("Failed to parse config file")?;

        config
            .upload
            .validate()
            .context("配置文件中的上传配置无效")?;

        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        // 确保父目录存在
        if let Some(parent) = std::path::Path::new(path).parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        fs::write(path, content)
            .await
            .context("Failed to write config file")?;

        tracing::info!("✓ 配置已保存: {}", path);
        Ok(())
    }

    /// 加载配置，失败时使用默认配置
    pub async fn load_or_default(path: &str) -> Self {
        match Self::load_from_file(path).await {
            Ok(config) => {
                tracing::info!("配置文件加载成功: {}", path);
                config
            }
            Err(e) => {
                tracing::warn!("配置文件加载失败，使用默认配置: {:#}", e);
                Self::default()
            }
        }
    }
}
