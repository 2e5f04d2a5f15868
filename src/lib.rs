// Blob Block Uploader Library
// 分片并发上传 Blob 存储的核心库

// 配置管理模块
pub mod config;

// 日志模块
pub mod logging;

// Blob 存储协作方（文件读取、分片上传与提交）
pub mod blob;

// 上传引擎模块
pub mod uploader;

// 导出常用类型
pub use blob::{AzureBlockBlobClient, BlockSource, BlockStore, LocalFileSource, MemorySource};
pub use config::{AppConfig, LogConfig, UploadOptions};
pub use uploader::{
    BlockCipher, BoundedExecutor, EncryptionArtifacts, ProgressEvent, UploadCallbacks,
    UploadCoordinator, UploadError, UploadPlan, UploadResult,
};
