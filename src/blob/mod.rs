// Blob 存储协作方
//
// 上传核心只依赖这里的两个接口：
// - BlockSource：按字节范围读取文件
// - BlockStore：上传单个分片、提交分片列表

pub mod client;
pub mod source;

use anyhow::Result;
use async_trait::async_trait;
use std::ops::Range;

pub use client::{AzureBlockBlobClient, AZURE_STORAGE_VERSION};
pub use source::{LocalFileSource, MemorySource};

/// 待上传文件
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// 文件名（用于进度事件）
    fn name(&self) -> &str;

    /// 文件大小
    fn size(&self) -> u64;

    /// 读取 [from, to) 范围的字节，范围越界时返回错误
    async fn read_range(&self, range: Range<u64>) -> Result<Vec<u8>>;
}

/// 分片存储服务
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// 以 block_id 上传一个分片
    async fn put_block(&self, url: &str, block_id: &str, data: Vec<u8>) -> Result<()>;

    /// 按给定顺序提交分片列表，生成最终 blob
    async fn put_block_list(&self, url: &str, block_ids: &[String], content_type: &str)
        -> Result<()>;
}
