// Azure Block Blob 客户端
//
// 目标 URL 为带 SAS 签名的 blob 地址，本客户端不处理认证：
// - Put Block:      PUT <url>&comp=block&blockid=<id>
// - Put Block List: PUT <url>&comp=blocklist，XML 请求体

use super::BlockStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, info};

/// 服务版本（该版本单个分片上限 100MB）
pub const AZURE_STORAGE_VERSION: &str = "2016-05-31";

/// 默认请求超时（秒）
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// 在已有查询串的 URL 后追加参数
fn append_query(url: &str, query: &str) -> String {
    if url.contains('?') {
        format!("{}&{}", url, query)
    } else {
        format!("{}?{}", url, query)
    }
}

/// Put Block 请求地址
pub fn put_block_url(url: &str, block_id: &str) -> String {
    append_query(
        url,
        &format!("comp=block&blockid={}", urlencoding::encode(block_id)),
    )
}

/// Put Block List 请求地址
pub fn put_block_list_url(url: &str) -> String {
    append_query(url, "comp=blocklist")
}

/// Put Block List 请求体
pub fn block_list_xml(block_ids: &[String]) -> String {
    let mut body = String::from(r#"<?xml version="1.0" encoding="utf-8"?><BlockList>"#);
    for id in block_ids {
        body.push_str("<Latest>");
        body.push_str(id);
        body.push_str("</Latest>");
    }
    body.push_str("</BlockList>");
    body
}

/// 分片内容的 MD5（base64），服务端用于校验传输完整性
pub fn content_md5(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(md5::compute(data).0)
}

/// Azure Block Blob 客户端
#[derive(Debug, Clone)]
pub struct AzureBlockBlobClient {
    client: Client,
}

impl AzureBlockBlobClient {
    /// 使用默认超时创建客户端
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// 指定请求超时创建客户端
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl BlockStore for AzureBlockBlobClient {
    async fn put_block(&self, url: &str, block_id: &str, data: Vec<u8>) -> Result<()> {
        let size = data.len();
        let md5 = content_md5(&data);

        let response = self
            .client
            .put(put_block_url(url, block_id))
            .header("x-ms-version", AZURE_STORAGE_VERSION)
            .header("Content-MD5", md5)
            .body(data)
            .send()
            .await
            .context("上传分片请求发送失败")?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("上传分片失败: status={}, body={}", status, body);
        }

        debug!("上传分片成功: block_id={}, 大小={} bytes", block_id, size);
        Ok(())
    }

    async fn put_block_list(
        &self,
        url: &str,
        block_ids: &[String],
        content_type: &str,
    ) -> Result<()> {
        let response = self
            .client
            .put(put_block_list_url(url))
            .header("x-ms-version", AZURE_STORAGE_VERSION)
            .header("x-ms-blob-content-type", content_type)
            .header("Content-Type", "application/xml")
            .body(block_list_xml(block_ids))
            .send()
            .await
            .context("提交分片列表请求发送失败")?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("提交分片列表失败: status={}, body={}", status, body);
        }

        info!("提交分片列表成功: 分片数量={}", block_ids.len());
        Ok(())
    }
}
