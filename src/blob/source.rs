// 文件读取实现

use super::BlockSource;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

fn check_range(range: &Range<u64>, size: u64) -> Result<()> {
    if range.start > range.end || range.end > size {
        anyhow::bail!(
            "读取范围越界: {}-{}, 文件大小={}",
            range.start,
            range.end,
            size
        );
    }
    Ok(())
}

/// 本地文件
#[derive(Debug, Clone)]
pub struct LocalFileSource {
    path: PathBuf,
    name: String,
    size: u64,
}

impl LocalFileSource {
    /// 打开本地文件（只读取元数据）
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path)
            .await
            .context(format!("无法读取文件信息: {:?}", path))?;

        if !metadata.is_file() {
            anyhow::bail!("不是普通文件: {:?}", path);
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            path,
            name,
            size: metadata.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl BlockSource for LocalFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    async fn read_range(&self, range: Range<u64>) -> Result<Vec<u8>> {
        check_range(&range, self.size)?;

        let path = self.path.clone();
        let start = range.start;
        let len = (range.end - range.start) as usize;

        let buffer = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let mut file =
                std::fs::File::open(&path).context(format!("无法打开文件: {:?}", path))?;
            file.seek(SeekFrom::Start(start)).context("文件定位失败")?;

            let mut buffer = vec![0u8; len];
            file.read_exact(&mut buffer).context("读取分片数据失败")?;
            Ok(buffer)
        })
        .await
        .context("读取任务异常退出")??;

        debug!(
            "读取文件 {:?}: bytes={}-{}, 大小={} bytes",
            self.path,
            range.start,
            range.end,
            buffer.len()
        );

        Ok(buffer)
    }
}

/// 内存中的文件
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    data: Arc<Vec<u8>>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data: Arc::new(data),
        }
    }
}

#[async_trait]
impl BlockSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read_range(&self, range: Range<u64>) -> Result<Vec<u8>> {
        check_range(&range, self.size())?;
        Ok(self.data[range.start as usize..range.end as usize].to_vec())
    }
}
