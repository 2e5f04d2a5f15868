// 上传分片规划
//
// 分片规则：
// - 请求的分片大小大于文件大小时，整个文件作为单一分片
// - 最后一个分片在文件大小不是分片大小整数倍时较短
// - 空文件按一个长度为 0 的分片处理（上传一个空分片后提交）

use super::error::UploadError;
use base64::Engine;
use std::ops::Range;
use tracing::debug;

/// 默认分片 ID 前缀
pub const DEFAULT_BLOCK_ID_PREFIX: &str = "block";

/// 分片序号补零位数
pub const BLOCK_ID_INDEX_WIDTH: usize = 5;

/// 默认分片大小: 100MB（服务版本 2016-05-31 的 Put Block 上限）
pub const DEFAULT_BLOCK_SIZE: u64 = 100 * 1024 * 1024;

/// 生成分片 ID
///
/// 格式为 `<前缀><5 位补零序号>` 的 base64 编码，同一次上传内两两不同
pub fn block_id(prefix: &str, index: usize) -> String {
    let raw = format!("{}{:0width$}", prefix, index, width = BLOCK_ID_INDEX_WIDTH);
    base64::engine::general_purpose::STANDARD.encode(raw)
}

/// 单个分片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRange {
    /// 分片索引
    pub index: usize,
    /// 字节范围 [from, to)
    pub range: Range<u64>,
}

impl BlockRange {
    /// 分片大小
    pub fn size(&self) -> u64 {
        self.range.end - self.range.start
    }

    /// 范围描述（`from-to`，左闭右开），记录在加密产物中
    pub fn label(&self) -> String {
        format!("{}-{}", self.range.start, self.range.end)
    }
}

/// 上传计划
///
/// 一次上传只计算一次，之后只读
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPlan {
    /// 文件总大小
    pub file_size: u64,
    /// 实际分片大小（仅空文件时为 0）
    pub block_size: u64,
    /// 分片总数
    pub total_blocks: usize,
}

impl UploadPlan {
    /// 根据文件大小和请求的分片大小生成计划
    ///
    /// # 参数
    /// * `file_size` - 文件大小
    /// * `requested_block_size` - 请求的分片大小，必须大于 0
    pub fn new(file_size: u64, requested_block_size: u64) -> Result<Self, UploadError> {
        if requested_block_size == 0 {
            return Err(UploadError::InvalidConfiguration(
                "分片大小必须大于 0".to_string(),
            ));
        }

        let block_size = requested_block_size.min(file_size);

        let total_blocks = if file_size == 0 {
            1
        } else {
            usize::try_from(file_size.div_ceil(block_size)).map_err(|_| {
                UploadError::InvalidConfiguration(format!(
                    "分片数量超出范围: 文件大小={}, 分片大小={}",
                    file_size, block_size
                ))
            })?
        };

        debug!(
            "生成上传计划: 文件大小={} bytes, 分片大小={} bytes, 分片数量={}",
            file_size, block_size, total_blocks
        );

        Ok(Self {
            file_size,
            block_size,
            total_blocks,
        })
    }

    /// 获取第 n 个分片
    pub fn block(&self, index: usize) -> Option<BlockRange> {
        if index >= self.total_blocks {
            return None;
        }
        let from = index as u64 * self.block_size;
        let to = (from + self.block_size).min(self.file_size);
        Some(BlockRange {
            index,
            range: from..to,
        })
    }

    /// 按索引顺序遍历所有分片
    pub fn blocks(&self) -> impl Iterator<Item = BlockRange> + '_ {
        (0..self.total_blocks).filter_map(move |i| self.block(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_ten_bytes_block_four() {
        let plan = UploadPlan::new(10, 4).unwrap();
        assert_eq!(plan.block_size, 4);
        assert_eq!(plan.total_blocks, 3);

        let ranges: Vec<_> = plan.blocks().map(|b| b.range).collect();
        assert_eq!(ranges, vec![0..4, 4..8, 8..10]);
        assert_eq!(plan.block(2).unwrap().size(), 2);
        assert!(plan.block(3).is_none());
    }

    #[test]
    fn test_exact_multiple_has_no_trailing_block() {
        let plan = UploadPlan::new(16, 4).unwrap();
        assert_eq!(plan.total_blocks, 4);
        assert_eq!(plan.block(3).unwrap().range, 12..16);
    }

    #[test]
    fn test_small_file_single_block() {
        let plan = UploadPlan::new(3, 4 * 1024 * 1024).unwrap();
        assert_eq!(plan.block_size, 3);
        assert_eq!(plan.total_blocks, 1);
        assert_eq!(plan.block(0).unwrap().range, 0..3);
    }

    #[test]
    fn test_empty_file_single_empty_block() {
        let plan = UploadPlan::new(0, DEFAULT_BLOCK_SIZE).unwrap();
        assert_eq!(plan.total_blocks, 1);
        assert_eq!(plan.block_size, 0);
        let block = plan.block(0).unwrap();
        assert_eq!(block.range, 0..0);
        assert_eq!(block.size(), 0);
    }

    #[test]
    fn test_zero_block_size_rejected() {
        assert!(matches!(
            UploadPlan::new(10, 0),
            Err(UploadError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_block_id_format() {
        let id = block_id("block", 42);
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&id)
            .unwrap();
        assert_eq!(decoded, b"block00042");
        assert_eq!(block_id("block", 0), "YmxvY2swMDAwMA==");
    }

    #[test]
    fn test_block_ids_distinct_and_equal_length() {
        let ids: Vec<String> = (0..100_000).map(|i| block_id("block", i)).collect();
        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        assert!(ids.iter().all(|id| id.len() == ids[0].len()));
    }

    #[test]
    fn test_range_label() {
        let plan = UploadPlan::new(10, 4).unwrap();
        assert_eq!(plan.block(1).unwrap().label(), "4-8");
    }

    proptest! {
        #[test]
        fn prop_blocks_partition_file(file_size in 0u64..1_000_000, block_size in 1u64..70_000) {
            let plan = UploadPlan::new(file_size, block_size).unwrap();

            let mut cursor = 0u64;
            let mut total = 0u64;
            for (i, block) in plan.blocks().enumerate() {
                prop_assert_eq!(block.index, i);
                prop_assert_eq!(block.range.start, cursor);
                cursor = block.range.end;
                total += block.size();
            }
            prop_assert_eq!(cursor, file_size);
            prop_assert_eq!(total, file_size);
        }

        #[test]
        fn prop_block_count_is_ceiling(file_size in 1u64..1_000_000, block_size in 1u64..70_000) {
            let plan = UploadPlan::new(file_size, block_size).unwrap();
            let effective = block_size.min(file_size);
            prop_assert_eq!(plan.total_blocks as u64, (file_size + effective - 1) / effective);
            if file_size < block_size {
                prop_assert_eq!(plan.total_blocks, 1);
            }
            // 除最后一个分片外都是满分片
            for block in plan.blocks().take(plan.total_blocks - 1) {
                prop_assert_eq!(block.size(), effective);
            }
        }
    }
}
