// 上传错误分类
//
// 配置错误在构造阶段同步返回；分片级错误（读取、加密、传输、提交）
// 在任务边界被捕获，只有第一个错误会被上报

use thiserror::Error;

/// 上传错误
///
/// 负载统一使用字符串，便于同一个错误既交给 `on_error` 回调又作为结果返回
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    /// 构造参数无效（URL、分片大小、并发数等）
    #[error("配置无效: {0}")]
    InvalidConfiguration(String),

    /// 读取分片字节失败
    #[error("读取分片 #{index} 失败: {message}")]
    ReadFailure { index: usize, message: String },

    /// 加密失败（密钥格式错误或加密原语拒绝输入）
    #[error("加密失败: {0}")]
    EncryptionFailure(String),

    /// 单个分片上传失败
    #[error("上传分片 #{index} 失败: {message}")]
    TransferFailure { index: usize, message: String },

    /// 提交分片列表失败
    #[error("提交分片列表失败: {0}")]
    CommitFailure(String),

    /// 上传被取消
    #[error("上传已取消")]
    Cancelled,

    /// 所有任务结束但上传未落定（例如任务 panic）
    #[error("上传中断: {0}")]
    Interrupted(String),
}

impl UploadError {
    /// 出错分片的索引（仅分片级错误有）
    pub fn block_index(&self) -> Option<usize> {
        match self {
            UploadError::ReadFailure { index, .. } | UploadError::TransferFailure { index, .. } => {
                Some(*index)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_index() {
        let err = UploadError::TransferFailure {
            index: 7,
            message: "503".to_string(),
        };
        assert_eq!(err.block_index(), Some(7));
        assert_eq!(UploadError::Cancelled.block_index(), None);
        assert_eq!(
            UploadError::CommitFailure("x".to_string()).block_index(),
            None
        );
    }

    #[test]
    fn test_display_contains_index() {
        let err = UploadError::ReadFailure {
            index: 3,
            message: "eof".to_string(),
        };
        assert!(err.to_string().contains("#3"));
        assert!(err.to_string().contains("eof"));
    }
}
