// 上传状态定义
//
// UploadState 被所有并发分片任务共享，由 UploadCoordinator 持有并用互斥锁保护；
// 这里只放纯状态转换，不涉及 I/O

use super::chunk::UploadPlan;
use super::crypto::{BlockArtifact, EncryptionArtifacts};
use serde::{Deserialize, Serialize};

/// 上传阶段
///
/// `Planning → Uploading → {Committing → Succeeded} | Failed`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UploadPhase {
    /// 规划中
    Planning,
    /// 上传中
    Uploading,
    /// 提交分片列表中
    Committing,
    /// 已成功
    Succeeded,
    /// 已失败
    Failed,
}

impl UploadPhase {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadPhase::Succeeded | UploadPhase::Failed)
    }
}

/// 进度事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressEvent {
    /// 名义进度 `(index + 1) / total_blocks`
    ///
    /// 分片乱序完成时不保证单调，单调进度请看 `completed_blocks`
    pub progress: f64,
    /// 文件名
    pub file_name: String,
    /// 刚完成的分片索引
    pub block_index: usize,
    /// 已完成的分片数（单调递增）
    pub completed_blocks: usize,
    /// 分片总数
    pub total_blocks: usize,
}

/// 上传成功的结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadResult {
    /// 加密产物（仅加密上传时存在）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<EncryptionArtifacts>,
    /// 提交的分片 ID 列表（按提交顺序）
    pub block_ids: Vec<String>,
    /// 文件大小
    pub file_size: u64,
    /// 分片总数
    pub total_blocks: usize,
}

/// 分片完成后的状态变化
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockCompletion {
    /// 已完成的分片数
    pub completed_blocks: usize,
    /// 剩余字节数
    pub remaining_bytes: u64,
    /// 由本分片负责提交时，返回要提交的分片 ID 列表
    pub commit_block_ids: Option<Vec<String>>,
}

/// 上传共享状态
#[derive(Debug)]
pub struct UploadState {
    /// 剩余字节数（每完成一个分片减去分片大小，下限为 0）
    total_remaining_bytes: u64,
    /// 分片 ID 列表（只追加，按提交顺序）
    block_ids: Vec<String>,
    /// 已完成分片数
    completed_blocks: usize,
    /// 每个分片的加密产物（None 表示明文上传）
    artifacts: Option<Vec<Option<BlockArtifact>>>,
    /// 当前阶段
    phase: UploadPhase,
}

impl UploadState {
    /// 根据上传计划初始化状态
    pub fn new(plan: &UploadPlan, encrypted: bool) -> Self {
        Self {
            total_remaining_bytes: plan.file_size,
            block_ids: Vec::with_capacity(plan.total_blocks),
            completed_blocks: 0,
            artifacts: encrypted.then(|| vec![None; plan.total_blocks]),
            phase: UploadPhase::Planning,
        }
    }

    pub fn phase(&self) -> UploadPhase {
        self.phase
    }

    pub fn is_settled(&self) -> bool {
        self.phase.is_terminal()
    }

    /// 进入上传阶段
    pub fn begin(&mut self) {
        if self.phase == UploadPhase::Planning {
            self.phase = UploadPhase::Uploading;
        }
    }

    /// 追加分片 ID
    pub fn push_block_id(&mut self, block_id: String) {
        self.block_ids.push(block_id);
    }

    /// 记录分片加密产物
    ///
    /// 每个索引只能写一次；索引越界、重复写或明文上传时返回 false
    pub fn record_artifact(&mut self, index: usize, artifact: BlockArtifact) -> bool {
        match self.artifacts.as_mut().and_then(|a| a.get_mut(index)) {
            Some(slot) if slot.is_none() => {
                *slot = Some(artifact);
                true
            }
            _ => false,
        }
    }

    /// 标记一个分片上传完成
    ///
    /// 剩余字节数减到 0 且仍处于上传阶段时，状态进入提交阶段，
    /// 只有这一次调用会拿到要提交的分片列表
    pub fn complete_block(&mut self, block_size: u64) -> BlockCompletion {
        self.total_remaining_bytes = self.total_remaining_bytes.saturating_sub(block_size);
        self.completed_blocks += 1;

        let commit_block_ids =
            if self.total_remaining_bytes == 0 && self.phase == UploadPhase::Uploading {
                self.phase = UploadPhase::Committing;
                Some(self.block_ids.clone())
            } else {
                None
            };

        BlockCompletion {
            completed_blocks: self.completed_blocks,
            remaining_bytes: self.total_remaining_bytes,
            commit_block_ids,
        }
    }

    /// 汇总加密产物
    pub fn encryption_artifacts(&self) -> Option<EncryptionArtifacts> {
        self.artifacts
            .as_deref()
            .map(EncryptionArtifacts::from_blocks)
    }

    /// 进入成功终态（只能从提交阶段进入）
    pub fn mark_succeeded(&mut self) -> bool {
        if self.phase == UploadPhase::Committing {
            self.phase = UploadPhase::Succeeded;
            true
        } else {
            false
        }
    }

    /// 进入失败终态（任何非终态都可进入）
    pub fn mark_failed(&mut self) -> bool {
        if self.phase.is_terminal() {
            false
        } else {
            self.phase = UploadPhase::Failed;
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(range: &str) -> BlockArtifact {
        BlockArtifact {
            iv: "iv".to_string(),
            auth_tag: "at".to_string(),
            range: range.to_string(),
        }
    }

    #[test]
    fn test_commit_fires_once_on_last_block() {
        let plan = UploadPlan::new(10, 4).unwrap();
        let mut state = UploadState::new(&plan, false);
        state.begin();
        for i in 0..3 {
            state.push_block_id(format!("id{}", i));
        }

        let first = state.complete_block(plan.block_size);
        assert_eq!(first.remaining_bytes, 6);
        assert!(first.commit_block_ids.is_none());

        let second = state.complete_block(plan.block_size);
        assert_eq!(second.remaining_bytes, 2);
        assert!(second.commit_block_ids.is_none());

        let third = state.complete_block(plan.block_size);
        assert_eq!(third.remaining_bytes, 0);
        assert_eq!(third.completed_blocks, 3);
        assert_eq!(
            third.commit_block_ids,
            Some(vec!["id0".to_string(), "id1".to_string(), "id2".to_string()])
        );
        assert_eq!(state.phase(), UploadPhase::Committing);

        // 之后再完成不会再次触发提交
        let extra = state.complete_block(plan.block_size);
        assert_eq!(extra.remaining_bytes, 0);
        assert!(extra.commit_block_ids.is_none());
    }

    #[test]
    fn test_empty_file_commits_after_single_block() {
        let plan = UploadPlan::new(0, 4).unwrap();
        let mut state = UploadState::new(&plan, false);
        state.begin();
        state.push_block_id("id0".to_string());

        let completion = state.complete_block(plan.block_size);
        assert_eq!(completion.commit_block_ids, Some(vec!["id0".to_string()]));
    }

    #[test]
    fn test_failed_is_terminal() {
        let plan = UploadPlan::new(8, 4).unwrap();
        let mut state = UploadState::new(&plan, false);
        state.begin();
        state.push_block_id("a".to_string());
        state.push_block_id("b".to_string());

        assert!(state.mark_failed());
        assert!(!state.mark_failed());
        assert!(state.is_settled());

        // 失败后即使剩余字节减到 0 也不会进入提交
        state.complete_block(4);
        let last = state.complete_block(4);
        assert!(last.commit_block_ids.is_none());
        assert!(!state.mark_succeeded());
        assert_eq!(state.phase(), UploadPhase::Failed);
    }

    #[test]
    fn test_succeeded_only_from_committing() {
        let plan = UploadPlan::new(4, 4).unwrap();
        let mut state = UploadState::new(&plan, false);
        state.begin();
        assert!(!state.mark_succeeded());

        state.push_block_id("a".to_string());
        state.complete_block(4);
        assert!(state.mark_succeeded());
        assert!(!state.mark_failed());
        assert_eq!(state.phase(), UploadPhase::Succeeded);
    }

    #[test]
    fn test_record_artifact_once_per_index() {
        let plan = UploadPlan::new(8, 4).unwrap();
        let mut state = UploadState::new(&plan, true);

        assert!(state.record_artifact(1, artifact("4-8")));
        assert!(!state.record_artifact(1, artifact("4-8")));
        assert!(!state.record_artifact(5, artifact("x")));

        let artifacts = state.encryption_artifacts().unwrap();
        assert_eq!(artifacts.range, vec![String::new(), "4-8".to_string()]);
    }

    #[test]
    fn test_plain_upload_has_no_artifacts() {
        let plan = UploadPlan::new(8, 4).unwrap();
        let mut state = UploadState::new(&plan, false);
        assert!(!state.record_artifact(0, artifact("0-4")));
        assert!(state.encryption_artifacts().is_none());
    }
}
