// 上传引擎模块
//
// - chunk：分片规划与分片 ID
// - scheduler：有界并发执行器
// - crypto：分片加密与加密产物
// - task：共享上传状态、进度与结果
// - engine：上传协调器（调度、提交、结果落定）

pub mod chunk;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod scheduler;
pub mod task;

pub use chunk::{
    block_id, BlockRange, UploadPlan, BLOCK_ID_INDEX_WIDTH, DEFAULT_BLOCK_ID_PREFIX,
    DEFAULT_BLOCK_SIZE,
};
pub use crypto::{
    BlockArtifact, BlockCipher, EncryptedBlock, EncryptionArtifacts, UploadMode,
    ENCRYPTION_STRATEGY, KEY_LEN,
};
pub use engine::{UploadCallbacks, UploadCoordinator};
pub use error::UploadError;
pub use scheduler::{BoundedExecutor, DEFAULT_SIMULTANEOUS_UPLOADS};
pub use task::{BlockCompletion, ProgressEvent, UploadPhase, UploadResult, UploadState};
