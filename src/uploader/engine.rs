// 上传引擎
//
// 核心流程：
// 1. 构造时校验配置并生成上传计划（任何 I/O 之前失败）
// 2. 每个分片提交一个任务到有界执行器
// 3. 任务内：读取分片 → 可选加密 → 上传 → 更新共享状态 → 进度回调
// 4. 剩余字节数归零的任务负责一次性提交分片列表
// 5. 第一个错误使上传失败，之后的成功或错误都不再改变结果
//
// 共享状态和结果发送端放在同一把锁里，保证结果只落定一次

use crate::blob::{BlockSource, BlockStore};
use crate::config::UploadOptions;
use crate::uploader::{
    block_id, BlockArtifact, BlockRange, BoundedExecutor, ProgressEvent, UploadError, UploadMode,
    UploadPlan, UploadResult, UploadState,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 进度回调
pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;
/// 成功回调
pub type SuccessCallback = Arc<dyn Fn(&UploadResult) + Send + Sync>;
/// 失败回调
pub type ErrorCallback = Arc<dyn Fn(&UploadError) + Send + Sync>;

/// 上传回调
///
/// 成功和失败回调在整个上传过程中最多触发一次，且二者互斥
#[derive(Clone, Default)]
pub struct UploadCallbacks {
    pub on_progress: Option<ProgressCallback>,
    pub on_success: Option<SuccessCallback>,
    pub on_error: Option<ErrorCallback>,
}

impl UploadCallbacks {
    pub fn on_progress(mut self, f: impl Fn(&ProgressEvent) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(f));
        self
    }

    pub fn on_success(mut self, f: impl Fn(&UploadResult) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&UploadError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    fn notify_error(&self, err: &UploadError) {
        if let Some(cb) = &self.on_error {
            cb(err);
        }
    }
}

impl std::fmt::Debug for UploadCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadCallbacks")
            .field("on_progress", &self.on_progress.is_some())
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// 校验目标 URL
fn validate_url(url: &str) -> Result<(), UploadError> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| UploadError::InvalidConfiguration(format!("URL 无效: {}: {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(UploadError::InvalidConfiguration(format!(
            "不支持的 URL 协议: {}",
            other
        ))),
    }
}

/// 上传协调器
///
/// 负责单个文件的分片上传：
/// - 分片规划
/// - 有界并发调度
/// - 可选的分片加密
/// - 一次性提交分片列表
pub struct UploadCoordinator {
    /// 目标 blob 地址
    url: String,
    /// 待上传文件
    source: Arc<dyn BlockSource>,
    /// 分片存储服务
    store: Arc<dyn BlockStore>,
    /// 上传选项
    options: UploadOptions,
    /// 上传计划
    plan: UploadPlan,
    /// 回调
    callbacks: UploadCallbacks,
    /// 取消令牌
    cancel_token: CancellationToken,
}

impl UploadCoordinator {
    /// 创建上传协调器
    ///
    /// 配置错误在这里同步返回
    pub fn new(
        url: &str,
        source: Arc<dyn BlockSource>,
        store: Arc<dyn BlockStore>,
        options: UploadOptions,
    ) -> Result<Self, UploadError> {
        validate_url(url)?;
        options.validate()?;
        let plan = UploadPlan::new(source.size(), options.block_size)?;

        Ok(Self {
            url: url.to_string(),
            source,
            store,
            options,
            plan,
            callbacks: UploadCallbacks::default(),
            cancel_token: CancellationToken::new(),
        })
    }

    /// 设置回调
    pub fn with_callbacks(mut self, callbacks: UploadCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// 上传计划
    pub fn plan(&self) -> &UploadPlan {
        &self.plan
    }

    /// 取消令牌
    ///
    /// 取消后不再调度新分片，正在上传的分片会继续完成
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// 开始上传
    ///
    /// 提供密钥时每个分片加密后上传。返回值只落定一次：
    /// 成功时带上加密产物，失败时为遇到的第一个错误
    pub async fn start(self, key: Option<&[u8]>) -> Result<UploadResult, UploadError> {
        let mode = match UploadMode::from_key(key) {
            Ok(mode) => mode,
            Err(e) => {
                error!("上传失败: {}", e);
                self.callbacks.notify_error(&e);
                return Err(e);
            }
        };

        info!(
            "开始上传: file={}, size={} bytes, 分片大小={} bytes, 分片数量={}, 并发数={}, 加密={}",
            self.source.name(),
            self.plan.file_size,
            self.plan.block_size,
            self.plan.total_blocks,
            self.options.simultaneous_uploads,
            mode.is_encrypted()
        );

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let mut state = UploadState::new(&self.plan, mode.is_encrypted());
        state.begin();

        let fallback_callbacks = self.callbacks.clone();
        let ctx = Arc::new(UploadContext {
            file_name: self.source.name().to_string(),
            url: self.url,
            source: self.source,
            store: self.store,
            plan: self.plan,
            mode,
            content_type: self.options.content_type.clone(),
            callbacks: self.callbacks,
            cancel_token: self.cancel_token,
            inner: Mutex::new(UploadInner {
                state,
                outcome_tx: Some(outcome_tx),
            }),
        });

        match BoundedExecutor::new(self.options.simultaneous_uploads) {
            Ok(executor) => {
                submit_blocks(&ctx, &executor, &self.options.block_id_prefix);
                // 不等待正在上传的分片，结果落定即返回
                executor.close();
            }
            Err(e) => ctx.fail(e),
        }

        // 释放本地引用，任务全部结束而未落定时发送端随之释放
        drop(ctx);

        match outcome_rx.await {
            Ok(outcome) => outcome,
            Err(_) => {
                let e = UploadError::Interrupted("所有分片任务已结束，但上传未完成".to_string());
                error!("上传失败: {}", e);
                fallback_callbacks.notify_error(&e);
                Err(e)
            }
        }
    }
}

/// 按索引顺序提交所有分片任务
///
/// 分片 ID 在提交时追加，所以提交的分片列表与提交顺序一致
fn submit_blocks(ctx: &Arc<UploadContext>, executor: &BoundedExecutor, prefix: &str) {
    for block in ctx.plan.blocks() {
        if ctx.cancel_token.is_cancelled() {
            ctx.fail(UploadError::Cancelled);
            return;
        }

        let id = block_id(prefix, block.index);
        {
            let mut inner = ctx.inner.lock();
            if inner.state.is_settled() {
                debug!("上传已结束，停止调度剩余分片 (从分片#{}开始)", block.index);
                return;
            }
            inner.state.push_block_id(id.clone());
        }

        if let Err(e) = executor.submit(run_block_job(ctx.clone(), block, id)) {
            ctx.fail(e);
            return;
        }
    }
}

/// 受锁保护的可变部分
struct UploadInner {
    state: UploadState,
    outcome_tx: Option<oneshot::Sender<Result<UploadResult, UploadError>>>,
}

/// 所有分片任务共享的上下文
struct UploadContext {
    url: String,
    file_name: String,
    source: Arc<dyn BlockSource>,
    store: Arc<dyn BlockStore>,
    plan: UploadPlan,
    mode: UploadMode,
    content_type: String,
    callbacks: UploadCallbacks,
    cancel_token: CancellationToken,
    inner: Mutex<UploadInner>,
}

impl UploadContext {
    fn is_settled(&self) -> bool {
        self.inner.lock().state.is_settled()
    }

    /// 读取、加密（可选）并上传一个分片
    async fn transfer_block(&self, block: &BlockRange, block_id: &str) -> Result<(), UploadError> {
        let data = self
            .source
            .read_range(block.range.clone())
            .await
            .map_err(|e| UploadError::ReadFailure {
                index: block.index,
                message: format!("{:#}", e),
            })?;

        if data.len() as u64 != block.size() {
            return Err(UploadError::ReadFailure {
                index: block.index,
                message: format!("期望 {} 字节，实际读取 {} 字节", block.size(), data.len()),
            });
        }

        let payload = match &self.mode {
            UploadMode::Plain => data,
            UploadMode::Encrypted(cipher) => {
                let cipher = cipher.clone();
                let encrypted = tokio::task::spawn_blocking(move || cipher.encrypt_block(data))
                    .await
                    .map_err(|e| UploadError::EncryptionFailure(format!("加密任务异常: {}", e)))??;

                let artifact = BlockArtifact::new(block, &encrypted);
                let recorded = self.inner.lock().state.record_artifact(block.index, artifact);
                if !recorded {
                    warn!("[分片#{}] 加密产物已存在，忽略重复记录", block.index);
                }
                encrypted.ciphertext
            }
        };

        self.store
            .put_block(&self.url, block_id, payload)
            .await
            .map_err(|e| UploadError::TransferFailure {
                index: block.index,
                message: format!("{:#}", e),
            })
    }

    /// 分片上传成功后更新状态，必要时提交分片列表
    async fn finish_block(&self, block: &BlockRange) {
        let completion = {
            let mut inner = self.inner.lock();
            if inner.state.is_settled() {
                debug!("[分片#{}] 上传已结束，忽略完成事件", block.index);
                return;
            }
            inner.state.complete_block(self.plan.block_size)
        };

        let event = ProgressEvent {
            progress: (block.index + 1) as f64 / self.plan.total_blocks as f64,
            file_name: self.file_name.clone(),
            block_index: block.index,
            completed_blocks: completion.completed_blocks,
            total_blocks: self.plan.total_blocks,
        };

        debug!(
            "[分片#{}] ✓ 上传成功 ({}/{} 完成, 剩余 {} bytes)",
            block.index, completion.completed_blocks, self.plan.total_blocks, completion.remaining_bytes
        );

        if let Some(cb) = &self.callbacks.on_progress {
            cb(&event);
        }

        if let Some(block_ids) = completion.commit_block_ids {
            self.commit(block_ids).await;
        }
    }

    /// 提交分片列表（每次上传只会执行一次）
    async fn commit(&self, block_ids: Vec<String>) {
        info!(
            "所有分片上传完成，提交分片列表: file={}, 分片数量={}",
            self.file_name,
            block_ids.len()
        );

        match self
            .store
            .put_block_list(&self.url, &block_ids, &self.content_type)
            .await
        {
            Ok(()) => {
                let artifacts = self.inner.lock().state.encryption_artifacts();
                self.succeed(UploadResult {
                    artifacts,
                    block_ids,
                    file_size: self.plan.file_size,
                    total_blocks: self.plan.total_blocks,
                });
            }
            Err(e) => self.fail(UploadError::CommitFailure(format!("{:#}", e))),
        }
    }

    fn succeed(&self, result: UploadResult) {
        let tx = {
            let mut inner = self.inner.lock();
            if !inner.state.mark_succeeded() {
                return;
            }
            inner.outcome_tx.take()
        };

        info!("上传完成: file={}", self.file_name);

        if let Some(cb) = &self.callbacks.on_success {
            cb(&result);
        }
        if let Some(tx) = tx {
            let _ = tx.send(Ok(result));
        }
    }

    fn fail(&self, err: UploadError) {
        let tx = {
            let mut inner = self.inner.lock();
            if !inner.state.mark_failed() {
                debug!(
                    "上传已结束 (阶段: {:?})，忽略后续错误: {}",
                    inner.state.phase(),
                    err
                );
                return;
            }
            inner.outcome_tx.take()
        };

        match err.block_index() {
            Some(index) => error!(
                "上传失败: file={}, 分片#{}, 错误: {}",
                self.file_name, index, err
            ),
            None => error!("上传失败: file={}, 错误: {}", self.file_name, err),
        }

        self.callbacks.notify_error(&err);
        if let Some(tx) = tx {
            let _ = tx.send(Err(err));
        }
    }
}

/// 单个分片任务
async fn run_block_job(ctx: Arc<UploadContext>, block: BlockRange, block_id: String) {
    if ctx.is_settled() {
        debug!("[分片#{}] 上传已结束，跳过", block.index);
        return;
    }
    if ctx.cancel_token.is_cancelled() {
        ctx.fail(UploadError::Cancelled);
        return;
    }

    debug!(
        "[分片#{}] 开始上传 (范围: {}-{}, 大小: {} bytes)",
        block.index,
        block.range.start,
        block.range.end,
        block.size()
    );

    match ctx.transfer_block(&block, &block_id).await {
        Ok(()) => ctx.finish_block(&block).await,
        Err(e) => ctx.fail(e),
    }
}
