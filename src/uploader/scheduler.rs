// 有界并发执行器
//
// 固定数量的工作线程从同一个队列拉取任务：
// - 同一时刻最多 capacity 个任务在执行
// - 多余任务按提交顺序排队（FIFO）
// - 单个任务失败不会取消其它任务，失败如何传播由调用方决定

use super::error::UploadError;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// 默认并发数
pub const DEFAULT_SIMULTANEOUS_UPLOADS: usize = 3;

type BoxedJob = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// 有界并发执行器
#[derive(Debug)]
pub struct BoundedExecutor {
    /// 任务发送端（关闭后工作线程在清空队列后退出）
    sender: mpsc::UnboundedSender<BoxedJob>,
    /// 工作线程句柄
    workers: Vec<JoinHandle<()>>,
    /// 正在执行的任务数
    running: Arc<AtomicUsize>,
    /// 已排队未开始的任务数
    queued: Arc<AtomicUsize>,
    /// 最大并发数
    capacity: usize,
}

impl BoundedExecutor {
    /// 创建执行器并启动 capacity 个工作线程
    ///
    /// 必须在 tokio 运行时内调用
    pub fn new(capacity: usize) -> Result<Self, UploadError> {
        if capacity == 0 {
            return Err(UploadError::InvalidConfiguration(
                "并发数必须大于 0".to_string(),
            ));
        }

        let (sender, receiver) = mpsc::unbounded_channel::<BoxedJob>();
        // 所有工作线程共享同一个接收端，Mutex 保证按提交顺序取任务
        let receiver = Arc::new(Mutex::new(receiver));
        let running = Arc::new(AtomicUsize::new(0));
        let queued = Arc::new(AtomicUsize::new(0));

        let workers = (1..=capacity)
            .map(|worker_id| {
                let receiver = receiver.clone();
                let running = running.clone();
                let queued = queued.clone();
                tokio::spawn(async move {
                    loop {
                        let job = {
                            let mut rx = receiver.lock().await;
                            rx.recv().await
                        };
                        let Some(job) = job else {
                            debug!("[工作线程#{}] 队列已关闭，退出", worker_id);
                            break;
                        };

                        queued.fetch_sub(1, Ordering::SeqCst);
                        running.fetch_add(1, Ordering::SeqCst);
                        // 每个任务单独 spawn，任务 panic 不影响工作线程
                        if let Err(e) = tokio::spawn(job).await {
                            if e.is_panic() {
                                error!("[工作线程#{}] 任务 panic: {}", worker_id, e);
                            } else {
                                warn!("[工作线程#{}] 任务被取消: {}", worker_id, e);
                            }
                        }
                        running.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        debug!("创建有界执行器: 并发数={}", capacity);

        Ok(Self {
            sender,
            workers,
            running,
            queued,
            capacity,
        })
    }

    /// 提交任务
    ///
    /// 只入队不等待；工作线程全部退出时返回错误
    pub fn submit<F>(&self, job: F) -> Result<(), UploadError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.queued.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(Box::pin(job)).is_err() {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            warn!("执行器已无可用工作线程，任务被拒绝");
            return Err(UploadError::Interrupted(
                "执行器工作线程已全部退出".to_string(),
            ));
        }
        Ok(())
    }

    /// 最大并发数
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 正在执行的任务数
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// 排队中的任务数
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// 关闭队列，不等待
    ///
    /// 已排队的任务仍会被执行，工作线程在队列清空后自行退出；
    /// 工作线程句柄随之分离，退出情况只记录在工作线程日志里
    pub fn close(self) {
        debug!(
            "执行器队列已关闭: 分离 {} 个工作线程, 排队任务={}",
            self.workers.len(),
            self.queued()
        );
        drop(self.sender);
    }

    /// 关闭队列并等待所有已提交任务执行完毕
    pub async fn join(self) {
        drop(self.sender);
        for worker in self.workers {
            if let Err(e) = worker.await {
                warn!("工作线程异常退出: {}", e);
            }
        }
    }
}
