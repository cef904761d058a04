//! 运行控制信号：停止（一次性锁存）与暂停（可切换）
//!
//! Controller 持有 ControlSignals 并在每次 start 时重置；工作任务只拿到只读的 RunControl，
//! 在每个回合开始前调用 should_stop：暂停期间在此等待，之后返回停止标志。

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// 控制端：停止令牌 + 暂停开关
#[derive(Debug)]
pub struct ControlSignals {
    cancel: CancellationToken,
    pause_tx: watch::Sender<bool>,
}

impl ControlSignals {
    pub fn new() -> Self {
        let (pause_tx, _) = watch::channel(false);
        Self {
            cancel: CancellationToken::new(),
            pause_tx,
        }
    }

    /// 新运行开始前重置：新的停止令牌，清除暂停
    pub fn reset(&mut self) {
        self.cancel = CancellationToken::new();
        self.pause_tx.send_replace(false);
    }

    /// 锁存停止并解除暂停，使 should_stop 尽快返回
    pub fn stop(&self) {
        self.cancel.cancel();
        self.pause_tx.send_replace(false);
    }

    pub fn set_paused(&self, paused: bool) {
        self.pause_tx.send_replace(paused);
    }

    pub fn is_paused(&self) -> bool {
        *self.pause_tx.borrow()
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 交给工作任务的只读视图
    pub fn run_control(&self) -> RunControl {
        RunControl {
            cancel: self.cancel.clone(),
            pause_rx: Some(self.pause_tx.subscribe()),
        }
    }
}

impl Default for ControlSignals {
    fn default() -> Self {
        Self::new()
    }
}

/// 工作任务侧的取消上下文
#[derive(Debug, Clone)]
pub struct RunControl {
    cancel: CancellationToken,
    pause_rx: Option<watch::Receiver<bool>>,
}

impl RunControl {
    /// 不会暂停的上下文，仅响应给定令牌（直接调用回合引擎时使用）
    pub fn from_token(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            pause_rx: None,
        }
    }

    /// 永不停止
    pub fn never() -> Self {
        Self::from_token(CancellationToken::new())
    }

    /// 先等待暂停解除（或收到停止），再返回停止标志
    pub async fn should_stop(&mut self) -> bool {
        if let Some(rx) = self.pause_rx.as_mut() {
            let resumed = async {
                while *rx.borrow_and_update() {
                    if rx.changed().await.is_err() {
                        tracing::debug!("pause channel closed");
                        break;
                    }
                }
            };
            tokio::select! {
                _ = resumed => {}
                _ = self.cancel.cancelled() => {}
            }
        }
        self.cancel.is_cancelled()
    }
}
