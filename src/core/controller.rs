//! 执行控制器：在后台任务中运行回合引擎
//!
//! 负责：启动 / 停止 / 暂停 / 恢复、经 mpsc 通道转发事件、保证每次运行以 worker_finished 结束。
//! 回合引擎在内层任务中运行，外层任务把它的事件带上运行代号转发到共享通道，再等待其 JoinHandle：
//! 返回错误或 panic 都转为 error 事件，之后先清除运行标志再发送 worker_finished。
//! get_event 只交付当前代号的事件，新运行开始后上一次运行的残留事件被丢弃。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::config::AgentConfig;
use crate::core::{AgentError, ControlSignals, ControllerError, RunControl};
use crate::llm::{create_deepseek_client, LlmClient, OpenAiClient};
use crate::react::{run_agent, AgentEvent, EventSink, RunOutcome};
use crate::tools::executor::panic_message;
use crate::tools::ToolRegistry;

/// 按运行配置创建 LLM 客户端（未指定 base_url 时使用 DeepSeek）
pub(crate) fn create_llm_from_config(config: &AgentConfig) -> Result<Arc<dyn LlmClient>, AgentError> {
    let api_key = config.resolve_api_key().ok_or_else(|| {
        AgentError::ConfigError(format!(
            "no API key: set {} or llm.api_key in config",
            config.api_key_env_vars().join(" / ")
        ))
    })?;
    let timeout = config.request_timeout_secs;
    let client = match config.base_url.as_deref() {
        Some(base_url) if !config.uses_deepseek() => {
            tracing::info!(base_url, model = %config.model, "using OpenAI-compatible LLM");
            OpenAiClient::new(Some(base_url), Some(&api_key), timeout)?
        }
        _ => {
            tracing::info!(model = %config.model, "using DeepSeek LLM");
            create_deepseek_client(Some(&api_key), timeout)?
        }
    };
    Ok(Arc::new(client))
}

async fn run_worker(
    query: String,
    config: AgentConfig,
    llm: Option<Arc<dyn LlmClient>>,
    tools: Arc<ToolRegistry>,
    control: RunControl,
    events: EventSink,
) -> Result<RunOutcome, AgentError> {
    let llm = match llm {
        Some(llm) => llm,
        None => create_llm_from_config(&config)?,
    };
    run_agent(&query, &config, llm.as_ref(), &tools, control, &events).await
}

/// 带运行代号的事件
type Tagged = (u64, AgentEvent);

/// Agent 控制器：同一时刻至多一个运行
pub struct AgentController {
    tools: Arc<ToolRegistry>,
    llm: Option<Arc<dyn LlmClient>>,
    event_tx: UnboundedSender<Tagged>,
    event_rx: tokio::sync::Mutex<UnboundedReceiver<Tagged>>,
    running: Arc<AtomicBool>,
    generation: AtomicU64,
    signals: Mutex<ControlSignals>,
}

impl AgentController {
    pub fn new(tools: ToolRegistry) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            tools: Arc::new(tools),
            llm: None,
            event_tx,
            event_rx: tokio::sync::Mutex::new(event_rx),
            running: Arc::new(AtomicBool::new(false)),
            generation: AtomicU64::new(0),
            signals: Mutex::new(ControlSignals::new()),
        }
    }

    /// 固定使用给定客户端（测试与离线运行）
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    fn signals(&self) -> MutexGuard<'_, ControlSignals> {
        self.signals.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 启动一次运行；已有运行时返回 AlreadyRunning 且不改变任何状态
    ///
    /// 需在 tokio 运行时内调用。
    pub fn start(&self, query: impl Into<String>, config: AgentConfig) -> Result<(), ControllerError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ControllerError::AlreadyRunning);
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let control = {
            let mut signals = self.signals();
            signals.reset();
            signals.run_control()
        };

        let query = query.into();
        let tools = self.tools.clone();
        let llm = self.llm.clone();
        let tx = self.event_tx.clone();
        let running = self.running.clone();

        tracing::info!(query = %query, generation, "agent started");
        tokio::spawn(async move {
            let (run_tx, mut run_rx) = mpsc::unbounded_channel();
            let events = EventSink::new(run_tx);
            let inner = tokio::spawn(run_worker(query, config, llm, tools, control, events));
            // 内层任务结束（含 panic）后发送端随之释放，转发循环退出
            while let Some(event) = run_rx.recv().await {
                let _ = tx.send((generation, event));
            }
            let failure = match inner.await {
                Ok(Ok(outcome)) => {
                    tracing::info!(
                        total_input = outcome.usage().total_input,
                        total_output = outcome.usage().total_output,
                        "agent finished"
                    );
                    None
                }
                Ok(Err(e)) => {
                    let message = e.to_string();
                    let trace = format!("{:?}", anyhow::Error::new(e));
                    Some(AgentEvent::Error { message, trace })
                }
                Err(join) if join.is_panic() => {
                    let message = panic_message(join.into_panic().as_ref());
                    let trace = format!("worker panicked: {message}");
                    Some(AgentEvent::Error { message, trace })
                }
                Err(join) => Some(AgentEvent::Error {
                    message: "worker cancelled".to_string(),
                    trace: join.to_string(),
                }),
            };
            if let Some(event) = failure {
                if let AgentEvent::Error { message, .. } = &event {
                    tracing::error!(error = %message, "agent failed");
                }
                let _ = tx.send((generation, event));
            }
            running.store(false, Ordering::SeqCst);
            let _ = tx.send((generation, AgentEvent::WorkerFinished));
        });
        Ok(())
    }

    /// 锁存停止并解除暂停；在下一回合开始前生效
    pub fn stop(&self) {
        self.signals().stop();
    }

    /// 暂停；当前回合结束后在下一回合开始前生效
    pub fn pause(&self) {
        self.signals().set_paused(true);
    }

    pub fn resume(&self) {
        self.signals().set_paused(false);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.signals().is_paused()
    }

    /// 取下一个事件；block 为 false 时立即返回，否则最多等待 timeout（None 表示一直等）
    ///
    /// 非阻塞调用在其他调用方持有接收端时直接返回 None。
    pub async fn get_event(&self, block: bool, timeout: Option<Duration>) -> Option<AgentEvent> {
        if !block {
            let mut rx = self.event_rx.try_lock().ok()?;
            while let Ok((generation, event)) = rx.try_recv() {
                if self.is_current(generation) {
                    return Some(event);
                }
            }
            return None;
        }
        match timeout {
            Some(d) => tokio::time::timeout(d, self.next_current()).await.ok().flatten(),
            None => self.next_current().await,
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        generation == self.generation.load(Ordering::SeqCst)
    }

    /// 阻塞等待当前运行的下一个事件，跳过旧运行的残留事件
    async fn next_current(&self) -> Option<AgentEvent> {
        let mut rx = self.event_rx.lock().await;
        loop {
            let (generation, event) = rx.recv().await?;
            if self.is_current(generation) {
                return Some(event);
            }
            tracing::debug!(generation, kind = event.kind(), "dropped stale event");
        }
    }
}
