//! 调度队列与节流循环
//!
//! 内联排空和后台 worker 共用 [`Monitor::drain`]，区别只在调用方。
//!
//! # 同步模型
//!
//! 一个监视器：`parking_lot::Mutex<QueueState>` + 两个条件变量。
//!
//! - `work`: 队列非空 / 已关闭 / 队列被清空，唤醒 worker 和节流等待
//! - `idle`: 一次排空结束（或 clear / close / 失败），唤醒 `flush` 等待者
//!
//! 所有等待都用显式谓词循环，不依赖"事件"的锁存语义。

use crate::DriverError;
use crate::metrics::DispatchMetrics;
use crate::mode::DispatchMode;
use parking_lot::{Condvar, Mutex, MutexGuard};
use smallvec::SmallVec;
use somfy_protocol::{EncodedCommand, ProtocolVersion};
use somfy_transport::{Transport, TransportError};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// 默认发送间隔（控制器要求的最小命令间隔）
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1500);

/// 单次 `enqueue` 的命令缓冲
///
/// V2 控制器最多 16 个通道，栈上预留 16 个位置，一次全通道调用不分配堆内存。
pub(crate) type CommandBuffer = SmallVec<[EncodedCommand; 16]>;

/// 调度器配置
///
/// # Example
///
/// ```
/// use somfy_driver::{DispatchMode, DispatcherConfig};
/// use somfy_protocol::ProtocolVersion;
/// use std::time::Duration;
///
/// // 默认：1.5s 间隔，V1 协议，内联模式
/// let config = DispatcherConfig::default();
/// assert_eq!(config.interval, Duration::from_millis(1500));
///
/// let config = DispatcherConfig {
///     interval: Duration::from_millis(250),
///     version: ProtocolVersion::V2,
///     mode: DispatchMode::Worker,
/// };
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// 两次写入开始之间的最小间隔
    pub interval: Duration,
    /// 协议版本（决定编码格式和通道上限）
    pub version: ProtocolVersion,
    /// 调度模式
    pub mode: DispatchMode,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            version: ProtocolVersion::V1,
            mode: DispatchMode::Inline,
        }
    }
}

impl DispatcherConfig {
    /// 以秒为单位设置间隔
    ///
    /// # 错误
    /// - `DriverError::InvalidInterval`: 负数、NaN、无穷大
    pub fn with_interval_secs(mut self, secs: f64) -> Result<Self, DriverError> {
        self.interval = interval_from_secs(secs)?;
        Ok(self)
    }
}

/// 秒数转换为间隔
pub fn interval_from_secs(secs: f64) -> Result<Duration, DriverError> {
    Duration::try_from_secs_f64(secs).map_err(|_| DriverError::InvalidInterval(secs))
}

/// 受互斥锁保护的全部调度状态
pub(crate) struct QueueState {
    /// 待发送命令（FIFO）
    pub(crate) queue: VecDeque<EncodedCommand>,
    /// 上次成功写入的时间，`None` 表示从未发送（首条命令不等待）
    pub(crate) last_send: Option<Instant>,
    /// 单向锁存：置位后不再接受命令，也不再写入
    pub(crate) closed: bool,
    /// 排空已完成且此后没有新命令入队
    pub(crate) idle: bool,
    /// 正在有一个排空循环运行
    pub(crate) draining: bool,
    /// worker 因传输错误退出时的错误信息
    pub(crate) failure: Option<String>,
    /// 传输，`close()` 时取出
    pub(crate) transport: Option<Box<dyn Transport>>,
    /// 入队命令的累计序号（最后一条命令的序号）
    pub(crate) enqueued_seq: u64,
    /// 正在等待其他线程排空的内联调用方数量
    pub(crate) inline_waiters: usize,
    /// 有内联等待者期间，因传输失败被丢弃的命令区间
    pub(crate) lost: Vec<LostCommands>,
}

impl QueueState {
    /// 追加命令，返回最后一条命令的序号
    pub(crate) fn push(&mut self, commands: impl IntoIterator<Item = EncodedCommand>) -> u64 {
        for command in commands {
            self.queue.push_back(command);
            self.enqueued_seq += 1;
        }
        self.idle = false;
        self.enqueued_seq
    }

    /// 队首命令的序号
    ///
    /// 队列总是已入队序号的连续后缀（只从队首弹出或整体清空）。
    fn front_seq(&self) -> u64 {
        self.enqueued_seq + 1 - self.queue.len() as u64
    }
}

/// 一次传输失败丢弃的命令序号区间（闭区间）
#[derive(Debug, Clone)]
pub(crate) struct LostCommands {
    first: u64,
    last: u64,
    message: String,
}

/// 排空结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DrainOutcome {
    /// 队列已空，继续运行
    Drained,
    /// 观察到关闭，停止
    Closed,
}

/// 调度监视器（队列状态 + 条件变量 + 节流参数）
pub(crate) struct Monitor {
    pub(crate) state: Mutex<QueueState>,
    /// 有新工作或状态变化
    pub(crate) work: Condvar,
    /// 排空结束
    pub(crate) idle: Condvar,
    pub(crate) interval: Duration,
    pub(crate) metrics: DispatchMetrics,
}

impl Monitor {
    pub(crate) fn new(transport: Box<dyn Transport>, interval: Duration) -> Self {
        Self {
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                last_send: None,
                closed: false,
                idle: true,
                draining: false,
                failure: None,
                transport: Some(transport),
                enqueued_seq: 0,
                inline_waiters: 0,
                lost: Vec::new(),
            }),
            work: Condvar::new(),
            idle: Condvar::new(),
            interval,
            metrics: DispatchMetrics::new(),
        }
    }

    /// 丢弃所有待发送命令，返回丢弃数量
    pub(crate) fn discard_pending(&self, state: &mut QueueState) -> usize {
        let dropped = state.queue.len();
        state.queue.clear();
        DispatchMetrics::add(&self.metrics.commands_dropped, dropped);
        dropped
    }

    /// 标记空闲并唤醒所有等待者
    pub(crate) fn mark_idle(&self, state: &mut QueueState) {
        state.idle = true;
        self.idle.notify_all();
        self.work.notify_all();
    }

    /// 节流排空
    ///
    /// 持锁运行，只在节流等待期间释放。写入期间持锁，
    /// 因此 `clear` / `close` 会等当前写入完成后才生效。
    ///
    /// 保证：
    /// - 相邻两次写入的开始时间间隔不小于 `interval`
    /// - 首条命令（`last_send == None`）不等待
    /// - 每次等待醒来后重新检查关闭和队列状态
    ///
    /// # 错误
    /// 传输写入失败时，失败的命令和其后所有待发送命令被丢弃，错误原样返回。
    pub(crate) fn drain(
        &self,
        state: &mut MutexGuard<'_, QueueState>,
    ) -> Result<DrainOutcome, TransportError> {
        state.draining = true;
        // 每条命令最多计一次节流等待（被新入队唤醒后继续等待不重复计数）
        let mut waited_for: Option<u64> = None;

        let result = loop {
            if state.closed {
                break Ok(DrainOutcome::Closed);
            }
            if state.queue.is_empty() {
                break Ok(DrainOutcome::Drained);
            }

            if let Some(last_send) = state.last_send {
                let elapsed = last_send.elapsed();
                if elapsed < self.interval {
                    let remaining = self.interval - elapsed;
                    let front = state.front_seq();
                    if waited_for != Some(front) {
                        debug!("Waiting {:?} before next command", remaining);
                        DispatchMetrics::add(&self.metrics.pacing_waits, 1);
                        waited_for = Some(front);
                    }
                    self.work.wait_for(state, remaining);
                    continue;
                }
            }

            let seq = state.front_seq();
            let Some(command) = state.queue.pop_front() else {
                continue;
            };
            let Some(transport) = state.transport.as_mut() else {
                break Ok(DrainOutcome::Closed);
            };

            info!("Sending command {} ({})", command, command.action());
            if let Err(e) = transport.write(command.as_bytes()) {
                error!("Failed to send command {}: {}", command, e);
                DispatchMetrics::add(&self.metrics.transport_errors, 1);
                DispatchMetrics::add(&self.metrics.commands_dropped, 1);
                let dropped = self.discard_pending(state);
                if dropped > 0 {
                    warn!("Dropped {} pending command(s) after transport failure", dropped);
                }
                if state.inline_waiters > 0 {
                    let last = state.enqueued_seq;
                    state.lost.push(LostCommands {
                        first: seq,
                        last,
                        message: e.to_string(),
                    });
                }
                break Err(e);
            }

            state.last_send = Some(Instant::now());
            DispatchMetrics::add(&self.metrics.commands_sent, 1);
        };

        state.draining = false;
        self.mark_idle(state);
        result
    }
}

impl Monitor {
    /// 等待其他线程的内联排空结束
    ///
    /// `seq` 为本次调用最后一条命令的序号。若这条命令因传输失败被丢弃，
    /// 返回失败信息（FIFO 且失败时丢弃全部剩余命令，最后一条未发送即意味着
    /// 本次调用有命令未发送）。
    pub(crate) fn wait_for_other_drain(
        &self,
        state: &mut MutexGuard<'_, QueueState>,
        seq: u64,
    ) -> Option<String> {
        state.inline_waiters += 1;
        while !state.idle {
            self.idle.wait(state);
        }
        state.inline_waiters -= 1;

        let message = state
            .lost
            .iter()
            .find(|lost| (lost.first..=lost.last).contains(&seq))
            .map(|lost| lost.message.clone());
        if state.inline_waiters == 0 {
            state.lost.clear();
        }
        message
    }
}

/// 后台 worker 循环
///
/// 等待队列非空或关闭，然后排空；观察到关闭或传输失败时退出。
/// 传输失败会记录到 `QueueState::failure`，之后调度器的操作都返回
/// `DriverError::WorkerFailed`。
pub(crate) fn worker_loop(monitor: Arc<Monitor>) {
    trace!("Dispatch worker: started");
    let mut state = monitor.state.lock();

    loop {
        while !state.closed && state.queue.is_empty() {
            monitor.work.wait(&mut state);
        }

        match monitor.drain(&mut state) {
            Ok(DrainOutcome::Drained) => {
                trace!("Dispatch worker: queue drained");
            },
            Ok(DrainOutcome::Closed) => {
                trace!("Dispatch worker: closed, exiting");
                break;
            },
            Err(e) => {
                error!("Dispatch worker: fatal transport error, exiting: {}", e);
                state.failure = Some(e.to_string());
                monitor.mark_idle(&mut state);
                break;
            },
        }
    }

    trace!("Dispatch worker: loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use somfy_protocol::{Action, Direction, encode};
    use somfy_transport::MockTransport;

    fn command(channel: u8) -> EncodedCommand {
        encode(Action::new(Direction::Up, channel), ProtocolVersion::V1).unwrap()
    }

    #[test]
    fn test_dispatcher_config_default() {
        let config = DispatcherConfig::default();
        assert_eq!(config.interval, Duration::from_millis(1500));
        assert_eq!(config.version, ProtocolVersion::V1);
        assert_eq!(config.mode, DispatchMode::Inline);
    }

    #[test]
    fn test_interval_from_secs() {
        assert_eq!(interval_from_secs(0.25).unwrap(), Duration::from_millis(250));
        assert_eq!(interval_from_secs(0.0).unwrap(), Duration::ZERO);
        assert!(matches!(
            interval_from_secs(-1.0),
            Err(DriverError::InvalidInterval(v)) if v == -1.0
        ));
        assert!(interval_from_secs(f64::NAN).is_err());
        assert!(interval_from_secs(f64::INFINITY).is_err());

        let config = DispatcherConfig::default().with_interval_secs(2.0).unwrap();
        assert_eq!(config.interval, Duration::from_secs(2));
    }

    #[test]
    fn test_drain_sends_in_order_and_marks_idle() {
        let mock = MockTransport::new();
        let output = mock.output();
        let monitor = Monitor::new(Box::new(mock), Duration::ZERO);

        let mut state = monitor.state.lock();
        state.push([command(1), command(2), command(3)]);

        assert_eq!(monitor.drain(&mut state).unwrap(), DrainOutcome::Drained);
        assert!(state.idle);
        assert!(!state.draining);
        assert!(state.last_send.is_some());
        drop(state);

        assert_eq!(
            output.writes(),
            vec![b"U1\r".to_vec(), b"U2\r".to_vec(), b"U3\r".to_vec()]
        );
        assert_eq!(monitor.metrics.snapshot().commands_sent, 3);
    }

    #[test]
    fn test_drain_observes_closed() {
        let mock = MockTransport::new();
        let output = mock.output();
        let monitor = Monitor::new(Box::new(mock), Duration::ZERO);

        let mut state = monitor.state.lock();
        state.push([command(1)]);
        state.closed = true;

        assert_eq!(monitor.drain(&mut state).unwrap(), DrainOutcome::Closed);
        drop(state);
        assert!(output.is_empty());
    }

    #[test]
    fn test_drain_transport_failure_discards_rest() {
        let mock = MockTransport::new().fail_after(1);
        let output = mock.output();
        let monitor = Monitor::new(Box::new(mock), Duration::ZERO);

        let mut state = monitor.state.lock();
        state.push([command(1), command(2), command(3)]);

        let err = monitor.drain(&mut state).unwrap_err();
        assert!(matches!(err, TransportError::Device(_)));
        assert!(state.queue.is_empty());
        assert!(state.idle);
        drop(state);

        assert_eq!(output.len(), 1);
        let snapshot = monitor.metrics.snapshot();
        assert_eq!(snapshot.commands_sent, 1);
        assert_eq!(snapshot.commands_dropped, 2);
        assert_eq!(snapshot.transport_errors, 1);
    }

    #[test]
    fn test_drain_failure_records_lost_commands_for_waiters() {
        let mock = MockTransport::new().fail_after(1);
        let monitor = Monitor::new(Box::new(mock), Duration::ZERO);

        let mut state = monitor.state.lock();
        state.inline_waiters = 1;
        let last = state.push([command(1), command(2), command(3)]);
        assert_eq!(last, 3);
        assert!(monitor.drain(&mut state).is_err());
        assert_eq!(state.lost.len(), 1);
        assert_eq!((state.lost[0].first, state.lost[0].last), (2, 3));

        // 模拟等待者离开后由新的等待者查询
        state.inline_waiters = 0;
        let message = monitor.wait_for_other_drain(&mut state, 3).unwrap();
        assert!(message.contains("mock write failure"));
        assert!(state.lost.is_empty());
        assert_eq!(monitor.wait_for_other_drain(&mut state, 1), None);
    }

    #[test]
    fn test_drain_failure_without_waiters_records_nothing() {
        let mock = MockTransport::new().fail_after(0);
        let monitor = Monitor::new(Box::new(mock), Duration::ZERO);

        let mut state = monitor.state.lock();
        state.push([command(1), command(2)]);
        assert!(monitor.drain(&mut state).is_err());
        assert!(state.lost.is_empty());
    }

    #[test]
    fn test_pacing_wait_counted_once_per_command() {
        let mock = MockTransport::new();
        let output = mock.output();
        let monitor = Arc::new(Monitor::new(Box::new(mock), Duration::from_millis(300)));

        let drainer = {
            let monitor = monitor.clone();
            std::thread::spawn(move || {
                let mut state = monitor.state.lock();
                state.push([command(1), command(2)]);
                monitor.drain(&mut state).unwrap();
            })
        };

        // 节流等待期间反复唤醒（如新命令入队），不应重复计数
        std::thread::sleep(Duration::from_millis(50));
        for _ in 0..3 {
            monitor.work.notify_all();
            std::thread::sleep(Duration::from_millis(30));
        }
        drainer.join().unwrap();

        assert_eq!(output.len(), 2);
        assert_eq!(monitor.metrics.snapshot().pacing_waits, 1);
    }

    #[test]
    fn test_drain_waits_for_interval() {
        let mock = MockTransport::new();
        let output = mock.output();
        let interval = Duration::from_millis(50);
        let monitor = Monitor::new(Box::new(mock), interval);

        let mut state = monitor.state.lock();
        state.push([command(1), command(2)]);
        monitor.drain(&mut state).unwrap();
        drop(state);

        let times = output.write_times();
        assert_eq!(times.len(), 2);
        assert!(times[1].duration_since(times[0]) >= interval);
        assert!(monitor.metrics.snapshot().pacing_waits >= 1);
    }
}
