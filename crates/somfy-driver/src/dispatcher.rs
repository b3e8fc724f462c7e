//! Dispatcher API 模块
//!
//! 提供对外的 `Dispatcher` 结构体，封装队列、节流和后台线程细节。

use crate::error::DriverError;
use crate::metrics::{DispatchMetrics, MetricsSnapshot};
use crate::mode::DispatchMode;
use crate::pipeline::{CommandBuffer, DispatcherConfig, Monitor, QueueState, worker_loop};
use parking_lot::{Mutex, MutexGuard};
use somfy_protocol::{Action, Channel, Direction, ProtocolVersion, encode};
use somfy_transport::Transport;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// 节流命令调度器（对外 API）
///
/// 持有传输直到 `close()`；未显式关闭时在 Drop 中关闭。
/// 所有方法都接收 `&self`，可放进 `Arc` 跨线程调用
/// （例如在 Ctrl-C 处理函数中 `clear()` 或 `close()`）。
///
/// # 示例
///
/// ```
/// use somfy_driver::{DispatchMode, Dispatcher, DispatcherConfig};
/// use somfy_transport::MockTransport;
/// use std::time::Duration;
///
/// let transport = MockTransport::new();
/// let output = transport.output();
/// let config = DispatcherConfig {
///     interval: Duration::from_millis(10),
///     mode: DispatchMode::Worker,
///     ..Default::default()
/// };
///
/// let dispatcher = Dispatcher::new(transport, config)?;
/// dispatcher.up([2])?;            // 立即返回
/// dispatcher.stop(4..=5)?;
/// assert!(dispatcher.flush(Some(Duration::from_secs(1)))?);
/// dispatcher.close()?;
///
/// assert_eq!(output.len(), 3);
/// # Ok::<(), somfy_driver::DriverError>(())
/// ```
pub struct Dispatcher {
    /// 队列监视器（与 worker 共享）
    monitor: Arc<Monitor>,
    /// 构造时的配置（间隔、版本、模式）
    config: DispatcherConfig,
    /// worker 线程句柄（仅 Worker 模式，`close()` 时 join）
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// worker 线程名
    pub const WORKER_THREAD_NAME: &'static str = "somfy-dispatch";

    /// 创建调度器
    ///
    /// 队列为空，首条命令不等待。`DispatchMode::Worker` 时立即启动后台线程。
    ///
    /// # 错误
    /// - `DriverError::WorkerSpawn`: 后台线程启动失败
    pub fn new(
        transport: impl Transport + 'static,
        config: DispatcherConfig,
    ) -> Result<Self, DriverError> {
        let monitor = Arc::new(Monitor::new(Box::new(transport), config.interval));

        let worker = match config.mode {
            DispatchMode::Inline => None,
            DispatchMode::Worker => {
                let monitor_clone = monitor.clone();
                let handle = thread::Builder::new()
                    .name(Self::WORKER_THREAD_NAME.to_string())
                    .spawn(move || worker_loop(monitor_clone))
                    .map_err(DriverError::WorkerSpawn)?;
                Some(handle)
            },
        };

        info!(
            "Dispatcher started: protocol {}, interval {:?}, {:?} mode",
            config.version, config.interval, config.mode
        );

        Ok(Self {
            monitor,
            config,
            worker: Mutex::new(worker),
        })
    }

    /// 为一组通道排队同一方向的命令
    ///
    /// `channels` 可以是 `None`（无操作）、单个通道（`[3]` / `Some(3)`）
    /// 或有序集合（`[1, 3]`、`vec![..]`、`4..=5`），按给定顺序发送。
    ///
    /// 所有通道先全部编码，任何一个非法则整个调用被拒绝，不入队任何命令。
    ///
    /// - Inline 模式：在当前线程排空队列，返回时本次及之前的命令都已发送
    /// - Worker 模式：入队并唤醒 worker，立即返回
    ///
    /// # 错误
    /// - `DriverError::Closed`: 已调用过 `close()`
    /// - `DriverError::WorkerFailed`: worker 已因传输错误退出
    /// - `DriverError::Protocol`: 通道越界
    /// - `DriverError::Transport`: Inline 模式下写入失败（其后的待发送命令被丢弃）
    /// - `DriverError::Discarded`: Inline 模式下另一线程的排空写入失败，
    ///   本次调用的命令随之被丢弃
    pub fn enqueue<I>(&self, direction: Direction, channels: I) -> Result<(), DriverError>
    where
        I: IntoIterator<Item = Channel>,
    {
        let mut state = self.monitor.state.lock();
        Self::check_usable(&state)?;

        let commands = channels
            .into_iter()
            .map(|channel| encode(Action::new(direction, channel), self.config.version))
            .collect::<Result<CommandBuffer, _>>()?;
        if commands.is_empty() {
            return Ok(());
        }

        let count = commands.len();
        let last_seq = state.push(commands);
        DispatchMetrics::add(&self.monitor.metrics.commands_enqueued, count);
        debug!(
            "Queued {} {} command(s), {} pending",
            count,
            direction,
            state.queue.len()
        );
        self.monitor.work.notify_all();

        match self.config.mode {
            DispatchMode::Worker => Ok(()),
            DispatchMode::Inline => self.drain_inline(state, last_seq),
        }
    }

    /// 上升
    pub fn up<I: IntoIterator<Item = Channel>>(&self, channels: I) -> Result<(), DriverError> {
        self.enqueue(Direction::Up, channels)
    }

    /// 下降
    pub fn down<I: IntoIterator<Item = Channel>>(&self, channels: I) -> Result<(), DriverError> {
        self.enqueue(Direction::Down, channels)
    }

    /// 停止
    pub fn stop<I: IntoIterator<Item = Channel>>(&self, channels: I) -> Result<(), DriverError> {
        self.enqueue(Direction::Stop, channels)
    }

    /// 调用方线程排空
    ///
    /// 同一时刻只允许一个排空循环：若另一线程正在排空，
    /// 等它结束（它会把本次入队的命令一起发出）。那次排空若写入失败并丢弃了
    /// 本次的命令，返回 `DriverError::Discarded`。
    fn drain_inline(
        &self,
        mut state: MutexGuard<'_, QueueState>,
        last_seq: u64,
    ) -> Result<(), DriverError> {
        if state.draining {
            return match self.monitor.wait_for_other_drain(&mut state, last_seq) {
                Some(message) => Err(DriverError::Discarded(message)),
                None => Ok(()),
            };
        }

        self.monitor.drain(&mut state)?;
        Ok(())
    }

    /// 等待队列排空
    ///
    /// 返回 `true` 表示在超时前排空，`false` 表示超时时仍有命令待发送。
    /// `timeout` 为 `None` 时无限等待。Inline 模式下 `enqueue` 返回时
    /// 自己的命令已经发出，因此立即返回 `true`，不等待其他线程的排空。
    ///
    /// # 错误
    /// - `DriverError::Closed`: 已关闭
    /// - `DriverError::WorkerFailed`: worker 在等待前或等待期间失败
    pub fn flush(&self, timeout: Option<Duration>) -> Result<bool, DriverError> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut state = self.monitor.state.lock();
        Self::check_usable(&state)?;
        if self.config.mode.is_inline() {
            return Ok(true);
        }

        while !state.idle {
            match deadline {
                Some(deadline) => {
                    if self.monitor.idle.wait_until(&mut state, deadline).timed_out() {
                        if !state.idle {
                            debug!("Flush timed out with {} pending", state.queue.len());
                        }
                        break;
                    }
                },
                None => self.monitor.idle.wait(&mut state),
            }
        }

        if let Some(failure) = &state.failure {
            return Err(DriverError::WorkerFailed(failure.clone()));
        }
        Ok(state.idle)
    }

    /// 丢弃所有已入队但未发送的命令
    ///
    /// 已发送的命令不受影响。返回丢弃的命令数。
    ///
    /// # 错误
    /// - `DriverError::Closed`: 已关闭
    /// - `DriverError::WorkerFailed`: worker 已失败
    pub fn clear(&self) -> Result<usize, DriverError> {
        let mut state = self.monitor.state.lock();
        Self::check_usable(&state)?;

        let dropped = self.monitor.discard_pending(&mut state);
        if dropped > 0 {
            info!("Cleared {} pending command(s)", dropped);
        }
        self.monitor.mark_idle(&mut state);
        Ok(dropped)
    }

    /// 关闭调度器
    ///
    /// 置位关闭标志、丢弃待发送命令、唤醒并 join worker，最后关闭传输。
    /// 正在节流等待的 worker 会被立即唤醒，不会等满剩余间隔；
    /// 观察到关闭后不再写入任何命令。
    ///
    /// 不是幂等的：第二次调用返回 `DriverError::Closed`。
    ///
    /// # 错误
    /// - `DriverError::Closed`: 已关闭
    /// - `DriverError::Transport`: 传输关闭失败
    pub fn close(&self) -> Result<(), DriverError> {
        {
            let mut state = self.monitor.state.lock();
            if state.closed {
                return Err(DriverError::Closed);
            }
            state.closed = true;
            let dropped = self.monitor.discard_pending(&mut state);
            if dropped > 0 {
                warn!("Closing with {} unsent command(s), discarding", dropped);
            }
            self.monitor.mark_idle(&mut state);
        }

        // 锁已释放，worker 可以醒来观察到关闭并退出
        if let Some(handle) = self.worker.lock().take()
            && handle.join().is_err()
        {
            error!("Dispatch worker panicked");
        }

        let transport = self.monitor.state.lock().transport.take();
        if let Some(mut transport) = transport {
            transport.close()?;
        }

        info!("Dispatcher closed");
        Ok(())
    }

    fn check_usable(state: &QueueState) -> Result<(), DriverError> {
        if state.closed {
            return Err(DriverError::Closed);
        }
        if let Some(failure) = &state.failure {
            return Err(DriverError::WorkerFailed(failure.clone()));
        }
        Ok(())
    }

    /// 待发送命令数
    pub fn pending(&self) -> usize {
        self.monitor.state.lock().queue.len()
    }

    pub fn is_closed(&self) -> bool {
        self.monitor.state.lock().closed
    }

    /// worker 失败信息（仅 Worker 模式）
    pub fn failure(&self) -> Option<String> {
        self.monitor.state.lock().failure.clone()
    }

    pub fn mode(&self) -> DispatchMode {
        self.config.mode
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    pub fn version(&self) -> ProtocolVersion {
        self.config.version
    }

    /// 获取指标快照
    pub fn metrics(&self) -> MetricsSnapshot {
        self.monitor.metrics.snapshot()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }
        if let Err(e) = self.close() {
            warn!("Failed to close dispatcher on drop: {}", e);
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use somfy_protocol::ProtocolError;
    use somfy_transport::{MockOutput, MockTransport, TransportError};

    fn inline(interval: Duration, version: ProtocolVersion) -> (Dispatcher, MockOutput) {
        let mock = MockTransport::new();
        let output = mock.output();
        let config = DispatcherConfig {
            interval,
            version,
            mode: DispatchMode::Inline,
        };
        (Dispatcher::new(mock, config).unwrap(), output)
    }

    fn writes(output: &MockOutput) -> Vec<Vec<u8>> {
        output.writes()
    }

    #[test]
    fn test_up() {
        let (rts, output) = inline(Duration::ZERO, ProtocolVersion::V1);
        rts.up([1]).unwrap();
        assert_eq!(writes(&output), vec![b"U1\r".to_vec()]);
    }

    #[test]
    fn test_down_preserves_order() {
        let (rts, output) = inline(Duration::ZERO, ProtocolVersion::V1);
        rts.down([1, 3]).unwrap();
        assert_eq!(writes(&output), vec![b"D1\r".to_vec(), b"D3\r".to_vec()]);
    }

    #[test]
    fn test_stop_none_is_noop() {
        let (rts, output) = inline(Duration::ZERO, ProtocolVersion::V1);
        rts.stop(None).unwrap();
        assert!(output.is_empty());
        assert_eq!(rts.metrics().commands_enqueued, 0);

        rts.stop([2, 5]).unwrap();
        assert_eq!(writes(&output), vec![b"S2\r".to_vec(), b"S5\r".to_vec()]);
    }

    #[test]
    fn test_multiple() {
        let (rts, output) = inline(Duration::ZERO, ProtocolVersion::V1);
        rts.up(Some(2)).unwrap();
        rts.down(vec![1, 3]).unwrap();
        rts.stop(4..6).unwrap();
        assert_eq!(
            writes(&output),
            vec![
                b"U2\r".to_vec(),
                b"D1\r".to_vec(),
                b"D3\r".to_vec(),
                b"S4\r".to_vec(),
                b"S5\r".to_vec(),
            ]
        );
    }

    #[test]
    fn test_version_2() {
        let (rts, output) = inline(Duration::ZERO, ProtocolVersion::V2);
        rts.up([8]).unwrap();
        rts.down([12, 3]).unwrap();
        rts.stop([7, 16]).unwrap();
        assert_eq!(
            writes(&output),
            vec![
                b"0108U".to_vec(),
                b"0112D".to_vec(),
                b"0103D".to_vec(),
                b"0107S".to_vec(),
                b"0116S".to_vec(),
            ]
        );
    }

    #[test]
    fn test_invalid_channel_rejects_whole_call() {
        let (rts, output) = inline(Duration::ZERO, ProtocolVersion::V1);
        let err = rts.down([1, 6, 2]).unwrap_err();
        assert!(matches!(
            err,
            DriverError::Protocol(ProtocolError::InvalidChannel { channel: 6, .. })
        ));
        assert!(output.is_empty());
        assert_eq!(rts.pending(), 0);

        assert!(rts.up([0]).is_err());
        assert!(output.is_empty());
    }

    #[test]
    fn test_close_then_enqueue_fails() {
        let (rts, output) = inline(Duration::ZERO, ProtocolVersion::V1);
        rts.up([1]).unwrap();
        rts.close().unwrap();

        assert!(!output.is_open());
        assert!(matches!(rts.up([2]), Err(DriverError::Closed)));
        assert!(matches!(rts.clear(), Err(DriverError::Closed)));
        assert!(matches!(rts.flush(None), Err(DriverError::Closed)));
        assert!(matches!(rts.close(), Err(DriverError::Closed)));
        assert_eq!(writes(&output), vec![b"U1\r".to_vec()]);
    }

    #[test]
    fn test_drop_closes_transport() {
        let (rts, output) = inline(Duration::ZERO, ProtocolVersion::V1);
        rts.up([1]).unwrap();
        drop(rts);
        assert!(!output.is_open());
    }

    #[test]
    fn test_inline_flush_returns_true_immediately() {
        let (rts, _output) = inline(Duration::from_secs(10), ProtocolVersion::V1);
        rts.up([1]).unwrap();
        assert!(rts.flush(Some(Duration::ZERO)).unwrap());
        assert!(rts.flush(None).unwrap());
    }

    #[test]
    fn test_inline_transport_error_propagates() {
        let mock = MockTransport::new().fail_after(1);
        let output = mock.output();
        let config = DispatcherConfig {
            interval: Duration::ZERO,
            ..Default::default()
        };
        let rts = Dispatcher::new(mock, config).unwrap();

        let err = rts.up([1, 2, 3]).unwrap_err();
        assert!(matches!(err, DriverError::Transport(TransportError::Device(_))));
        assert_eq!(output.len(), 1);
        assert_eq!(rts.pending(), 0);

        let snapshot = rts.metrics();
        assert_eq!(snapshot.commands_sent, 1);
        assert_eq!(snapshot.commands_dropped, 2);
        assert_eq!(snapshot.transport_errors, 1);
        assert_eq!(snapshot.in_flight(), 0);
    }

    #[test]
    fn test_accessors() {
        let (rts, _output) = inline(Duration::from_millis(250), ProtocolVersion::V2);
        assert_eq!(rts.mode(), DispatchMode::Inline);
        assert_eq!(rts.interval(), Duration::from_millis(250));
        assert_eq!(rts.version(), ProtocolVersion::V2);
        assert!(!rts.is_closed());
        assert!(rts.failure().is_none());
        assert!(format!("{:?}", rts).contains("Dispatcher"));
    }
}
