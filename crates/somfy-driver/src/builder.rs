//! Builder 模式实现
//!
//! 提供链式构造 `Dispatcher` 实例的便捷方式。

use crate::dispatcher::Dispatcher;
use crate::error::DriverError;
use crate::mode::DispatchMode;
use crate::pipeline::{DEFAULT_INTERVAL, DispatcherConfig};
use somfy_protocol::ProtocolVersion;
use somfy_transport::{DEFAULT_BAUD_RATE, Transport};
use std::time::Duration;

/// Dispatcher Builder（链式构造）
///
/// 指定端口名时由 [`somfy_transport::open`] 打开传输（`"TEST"` 为内存传输），
/// 也可以直接传入已构造好的传输。
///
/// # Example
///
/// ```
/// use somfy_driver::{DispatchMode, DispatcherBuilder};
/// use somfy_protocol::ProtocolVersion;
/// use std::time::Duration;
///
/// let dispatcher = DispatcherBuilder::new()
///     .port("TEST")
///     .interval(Duration::from_millis(100))
///     .version(ProtocolVersion::V2)
///     .mode(DispatchMode::Worker)
///     .build()?;
///
/// dispatcher.up([12])?;
/// dispatcher.close()?;
/// # Ok::<(), somfy_driver::DriverError>(())
/// ```
pub struct DispatcherBuilder {
    /// 端口名（串口路径或 `"TEST"`）
    port: Option<String>,
    /// 串口波特率（默认 9600）
    baud_rate: u32,
    interval: Duration,
    version: ProtocolVersion,
    mode: DispatchMode,
    /// 显式传入的传输，优先于 `port`
    transport: Option<Box<dyn Transport>>,
}

impl DispatcherBuilder {
    /// 创建新的 Builder
    pub fn new() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            interval: DEFAULT_INTERVAL,
            version: ProtocolVersion::default(),
            mode: DispatchMode::default(),
            transport: None,
        }
    }

    /// 设置端口名
    pub fn port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    /// 设置串口波特率（可选，默认 9600）
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// 设置最小发送间隔（可选，默认 1.5s）
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// 设置协议版本（可选，默认 V1）
    pub fn version(mut self, version: ProtocolVersion) -> Self {
        self.version = version;
        self
    }

    /// 设置调度模式（可选，默认 Inline）
    pub fn mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// 是否使用后台 worker
    pub fn threaded(self, threaded: bool) -> Self {
        self.mode(DispatchMode::from_threaded(threaded))
    }

    /// 一次性设置间隔、版本、模式
    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.interval = config.interval;
        self.version = config.version;
        self.mode = config.mode;
        self
    }

    /// 使用已构造好的传输（忽略 `port` / `baud_rate`）
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            interval: self.interval,
            version: self.version,
            mode: self.mode,
        }
    }

    /// 构建 Dispatcher 实例
    ///
    /// # Errors
    /// - `DriverError::MissingPort`: 既没有端口也没有传输
    /// - `DriverError::Transport`: 打开串口失败
    /// - `DriverError::WorkerSpawn`: Worker 模式下线程启动失败
    pub fn build(self) -> Result<Dispatcher, DriverError> {
        let config = self.dispatcher_config();

        let transport = match (self.transport, self.port) {
            (Some(transport), _) => transport,
            (None, Some(port)) => {
                tracing::debug!("Opening port {} at {} baud", port, self.baud_rate);
                somfy_transport::open(&port, self.baud_rate)?
            },
            (None, None) => return Err(DriverError::MissingPort),
        };

        Dispatcher::new(transport, config)
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
