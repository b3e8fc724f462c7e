//! 驱动层模块
//!
//! 本模块提供 RTS 控制器的命令调度功能，包括：
//! - 命令队列（FIFO，单一互斥锁保护）
//! - 发送节流（保证两次写入之间的最小间隔）
//! - 两种调度模式：调用方线程内联排空 / 后台 worker 线程排空
//! - 生命周期管理（flush / clear / close）
//!
//! # 示例
//!
//! ```
//! use somfy_driver::{DispatchMode, Dispatcher, DispatcherConfig};
//! use somfy_protocol::ProtocolVersion;
//! use somfy_transport::MockTransport;
//! use std::time::Duration;
//!
//! let transport = MockTransport::new();
//! let output = transport.output();
//!
//! let config = DispatcherConfig {
//!     interval: Duration::ZERO,
//!     version: ProtocolVersion::V1,
//!     mode: DispatchMode::Inline,
//! };
//! let dispatcher = Dispatcher::new(transport, config)?;
//! dispatcher.down([1, 3])?;
//! dispatcher.close()?;
//!
//! assert_eq!(output.writes(), vec![b"D1\r".to_vec(), b"D3\r".to_vec()]);
//! # Ok::<(), somfy_driver::DriverError>(())
//! ```

mod builder;
mod dispatcher;
mod error;
pub mod metrics;
pub mod mode;
pub mod pipeline;

pub use builder::DispatcherBuilder;
pub use dispatcher::Dispatcher;
pub use error::DriverError;
pub use metrics::{DispatchMetrics, MetricsSnapshot};
pub use mode::DispatchMode;
pub use pipeline::{DEFAULT_INTERVAL, DispatcherConfig, interval_from_secs};
