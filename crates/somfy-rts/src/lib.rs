//! Somfy RTS - Somfy Universal RTS Interface 控制器的 Rust SDK
//!
//! 通过串口向 URTSI 控制器发送卷帘上升 / 下降 / 停止命令，
//! 并保证两次命令之间的最小间隔（控制器会丢弃过快到达的命令）。
//!
//! # 架构设计
//!
//! 从底层到高层：
//!
//! - **协议层** (`protocol`): 命令编码（V1 / V2 文本格式）
//! - **传输层** (`transport`): 串口与内存传输
//! - **驱动层** (`driver`): 命令队列、节流、后台 worker
//!
//! # 快速开始
//!
//! ```rust
//! use somfy_rts::prelude::*;
//! use std::time::Duration;
//!
//! let rts = DispatcherBuilder::new()
//!     .port("TEST")
//!     .interval(Duration::ZERO)
//!     .build()?;
//!
//! rts.stop([1])?;
//! rts.up([2, 3])?;
//! rts.close()?;
//! # Ok::<(), DriverError>(())
//! ```

pub use somfy_driver as driver;
pub use somfy_protocol as protocol;
pub use somfy_transport as transport;

pub mod prelude;

// 协议层
pub use protocol::{Action, Channel, Direction, EncodedCommand, ProtocolError, ProtocolVersion};

// 传输层
pub use transport::{MockTransport, Transport, TransportError};

// 驱动层（推荐入口）
pub use driver::{DispatchMode, Dispatcher, DispatcherBuilder, DispatcherConfig, DriverError};
