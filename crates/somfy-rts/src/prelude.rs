//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use somfy_rts::prelude::*;
//! ```

// 驱动层
pub use crate::driver::{DispatchMode, Dispatcher, DispatcherBuilder, DispatcherConfig};

// 协议层
pub use crate::protocol::{Direction, ProtocolVersion};

// 传输层（常用 Trait）
pub use crate::transport::Transport;

// 错误类型
pub use crate::driver::DriverError;
pub use crate::protocol::ProtocolError;
pub use crate::transport::TransportError;
