//! # Somfy Protocol
//!
//! Universal RTS Interface 串口命令编码（无硬件依赖、无状态）
//!
//! ## 模块
//!
//! - `action`: 动作定义（方向 + 通道）
//! - `version`: 协议版本与通道范围
//! - `encode`: 动作到字节序列的编码规则
//!
//! ## 线格式
//!
//! | 版本 | 格式 | 示例 |
//! |------|------|------|
//! | V1 | `<方向><通道十进制>\r` | `D12\r` |
//! | V2 | `01<通道两位补零><方向>` | `0103S` |

pub mod action;
pub mod encode;
pub mod version;

// 重新导出常用类型
pub use action::{Action, Channel, Direction};
pub use encode::{EncodedCommand, encode};
pub use version::ProtocolVersion;

use thiserror::Error;

/// 协议层错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// 通道超出当前协议版本的范围
    #[error("Invalid channel {channel} for protocol version {version}: expected 1..={max}")]
    InvalidChannel { channel: Channel, version: u8, max: Channel },

    /// 无法识别的方向
    #[error("Invalid action: {0:?}")]
    InvalidAction(String),

    /// 不支持的协议版本
    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u8),
}
