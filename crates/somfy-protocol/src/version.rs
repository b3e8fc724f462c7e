//! 协议版本
//!
//! Universal RTS Interface 有两代硬件，命令格式和可寻址通道数不同。

use crate::ProtocolError;
use crate::action::Channel;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;

/// 协议版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u8", into = "u8"))]
#[repr(u8)]
pub enum ProtocolVersion {
    /// 第一代控制器（通道 1-5）
    #[default]
    V1 = 1,
    /// 第二代控制器（通道 1-16）
    V2 = 2,
}

impl ProtocolVersion {
    /// 从版本号转换
    pub fn from_number(number: u8) -> Result<Self, ProtocolError> {
        Self::try_from(number).map_err(|e| ProtocolError::UnsupportedVersion(e.number))
    }

    /// 版本号（1 或 2）
    pub fn number(self) -> u8 {
        self.into()
    }

    /// 最大通道号
    pub fn max_channel(self) -> Channel {
        match self {
            ProtocolVersion::V1 => 5,
            ProtocolVersion::V2 => 16,
        }
    }

    /// 命令结束符
    ///
    /// V2 控制器文档没有给出结束符，硬件上也未验证过。
    /// 如需改为 `\r`，只改这里，调度器无需变动。
    pub fn terminator(self) -> Option<u8> {
        match self {
            ProtocolVersion::V1 => Some(b'\r'),
            ProtocolVersion::V2 => None,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.number())
    }
}
