//! 动作定义
//!
//! 一个动作 = 方向（升 / 降 / 停）+ 通道号。

use crate::ProtocolError;
use crate::version::ProtocolVersion;
use std::fmt;
use std::str::FromStr;

/// 通道号（从 1 开始）
pub type Channel = u8;

/// 运动方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Direction {
    /// 上升（收起）
    Up,
    /// 下降（放下）
    Down,
    /// 停止
    Stop,
}

impl Direction {
    /// 线格式中的方向字母
    pub fn as_char(self) -> char {
        match self {
            Direction::Up => 'U',
            Direction::Down => 'D',
            Direction::Stop => 'S',
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Stop => "stop",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<char> for Direction {
    type Error = ProtocolError;

    /// 只接受线格式字母 `U` / `D` / `S`（区分大小写）
    fn try_from(c: char) -> Result<Self, Self::Error> {
        match c {
            'U' => Ok(Direction::Up),
            'D' => Ok(Direction::Down),
            'S' => Ok(Direction::Stop),
            other => Err(ProtocolError::InvalidAction(other.to_string())),
        }
    }
}

impl FromStr for Direction {
    type Err = ProtocolError;

    /// 接受线格式字母或单词（`up` / `down` / `stop`，不区分大小写）
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return Direction::try_from(c);
        }

        match s.to_ascii_lowercase().as_str() {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            "stop" => Ok(Direction::Stop),
            _ => Err(ProtocolError::InvalidAction(s.to_string())),
        }
    }
}

/// 单条动作（不可变值）
///
/// 合法性取决于协议版本，见 [`Action::validate`]。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Action {
    pub direction: Direction,
    pub channel: Channel,
}

impl Action {
    pub fn new(direction: Direction, channel: Channel) -> Self {
        Self { direction, channel }
    }

    /// 检查通道是否在 `1..=version.max_channel()` 范围内
    pub fn validate(&self, version: ProtocolVersion) -> Result<(), ProtocolError> {
        let max = version.max_channel();
        if self.channel == 0 || self.channel > max {
            return Err(ProtocolError::InvalidChannel {
                channel: self.channel,
                version: version.number(),
                max,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}", self.direction, self.channel)
    }
}
