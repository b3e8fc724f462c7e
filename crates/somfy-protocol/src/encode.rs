//! 命令编码
//!
//! 把 [`Action`] 按协议版本编码为可直接写入串口的字节序列。

use crate::ProtocolError;
use crate::action::Action;
use crate::version::ProtocolVersion;
use std::fmt;

/// 已编码命令
///
/// 固定 8 字节缓冲区（最长命令 5 字节），`Copy`，不做堆分配。
/// 创建后不再修改，原始动作随命令一起保存用于日志。
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncodedCommand {
    data: [u8; 8],
    len: u8,
    action: Action,
}

impl EncodedCommand {
    /// 最大命令长度
    pub const MAX_LEN: usize = 8;

    fn new(action: Action) -> Self {
        Self {
            data: [0; Self::MAX_LEN],
            len: 0,
            action,
        }
    }

    fn extend(&mut self, bytes: &[u8]) {
        let start = self.len as usize;
        let end = (start + bytes.len()).min(Self::MAX_LEN);
        self.data[start..end].copy_from_slice(&bytes[..end - start]);
        self.len = end as u8;
    }

    /// 有效字节
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 生成此命令的动作
    pub fn action(&self) -> Action {
        self.action
    }
}

impl AsRef<[u8]> for EncodedCommand {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Display for EncodedCommand {
    /// 可打印形式，`\r` 显示为转义序列
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_bytes().escape_ascii())
    }
}

impl fmt::Debug for EncodedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedCommand")
            .field("bytes", &format_args!("b\"{}\"", self))
            .field("action", &self.action)
            .finish()
    }
}

/// 编码单条动作
///
/// # 错误
/// - `ProtocolError::InvalidChannel`: 通道为 0 或超出版本上限
///
/// # 示例
///
/// ```
/// use somfy_protocol::{Action, Direction, ProtocolVersion, encode};
///
/// let cmd = encode(Action::new(Direction::Down, 12), ProtocolVersion::V2).unwrap();
/// assert_eq!(cmd.as_bytes(), b"0112D");
/// ```
pub fn encode(action: Action, version: ProtocolVersion) -> Result<EncodedCommand, ProtocolError> {
    action.validate(version)?;

    let body = match version {
        ProtocolVersion::V1 => format!("{}{}", action.direction.as_char(), action.channel),
        ProtocolVersion::V2 => format!("01{:02}{}", action.channel, action.direction.as_char()),
    };

    let mut command = EncodedCommand::new(action);
    command.extend(body.as_bytes());
    if let Some(terminator) = version.terminator() {
        command.extend(&[terminator]);
    }
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Direction;

    fn bytes(direction: Direction, channel: u8, version: ProtocolVersion) -> Vec<u8> {
        encode(Action::new(direction, channel), version)
            .unwrap()
            .as_bytes()
            .to_vec()
    }

    #[test]
    fn test_encode_v1() {
        assert_eq!(bytes(Direction::Up, 1, ProtocolVersion::V1), b"U1\r");
        assert_eq!(bytes(Direction::Down, 3, ProtocolVersion::V1), b"D3\r");
        assert_eq!(bytes(Direction::Stop, 5, ProtocolVersion::V1), b"S5\r");
    }

    #[test]
    fn test_encode_v2() {
        assert_eq!(bytes(Direction::Up, 8, ProtocolVersion::V2), b"0108U");
        assert_eq!(bytes(Direction::Down, 12, ProtocolVersion::V2), b"0112D");
        assert_eq!(bytes(Direction::Down, 3, ProtocolVersion::V2), b"0103D");
        assert_eq!(bytes(Direction::Stop, 16, ProtocolVersion::V2), b"0116S");
    }

    #[test]
    fn test_encode_rejects_out_of_range() {
        let err = encode(Action::new(Direction::Up, 6), ProtocolVersion::V1).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InvalidChannel {
                channel: 6,
                version: 1,
                max: 5
            }
        );

        assert!(encode(Action::new(Direction::Up, 0), ProtocolVersion::V2).is_err());
        assert!(encode(Action::new(Direction::Up, 17), ProtocolVersion::V2).is_err());
    }

    #[test]
    fn test_encoded_command_accessors() {
        let action = Action::new(Direction::Stop, 2);
        let cmd = encode(action, ProtocolVersion::V1).unwrap();
        assert_eq!(cmd.len(), 3);
        assert!(!cmd.is_empty());
        assert_eq!(cmd.action(), action);
        assert_eq!(cmd.as_ref(), b"S2\r");
    }

    #[test]
    fn test_encoded_command_display() {
        let cmd = encode(Action::new(Direction::Down, 4), ProtocolVersion::V1).unwrap();
        assert_eq!(cmd.to_string(), "D4\\r");
        assert!(format!("{:?}", cmd).contains("b\"D4\\r\""));
    }
}
