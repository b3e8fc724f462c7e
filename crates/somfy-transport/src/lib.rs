//! # Somfy Transport Layer
//!
//! 与 RTS 控制器之间点对点链路的抽象，提供统一的阻塞式写接口。
//!
//! - [`SerialTransport`]: 真实串口（`serial` feature）
//! - [`MockTransport`]: 内存记录，用于测试与 `TEST` 端口

use thiserror::Error;

pub mod mock;
#[cfg(feature = "serial")]
pub mod serial;

pub use mock::{MockOutput, MockTransport};
#[cfg(feature = "serial")]
pub use serial::SerialTransport;

/// 测试端口名：打开此端口时使用 [`MockTransport`]
pub const TEST_PORT_NAME: &str = "TEST";

/// URTSI 默认波特率（8N1）
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// 传输层统一错误类型
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "serial")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("Device error: {0}")]
    Device(String),
    #[error("Transport closed")]
    Closed,
    #[error("Serial support not compiled in (port {0})")]
    SerialUnavailable(String),
}

/// 阻塞式命令传输
///
/// 实现者只需保证 `write` 返回时字节已交给底层设备。
/// 失败不会被自动重试。
pub trait Transport: Send {
    /// 写入一条完整命令
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// 释放底层资源
    ///
    /// 对已关闭的传输再次调用返回 [`TransportError::Closed`]。
    fn close(&mut self) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).write(bytes)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        (**self).close()
    }
}

/// 按端口名打开传输
///
/// `TEST` 返回 [`MockTransport`]，其他名称作为串口路径打开。
pub fn open(port: &str, baud_rate: u32) -> Result<Box<dyn Transport>, TransportError> {
    if port == TEST_PORT_NAME {
        return Ok(Box::new(MockTransport::new()));
    }

    #[cfg(feature = "serial")]
    {
        Ok(Box::new(SerialTransport::open(port, baud_rate)?))
    }

    #[cfg(not(feature = "serial"))]
    {
        let _ = baud_rate;
        Err(TransportError::SerialUnavailable(port.to_string()))
    }
}
