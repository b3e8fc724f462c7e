//! 串口传输
//!
//! URTSI 使用 RS232，8 数据位、无校验、1 停止位，无流控。

use crate::{Transport, TransportError};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::Write;
use std::time::Duration;
use tracing::{debug, info};

/// 写超时（控制器不回流控，正常情况下写入立即完成）
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// 串口传输
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
    name: String,
}

impl SerialTransport {
    /// 打开串口
    ///
    /// # 错误
    /// - `TransportError::Serial`: 设备不存在、权限不足、参数不被支持
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, TransportError> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(WRITE_TIMEOUT)
            .open()?;

        info!("Opened serial port {} at {} baud", path, baud_rate);
        Ok(Self::from_port(port))
    }

    /// 包装已打开的串口
    pub fn from_port(port: Box<dyn SerialPort>) -> Self {
        let name = port.name().unwrap_or_else(|| "unknown".to_string());
        Self {
            port: Some(port),
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::Closed)?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        match self.port.take() {
            Some(port) => {
                drop(port);
                debug!("Closed serial port {}", self.name);
                Ok(())
            },
            None => Err(TransportError::Closed),
        }
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("name", &self.name)
            .field("is_open", &self.port.is_some())
            .finish()
    }
}
