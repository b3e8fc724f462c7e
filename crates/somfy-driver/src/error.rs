//! 驱动层错误类型定义

use somfy_protocol::ProtocolError;
use somfy_transport::TransportError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 编码错误（通道越界、方向无效）
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 传输错误（内联模式下直接返回给调用方）
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// 另一线程的内联排空写入失败，本次入队的命令未发送即被丢弃
    #[error("Commands discarded after transport failure: {0}")]
    Discarded(String),

    /// 调度器已关闭
    ///
    /// 关闭后再调用 `enqueue` / `clear` / `flush` / `close` 属于调用方错误。
    #[error("Dispatcher closed")]
    Closed,

    /// 后台 worker 因传输错误退出，调度器不再可用
    #[error("Dispatch worker failed: {0}")]
    WorkerFailed(String),

    /// 无法启动后台 worker
    #[error("Failed to spawn dispatch worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    /// 发送间隔为负数或非有限值
    #[error("Invalid interval: {0} seconds")]
    InvalidInterval(f64),

    /// Builder 未指定端口也未指定传输
    #[error("No port or transport configured")]
    MissingPort,
}
