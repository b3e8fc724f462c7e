//! 内存传输
//!
//! 记录所有写入，供测试断言和 CLI 的 `TEST` 端口使用。

use crate::{Transport, TransportError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tracing::trace;

#[derive(Debug)]
struct MockState {
    writes: Vec<(Instant, Vec<u8>)>,
    is_open: bool,
    /// 成功写入这么多次后，后续写入失败
    fail_after: Option<usize>,
}

/// 内存传输
///
/// 传输本身被移交给调度器后，通过 [`MockTransport::output`] 取得的
/// [`MockOutput`] 仍可读取记录。
///
/// # 示例
///
/// ```
/// use somfy_transport::{MockTransport, Transport};
///
/// let mut mock = MockTransport::new();
/// let output = mock.output();
/// mock.write(b"U1\r").unwrap();
/// assert_eq!(output.writes(), vec![b"U1\r".to_vec()]);
/// ```
#[derive(Debug)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                writes: Vec::new(),
                is_open: true,
                fail_after: None,
            })),
        }
    }

    /// 成功写入 `count` 次后，后续写入返回 `TransportError::Device`
    pub fn fail_after(self, count: usize) -> Self {
        self.state.lock().fail_after = Some(count);
        self
    }

    /// 只读观察句柄
    pub fn output(&self) -> MockOutput {
        MockOutput {
            state: self.state.clone(),
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if !state.is_open {
            return Err(TransportError::Closed);
        }
        if let Some(limit) = state.fail_after
            && state.writes.len() >= limit
        {
            return Err(TransportError::Device(format!(
                "mock write failure after {} writes",
                limit
            )));
        }

        trace!("Mock transport write: {}", bytes.escape_ascii());
        state.writes.push((Instant::now(), bytes.to_vec()));
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if !state.is_open {
            return Err(TransportError::Closed);
        }
        state.is_open = false;
        Ok(())
    }
}

/// [`MockTransport`] 的观察句柄（可克隆、线程安全）
#[derive(Debug, Clone)]
pub struct MockOutput {
    state: Arc<Mutex<MockState>>,
}

impl MockOutput {
    /// 按写入顺序返回所有命令
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().writes.iter().map(|(_, bytes)| bytes.clone()).collect()
    }

    /// 每次写入的时间点
    pub fn write_times(&self) -> Vec<Instant> {
        self.state.lock().writes.iter().map(|(at, _)| *at).collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().writes.is_empty()
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().is_open
    }
}
