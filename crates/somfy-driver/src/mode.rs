//! 调度模式定义
//!
//! 构造时选定，之后不再改变。两种模式共用同一个排空算法
//! （[`crate::pipeline`]），区别只在于由谁来排空。

/// 调度模式
///
/// # 模式说明
///
/// - **Inline**: 无后台线程，`enqueue` 在调用方线程上排空队列，按节流要求阻塞
/// - **Worker**: 一个后台线程负责排空，`enqueue` 只入队并唤醒 worker，立即返回
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// 内联模式（默认）
    #[default]
    Inline,

    /// 后台线程模式
    ///
    /// 使用 `flush()` 等待队列清空，`close()` 可打断正在进行的等待。
    Worker,
}

impl DispatchMode {
    /// 由 "是否启用后台线程" 转换
    pub fn from_threaded(threaded: bool) -> Self {
        if threaded { Self::Worker } else { Self::Inline }
    }

    pub fn is_worker(self) -> bool {
        self == Self::Worker
    }

    pub fn is_inline(self) -> bool {
        self == Self::Inline
    }
}
