//! 调度指标模块
//!
//! 原子计数器，任何线程都可以读取，不参与队列锁竞争。

use std::sync::atomic::{AtomicU64, Ordering};

/// 调度器实时指标
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    /// 入队的命令总数
    pub commands_enqueued: AtomicU64,

    /// 成功写入传输的命令数
    pub commands_sent: AtomicU64,

    /// 未发送即被丢弃的命令数（clear / close / 传输失败）
    pub commands_dropped: AtomicU64,

    /// 节流等待次数
    ///
    /// 某条命令因距上次发送不足一个间隔而需要等待时加一。
    /// 每条命令至多计一次：等待中被新入队唤醒后继续等待不重复计数，
    /// 被 close / clear 提前结束的等待也计入。
    pub pacing_waits: AtomicU64,

    /// 传输写入失败次数
    pub transport_errors: AtomicU64,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取指标快照
    ///
    /// 各计数器分别读取（Relaxed），彼此之间可能有微小的时间差。
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            commands_enqueued: self.commands_enqueued.load(Ordering::Relaxed),
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            commands_dropped: self.commands_dropped.load(Ordering::Relaxed),
            pacing_waits: self.pacing_waits.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub commands_enqueued: u64,
    pub commands_sent: u64,
    pub commands_dropped: u64,
    pub pacing_waits: u64,
    pub transport_errors: u64,
}

impl MetricsSnapshot {
    /// 已入队但尚未发送也未丢弃的命令数
    pub fn in_flight(&self) -> u64 {
        self.commands_enqueued
            .saturating_sub(self.commands_sent)
            .saturating_sub(self.commands_dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let metrics = DispatchMetrics::new();
        DispatchMetrics::add(&metrics.commands_enqueued, 5);
        DispatchMetrics::add(&metrics.commands_sent, 2);
        DispatchMetrics::add(&metrics.commands_dropped, 1);
        DispatchMetrics::add(&metrics.pacing_waits, 1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.commands_enqueued, 5);
        assert_eq!(snapshot.commands_sent, 2);
        assert_eq!(snapshot.commands_dropped, 1);
        assert_eq!(snapshot.pacing_waits, 1);
        assert_eq!(snapshot.transport_errors, 0);
        assert_eq!(snapshot.in_flight(), 2);
    }
}
