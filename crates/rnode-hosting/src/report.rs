//! 启动与停机报告。
//!
//! 报告按引擎逐项记录结果与耗时，宿主据此输出日志、决定是否宣告就绪或进行补偿清理。

use std::time::Duration;

use rnode_core::EngineError;

/// 单个引擎在一次启动或停机中的结局。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EngineOutcome {
    /// 操作完成。
    Completed,
    /// 操作失败，含超时。
    Failed(EngineError),
    /// 未执行：启动已中止，或引擎不处于可操作状态。
    Skipped,
}

/// 单个引擎的结果记录。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EngineRecord {
    pub name: String,
    pub outcome: EngineOutcome,
    pub elapsed: Duration,
}

impl EngineRecord {
    pub fn new(name: impl Into<String>, outcome: EngineOutcome, elapsed: Duration) -> Self {
        Self {
            name: name.into(),
            outcome,
            elapsed,
        }
    }

    pub fn skipped(name: impl Into<String>) -> Self {
        Self::new(name, EngineOutcome::Skipped, Duration::ZERO)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, EngineOutcome::Failed(_))
    }

    pub fn error(&self) -> Option<&EngineError> {
        match &self.outcome {
            EngineOutcome::Failed(error) => Some(error),
            _ => None,
        }
    }
}

fn failures(records: &[EngineRecord]) -> impl Iterator<Item = &EngineRecord> {
    records.iter().filter(|record| record.is_failure())
}

/// `start_all` 的结果。
///
/// - `records`：按启动顺序排列的逐项结果；
/// - `aborted`：是否因失败策略中止了后续启动；
/// - `rollback`：中止后为补偿而执行的停止操作，按执行顺序排列。
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StartupReport {
    pub records: Vec<EngineRecord>,
    pub rollback: Vec<EngineRecord>,
    pub aborted: bool,
}

impl StartupReport {
    pub fn failure_count(&self) -> usize {
        failures(&self.records).count()
    }

    pub fn is_success(&self) -> bool {
        self.failure_count() == 0 && !self.aborted
    }

    pub fn record(&self, name: &str) -> Option<&EngineRecord> {
        self.records.iter().find(|record| record.name == name)
    }

    pub fn failures(&self) -> impl Iterator<Item = &EngineRecord> {
        failures(&self.records)
    }
}

/// `stop_all` 的结果，记录按停止顺序（即启动的逆序）排列。
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ShutdownReport {
    pub records: Vec<EngineRecord>,
}

impl ShutdownReport {
    pub fn failure_count(&self) -> usize {
        failures(&self.records).count()
    }

    pub fn is_success(&self) -> bool {
        self.failure_count() == 0
    }

    pub fn record(&self, name: &str) -> Option<&EngineRecord> {
        self.records.iter().find(|record| record.name == name)
    }

    pub fn failures(&self) -> impl Iterator<Item = &EngineRecord> {
        failures(&self.records)
    }
}
