//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义资源节点与服务引擎之间的失败语义：节点拒绝登记时给出 [`NodeError`]，
//!   引擎把这些失败折叠进生命周期操作的完成信号 [`EngineError`]；
//! - 宿主只需匹配 [`EngineError`] 的变体即可决定“中止启动 / 标记降级 / 继续尽力而为”。
//!
//! ## 设计要求（What）
//! - 所有错误派生 `thiserror::Error`，可直接进入 `anyhow` 或日志链路；
//! - 每个变体提供稳定的点分错误码（`code()`），日志与报告以错误码为检索维度；
//! - 引擎不得让登记/注销错误以 panic 的形式逃逸，必须转换为失败的完成信号。

use core::{fmt, time::Duration};

use thiserror::Error;

use crate::{lifecycle::EngineState, node::Registration};

/// 资源节点在登记或注销时返回的错误。
///
/// # 教案式说明
/// - **意图 (Why)**：节点的订阅表与挂载表是宿主持有的共享资源，冲突与缺失必须以结构化错误回传，
///   引擎才能据此回滚或上报；
/// - **契约 (What)**：`ChannelTaken`/`PathTaken` 表示重复登记，`NotSubscribed`/`NotMounted`
///   表示注销的目标不存在，`Rejected` 为节点按策略拒绝，`Unavailable` 为协作方不可达；
/// - **风险 (Trade-offs)**：`Rejected` 与 `Unavailable` 只携带文本原因，细分需求应优先新增变体。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[non_exhaustive]
pub enum NodeError {
    /// 频道已存在订阅者。
    #[error("channel `{channel}` already has a subscriber")]
    ChannelTaken { channel: String },
    /// 路径已被挂载。
    #[error("path `{path}` is already mounted")]
    PathTaken { path: String },
    /// 频道上没有订阅者。
    #[error("channel `{channel}` has no subscriber")]
    NotSubscribed { channel: String },
    /// 路径未挂载。
    #[error("path `{path}` is not mounted")]
    NotMounted { path: String },
    /// 节点按自身策略拒绝了请求。
    #[error("node rejected `{target}`: {reason}")]
    Rejected { target: String, reason: String },
    /// 节点或其下游协作方不可用。
    #[error("node unavailable: {reason}")]
    Unavailable { reason: String },
}

impl NodeError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            NodeError::ChannelTaken { .. } => "node.channel.taken",
            NodeError::PathTaken { .. } => "node.path.taken",
            NodeError::NotSubscribed { .. } => "node.channel.missing",
            NodeError::NotMounted { .. } => "node.path.missing",
            NodeError::Rejected { .. } => "node.rejected",
            NodeError::Unavailable { .. } => "node.unavailable",
        }
    }

    /// 注销目标已经不存在。
    ///
    /// 账本据此判断是否还需保留该登记以供重试：目标缺失意味着节点侧已无残留。
    pub fn is_absent(&self) -> bool {
        matches!(
            self,
            NodeError::NotSubscribed { .. } | NodeError::NotMounted { .. }
        )
    }
}

/// 单个登记步骤的失败记录。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RegistrationFailure {
    /// 失败的登记项。
    pub registration: Registration,
    /// 节点返回的错误。
    pub error: NodeError,
}

impl RegistrationFailure {
    /// 构造失败记录。
    pub fn new(registration: Registration, error: NodeError) -> Self {
        Self {
            registration,
            error,
        }
    }
}

impl fmt::Display for RegistrationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.registration, self.error)
    }
}

/// 生命周期操作类别，用于错误与日志中标注“哪一步”失败。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum LifecycleOperation {
    Start,
    Stop,
    Reset,
    /// 回收失败实例仍留在节点上的登记。
    Reclaim,
}

impl fmt::Display for LifecycleOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleOperation::Start => "start",
            LifecycleOperation::Stop => "stop",
            LifecycleOperation::Reset => "reset",
            LifecycleOperation::Reclaim => "reclaim",
        })
    }
}

/// 服务引擎生命周期操作的失败完成信号。
///
/// # 教案式说明
/// - **意图 (Why)**：把启动失败（StartupFailure）、停止失败（ShutdownFailure）与契约违例
///   （ContractViolation）三类语义固定下来，宿主据此执行系统级决策；
/// - **契约 (What)**：
///   - `Startup` 携带逐项登记失败，以及回滚同样失败而残留在节点上的登记 `residual`，
///     宿主可据此做补偿清理；
///   - `StartupReason`/`ShutdownReason` 供不经由节点登记的引擎表达自定义原因；
///   - `Shutdown` 携带注销失败的登记项，其余登记项已尽力释放；
///   - `ContractViolation` 表示调用顺序违背状态机，引擎本体未被调用；
///   - `TimedOut` 由宿主的截止时间层生成，引擎本身不负责自我取消。
/// - **风险 (Trade-offs)**：`failures` 使用 `Vec` 保存，单次操作的登记数量通常很小，分配开销可忽略。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[non_exhaustive]
pub enum EngineError {
    #[error("engine `{engine}` failed to start: {}", FailureList(.failures))]
    Startup {
        engine: String,
        failures: Vec<RegistrationFailure>,
        residual: Vec<Registration>,
    },
    #[error("engine `{engine}` failed to start: {reason}")]
    StartupReason { engine: String, reason: String },
    #[error("engine `{engine}` failed to stop: {}", FailureList(.failures))]
    Shutdown {
        engine: String,
        failures: Vec<RegistrationFailure>,
    },
    #[error("engine `{engine}` failed to stop: {reason}")]
    ShutdownReason { engine: String, reason: String },
    #[error("engine `{engine}` cannot {operation} while {state:?}")]
    ContractViolation {
        engine: String,
        state: EngineState,
        operation: LifecycleOperation,
    },
    #[error("engine `{engine}` did not finish {operation} within {timeout:?}")]
    TimedOut {
        engine: String,
        operation: LifecycleOperation,
        timeout: Duration,
    },
}

impl EngineError {
    /// 以自定义原因构造启动失败。
    pub fn startup_reason(engine: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::StartupReason {
            engine: engine.into(),
            reason: reason.into(),
        }
    }

    /// 以自定义原因构造停止失败。
    pub fn shutdown_reason(engine: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::ShutdownReason {
            engine: engine.into(),
            reason: reason.into(),
        }
    }

    /// 稳定错误码，日志与报告中的检索维度。
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Startup { .. } | EngineError::StartupReason { .. } => {
                "engine.startup.failed"
            }
            EngineError::Shutdown { .. } | EngineError::ShutdownReason { .. } => {
                "engine.shutdown.failed"
            }
            EngineError::ContractViolation { .. } => "engine.contract.violation",
            EngineError::TimedOut { .. } => "engine.deadline.exceeded",
        }
    }

    /// 出错引擎的名称。
    pub fn engine(&self) -> &str {
        match self {
            EngineError::Startup { engine, .. }
            | EngineError::StartupReason { engine, .. }
            | EngineError::Shutdown { engine, .. }
            | EngineError::ShutdownReason { engine, .. }
            | EngineError::ContractViolation { engine, .. }
            | EngineError::TimedOut { engine, .. } => engine,
        }
    }

    /// 是否属于启动失败（含启动超时）。
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            EngineError::Startup { .. }
                | EngineError::StartupReason { .. }
                | EngineError::TimedOut {
                    operation: LifecycleOperation::Start,
                    ..
                }
        )
    }

    /// 是否属于停止失败（含停止超时）。
    pub fn is_shutdown(&self) -> bool {
        matches!(
            self,
            EngineError::Shutdown { .. }
                | EngineError::ShutdownReason { .. }
                | EngineError::TimedOut {
                    operation: LifecycleOperation::Stop,
                    ..
                }
        )
    }

    /// 逐项登记失败；无登记失败的变体返回空切片。
    pub fn failures(&self) -> &[RegistrationFailure] {
        match self {
            EngineError::Startup { failures, .. } | EngineError::Shutdown { failures, .. } => {
                failures
            }
            _ => &[],
        }
    }

    /// 启动失败后仍残留在节点上的登记。
    pub fn residual(&self) -> &[Registration] {
        match self {
            EngineError::Startup { residual, .. } => residual,
            _ => &[],
        }
    }
}

/// 将失败列表渲染为 `a; b; c` 形式。
struct FailureList<'a>(&'a [RegistrationFailure]);

impl fmt::Display for FailureList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, failure) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}
