//! # 引擎生命周期状态机
//!
//! ## 核心意图（Why）
//! - 让宿主对每个引擎实例的所处阶段有可验证的认知，调用顺序错误在到达引擎之前即被识别；
//! - 与 [`ContractStateMachine`] 的“状态查询 + 信号驱动”模式对齐，便于属性测试直接驱动。
//!
//! ## 状态机约束（What）
//! - 合法跃迁：
//!   - `Created --Start--> Starting`
//!   - `Starting --StartSucceeded--> Running`，`Starting --StartFailed--> Errored`
//!   - `Running --Stop--> Stopping`
//!   - `Stopping --StopSucceeded--> Stopped`，`Stopping --StopFailed--> Errored`
//! - `Created` 为初始态，`Stopped` 与 `Errored` 为终态；其余 (状态, 信号) 组合一律视为契约违例，
//!   状态保持不变。

use core::fmt;

use crate::error::{EngineError, LifecycleOperation};

/// 状态推进结果。
///
/// - `Noop`：状态未变化（非法信号被拒绝时同样返回此值）；
/// - `Transition`：发生跃迁。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateAdvance<S>
where
    S: Copy + Eq,
{
    Noop { state: S },
    Transition { from: S, to: S },
}

/// 最小状态机接口：读取状态、以信号推进状态。
///
/// # 契约说明（What）
/// - `state()` 无副作用；
/// - `on_signal(signal)` 返回 [`StateAdvance`]，返回 `Noop` 时状态必须保持不变；
/// - 接口不规定同步策略，实现需自行说明线程安全性。
pub trait ContractStateMachine {
    type State: Copy + Eq;
    type Signal;

    fn state(&self) -> Self::State;

    fn on_signal(&mut self, signal: &Self::Signal) -> StateAdvance<Self::State>;
}

/// 引擎实例所处的生命周期阶段。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EngineState {
    /// 已实例化，尚未调用 `start`。
    Created,
    /// `start` 在途。
    Starting,
    /// 启动完成，全部登记已生效。
    Running,
    /// `stop` 在途。
    Stopping,
    /// 停止完成，登记已全部释放。
    Stopped,
    /// 启动或停止失败。
    Errored,
}

impl EngineState {
    /// 在 `signal` 作用下的后继状态；非法组合返回 `None`。
    pub fn next(self, signal: LifecycleSignal) -> Option<EngineState> {
        use EngineState::*;
        use LifecycleSignal::*;

        match (self, signal) {
            (Created, Start) => Some(Starting),
            (Starting, StartSucceeded) => Some(Running),
            (Starting, StartFailed) => Some(Errored),
            (Running, Stop) => Some(Stopping),
            (Stopping, StopSucceeded) => Some(Stopped),
            (Stopping, StopFailed) => Some(Errored),
            _ => None,
        }
    }

    /// 是否为终态。
    pub fn is_terminal(self) -> bool {
        matches!(self, EngineState::Stopped | EngineState::Errored)
    }

    /// 是否有生命周期操作在途。
    pub fn is_in_flight(self) -> bool {
        matches!(self, EngineState::Starting | EngineState::Stopping)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EngineState::Created => "created",
            EngineState::Starting => "starting",
            EngineState::Running => "running",
            EngineState::Stopping => "stopping",
            EngineState::Stopped => "stopped",
            EngineState::Errored => "errored",
        })
    }
}

/// 驱动 [`EngineState`] 的输入信号。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum LifecycleSignal {
    Start,
    StartSucceeded,
    StartFailed,
    Stop,
    StopSucceeded,
    StopFailed,
}

impl LifecycleSignal {
    /// 信号所属的生命周期操作。
    pub fn operation(self) -> LifecycleOperation {
        match self {
            LifecycleSignal::Start
            | LifecycleSignal::StartSucceeded
            | LifecycleSignal::StartFailed => LifecycleOperation::Start,
            LifecycleSignal::Stop
            | LifecycleSignal::StopSucceeded
            | LifecycleSignal::StopFailed => LifecycleOperation::Stop,
        }
    }
}

/// 单个引擎实例的状态机。
///
/// # 教案式说明
/// - **意图 (Why)**：集中保存实例阶段，供 [`ManagedEngine`](crate::ManagedEngine) 与宿主查询；
/// - **契约 (What)**：`apply` 对非法信号返回 [`EngineError::ContractViolation`] 且不改变状态；
/// - **风险 (Trade-offs)**：状态机本身不加锁，调用方持有 `&mut` 即保证了独占。
#[derive(Clone, Debug)]
pub struct EngineLifecycle {
    engine: String,
    state: EngineState,
}

impl EngineLifecycle {
    pub fn new(engine: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            state: EngineState::Created,
        }
    }

    pub fn engine(&self) -> &str {
        &self.engine
    }

    /// 以信号推进状态；非法信号转为契约违例错误。
    pub fn apply(
        &mut self,
        signal: LifecycleSignal,
    ) -> Result<StateAdvance<EngineState>, EngineError> {
        match self.on_signal(&signal) {
            StateAdvance::Noop { state } => Err(EngineError::ContractViolation {
                engine: self.engine.clone(),
                state,
                operation: signal.operation(),
            }),
            transition => Ok(transition),
        }
    }
}

impl ContractStateMachine for EngineLifecycle {
    type State = EngineState;
    type Signal = LifecycleSignal;

    fn state(&self) -> EngineState {
        self.state
    }

    fn on_signal(&mut self, signal: &LifecycleSignal) -> StateAdvance<EngineState> {
        match self.state.next(*signal) {
            Some(to) => {
                let from = self.state;
                self.state = to;
                StateAdvance::Transition { from, to }
            }
            None => StateAdvance::Noop { state: self.state },
        }
    }
}
