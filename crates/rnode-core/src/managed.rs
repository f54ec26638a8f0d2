use core::time::Duration;

use tracing::{error, info, warn};

use crate::{
    engine::BoxEngine,
    error::{EngineError, LifecycleOperation},
    lifecycle::{
        ContractStateMachine, EngineLifecycle, EngineState, LifecycleSignal, StateAdvance,
    },
    node::{Registration, ResourceNode},
};

/// `ManagedEngine` 把任意 [`ServiceEngine`](crate::ServiceEngine) 与其生命周期状态机绑定在一起。
///
/// # 教案级注释
/// - **意图 (Why)**
///   - 基础契约把“先 stop 后 start”“重复 start”等顺序错误留给具体引擎解释；宿主侧需要一个统一的、
///     可查询的执行者，在调用到达引擎之前就把这些顺序错误识别为契约违例。
/// - **角色定位 (Where)**
///   - 宿主编排层（`rnode-hosting`）为每个注册的引擎创建一个 `ManagedEngine`，并据其状态判断
///     系统是否就绪、停机时哪些引擎需要释放。
/// - **执行逻辑 (How)**
///   1. `start`：要求当前为 `Created`，推进到 `Starting` 后等待引擎完成，再依结果推进到
///      `Running` 或 `Errored`；
///   2. `stop`：要求当前为 `Running`，流程与 `start` 对称；
///   3. `reclaim`：仅在 `Errored` 时可用，释放失败或被放弃的实例仍持有的登记；
///   4. 每次跃迁都输出结构化日志（`engine`、`from`、`to`）。
/// - **契约 (What)**
///   - 非法调用返回 [`EngineError::ContractViolation`]，引擎本体不会被调用，状态保持不变；
///   - 引擎返回的失败原样向上传递，同时保存在 [`last_error`](Self::last_error) 中。
/// - **风险提示 (Trade-offs)**
///   - 若外层因截止时间丢弃了在途的 Future，状态会停留在 `Starting`/`Stopping`，
///     调用方必须随后调用 [`abandon`](Self::abandon) 把实例收敛到 `Errored`。
pub struct ManagedEngine {
    label: String,
    engine: BoxEngine,
    lifecycle: EngineLifecycle,
    last_error: Option<EngineError>,
}

impl ManagedEngine {
    /// 以引擎自身名称作为标签进行托管。
    pub fn new(engine: BoxEngine) -> Self {
        let label = engine.name().to_owned();
        Self::labelled(label, engine)
    }

    /// 以宿主指定的标签托管引擎，标签用于日志、报告与错误。
    pub fn labelled(label: impl Into<String>, engine: BoxEngine) -> Self {
        let label = label.into();
        Self {
            lifecycle: EngineLifecycle::new(label.clone()),
            label,
            engine,
            last_error: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.label
    }

    pub fn state(&self) -> EngineState {
        self.lifecycle.state()
    }

    /// 最近一次生命周期操作的失败。
    pub fn last_error(&self) -> Option<&EngineError> {
        self.last_error.as_ref()
    }

    /// 访问被托管的引擎。
    pub fn engine(&self) -> &BoxEngine {
        &self.engine
    }

    /// 引擎仍留在节点上的登记。
    pub fn held(&self) -> Vec<Registration> {
        self.engine.held()
    }

    pub async fn start(&mut self, node: &dyn ResourceNode) -> Result<(), EngineError> {
        self.advance(LifecycleSignal::Start)?;
        let outcome = self.engine.start(node).await;
        self.settle(
            outcome,
            LifecycleSignal::StartSucceeded,
            LifecycleSignal::StartFailed,
        )
    }

    pub async fn stop(&mut self, node: &dyn ResourceNode) -> Result<(), EngineError> {
        self.advance(LifecycleSignal::Stop)?;
        let outcome = self.engine.stop(node).await;
        self.settle(
            outcome,
            LifecycleSignal::StopSucceeded,
            LifecycleSignal::StopFailed,
        )
    }

    /// 将已停止的实例复位为 `Created`，以便在同一实例上再次启动。
    ///
    /// 仅允许从 `Stopped` 复位：此时引擎的登记已全部释放。`Errored` 的实例可能仍有残留登记，
    /// 宿主应丢弃并重新创建。
    pub fn reset(&mut self) -> Result<(), EngineError> {
        let state = self.state();
        if state != EngineState::Stopped {
            return Err(EngineError::ContractViolation {
                engine: self.label.clone(),
                state,
                operation: LifecycleOperation::Reset,
            });
        }
        self.lifecycle = EngineLifecycle::new(self.label.clone());
        self.last_error = None;
        info!(engine = %self.label, "engine reset for restart");
        Ok(())
    }

    /// 放弃在途操作：外层截止时间到期后调用，把 `Starting`/`Stopping` 收敛为 `Errored`。
    ///
    /// 返回描述超时的 [`EngineError::TimedOut`]；若实例并无在途操作，状态保持不变。
    pub fn abandon(&mut self, timeout: Duration) -> EngineError {
        let state = self.state();
        let (operation, signal) = match state {
            EngineState::Stopping => (LifecycleOperation::Stop, LifecycleSignal::StopFailed),
            _ => (LifecycleOperation::Start, LifecycleSignal::StartFailed),
        };
        let error = EngineError::TimedOut {
            engine: self.label.clone(),
            operation,
            timeout,
        };
        if state.is_in_flight() {
            let settled = self.advance(signal);
            debug_assert!(settled.is_ok(), "in-flight state must accept its failure signal");
            warn!(engine = %self.label, %operation, ?timeout, "engine lifecycle deadline exceeded");
            self.last_error = Some(error.clone());
        }
        error
    }

    /// 释放 `Errored` 实例仍持有的登记。
    ///
    /// - 其他状态返回 [`EngineError::ContractViolation`]：运行中的登记应经 `stop` 释放；
    /// - 仍有登记无法释放时返回 [`EngineError::Shutdown`]，未释放的项继续由引擎持有，可再次调用。
    pub async fn reclaim(&mut self, node: &dyn ResourceNode) -> Result<(), EngineError> {
        let state = self.state();
        if state != EngineState::Errored {
            return Err(EngineError::ContractViolation {
                engine: self.label.clone(),
                state,
                operation: LifecycleOperation::Reclaim,
            });
        }
        let failures = self.engine.reclaim(node).await;
        if failures.is_empty() {
            info!(engine = %self.label, "errored engine registrations reclaimed");
            return Ok(());
        }
        let failure = EngineError::Shutdown {
            engine: self.label.clone(),
            failures,
        };
        warn!(
            engine = %self.label,
            code = failure.code(),
            error = %failure,
            "errored engine still holds registrations"
        );
        Err(failure)
    }

    /// 拆出被托管的引擎，交由调用方丢弃或复用。
    pub fn into_inner(self) -> BoxEngine {
        self.engine
    }

    fn advance(&mut self, signal: LifecycleSignal) -> Result<(), EngineError> {
        match self.lifecycle.apply(signal) {
            Ok(StateAdvance::Transition { from, to }) => {
                info!(engine = %self.label, %from, %to, "engine lifecycle transition");
                Ok(())
            }
            Ok(StateAdvance::Noop { .. }) => Ok(()),
            Err(violation) => {
                warn!(
                    engine = %self.label,
                    code = violation.code(),
                    error = %violation,
                    "engine lifecycle call rejected"
                );
                Err(violation)
            }
        }
    }

    fn settle(
        &mut self,
        outcome: Result<(), EngineError>,
        on_success: LifecycleSignal,
        on_failure: LifecycleSignal,
    ) -> Result<(), EngineError> {
        match outcome {
            Ok(()) => {
                self.advance(on_success)?;
                self.last_error = None;
                Ok(())
            }
            Err(failure) => {
                self.advance(on_failure)?;
                error!(
                    engine = %self.label,
                    operation = %on_failure.operation(),
                    code = failure.code(),
                    error = %failure,
                    "engine lifecycle operation failed"
                );
                self.last_error = Some(failure.clone());
                Err(failure)
            }
        }
    }
}

impl core::fmt::Debug for ManagedEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ManagedEngine")
            .field("label", &self.label)
            .field("state", &self.state())
            .field("last_error", &self.last_error)
            .finish()
    }
}
