use std::{sync::Arc, time::Duration};

use futures::future::join_all;
use rnode_core::{EngineError, EngineState, LifecycleOperation, ManagedEngine, ResourceNode};
use thiserror::Error;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

use crate::{
    config::{HostConfig, StartFailurePolicy, StartupMode},
    registry::{EngineFactory, FactoryError},
    report::{EngineOutcome, EngineRecord, ShutdownReport, StartupReport},
};

/// 宿主对单个引擎的运行期操作失败。
#[derive(Debug, Error)]
pub enum HostError {
    #[error("engine `{name}` is not hosted")]
    UnknownEngine { name: String },
    #[error("engine `{name}` has no factory and cannot be recreated from {state}")]
    NoFactory { name: String, state: EngineState },
    #[error("engine `{name}` is {state}; stop it before recreating")]
    Busy { name: String, state: EngineState },
    #[error(transparent)]
    Factory(#[from] FactoryError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// 宿主托管的一个引擎槽位：当前实例与可选的重建工厂。
pub(crate) struct EngineSlot {
    pub(crate) managed: ManagedEngine,
    pub(crate) factory: Option<Arc<dyn EngineFactory>>,
}

/// `EngineHost` 按确定顺序编排一组服务引擎的启动与停止。
///
/// # 教案级注释
/// - **设计目的 (Why)**
///   - 单个引擎只对自己的登记负责；系统级策略（启动顺序、失败后中止还是继续、截止时间、
///     停机时的失败隔离）集中在宿主，引擎实现无需感知彼此。
/// - **体系位置 (Where)**
///   - 由 [`HostBuilder`](crate::builder::HostBuilder) 生成；运行期只借用 [`ResourceNode`]，
///     节点的所有权留在调用方。
/// - **关键流程 (How)**
///   1. `start_all`：按配置顺序或并发启动处于 `Created` 的引擎；`abort` 策略下任一失败即停止后续启动，
///      并按逆序停止已运行的引擎；
///   2. `stop_all`：按启动的逆序停止每个 `Running` 的引擎，单个失败不影响其余引擎；
///      `Errored` 但仍持有登记的引擎在同一轮中回收；
///   3. 配置了截止时间时，超时的引擎被判定为失败并收敛到 `Errored`，随后在同一时限内回收它已生效的登记。
/// - **契约说明 (What)**
///   - [`is_ready`](Self::is_ready) 仅在全部引擎都处于 `Running` 时为真；
///   - 报告逐项记录结果与耗时，失败同时以 `error` 级日志输出。
/// - **风险提示 (Trade-offs)**
///   - 回收本身也可能失败或超时，此时登记仍由失败实例持有；应先调用 [`reclaim`](Self::reclaim)
///     直至成功，再经 [`recreate`](Self::recreate) 换成新实例。
pub struct EngineHost {
    config: HostConfig,
    slots: Vec<EngineSlot>,
}

impl core::fmt::Debug for EngineHost {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EngineHost")
            .field("config", &self.config)
            .field("engines", &self.states())
            .finish()
    }
}

impl EngineHost {
    pub(crate) fn new(config: HostConfig, slots: Vec<EngineSlot>) -> Self {
        Self { config, slots }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// 托管的引擎名称，按启动顺序排列。
    pub fn names(&self) -> Vec<&str> {
        self.slots.iter().map(|slot| slot.managed.name()).collect()
    }

    /// 每个引擎当前所处的状态，按启动顺序排列。
    pub fn states(&self) -> Vec<(String, EngineState)> {
        self.slots
            .iter()
            .map(|slot| (slot.managed.name().to_owned(), slot.managed.state()))
            .collect()
    }

    pub fn state_of(&self, name: &str) -> Option<EngineState> {
        self.find(name).map(|slot| slot.managed.state())
    }

    pub fn engine(&self, name: &str) -> Option<&ManagedEngine> {
        self.find(name).map(|slot| &slot.managed)
    }

    /// 全部引擎均已运行时宿主才宣告就绪。
    pub fn is_ready(&self) -> bool {
        self.slots
            .iter()
            .all(|slot| slot.managed.state() == EngineState::Running)
    }

    /// 启动全部处于 `Created` 的引擎。
    pub async fn start_all(&mut self, node: &dyn ResourceNode) -> StartupReport {
        let limit = self.config.start_timeout();
        let abort = self.config.on_start_failure == StartFailurePolicy::Abort;
        info!(
            engines = self.slots.len(),
            mode = ?self.config.startup,
            "starting hosted engines"
        );

        let mut report = StartupReport::default();
        match self.config.startup {
            StartupMode::Sequential => {
                for slot in &mut self.slots {
                    if report.aborted {
                        report.records.push(EngineRecord::skipped(slot.managed.name()));
                        continue;
                    }
                    let record = start_one(&mut slot.managed, node, limit).await;
                    report.aborted = abort && record.is_failure();
                    report.records.push(record);
                }
            }
            StartupMode::Concurrent => {
                let attempts = self
                    .slots
                    .iter_mut()
                    .map(|slot| start_one(&mut slot.managed, node, limit));
                report.records = join_all(attempts).await;
                report.aborted = abort && report.failure_count() > 0;
            }
        }

        if report.aborted {
            warn!(
                failures = report.failure_count(),
                "startup aborted; stopping engines that came up"
            );
            report.rollback = self.stop_running(node).await;
        }

        info!(
            failures = report.failure_count(),
            ready = self.is_ready(),
            "hosted engine startup finished"
        );
        report
    }

    /// 按启动的逆序停止全部运行中的引擎。
    pub async fn stop_all(&mut self, node: &dyn ResourceNode) -> ShutdownReport {
        info!(engines = self.slots.len(), "stopping hosted engines");
        let limit = self.config.stop_timeout();
        let mut report = ShutdownReport::default();
        for slot in self.slots.iter_mut().rev() {
            let record = match slot.managed.state() {
                EngineState::Running => stop_one(&mut slot.managed, node, limit).await,
                EngineState::Errored if !slot.managed.held().is_empty() => {
                    reclaim_one(&mut slot.managed, node, limit).await
                }
                _ => EngineRecord::skipped(slot.managed.name()),
            };
            report.records.push(record);
        }
        info!(
            failures = report.failure_count(),
            "hosted engine shutdown finished"
        );
        report
    }

    /// 释放 `Errored` 引擎仍留在节点上的登记，时限沿用停止截止时间。
    ///
    /// 仍有登记未能释放时返回 [`HostError::Engine`]，可在节点恢复后再次调用。
    pub async fn reclaim(&mut self, name: &str, node: &dyn ResourceNode) -> Result<(), HostError> {
        let limit = self.config.stop_timeout();
        let slot = slot_mut(&mut self.slots, name)?;
        let record = reclaim_one(&mut slot.managed, node, limit).await;
        match record.error() {
            Some(error) => Err(HostError::Engine(error.clone())),
            None => Ok(()),
        }
    }

    /// 将引擎换成可再次启动的实例。
    ///
    /// 被替换的实例若仍持有登记会以 `warn` 记录，这些登记此后无人释放；替换前应先 [`reclaim`](Self::reclaim)。
    ///
    /// - `Created`：无需处理；
    /// - `Stopped`：有工厂时换成新实例，否则原地复位；
    /// - `Errored`：必须经工厂重建，没有工厂返回 [`HostError::NoFactory`]；
    /// - 运行中或操作在途：返回 [`HostError::Busy`]。
    pub fn recreate(&mut self, name: &str) -> Result<(), HostError> {
        let slot = slot_mut(&mut self.slots, name)?;

        let state = slot.managed.state();
        match (state, &slot.factory) {
            (EngineState::Created, _) => return Ok(()),
            (EngineState::Stopped | EngineState::Errored, Some(factory)) => {
                let held = slot.managed.held();
                if !held.is_empty() {
                    warn!(
                        engine = name,
                        held = ?held,
                        "discarding an engine that still holds registrations"
                    );
                }
                let engine = factory.create(&self.config.options_for(name))?;
                slot.managed = ManagedEngine::labelled(name, engine);
            }
            (EngineState::Stopped, None) => slot.managed.reset()?,
            (EngineState::Errored, None) => {
                return Err(HostError::NoFactory {
                    name: name.to_owned(),
                    state,
                });
            }
            _ => {
                return Err(HostError::Busy {
                    name: name.to_owned(),
                    state,
                });
            }
        }
        info!(engine = name, from = %state, "engine recreated");
        Ok(())
    }

    /// 停止（如在运行）或回收（如已失败）、重建并再次启动单个引擎。
    pub async fn restart(
        &mut self,
        name: &str,
        node: &dyn ResourceNode,
    ) -> Result<EngineRecord, HostError> {
        let limit = self.config.stop_timeout();
        let slot = slot_mut(&mut self.slots, name)?;
        let settled = match slot.managed.state() {
            EngineState::Running => Some(stop_one(&mut slot.managed, node, limit).await),
            EngineState::Errored if !slot.managed.held().is_empty() => {
                Some(reclaim_one(&mut slot.managed, node, limit).await)
            }
            _ => None,
        };
        if let Some(error) = settled.as_ref().and_then(EngineRecord::error) {
            return Err(HostError::Engine(error.clone()));
        }

        self.recreate(name)?;
        let limit = self.config.start_timeout();
        let slot = slot_mut(&mut self.slots, name)?;
        Ok(start_one(&mut slot.managed, node, limit).await)
    }

    async fn stop_running(&mut self, node: &dyn ResourceNode) -> Vec<EngineRecord> {
        let limit = self.config.stop_timeout();
        let mut records = Vec::new();
        for slot in self.slots.iter_mut().rev() {
            if slot.managed.state() == EngineState::Running {
                records.push(stop_one(&mut slot.managed, node, limit).await);
            }
        }
        records
    }

    fn find(&self, name: &str) -> Option<&EngineSlot> {
        self.slots.iter().find(|slot| slot.managed.name() == name)
    }
}

fn slot_mut<'a>(slots: &'a mut [EngineSlot], name: &str) -> Result<&'a mut EngineSlot, HostError> {
    slots
        .iter_mut()
        .find(|slot| slot.managed.name() == name)
        .ok_or_else(|| HostError::UnknownEngine {
            name: name.to_owned(),
        })
}

/// 启动单个引擎；非 `Created` 的引擎不会被调用，记为跳过。
async fn start_one(
    managed: &mut ManagedEngine,
    node: &dyn ResourceNode,
    limit: Option<Duration>,
) -> EngineRecord {
    if managed.state() != EngineState::Created {
        return EngineRecord::skipped(managed.name());
    }
    let started = Instant::now();
    let result = match limit {
        None => managed.start(node).await,
        Some(limit) => {
            let attempt = timeout(limit, managed.start(node)).await;
            match attempt {
                Ok(result) => result,
                Err(_) => Err(abandon_and_reclaim(managed, node, limit).await),
            }
        }
    };
    finish(managed.name(), started, result)
}

async fn stop_one(
    managed: &mut ManagedEngine,
    node: &dyn ResourceNode,
    limit: Option<Duration>,
) -> EngineRecord {
    let started = Instant::now();
    let result = match limit {
        None => managed.stop(node).await,
        Some(limit) => {
            let attempt = timeout(limit, managed.stop(node)).await;
            match attempt {
                Ok(result) => result,
                Err(_) => Err(abandon_and_reclaim(managed, node, limit).await),
            }
        }
    };
    finish(managed.name(), started, result)
}

/// 释放 `Errored` 引擎仍持有的登记。
async fn reclaim_one(
    managed: &mut ManagedEngine,
    node: &dyn ResourceNode,
    limit: Option<Duration>,
) -> EngineRecord {
    let started = Instant::now();
    let result = match limit {
        None => managed.reclaim(node).await,
        Some(limit) => match timeout(limit, managed.reclaim(node)).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::TimedOut {
                engine: managed.name().to_owned(),
                operation: LifecycleOperation::Reclaim,
                timeout: limit,
            }),
        },
    };
    finish(managed.name(), started, result)
}

/// 截止时间到期：放弃在途操作，再在同一时限内回收引擎已生效的登记。
///
/// 返回描述原始超时的错误；回收失败时登记仍由实例持有，留待 [`EngineHost::reclaim`] 重试。
async fn abandon_and_reclaim(
    managed: &mut ManagedEngine,
    node: &dyn ResourceNode,
    limit: Duration,
) -> EngineError {
    let expired = managed.abandon(limit);
    if managed.held().is_empty() {
        return expired;
    }
    if timeout(limit, managed.reclaim(node)).await.is_err() {
        warn!(
            engine = managed.name(),
            held = ?managed.held(),
            "reclaim after deadline did not finish"
        );
    }
    expired
}

fn finish(name: &str, started: Instant, result: Result<(), EngineError>) -> EngineRecord {
    let elapsed = started.elapsed();
    let outcome = match result {
        Ok(()) => EngineOutcome::Completed,
        Err(failure) => EngineOutcome::Failed(failure),
    };
    debug!(
        engine = name,
        elapsed_ms = elapsed.as_millis() as u64,
        failed = matches!(outcome, EngineOutcome::Failed(_)),
        "hosted engine operation settled"
    );
    EngineRecord::new(name, outcome, elapsed)
}
