use std::borrow::Cow;

use async_trait::async_trait;

use crate::{
    error::{EngineError, RegistrationFailure},
    node::{Registration, ResourceNode},
};

/// 装箱后的服务引擎，宿主以它统一持有不同实现。
pub type BoxEngine = Box<dyn ServiceEngine>;

/// `ServiceEngine` 是资源节点加载的可插拔模块必须满足的生命周期契约。
///
/// # 教案级注释
/// - **意图 (Why)**
///   - 宿主需要以统一方式编排大量彼此独立的模块：按确定顺序启动、在部分失败时补偿、
///     在停机时逐个释放；统一的 `start`/`stop` 能力面让编排逻辑与模块实现解耦。
///   - 不同模块之间的差异只体现在它们登记了哪些订阅与挂载，而非继承层次。
/// - **角色定位 (Where)**
///   - 由宿主（或其配置加载器）实例化，经 [`ManagedEngine`](crate::ManagedEngine) 或宿主自身的
///     编排逻辑调用；引擎只在调用期间借用 [`ResourceNode`]。
/// - **契约 (What)**
///   - `start(node)`：完成全部登记后才返回 `Ok(())`；任一登记失败时，应先回滚本次已完成的登记，
///     再返回携带原因的 [`EngineError`]；无法回滚的残留必须在错误中报告。
///   - `stop(node)`：撤销 `start` 期间登记的每一项，全部撤销或明确失败后才返回；
///     失败不得阻塞宿主继续停止其他引擎。
///   - 两个方法的默认实现立即成功且无副作用，空实现即是合法且行为良好的引擎。
///   - `held`/`reclaim`：引擎在失败或被放弃后仍持有的登记，以及逐项释放它们的回收入口；
///     宿主在截止时间到期或替换失败实例前调用 `reclaim`，默认实现不持有任何登记。
///   - `&mut self` 接收者在类型层面排除了同一实例上 `start`/`stop` 的重叠调用。
/// - **未定义行为 (Contract Violation)**
///   - 在 `start` 完成前调用 `stop`，或重复 `start`，基础契约不规定结果；具体实现需在文档中说明。
///     [`ManagedEngine`](crate::ManagedEngine) 会在调用到达引擎前拒绝这类顺序。
/// - **风险提示 (Trade-offs)**
///   - 契约不定义取消：一旦调用即应运行至完成；需要截止时间时由宿主在外层施加。
#[async_trait]
pub trait ServiceEngine: Send + Sync {
    /// 引擎标识，用于日志、报告与注册表键。
    fn name(&self) -> &str {
        "service-engine"
    }

    /// 启动引擎并在节点上登记其运行期副作用。
    async fn start(&mut self, node: &dyn ResourceNode) -> Result<(), EngineError> {
        let _ = node;
        Ok(())
    }

    /// 停止引擎并撤销 `start` 期间的全部登记。
    async fn stop(&mut self, node: &dyn ResourceNode) -> Result<(), EngineError> {
        let _ = node;
        Ok(())
    }

    /// 当前仍留在节点上、由本实例负责释放的登记。
    fn held(&self) -> Vec<Registration> {
        Vec::new()
    }

    /// 释放 [`held`](Self::held) 中的登记，返回仍未能释放的项。
    ///
    /// 可在 `start`/`stop` 被中途放弃后调用；实现必须容忍部分登记已不存在。
    async fn reclaim(&mut self, node: &dyn ResourceNode) -> Vec<RegistrationFailure> {
        let _ = node;
        Vec::new()
    }
}

#[async_trait]
impl<E> ServiceEngine for Box<E>
where
    E: ServiceEngine + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn start(&mut self, node: &dyn ResourceNode) -> Result<(), EngineError> {
        (**self).start(node).await
    }

    async fn stop(&mut self, node: &dyn ResourceNode) -> Result<(), EngineError> {
        (**self).stop(node).await
    }

    fn held(&self) -> Vec<Registration> {
        (**self).held()
    }

    async fn reclaim(&mut self, node: &dyn ResourceNode) -> Vec<RegistrationFailure> {
        (**self).reclaim(node).await
    }
}

/// 只使用默认行为的空引擎。
///
/// 任意次数的 `start`/`stop` 都立即成功，节点上不会出现任何登记。
#[derive(Clone, Debug)]
pub struct NoopEngine {
    name: Cow<'static, str>,
}

impl NoopEngine {
    pub fn new() -> Self {
        Self {
            name: Cow::Borrowed("noop"),
        }
    }

    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for NoopEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceEngine for NoopEngine {
    fn name(&self) -> &str {
        &self.name
    }
}
