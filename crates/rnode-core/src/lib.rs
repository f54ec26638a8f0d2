#![deny(unsafe_code)]
#![doc = "rnode-core: 资源节点（Resource Node）托管服务引擎的生命周期契约。"]
#![doc = ""]
#![doc = "== 契约概览 =="]
#![doc = "1. 每个服务引擎只暴露 `start(node)` / `stop(node)` 两个异步操作，完成信号始终以 Future 形式返回。"]
#![doc = "2. 引擎在 `start` 中通过节点登记的订阅与挂载，必须在 `stop` 中于同一节点上全部释放。"]
#![doc = "3. 单个实例的状态机为 `Created → Starting → Running → Stopping → Stopped`，失败进入 `Errored`。"]

/// 对外重新导出 `async_trait`，实现方无需额外声明依赖即可编写引擎。
pub use async_trait::async_trait;

pub mod binding;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod managed;
pub mod node;

pub use binding::{BindingEngine, BindingEngineBuilder};
pub use engine::{BoxEngine, NoopEngine, ServiceEngine};
pub use error::{EngineError, LifecycleOperation, NodeError, RegistrationFailure};
pub use ledger::RegistrationLedger;
pub use lifecycle::{
    ContractStateMachine, EngineLifecycle, EngineState, LifecycleSignal, StateAdvance,
};
pub use managed::ManagedEngine;
pub use node::{Message, Registration, Request, RequestHandler, ResourceNode, Response, Subscriber};
