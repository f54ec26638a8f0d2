//! # BindingEngine：声明式登记引擎
//!
//! ## 核心意图（Why）
//! - 绝大多数服务引擎的 `start` 只是“订阅若干频道 + 挂载若干处理器”，`stop` 则是逐项撤销；
//!   把这一模式做成可复用实现，配对与回滚逻辑只需正确实现一次；
//! - 具体业务只需提供 [`Subscriber`] 与 [`RequestHandler`] 实现，再用构建器声明登记清单。
//!
//! ## 行为契约（What）
//! - `start` 并发发起全部登记，全部生效后才返回成功；每项登记一经生效即记入账本，
//!   `start` 的 Future 在中途被丢弃时，已生效的登记仍可经 `reclaim` 释放；
//! - 任一登记失败时，本次尝试中已生效的登记全部回滚，再返回 [`EngineError::Startup`]；
//!   回滚同样失败的登记列在 `residual` 中；
//! - `stop` 经 [`RegistrationLedger`] 逆序释放全部登记，失败项汇总进 [`EngineError::Shutdown`]，
//!   其余项照常释放；
//! - 运行中再次 `start`，或仍持有失败残留时 `start`，返回契约违例；未 `start` 即 `stop` 是无副作用的成功。

use std::sync::Arc;

use async_trait::async_trait;
use futures::{
    FutureExt, StreamExt,
    future::BoxFuture,
    stream::FuturesUnordered,
};
use tracing::{debug, warn};

use crate::{
    engine::ServiceEngine,
    error::{EngineError, LifecycleOperation, NodeError, RegistrationFailure},
    ledger::RegistrationLedger,
    lifecycle::EngineState,
    node::{Registration, RequestHandler, ResourceNode, Subscriber},
};

type RegistrationAttempt<'a> = BoxFuture<'a, (Registration, Result<(), NodeError>)>;

/// 按登记清单运行的服务引擎。
pub struct BindingEngine {
    name: String,
    subscriptions: Vec<(String, Arc<dyn Subscriber>)>,
    mounts: Vec<(String, Arc<dyn RequestHandler>)>,
    ledger: RegistrationLedger,
    running: bool,
}

impl BindingEngine {
    pub fn builder(name: impl Into<String>) -> BindingEngineBuilder {
        BindingEngineBuilder {
            name: name.into(),
            subscriptions: Vec::new(),
            mounts: Vec::new(),
        }
    }

    /// 当前仍由本引擎持有的登记。
    pub fn ledger(&self) -> &RegistrationLedger {
        &self.ledger
    }

    /// 声明的全部登记，顺序为先订阅后挂载。
    pub fn declared(&self) -> Vec<Registration> {
        self.subscriptions
            .iter()
            .map(|(channel, _)| Registration::subscription(channel.as_str()))
            .chain(
                self.mounts
                    .iter()
                    .map(|(path, _)| Registration::mount(path.as_str())),
            )
            .collect()
    }

    fn attempts<'a>(&self, node: &'a dyn ResourceNode) -> Vec<RegistrationAttempt<'a>> {
        let subscribe = self.subscriptions.iter().map(|(channel, subscriber)| {
            let registration = Registration::subscription(channel.as_str());
            let subscriber = Arc::clone(subscriber);
            async move {
                let outcome = node.subscribe(registration.target(), subscriber).await;
                (registration, outcome)
            }
            .boxed()
        });
        let mount = self.mounts.iter().map(|(path, handler)| {
            let registration = Registration::mount(path.as_str());
            let handler = Arc::clone(handler);
            async move {
                let outcome = node.mount(registration.target(), handler).await;
                (registration, outcome)
            }
            .boxed()
        });
        subscribe.chain(mount).collect()
    }
}

impl core::fmt::Debug for BindingEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BindingEngine")
            .field("name", &self.name)
            .field("declared", &self.declared())
            .field("held", &self.ledger.entries())
            .field("running", &self.running)
            .finish()
    }
}

#[async_trait]
impl ServiceEngine for BindingEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&mut self, node: &dyn ResourceNode) -> Result<(), EngineError> {
        if self.running || !self.ledger.is_empty() {
            let state = if self.running {
                EngineState::Running
            } else {
                EngineState::Errored
            };
            return Err(EngineError::ContractViolation {
                engine: self.name.clone(),
                state,
                operation: LifecycleOperation::Start,
            });
        }

        let mut pending: FuturesUnordered<_> = self.attempts(node).into_iter().collect();
        let mut failures = Vec::new();
        while let Some((registration, outcome)) = pending.next().await {
            match outcome {
                Ok(()) => {
                    debug!(engine = %self.name, %registration, "registration in effect");
                    self.ledger.record(registration);
                }
                Err(error) => failures.push(RegistrationFailure::new(registration, error)),
            }
        }

        if failures.is_empty() {
            self.running = true;
            return Ok(());
        }

        let rollback_failures = self.ledger.release_all(node).await;
        let residual: Vec<Registration> = rollback_failures
            .into_iter()
            .filter(|failure| !failure.error.is_absent())
            .map(|failure| failure.registration)
            .collect();
        if !residual.is_empty() {
            warn!(
                engine = %self.name,
                residual = residual.len(),
                "startup rollback left registrations on the node"
            );
        }

        Err(EngineError::Startup {
            engine: self.name.clone(),
            failures,
            residual,
        })
    }

    async fn stop(&mut self, node: &dyn ResourceNode) -> Result<(), EngineError> {
        self.running = false;
        let failures = self.ledger.release_all(node).await;
        if failures.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Shutdown {
                engine: self.name.clone(),
                failures,
            })
        }
    }

    fn held(&self) -> Vec<Registration> {
        self.ledger.entries().to_vec()
    }

    async fn reclaim(&mut self, node: &dyn ResourceNode) -> Vec<RegistrationFailure> {
        self.running = false;
        self.ledger.release_all(node).await
    }
}

/// [`BindingEngine`] 构建器。
pub struct BindingEngineBuilder {
    name: String,
    subscriptions: Vec<(String, Arc<dyn Subscriber>)>,
    mounts: Vec<(String, Arc<dyn RequestHandler>)>,
}

impl BindingEngineBuilder {
    /// 声明一项频道订阅。
    pub fn subscribe(mut self, channel: impl Into<String>, subscriber: Arc<dyn Subscriber>) -> Self {
        self.subscriptions.push((channel.into(), subscriber));
        self
    }

    /// 声明一个挂载点。
    pub fn mount(mut self, path: impl Into<String>, handler: Arc<dyn RequestHandler>) -> Self {
        self.mounts.push((path.into(), handler));
        self
    }

    pub fn build(self) -> BindingEngine {
        BindingEngine {
            name: self.name,
            subscriptions: self.subscriptions,
            mounts: self.mounts,
            ledger: RegistrationLedger::new(),
            running: false,
        }
    }
}
