//! 登记账本：记录引擎在节点上留下的每一项登记，并在停止或回滚时成对释放。

use tracing::{debug, warn};

use crate::{
    error::RegistrationFailure,
    node::{Registration, ResourceNode},
};

/// `RegistrationLedger` 保存引擎成功完成的登记，按登记顺序排列。
///
/// # 教案级注释
/// - **意图 (Why)**：节点上的订阅与挂载由引擎拥有，直到它显式释放；账本让“释放什么”有据可查，
///   从而保证 `stop` 之后节点登记表回到 `start` 之前的样子，不遗留孤儿登记。
/// - **执行逻辑 (How)**：
///   1. 每项登记一经生效即调用 [`record`](Self::record)，不等同批其他登记完成；
///   2. [`release_all`](Self::release_all) 按登记的逆序逐项注销，即使中途失败也继续处理后续项；
///   3. 注销失败且节点上仍可能存在的项保留在账本中，由
///      [`ServiceEngine::reclaim`](crate::ServiceEngine::reclaim) 再次调用 `release_all` 重试；
///      目标已不存在的项直接移出。
/// - **契约 (What)**：
///   - 返回的失败列表与注销顺序一致；账本为空表示节点上没有该引擎的残留；
///   - 条目只在对应的注销完成后才移出，`release_all` 的 Future 被中途丢弃时，未完成的项仍留在账本中。
#[derive(Clone, Debug, Default)]
pub struct RegistrationLedger {
    entries: Vec<Registration>,
}

impl RegistrationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一项已生效的登记。
    pub fn record(&mut self, registration: Registration) {
        self.entries.push(registration);
    }

    pub fn contains(&self, registration: &Registration) -> bool {
        self.entries.contains(registration)
    }

    pub fn entries(&self) -> &[Registration] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 逆序注销全部登记，返回失败项。
    pub async fn release_all(&mut self, node: &dyn ResourceNode) -> Vec<RegistrationFailure> {
        let mut failures = Vec::new();

        for index in (0..self.entries.len()).rev() {
            let registration = self.entries[index].clone();
            match registration.release(node).await {
                Ok(()) => {
                    self.entries.remove(index);
                    debug!(%registration, "registration released");
                }
                Err(error) => {
                    warn!(%registration, code = error.code(), %error, "registration release failed");
                    if error.is_absent() {
                        self.entries.remove(index);
                    }
                    failures.push(RegistrationFailure::new(registration, error));
                }
            }
        }

        failures
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        task::Context,
    };

    use async_trait::async_trait;
    use futures::{FutureExt, executor::block_on};

    use super::*;
    use crate::{
        error::NodeError,
        node::{RequestHandler, Subscriber},
    };

    /// 记录注销调用顺序，并对指定目标返回预设错误。
    #[derive(Default)]
    struct ScriptedNode {
        calls: Mutex<Vec<String>>,
        failing: Vec<(String, NodeError)>,
        stalled: Vec<String>,
    }

    impl ScriptedNode {
        async fn outcome(&self, target: &str) -> Result<(), NodeError> {
            self.calls.lock().unwrap().push(target.to_owned());
            if self.stalled.iter().any(|name| name == target) {
                futures::future::pending::<()>().await;
            }
            match self.failing.iter().find(|(name, _)| name == target) {
                Some((_, error)) => Err(error.clone()),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl ResourceNode for ScriptedNode {
        async fn subscribe(
            &self,
            _channel: &str,
            _subscriber: Arc<dyn Subscriber>,
        ) -> Result<(), NodeError> {
            Ok(())
        }

        async fn unsubscribe(&self, channel: &str) -> Result<(), NodeError> {
            self.outcome(channel).await
        }

        async fn mount(
            &self,
            _path: &str,
            _handler: Arc<dyn RequestHandler>,
        ) -> Result<(), NodeError> {
            Ok(())
        }

        async fn unmount(&self, path: &str) -> Result<(), NodeError> {
            self.outcome(path).await
        }
    }

    #[test]
    fn releases_in_reverse_order() {
        let node = ScriptedNode::default();
        let mut ledger = RegistrationLedger::new();
        ledger.record(Registration::subscription("example"));
        ledger.record(Registration::mount("/"));

        let failures = block_on(ledger.release_all(&node));

        assert!(failures.is_empty());
        assert!(ledger.is_empty());
        assert_eq!(*node.calls.lock().unwrap(), vec!["/", "example"]);
    }

    #[test]
    fn dropped_release_keeps_unfinished_entries() {
        let node = ScriptedNode {
            stalled: vec!["example".to_owned()],
            ..ScriptedNode::default()
        };
        let mut ledger = RegistrationLedger::new();
        ledger.record(Registration::subscription("example"));
        ledger.record(Registration::mount("/"));

        {
            let mut release = ledger.release_all(&node).boxed();
            let waker = futures::task::noop_waker();
            let mut cx = Context::from_waker(&waker);
            assert!(release.poll_unpin(&mut cx).is_pending());
        }

        assert_eq!(*node.calls.lock().unwrap(), vec!["/", "example"]);
        assert_eq!(ledger.entries(), &[Registration::subscription("example")]);
    }

    #[test]
    fn keeps_going_after_a_failure_and_retains_live_entries() {
        let node = ScriptedNode {
            failing: vec![
                (
                    "/".to_owned(),
                    NodeError::Unavailable {
                        reason: "router offline".to_owned(),
                    },
                ),
                (
                    "gone".to_owned(),
                    NodeError::NotSubscribed {
                        channel: "gone".to_owned(),
                    },
                ),
            ],
            ..ScriptedNode::default()
        };
        let mut ledger = RegistrationLedger::new();
        ledger.record(Registration::subscription("gone"));
        ledger.record(Registration::subscription("example"));
        ledger.record(Registration::mount("/"));

        let failures = block_on(ledger.release_all(&node));

        assert_eq!(node.calls.lock().unwrap().len(), 3);
        assert_eq!(failures.len(), 2);
        assert_eq!(ledger.entries(), &[Registration::mount("/")]);
    }
}
