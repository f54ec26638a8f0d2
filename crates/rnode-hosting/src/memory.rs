//! # InMemoryNode：进程内资源节点
//!
//! ## 核心意图（Why）
//! - 为宿主提供开箱即用的 [`ResourceNode`] 实现：订阅表与挂载表保存在内存中，
//!   引擎的登记与注销直接作用于这两张表；
//! - 同时承担宿主侧的消息投递与请求分发，使单进程部署与集成测试无需额外组件。
//!
//! ## 行为契约（What）
//! - 每个频道至多一个订阅者，每个路径至多一个处理器；冲突返回 `ChannelTaken`/`PathTaken`；
//! - 注销不存在的条目返回 `NotSubscribed`/`NotMounted`；
//! - 被策略拒绝的目标（[`InMemoryNode::deny`]）在登记时返回 `Rejected`；
//! - 请求按最长前缀匹配挂载点，`/` 匹配一切路径；无匹配时返回 404。
//!
//! ## 风险提示（Trade-offs）
//! - `DashMap` guard 在持有期间会阻塞同分片写操作；投递与分发先克隆出 `Arc` 再释放 guard，
//!   订阅者与处理器的执行不占用表锁。

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::{DashMap, mapref::entry::Entry};
use rnode_core::{
    Message, NodeError, Request, RequestHandler, ResourceNode, Response, Subscriber,
};
use tracing::{debug, trace};

/// 节点能力面各方法的累计调用次数。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct NodeCalls {
    pub subscribe: usize,
    pub unsubscribe: usize,
    pub mount: usize,
    pub unmount: usize,
}

#[derive(Debug, Default)]
struct CallCounters {
    subscribe: AtomicUsize,
    unsubscribe: AtomicUsize,
    mount: AtomicUsize,
    unmount: AtomicUsize,
}

/// 以 `DashMap` 保存订阅表与挂载表的资源节点。
#[derive(Default)]
pub struct InMemoryNode {
    subscriptions: DashMap<String, Arc<dyn Subscriber>>,
    mounts: DashMap<String, Arc<dyn RequestHandler>>,
    denied: DashMap<String, String>,
    calls: CallCounters,
}

impl InMemoryNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按策略拒绝某个频道名或挂载路径，后续对它的登记都会失败。
    pub fn deny(&self, target: impl Into<String>, reason: impl Into<String>) {
        self.denied.insert(target.into(), reason.into());
    }

    /// 撤销拒绝策略。
    pub fn allow(&self, target: &str) {
        self.denied.remove(target);
    }

    /// 向频道投递消息，返回是否存在订阅者。
    pub async fn publish(&self, channel: &str, payload: impl Into<Bytes>) -> bool {
        let subscriber = self
            .subscriptions
            .get(channel)
            .map(|entry| Arc::clone(entry.value()));
        match subscriber {
            Some(subscriber) => {
                subscriber.on_message(Message::new(channel, payload)).await;
                true
            }
            None => {
                trace!(channel, "message dropped: no subscriber");
                false
            }
        }
    }

    /// 将请求路由到最长前缀匹配的挂载点。
    pub async fn dispatch(&self, request: Request) -> Response {
        let handler = self
            .mounts
            .iter()
            .filter(|entry| path_matches(entry.key(), &request.path))
            .max_by_key(|entry| entry.key().len())
            .map(|entry| Arc::clone(entry.value()));
        match handler {
            Some(handler) => handler.handle(request).await,
            None => Response::not_found(),
        }
    }

    /// 当前订阅的频道，按字典序排列。
    pub fn subscriptions(&self) -> Vec<String> {
        let mut channels: Vec<String> = self
            .subscriptions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        channels.sort();
        channels
    }

    /// 当前挂载的路径，按字典序排列。
    pub fn mounts(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.mounts.iter().map(|entry| entry.key().clone()).collect();
        paths.sort();
        paths
    }

    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.subscriptions.contains_key(channel)
    }

    pub fn is_mounted(&self, path: &str) -> bool {
        self.mounts.contains_key(path)
    }

    /// 订阅表与挂载表是否均为空。
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty() && self.mounts.is_empty()
    }

    pub fn calls(&self) -> NodeCalls {
        NodeCalls {
            subscribe: self.calls.subscribe.load(Ordering::Relaxed),
            unsubscribe: self.calls.unsubscribe.load(Ordering::Relaxed),
            mount: self.calls.mount.load(Ordering::Relaxed),
            unmount: self.calls.unmount.load(Ordering::Relaxed),
        }
    }

    fn check_policy(&self, target: &str) -> Result<(), NodeError> {
        match self.denied.get(target) {
            Some(reason) => Err(NodeError::Rejected {
                target: target.to_owned(),
                reason: reason.value().clone(),
            }),
            None => Ok(()),
        }
    }
}

impl core::fmt::Debug for InMemoryNode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemoryNode")
            .field("subscriptions", &self.subscriptions())
            .field("mounts", &self.mounts())
            .field("calls", &self.calls())
            .finish()
    }
}

#[async_trait]
impl ResourceNode for InMemoryNode {
    async fn subscribe(
        &self,
        channel: &str,
        subscriber: Arc<dyn Subscriber>,
    ) -> Result<(), NodeError> {
        self.calls.subscribe.fetch_add(1, Ordering::Relaxed);
        self.check_policy(channel)?;
        match self.subscriptions.entry(channel.to_owned()) {
            Entry::Occupied(_) => Err(NodeError::ChannelTaken {
                channel: channel.to_owned(),
            }),
            Entry::Vacant(vacant) => {
                vacant.insert(subscriber);
                debug!(channel, "channel subscribed");
                Ok(())
            }
        }
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), NodeError> {
        self.calls.unsubscribe.fetch_add(1, Ordering::Relaxed);
        match self.subscriptions.remove(channel) {
            Some(_) => {
                debug!(channel, "channel unsubscribed");
                Ok(())
            }
            None => Err(NodeError::NotSubscribed {
                channel: channel.to_owned(),
            }),
        }
    }

    async fn mount(&self, path: &str, handler: Arc<dyn RequestHandler>) -> Result<(), NodeError> {
        self.calls.mount.fetch_add(1, Ordering::Relaxed);
        self.check_policy(path)?;
        match self.mounts.entry(path.to_owned()) {
            Entry::Occupied(_) => Err(NodeError::PathTaken {
                path: path.to_owned(),
            }),
            Entry::Vacant(vacant) => {
                vacant.insert(handler);
                debug!(path, "path mounted");
                Ok(())
            }
        }
    }

    async fn unmount(&self, path: &str) -> Result<(), NodeError> {
        self.calls.unmount.fetch_add(1, Ordering::Relaxed);
        match self.mounts.remove(path) {
            Some(_) => {
                debug!(path, "path unmounted");
                Ok(())
            }
            None => Err(NodeError::NotMounted {
                path: path.to_owned(),
            }),
        }
    }
}

/// `mount` 是否覆盖 `path`：完全相等，或 `path` 在 `mount` 之后以 `/` 分段继续。
fn path_matches(mount: &str, path: &str) -> bool {
    if mount == "/" || mount == path {
        return true;
    }
    let prefix = mount.trim_end_matches('/');
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures::executor::block_on;

    use super::*;

    struct Echo(&'static str);

    #[async_trait]
    impl RequestHandler for Echo {
        async fn handle(&self, _request: Request) -> Response {
            Response::ok(self.0)
        }
    }

    #[derive(Default)]
    struct Inbox(Mutex<Vec<Message>>);

    #[async_trait]
    impl Subscriber for Inbox {
        async fn on_message(&self, message: Message) {
            self.0.lock().unwrap().push(message);
        }
    }

    #[test]
    fn prefix_matching_respects_segments() {
        assert!(path_matches("/", "/anything"));
        assert!(path_matches("/api", "/api"));
        assert!(path_matches("/api", "/api/users"));
        assert!(path_matches("/api/", "/api/users"));
        assert!(!path_matches("/api", "/apiary"));
    }

    #[test]
    fn dispatch_picks_the_longest_mount() {
        let node = InMemoryNode::new();
        block_on(node.mount("/", Arc::new(Echo("root")))).unwrap();
        block_on(node.mount("/api", Arc::new(Echo("api")))).unwrap();

        let api = block_on(node.dispatch(Request::new("/api/users", "")));
        let root = block_on(node.dispatch(Request::new("/index.html", "")));

        assert_eq!(api.body, Bytes::from_static(b"api"));
        assert_eq!(root.body, Bytes::from_static(b"root"));
    }

    #[test]
    fn dispatch_without_mount_is_not_found() {
        let node = InMemoryNode::new();
        let response = block_on(node.dispatch(Request::new("/", "")));
        assert_eq!(response.status, 404);
    }

    #[test]
    fn publish_reaches_the_subscriber() {
        let node = InMemoryNode::new();
        let inbox = Arc::new(Inbox::default());
        block_on(node.subscribe("example", inbox.clone())).unwrap();

        assert!(block_on(node.publish("example", "hello")));
        assert!(!block_on(node.publish("other", "hello")));
        assert_eq!(inbox.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn conflicts_and_absence_are_reported() {
        let node = InMemoryNode::new();
        block_on(node.mount("/", Arc::new(Echo("a")))).unwrap();

        let taken = block_on(node.mount("/", Arc::new(Echo("b")))).unwrap_err();
        let missing = block_on(node.unsubscribe("example")).unwrap_err();

        assert_eq!(taken.code(), "node.path.taken");
        assert!(missing.is_absent());
        assert_eq!(node.calls().mount, 2);
    }

    #[test]
    fn denied_targets_are_rejected_until_allowed() {
        let node = InMemoryNode::new();
        node.deny("example", "quarantined");

        let rejected = block_on(node.subscribe("example", Arc::new(Inbox::default())));
        assert_eq!(rejected.unwrap_err().code(), "node.rejected");
        assert!(node.is_empty());

        node.allow("example");
        block_on(node.subscribe("example", Arc::new(Inbox::default()))).unwrap();
        assert_eq!(node.subscriptions(), vec!["example".to_owned()]);
    }
}
