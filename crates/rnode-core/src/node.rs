//! 资源节点能力面：引擎在生命周期内唯一可见的宿主接口。
//!
//! # 教案式导航
//! - **定位（Where）**：节点的订阅表与挂载表由宿主持有，引擎只能经由 [`ResourceNode`]
//!   的登记/注销能力修改它们，不得直接触碰内部结构；
//! - **配对（What）**：`subscribe` ↔ `unsubscribe`、`mount` ↔ `unmount` 在一次生命周期内
//!   必须 1:1 出现，[`Registration`] 即是这一配对的最小单位；
//! - **并发（How）**：节点方法接收 `&self`，宿主保证它们可被多个引擎并发调用；
//!   不同引擎以频道名或挂载路径区分各自条目。

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::NodeError;

/// 投递到订阅者的消息。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Message {
    pub channel: String,
    pub payload: Bytes,
}

impl Message {
    pub fn new(channel: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

/// 路由到挂载点的请求。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Request {
    pub path: String,
    pub body: Bytes,
}

impl Request {
    pub fn new(path: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            path: path.into(),
            body: body.into(),
        }
    }
}

/// 挂载点返回的响应，状态码沿用 HTTP 语义。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Bytes,
}

impl Response {
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: 404,
            body: Bytes::new(),
        }
    }
}

/// 频道订阅者。
#[async_trait]
pub trait Subscriber: Send + Sync + 'static {
    /// 处理一条消息。投递是尽力而为的，订阅者自行吸收处理失败。
    async fn on_message(&self, message: Message);
}

/// 挂载在路由路径上的请求处理器。
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(&self, request: Request) -> Response;
}

/// `ResourceNode` 抽象宿主向服务引擎开放的能力面。
///
/// # 教案级注释
/// - **意图 (Why)**：引擎只借用节点完成登记与注销，从不持有节点；把能力面收敛为四个异步方法，
///   宿主即可替换底层实现（内存表、消息总线握手、路由表热更新）而不影响引擎；
/// - **契约 (What)**：
///   - `subscribe`：为命名频道登记订阅者，重复登记返回 [`NodeError::ChannelTaken`]；
///   - `unsubscribe`：移除频道订阅，目标不存在返回 [`NodeError::NotSubscribed`]；
///   - `mount`：在路由路径登记处理器，重复挂载返回 [`NodeError::PathTaken`]；
///   - `unmount`：移除挂载点，目标不存在返回 [`NodeError::NotMounted`]；
///   - 所有方法在登记“已生效或明确失败”后才完成；
/// - **并发约束**：实现必须允许多个引擎并发调用；两个引擎争用同一频道或路径属于配置错误，
///   由实现以冲突错误报告，不要求任何锁纪律。
#[async_trait]
pub trait ResourceNode: Send + Sync {
    async fn subscribe(&self, channel: &str, subscriber: Arc<dyn Subscriber>)
    -> Result<(), NodeError>;

    async fn unsubscribe(&self, channel: &str) -> Result<(), NodeError>;

    async fn mount(&self, path: &str, handler: Arc<dyn RequestHandler>) -> Result<(), NodeError>;

    async fn unmount(&self, path: &str) -> Result<(), NodeError>;
}

/// 引擎在节点上留下的一项登记。
///
/// # 教案式说明
/// - **意图 (Why)**：把 “start 中登记、stop 中释放” 的隐式配对显式化，账本与错误报告都以它为单位；
/// - **契约 (What)**：`Subscription` 携带频道名，`Mount` 携带挂载路径；[`release`](Self::release)
///   发出与之配对的注销调用。
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Registration {
    Subscription(String),
    Mount(String),
}

impl Registration {
    pub fn subscription(channel: impl Into<String>) -> Self {
        Registration::Subscription(channel.into())
    }

    pub fn mount(path: impl Into<String>) -> Self {
        Registration::Mount(path.into())
    }

    /// 频道名或挂载路径。
    pub fn target(&self) -> &str {
        match self {
            Registration::Subscription(channel) => channel,
            Registration::Mount(path) => path,
        }
    }

    /// 在节点上撤销该登记。
    pub async fn release(&self, node: &dyn ResourceNode) -> Result<(), NodeError> {
        match self {
            Registration::Subscription(channel) => node.unsubscribe(channel).await,
            Registration::Mount(path) => node.unmount(path).await,
        }
    }
}

impl fmt::Display for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Registration::Subscription(channel) => write!(f, "subscription `{channel}`"),
            Registration::Mount(path) => write!(f, "mount `{path}`"),
        }
    }
}
