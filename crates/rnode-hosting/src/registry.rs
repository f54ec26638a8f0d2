use std::{fmt, sync::Arc};

use rnode_core::BoxEngine;
use thiserror::Error;

use crate::config::EngineOptions;

/// `EngineFactory` 抽象出“按需创建服务引擎实例”的契约。
///
/// # 教案级注释
/// - **意图 (Why)**
///   - 宿主启动前往往只登记引擎描述，实例在构建阶段才创建；失败的实例进入 `Errored` 后不可复用，
///     宿主需要从工厂重新创建一个干净实例。
/// - **契约说明 (What)**
///   - `options` 为宿主配置中 `[engines.<name>]` 表的内容，未配置时为空表；
///   - 每次调用都应返回全新实例；实例之间不得共享登记状态；
///   - 创建失败返回 [`FactoryError`]，宿主构建会因此中止。
/// - **便捷实现**
///   - 任意 `Fn(&EngineOptions) -> Result<BoxEngine, FactoryError>` 闭包都自动实现本 trait。
pub trait EngineFactory: Send + Sync + 'static {
    fn create(&self, options: &EngineOptions) -> Result<BoxEngine, FactoryError>;
}

impl<F> EngineFactory for F
where
    F: Fn(&EngineOptions) -> Result<BoxEngine, FactoryError> + Send + Sync + 'static,
{
    fn create(&self, options: &EngineOptions) -> Result<BoxEngine, FactoryError> {
        self(options)
    }
}

/// 工厂无法产出实例。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("engine factory `{engine}` failed: {reason}")]
pub struct FactoryError {
    pub engine: String,
    pub reason: String,
}

impl FactoryError {
    pub fn new(engine: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            reason: reason.into(),
        }
    }
}

/// 注册项，封装直接实例或惰性工厂两种形态。
pub enum EngineEntry {
    /// 立即可用的引擎实例。
    Instance(BoxEngine),
    /// 延迟创建的引擎工厂。
    Factory(Arc<dyn EngineFactory>),
}

impl fmt::Debug for EngineEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineEntry::Instance(engine) => f
                .debug_tuple("EngineEntry::Instance")
                .field(&engine.name())
                .finish(),
            EngineEntry::Factory(_) => f
                .debug_tuple("EngineEntry::Factory")
                .field(&"EngineFactory")
                .finish(),
        }
    }
}

/// 注册引擎时可能遇到的错误。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum RegistrationError {
    /// 名称已被占用，禁止重复注册。
    #[error("engine `{name}` already registered")]
    Duplicate { name: String },
}

/// `EngineRegistry` 维护宿主将要托管的引擎目录。
///
/// # 教案级注释
/// - **目标 (Why)**
///   - 在宿主构建阶段集中登记所有引擎，命名冲突在注册时即被捕获；
///   - 登记顺序即默认启动顺序，停止时按相反顺序执行。
/// - **设计要点 (How)**
///   - 内部使用 `Vec<(String, EngineEntry)>` 保存条目，保持插入顺序；引擎数量通常很小，
///     线性查重的开销可以忽略。
/// - **契约 (What)**
///   - 名称区分大小写；重复注册返回 [`RegistrationError::Duplicate`]，注册表保持不变。
#[derive(Debug, Default)]
pub struct EngineRegistry {
    entries: Vec<(String, EngineEntry)>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册已实例化的引擎。
    pub fn register_instance(
        &mut self,
        name: impl Into<String>,
        engine: BoxEngine,
    ) -> Result<(), RegistrationError> {
        self.insert(name.into(), EngineEntry::Instance(engine))
    }

    /// 注册引擎工厂；宿主构建时创建首个实例，重建时再次调用。
    pub fn register_factory(
        &mut self,
        name: impl Into<String>,
        factory: Arc<dyn EngineFactory>,
    ) -> Result<(), RegistrationError> {
        self.insert(name.into(), EngineEntry::Factory(factory))
    }

    /// 以闭包注册引擎工厂。
    pub fn register_factory_fn<F>(
        &mut self,
        name: impl Into<String>,
        factory: F,
    ) -> Result<(), RegistrationError>
    where
        F: Fn(&EngineOptions) -> Result<BoxEngine, FactoryError> + Send + Sync + 'static,
    {
        self.register_factory(name, Arc::new(factory))
    }

    pub fn get(&self, name: &str) -> Option<&EngineEntry> {
        self.entries
            .iter()
            .find(|(entry_name, _)| entry_name == name)
            .map(|(_, entry)| entry)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// 已注册名称，按注册顺序排列。
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 将注册表消费为有序条目列表。
    pub fn into_entries(self) -> Vec<(String, EngineEntry)> {
        self.entries
    }

    fn insert(&mut self, name: String, entry: EngineEntry) -> Result<(), RegistrationError> {
        if self.contains(&name) {
            return Err(RegistrationError::Duplicate { name });
        }
        self.entries.push((name, entry));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rnode_core::NoopEngine;

    use super::*;

    #[test]
    fn keeps_registration_order_and_rejects_duplicates() {
        let mut registry = EngineRegistry::new();
        registry
            .register_instance("web-ui", Box::new(NoopEngine::new()))
            .unwrap();
        registry
            .register_factory_fn("metrics", |_options| {
                Ok(Box::new(NoopEngine::named("metrics")) as BoxEngine)
            })
            .unwrap();

        let duplicate = registry.register_instance("web-ui", Box::new(NoopEngine::new()));

        assert_eq!(
            duplicate,
            Err(RegistrationError::Duplicate {
                name: "web-ui".to_owned()
            })
        );
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["web-ui", "metrics"]);
        assert!(matches!(
            registry.get("metrics"),
            Some(EngineEntry::Factory(_))
        ));
    }
}
