use std::{fmt, path::Path};

use rnode_core::{BoxEngine, ManagedEngine};
use thiserror::Error;

use crate::{
    config::{ConfigError, HostConfig},
    host::{EngineHost, EngineSlot},
    registry::{EngineEntry, EngineRegistry, FactoryError, RegistrationError},
};

/// 装配阶段出现的错误。
#[derive(Debug, Error)]
pub enum HostBuilderError {
    /// 引擎注册冲突。
    #[error("engine registration failed: {0}")]
    Registration(#[from] RegistrationError),
    /// 配置无法读取或解析。
    #[error("host configuration failed: {0}")]
    Config(#[from] ConfigError),
}

/// 构建宿主最终失败时的错误。
#[derive(Debug, Error)]
pub enum HostBuildError {
    /// 配置的启动顺序或引擎构成信息引用了未注册的引擎。
    #[error("host config names unknown engine `{name}`")]
    UnknownEngine { name: String },
    /// 直接注册的实例无法接收构成信息，只有工厂注册的引擎可以配置 `[engines.<name>]`。
    #[error("engine `{name}` was registered as an instance and cannot take options")]
    OptionsForInstance { name: String },
    /// 启动顺序中同一引擎出现多次。
    #[error("startup order lists engine `{name}` more than once")]
    DuplicateOrderEntry { name: String },
    /// 工厂无法创建首个实例。
    #[error(transparent)]
    Factory(#[from] FactoryError),
}

/// `HostBuilder` 聚合配置与引擎注册的装配步骤。
///
/// # 教案级注释
/// - **设计目标 (Why)**
///   - 为宿主提供统一的装配入口：先确定配置，再登记引擎，最后一次性生成 [`EngineHost`]；
///   - 配置中的启动顺序在构建时即被校验，拼写错误不会拖到启动阶段才暴露。
/// - **关键流程 (How)**
///   1. `with_config` / `load_config`：设置宿主配置，未设置时使用默认值；
///   2. `configure_engines` / `register_engine`：向 [`EngineRegistry`] 写入实例或工厂；
///   3. `build`：按配置排定顺序，调用工厂创建首个实例，并为每个实例配上生命周期状态机。
/// - **契约说明 (What)**
///   - 配置步骤返回 `Result<&mut Self, HostBuilderError>`，便于链式调用与错误传播；
///   - `build` 可能返回 [`HostBuildError`]，此时没有任何引擎被启动。
#[derive(Default)]
pub struct HostBuilder {
    config: HostConfig,
    engines: EngineRegistry,
}

impl fmt::Debug for HostBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBuilder")
            .field("config", &self.config)
            .field("engines", &self.engines.names().collect::<Vec<_>>())
            .finish()
    }
}

impl HostBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 替换宿主配置。
    pub fn with_config(&mut self, config: HostConfig) -> &mut Self {
        self.config = config;
        self
    }

    /// 从 TOML 文件读取宿主配置。
    pub fn load_config(&mut self, path: impl AsRef<Path>) -> Result<&mut Self, HostBuilderError> {
        self.config = HostConfig::load(path)?;
        Ok(self)
    }

    /// 配置引擎注册表，闭包内可注册实例或工厂。
    ///
    /// - **契约 (What)**：闭包返回错误时整体调用失败，已在闭包内完成的注册保留在注册表中；
    /// - **风险提示**：闭包应避免耗时 I/O，防止阻塞装配流程。
    pub fn configure_engines<F>(&mut self, configure: F) -> Result<&mut Self, HostBuilderError>
    where
        F: FnOnce(&mut EngineRegistry) -> Result<(), HostBuilderError>,
    {
        configure(&mut self.engines)?;
        Ok(self)
    }

    /// 以引擎自身名称注册实例。
    pub fn register_engine(&mut self, engine: BoxEngine) -> Result<&mut Self, HostBuilderError> {
        let name = engine.name().to_owned();
        self.engines.register_instance(name, engine)?;
        Ok(self)
    }

    /// 构建宿主实例。
    ///
    /// # 教案级注释
    /// - **执行步骤**
    ///   1. 依据 `config.order` 排定启动顺序，未列出的引擎按注册顺序排在其后；
    ///   2. 校验 `config.engines` 中的每个键都对应以工厂注册的引擎；
    ///   3. 工厂条目以对应的构成信息立即创建首个实例，失败映射为 [`HostBuildError::Factory`]；
    ///   4. 每个实例以注册名作为标签交给 [`ManagedEngine`] 托管。
    /// - **后置条件**：返回的宿主中全部引擎处于 `Created`。
    pub fn build(self) -> Result<EngineHost, HostBuildError> {
        let HostBuilder { config, engines } = self;
        for name in config.engines.keys() {
            match engines.get(name) {
                None => return Err(HostBuildError::UnknownEngine { name: name.clone() }),
                Some(EngineEntry::Instance(_)) => {
                    return Err(HostBuildError::OptionsForInstance { name: name.clone() });
                }
                Some(EngineEntry::Factory(_)) => {}
            }
        }
        let ordered = apply_order(engines.into_entries(), &config.order)?;

        let mut slots = Vec::with_capacity(ordered.len());
        for (name, entry) in ordered {
            let slot = match entry {
                EngineEntry::Instance(engine) => EngineSlot {
                    managed: ManagedEngine::labelled(name, engine),
                    factory: None,
                },
                EngineEntry::Factory(factory) => {
                    let options = config.options_for(&name);
                    EngineSlot {
                        managed: ManagedEngine::labelled(name, factory.create(&options)?),
                        factory: Some(factory),
                    }
                }
            };
            slots.push(slot);
        }
        Ok(EngineHost::new(config, slots))
    }
}

fn apply_order(
    mut entries: Vec<(String, EngineEntry)>,
    order: &[String],
) -> Result<Vec<(String, EngineEntry)>, HostBuildError> {
    let mut ordered = Vec::with_capacity(entries.len());
    for (index, name) in order.iter().enumerate() {
        if order[..index].contains(name) {
            return Err(HostBuildError::DuplicateOrderEntry { name: name.clone() });
        }
        let position = entries
            .iter()
            .position(|(entry_name, _)| entry_name == name)
            .ok_or_else(|| HostBuildError::UnknownEngine { name: name.clone() })?;
        ordered.push(entries.remove(position));
    }
    ordered.extend(entries);
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use rnode_core::NoopEngine;

    use super::*;

    fn builder_with(names: &[&'static str]) -> HostBuilder {
        let mut builder = HostBuilder::new();
        for name in names {
            builder
                .register_engine(Box::new(NoopEngine::named(*name)))
                .unwrap();
        }
        builder
    }

    #[test]
    fn order_moves_listed_engines_first() {
        let mut builder = builder_with(&["a", "b", "c"]);
        builder.with_config(HostConfig {
            order: vec!["c".to_owned()],
            ..HostConfig::default()
        });

        let host = builder.build().unwrap();

        assert_eq!(host.names(), vec!["c", "a", "b"]);
    }

    #[test]
    fn unknown_and_duplicate_order_entries_fail_the_build() {
        let mut unknown = builder_with(&["a"]);
        unknown.with_config(HostConfig {
            order: vec!["z".to_owned()],
            ..HostConfig::default()
        });
        assert!(matches!(
            unknown.build(),
            Err(HostBuildError::UnknownEngine { name }) if name == "z"
        ));

        let mut duplicate = builder_with(&["a", "b"]);
        duplicate.with_config(HostConfig {
            order: vec!["a".to_owned(), "a".to_owned()],
            ..HostConfig::default()
        });
        assert!(matches!(
            duplicate.build(),
            Err(HostBuildError::DuplicateOrderEntry { name }) if name == "a"
        ));
    }

    #[test]
    fn failing_factory_fails_the_build() {
        let mut builder = HostBuilder::new();
        builder
            .configure_engines(|engines| {
                engines.register_factory_fn("broken", |_options| {
                    Err(FactoryError::new("broken", "missing credentials"))
                })?;
                Ok(())
            })
            .unwrap();

        assert!(matches!(builder.build(), Err(HostBuildError::Factory(_))));
    }

    #[test]
    fn options_reach_the_factory_and_must_match_a_factory() {
        let config = HostConfig::from_toml_str(
            r#"
            [engines.named]
            label = "from-config"
            "#,
        )
        .unwrap();

        let mut builder = HostBuilder::new();
        builder
            .with_config(config.clone())
            .configure_engines(|engines| {
                engines.register_factory_fn("named", |options| {
                    let label = options.get_str("label").unwrap_or("unset").to_owned();
                    Ok(Box::new(NoopEngine::named(label)) as BoxEngine)
                })?;
                Ok(())
            })
            .unwrap();
        let host = builder.build().unwrap();
        let engine = host.engine("named").unwrap();
        assert_eq!(engine.engine().name(), "from-config");

        let mut instance = builder_with(&["named"]);
        instance.with_config(config);
        assert!(matches!(
            instance.build(),
            Err(HostBuildError::OptionsForInstance { name }) if name == "named"
        ));
    }

    #[test]
    fn duplicate_registration_surfaces_as_builder_error() {
        let mut builder = builder_with(&["a"]);
        let error = builder
            .register_engine(Box::new(NoopEngine::named("a")))
            .unwrap_err();
        assert!(matches!(error, HostBuilderError::Registration(_)));
    }
}
