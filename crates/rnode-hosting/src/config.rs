//! 宿主配置：启动方式、失败策略、截止时间与启动顺序。
//!
//! 配置以 TOML 书写，全部字段均有默认值，空文档即是合法配置：
//!
//! ```toml
//! startup = "concurrent"
//! on_start_failure = "continue"
//! start_timeout_ms = 5000
//! stop_timeout_ms = 2000
//! order = ["router", "web-ui"]
//!
//! [engines.web-ui]
//! channel = "example"
//! ```

use std::{collections::BTreeMap, fs, io, path::Path, time::Duration};

use serde::{Deserialize, de::DeserializeOwned};
use thiserror::Error;

/// 引擎启动的调度方式。
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StartupMode {
    /// 按顺序逐个启动，前一个完成后才启动下一个。
    #[default]
    Sequential,
    /// 同时启动全部引擎。
    Concurrent,
}

/// 某个引擎启动失败后宿主的处置方式。
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StartFailurePolicy {
    /// 中止启动，并按逆序停止已经运行的引擎。
    #[default]
    Abort,
    /// 记录失败，其余引擎照常启动；宿主不会宣告就绪。
    Continue,
}

/// 宿主配置。
///
/// # 教案式说明
/// - **意图 (Why)**：把“怎么启动、失败后怎么办、最多等多久”从代码中剥离，部署时即可调整；
/// - **契约 (What)**：
///   - 未声明的字段使用默认值：顺序启动、失败即中止、不设截止时间；
///   - 未知字段视为配置错误，避免拼写错误被静默忽略；
///   - `order` 为空时沿用注册顺序；非空时列出的引擎排在最前，未列出的按注册顺序随后；
///   - `engines.<name>` 为交给该引擎工厂的构成信息，键名必须对应已注册的引擎。
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    pub startup: StartupMode,
    pub on_start_failure: StartFailurePolicy,
    pub start_timeout_ms: Option<u64>,
    pub stop_timeout_ms: Option<u64>,
    pub order: Vec<String>,
    pub engines: BTreeMap<String, EngineOptions>,
}

impl HostConfig {
    /// 解析 TOML 文本。
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(ConfigError::Parse)
    }

    /// 读取并解析配置文件。
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    pub fn start_timeout(&self) -> Option<Duration> {
        self.start_timeout_ms.map(Duration::from_millis)
    }

    pub fn stop_timeout(&self) -> Option<Duration> {
        self.stop_timeout_ms.map(Duration::from_millis)
    }

    /// 指定引擎的构成信息；未配置时为空表。
    pub fn options_for(&self, engine: &str) -> EngineOptions {
        self.engines.get(engine).cloned().unwrap_or_default()
    }
}

/// 交给引擎工厂的构成信息，即配置中 `[engines.<name>]` 表的内容。
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct EngineOptions {
    table: toml::Table,
}

impl EngineOptions {
    pub fn new(table: toml::Table) -> Self {
        Self { table }
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&toml::Value> {
        self.table.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(toml::Value::as_str)
    }

    /// 将整张表反序列化为引擎自己的配置类型。
    pub fn deserialize<T>(&self) -> Result<T, ConfigError>
    where
        T: DeserializeOwned,
    {
        toml::Value::Table(self.table.clone())
            .try_into()
            .map_err(ConfigError::Options)
    }
}

/// 配置加载失败。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read host config `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid host config: {0}")]
    Parse(#[source] toml::de::Error),
    #[error("invalid engine options: {0}")]
    Options(#[source] toml::de::Error),
}
