#![deny(unsafe_code)]
#![allow(clippy::result_large_err)]
#![doc = "rnode-hosting: 为资源节点宿主提供引擎装配、启动停止编排与内存节点实现。"]

pub mod builder;
pub mod config;
mod host;
pub mod memory;
pub mod registry;
pub mod report;
pub mod telemetry;

pub use builder::{HostBuildError, HostBuilder, HostBuilderError};
pub use config::{ConfigError, EngineOptions, HostConfig, StartFailurePolicy, StartupMode};
pub use host::{EngineHost, HostError};
pub use memory::{InMemoryNode, NodeCalls};
pub use registry::{EngineEntry, EngineFactory, EngineRegistry, FactoryError, RegistrationError};
pub use report::{EngineOutcome, EngineRecord, ShutdownReport, StartupReport};
pub use telemetry::{TelemetryError, install_tracing};
