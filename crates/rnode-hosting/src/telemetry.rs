use std::sync::OnceLock;

use thiserror::Error;
use tracing::dispatcher;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt};

/// 安装标记，确保 `install_tracing` 仅生效一次。
static INSTALLED: OnceLock<()> = OnceLock::new();

/// 日志安装过程可能出现的错误。
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// `install_tracing` 被重复调用。
    #[error("tracing already installed by rnode-hosting")]
    AlreadyInstalled,
    /// 外部提前设置了全局 Subscriber。
    #[error("a global tracing subscriber is already set")]
    SubscriberAlreadySet,
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobal(#[from] dispatcher::SetGlobalDefaultError),
}

/// 安装宿主默认的结构化日志输出。
///
/// # 教案式说明
/// - **意图（Why）**：宿主进程只需在 `main` 开头调用一次，即可看到引擎生命周期的全部结构化事件；
/// - **逻辑（How）**：组装 `fmt + EnvFilter`，过滤规则取自 `RUST_LOG`，缺省为 `info`；
/// - **契约（What）**：重复调用返回 [`TelemetryError::AlreadyInstalled`]；外部已设置 Subscriber 时返回
///   [`TelemetryError::SubscriberAlreadySet`]，不会覆盖外部配置。
pub fn install_tracing() -> Result<(), TelemetryError> {
    if INSTALLED.get().is_some() {
        return Err(TelemetryError::AlreadyInstalled);
    }
    if dispatcher::has_been_set() {
        return Err(TelemetryError::SubscriberAlreadySet);
    }

    let subscriber = tracing_subscriber::registry()
        .with(build_env_filter())
        .with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber)?;

    INSTALLED
        .set(())
        .map_err(|_| TelemetryError::AlreadyInstalled)
}

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}
