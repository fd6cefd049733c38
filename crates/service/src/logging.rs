//! Configuration-driven log levels.
//!
//! Subsystem levels live in a registry owned by the service; the operator
//! API's `LogList`/`LogSetLevel` read and mutate it, and changes take effect
//! through a `tracing-subscriber` reload handle.

use crate::error::{ServiceError, ServiceResult};
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter};

/// Log subsystems operators can tune, by crate target.
pub const SUBSYSTEMS: &[&str] = &[
    "fca",
    "fca_chain",
    "fca_export",
    "fca_locker",
    "fca_service",
    "fca_storage",
];

type ReloadHandle = reload::Handle<EnvFilter, Registry>;

/// Subsystem → level registry backing the operator log API.
pub struct LogRegistry {
    handle: ReloadHandle,
    default_directive: String,
    levels: Mutex<BTreeMap<String, String>>,
}

impl LogRegistry {
    fn new(handle: ReloadHandle, default_directive: &str) -> Self {
        Self {
            handle,
            default_directive: default_directive.to_string(),
            levels: Mutex::new(BTreeMap::new()),
        }
    }

    /// The tunable subsystem names.
    pub fn subsystems(&self) -> Vec<String> {
        SUBSYSTEMS.iter().map(|s| s.to_string()).collect()
    }

    /// Set `subsystem` to `level` and reload the active filter.
    pub fn set_level(&self, subsystem: &str, level: &str) -> ServiceResult<()> {
        if !SUBSYSTEMS.contains(&subsystem) {
            return Err(ServiceError::UnknownSubsystem(subsystem.to_string()));
        }
        let level: LevelFilter = level
            .parse()
            .map_err(|_| ServiceError::InvalidLogLevel(level.to_string()))?;

        let directives = {
            let mut levels = self.levels.lock().unwrap_or_else(|e| e.into_inner());
            levels.insert(subsystem.to_string(), level.to_string().to_lowercase());

            let mut directives = vec![self.default_directive.clone()];
            directives.extend(levels.iter().map(|(s, l)| format!("{s}={l}")));
            directives.join(",")
        };

        let filter = EnvFilter::try_new(&directives)
            .map_err(|e| ServiceError::LogFilter(e.to_string()))?;
        self.handle
            .reload(filter)
            .map_err(|e| ServiceError::LogFilter(e.to_string()))?;

        tracing::info!(subsystem, %level, "log level updated");
        Ok(())
    }
}

/// Install the global subscriber and return the registry the operator API
/// mutates. Call once per process.
pub fn init_tracing(default_directive: &str) -> LogRegistry {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let (filter_layer, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::layer())
        .init();

    LogRegistry::new(handle, default_directive)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A registry whose reload handle stays valid without installing a
    /// global subscriber.
    pub(crate) fn detached_registry() -> LogRegistry {
        let (layer, handle) = reload::Layer::<EnvFilter, Registry>::new(EnvFilter::new("info"));
        std::mem::forget(layer);
        LogRegistry::new(handle, "info")
    }
}
