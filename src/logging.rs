//! Structured logging helpers for tessera events.
//!
//! Every backend receives a [`LogContext`] through its constructor instead of
//! reaching for a process-wide logger handle. The context carries key/value
//! pairs (tablespace name, worker id, ...) that are appended to each event the
//! component emits, so a scheduler can tell apart the output of concurrently
//! running scanners.

use std::sync::Arc;

/// Single logging target for tessera.
pub(crate) const LOG_TARGET: &str = "tessera";

/// Common key/value fields appended to all logs emitted by one component.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogContext {
    common_kv: Option<Arc<str>>,
}

impl LogContext {
    /// Build a context that appends the provided key/value pairs, e.g.
    /// `"tablespace=warehouse worker=3"`.
    pub fn new(common_kv: impl Into<Arc<str>>) -> Self {
        let common_kv: Arc<str> = common_kv.into();
        Self {
            common_kv: (!common_kv.is_empty()).then_some(common_kv),
        }
    }

    /// Derive a child context carrying the parent's pairs followed by `kv`.
    pub fn with(&self, kv: impl AsRef<str>) -> Self {
        let kv = kv.as_ref();
        match &self.common_kv {
            Some(parent) if !kv.is_empty() => Self::new(format!("{parent} {kv}")),
            Some(_) => self.clone(),
            None => Self::new(kv),
        }
    }

    /// The key/value pairs, if any were configured.
    pub fn common_kv(&self) -> Option<&str> {
        self.common_kv.as_deref()
    }
}

macro_rules! tessera_log {
    ($level:expr, ctx: $ctx:expr, $event:expr, $fmt:expr $(, $args:expr)* $(,)?) => {{
        if log::log_enabled!(target: $crate::logging::LOG_TARGET, $level) {
            if let Some(common_kv) = $ctx.common_kv() {
                log::log!(
                    target: $crate::logging::LOG_TARGET,
                    $level,
                    "event={} {} {}",
                    $event,
                    common_kv,
                    format_args!($fmt $(, $args)*)
                );
            } else {
                log::log!(
                    target: $crate::logging::LOG_TARGET,
                    $level,
                    "event={} {}",
                    $event,
                    format_args!($fmt $(, $args)*)
                );
            }
        }
    }};
    ($level:expr, $event:expr, $fmt:expr $(, $args:expr)* $(,)?) => {{
        if log::log_enabled!(target: $crate::logging::LOG_TARGET, $level) {
            log::log!(
                target: $crate::logging::LOG_TARGET,
                $level,
                "event={} {}",
                $event,
                format_args!($fmt $(, $args)*)
            );
        }
    }};
}

pub(crate) use tessera_log;
