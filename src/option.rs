use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Tuning knobs handed to every backend a tablespace creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageOptions {
    pub(crate) fragment_bytes: u64,
    pub(crate) fragment_rows: u64,
    pub(crate) write_buffer_size: usize,
    pub(crate) verify_checksums: bool,
    pub(crate) extra: BTreeMap<String, String>,
}

impl Default for StorageOptions {
    fn default() -> Self {
        StorageOptions {
            fragment_bytes: 64 * 1024 * 1024,
            fragment_rows: 1024 * 1024,
            write_buffer_size: 64 * 1024,
            verify_checksums: true,
            extra: BTreeMap::new(),
        }
    }
}

impl StorageOptions {
    /// Target size of a byte-ranged fragment. Fragments end on the first
    /// record boundary at or past this size.
    pub fn fragment_bytes(self, fragment_bytes: u64) -> Self {
        StorageOptions {
            fragment_bytes: fragment_bytes.max(1),
            ..self
        }
    }

    /// Rows per fragment for row-addressed backends.
    pub fn fragment_rows(self, fragment_rows: u64) -> Self {
        StorageOptions {
            fragment_rows: fragment_rows.max(1),
            ..self
        }
    }

    /// Bytes an appender buffers before pushing them to the medium.
    pub fn write_buffer_size(self, write_buffer_size: usize) -> Self {
        StorageOptions {
            write_buffer_size,
            ..self
        }
    }

    /// Whether scanners check per-record checksums where the format has them.
    pub fn verify_checksums(self, verify_checksums: bool) -> Self {
        StorageOptions {
            verify_checksums,
            ..self
        }
    }

    /// Backend-specific passthrough option.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Look up a passthrough option set with [`StorageOptions::option`].
    pub fn get_option(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(String::as_str)
    }
}

/// Connection parameters for a storage source, already split into fields by
/// whoever parsed the user's connection string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Backend scheme, e.g. `mem` or `file`.
    pub scheme: String,
    /// Host name or address.
    pub host: Option<String>,
    /// Port, when the source listens on one.
    pub port: Option<u16>,
    /// User to authenticate as.
    pub user: Option<String>,
    /// Password for `user`.
    pub password: Option<String>,
    /// Database (or namespace) the tablespace exposes.
    pub database: String,
    /// Table the connection string pinned, if any.
    pub table: Option<String>,
    /// Remaining query-string parameters.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl ConnectionInfo {
    /// Connection to `database` through `scheme`, with every optional field
    /// unset.
    pub fn new(scheme: impl Into<String>, database: impl Into<String>) -> Self {
        ConnectionInfo {
            scheme: scheme.into(),
            database: database.into(),
            ..Default::default()
        }
    }

    /// Set host and port.
    pub fn host(self, host: impl Into<String>, port: u16) -> Self {
        ConnectionInfo {
            host: Some(host.into()),
            port: Some(port),
            ..self
        }
    }

    /// Set user and password.
    pub fn credentials(self, user: impl Into<String>, password: Option<String>) -> Self {
        ConnectionInfo {
            user: Some(user.into()),
            password,
            ..self
        }
    }

    /// Pin a single table.
    pub fn table(self, table: impl Into<String>) -> Self {
        ConnectionInfo {
            table: Some(table.into()),
            ..self
        }
    }

    /// Add one extra parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// `host:port`, or just the host when no port was given.
    pub fn address(&self) -> Option<String> {
        let host = self.host.as_deref()?;
        Some(match self.port {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
    }
}
