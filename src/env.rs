use std::collections::BTreeMap;

use tracing::debug;

use crate::error::Error;
use crate::model::{EnvMap, LoadReport};

/// Destination for loaded environment variables.
pub trait Environment {
    fn has(&self, key: &str) -> bool;

    fn set(&mut self, key: &str, value: &str) -> Result<(), Error>;
}

/// The current process environment.
///
/// Writes go through [`std::env::set_var`], which mutates global process
/// state and is not thread-safe for concurrent environment access.
#[derive(Debug)]
pub struct ProcessEnv {
    _private: (),
}

impl ProcessEnv {
    /// Create a process-environment target.
    ///
    /// # Safety
    ///
    /// The caller must ensure no other threads concurrently read or write the
    /// process environment for as long as this value is used to set variables.
    pub unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl Environment for ProcessEnv {
    fn has(&self, key: &str) -> bool {
        std::env::var_os(key).is_some()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), Error> {
        let reason = if key.is_empty() {
            Some("key is empty")
        } else if key.contains(['=', '\0']) {
            Some("key contains `=` or NUL")
        } else if value.contains('\0') {
            Some("value contains NUL")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(Error::EnvironmentWrite {
                key: key.to_owned(),
                reason: reason.to_owned(),
            });
        }

        // SAFETY: `ProcessEnv::new` requires the caller to rule out concurrent
        // environment access, and the key/value were checked above.
        unsafe { std::env::set_var(key, value) };
        Ok(())
    }
}

/// An in-memory environment, useful to avoid touching the process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryEnv {
    vars: BTreeMap<String, String>,
}

impl MemoryEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        self.vars
    }
}

impl From<BTreeMap<String, String>> for MemoryEnv {
    fn from(vars: BTreeMap<String, String>) -> Self {
        Self { vars }
    }
}

impl<K, V> FromIterator<(K, V)> for MemoryEnv
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

impl Environment for MemoryEnv {
    fn has(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), Error> {
        self.vars.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

/// Write `env_map` into `env`.
///
/// With `overwrite` every key is set; otherwise keys already present in
/// `env` are left alone and counted as skipped.
pub fn apply<E: Environment + ?Sized>(
    env_map: &EnvMap,
    env: &mut E,
    overwrite: bool,
) -> Result<LoadReport, Error> {
    let mut report = LoadReport::default();

    for (key, value) in env_map {
        if !overwrite && env.has(key) {
            debug!(key = %key, "skipping existing key");
            report.skipped_existing += 1;
            continue;
        }

        env.set(key, value)?;
        report.loaded += 1;
    }

    Ok(report)
}
