use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::env::{Environment, ProcessEnv, apply};
use crate::error::Error;
use crate::model::{EnvMap, LoadReport, SubstitutionMode};
use crate::parser::parse_source;
use crate::record::EnvRecord;

const DEFAULT_FILE: &str = ".env";

/// Load `.env` from the current working directory into the process
/// environment, keeping variables that are already set.
///
/// # Safety
///
/// Mutates the process environment; see [`ProcessEnv::new`].
pub unsafe fn load() -> Result<LoadReport, Error> {
    unsafe { into_process(EnvLoader::new()) }
}

/// Like [`load`], but replaces variables that are already set.
///
/// # Safety
///
/// Mutates the process environment; see [`ProcessEnv::new`].
pub unsafe fn overload() -> Result<LoadReport, Error> {
    unsafe { into_process(EnvLoader::new().override_existing(true)) }
}

/// Load each file in order into the process environment, keeping variables
/// that are already set.
///
/// # Safety
///
/// Mutates the process environment; see [`ProcessEnv::new`].
pub unsafe fn load_from<I, P>(paths: I) -> Result<LoadReport, Error>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    unsafe { into_process(EnvLoader::new().paths(paths)) }
}

/// Like [`load_from`], but replaces variables that are already set.
///
/// # Safety
///
/// Mutates the process environment; see [`ProcessEnv::new`].
pub unsafe fn overload_from<I, P>(paths: I) -> Result<LoadReport, Error>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    unsafe { into_process(EnvLoader::new().paths(paths).override_existing(true)) }
}

/// Parse one file and fill the matching fields of `record`.
///
/// The process environment is not touched.
pub fn load_in<T: EnvRecord>(path: impl AsRef<Path>, record: &mut T) -> Result<usize, Error> {
    EnvLoader::new().path(path).populate(record)
}

unsafe fn into_process(loader: EnvLoader) -> Result<LoadReport, Error> {
    // SAFETY: forwarded to the caller of the public entry points.
    let mut env = unsafe { ProcessEnv::new() };
    loader.load(&mut env)
}

/// Builder-style dotenv loader.
///
/// Files are handled strictly in order: each one is read, parsed and
/// applied before the next is opened, and the first failure stops the run.
#[derive(Debug, Clone)]
pub struct EnvLoader {
    paths: Vec<PathBuf>,
    required: bool,
    override_existing: bool,
    substitution_mode: SubstitutionMode,
}

impl EnvLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.paths.push(path.as_ref().to_path_buf());
        self
    }

    pub fn paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.paths
            .extend(paths.into_iter().map(|path| path.as_ref().to_path_buf()));
        self
    }

    /// Whether a missing file is an error. Defaults to `true`.
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Replace variables already present in the target. Defaults to `false`.
    pub fn override_existing(mut self, override_existing: bool) -> Self {
        self.override_existing = override_existing;
        self
    }

    pub fn substitution_mode(mut self, substitution_mode: SubstitutionMode) -> Self {
        self.substitution_mode = substitution_mode;
        self
    }

    /// Parse every file without applying anything.
    ///
    /// Returns one map per file that was found, in load order.
    pub fn parse_only(&self) -> Result<Vec<(PathBuf, EnvMap)>, Error> {
        let mut parsed = Vec::new();
        for path in self.effective_paths() {
            if let Some(env_map) = self.read_file(&path)? {
                parsed.push((path, env_map));
            }
        }
        Ok(parsed)
    }

    /// Apply every file to `env` in order.
    pub fn load<E: Environment + ?Sized>(&self, env: &mut E) -> Result<LoadReport, Error> {
        let mut report = LoadReport::default();

        for path in self.effective_paths() {
            let Some(env_map) = self.read_file(&path)? else {
                report.files_missing += 1;
                continue;
            };
            report.files_read += 1;

            let applied = apply(&env_map, env, self.override_existing)?;
            debug!(
                path = %path.display(),
                loaded = applied.loaded,
                skipped = applied.skipped_existing,
                "applied dotenv file"
            );
            report.absorb(applied);
        }

        Ok(report)
    }

    /// Fill `record` from every file in order; later files win per field.
    ///
    /// Returns the total number of field assignments.
    pub fn populate<T: EnvRecord>(&self, record: &mut T) -> Result<usize, Error> {
        let schema = T::schema();
        let mut assigned = 0;

        for path in self.effective_paths() {
            if let Some(env_map) = self.read_file(&path)? {
                assigned += schema.populate(record, &env_map)?;
            }
        }

        Ok(assigned)
    }

    fn read_file(&self, path: &Path) -> Result<Option<EnvMap>, Error> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound && !self.required => {
                debug!(path = %path.display(), "skipping missing optional dotenv file");
                return Ok(None);
            }
            Err(source) => {
                return Err(Error::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let env_map = parse_source(bytes.as_slice(), self.substitution_mode, Some(path))?;
        debug!(path = %path.display(), entries = env_map.len(), "parsed dotenv file");
        Ok(Some(env_map))
    }

    fn effective_paths(&self) -> Vec<PathBuf> {
        if self.paths.is_empty() {
            vec![PathBuf::from(DEFAULT_FILE)]
        } else {
            self.paths.clone()
        }
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            required: true,
            override_existing: false,
            substitution_mode: SubstitutionMode::Expand,
        }
    }
}
