use std::collections::HashMap;

/// Resolved key/value pairs parsed from one dotenv source.
pub type EnvMap = HashMap<String, String>;

/// Summary of the load operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped_existing: usize,
    pub files_read: usize,
    pub files_missing: usize,
}

impl LoadReport {
    pub(crate) fn absorb(&mut self, other: LoadReport) {
        self.loaded += other.loaded;
        self.skipped_existing += other.skipped_existing;
        self.files_read += other.files_read;
        self.files_missing += other.files_missing;
    }
}

/// Variable substitution behavior while parsing values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubstitutionMode {
    /// Replace `$VAR` and `${VAR}` with values defined earlier in the same file.
    #[default]
    Expand,
    /// Keep values as parsed with no expansion.
    Disabled,
}
