use camino::Utf8Path;
use camino::Utf8PathBuf;
use serde::Deserialize;
use serde::Serialize;

use crate::ConfigError;

/// Name of the per-project config file, looked up at the workspace root.
pub const CONFIG_FILE_NAME: &str = ".faustcfg.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectKind {
    #[default]
    Process,
    Library,
}

/// Project configuration read from [`CONFIG_FILE_NAME`].
///
/// Every field is optional in the JSON document. A reload always produces a
/// whole new value; nothing mutates a loaded config in place.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Compiler executable used for compiler diagnostics
    pub command: String,
    #[serde(rename = "type")]
    pub kind: ProjectKind,
    pub process_name: String,
    /// Top-level `.dsp` files, relative to the workspace root
    pub process_files: Vec<Utf8PathBuf>,
    #[serde(rename = "include")]
    pub include_dirs: Vec<Utf8PathBuf>,
    pub compiler_diagnostics: bool,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            command: "faust".to_string(),
            kind: ProjectKind::Process,
            process_name: "process".to_string(),
            process_files: Vec::new(),
            include_dirs: Vec::new(),
            compiler_diagnostics: true,
        }
    }
}

impl ProjectConfig {
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Resolve the effective config from the config file's content, if any.
    ///
    /// A missing or malformed file yields the default config. When no process
    /// files are declared, `dsp_files` supplies them.
    pub fn load<F>(content: Option<&str>, dsp_files: F) -> Self
    where
        F: FnOnce() -> Vec<Utf8PathBuf>,
    {
        let mut config = match content {
            Some(content) => Self::parse(content).unwrap_or_else(|err| {
                tracing::error!(error = %err, "Invalid project config file, using defaults");
                Self::default()
            }),
            None => {
                tracing::info!("No project config file, using defaults");
                Self::default()
            }
        };

        if config.process_files.is_empty() {
            let mut files = dsp_files();
            files.sort();
            config.process_files = files;
        }

        config
    }

    /// Absolute paths of the declared process files under `root`.
    pub fn process_paths<'a>(&'a self, root: &'a Utf8Path) -> impl Iterator<Item = Utf8PathBuf> + 'a {
        self.process_files.iter().map(move |file| root.join(file))
    }

    /// Absolute include directories under `root`.
    pub fn include_paths<'a>(&'a self, root: &'a Utf8Path) -> impl Iterator<Item = Utf8PathBuf> + 'a {
        self.include_dirs.iter().map(move |dir| root.join(dir))
    }
}
