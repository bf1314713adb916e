mod project;
mod settings;

pub use project::ProjectConfig;
pub use project::ProjectKind;
pub use project::CONFIG_FILE_NAME;
pub use settings::Settings;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse project config")]
    ProjectParse(#[from] serde_json::Error),
    #[error("Configuration build/deserialize error")]
    Settings(#[from] config::ConfigError),
}
