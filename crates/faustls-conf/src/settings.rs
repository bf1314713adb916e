use std::path::Path;

use camino::Utf8PathBuf;
use config::Config;
use config::File;
use config::FileFormat;
use directories::ProjectDirs;
use serde::Deserialize;

use crate::ConfigError;

/// Server-level settings, independent of any one Faust project.
#[derive(Debug, Deserialize, Default, PartialEq, Clone)]
#[serde(default)]
pub struct Settings {
    pub debug: bool,
    /// Parent directory for the per-process mirror tree. Defaults to the
    /// system temp directory.
    pub mirror_dir: Option<Utf8PathBuf>,
}

impl Settings {
    pub fn new(project_root: &Path) -> Result<Self, ConfigError> {
        let user_config_file = ProjectDirs::from("org", "grame", "faustlsp")
            .map(|proj_dirs| proj_dirs.config_dir().join("faustls.toml"));

        Self::load_from_paths(project_root, user_config_file.as_deref())
    }

    fn load_from_paths(
        project_root: &Path,
        user_config_path: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = user_config_path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }

        builder = builder.add_source(
            File::from(project_root.join(".faustls.toml"))
                .format(FileFormat::Toml)
                .required(false),
        );

        builder = builder.add_source(
            File::from(project_root.join("faustls.toml"))
                .format(FileFormat::Toml)
                .required(false),
        );

        let config = builder.build()?;
        let settings = config.try_deserialize()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_load_no_files() {
        let dir = tempdir().unwrap();
        let settings = Settings::load_from_paths(dir.path(), None).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_load_project_file() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("faustls.toml"),
            "debug = true\nmirror_dir = \"/var/tmp/faust\"\n",
        )
        .unwrap();

        let settings = Settings::load_from_paths(dir.path(), None).unwrap();
        assert!(settings.debug);
        assert_eq!(settings.mirror_dir, Some(Utf8PathBuf::from("/var/tmp/faust")));
    }

    #[test]
    fn test_project_overrides_user() {
        let user_dir = tempdir().unwrap();
        let project_dir = tempdir().unwrap();
        let user_conf_path = user_dir.path().join("faustls.toml");
        fs::write(&user_conf_path, "debug = true").unwrap();
        fs::write(project_dir.path().join("faustls.toml"), "debug = false").unwrap();

        let settings =
            Settings::load_from_paths(project_dir.path(), Some(&user_conf_path)).unwrap();
        assert!(!settings.debug);
    }

    #[test]
    fn test_plain_overrides_dotted() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(".faustls.toml"), "debug = false").unwrap();
        fs::write(dir.path().join("faustls.toml"), "debug = true").unwrap();

        let settings = Settings::load_from_paths(dir.path(), None).unwrap();
        assert!(settings.debug);
    }

    #[test]
    fn test_missing_user_file_is_ignored() {
        let user_dir = tempdir().unwrap();
        let project_dir = tempdir().unwrap();
        let user_conf_path = user_dir.path().join("faustls.toml");

        let settings =
            Settings::load_from_paths(project_dir.path(), Some(&user_conf_path)).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_invalid_toml_content() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("faustls.toml"), "debug = not_a_boolean").unwrap();

        let result = Settings::load_from_paths(dir.path(), None);
        assert!(matches!(result, Err(ConfigError::Settings(_))));
    }
}
