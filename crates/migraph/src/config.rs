#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{KeyStrategy, MigraphConfig};

pub const CONFIG_DIR: &str = ".migraph";
pub const CONFIG_FILENAME: &str = "config.json";
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

pub fn config_dir(project_root: &Path) -> PathBuf {
    project_root.join(CONFIG_DIR)
}

pub fn config_path(project_root: &Path) -> PathBuf {
    config_dir(project_root).join(CONFIG_FILENAME)
}

pub fn create_default_config(project_root: &Path) -> MigraphConfig {
    MigraphConfig {
        version: 1,
        root_dir: project_root.to_string_lossy().to_string(),
        include: default_include_patterns(),
        exclude: default_exclude_patterns(),
        max_file_size: DEFAULT_MAX_FILE_SIZE,
        context_depth: 2,
        key_strategy: KeyStrategy::Name,
        knowledge_base: format!("{CONFIG_DIR}/knowledge_base.json"),
    }
}

/// Load `.migraph/config.json`, or the defaults when it does not exist.
pub fn load_config(project_root: &Path) -> Result<MigraphConfig> {
    let path = config_path(project_root);
    if !path.exists() {
        return Ok(create_default_config(project_root));
    }

    let raw = fs::read_to_string(&path).map_err(|err| Error::io(&path, err))?;
    let mut config: MigraphConfig =
        serde_json::from_str(&raw).map_err(|err| Error::json(&path, err))?;
    if config.include.is_empty() {
        return Err(Error::Config(format!(
            "{} has no include patterns",
            path.display()
        )));
    }
    config.root_dir = project_root.to_string_lossy().to_string();
    Ok(config)
}

pub fn save_config(project_root: &Path, config: &MigraphConfig) -> Result<()> {
    let path = config_path(project_root);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| Error::io(parent, err))?;
    }

    let mut to_save = config.clone();
    to_save.root_dir = ".".to_string();
    let raw = serde_json::to_string_pretty(&to_save).map_err(|err| Error::json(&path, err))?;
    fs::write(&path, raw).map_err(|err| Error::io(&path, err))
}

/// Absolute location of the knowledge-base file for `config`.
pub fn knowledge_base_path(project_root: &Path, config: &MigraphConfig) -> PathBuf {
    let configured = Path::new(&config.knowledge_base);
    if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        project_root.join(configured)
    }
}

pub fn add_include_patterns(config: &mut MigraphConfig, patterns: &[String]) {
    for pattern in patterns {
        if !config.include.contains(pattern) {
            config.include.push(pattern.clone());
        }
    }
}

pub fn add_exclude_patterns(config: &mut MigraphConfig, patterns: &[String]) {
    for pattern in patterns {
        if !config.exclude.contains(pattern) {
            config.exclude.push(pattern.clone());
        }
    }
}

pub fn default_include_patterns() -> Vec<String> {
    vec!["**/*.java".to_string()]
}

pub fn default_exclude_patterns() -> Vec<String> {
    vec![
        "**/.git/**",
        "**/.migraph/**",
        "**/build/**",
        "**/out/**",
        "**/bin/**",
        "**/target/**",
        "**/.gradle/**",
        "**/.m2/**",
        "**/generated-sources/**",
        "**/generated-test-sources/**",
        "**/.idea/**",
        "**/node_modules/**",
    ]
    .into_iter()
    .map(std::string::ToString::to_string)
    .collect()
}
