//! Filesystem locations for config, secrets, logs and the chunk database.

use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub project_root: PathBuf,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub db_path: PathBuf,
    pub config_path: PathBuf,
    pub secrets_path: PathBuf,
}

impl AppPaths {
    /// Resolves every path from `DOCQA_*` variables, relative to the working
    /// directory when unset.
    pub fn from_env() -> Self {
        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::resolve(|key| env::var(key).ok(), cwd)
    }

    /// Data under `data_dir`, `config.yml` under `project_root`.
    pub fn with_data_dir(project_root: PathBuf, data_dir: PathBuf) -> Self {
        Self::resolve(
            |key| match key {
                "DOCQA_ROOT" => Some(project_root.to_string_lossy().into_owned()),
                "DOCQA_DATA_DIR" => Some(data_dir.to_string_lossy().into_owned()),
                _ => None,
            },
            project_root.clone(),
        )
    }

    fn resolve<F>(lookup: F, cwd: PathBuf) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty()).map(PathBuf::from);

        let project_root = var("DOCQA_ROOT").unwrap_or(cwd);
        let data_dir = var("DOCQA_DATA_DIR").unwrap_or_else(|| project_root.join("data"));
        let config_path = var("DOCQA_CONFIG_PATH").unwrap_or_else(|| project_root.join("config.yml"));
        let db_path = var("DOCQA_DB_PATH").unwrap_or_else(|| data_dir.join("doc_chunks.db"));
        let log_dir = data_dir.join("logs");
        let secrets_path = data_dir.join("secrets.yaml");

        let db_dir = db_path.parent().map(PathBuf::from);
        for dir in [Some(&data_dir), Some(&log_dir), db_dir.as_ref()].into_iter().flatten() {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            project_root,
            data_dir,
            log_dir,
            db_path,
            config_path,
            secrets_path,
        }
    }

    /// Call after logging is initialised.
    pub fn log_resolved(&self) {
        tracing::info!(
            config = %self.config_path.display(),
            secrets = %self.secrets_path.display(),
            db = %self.db_path.display(),
            logs = %self.log_dir.display(),
            "Resolved paths"
        );
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::from_env()
    }
}
