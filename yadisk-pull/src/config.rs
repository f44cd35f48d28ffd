use std::path::{Path, PathBuf};

use anyhow::Context;

const DEFAULT_PAGE_SIZE: u32 = 100;

/// Settings read from the environment (and `.env`, loaded by `main`).
#[derive(Clone, Debug)]
pub struct PullConfig {
    pub token: String,
    pub api_base_url: Option<String>,
    /// Where to start looking for the sync root; defaults to the current directory.
    pub start_dir: Option<PathBuf>,
    pub assume_yes: bool,
    pub delete_extraneous: bool,
    pub page_size: u32,
}

impl PullConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let token = var("YADISK_TOKEN")
            .filter(|value| !value.trim().is_empty())
            .context("YADISK_TOKEN is not set")?;
        let start_dir = match var("YADISK_SYNC_DIR") {
            Some(value) if value.starts_with('~') => {
                let home = dirs::home_dir().context("home directory is unavailable")?;
                Some(expand_with_home(&value, &home))
            }
            Some(value) => Some(PathBuf::from(value)),
            None => None,
        };
        let page_size = var("YADISK_LIST_PAGE_SIZE")
            .and_then(|value| value.parse::<u32>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE);

        Ok(Self {
            token,
            api_base_url: var("YADISK_API_BASE_URL"),
            start_dir,
            assume_yes: parse_bool(var("YADISK_ASSUME_YES"), false),
            delete_extraneous: parse_bool(var("YADISK_PULL_DELETE"), false),
            page_size,
        })
    }
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

fn parse_bool(value: Option<String>, default: bool) -> bool {
    value
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}
