use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
pub struct ConfigFile {
    pub api_key: Option<String>,
    pub object_key: Option<String>,
    pub endpoints: Option<Vec<String>>,
    pub max_pages: Option<usize>,
    pub timeout: Option<usize>,
    pub proxy: Option<String>,
    pub page_size: Option<usize>,
    pub single_value: Option<bool>,
    pub output: Option<String>,
    pub output_format: Option<String>,
    pub no_color: Option<bool>,
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("USERPROFILE").map(PathBuf::from))
        .or_else(|| {
            let drive = env::var_os("HOMEDRIVE")?;
            let path = env::var_os("HOMEPATH")?;
            Some(PathBuf::from(drive).join(path))
        })
}

pub fn default_config_path() -> Option<PathBuf> {
    Some(home_dir()?.join(".recordharvest").join("config.yml"))
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        if let Some(home) = home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

pub fn load_config(path: &Path, allow_missing: bool) -> Result<ConfigFile, String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_yaml::from_str::<Option<ConfigFile>>(&contents)
            .map(|cfg| cfg.unwrap_or_default())
            .map_err(|e| format!("failed to parse config '{}': {e}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && allow_missing => {
            Ok(ConfigFile::default())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(format!("config file not found '{}'", path.display()))
        }
        Err(e) => Err(format!("failed to read config '{}': {e}", path.display())),
    }
}

fn default_config_yaml() -> String {
    r#"# recordharvest config
#
# Location (default):
#   ~/.recordharvest/config.yml

# Credentials (the API key can also come from RECORDHARVEST_API_KEY)
# api_key: your-key
# object_key: your-custom-object

# Upstream base endpoints, tried in order until one answers
# endpoints:
#   - https://api.sleekflow.io
#   - https://sleekflow-core-app-eus-production.azurewebsites.net
#   - https://sleekflow-core-app-seas-production.azurewebsites.net
#   - https://sleekflow-core-app-weu-production.azurewebsites.net
#   - https://sleekflow-core-app-uaen-production.azurewebsites.net

# Fetching
max_pages: 50
timeout: 30
# proxy: http://127.0.0.1:8080

# View (page_size: 25, 50, 100, 250 or 500)
page_size: 100
single_value: false

# Output (optional)
# output: ./records.csv
# output_format: csv

no_color: false
"#
    .to_string()
}

pub fn ensure_default_config_file(path: &Path) -> Result<bool, String> {
    if path.exists() {
        return Ok(false);
    }
    let parent = path
        .parent()
        .ok_or_else(|| format!("invalid config path '{}'", path.display()))?;
    std::fs::create_dir_all(parent).map_err(|e| {
        format!(
            "failed to create config directory '{}': {e}",
            parent.display()
        )
    })?;
    std::fs::write(path, default_config_yaml())
        .map_err(|e| format!("failed to write config file '{}': {e}", path.display()))?;
    Ok(true)
}
