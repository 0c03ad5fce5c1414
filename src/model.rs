use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "kwa-console.yaml";
pub const CONFIG_DIR_ENV: &str = "KWA_TUI_CONFIG_DIR";

/// Pages the console can show, in tab order.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum PageId {
    #[default]
    Dashboard,
    AddValve,
    Valves,
    Conversions,
}

impl PageId {
    pub fn title(self) -> &'static str {
        match self {
            PageId::Dashboard => "Dashboard",
            PageId::AddValve => "Add Valve",
            PageId::Valves => "Valves",
            PageId::Conversions => "Conversions",
        }
    }

    /// Key used by the role/permission API for this page, if it is gated.
    pub fn permission_page(self) -> Option<&'static str> {
        match self {
            PageId::Valves => Some("valves"),
            PageId::Conversions => Some("e-tapp"),
            PageId::Dashboard | PageId::AddValve => None,
        }
    }

    pub fn all() -> [PageId; 4] {
        [
            PageId::Dashboard,
            PageId::AddValve,
            PageId::Valves,
            PageId::Conversions,
        ]
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    // Bearer token; `${VAR}` references are expanded from the environment
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConsoleConfig {
    #[serde(default = "default_header")]
    pub header: String,
    #[serde(default)]
    pub api: ApiConfig,
    // Filter lists on the server (query params) instead of in memory
    #[serde(default)]
    pub use_api_filtering: bool,
    #[serde(default = "default_export_dir")]
    pub export_dir: String,
    #[serde(default)]
    pub log_file: Option<String>,
    #[serde(default = "default_pages")]
    pub pages: Vec<PageId>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            header: default_header(),
            api: ApiConfig::default(),
            use_api_filtering: false,
            export_dir: default_export_dir(),
            log_file: None,
            pages: default_pages(),
        }
    }
}

fn default_header() -> String {
    "Kerala Water Authority".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_export_dir() -> String {
    ".".to_string()
}

fn default_pages() -> Vec<PageId> {
    PageId::all().to_vec()
}

pub(crate) fn validate_console_config(cfg: &ConsoleConfig) -> Result<(), String> {
    use std::collections::HashSet;
    if cfg.api.base_url.trim().is_empty() {
        return Err("api.base_url must not be empty".to_string());
    }
    if !(cfg.api.base_url.starts_with("http://") || cfg.api.base_url.starts_with("https://")) {
        return Err(format!(
            "api.base_url must be an http(s) URL, got '{}'",
            cfg.api.base_url
        ));
    }
    if cfg.api.timeout_secs == 0 {
        return Err("api.timeout_secs must be greater than zero".to_string());
    }
    if cfg.pages.is_empty() {
        return Err("pages must list at least one page".to_string());
    }
    let mut seen = HashSet::new();
    for (i, p) in cfg.pages.iter().enumerate() {
        if !seen.insert(*p) {
            return Err(format!("duplicate page: '{}' at index {}", p.title(), i));
        }
    }
    Ok(())
}

/// Expand `${VAR}` references from the environment; unknown variables become empty.
pub(crate) fn expand_env(raw: &str, env_map: &HashMap<String, String>) -> String {
    let re = match Regex::new(r"\$\{([A-Za-z0-9_]+)\}") {
        Ok(re) => re,
        Err(_) => return raw.to_string(),
    };
    re.replace_all(raw, |caps: &regex::Captures| {
        env_map.get(&caps[1]).cloned().unwrap_or_default()
    })
    .to_string()
}

pub(crate) fn parse_config(text: &str, env_map: &HashMap<String, String>) -> Result<ConsoleConfig> {
    let mut cfg: ConsoleConfig = serde_yaml::from_str(text).context("parsing console config")?;
    cfg.api.base_url = expand_env(&cfg.api.base_url, env_map);
    cfg.api.token = cfg
        .api
        .token
        .as_deref()
        .map(|t| expand_env(t, env_map))
        .filter(|t| !t.is_empty());
    validate_console_config(&cfg).map_err(|e| anyhow::anyhow!(e))?;
    Ok(cfg)
}

fn read_config(path: &Path) -> Result<ConsoleConfig> {
    let s = fs::read_to_string(path).with_context(|| format!("reading {path:?}"))?;
    let env_map: HashMap<String, String> = std::env::vars().collect();
    parse_config(&s, &env_map).with_context(|| format!("loading {path:?}"))
}

/// Locate the console config: `$KWA_TUI_CONFIG_DIR`, then CWD, `.kwa/` in CWD
/// and its ancestors, then `~/.kwa/`.
pub fn discover_config_path() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        let p = PathBuf::from(dir).join(CONFIG_FILE);
        return p.exists().then_some(p);
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    for p in [cwd.join(CONFIG_FILE), cwd.join(".kwa").join(CONFIG_FILE)] {
        if p.exists() {
            return Some(p);
        }
    }
    let mut cur = cwd.as_path();
    while let Some(parent) = cur.parent() {
        let p = parent.join(".kwa").join(CONFIG_FILE);
        if p.exists() {
            return Some(p);
        }
        cur = parent;
    }
    let home = std::env::var("HOME")
        .ok()
        .or_else(|| std::env::var("USERPROFILE").ok())
        .map(PathBuf::from)?;
    let p = home.join(".kwa").join(CONFIG_FILE);
    p.exists().then_some(p)
}

pub fn load_config() -> Result<ConsoleConfig> {
    let path = discover_config_path().ok_or_else(|| {
        anyhow::anyhow!(
            "No config found. Set {CONFIG_DIR_ENV}=<dir with {CONFIG_FILE}> or place {CONFIG_FILE} in CWD/.kwa and ancestors"
        )
    })?;
    read_config(&path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parse_config_expands_token_from_env() {
        let yaml = r#"
api:
  base_url: "http://cms.local/api"
  token: "${KWA_API_TOKEN}"
use_api_filtering: true
"#;
        let cfg = parse_config(yaml, &env(&[("KWA_API_TOKEN", "s3cret")])).unwrap();
        assert_eq!(cfg.api.token.as_deref(), Some("s3cret"));
        assert!(cfg.use_api_filtering);
        assert_eq!(cfg.api.timeout_secs, 15);
        assert_eq!(cfg.pages.len(), 4);
    }

    #[test]
    fn missing_env_token_becomes_none() {
        let yaml = "api:\n  base_url: \"http://cms.local/api\"\n  token: \"${NOPE}\"\n";
        let cfg = parse_config(yaml, &env(&[])).unwrap();
        assert!(cfg.api.token.is_none());
    }

    #[test]
    fn validate_rejects_duplicate_pages() {
        let cfg = ConsoleConfig {
            pages: vec![PageId::Valves, PageId::Valves],
            ..Default::default()
        };
        let err = validate_console_config(&cfg).unwrap_err();
        assert!(err.contains("duplicate page"));
    }

    #[test]
    fn validate_rejects_non_http_base_url() {
        let mut cfg = ConsoleConfig::default();
        cfg.api.base_url = "ftp://cms".into();
        assert!(validate_console_config(&cfg)
            .unwrap_err()
            .contains("http(s)"));
        cfg.api.base_url = "http://cms".into();
        cfg.api.timeout_secs = 0;
        assert!(validate_console_config(&cfg)
            .unwrap_err()
            .contains("timeout"));
    }

    #[test]
    fn unknown_page_name_fails_to_parse() {
        let yaml = "pages: [dashboard, reports]\n";
        assert!(parse_config(yaml, &env(&[])).is_err());
    }
}
