use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Directory holding config.toml, the token and the Drive state - not serialized
    #[serde(skip)]
    pub config_dir: PathBuf,
    /// Path to config.toml - computed, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,
    /// Default directory for local saves - computed, not serialized
    #[serde(skip)]
    pub workspace_dir: PathBuf,

    #[serde(default)]
    pub judge0: Judge0Config,

    #[serde(default)]
    pub python: PythonConfig,

    #[serde(default)]
    pub javascript: JavaScriptConfig,

    #[serde(default)]
    pub drive: DriveConfig,
}

// ── Remote compile API (Judge0 via RapidAPI) ─────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Judge0Config {
    #[serde(default = "default_judge0_url")]
    pub api_url: String,
    /// Value sent as `X-RapidAPI-Host`
    #[serde(default = "default_judge0_host")]
    pub api_host: String,
    /// RapidAPI key; also `CODEBUDDY_RAPIDAPI_KEY` / `RAPIDAPI_KEY`
    #[serde(default)]
    pub api_key: Option<String>,
    /// GCC 14.1.0
    #[serde(default = "default_c_language_id")]
    pub c_language_id: u32,
    /// G++ 14.1.0
    #[serde(default = "default_cpp_language_id")]
    pub cpp_language_id: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_judge0_url() -> String {
    "https://judge0-ce.p.rapidapi.com".into()
}

fn default_judge0_host() -> String {
    "judge0-ce.p.rapidapi.com".into()
}

fn default_c_language_id() -> u32 {
    103
}

fn default_cpp_language_id() -> u32 {
    105
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_poll_attempts() -> u32 {
    30
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for Judge0Config {
    fn default() -> Self {
        Self {
            api_url: default_judge0_url(),
            api_host: default_judge0_host(),
            api_key: None,
            c_language_id: default_c_language_id(),
            cpp_language_id: default_cpp_language_id(),
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_attempts: default_max_poll_attempts(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

// ── Interactive interpreter ──────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PythonConfig {
    /// Interpreter executable, resolved through PATH
    #[serde(default = "default_python_interpreter")]
    pub interpreter: String,
}

fn default_python_interpreter() -> String {
    "python3".into()
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            interpreter: default_python_interpreter(),
        }
    }
}

// ── In-process JavaScript evaluation ─────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JavaScriptConfig {
    #[serde(default = "default_js_memory_limit")]
    pub memory_limit_bytes: usize,
    #[serde(default = "default_js_cpu_time_limit_ms")]
    pub cpu_time_limit_ms: u64,
}

fn default_js_memory_limit() -> usize {
    32 * 1024 * 1024
}

fn default_js_cpu_time_limit_ms() -> u64 {
    5000
}

impl Default for JavaScriptConfig {
    fn default() -> Self {
        Self {
            memory_limit_bytes: default_js_memory_limit(),
            cpu_time_limit_ms: default_js_cpu_time_limit_ms(),
        }
    }
}

// ── Google Drive ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveConfig {
    /// OAuth client id; also `CODEBUDDY_GOOGLE_CLIENT_ID`
    #[serde(default)]
    pub client_id: Option<String>,
    /// OAuth client secret (desktop clients); also `CODEBUDDY_GOOGLE_CLIENT_SECRET`
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Drive folder that holds saved documents
    #[serde(default = "default_drive_folder")]
    pub folder_name: String,
    #[serde(default = "default_drive_api_base")]
    pub api_base: String,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_revoke_url")]
    pub revoke_url: String,
    /// Loopback port for the OAuth redirect
    #[serde(default = "default_redirect_port")]
    pub redirect_port: u16,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

fn default_drive_folder() -> String {
    "CodeBuddy".into()
}

fn default_drive_api_base() -> String {
    "https://www.googleapis.com".into()
}

fn default_auth_url() -> String {
    "https://accounts.google.com/o/oauth2/v2/auth".into()
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".into()
}

fn default_revoke_url() -> String {
    "https://oauth2.googleapis.com/revoke".into()
}

fn default_redirect_port() -> u16 {
    8765
}

fn default_scopes() -> Vec<String> {
    vec![
        "https://www.googleapis.com/auth/drive.file".into(),
        "https://www.googleapis.com/auth/drive.readonly".into(),
        "https://www.googleapis.com/auth/userinfo.profile".into(),
        "https://www.googleapis.com/auth/userinfo.email".into(),
    ]
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            folder_name: default_drive_folder(),
            api_base: default_drive_api_base(),
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            revoke_url: default_revoke_url(),
            redirect_port: default_redirect_port(),
            scopes: default_scopes(),
        }
    }
}

// ── Loading / saving ─────────────────────────────────────────────

impl Config {
    /// Load `~/.codebuddy/config.toml`, creating it with defaults on first use.
    pub fn load_or_init() -> Result<Self> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .context("Could not find home directory")?;
        let mut config = Self::load_or_init_in(&home.join(".codebuddy"))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load (or create) the config stored in `config_dir`. No env overrides.
    pub fn load_or_init_in(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join("config.toml");
        let workspace_dir = config_dir.join("workspace");

        if !config_dir.exists() {
            fs::create_dir_all(config_dir).context("Failed to create .codebuddy directory")?;
        }
        fs::create_dir_all(&workspace_dir).context("Failed to create workspace directory")?;

        let mut config = if config_path.exists() {
            let contents =
                fs::read_to_string(&config_path).context("Failed to read config file")?;
            toml::from_str::<Config>(&contents).context("Failed to parse config file")?
        } else {
            Config::default()
        };

        config.config_dir = config_dir.to_path_buf();
        config.config_path = config_path.clone();
        config.workspace_dir = workspace_dir;

        if !config_path.exists() {
            config.save()?;
        }
        Ok(config)
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source. Empty values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| lookup(key).filter(|value| !value.trim().is_empty()))
        };

        // RapidAPI key: CODEBUDDY_RAPIDAPI_KEY or RAPIDAPI_KEY
        if let Some(key) = get(&["CODEBUDDY_RAPIDAPI_KEY", "RAPIDAPI_KEY"]) {
            self.judge0.api_key = Some(key);
        }
        if let Some(url) = get(&["CODEBUDDY_JUDGE0_URL"]) {
            self.judge0.api_url = url;
        }
        if let Some(python) = get(&["CODEBUDDY_PYTHON"]) {
            self.python.interpreter = python;
        }
        if let Some(id) = get(&["CODEBUDDY_GOOGLE_CLIENT_ID"]) {
            self.drive.client_id = Some(id);
        }
        if let Some(secret) = get(&["CODEBUDDY_GOOGLE_CLIENT_SECRET"]) {
            self.drive.client_secret = Some(secret);
        }
        if let Some(workspace) = get(&["CODEBUDDY_WORKSPACE"]) {
            self.workspace_dir = PathBuf::from(workspace);
        }
    }

    pub fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        fs::write(&self.config_path, toml_str).context("Failed to write config file")?;
        Ok(())
    }

    /// Where the Google access token is persisted.
    pub fn token_path(&self) -> PathBuf {
        self.config_dir.join("google_token.json")
    }

    /// Where the resolved Drive folder id is cached.
    pub fn drive_state_path(&self) -> PathBuf {
        self.config_dir.join("drive_state.json")
    }
}
