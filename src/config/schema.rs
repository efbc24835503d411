use crate::media::parse_version;
use anyhow::{Context, Result};
use directories::UserDirs;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
#[cfg(unix)]
use tokio::fs::File;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Upper bound for `sessions.ttl_secs` (ten years).
const MAX_SESSION_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

// ── Top-level config ──────────────────────────────────────────────

/// Top-level configuration, loaded from `config.toml`.
///
/// Resolution order: `--config-dir` / `AIMMS_CONFIG_DIR` env → `~/.aimms-sessions/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    /// Path to config.toml - computed at load time, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Session store limits and eviction (`[sessions]`).
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// Media tooling checks and command execution (`[media]`).
    #[serde(default)]
    pub media: MediaConfig,
}

// ── Sessions ─────────────────────────────────────────────────────

/// What `create` does when the store already holds `max_sessions` live sessions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionOverflow {
    /// Evict the session with the oldest last activity.
    #[default]
    EvictIdle,
    /// Refuse the new session.
    Reject,
}

impl fmt::Display for SessionOverflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EvictIdle => f.write_str("evict_idle"),
            Self::Reject => f.write_str("reject"),
        }
    }
}

/// Session store configuration (`[sessions]` section).
///
/// Defaults keep every session until it is removed explicitly.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionsConfig {
    /// Idle time after which a session expires, in seconds. `0` disables expiry. Default: `0`.
    #[serde(default)]
    pub ttl_secs: u64,
    /// Maximum live sessions. `0` means unbounded. Default: `0`.
    #[serde(default)]
    pub max_sessions: usize,
    /// Policy applied when `max_sessions` is reached. Default: `"evict_idle"`.
    #[serde(default)]
    pub overflow: SessionOverflow,
    /// Interval between background expiry sweeps, in seconds. `0` disables the sweeper. Default: `60`.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 0,
            max_sessions: 0,
            overflow: SessionOverflow::default(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

// ── Media ────────────────────────────────────────────────────────

/// Media tooling configuration (`[media]` section).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MediaConfig {
    /// ffmpeg executable name or path; `~` is expanded. Default: `"ffmpeg"`.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    /// Minimum accepted ffmpeg version (e.g. `"4.0"`). Empty disables the check. Default: `"4.0"`.
    #[serde(default = "default_min_ffmpeg_version")]
    pub min_ffmpeg_version: String,
    /// Timeout for external media commands, in seconds. Default: `10`.
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    /// Treat a missing or outdated ffmpeg as a failure in `doctor`. Default: `false`.
    #[serde(default)]
    pub require_ffmpeg: bool,
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".into()
}

fn default_min_ffmpeg_version() -> String {
    "4.0".into()
}

fn default_command_timeout_secs() -> u64 {
    10
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            min_ffmpeg_version: default_min_ffmpeg_version(),
            command_timeout_secs: default_command_timeout_secs(),
            require_ffmpeg: false,
        }
    }
}

impl MediaConfig {
    /// `ffmpeg_path` with a leading `~` expanded to the home directory.
    pub fn resolved_ffmpeg_path(&self) -> String {
        shellexpand::tilde(self.ffmpeg_path.trim()).into_owned()
    }

    pub fn command_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.command_timeout_secs)
    }
}

fn parse_overflow(raw: &str) -> Option<SessionOverflow> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "evict_idle" | "evict-idle" | "evict" => Some(SessionOverflow::EvictIdle),
        "reject" => Some(SessionOverflow::Reject),
        _ => None,
    }
}

// ── Config impl ──────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        let home =
            UserDirs::new().map_or_else(|| PathBuf::from("."), |u| u.home_dir().to_path_buf());

        Self {
            config_path: home.join(".aimms-sessions").join("config.toml"),
            sessions: SessionsConfig::default(),
            media: MediaConfig::default(),
        }
    }
}

fn default_config_dir() -> Result<PathBuf> {
    let home = UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .context("Could not find home directory")?;
    Ok(home.join(".aimms-sessions"))
}

fn resolve_config_dir() -> Result<PathBuf> {
    match std::env::var("AIMMS_CONFIG_DIR") {
        Ok(dir) if !dir.trim().is_empty() => {
            Ok(PathBuf::from(shellexpand::tilde(dir.trim()).into_owned()))
        }
        _ => default_config_dir(),
    }
}

impl Config {
    pub async fn load_or_init() -> Result<Self> {
        let config_dir = resolve_config_dir()?;
        Self::load_or_init_in(&config_dir).await
    }

    /// Load `config.toml` from `config_dir`, writing defaults first if it does not exist.
    pub async fn load_or_init_in(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join("config.toml");

        fs::create_dir_all(config_dir).await.with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let initialized = if config_path.exists() {
            false
        } else {
            let mut config = Config::default();
            config.config_path = config_path.clone();
            config.save().await?;

            #[cfg(unix)]
            {
                use std::{fs::Permissions, os::unix::fs::PermissionsExt};
                let _ = fs::set_permissions(&config_path, Permissions::from_mode(0o600)).await;
            }
            true
        };

        let contents = fs::read_to_string(&config_path)
            .await
            .context("Failed to read config file")?;
        let mut config: Config =
            toml::from_str(&contents).context("Failed to parse config file")?;
        // Set computed paths that are skipped during serialization
        config.config_path = config_path;

        config.apply_env_overrides();
        config.validate()?;
        tracing::info!(
            path = %config.config_path.display(),
            initialized,
            "Config loaded"
        );
        Ok(config)
    }

    /// Validate configuration values that would cause runtime failures.
    pub fn validate(&self) -> Result<()> {
        // Sessions
        if self.sessions.ttl_secs > MAX_SESSION_TTL_SECS {
            anyhow::bail!(
                "sessions.ttl_secs must be at most {MAX_SESSION_TTL_SECS} (got {})",
                self.sessions.ttl_secs
            );
        }

        // Media
        if self.media.ffmpeg_path.trim().is_empty() {
            anyhow::bail!("media.ffmpeg_path must not be empty");
        }
        if self.media.command_timeout_secs == 0 {
            anyhow::bail!("media.command_timeout_secs must be greater than 0");
        }
        let min_version = self.media.min_ffmpeg_version.trim();
        if !min_version.is_empty() && parse_version(min_version).is_none() {
            anyhow::bail!(
                "media.min_ffmpeg_version is invalid ({min_version}); expected MAJOR[.MINOR[.PATCH]]"
            );
        }

        Ok(())
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        if let Ok(raw) = std::env::var("AIMMS_SESSION_TTL_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(ttl) => self.sessions.ttl_secs = ttl,
                Err(_) => tracing::warn!(value = %raw, "Ignoring invalid AIMMS_SESSION_TTL_SECS"),
            }
        }

        if let Ok(raw) = std::env::var("AIMMS_MAX_SESSIONS") {
            match raw.trim().parse::<usize>() {
                Ok(max) => self.sessions.max_sessions = max,
                Err(_) => tracing::warn!(value = %raw, "Ignoring invalid AIMMS_MAX_SESSIONS"),
            }
        }

        if let Ok(raw) = std::env::var("AIMMS_SESSION_OVERFLOW") {
            if let Some(overflow) = parse_overflow(&raw) {
                self.sessions.overflow = overflow;
            } else {
                tracing::warn!(
                    value = %raw,
                    "Ignoring invalid AIMMS_SESSION_OVERFLOW (valid: evict_idle|reject)"
                );
            }
        }

        if let Ok(raw) = std::env::var("AIMMS_SWEEP_INTERVAL_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(secs) => self.sessions.sweep_interval_secs = secs,
                Err(_) => tracing::warn!(value = %raw, "Ignoring invalid AIMMS_SWEEP_INTERVAL_SECS"),
            }
        }

        if let Ok(path) = std::env::var("AIMMS_FFMPEG_PATH") {
            if !path.trim().is_empty() {
                self.media.ffmpeg_path = path;
            }
        }

        if let Ok(raw) = std::env::var("AIMMS_COMMAND_TIMEOUT_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.media.command_timeout_secs = secs,
                _ => tracing::warn!(value = %raw, "Ignoring invalid AIMMS_COMMAND_TIMEOUT_SECS"),
            }
        }
    }

    /// Write the config to `config_path` with owner-only permissions.
    ///
    /// The new contents go to a temp file beside the target and are renamed
    /// over it. The previous file is copied to `<name>.bak` first and restored
    /// if the rename fails; the backup is removed once the rename is synced.
    pub async fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;

        let parent_dir = self
            .config_path
            .parent()
            .context("Config path must have a parent directory")?;

        fs::create_dir_all(parent_dir).await.with_context(|| {
            format!(
                "Failed to create config directory: {}",
                parent_dir.display()
            )
        })?;

        let file_name = self
            .config_path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or("config.toml");
        let temp_path = parent_dir.join(format!(".{file_name}.tmp-{}", uuid::Uuid::new_v4()));
        let backup_path = parent_dir.join(format!("{file_name}.bak"));

        let mut temp_file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to create temporary config file: {}",
                    temp_path.display()
                )
            })?;
        temp_file
            .write_all(toml_str.as_bytes())
            .await
            .context("Failed to write temporary config contents")?;
        temp_file
            .sync_all()
            .await
            .context("Failed to fsync temporary config file")?;
        drop(temp_file);

        let had_existing_config = self.config_path.exists();
        if had_existing_config {
            fs::copy(&self.config_path, &backup_path)
                .await
                .with_context(|| {
                    format!(
                        "Failed to create config backup before atomic replace: {}",
                        backup_path.display()
                    )
                })?;
        }

        if let Err(e) = fs::rename(&temp_path, &self.config_path).await {
            let _ = fs::remove_file(&temp_path).await;
            if had_existing_config && backup_path.exists() {
                fs::copy(&backup_path, &self.config_path)
                    .await
                    .context("Failed to restore config backup")?;
            }
            anyhow::bail!("Failed to atomically replace config file: {e}");
        }

        sync_directory(parent_dir).await?;

        if had_existing_config {
            let _ = fs::remove_file(&backup_path).await;
        }

        Ok(())
    }
}

async fn sync_directory(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        let dir = File::open(path)
            .await
            .with_context(|| format!("Failed to open directory for fsync: {}", path.display()))?;
        dir.sync_all()
            .await
            .with_context(|| format!("Failed to fsync directory metadata: {}", path.display()))?;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::{Mutex, MutexGuard};
    use tokio::test;

    // ── Defaults ─────────────────────────────────────────────

    #[test]
    async fn config_default_has_sane_values() {
        let c = Config::default();
        assert_eq!(c.sessions.ttl_secs, 0);
        assert_eq!(c.sessions.max_sessions, 0);
        assert_eq!(c.sessions.overflow, SessionOverflow::EvictIdle);
        assert_eq!(c.sessions.sweep_interval_secs, 60);
        assert_eq!(c.media.ffmpeg_path, "ffmpeg");
        assert_eq!(c.media.min_ffmpeg_version, "4.0");
        assert_eq!(c.media.command_timeout_secs, 10);
        assert!(!c.media.require_ffmpeg);
        assert!(c.config_path.to_string_lossy().contains("config.toml"));
        c.validate().unwrap();
    }

    #[test]
    async fn config_schema_export_contains_expected_contract_shape() {
        let schema = schemars::schema_for!(Config);
        let schema_json = serde_json::to_value(&schema).expect("schema should serialize to json");

        assert_eq!(
            schema_json
                .get("$schema")
                .and_then(serde_json::Value::as_str),
            Some("https://json-schema.org/draft/2020-12/schema")
        );

        let properties = schema_json
            .get("properties")
            .and_then(serde_json::Value::as_object)
            .expect("schema should expose top-level properties");

        assert!(properties.contains_key("sessions"));
        assert!(properties.contains_key("media"));
        assert!(!properties.contains_key("config_path"));

        assert!(
            schema_json
                .get("$defs")
                .and_then(serde_json::Value::as_object)
                .is_some(),
            "schema should include reusable type definitions"
        );
    }

    // ── Serde round-trip ─────────────────────────────────────

    #[test]
    async fn config_toml_roundtrip() {
        let config = Config {
            config_path: PathBuf::from("/tmp/test/config.toml"),
            sessions: SessionsConfig {
                ttl_secs: 1800,
                max_sessions: 500,
                overflow: SessionOverflow::Reject,
                sweep_interval_secs: 30,
            },
            media: MediaConfig {
                ffmpeg_path: "/usr/local/bin/ffmpeg".into(),
                min_ffmpeg_version: "5.1".into(),
                command_timeout_secs: 20,
                require_ffmpeg: true,
            },
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("overflow = \"reject\""));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.sessions.ttl_secs, 1800);
        assert_eq!(parsed.sessions.max_sessions, 500);
        assert_eq!(parsed.sessions.overflow, SessionOverflow::Reject);
        assert_eq!(parsed.sessions.sweep_interval_secs, 30);
        assert_eq!(parsed.media.ffmpeg_path, "/usr/local/bin/ffmpeg");
        assert_eq!(parsed.media.min_ffmpeg_version, "5.1");
        assert_eq!(parsed.media.command_timeout_secs, 20);
        assert!(parsed.media.require_ffmpeg);
    }

    #[test]
    async fn config_minimal_toml_uses_defaults() {
        let parsed: Config = toml::from_str("").unwrap();
        assert_eq!(parsed.sessions.ttl_secs, 0);
        assert_eq!(parsed.sessions.sweep_interval_secs, 60);
        assert_eq!(parsed.media.ffmpeg_path, "ffmpeg");

        let parsed: Config = toml::from_str("[sessions]\nttl_secs = 900\n").unwrap();
        assert_eq!(parsed.sessions.ttl_secs, 900);
        assert_eq!(parsed.sessions.overflow, SessionOverflow::EvictIdle);
        assert_eq!(parsed.sessions.sweep_interval_secs, 60);
    }

    #[test]
    async fn config_rejects_unknown_overflow_policy() {
        let result: std::result::Result<Config, _> =
            toml::from_str("[sessions]\noverflow = \"drop_newest\"\n");
        assert!(result.is_err());
    }

    // ── Validation ───────────────────────────────────────────

    #[test]
    async fn validate_rejects_zero_command_timeout() {
        let mut config = Config::default();
        config.media.command_timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("command_timeout_secs"));
    }

    #[test]
    async fn validate_rejects_empty_ffmpeg_path() {
        let mut config = Config::default();
        config.media.ffmpeg_path = "   ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    async fn validate_rejects_bad_min_version() {
        let mut config = Config::default();
        config.media.min_ffmpeg_version = "latest".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("min_ffmpeg_version"));

        config.media.min_ffmpeg_version = String::new();
        config.validate().unwrap();
    }

    #[test]
    async fn validate_rejects_absurd_ttl() {
        let mut config = Config::default();
        config.sessions.ttl_secs = u64::MAX;
        assert!(config.validate().is_err());
    }

    #[test]
    async fn resolved_ffmpeg_path_expands_tilde() {
        let media = MediaConfig {
            ffmpeg_path: "~/bin/ffmpeg".into(),
            ..MediaConfig::default()
        };
        let resolved = media.resolved_ffmpeg_path();
        assert!(!resolved.starts_with('~'));
        assert!(resolved.ends_with("bin/ffmpeg"));
    }

    #[test]
    async fn parse_overflow_accepts_aliases() {
        assert_eq!(parse_overflow("evict_idle"), Some(SessionOverflow::EvictIdle));
        assert_eq!(parse_overflow(" Evict-Idle "), Some(SessionOverflow::EvictIdle));
        assert_eq!(parse_overflow("REJECT"), Some(SessionOverflow::Reject));
        assert_eq!(parse_overflow("lru"), None);
    }

    // ── Save / load ──────────────────────────────────────────

    #[test]
    async fn config_save_and_load_tmpdir() {
        let _env_guard = env_override_lock().await;
        clear_env_test_vars();
        let dir = tempfile::tempdir().unwrap();

        let created = Config::load_or_init_in(dir.path()).await.unwrap();
        assert!(created.config_path.exists());
        assert_eq!(created.sessions.ttl_secs, 0);

        let mut edited = created.clone();
        edited.sessions.ttl_secs = 120;
        edited.media.require_ffmpeg = true;
        edited.save().await.unwrap();

        let reloaded = Config::load_or_init_in(dir.path()).await.unwrap();
        assert_eq!(reloaded.sessions.ttl_secs, 120);
        assert!(reloaded.media.require_ffmpeg);
        assert_eq!(reloaded.config_path, dir.path().join("config.toml"));
    }

    #[test]
    async fn config_save_atomic_replaces_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config {
            config_path: dir.path().join("config.toml"),
            ..Config::default()
        };
        config.save().await.unwrap();
        config.sessions.max_sessions = 7;
        config.save().await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["config.toml".to_string()]);

        let contents = std::fs::read_to_string(dir.path().join("config.toml")).unwrap();
        let parsed: Config = toml::from_str(&contents).unwrap();
        assert_eq!(parsed.sessions.max_sessions, 7);
    }

    #[cfg(unix)]
    #[test]
    async fn new_config_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let _env_guard = env_override_lock().await;
        clear_env_test_vars();
        let dir = tempfile::tempdir().unwrap();

        let config = Config::load_or_init_in(dir.path()).await.unwrap();
        let mode = std::fs::metadata(&config.config_path)
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    // ── Env override helpers ─────────────────────────────────

    async fn env_override_lock() -> MutexGuard<'static, ()> {
        static ENV_OVERRIDE_TEST_LOCK: Mutex<()> = Mutex::const_new(());
        ENV_OVERRIDE_TEST_LOCK.lock().await
    }

    fn clear_env_test_vars() {
        for key in [
            "AIMMS_SESSION_TTL_SECS",
            "AIMMS_MAX_SESSIONS",
            "AIMMS_SESSION_OVERFLOW",
            "AIMMS_SWEEP_INTERVAL_SECS",
            "AIMMS_FFMPEG_PATH",
            "AIMMS_COMMAND_TIMEOUT_SECS",
        ] {
            std::env::remove_var(key);
        }
    }

    // ── Env override tests ───────────────────────────────────

    #[test]
    async fn env_override_session_limits() {
        let _env_guard = env_override_lock().await;
        clear_env_test_vars();
        let mut config = Config::default();

        std::env::set_var("AIMMS_SESSION_TTL_SECS", "3600");
        std::env::set_var("AIMMS_MAX_SESSIONS", "250");
        std::env::set_var("AIMMS_SESSION_OVERFLOW", "reject");
        std::env::set_var("AIMMS_SWEEP_INTERVAL_SECS", "15");
        config.apply_env_overrides();

        assert_eq!(config.sessions.ttl_secs, 3600);
        assert_eq!(config.sessions.max_sessions, 250);
        assert_eq!(config.sessions.overflow, SessionOverflow::Reject);
        assert_eq!(config.sessions.sweep_interval_secs, 15);

        clear_env_test_vars();
    }

    #[test]
    async fn env_override_invalid_values_are_ignored() {
        let _env_guard = env_override_lock().await;
        clear_env_test_vars();
        let mut config = Config::default();

        std::env::set_var("AIMMS_SESSION_TTL_SECS", "soon");
        std::env::set_var("AIMMS_SESSION_OVERFLOW", "lru");
        std::env::set_var("AIMMS_COMMAND_TIMEOUT_SECS", "0");
        config.apply_env_overrides();

        assert_eq!(config.sessions.ttl_secs, 0);
        assert_eq!(config.sessions.overflow, SessionOverflow::EvictIdle);
        assert_eq!(config.media.command_timeout_secs, 10);

        clear_env_test_vars();
    }

    #[test]
    async fn env_override_media() {
        let _env_guard = env_override_lock().await;
        clear_env_test_vars();
        let mut config = Config::default();

        std::env::set_var("AIMMS_FFMPEG_PATH", "/opt/ffmpeg/bin/ffmpeg");
        std::env::set_var("AIMMS_COMMAND_TIMEOUT_SECS", "45");
        config.apply_env_overrides();

        assert_eq!(config.media.ffmpeg_path, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(config.media.command_timeout_secs, 45);

        clear_env_test_vars();
    }

    #[test]
    async fn env_override_empty_ffmpeg_path_is_ignored() {
        let _env_guard = env_override_lock().await;
        clear_env_test_vars();
        let mut config = Config::default();

        std::env::set_var("AIMMS_FFMPEG_PATH", "");
        config.apply_env_overrides();
        assert_eq!(config.media.ffmpeg_path, "ffmpeg");

        clear_env_test_vars();
    }
}
