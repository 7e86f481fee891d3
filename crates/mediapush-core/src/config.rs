//! Configuration module for MediaPush.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.
//! The finished [`Config`] is immutable and handed to each component.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{MediaClass, SizeClass};

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Upper bound for `auth.refresh_window_secs`
const MAX_REFRESH_WINDOW_SECS: u64 = 86_400;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for MediaPush.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub upload: UploadConfig,
    pub transfer: TransferConfig,
    pub retry: RetryConfig,
    pub planner: PlannerConfig,
    pub dedup: DedupConfig,
    pub auth: AuthConfig,
    pub remote: RemoteConfig,
    pub logging: LoggingConfig,
}

/// Where state and staged copies live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database holding items, batches and the credential.
    pub database_path: PathBuf,
    /// Directory the accessor exports copies into. Free space is measured here.
    pub staging_dir: PathBuf,
}

/// Worker pool and retry ceilings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Items transferred in parallel.
    pub concurrency: usize,
    /// An item whose `retry_count` exceeds this fails with `retries-exhausted`.
    pub max_retries: u32,
    /// Attempts per phase before the item is handed back to the next cycle.
    pub max_phase_attempts: u32,
}

/// Size classes, chunk sizes and per-phase timeouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Items above this size (in MiB) are `large`.
    pub large_threshold_mb: u64,
    /// Chunk size (in MiB) for small items.
    pub small_chunk_mb: u64,
    /// Chunk size (in MiB) for large items.
    pub large_chunk_mb: u64,
    pub small_timeout_secs: u64,
    pub large_timeout_secs: u64,
}

/// Exponential backoff settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Randomise each delay within `[delay/2, delay]`.
    pub jitter: bool,
}

/// Upper bound on staged bytes, independent of free space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiskCeiling {
    AbsoluteGb(u64),
    PercentOfFree(u8),
}

impl DiskCeiling {
    /// Ceiling in bytes given the observed free space.
    pub fn bytes(&self, free_bytes: u64) -> u64 {
        match *self {
            DiskCeiling::AbsoluteGb(gb) => gb.saturating_mul(GIB),
            DiskCeiling::PercentOfFree(pct) => {
                let pct = u128::from(pct.min(100));
                (u128::from(free_bytes) * pct / 100) as u64
            }
        }
    }
}

/// Which class the planner fills a batch with first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassPriority {
    #[default]
    PhotosFirst,
    VideosFirst,
}

impl ClassPriority {
    pub fn preferred_class(&self) -> MediaClass {
        match self {
            ClassPriority::PhotosFirst => MediaClass::Photo,
            ClassPriority::VideosFirst => MediaClass::Video,
        }
    }
}

/// Batch planner settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Written as a single-key map, e.g. `ceiling: { absolute_gb: 20 }`.
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub ceiling: DiskCeiling,
    /// Free space (in GiB) always left untouched on the staging volume.
    pub safety_margin_gb: u64,
    /// Upper bound on items per batch.
    pub max_items: usize,
    pub priority: ClassPriority,
}

/// What to do with a visually near-identical image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualPolicy {
    /// Upload anyway and flag the item for review.
    #[default]
    Warn,
    /// Skip the item as `duplicate-visual`.
    Skip,
}

/// Deduplication settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub visual_policy: VisualPolicy,
    /// dHash Hamming distance at or below which two images match.
    pub max_hamming_distance: u32,
    /// Concurrent fingerprinting tasks (CPU-bound, separate from transfers).
    pub fingerprint_concurrency: usize,
}

/// OAuth settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// OAuth client ID. `None` until configured; required by `auth login`.
    pub client_id: Option<String>,
    /// Installed-app client secret, for providers that issue one.
    pub client_secret: Option<String>,
    pub auth_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
    /// Local port for the login redirect.
    pub redirect_port: u16,
    /// Refresh when the access token expires within this many seconds.
    pub refresh_window_secs: u64,
}

/// Remote content store endpoint and throttling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub upload_requests_per_minute: u32,
    pub commit_requests_per_minute: u32,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/mediapush/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("mediapush")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("mediapush");
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("~/.cache"))
            .join("mediapush");
        Self {
            database_path: data_dir.join("mediapush.db"),
            staging_dir: cache_dir.join("staging"),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            max_retries: 5,
            max_phase_attempts: 4,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            large_threshold_mb: 100,
            small_chunk_mb: 4,
            large_chunk_mb: 16,
            small_timeout_secs: 120,
            large_timeout_secs: 1800,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            jitter: false,
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            ceiling: DiskCeiling::AbsoluteGb(20),
            safety_margin_gb: 5,
            max_items: 500,
            priority: ClassPriority::PhotosFirst,
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            visual_policy: VisualPolicy::Warn,
            max_hamming_distance: 6,
            fingerprint_concurrency: 2,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            scopes: vec!["https://www.googleapis.com/auth/photoslibrary.appendonly".to_string()],
            redirect_port: 8400,
            refresh_window_secs: 300,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://photoslibrary.googleapis.com".to_string(),
            upload_requests_per_minute: 120,
            commit_requests_per_minute: 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Derived values
// ---------------------------------------------------------------------------

impl TransferConfig {
    pub fn large_threshold_bytes(&self) -> u64 {
        self.large_threshold_mb.saturating_mul(MIB)
    }

    pub fn size_class(&self, size_bytes: u64) -> SizeClass {
        SizeClass::for_size(size_bytes, self.large_threshold_bytes())
    }

    pub fn chunk_bytes(&self, class: SizeClass) -> u64 {
        match class {
            SizeClass::Small => self.small_chunk_mb.saturating_mul(MIB),
            SizeClass::Large => self.large_chunk_mb.saturating_mul(MIB),
        }
    }

    pub fn phase_timeout(&self, class: SizeClass) -> Duration {
        match class {
            SizeClass::Small => Duration::from_secs(self.small_timeout_secs),
            SizeClass::Large => Duration::from_secs(self.large_timeout_secs),
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl PlannerConfig {
    pub fn safety_margin_bytes(&self) -> u64 {
        self.safety_margin_gb.saturating_mul(GIB)
    }
}

impl AuthConfig {
    pub fn refresh_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.refresh_window_secs.min(MAX_REFRESH_WINDOW_SECS) as i64)
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}/callback", self.redirect_port)
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"upload.concurrency"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn positive(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError {
            field: field.into(),
            message: "must be greater than 0".into(),
        });
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- storage ---
        if self.storage.database_path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.database_path".into(),
                message: "must not be empty".into(),
            });
        }
        if self.storage.staging_dir.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.staging_dir".into(),
                message: "must not be empty".into(),
            });
        }

        // --- upload ---
        if self.upload.concurrency == 0 || self.upload.concurrency > 32 {
            errors.push(ValidationError {
                field: "upload.concurrency".into(),
                message: "must be in range 1..=32".into(),
            });
        }
        positive(
            &mut errors,
            "upload.max_phase_attempts",
            u64::from(self.upload.max_phase_attempts),
        );

        // --- transfer ---
        positive(&mut errors, "transfer.large_threshold_mb", self.transfer.large_threshold_mb);
        positive(&mut errors, "transfer.small_chunk_mb", self.transfer.small_chunk_mb);
        positive(&mut errors, "transfer.large_chunk_mb", self.transfer.large_chunk_mb);
        positive(&mut errors, "transfer.small_timeout_secs", self.transfer.small_timeout_secs);
        positive(&mut errors, "transfer.large_timeout_secs", self.transfer.large_timeout_secs);
        if self.transfer.small_chunk_mb > self.transfer.large_threshold_mb {
            errors.push(ValidationError {
                field: "transfer.small_chunk_mb".into(),
                message: format!(
                    "small_chunk_mb ({}) must not exceed large_threshold_mb ({})",
                    self.transfer.small_chunk_mb, self.transfer.large_threshold_mb
                ),
            });
        }

        // --- retry ---
        positive(&mut errors, "retry.base_delay_ms", self.retry.base_delay_ms);
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            errors.push(ValidationError {
                field: "retry.max_delay_ms".into(),
                message: format!(
                    "max_delay_ms ({}) must be at least base_delay_ms ({})",
                    self.retry.max_delay_ms, self.retry.base_delay_ms
                ),
            });
        }

        // --- planner ---
        match self.planner.ceiling {
            DiskCeiling::AbsoluteGb(0) => errors.push(ValidationError {
                field: "planner.ceiling.absolute_gb".into(),
                message: "must be greater than 0".into(),
            }),
            DiskCeiling::PercentOfFree(pct) if pct == 0 || pct > 100 => {
                errors.push(ValidationError {
                    field: "planner.ceiling.percent_of_free".into(),
                    message: "must be in range 1..=100".into(),
                })
            }
            _ => {}
        }
        positive(&mut errors, "planner.max_items", self.planner.max_items as u64);

        // --- dedup ---
        if self.dedup.max_hamming_distance > 64 {
            errors.push(ValidationError {
                field: "dedup.max_hamming_distance".into(),
                message: "must be in range 0..=64".into(),
            });
        }
        positive(
            &mut errors,
            "dedup.fingerprint_concurrency",
            self.dedup.fingerprint_concurrency as u64,
        );

        // --- auth ---
        if self.auth.client_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            errors.push(ValidationError {
                field: "auth.client_id".into(),
                message: "must not be blank when set".into(),
            });
        }
        for (field, url) in [
            ("auth.auth_url", &self.auth.auth_url),
            ("auth.token_url", &self.auth.token_url),
            ("remote.base_url", &self.remote.base_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                errors.push(ValidationError {
                    field: field.into(),
                    message: format!("not an http(s) URL: '{url}'"),
                });
            }
        }
        if self.auth.refresh_window_secs > MAX_REFRESH_WINDOW_SECS {
            errors.push(ValidationError {
                field: "auth.refresh_window_secs".into(),
                message: format!("must be at most {MAX_REFRESH_WINDOW_SECS}"),
            });
        }
        if self.auth.scopes.is_empty() {
            errors.push(ValidationError {
                field: "auth.scopes".into(),
                message: "at least one scope is required".into(),
            });
        }

        // --- remote ---
        positive(
            &mut errors,
            "remote.upload_requests_per_minute",
            u64::from(self.remote.upload_requests_per_minute),
        );
        positive(
            &mut errors,
            "remote.commit_requests_per_minute",
            u64::from(self.remote.commit_requests_per_minute),
        );

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use mediapush_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .database_path(PathBuf::from("/tmp/mediapush.db"))
///     .upload_concurrency(4)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- storage ---

    pub fn database_path(mut self, path: PathBuf) -> Self {
        self.config.storage.database_path = path;
        self
    }

    pub fn staging_dir(mut self, path: PathBuf) -> Self {
        self.config.storage.staging_dir = path;
        self
    }

    // --- upload ---

    pub fn upload_concurrency(mut self, n: usize) -> Self {
        self.config.upload.concurrency = n;
        self
    }

    pub fn upload_max_retries(mut self, n: u32) -> Self {
        self.config.upload.max_retries = n;
        self
    }

    pub fn upload_max_phase_attempts(mut self, n: u32) -> Self {
        self.config.upload.max_phase_attempts = n;
        self
    }

    // --- transfer ---

    pub fn transfer_large_threshold_mb(mut self, mb: u64) -> Self {
        self.config.transfer.large_threshold_mb = mb;
        self
    }

    pub fn transfer_chunk_mb(mut self, small: u64, large: u64) -> Self {
        self.config.transfer.small_chunk_mb = small;
        self.config.transfer.large_chunk_mb = large;
        self
    }

    pub fn transfer_timeouts_secs(mut self, small: u64, large: u64) -> Self {
        self.config.transfer.small_timeout_secs = small;
        self.config.transfer.large_timeout_secs = large;
        self
    }

    // --- retry ---

    pub fn retry_delays_ms(mut self, base: u64, max: u64) -> Self {
        self.config.retry.base_delay_ms = base;
        self.config.retry.max_delay_ms = max;
        self
    }

    pub fn retry_jitter(mut self, jitter: bool) -> Self {
        self.config.retry.jitter = jitter;
        self
    }

    // --- planner ---

    pub fn planner_ceiling(mut self, ceiling: DiskCeiling) -> Self {
        self.config.planner.ceiling = ceiling;
        self
    }

    pub fn planner_safety_margin_gb(mut self, gb: u64) -> Self {
        self.config.planner.safety_margin_gb = gb;
        self
    }

    pub fn planner_max_items(mut self, n: usize) -> Self {
        self.config.planner.max_items = n;
        self
    }

    pub fn planner_priority(mut self, priority: ClassPriority) -> Self {
        self.config.planner.priority = priority;
        self
    }

    // --- dedup ---

    pub fn dedup_visual_policy(mut self, policy: VisualPolicy) -> Self {
        self.config.dedup.visual_policy = policy;
        self
    }

    pub fn dedup_max_hamming_distance(mut self, distance: u32) -> Self {
        self.config.dedup.max_hamming_distance = distance;
        self
    }

    // --- auth ---

    pub fn auth_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.config.auth.client_id = Some(client_id.into());
        self
    }

    pub fn auth_token_url(mut self, url: impl Into<String>) -> Self {
        self.config.auth.token_url = url.into();
        self
    }

    pub fn auth_refresh_window_secs(mut self, secs: u64) -> Self {
        self.config.auth.refresh_window_secs = secs;
        self
    }

    // --- remote ---

    pub fn remote_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.remote.base_url = url.into();
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
