use crate::delivery::DEFAULT_GITHUB_API;
use crate::error::ConfigError;
use crate::formats::{PolicyRule, PolicySet, compile_glob_set, default_policy_rules};
use crate::retrieval::IndexParams;
use crate::workflow::RouterMode;
use crate::workflow::steps::{FAILURE_MARKER, SUCCESS_MARKER};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "confwarden.toml";

// ── Router ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub mode: RouterMode,
    #[serde(default = "default_failure_markers")]
    pub failure_markers: Vec<String>,
    #[serde(default = "default_success_markers")]
    pub success_markers: Vec<String>,
}

fn default_failure_markers() -> Vec<String> {
    vec![FAILURE_MARKER.to_string()]
}

fn default_success_markers() -> Vec<String> {
    vec![SUCCESS_MARKER.to_string()]
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            mode: RouterMode::default(),
            failure_markers: default_failure_markers(),
            success_markers: default_success_markers(),
        }
    }
}

// ── Validator ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    #[serde(default = "default_validator_program")]
    pub program: String,
    /// Arguments placed before the artifact path.
    #[serde(default = "default_validator_args")]
    pub args: Vec<String>,
    #[serde(default = "default_validator_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_validator_program() -> String {
    "conftest".into()
}

fn default_validator_args() -> Vec<String> {
    vec!["test".into()]
}

fn default_validator_timeout_secs() -> u64 {
    60
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            program: default_validator_program(),
            args: default_validator_args(),
            timeout_secs: default_validator_timeout_secs(),
        }
    }
}

// ── Retriever ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieverConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Plain-text export of the reference manual, pages separated by form feeds.
    #[serde(default = "default_source_path")]
    pub source_path: PathBuf,
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

fn default_source_path() -> PathBuf {
    PathBuf::from("aws_cli.txt")
}

fn default_index_path() -> PathBuf {
    PathBuf::from("index/aws_cli.json")
}

fn default_chunk_size() -> usize {
    IndexParams::default().chunk_size
}

fn default_chunk_overlap() -> usize {
    IndexParams::default().chunk_overlap
}

fn default_batch_size() -> usize {
    IndexParams::default().batch_size
}

fn default_top_k() -> usize {
    4
}

fn default_embedding_model() -> String {
    "text-embedding-3-large".into()
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            source_path: default_source_path(),
            index_path: default_index_path(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            batch_size: default_batch_size(),
            top_k: default_top_k(),
            embedding_model: default_embedding_model(),
        }
    }
}

impl RetrieverConfig {
    pub fn index_params(&self) -> IndexParams {
        IndexParams {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            batch_size: self.batch_size,
        }
    }
}

// ── Reporting ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportingConfig {
    /// Base URL serving both `/sse` and `/api/report`.
    #[serde(default)]
    pub endpoint: Option<String>,
}

// ── GitHub ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_github_api")]
    pub api_base: String,
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    #[serde(default = "default_pr_title")]
    pub title: String,
}

fn default_github_api() -> String {
    DEFAULT_GITHUB_API.into()
}

fn default_base_branch() -> String {
    "main".into()
}

fn default_pr_title() -> String {
    "Automated policy remediation".into()
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            token: None,
            api_base: default_github_api(),
            base_branch: default_base_branch(),
            title: default_pr_title(),
        }
    }
}

// ── Watch ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Repository path globs to act on; empty accepts every file.
    #[serde(default)]
    pub allowed_paths: Vec<String>,
}

// ── Top level ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where this config was loaded from; not persisted.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    #[serde(default)]
    pub api_key: Option<String>,
    /// OpenAI-compatible base URL including `/v1`.
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_max_remediation_cycles")]
    pub max_remediation_cycles: u32,
    #[serde(default = "default_agent_max_iterations")]
    pub agent_max_iterations: u32,
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub retriever: RetrieverConfig,
    #[serde(default)]
    pub reporting: ReportingConfig,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default = "default_policy_rules")]
    pub policies: Vec<PolicyRule>,
    #[serde(default)]
    pub watch: WatchConfig,
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("tmp")
}

fn default_model() -> String {
    "gpt-4.1-mini".into()
}

fn default_temperature() -> f64 {
    0.0
}

fn default_max_steps() -> usize {
    20
}

fn default_max_remediation_cycles() -> u32 {
    5
}

fn default_agent_max_iterations() -> u32 {
    8
}

fn default_max_concurrent_runs() -> usize {
    4
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: None,
            scratch_dir: default_scratch_dir(),
            api_key: None,
            api_base: None,
            model: default_model(),
            temperature: default_temperature(),
            max_steps: default_max_steps(),
            max_remediation_cycles: default_max_remediation_cycles(),
            agent_max_iterations: default_agent_max_iterations(),
            max_concurrent_runs: default_max_concurrent_runs(),
            router: RouterConfig::default(),
            validator: ValidatorConfig::default(),
            retriever: RetrieverConfig::default(),
            reporting: ReportingConfig::default(),
            github: GithubConfig::default(),
            policies: default_policy_rules(),
            watch: WatchConfig::default(),
        }
    }
}

fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(raw.as_ref()).as_ref())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Config {
    /// `~/.confwarden/confwarden.toml`
    pub fn default_path() -> Option<PathBuf> {
        UserDirs::new().map(|u| u.home_dir().join(".confwarden").join(CONFIG_FILE_NAME))
    }

    /// An explicit path must exist. Without one, `./confwarden.toml` is
    /// tried, then the per-user default; if neither exists the built-in
    /// defaults are used. Environment overrides apply last.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let candidate = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => [Some(PathBuf::from(CONFIG_FILE_NAME)), Self::default_path()]
                .into_iter()
                .flatten()
                .find(|path| path.is_file()),
        };

        let mut config = match candidate {
            Some(path) => Self::from_file(&path)?,
            None => {
                tracing::debug!("no config file found; using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        config.expand_paths();
        config.check()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?;
        let mut config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?;
        config.config_path = Some(path.to_path_buf());
        tracing::info!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Overrides from any key lookup; empty values are ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(endpoint) = non_empty(lookup("CONFWARDEN_ENDPOINT")) {
            self.reporting.endpoint = Some(endpoint);
        }
        if let Some(key) = non_empty(lookup("OPENAI_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(token) = non_empty(lookup("GITHUB_TOKEN")) {
            self.github.token = Some(token);
        }
        if let Some(model) = non_empty(lookup("CONFWARDEN_MODEL")) {
            self.model = model;
        }
        if let Some(dir) = non_empty(lookup("CONFWARDEN_SCRATCH_DIR")) {
            self.scratch_dir = PathBuf::from(dir);
        }
    }

    fn expand_paths(&mut self) {
        self.scratch_dir = expand_path(&self.scratch_dir);
        self.retriever.source_path = expand_path(&self.retriever.source_path);
        self.retriever.index_path = expand_path(&self.retriever.index_path);
    }

    /// Structural checks that hold for every command.
    fn check(&self) -> Result<(), ConfigError> {
        if self.max_steps == 0 {
            return Err(ConfigError::Validation("max_steps must be at least 1".into()));
        }
        if self.max_concurrent_runs == 0 {
            return Err(ConfigError::Validation(
                "max_concurrent_runs must be at least 1".into(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Validation(format!(
                "temperature {} outside 0.0..=2.0",
                self.temperature
            )));
        }
        if self.retriever.chunk_overlap >= self.retriever.chunk_size {
            return Err(ConfigError::Validation(
                "retriever.chunk_overlap must be smaller than chunk_size".into(),
            ));
        }
        if self.policies.is_empty() {
            return Err(ConfigError::Validation("no policy rules configured".into()));
        }
        PolicySet::compile(&self.policies)
            .map_err(|e| ConfigError::Validation(format!("policies: {e}")))?;
        compile_glob_set(&self.watch.allowed_paths)
            .map_err(|e| ConfigError::Validation(format!("watch.allowed_paths: {e}")))?;
        Ok(())
    }

    /// Watch mode cannot start without somewhere to subscribe and report.
    pub fn validate(&self) -> Result<&str, ConfigError> {
        self.reporting
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or(ConfigError::MissingEndpoint)
    }

    pub fn validator_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.validator.timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_documented_values() {
        let c = Config::default();
        assert_eq!(c.model, "gpt-4.1-mini");
        assert_eq!(c.max_steps, 20);
        assert_eq!(c.max_remediation_cycles, 5);
        assert_eq!(c.router.mode, RouterMode::Classifier);
        assert_eq!(c.validator.program, "conftest");
        assert_eq!(c.validator.args, vec!["test".to_string()]);
        assert_eq!(c.retriever.chunk_size, 1000);
        assert_eq!(c.retriever.chunk_overlap, 200);
        assert_eq!(c.retriever.batch_size, 100);
        assert_eq!(c.github.base_branch, "main");
        assert_eq!(c.policies.len(), 3);
        assert!(c.reporting.endpoint.is_none());
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            r#"
model = "gpt-4.1"
max_steps = 12

[router]
mode = "keyword"

[reporting]
endpoint = "http://localhost:8080"

[[policies]]
pattern = "*.yaml"
policy = "policy/k8s.rego"
"#,
        )
        .unwrap();

        let c = Config::from_file(&path).unwrap();
        assert_eq!(c.model, "gpt-4.1");
        assert_eq!(c.max_steps, 12);
        assert_eq!(c.router.mode, RouterMode::Keyword);
        assert_eq!(c.router.failure_markers, vec![FAILURE_MARKER.to_string()]);
        assert_eq!(c.validator.timeout_secs, 60);
        assert_eq!(c.policies.len(), 1);
        assert_eq!(c.policies[0].contains, None);
        assert_eq!(c.config_path.as_deref(), Some(path.as_path()));
        assert_eq!(c.validate().unwrap(), "http://localhost:8080");
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let err = Config::load(Some(&tmp.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "max_steps = \"many\"").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn overrides_replace_values_and_skip_empty() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("CONFWARDEN_ENDPOINT", "http://hub:9000"),
            ("OPENAI_API_KEY", "sk-env"),
            ("GITHUB_TOKEN", "  "),
            ("CONFWARDEN_MODEL", "gpt-4o"),
            ("CONFWARDEN_SCRATCH_DIR", "/var/tmp/warden"),
        ]);
        let mut c = Config::default();
        c.github.token = Some("from-file".into());
        c.apply_overrides_from(|key| env.get(key).map(ToString::to_string));

        assert_eq!(c.reporting.endpoint.as_deref(), Some("http://hub:9000"));
        assert_eq!(c.api_key.as_deref(), Some("sk-env"));
        assert_eq!(c.github.token.as_deref(), Some("from-file"));
        assert_eq!(c.model, "gpt-4o");
        assert_eq!(c.scratch_dir, PathBuf::from("/var/tmp/warden"));
    }

    #[test]
    fn missing_or_blank_endpoint_fails_validation() {
        let mut c = Config::default();
        assert!(matches!(c.validate(), Err(ConfigError::MissingEndpoint)));
        c.reporting.endpoint = Some("   ".into());
        assert!(matches!(c.validate(), Err(ConfigError::MissingEndpoint)));
    }

    #[test]
    fn structural_checks_reject_bad_values() {
        let mut c = Config::default();
        c.max_steps = 0;
        assert!(matches!(c.check(), Err(ConfigError::Validation(_))));

        let mut c = Config::default();
        c.retriever.chunk_overlap = c.retriever.chunk_size;
        assert!(matches!(c.check(), Err(ConfigError::Validation(_))));

        let mut c = Config::default();
        c.temperature = 3.0;
        assert!(matches!(c.check(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn malformed_globs_are_rejected_at_load() {
        let mut c = Config::default();
        c.policies = vec![PolicyRule::new("app[.json", None, "policy/app.rego")];
        assert!(matches!(c.check(), Err(ConfigError::Validation(ref msg)) if msg.starts_with("policies:")));

        let mut c = Config::default();
        c.watch.allowed_paths = vec!["infra/{main.tf".to_string()];
        assert!(matches!(c.check(), Err(ConfigError::Validation(ref msg)) if msg.starts_with("watch.allowed_paths:")));

        assert!(Config::default().check().is_ok());
    }

    #[test]
    fn tilde_paths_are_expanded() {
        let mut c = Config::default();
        c.scratch_dir = PathBuf::from("~/warden-scratch");
        c.expand_paths();
        assert!(!c.scratch_dir.to_string_lossy().starts_with('~'));
        assert!(c.scratch_dir.ends_with("warden-scratch"));
    }
}
