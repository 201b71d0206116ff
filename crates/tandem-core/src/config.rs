//! Configuration management for tandem.
//!
//! Configuration is loaded from multiple sources and merged:
//! 1. Global config: `~/.config/tandem/config.json`
//! 2. Project config: `tandem.json` or `tandem.jsonc` in the working directory
//! 3. Environment overrides: `TANDEM_PROVIDER`, `TANDEM_MODEL`, `TANDEM_SESSION_DIR`
//!
//! Project files may contain `//` and `/* */` comments.

use crate::error::{ConfigError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tandem_backend::{
    BackendKind, BackendRegistry, CodexBackend, FileInliner, GeminiBackend, InlineLimits,
    ProcessInvoker,
};
use tandem_storage::{EvictionPolicy, StoreConfig};
use tracing::debug;

pub const ENV_PROVIDER: &str = "TANDEM_PROVIDER";
pub const ENV_MODEL: &str = "TANDEM_MODEL";
pub const ENV_SESSION_DIR: &str = "TANDEM_SESSION_DIR";

/// Main configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// JSON Schema reference.
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Provider used when a request names none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<BackendKind>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gemini: Option<ProviderConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub codex: Option<ProviderConfig>,

    /// Model Gemini falls back to when the primary quota is exhausted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_model: Option<String>,

    /// Root directory for persisted sessions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_dir: Option<PathBuf>,

    /// Store settings keyed by tool name (`ask`, `brainstorm`, `review`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sessions: Option<HashMap<String, StoreSettings>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline: Option<InlineSettings>,

    /// Ceiling on captured stdout per backend call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_bytes: Option<usize>,
}

/// Per-provider overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Binary name or path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary: Option<String>,

    /// Model used when a request names none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ProviderConfig {
    fn merge(self, other: Self) -> Self {
        Self {
            binary: merge_option(self.binary, other.binary),
            model: merge_option(self.model, other.model),
        }
    }
}

/// Session store overrides for one tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_sessions: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<EvictionPolicy>,
}

/// File-reference inliner budgets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InlineSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_file_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_total_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_dir_entries: Option<usize>,
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Loading order (later sources override earlier):
    /// 1. Global config from `~/.config/tandem/`
    /// 2. Project config from `project_dir`
    /// 3. `TANDEM_*` environment variables
    pub async fn load(project_dir: Option<&Path>) -> CoreResult<(Self, Vec<PathBuf>)> {
        let mut config = Config::default();
        let mut sources = Vec::new();

        if let Some(global_dir) = tandem_util::path::config_dir() {
            for name in &["config.json", "tandem.json", "tandem.jsonc"] {
                let path = global_dir.join(name);
                if path.exists() {
                    config = config.merge(Self::load_file(&path).await?);
                    sources.push(path);
                    break;
                }
            }
        }

        if let Some(dir) = project_dir {
            for name in &["tandem.jsonc", "tandem.json"] {
                let path = dir.join(name);
                if path.exists() {
                    config = config.merge(Self::load_file(&path).await?);
                    sources.push(path);
                    break;
                }
            }
        }

        let config = config.apply_env(|name| std::env::var(name).ok())?;
        debug!(sources = ?sources, "Configuration loaded");
        Ok((config, sources))
    }

    /// Load configuration from a file.
    pub async fn load_file(path: &Path) -> CoreResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse_jsonc(&content, &path.display().to_string())
    }

    /// Apply `TANDEM_*` overrides using `lookup` to read variables.
    ///
    /// `TANDEM_MODEL` applies to whichever provider is the default after
    /// `TANDEM_PROVIDER` has been applied.
    pub fn apply_env<F>(mut self, lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_PROVIDER).filter(|v| !v.trim().is_empty()) {
            let kind = value.parse::<BackendKind>().map_err(|_| ConfigError::InvalidEnv {
                name: ENV_PROVIDER.to_string(),
                value: value.clone(),
            })?;
            self.provider = Some(kind);
        }

        if let Some(model) = lookup(ENV_MODEL).filter(|v| !v.trim().is_empty()) {
            let slot = match self.default_provider() {
                BackendKind::Gemini => &mut self.gemini,
                BackendKind::Codex => &mut self.codex,
            };
            slot.get_or_insert_with(ProviderConfig::default).model = Some(model);
        }

        if let Some(dir) = lookup(ENV_SESSION_DIR).filter(|v| !v.trim().is_empty()) {
            self.session_dir = Some(PathBuf::from(dir));
        }

        Ok(self)
    }

    /// Parse JSONC (JSON with comments).
    fn parse_jsonc(content: &str, source: &str) -> CoreResult<Self> {
        let stripped = Self::strip_comments(content);

        serde_json::from_str(&stripped).map_err(|e| {
            ConfigError::InvalidJson {
                path: source.to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Strip JSON comments, leaving string contents alone.
    fn strip_comments(input: &str) -> String {
        let mut result = String::with_capacity(input.len());
        let mut chars = input.chars().peekable();
        let mut in_string = false;
        let mut escape_next = false;

        while let Some(c) = chars.next() {
            if escape_next {
                result.push(c);
                escape_next = false;
                continue;
            }
            if in_string {
                match c {
                    '\\' => escape_next = true,
                    '"' => in_string = false,
                    _ => {}
                }
                result.push(c);
                continue;
            }
            if c == '"' {
                in_string = true;
                result.push(c);
                continue;
            }

            match (c, chars.peek()) {
                ('/', Some('/')) => {
                    chars.next();
                    for c in chars.by_ref() {
                        if c == '\n' {
                            result.push('\n');
                            break;
                        }
                    }
                }
                ('/', Some('*')) => {
                    chars.next();
                    let mut prev = ' ';
                    for c in chars.by_ref() {
                        if prev == '*' && c == '/' {
                            break;
                        }
                        // Keep line numbers stable for parse errors
                        if c == '\n' {
                            result.push('\n');
                        }
                        prev = c;
                    }
                }
                _ => result.push(c),
            }
        }

        result
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(self, other: Self) -> Self {
        Self {
            schema: merge_option(self.schema, other.schema),
            provider: merge_option(self.provider, other.provider),
            gemini: merge_provider(self.gemini, other.gemini),
            codex: merge_provider(self.codex, other.codex),
            fallback_model: merge_option(self.fallback_model, other.fallback_model),
            session_dir: merge_option(self.session_dir, other.session_dir),
            sessions: merge_hashmap(self.sessions, other.sessions),
            inline: merge_option(self.inline, other.inline),
            max_output_bytes: merge_option(self.max_output_bytes, other.max_output_bytes),
        }
    }

    pub fn default_provider(&self) -> BackendKind {
        self.provider.unwrap_or_default()
    }

    fn provider_config(&self, kind: BackendKind) -> Option<&ProviderConfig> {
        match kind {
            BackendKind::Gemini => self.gemini.as_ref(),
            BackendKind::Codex => self.codex.as_ref(),
        }
    }

    /// Configured default model for `kind`, if any.
    pub fn default_model(&self, kind: BackendKind) -> Option<String> {
        self.provider_config(kind).and_then(|p| p.model.clone())
    }

    /// Root for session storage. `None` when no data directory exists.
    pub fn sessions_root(&self) -> Option<PathBuf> {
        self.session_dir
            .clone()
            .or_else(tandem_util::path::sessions_dir)
    }

    /// Store settings for `tool`, falling back to the defaults.
    pub fn store_config(&self, tool: &str) -> StoreConfig {
        let mut config = StoreConfig::default();
        let Some(settings) = self.sessions.as_ref().and_then(|s| s.get(tool)) else {
            return config;
        };
        if let Some(secs) = settings.ttl_secs {
            config.ttl = Duration::from_secs(secs);
        }
        if let Some(max) = settings.max_sessions {
            config.max_sessions = max;
        }
        if let Some(policy) = settings.policy {
            config.policy = policy;
        }
        config
    }

    pub fn inline_limits(&self) -> InlineLimits {
        let mut limits = InlineLimits::default();
        if let Some(ref inline) = self.inline {
            if let Some(v) = inline.max_file_bytes {
                limits.max_file_bytes = v;
            }
            if let Some(v) = inline.max_total_bytes {
                limits.max_total_bytes = v;
            }
            if let Some(v) = inline.max_dir_entries {
                limits.max_dir_entries = v;
            }
        }
        limits
    }

    /// Build the backend registry described by this configuration.
    pub fn build_registry(&self) -> BackendRegistry {
        let invoker = match self.max_output_bytes {
            Some(limit) => ProcessInvoker::new(limit),
            None => ProcessInvoker::default(),
        };
        let runner = Arc::new(invoker);

        let mut gemini = GeminiBackend::new(runner.clone());
        if let Some(binary) = self.gemini.as_ref().and_then(|p| p.binary.clone()) {
            gemini = gemini.with_binary(binary);
        }
        if let Some(ref model) = self.fallback_model {
            gemini = gemini.with_fallback_model(model.clone());
        }

        let mut codex =
            CodexBackend::new(runner).with_inliner(FileInliner::new(self.inline_limits()));
        if let Some(binary) = self.codex.as_ref().and_then(|p| p.binary.clone()) {
            codex = codex.with_binary(binary);
        }

        let mut registry = BackendRegistry::new(self.default_provider());
        registry.register(Arc::new(gemini));
        registry.register(Arc::new(codex));
        registry
    }
}

/// Merge two Option values.
fn merge_option<T>(base: Option<T>, other: Option<T>) -> Option<T> {
    match (base, other) {
        (_, Some(o)) => Some(o),
        (b, None) => b,
    }
}

fn merge_provider(
    base: Option<ProviderConfig>,
    other: Option<ProviderConfig>,
) -> Option<ProviderConfig> {
    match (base, other) {
        (Some(b), Some(o)) => Some(b.merge(o)),
        (b, None) => b,
        (None, o) => o,
    }
}

/// Merge two HashMaps.
fn merge_hashmap<K: std::hash::Hash + Eq, V>(
    base: Option<HashMap<K, V>>,
    other: Option<HashMap<K, V>>,
) -> Option<HashMap<K, V>> {
    match (base, other) {
        (Some(mut b), Some(o)) => {
            b.extend(o);
            Some(b)
        }
        (b, None) => b,
        (None, o) => o,
    }
}
