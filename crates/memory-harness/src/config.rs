//! Configuration loading and validation.
//!
//! `mem` reads an optional TOML file (default `~/.claude/memory/mem.toml`).
//! Every section and field has a built-in default, so a missing file or an
//! empty one yields a working keyword-only setup.
//!
//! # Example
//!
//! ```toml
//! [memory]
//! global_root = "~/.claude/memory"
//! project_root = ".claude/memory"
//!
//! [vector]
//! url = "postgresql://localhost/memory"   # or "sqlite:/path/vectors.db"
//!
//! [embedding]
//! provider = "openai"          # openai | ollama | disabled
//! model = "text-embedding-3-small"   # ollama default: nomic-embed-text
//! dims = 1536                        # ollama default: 768
//!
//! [retrieval]
//! vector_weight = 0.7
//! keyword_weight = 0.3
//! limit = 8
//!
//! [context]
//! budget = 2000
//! p0_policy = "cap_only"      # cap_only | budget_bounded
//! ```
//!
//! The `DATABASE_URL` environment variable overrides `[vector] url`.

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use memory_harness_core::budget::{
    default_priorities, BudgetParams, P0Policy, PriorityEntry, DEFAULT_BUDGET, DEFAULT_FLOOR,
};
use memory_harness_core::chunk::{ChunkParams, DEFAULT_OVERLAP, DEFAULT_WINDOW};
use memory_harness_core::models::Tier;
use memory_harness_core::rank::{HybridWeights, DEFAULT_KEYWORD_WEIGHT, DEFAULT_VECTOR_WEIGHT};

/// File name of the keyword index, created inside the project root.
pub const KEYWORD_DB_FILE: &str = ".memory-search.db";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub keyword: KeywordConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub context: ContextConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MemoryConfig {
    #[serde(default = "default_global_root")]
    pub global_root: PathBuf,
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            global_root: default_global_root(),
            project_root: default_project_root(),
            include_globs: default_include_globs(),
        }
    }
}

fn default_global_root() -> PathBuf {
    home_dir().join(".claude").join("memory")
}
fn default_project_root() -> PathBuf {
    PathBuf::from(".claude").join("memory")
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string()]
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct KeywordConfig {
    /// Defaults to `<project_root>/.memory-search.db`.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorConfig {
    /// `postgres://…`, `postgresql://…` or `sqlite:…`. Unset means no
    /// vector index.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            url: None,
            table: default_table(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_table() -> String {
    "memory_embeddings".to_string()
}
fn default_connect_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

fn default_window() -> usize {
    DEFAULT_WINDOW
}
fn default_overlap() -> usize {
    DEFAULT_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Unset means the provider's default model.
    #[serde(default)]
    pub model: Option<String>,
    /// Unset means the default model's width; required for any other model.
    #[serde(default)]
    pub dims: Option<usize>,
    /// Override for the provider endpoint (Ollama server, OpenAI proxy).
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            base_url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

/// Default model and its width per provider.
fn provider_default(provider: &str) -> Option<(&'static str, usize)> {
    match provider {
        "openai" => Some(("text-embedding-3-small", 1536)),
        "ollama" => Some(("nomic-embed-text", 768)),
        _ => None,
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// Configured model, else the provider default.
    pub fn resolved_model(&self) -> Option<String> {
        self.model
            .clone()
            .or_else(|| provider_default(&self.provider).map(|(m, _)| m.to_string()))
    }

    /// Configured dims, else the default model's dims when that model is in use.
    pub fn resolved_dims(&self) -> Option<usize> {
        if self.dims.is_some() {
            return self.dims;
        }
        let (model, dims) = provider_default(&self.provider)?;
        match self.model.as_deref() {
            None => Some(dims),
            Some(m) if m == model => Some(dims),
            Some(_) => None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Each backend is asked for `overfetch × limit` candidates.
    #[serde(default = "default_overfetch")]
    pub overfetch: usize,
    /// Upper bound on embed + vector query for one search.
    #[serde(default = "default_vector_timeout_ms")]
    pub vector_timeout_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_weight: DEFAULT_VECTOR_WEIGHT,
            keyword_weight: DEFAULT_KEYWORD_WEIGHT,
            limit: default_limit(),
            overfetch: default_overfetch(),
            vector_timeout_ms: default_vector_timeout_ms(),
        }
    }
}

fn default_vector_weight() -> f64 {
    DEFAULT_VECTOR_WEIGHT
}
fn default_keyword_weight() -> f64 {
    DEFAULT_KEYWORD_WEIGHT
}
fn default_limit() -> usize {
    8
}
fn default_overfetch() -> usize {
    2
}
fn default_vector_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContextConfig {
    #[serde(default = "default_budget")]
    pub budget: usize,
    #[serde(default = "default_floor")]
    pub floor: usize,
    #[serde(default)]
    pub p0_policy: P0Policy,
    /// Session logs directory, relative to the project root.
    #[serde(default = "default_sessions_dir")]
    pub sessions_dir: String,
    #[serde(default = "default_priorities")]
    pub priorities: Vec<PriorityEntry>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            budget: DEFAULT_BUDGET,
            floor: DEFAULT_FLOOR,
            p0_policy: P0Policy::default(),
            sessions_dir: default_sessions_dir(),
            priorities: default_priorities(),
        }
    }
}

fn default_budget() -> usize {
    DEFAULT_BUDGET
}
fn default_floor() -> usize {
    DEFAULT_FLOOR
}
fn default_sessions_dir() -> String {
    "sessions".to_string()
}

impl ContextConfig {
    pub fn budget_params(&self, budget: Option<usize>) -> BudgetParams {
        BudgetParams {
            budget: budget.unwrap_or(self.budget),
            floor: self.floor,
            p0_policy: self.p0_policy,
        }
    }
}

impl Config {
    pub fn chunk_params(&self) -> Result<ChunkParams> {
        Ok(ChunkParams::new(self.chunking.window, self.chunking.overlap)?)
    }

    pub fn weights(&self) -> Result<HybridWeights> {
        Ok(HybridWeights::new(
            self.retrieval.vector_weight,
            self.retrieval.keyword_weight,
        )?)
    }

    pub fn keyword_db_path(&self) -> PathBuf {
        self.keyword
            .db_path
            .clone()
            .unwrap_or_else(|| self.memory.project_root.join(KEYWORD_DB_FILE))
    }

    /// Scan roots in visiting order: global first.
    pub fn roots(&self) -> Vec<(Tier, PathBuf)> {
        vec![
            (Tier::Global, self.memory.global_root.clone()),
            (Tier::Project, self.memory.project_root.clone()),
        ]
    }

    /// Apply environment overrides (`DATABASE_URL`).
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.trim().is_empty() {
                self.vector.url = Some(url);
            }
        }
    }

    /// Expand `~/` and make relative roots absolute against the working
    /// directory.
    pub fn resolve_paths(&mut self) -> Result<()> {
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        self.memory.global_root = absolutize(&expand_home(&self.memory.global_root), &cwd);
        self.memory.project_root = absolutize(&expand_home(&self.memory.project_root), &cwd);
        if let Some(p) = &self.keyword.db_path {
            self.keyword.db_path = Some(absolutize(&expand_home(p), &cwd));
        }
        Ok(())
    }

    /// Check every setting that could only fail later at runtime.
    pub fn validate(&self) -> Result<()> {
        self.chunk_params()?;
        self.weights()?;

        if self.retrieval.limit < 1 {
            bail!("retrieval.limit must be >= 1");
        }
        if self.retrieval.overfetch < 1 {
            bail!("retrieval.overfetch must be >= 1");
        }
        if self.retrieval.vector_timeout_ms == 0 {
            bail!("retrieval.vector_timeout_ms must be > 0");
        }
        if self.memory.include_globs.is_empty() {
            bail!("memory.include_globs must not be empty");
        }

        let ident = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")?;
        if !ident.is_match(&self.vector.table) {
            bail!(
                "vector.table must be a plain SQL identifier, got '{}'",
                self.vector.table
            );
        }
        if let Some(url) = &self.vector.url {
            if crate::vector::VectorBackendKind::from_url(url).is_none() {
                bail!(
                    "vector.url must start with postgres://, postgresql:// or sqlite:, got '{}'",
                    redact_url(url)
                );
            }
        }

        match self.embedding.provider.as_str() {
            "disabled" | "openai" | "ollama" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
                other
            ),
        }
        if self.embedding.is_enabled() {
            if self.embedding.resolved_dims().unwrap_or(0) == 0 {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.resolved_model().is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.batch_size == 0 {
                bail!("embedding.batch_size must be > 0");
            }
        }

        if self.context.floor >= self.context.budget {
            bail!(
                "context.floor ({}) must be smaller than context.budget ({})",
                self.context.floor,
                self.context.budget
            );
        }
        if self.context.priorities.is_empty() {
            bail!("context.priorities must not be empty");
        }

        Ok(())
    }
}

/// Default config location: `~/.claude/memory/mem.toml`.
pub fn default_config_path() -> PathBuf {
    default_global_root().join("mem.toml")
}

/// Load configuration from `path`.
///
/// A missing file yields the built-in defaults. Environment overrides are
/// applied, paths resolved, and the result validated.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config: Config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };

    config.apply_env();
    config.resolve_paths()?;
    config.validate()?;
    Ok(config)
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home_dir().join(rest),
        Err(_) => path.to_path_buf(),
    }
}

fn absolutize(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

/// Hide the password in a connection URL for display.
pub fn redact_url(url: &str) -> String {
    let Ok(re) = Regex::new(r"://([^:/@]+):([^@]+)@") else {
        return url.to_string();
    };
    re.replace(url, "://$1:***@").to_string()
}
