//! Configuration loading for JARVIS.
//! Reads jarvis.toml from the current directory or the path in JARVIS_CONFIG.
//! Every key has a default, so running without a file is supported.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use jarvis_llm::{BackendConfig, BackendKind, Normalizer, Persona};
use jarvis_serial::BridgeSettings;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub persona: PersonaConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub local: LocalConfig,
    #[serde(default)]
    pub toolchain: ToolchainConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_response_cap")]
    pub response_cap: usize,
    #[serde(default = "default_poll_slice_ms")]
    pub poll_slice_ms: u64,
    #[serde(default = "default_read_chunk")]
    pub read_chunk: usize,
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    #[serde(default)]
    pub ascii_only: bool,
    #[serde(default)]
    pub ellipsis: bool,
}

fn default_response_cap()    -> usize { jarvis_llm::DEFAULT_RESPONSE_CAP }
fn default_poll_slice_ms()   -> u64   { 1000 }
fn default_read_chunk()      -> usize { 256 }
fn default_max_frame_bytes() -> usize { 4096 }

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            response_cap:    default_response_cap(),
            poll_slice_ms:   default_poll_slice_ms(),
            read_chunk:      default_read_chunk(),
            max_frame_bytes: default_max_frame_bytes(),
            ascii_only:      false,
            ellipsis:        false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    #[serde(default = "default_persona_name")]
    pub name: String,
    #[serde(default = "default_persona_role")]
    pub role: String,
    #[serde(default = "default_persona_context")]
    pub context: String,
    #[serde(default = "default_bridge_hint")]
    pub bridge_hint: String,
}

fn default_persona_name()    -> String { Persona::default().name }
fn default_persona_role()    -> String { Persona::default().role }
fn default_persona_context() -> String { Persona::default().context }
fn default_bridge_hint()     -> String { jarvis_serial::bridge::BRIDGE_HINT.to_string() }

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            name:        default_persona_name(),
            role:        default_persona_role(),
            context:     default_persona_context(),
            bridge_hint: default_bridge_hint(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_remote_program")]
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_remote_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_rate_limit_markers")]
    pub rate_limit_markers: Vec<String>,
}

fn bool_true()                  -> bool   { true }
fn default_remote_program()     -> String { "claude".to_string() }
fn default_remote_timeout()     -> u64    { 60 }
fn default_rate_limit_markers() -> Vec<String> {
    jarvis_llm::backend::DEFAULT_RATE_LIMIT_MARKERS.iter().map(|m| m.to_string()).collect()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled:            true,
            program:            default_remote_program(),
            args:               Vec::new(),
            timeout_secs:       default_remote_timeout(),
            rate_limit_markers: default_rate_limit_markers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_local_url")]
    pub url: String,
    #[serde(default = "default_local_model")]
    pub model: String,
    #[serde(default = "default_local_timeout")]
    pub timeout_secs: u64,
}

fn default_local_url()     -> String { jarvis_llm::backend::DEFAULT_OLLAMA_URL.to_string() }
fn default_local_model()   -> String { jarvis_llm::backend::DEFAULT_OLLAMA_MODEL.to_string() }
fn default_local_timeout() -> u64    { 30 }

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            enabled:      true,
            url:          default_local_url(),
            model:        default_local_model(),
            timeout_secs: default_local_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolchainConfig {
    /// Directory generated sources are saved under.
    #[serde(default = "default_toolchain_root")]
    pub root: PathBuf,
    /// Assembler executable, relative to `root` unless absolute.
    #[serde(default = "default_assembler")]
    pub assembler: PathBuf,
}

fn default_toolchain_root() -> PathBuf { PathBuf::from(".") }
fn default_assembler()      -> PathBuf { PathBuf::from("bootstrap/masm") }

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self { root: default_toolchain_root(), assembler: default_assembler() }
    }
}


impl Config {
    /// Load configuration from jarvis.toml.
    /// Checks JARVIS_CONFIG first, then the current directory. A missing
    /// default file yields the built-in defaults; a missing file named by
    /// JARVIS_CONFIG is an error.
    pub fn load() -> anyhow::Result<Self> {
        let explicit = std::env::var("JARVIS_CONFIG").ok();
        let path = explicit.clone().unwrap_or_else(|| "jarvis.toml".to_string());

        let mut config = if Path::new(&path).exists() {
            let content = std::fs::read_to_string(&path)?;
            Self::from_toml_str(&content)
                .map_err(|e| anyhow::anyhow!("Invalid config file {}: {}", path, e))?
        } else if explicit.is_some() {
            anyhow::bail!("Config file not found: {}", path);
        } else {
            tracing::info!("No jarvis.toml found, using built-in defaults");
            Config::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Apply `JARVIS_*` overrides obtained through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(program) = lookup("JARVIS_REMOTE_BIN").filter(|v| !v.is_empty()) {
            self.remote.program = program;
        }
        if let Some(url) = lookup("JARVIS_OLLAMA_URL").filter(|v| !v.is_empty()) {
            self.local.url = url;
        }
        if let Some(model) = lookup("JARVIS_OLLAMA_MODEL").filter(|v| !v.is_empty()) {
            self.local.model = model;
        }
    }

    pub fn persona(&self) -> Persona {
        Persona {
            name:    self.persona.name.clone(),
            role:    self.persona.role.clone(),
            context: self.persona.context.clone(),
        }
    }

    /// Routing chain in priority order: remote CLI, then local service.
    pub fn backends(&self) -> Vec<BackendConfig> {
        let mut backends = Vec::new();
        if self.remote.enabled {
            backends.push(BackendConfig {
                kind: BackendKind::RemoteCli {
                    program:            self.remote.program.clone(),
                    args:               self.remote.args.clone(),
                    rate_limit_markers: self.remote.rate_limit_markers.clone(),
                },
                timeout: Duration::from_secs(self.remote.timeout_secs),
            });
        }
        if self.local.enabled {
            backends.push(BackendConfig {
                kind: BackendKind::Ollama {
                    url:   self.local.url.clone(),
                    model: self.local.model.clone(),
                },
                timeout: Duration::from_secs(self.local.timeout_secs),
            });
        }
        backends
    }

    pub fn bridge_settings(&self) -> BridgeSettings {
        let hint = self.persona.bridge_hint.trim();
        BridgeSettings {
            poll_slice: Duration::from_millis(self.bridge.poll_slice_ms.max(1)),
            normalizer: Normalizer::new(self.bridge.response_cap)
                .ascii_only(self.bridge.ascii_only)
                .ellipsis(self.bridge.ellipsis),
            hint: if hint.is_empty() { None } else { Some(hint.to_string()) },
        }
    }

    pub fn assembler_path(&self) -> PathBuf {
        if self.toolchain.assembler.is_absolute() {
            self.toolchain.assembler.clone()
        } else {
            self.toolchain.root.join(&self.toolchain.assembler)
        }
    }
}
