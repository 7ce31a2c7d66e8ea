// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Guard Configuration Types
//!
//! Defines the configuration schema consumed read-only by the pack pipeline:
//! - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
//! - Policy mode and host whitelist
//! - Notification verbosity
//! - Cache isolation, cache clearing, extraction and audit switches
//! - Fingerprint detection limits
//! - Download timeouts and cached-pack polling

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::domain::decision::PolicyMode;
use crate::domain::host::HostInfo;
use crate::domain::notification::ToastLevel;

pub const API_VERSION: &str = "packguard.dev/v1";
pub const KIND: &str = "PackGuardConfig";

/// Directory under the root that receives sandboxed packs.
pub const SANDBOX_DIR_NAME: &str = "sandbox-packs";
pub const AUDIT_LOG_FILE_NAME: &str = "packguard-audit.log";
/// Engine-managed server pack cache under the resource-packs directory.
pub const SERVER_CACHE_DIR_NAME: &str = "server";

/// Top-level Kubernetes-style configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfigManifest {
    /// API version (must be "packguard.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "PackGuardConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: GuardConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable profile name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Pack pipeline configuration (content under spec:)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardConfig {
    /// How non-whitelisted pack requests are handled
    #[serde(default)]
    pub policy: PolicyMode,

    /// Hosts always allowed (matched case-insensitively against host or host:port)
    #[serde(default)]
    pub whitelist: Vec<String>,

    /// Minimum level a toast needs to be queued
    #[serde(default)]
    pub toast_level: ToastLevel,

    /// Namespace the engine's download cache by account and process salt
    #[serde(default = "default_true")]
    pub cache_isolation: bool,

    /// Clear `<resourcepacks>/server/` when the pipeline starts
    #[serde(default)]
    pub clear_cache_on_start: bool,

    /// Unpack archives after a successful sandbox download
    #[serde(default)]
    pub extract_after_sandbox: bool,

    /// Append decisions and sandbox operations to the audit log
    #[serde(default = "default_true")]
    pub audit_log: bool,

    /// Requests per window from one origin that raise a fingerprint alert (0 disables)
    #[serde(default = "default_fingerprint_threshold")]
    pub fingerprint_threshold: usize,

    /// Fingerprint sliding window in milliseconds
    #[serde(default = "default_fingerprint_window_ms")]
    pub fingerprint_window_ms: u64,

    /// Also send fingerprint alerts to the local chat
    #[serde(default = "default_true")]
    pub fingerprint_chat_alert: bool,

    /// Root for sandbox packs and the audit log
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// The engine's resource-packs directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resourcepacks_dir: Option<PathBuf>,

    #[serde(default)]
    pub download: DownloadConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Total request timeout including body transfer
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Interval between checks of the vanilla download target
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Give up waiting for the vanilla download after this long
    #[serde(default = "default_poll_deadline_ms")]
    pub poll_deadline_ms: u64,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_fingerprint_threshold() -> usize {
    3
}

fn default_fingerprint_window_ms() -> u64 {
    10_000
}

fn default_root_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("packguard"))
        .unwrap_or_else(|| PathBuf::from("./packguard"))
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

fn default_max_redirects() -> usize {
    5
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_poll_deadline_ms() -> u64 {
    30_000
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            max_redirects: default_max_redirects(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_deadline_ms: default_poll_deadline_ms(),
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            policy: PolicyMode::default(),
            whitelist: vec![],
            toast_level: ToastLevel::default(),
            cache_isolation: true,
            clear_cache_on_start: false,
            extract_after_sandbox: false,
            audit_log: true,
            fingerprint_threshold: default_fingerprint_threshold(),
            fingerprint_window_ms: default_fingerprint_window_ms(),
            fingerprint_chat_alert: true,
            root_dir: default_root_dir(),
            resourcepacks_dir: None,
            download: DownloadConfig::default(),
        }
    }
}

impl GuardConfig {
    pub fn sandbox_dir(&self) -> PathBuf {
        self.root_dir.join(SANDBOX_DIR_NAME)
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.root_dir.join(AUDIT_LOG_FILE_NAME)
    }

    pub fn server_cache_dir(&self) -> Option<PathBuf> {
        self.resourcepacks_dir
            .as_ref()
            .map(|dir| dir.join(SERVER_CACHE_DIR_NAME))
    }

    /// Check the values a manifest cannot express through types alone.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.fingerprint_threshold > 0 && self.fingerprint_window_ms == 0 {
            anyhow::bail!("spec.fingerprint_window_ms must be positive when fingerprinting is enabled");
        }

        if self.whitelist.iter().any(|entry| entry.trim().is_empty()) {
            anyhow::bail!("spec.whitelist cannot contain empty entries");
        }

        let download = &self.download;
        if download.connect_timeout_ms == 0 || download.request_timeout_ms == 0 {
            anyhow::bail!("spec.download timeouts must be positive");
        }
        if download.poll_interval_ms == 0 {
            anyhow::bail!("spec.download.poll_interval_ms must be positive");
        }
        if download.poll_deadline_ms < download.poll_interval_ms {
            anyhow::bail!("spec.download.poll_deadline_ms must be at least poll_interval_ms");
        }

        Ok(())
    }

    /// Whitelist match on the canonical or raw host, case-insensitive.
    pub fn is_whitelisted(&self, host: &HostInfo) -> bool {
        self.whitelist.iter().map(|entry| entry.trim()).any(|entry| {
            !entry.is_empty()
                && (entry.eq_ignore_ascii_case(&host.canonical)
                    || entry.eq_ignore_ascii_case(&host.host))
        })
    }
}

impl Default for GuardConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "packguard".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: GuardConfig::default(),
        }
    }
}

impl GuardConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. PACKGUARD_CONFIG_PATH environment variable
    /// 2. ./packguard-config.yaml (working directory)
    /// 3. ~/.packguard/config.yaml (user home)
    /// 4. /etc/packguard/config.yaml (system, Unix) or C:\ProgramData\PackGuard\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("PACKGUARD_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./packguard-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".packguard").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/packguard/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\PackGuard\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path: fail if missing or invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("PACKGUARD_POLICY") {
            match val.parse::<PolicyMode>() {
                Ok(mode) => {
                    tracing::info!("Environment override: PACKGUARD_POLICY={:?}", mode);
                    self.spec.policy = mode;
                }
                Err(e) => tracing::warn!("Invalid value for PACKGUARD_POLICY: {}. Ignoring.", e),
            }
        }

        if let Some(enabled) = env_flag("PACKGUARD_AUDIT_LOG") {
            self.spec.audit_log = enabled;
        }

        if let Some(enabled) = env_flag("PACKGUARD_CACHE_ISOLATION") {
            self.spec.cache_isolation = enabled;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        self.spec.validate()
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => {
            tracing::info!("Environment override: {}=true", name);
            Some(true)
        }
        "false" | "0" | "no" | "off" => {
            tracing::info!("Environment override: {}=false", name);
            Some(false)
        }
        _ => {
            tracing::warn!(
                "Invalid value for {}: '{}'. Expected true/false. Ignoring.",
                name,
                val
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let manifest = GuardConfigManifest::default();
        assert_eq!(manifest.api_version, API_VERSION);
        assert_eq!(manifest.kind, KIND);
        assert!(!manifest.metadata.name.is_empty());
        assert_eq!(manifest.spec.policy, PolicyMode::Observe);
        assert!(manifest.spec.cache_isolation);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let yaml = r#"
apiVersion: packguard.dev/v1
kind: PackGuardConfig
metadata:
  name: survival-profile
spec:
  policy: sandbox_all
  whitelist:
    - Textures.Example.com
  toast_level: warn
  root_dir: /tmp/packguard
"#;
        let manifest = GuardConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.spec.policy, PolicyMode::SandboxAll);
        assert_eq!(manifest.spec.toast_level, ToastLevel::Warn);
        assert_eq!(manifest.spec.fingerprint_threshold, 3);
        assert_eq!(manifest.spec.download.poll_interval_ms, 500);
        assert_eq!(
            manifest.spec.sandbox_dir(),
            PathBuf::from("/tmp/packguard/sandbox-packs")
        );
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let mut manifest = GuardConfigManifest::default();
        manifest.spec.policy = PolicyMode::BlockLocal;
        manifest.spec.resourcepacks_dir = Some(PathBuf::from("/games/rp"));

        let yaml = serde_yaml::to_string(&manifest).unwrap();
        let parsed = GuardConfigManifest::from_yaml_str(&yaml).unwrap();
        assert_eq!(parsed.spec, manifest.spec);
        assert_eq!(
            parsed.spec.server_cache_dir(),
            Some(PathBuf::from("/games/rp/server"))
        );
    }

    #[test]
    fn test_whitelist_matching() {
        let config = GuardConfig {
            whitelist: vec!["Textures.Example.com".to_string(), "pack.host:8080".to_string()],
            ..GuardConfig::default()
        };

        let host = HostInfo {
            host: "textures.example.com".to_string(),
            canonical: "textures.example.com:9000".to_string(),
            ..HostInfo::default()
        };
        assert!(config.is_whitelisted(&host));

        let host = HostInfo {
            host: "pack.host".to_string(),
            canonical: "pack.host:8080".to_string(),
            ..HostInfo::default()
        };
        assert!(config.is_whitelisted(&host));

        let host = HostInfo {
            host: "pack.host".to_string(),
            canonical: "pack.host:9090".to_string(),
            ..HostInfo::default()
        };
        assert!(!config.is_whitelisted(&host));
    }

    #[test]
    fn test_validation() {
        let mut manifest = GuardConfigManifest::default();
        assert!(manifest.validate().is_ok());

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.kind = "WrongKind".to_string();
        assert!(manifest.validate().is_err());
        manifest.kind = KIND.to_string();

        manifest.spec.fingerprint_window_ms = 0;
        assert!(manifest.validate().is_err());
        manifest.spec.fingerprint_window_ms = 1000;

        manifest.spec.whitelist = vec!["  ".to_string()];
        assert!(manifest.validate().is_err());
        manifest.spec.whitelist.clear();

        manifest.spec.download.poll_deadline_ms = 10;
        assert!(manifest.validate().is_err());
    }
}
