use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{env, fs, path::PathBuf, sync::RwLock};

use crate::{blocking::BlockSelection, reward::RewardPolicyKind};

pub const DEFAULT_VERIFICATION_PATH: &str = "/verify-progress";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
const PLACEHOLDER_MARKER: &str = "YOUR-CLOUD-RUN-URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationSettings {
    pub base_url: Option<String>,
    pub path: String,
    pub timeout_secs: u64,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            path: DEFAULT_VERIFICATION_PATH.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl VerificationSettings {
    pub fn is_configured(&self) -> bool {
        self.base_url
            .as_deref()
            .map(|url| !url.trim().is_empty() && !url.contains(PLACEHOLDER_MARKER))
            .unwrap_or(false)
    }

    /// Full endpoint URL, or `None` while unconfigured.
    pub fn endpoint(&self) -> Option<String> {
        if !self.is_configured() {
            return None;
        }
        let base = self.base_url.as_deref()?.trim().trim_end_matches('/');
        if self.path.is_empty() {
            Some(base.to_string())
        } else if self.path.starts_with('/') {
            Some(format!("{base}{}", self.path))
        } else {
            Some(format!("{base}/{}", self.path))
        }
    }

    pub fn configuration_status(&self) -> String {
        match self.endpoint() {
            Some(endpoint) => format!("verification API configured: {endpoint}"),
            None => "verification API not configured; set verification.base_url".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub verification: VerificationSettings,
    /// When true the main countdown stops while reviewing evidence or on a
    /// break and its end time is pushed back on return to focusing.
    pub pause_main_timer_during_break: bool,
    pub reward_policy: RewardPolicyKind,
    pub block_selection: BlockSelection,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            verification: VerificationSettings::default(),
            pause_main_timer_during_break: false,
            reward_policy: RewardPolicyKind::Tiered,
            block_selection: BlockSelection::default(),
        }
    }
}

impl Settings {
    /// Environment variables win over the file.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = env::var("FOCUSGATE_VERIFY_URL") {
            if !url.trim().is_empty() {
                self.verification.base_url = Some(url);
            }
        }
        if let Some(secs) = env::var("FOCUSGATE_TIMEOUT_SECS")
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
        {
            self.verification.timeout_secs = secs;
        }
        self
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Settings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!("Ignoring unreadable settings at {}: {err}", path.display());
                Settings::default()
            })
        } else {
            Settings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn settings(&self) -> Settings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update(&self, settings: Settings) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    fn persist(&self, data: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
