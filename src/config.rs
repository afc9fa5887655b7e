use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Provider endpoint used when `api_url` is left blank.
pub const DEFAULT_API_URL: &str = "https://api.deepseek.com/chat/completions";

/// Key under which the settings record is stored in the key-value file.
pub const SETTINGS_KEY: &str = "translatorSettings";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModelPreset {
    #[default]
    #[serde(rename = "deepseek-chat", alias = "model-a")]
    Chat,
    #[serde(rename = "deepseek-reasoner", alias = "model-b")]
    Reasoner,
}

impl ModelPreset {
    pub const ALL: [ModelPreset; 2] = [ModelPreset::Chat, ModelPreset::Reasoner];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelPreset::Chat => "deepseek-chat",
            ModelPreset::Reasoner => "deepseek-reasoner",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "model-a" => Some(ModelPreset::Chat),
            "model-b" => Some(ModelPreset::Reasoner),
            n => Self::ALL.into_iter().find(|m| m.as_str() == n),
        }
    }
}

/// An unknown model name falls back to the default preset instead of failing
/// the whole record, so the stored key and URL survive.
fn lenient_model<'de, D>(deserializer: D) -> Result<ModelPreset, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value.as_str().and_then(ModelPreset::parse) {
        Some(m) => Ok(m),
        None => {
            log::warn!("unknown model {}, using {}", value, ModelPreset::default().as_str());
            Ok(ModelPreset::default())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub enabled: bool,
    pub api_url: String,
    pub api_key: String,
    #[serde(deserialize_with = "lenient_model")]
    pub model: ModelPreset,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: DEFAULT_API_URL.to_string(),
            api_key: String::new(),
            model: ModelPreset::default(),
        }
    }
}

impl Settings {
    /// Form-level check before a submit; the relay does its own key check.
    pub fn validate(&self) -> Result<(), String> {
        if self.api_url.trim().is_empty() {
            return Err("请输入API地址".to_string());
        }
        if self.api_key.trim().is_empty() {
            return Err("请输入API密钥".to_string());
        }
        Ok(())
    }

    pub fn endpoint(&self) -> &str {
        let url = self.api_url.trim();
        if url.is_empty() {
            DEFAULT_API_URL
        } else {
            url
        }
    }
}

/// Last-write-wins settings record persisted in a JSON key-value file.
pub struct SettingsStore {
    path: PathBuf,
    current: Mutex<Settings>,
    subscribers: Mutex<Vec<Sender<Settings>>>,
}

impl SettingsStore {
    pub fn default_path() -> PathBuf {
        crate::logger::exe_dir().join("settings.json")
    }

    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = match read_record(&path) {
            Ok(Some(s)) => s,
            Ok(None) => {
                let s = Settings::default();
                if let Err(e) = write_record(&path, &s) {
                    log::warn!("could not create {}: {:#}", path.display(), e);
                }
                s
            }
            Err(e) => {
                log::warn!("settings unreadable, using defaults: {:#}", e);
                Settings::default()
            }
        };
        log::info!("settings loaded from {}", path.display());
        Self { path, current: Mutex::new(current), subscribers: Mutex::new(Vec::new()) }
    }

    /// Applies `SELTRANS_API_KEY`, `SELTRANS_API_URL` and `SELTRANS_MODEL` to
    /// the in-memory record only.
    pub fn with_env_overrides(self) -> Self {
        {
            let mut cur = self.lock_current();
            if let Ok(v) = std::env::var("SELTRANS_API_KEY") {
                if !v.is_empty() {
                    cur.api_key = v;
                }
            }
            if let Ok(v) = std::env::var("SELTRANS_API_URL") {
                if !v.is_empty() {
                    cur.api_url = v;
                }
            }
            if let Ok(v) = std::env::var("SELTRANS_MODEL") {
                match ModelPreset::parse(&v) {
                    Some(m) => cur.model = m,
                    None => log::warn!("ignoring unknown SELTRANS_MODEL {:?}", v),
                }
            }
        }
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> Settings {
        self.lock_current().clone()
    }

    /// Replaces the whole record, persists it and notifies subscribers before
    /// returning.
    pub fn set(&self, settings: Settings) -> Result<()> {
        write_record(&self.path, &settings)?;
        *self.lock_current() = settings.clone();
        let mut subs = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subs.retain(|tx| tx.send(settings.clone()).is_ok());
        log::info!("settings saved (enabled={}, model={})", settings.enabled, settings.model.as_str());
        Ok(())
    }

    pub fn subscribe(&self) -> Receiver<Settings> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner()).push(tx);
        rx
    }

    fn lock_current(&self) -> std::sync::MutexGuard<'_, Settings> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn read_store(path: &Path) -> Result<Option<serde_json::Map<String, serde_json::Value>>> {
    let s = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };
    let map = serde_json::from_str(&s).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(map))
}

fn read_record(path: &Path) -> Result<Option<Settings>> {
    let Some(map) = read_store(path)? else { return Ok(None) };
    match map.get(SETTINGS_KEY) {
        Some(v) => Ok(Some(serde_json::from_value(v.clone()).context("decoding settings record")?)),
        None => Ok(None),
    }
}

fn write_record(path: &Path, settings: &Settings) -> Result<()> {
    // Keep whatever else lives in the store; a corrupt file is replaced.
    let mut map = read_store(path).ok().flatten().unwrap_or_default();
    map.insert(SETTINGS_KEY.to_string(), serde_json::to_value(settings)?);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    let s = serde_json::to_string_pretty(&map)?;
    fs::write(path, s).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
