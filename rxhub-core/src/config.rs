//! Configuration file management for rxhub.
//!
//! Reads/writes `~/.rxhub/config.yaml` with dispatcher queue sizes and
//! timer periods, recent-entries limits, and logging settings.

use std::path::{Path, PathBuf};

use crate::recent::DEFAULT_MAX_ENTRIES;
use crate::types::{CoreError, Result};

/// Largest accepted queue depth, for either queue.
pub const MAX_QUEUE_CAPACITY: usize = 4096;
/// Largest accepted recent-entries capacity.
pub const MAX_ENTRIES: usize = 1024;
/// Largest accepted table height, in rows.
pub const MAX_VISIBLE_ROWS: usize = 64;

/// Full configuration structure.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config {
    pub dispatcher: DispatcherConfig,
    pub recent: RecentConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatcherConfig {
    /// Cross-core (application) queue depth, in messages.
    pub queue_capacity: usize,
    pub local_queue_capacity: usize,
    pub rtc_tick_ms: u64,
    pub frame_sync_ms: u64,
    /// Seconds without input before the display sleeps. 0 = never.
    pub backlight_timeout_secs: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecentConfig {
    pub max_entries: usize,
    pub visible_rows: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
    pub packet_log: Option<String>,
}

impl Config {
    /// Replace zero sizes with defaults and clamp sizes to their maximums.
    /// Applied on every parse; callers that override fields afterwards
    /// should call it again.
    pub fn normalize(&mut self) {
        let defaults = DispatcherConfig::default();
        let d = &mut self.dispatcher;
        d.queue_capacity = bounded(d.queue_capacity, defaults.queue_capacity, MAX_QUEUE_CAPACITY);
        d.local_queue_capacity = bounded(
            d.local_queue_capacity,
            defaults.local_queue_capacity,
            MAX_QUEUE_CAPACITY,
        );
        let r = &mut self.recent;
        r.max_entries = bounded(r.max_entries, DEFAULT_MAX_ENTRIES, MAX_ENTRIES);
        r.visible_rows = r.visible_rows.min(MAX_VISIBLE_ROWS);
    }
}

/// Zero is unusable for a size and falls back to `default`.
fn bounded(value: usize, default: usize, max: usize) -> usize {
    match value {
        0 => default,
        v => v.min(max),
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig {
            queue_capacity: 64,
            local_queue_capacity: 16,
            rtc_tick_ms: 1000,
            frame_sync_ms: 16,
            backlight_timeout_secs: 0,
        }
    }
}

impl Default for RecentConfig {
    fn default() -> Self {
        RecentConfig {
            max_entries: DEFAULT_MAX_ENTRIES,
            visible_rows: 16,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".into(),
            packet_log: None,
        }
    }
}

/// Get the config directory path (`~/.rxhub/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".rxhub")
}

/// Get the config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.yaml")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load config from `~/.rxhub/config.yaml`.
///
/// Returns default config if the file doesn't exist or can't be read.
pub fn load_config() -> Config {
    load_config_from(&config_file())
}

pub fn load_config_from(path: &Path) -> Config {
    if !path.exists() {
        return Config::default();
    }

    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(_) => return Config::default(),
    };

    parse_config(&text)
}

/// Save config to `~/.rxhub/config.yaml`.
pub fn save_config(config: &Config) -> Result<PathBuf> {
    let path = config_file();
    save_config_to(config, &path)?;
    Ok(path)
}

pub fn save_config_to(config: &Config, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| CoreError::Config(e.to_string()))?;
    }
    std::fs::write(path, serialize_config(config)).map_err(|e| CoreError::Config(e.to_string()))
}

/// Parse simple YAML-like config text. Unknown keys and malformed values
/// leave the default in place.
pub fn parse_config(text: &str) -> Config {
    let mut config = Config::default();
    let mut current_section: Option<String> = None;

    for line in text.lines() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        let is_indented = line.starts_with("  ") || line.starts_with('\t');

        let Some((key, val)) = stripped.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let val = val.trim();

        if !is_indented {
            current_section = val.is_empty().then(|| key.to_string());
            continue;
        }

        let Some(section) = current_section.as_deref() else {
            continue;
        };
        match section {
            "dispatcher" => {
                let d = &mut config.dispatcher;
                match key {
                    "queue_capacity" => set_parsed(&mut d.queue_capacity, val),
                    "local_queue_capacity" => set_parsed(&mut d.local_queue_capacity, val),
                    "rtc_tick_ms" => set_parsed(&mut d.rtc_tick_ms, val),
                    "frame_sync_ms" => set_parsed(&mut d.frame_sync_ms, val),
                    "backlight_timeout_secs" => set_parsed(&mut d.backlight_timeout_secs, val),
                    _ => {}
                }
            }
            "recent" => match key {
                "max_entries" => set_parsed(&mut config.recent.max_entries, val),
                "visible_rows" => set_parsed(&mut config.recent.visible_rows, val),
                _ => {}
            },
            "logging" => match key {
                "level" => {
                    if let Some(v) = parse_string_value(val) {
                        config.logging.level = v;
                    }
                }
                "packet_log" => config.logging.packet_log = parse_string_value(val),
                _ => {}
            },
            _ => {}
        }
    }

    config.normalize();
    config
}

fn set_parsed<T: std::str::FromStr>(slot: &mut T, val: &str) {
    if let Ok(v) = val.parse() {
        *slot = v;
    }
}

fn parse_string_value(val: &str) -> Option<String> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    // Strip quotes
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return Some(val[1..val.len() - 1].to_string());
    }
    Some(val.to_string())
}

/// Serialize config to YAML-like text.
pub fn serialize_config(config: &Config) -> String {
    let d = &config.dispatcher;
    let mut lines = vec!["# rxhub configuration".to_string(), String::new()];

    lines.push("dispatcher:".into());
    lines.push(format!("  queue_capacity: {}", d.queue_capacity));
    lines.push(format!("  local_queue_capacity: {}", d.local_queue_capacity));
    lines.push(format!("  rtc_tick_ms: {}", d.rtc_tick_ms));
    lines.push(format!("  frame_sync_ms: {}", d.frame_sync_ms));
    lines.push(format!("  backlight_timeout_secs: {}", d.backlight_timeout_secs));
    lines.push(String::new());

    lines.push("recent:".into());
    lines.push(format!("  max_entries: {}", config.recent.max_entries));
    lines.push(format!("  visible_rows: {}", config.recent.visible_rows));
    lines.push(String::new());

    lines.push("logging:".into());
    lines.push(format!("  level: \"{}\"", config.logging.level));
    match &config.logging.packet_log {
        Some(path) => lines.push(format!("  packet_log: \"{path}\"")),
        None => lines.push("  packet_log: null".into()),
    }

    lines.join("\n") + "\n"
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
