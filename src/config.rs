//! Configuration parsing, validation, snapshots, and write-back.
//!
//! The config document is JSON with `//` and `/* */` comments. Readers get
//! an immutable [`ConfigSnapshot`] behind an `Arc`; a reload or write-back
//! swaps the `Arc` atomically and publishes the new snapshot on a
//! `tokio::sync::watch` channel so every subscriber observes the same one.
//! Parse failures never replace a published snapshot.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::{AppError, Result};

/// Application name used for the per-user config directory.
pub const APP_DIR_NAME: &str = "ai-intervention-agent";

/// Config file name looked up in the working directory and the user dir.
pub const CONFIG_FILE_NAME: &str = "config.jsonc";

/// Notification fan-out section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct NotificationConfig {
    /// Master on/off for the whole fan-out.
    pub enabled: bool,
    /// Browser toast transport (delivered by the polling UI).
    pub web_enabled: bool,
    /// Whether the UI should request browser notification permission.
    pub auto_request_permission: bool,
    /// Sound transport (played by the UI).
    pub sound_enabled: bool,
    pub sound_mute: bool,
    /// Playback volume, 0-100. Out-of-range values are clamped.
    pub sound_volume: u8,
    pub mobile_optimized: bool,
    pub mobile_vibrate: bool,
    /// Bark push transport.
    pub bark_enabled: bool,
    pub bark_url: String,
    pub bark_device_key: String,
    pub bark_icon: String,
    /// Tap behavior forwarded to Bark: `none`, `url`, or `copy`.
    pub bark_action: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            web_enabled: true,
            auto_request_permission: true,
            sound_enabled: true,
            sound_mute: false,
            sound_volume: 80,
            mobile_optimized: true,
            mobile_vibrate: true,
            bark_enabled: false,
            bark_url: "https://api.day.app/push".into(),
            bark_device_key: String::new(),
            bark_icon: String::new(),
            bark_action: "none".into(),
        }
    }
}

/// Web UI section. The retry fields are carried for clients and never
/// interpreted by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", default)]
pub struct WebUiConfig {
    pub host: String,
    pub port: u16,
    pub max_retries: u32,
    pub retry_delay: f64,
}

impl Default for WebUiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            max_retries: 3,
            retry_delay: 1.0,
        }
    }
}

/// Network access-control section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct NetworkSecurityConfig {
    /// Local interface the HTTP listener binds to.
    pub bind_interface: String,
    /// CIDR blocks (IPv4 and IPv6) or single addresses allowed to connect.
    pub allowed_networks: Vec<String>,
    /// Individual addresses denied regardless of `allowed_networks`.
    pub blocked_ips: Vec<String>,
    pub enable_access_control: bool,
}

impl Default for NetworkSecurityConfig {
    fn default() -> Self {
        Self {
            bind_interface: "0.0.0.0".into(),
            allowed_networks: vec![
                "127.0.0.0/8".into(),
                "::1/128".into(),
                "192.168.0.0/16".into(),
                "10.0.0.0/8".into(),
                "172.16.0.0/12".into(),
            ],
            blocked_ips: Vec::new(),
            enable_access_control: true,
        }
    }
}

/// Feedback-cycle section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct FeedbackSection {
    /// Upper bound in seconds on how long one RPC may block overall.
    pub timeout: u64,
    /// Canned text used when a task's deadline fires without human input.
    pub resubmit_prompt: String,
    /// Hint appended by clients to their final prompt.
    pub prompt_suffix: String,
}

impl Default for FeedbackSection {
    fn default() -> Self {
        Self {
            timeout: 600,
            resubmit_prompt:
                "Please continue with the current task based on your best judgment.".into(),
            prompt_suffix: "\n\nCall the interactive_feedback tool again before finishing.".into(),
        }
    }
}

/// One immutable, publishable view of the configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", default)]
pub struct ConfigSnapshot {
    pub notification: NotificationConfig,
    pub web_ui: WebUiConfig,
    pub network_security: NetworkSecurityConfig,
    pub feedback: FeedbackSection,
}

impl ConfigSnapshot {
    /// Parse a JSONC document and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` on malformed JSON or failed validation.
    pub fn from_jsonc_str(raw: &str) -> Result<Self> {
        let stripped = strip_jsonc_comments(raw);
        let mut snapshot: Self = serde_json::from_str(&stripped)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    fn validate(&mut self) -> Result<()> {
        if self.web_ui.port == 0 {
            return Err(AppError::Config("web_ui.port must be in 1-65535".into()));
        }
        if self.feedback.timeout == 0 {
            return Err(AppError::Config("feedback.timeout must be greater than zero".into()));
        }
        if self.notification.sound_volume > 100 {
            warn!(
                volume = self.notification.sound_volume,
                "notification.sound_volume clamped to 100"
            );
            self.notification.sound_volume = 100;
        }
        if !matches!(self.notification.bark_action.as_str(), "none" | "url" | "copy") {
            warn!(
                action = %self.notification.bark_action,
                "unknown notification.bark_action, using \"none\""
            );
            self.notification.bark_action = "none".into();
        }
        for entry in &self.network_security.allowed_networks {
            parse_network(entry).map_err(|err| {
                AppError::Config(format!("network_security.allowed_networks: {err}"))
            })?;
        }
        for entry in &self.network_security.blocked_ips {
            IpAddr::from_str(entry).map_err(|err| {
                AppError::Config(format!("network_security.blocked_ips '{entry}': {err}"))
            })?;
        }
        Ok(())
    }
}

/// Parse a CIDR block or a bare address (treated as a host route).
///
/// # Errors
///
/// Returns `AppError::Config` when the entry is neither.
pub fn parse_network(entry: &str) -> Result<IpNet> {
    if let Ok(net) = IpNet::from_str(entry) {
        return Ok(net);
    }
    IpAddr::from_str(entry)
        .map(IpNet::from)
        .map_err(|err| AppError::Config(format!("'{entry}' is not a CIDR block or address: {err}")))
}

/// CLI overrides layered onto every parsed snapshot.
///
/// Reloads re-apply them, so a `--port` on the command line wins over the
/// file for the whole process lifetime.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub timeout: Option<u64>,
}

impl CliOverrides {
    fn apply(&self, snapshot: &mut ConfigSnapshot) {
        if let Some(ref host) = self.host {
            snapshot.web_ui.host.clone_from(host);
            snapshot.network_security.bind_interface.clone_from(host);
        }
        if let Some(port) = self.port {
            snapshot.web_ui.port = port;
        }
        if let Some(timeout) = self.timeout {
            snapshot.feedback.timeout = timeout;
        }
    }
}

/// Partial notification section as posted by the UI.
///
/// Accepts both the file's snake_case keys and the UI's camelCase ones.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NotificationUpdate {
    pub enabled: Option<bool>,
    #[serde(alias = "webEnabled")]
    pub web_enabled: Option<bool>,
    #[serde(alias = "autoRequestPermission")]
    pub auto_request_permission: Option<bool>,
    #[serde(alias = "soundEnabled")]
    pub sound_enabled: Option<bool>,
    #[serde(alias = "soundMute")]
    pub sound_mute: Option<bool>,
    #[serde(alias = "soundVolume")]
    pub sound_volume: Option<u8>,
    #[serde(alias = "mobileOptimized")]
    pub mobile_optimized: Option<bool>,
    #[serde(alias = "mobileVibrate")]
    pub mobile_vibrate: Option<bool>,
    #[serde(alias = "barkEnabled")]
    pub bark_enabled: Option<bool>,
    #[serde(alias = "barkUrl")]
    pub bark_url: Option<String>,
    #[serde(alias = "barkDeviceKey")]
    pub bark_device_key: Option<String>,
    #[serde(alias = "barkIcon")]
    pub bark_icon: Option<String>,
    #[serde(alias = "barkAction")]
    pub bark_action: Option<String>,
}

impl NotificationUpdate {
    fn merge_onto(&self, base: &NotificationConfig) -> NotificationConfig {
        let mut merged = base.clone();
        if let Some(v) = self.enabled {
            merged.enabled = v;
        }
        if let Some(v) = self.web_enabled {
            merged.web_enabled = v;
        }
        if let Some(v) = self.auto_request_permission {
            merged.auto_request_permission = v;
        }
        if let Some(v) = self.sound_enabled {
            merged.sound_enabled = v;
        }
        if let Some(v) = self.sound_mute {
            merged.sound_mute = v;
        }
        if let Some(v) = self.sound_volume {
            merged.sound_volume = v.min(100);
        }
        if let Some(v) = self.mobile_optimized {
            merged.mobile_optimized = v;
        }
        if let Some(v) = self.mobile_vibrate {
            merged.mobile_vibrate = v;
        }
        if let Some(v) = self.bark_enabled {
            merged.bark_enabled = v;
        }
        if let Some(ref v) = self.bark_url {
            merged.bark_url.clone_from(v);
        }
        if let Some(ref v) = self.bark_device_key {
            merged.bark_device_key.clone_from(v);
        }
        if let Some(ref v) = self.bark_icon {
            merged.bark_icon.clone_from(v);
        }
        if let Some(ref v) = self.bark_action {
            merged.bark_action = if matches!(v.as_str(), "none" | "url" | "copy") {
                v.clone()
            } else {
                "none".into()
            };
        }
        merged
    }
}

struct StoreState {
    snapshot: Arc<ConfigSnapshot>,
    /// Verbatim file text, kept so write-back can edit only changed keys
    /// and leave comments and unknown keys untouched.
    original_text: String,
}

/// Owner of the config file, the published snapshot, and the change fan-out.
pub struct ConfigStore {
    path: PathBuf,
    overrides: CliOverrides,
    state: RwLock<StoreState>,
    tx: watch::Sender<Arc<ConfigSnapshot>>,
}

impl ConfigStore {
    /// Locate (or create) the config file and load the initial snapshot.
    ///
    /// Discovery order: `./config.jsonc`, then the per-user config directory
    /// for [`APP_DIR_NAME`]. When neither exists the default commented
    /// document is written to the user location.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when the config directory cannot be
    /// created or the default file cannot be written — both are fatal on
    /// first run. A merely unparseable existing file is NOT fatal: the
    /// defaults are published and a warning logged.
    pub fn open(explicit: Option<PathBuf>, overrides: CliOverrides) -> Result<Self> {
        let path = explicit.unwrap_or_else(find_config_file);

        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|err| {
                    AppError::Config(format!(
                        "cannot create config directory '{}': {err}",
                        parent.display()
                    ))
                })?;
            }
            std::fs::write(&path, DEFAULT_CONFIG).map_err(|err| {
                AppError::Config(format!(
                    "cannot write default config '{}': {err}",
                    path.display()
                ))
            })?;
            info!(path = %path.display(), "created default config file");
        }

        let text = std::fs::read_to_string(&path).unwrap_or_else(|err| {
            warn!(path = %path.display(), %err, "cannot read config file, using defaults");
            DEFAULT_CONFIG.to_owned()
        });
        let mut snapshot = ConfigSnapshot::from_jsonc_str(&text).unwrap_or_else(|err| {
            warn!(path = %path.display(), %err, "config file invalid, using defaults");
            ConfigSnapshot::default()
        });
        overrides.apply(&mut snapshot);

        let snapshot = Arc::new(snapshot);
        let (tx, _rx) = watch::channel(Arc::clone(&snapshot));
        info!(path = %path.display(), "configuration loaded");

        Ok(Self {
            path,
            overrides,
            state: RwLock::new(StoreState {
                snapshot,
                original_text: text,
            }),
            tx,
        })
    }

    /// Build a store from a document string, without touching the disk.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the document does not parse.
    pub fn from_jsonc_str(raw: &str, overrides: CliOverrides) -> Result<Self> {
        let mut snapshot = ConfigSnapshot::from_jsonc_str(raw)?;
        overrides.apply(&mut snapshot);
        let snapshot = Arc::new(snapshot);
        let (tx, _rx) = watch::channel(Arc::clone(&snapshot));
        Ok(Self {
            path: PathBuf::from(CONFIG_FILE_NAME),
            overrides,
            state: RwLock::new(StoreState {
                snapshot,
                original_text: raw.to_owned(),
            }),
            tx,
        })
    }

    /// Path of the watched config file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current snapshot. Cheap; clones an `Arc`.
    #[must_use]
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        let guard = self
            .state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(&guard.snapshot)
    }

    /// Subscribe to snapshot swaps.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<ConfigSnapshot>> {
        self.tx.subscribe()
    }

    /// Re-read the file and swap the snapshot iff it parses and validates.
    ///
    /// # Errors
    ///
    /// Returns the parse or read error; the previously published snapshot
    /// stays in effect either way.
    pub fn reload(&self) -> Result<()> {
        let text = std::fs::read_to_string(&self.path)
            .map_err(|err| AppError::Io(format!("config read failed: {err}")))?;
        let mut snapshot = ConfigSnapshot::from_jsonc_str(&text)?;
        self.overrides.apply(&mut snapshot);
        self.publish(snapshot, text);
        Ok(())
    }

    /// Merge a posted notification update, persist it, and publish.
    ///
    /// The file is edited in place: only changed scalar keys inside the
    /// `notification` section are rewritten, so comments and unknown keys
    /// survive. Concurrent writers are serialized by the store lock.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` when the file cannot be written.
    pub fn update_notification(&self, update: &NotificationUpdate) -> Result<NotificationConfig> {
        let mut guard = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let merged = update.merge_onto(&guard.snapshot.notification);
        let changes = changed_scalar_keys(&guard.snapshot.notification, &merged);
        if changes.is_empty() {
            return Ok(merged);
        }

        let mut snapshot = (*guard.snapshot).clone();
        snapshot.notification = merged.clone();

        let new_text = match rewrite_section_scalars(&guard.original_text, "notification", &changes)
        {
            Some(text) => text,
            None => {
                // Section missing from the file; fall back to a full dump.
                warn!("notification section not found in config text, rewriting whole file");
                serde_json::to_string_pretty(&snapshot)
                    .map_err(|err| AppError::Io(format!("config serialize failed: {err}")))?
            }
        };
        std::fs::write(&self.path, &new_text)
            .map_err(|err| AppError::Io(format!("config write failed: {err}")))?;

        guard.snapshot = Arc::new(snapshot);
        guard.original_text = new_text;
        self.tx.send_replace(Arc::clone(&guard.snapshot));
        info!(keys = changes.len(), "notification config updated");
        Ok(merged)
    }

    fn publish(&self, snapshot: ConfigSnapshot, text: String) {
        let mut guard = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.snapshot = Arc::new(snapshot);
        guard.original_text = text;
        self.tx.send_replace(Arc::clone(&guard.snapshot));
    }
}

/// First existing of `./config.jsonc` and the per-user location; when
/// neither exists, the per-user location (where the default is created).
fn find_config_file() -> PathBuf {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return local;
    }
    match dirs::config_dir() {
        Some(dir) => dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME),
        None => local,
    }
}

/// Strip `//` and `/* */` comments without touching string-literal content.
/// Newlines inside block comments are preserved so parse-error line numbers
/// still point into the original file.
#[must_use]
pub fn strip_jsonc_comments(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    let mut in_str = false;
    let mut esc = false;
    while i < chars.len() {
        let c = chars[i];
        if in_str {
            out.push(c);
            if esc {
                esc = false;
            } else if c == '\\' {
                esc = true;
            } else if c == '"' {
                in_str = false;
            }
            i += 1;
            continue;
        }
        match c {
            '"' => {
                in_str = true;
                out.push(c);
                i += 1;
            }
            '/' if i + 1 < chars.len() && chars[i + 1] == '/' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if i + 1 < chars.len() && chars[i + 1] == '*' => {
                i += 2;
                while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                    if chars[i] == '\n' {
                        out.push('\n');
                    }
                    i += 1;
                }
                i = (i + 2).min(chars.len());
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Scalar keys whose value differs between two notification sections.
fn changed_scalar_keys(
    old: &NotificationConfig,
    new: &NotificationConfig,
) -> serde_json::Map<String, serde_json::Value> {
    let old_map = section_map(old);
    let new_map = section_map(new);
    new_map
        .into_iter()
        .filter(|(key, value)| old_map.get(key) != Some(value))
        .collect()
}

fn section_map(section: &NotificationConfig) -> serde_json::Map<String, serde_json::Value> {
    match serde_json::to_value(section) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    }
}

/// Byte range `(open_brace, close_brace)` of the object value of a
/// top-level `"section"` key, comment- and string-aware.
fn find_section_range(text: &str, section: &str) -> Option<(usize, usize)> {
    let b = text.as_bytes();
    let needle = section.as_bytes();
    let mut i = 0usize;
    let mut depth: i32 = 0;
    let mut in_str = false;
    let mut esc = false;
    let mut str_start = 0usize;
    let mut last_string: Option<(usize, usize)> = None;
    let mut awaiting_section_value = false;
    while i < b.len() {
        let c = b[i];
        if in_str {
            if esc {
                esc = false;
            } else if c == b'\\' {
                esc = true;
            } else if c == b'"' {
                in_str = false;
                last_string = Some((str_start, i));
            }
            i += 1;
            continue;
        }
        match c {
            b'"' => {
                awaiting_section_value = false;
                in_str = true;
                str_start = i + 1;
            }
            b'/' if i + 1 < b.len() && b[i + 1] == b'/' => {
                while i < b.len() && b[i] != b'\n' {
                    i += 1;
                }
                continue;
            }
            b'/' if i + 1 < b.len() && b[i + 1] == b'*' => {
                i += 2;
                while i + 1 < b.len() && !(b[i] == b'*' && b[i + 1] == b'/') {
                    i += 1;
                }
                i = (i + 2).min(b.len());
                continue;
            }
            b':' if depth == 1 => {
                awaiting_section_value = last_string.is_some_and(|(s, e)| &b[s..e] == needle);
            }
            b'{' => {
                if depth == 1 && awaiting_section_value {
                    let close = find_matching_brace(text, i)?;
                    return Some((i, close));
                }
                depth += 1;
            }
            b'}' => depth -= 1,
            _ => {
                if awaiting_section_value && !c.is_ascii_whitespace() {
                    awaiting_section_value = false;
                }
            }
        }
        i += 1;
    }
    None
}

/// Byte offset of the `}` matching the `{` at `open`.
fn find_matching_brace(text: &str, open: usize) -> Option<usize> {
    let b = text.as_bytes();
    let mut i = open;
    let mut depth: i32 = 0;
    let mut in_str = false;
    let mut esc = false;
    while i < b.len() {
        let c = b[i];
        if in_str {
            if esc {
                esc = false;
            } else if c == b'\\' {
                esc = true;
            } else if c == b'"' {
                in_str = false;
            }
            i += 1;
            continue;
        }
        match c {
            b'"' => in_str = true,
            b'/' if i + 1 < b.len() && b[i + 1] == b'/' => {
                while i < b.len() && b[i] != b'\n' {
                    i += 1;
                }
                continue;
            }
            b'/' if i + 1 < b.len() && b[i + 1] == b'*' => {
                i += 2;
                while i + 1 < b.len() && !(b[i] == b'*' && b[i + 1] == b'/') {
                    i += 1;
                }
                i = (i + 2).min(b.len());
                continue;
            }
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Length of the scalar value at the start of `rest` — up to the next
/// separator comma, comment, or end of line, skipping over string content.
fn scalar_value_len(rest: &str) -> usize {
    let b = rest.as_bytes();
    let mut i = 0usize;
    let mut in_str = false;
    let mut esc = false;
    while i < b.len() {
        let c = b[i];
        if in_str {
            if esc {
                esc = false;
            } else if c == b'\\' {
                esc = true;
            } else if c == b'"' {
                in_str = false;
            }
            i += 1;
            continue;
        }
        match c {
            b'"' => in_str = true,
            b',' | b'\n' | b'\r' => return i,
            b'/' if i + 1 < b.len() && (b[i + 1] == b'/' || b[i + 1] == b'*') => return i,
            _ => {}
        }
        i += 1;
    }
    b.len()
}

/// Rewrite changed scalar keys inside one top-level section of a JSONC
/// document, leaving every other byte (comments included) untouched. Keys
/// absent from the text are inserted right after the section's opening
/// brace. Returns `None` when the section is not present.
fn rewrite_section_scalars(
    text: &str,
    section: &str,
    changes: &serde_json::Map<String, serde_json::Value>,
) -> Option<String> {
    let (open, close) = find_section_range(text, section)?;
    let body = &text[open + 1..close];

    let mut remaining: Vec<(&String, &serde_json::Value)> = changes.iter().collect();
    let mut new_body = String::with_capacity(body.len());

    for line in body.split_inclusive('\n') {
        let mut rewritten: Option<String> = None;
        if !line.trim_start().starts_with("//") {
            let mut hit: Option<usize> = None;
            for (idx, (key, value)) in remaining.iter().enumerate() {
                let needle = format!("\"{key}\"");
                let Some(kpos) = line.find(&needle) else {
                    continue;
                };
                let after = &line[kpos + needle.len()..];
                let after_ws = after.trim_start();
                if !after_ws.starts_with(':') {
                    continue;
                }
                let colon = kpos + needle.len() + (after.len() - after_ws.len());
                let value_region = &line[colon + 1..];
                let lead_ws = value_region.len() - value_region.trim_start().len();
                let rest = &value_region[lead_ws..];
                let vend = scalar_value_len(rest);
                let kept = rest[..vend].trim_end().len();
                let rendered =
                    serde_json::to_string(value).unwrap_or_else(|_| "null".to_owned());
                rewritten = Some(format!(
                    "{}{rendered}{}",
                    &line[..colon + 1 + lead_ws],
                    &rest[kept..]
                ));
                hit = Some(idx);
                break;
            }
            if let Some(idx) = hit {
                remaining.remove(idx);
            }
        }
        new_body.push_str(rewritten.as_deref().unwrap_or(line));
    }

    if !remaining.is_empty() {
        let has_entries = new_body
            .lines()
            .any(|l| !l.trim().is_empty() && !l.trim().starts_with("//"));
        let mut inserted = String::new();
        for (idx, (key, value)) in remaining.iter().enumerate() {
            let rendered = serde_json::to_string(value).unwrap_or_else(|_| "null".to_owned());
            let comma = if has_entries || idx + 1 < remaining.len() {
                ","
            } else {
                ""
            };
            inserted.push_str(&format!("\n    \"{key}\": {rendered}{comma}"));
        }
        new_body = format!("{inserted}{new_body}");
    }

    let mut out = String::with_capacity(text.len() + 64);
    out.push_str(&text[..=open]);
    out.push_str(&new_body);
    out.push_str(&text[close..]);
    Some(out)
}


/// Default commented config document written on first run.
pub const DEFAULT_CONFIG: &str = r#"{
  // Notification fan-out. Each transport toggles independently.
  "notification": {
    "enabled": true,
    "web_enabled": true,
    "auto_request_permission": true,
    "sound_enabled": true,
    "sound_mute": false,
    "sound_volume": 80, // 0-100
    "mobile_optimized": true,
    "mobile_vibrate": true,
    "bark_enabled": false,
    "bark_url": "https://api.day.app/push",
    "bark_device_key": "",
    "bark_icon": "",
    "bark_action": "none" // none | url | copy
  },
  // Bind endpoint for the feedback web UI.
  "web_ui": {
    "host": "127.0.0.1",
    "port": 8080,
    "max_retries": 3,
    "retry_delay": 1.0
  },
  // Which clients may reach the HTTP surface.
  "network_security": {
    "bind_interface": "0.0.0.0",
    "allowed_networks": [
      "127.0.0.0/8",
      "::1/128",
      "192.168.0.0/16",
      "10.0.0.0/8",
      "172.16.0.0/12"
    ],
    "blocked_ips": [],
    "enable_access_control": true
  },
  "feedback": {
    // Seconds one feedback call may block overall.
    "timeout": 600,
    "resubmit_prompt": "Please continue with the current task based on your best judgment.",
    "prompt_suffix": "\n\nCall the interactive_feedback tool again before finishing."
  }
}
"#;
