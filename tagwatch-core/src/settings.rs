use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SettingsError;

pub const MONITORING_INTERVAL_RANGE: (u64, u64) = (1, 60);
pub const NOTIFICATION_DURATION_RANGE: (u64, u64) = (2, 30);
pub const MAX_RECENT_RANGE: (u64, u64) = (1, 500);
pub const CACHE_EXPIRATION_RANGE: (u64, u64) = (1, 24);
pub const PAGE_SIZE_RANGE: (u64, u64) = (1, 100);

/// Knobs supplied by the settings collaborator. Every setter clamps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MonitorSettings {
    pub popup_enabled: bool,
    pub sound_enabled: bool,
    pub notification_duration_secs: u64,
    pub monitoring_interval_minutes: u64,
    pub auto_start_monitoring: bool,
    pub max_recent_questions: usize,
    pub cache_expiration_hours: u64,
    /// Minimum spacing between two checks of the same tag.
    pub check_interval_secs: u64,
    /// Items created this long before the last check still count as new.
    pub grace_window_secs: u64,
    pub monitor_page_size: u32,
    /// Width of the time component of cache keys.
    pub cache_bucket_secs: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            popup_enabled: true,
            sound_enabled: true,
            notification_duration_secs: 5,
            monitoring_interval_minutes: 1,
            auto_start_monitoring: false,
            max_recent_questions: 50,
            cache_expiration_hours: 1,
            check_interval_secs: 120,
            grace_window_secs: 300,
            monitor_page_size: 5,
            cache_bucket_secs: 3600,
        }
    }
}

fn clamp_u64(value: i64, (lo, hi): (u64, u64)) -> u64 {
    value.clamp(lo as i64, hi as i64) as u64
}

impl MonitorSettings {
    /// Brings every field back into its allowed range, e.g. after loading from disk.
    pub fn normalized(mut self) -> Self {
        self.set_monitoring_interval(self.monitoring_interval_minutes as i64);
        self.set_notification_duration(self.notification_duration_secs as i64);
        self.set_max_recent_questions(self.max_recent_questions as i64);
        self.set_cache_expiration_hours(self.cache_expiration_hours as i64);
        self.monitor_page_size = clamp_u64(self.monitor_page_size as i64, PAGE_SIZE_RANGE) as u32;
        self.cache_bucket_secs = self.cache_bucket_secs.max(1);
        self
    }

    pub fn set_monitoring_interval(&mut self, minutes: i64) -> u64 {
        self.monitoring_interval_minutes = clamp_u64(minutes, MONITORING_INTERVAL_RANGE);
        self.monitoring_interval_minutes
    }

    pub fn set_notification_duration(&mut self, seconds: i64) -> u64 {
        self.notification_duration_secs = clamp_u64(seconds, NOTIFICATION_DURATION_RANGE);
        self.notification_duration_secs
    }

    pub fn set_max_recent_questions(&mut self, count: i64) -> usize {
        self.max_recent_questions = clamp_u64(count, MAX_RECENT_RANGE) as usize;
        self.max_recent_questions
    }

    pub fn set_cache_expiration_hours(&mut self, hours: i64) -> u64 {
        self.cache_expiration_hours = clamp_u64(hours, CACHE_EXPIRATION_RANGE);
        self.cache_expiration_hours
    }

    pub fn monitoring_interval(&self) -> Duration {
        Duration::from_secs(self.monitoring_interval_minutes * 60)
    }

    pub fn notification_duration(&self) -> Duration {
        Duration::from_secs(self.notification_duration_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_expiration_hours * 3600)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn grace_window(&self) -> Duration {
        Duration::from_secs(self.grace_window_secs)
    }

    /// Applies one key→value pair coming from the settings collaborator.
    pub fn apply(&mut self, key: &str, value: SettingValue) -> Result<(), SettingsError> {
        match key {
            "popup_enabled" => self.popup_enabled = value.as_bool(key)?,
            "sound_enabled" => self.sound_enabled = value.as_bool(key)?,
            "auto_start_monitoring" => self.auto_start_monitoring = value.as_bool(key)?,
            "notification_duration" => {
                self.set_notification_duration(value.as_int(key)?);
            }
            "monitoring_interval" => {
                self.set_monitoring_interval(value.as_int(key)?);
            }
            "max_recent_questions" => {
                self.set_max_recent_questions(value.as_int(key)?);
            }
            "cache_expiration_hours" => {
                self.set_cache_expiration_hours(value.as_int(key)?);
            }
            other => return Err(SettingsError::UnknownKey(other.to_string())),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
}

impl SettingValue {
    fn as_bool(self, key: &str) -> Result<bool, SettingsError> {
        match self {
            SettingValue::Bool(b) => Ok(b),
            SettingValue::Int(_) => Err(SettingsError::TypeMismatch {
                key: key.to_string(),
                expected: "boolean",
            }),
        }
    }

    fn as_int(self, key: &str) -> Result<i64, SettingsError> {
        match self {
            SettingValue::Int(n) => Ok(n),
            SettingValue::Bool(_) => Err(SettingsError::TypeMismatch {
                key: key.to_string(),
                expected: "integer",
            }),
        }
    }
}

/// Settings handle shared by the monitor, cache decorator and dispatcher.
/// Changes are picked up on the next read, so a running loop sees them on
/// its next cycle.
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<MonitorSettings>>,
}

impl SharedSettings {
    pub fn new(settings: MonitorSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings.normalized())),
        }
    }

    pub fn snapshot(&self) -> MonitorSettings {
        self.inner.read().clone()
    }

    pub fn read<R>(&self, f: impl FnOnce(&MonitorSettings) -> R) -> R {
        f(&self.inner.read())
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut MonitorSettings) -> R) -> R {
        f(&mut self.inner.write())
    }

    pub fn set_monitoring_interval(&self, minutes: i64) -> u64 {
        let applied = self.update(|s| s.set_monitoring_interval(minutes));
        info!(minutes = applied, "monitoring interval set");
        applied
    }

    pub fn set_notification_duration(&self, seconds: i64) -> u64 {
        let applied = self.update(|s| s.set_notification_duration(seconds));
        info!(seconds = applied, "notification duration set");
        applied
    }

    pub fn set_popup_enabled(&self, enabled: bool) {
        self.update(|s| s.popup_enabled = enabled);
    }

    pub fn set_sound_enabled(&self, enabled: bool) {
        self.update(|s| s.sound_enabled = enabled);
    }

    /// Flips the popup flag and returns the new state.
    pub fn toggle_popup(&self) -> bool {
        self.update(|s| {
            s.popup_enabled = !s.popup_enabled;
            s.popup_enabled
        })
    }

    pub fn apply(&self, key: &str, value: SettingValue) -> Result<(), SettingsError> {
        self.update(|s| s.apply(key, value))
    }
}
