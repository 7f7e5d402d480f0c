//! Configuration surface read by the connection manager and the status poller.
//!
//! The persisted store (device preferences, a config file, ...) lives outside this
//! crate; it is reached through [`SettingsProvider`] and read on every connect so
//! changes take effect on the next attempt.

use crate::types::Identity;
use std::sync::{PoisonError, RwLock};

pub const ENV_SERVER_URL: &str = "PARKING_SERVER_URL";
pub const ENV_PLATE_NUMBER: &str = "PARKING_PLATE_NUMBER";
pub const ENV_OWNER_PHONE: &str = "PARKING_OWNER_PHONE";
pub const ENV_NOTIFICATIONS: &str = "PARKING_NOTIFICATIONS";

pub trait SettingsProvider: Send + Sync {
    /// Raw server address as the user entered it (validated by the caller).
    fn server_url(&self) -> String;

    /// Vehicle identity of the logged-in owner, if any.
    fn identity(&self) -> Option<Identity>;

    /// Gates local notifications only; callback fan-out is never gated.
    fn notifications_enabled(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Default)]
struct SettingsData {
    server_url: String,
    identity: Option<Identity>,
    notifications_enabled: bool,
}

/// In-memory settings with interior mutability.
#[derive(Debug)]
pub struct StaticSettings {
    data: RwLock<SettingsData>,
}

impl StaticSettings {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            data: RwLock::new(SettingsData {
                server_url: server_url.into(),
                identity: None,
                notifications_enabled: true,
            }),
        }
    }

    pub fn with_identity(self, identity: Identity) -> Self {
        self.set_identity(Some(identity));
        self
    }

    /// Reads `PARKING_SERVER_URL`, `PARKING_PLATE_NUMBER`, `PARKING_OWNER_PHONE`
    /// and `PARKING_NOTIFICATIONS`. Missing variables leave the field empty.
    pub fn from_env() -> Self {
        let settings = Self::new(std::env::var(ENV_SERVER_URL).unwrap_or_default());

        let plate = std::env::var(ENV_PLATE_NUMBER).ok().filter(|v| !v.trim().is_empty());
        let phone = std::env::var(ENV_OWNER_PHONE).ok().filter(|v| !v.trim().is_empty());
        if let (Some(plate), Some(phone)) = (plate, phone) {
            settings.set_identity(Some(Identity::new(plate.trim(), phone.trim())));
        }

        if let Ok(flag) = std::env::var(ENV_NOTIFICATIONS) {
            settings.set_notifications_enabled(parse_flag(&flag));
        }

        settings
    }

    pub fn set_server_url(&self, url: impl Into<String>) {
        self.write().server_url = url.into();
    }

    pub fn set_identity(&self, identity: Option<Identity>) {
        self.write().identity = identity;
    }

    pub fn set_notifications_enabled(&self, enabled: bool) {
        self.write().notifications_enabled = enabled;
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, SettingsData> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, SettingsData> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for StaticSettings {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl SettingsProvider for StaticSettings {
    fn server_url(&self) -> String {
        self.read().server_url.clone()
    }

    fn identity(&self) -> Option<Identity> {
        self.read().identity.clone()
    }

    fn notifications_enabled(&self) -> bool {
        self.read().notifications_enabled
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "off" | "no" | "disabled"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_settings_setters() {
        let settings = StaticSettings::new("192.168.1.6:5000");
        assert_eq!(settings.server_url(), "192.168.1.6:5000");
        assert!(settings.identity().is_none());
        assert!(settings.notifications_enabled());

        settings.set_identity(Some(Identity::new("51F-12345", "0901234567")));
        settings.set_notifications_enabled(false);
        settings.set_server_url("http://parking.local");

        assert_eq!(settings.identity().unwrap().plate_number, "51F-12345");
        assert!(!settings.notifications_enabled());
        assert_eq!(settings.server_url(), "http://parking.local");
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("Off"));
        assert!(!parse_flag(" false "));
    }
}
