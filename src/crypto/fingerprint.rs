//! Per-day device fingerprint.
//!
//! The fingerprint is SHA-256 over the host name, OS, app version and the
//! UTC calendar day. It is stable for a device within a day and rotates at
//! midnight UTC, so tags never carry a long-lived device identifier.

use chrono::{NaiveDate, Utc};

use super::utils::sha256_hex;

/// Static facts about the device the fingerprint is derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub hostname: String,
    pub os: String,
    pub app_version: String,
}

impl DeviceInfo {
    /// Collect device facts from the running system.
    pub fn detect() -> Self {
        Self {
            hostname: get_device_name(),
            os: std::env::consts::OS.to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FingerprintService {
    device: DeviceInfo,
}

impl FingerprintService {
    pub fn new(device: DeviceInfo) -> Self {
        Self { device }
    }

    /// Fingerprint for the current UTC day.
    pub fn fingerprint(&self) -> String {
        self.fingerprint_for(Utc::now().date_naive())
    }

    /// Fingerprint for a given UTC day. Always 64 lowercase hex characters.
    pub fn fingerprint_for(&self, day: NaiveDate) -> String {
        let material = format!(
            "{}|{}|{}|{}",
            self.device.hostname,
            self.device.os,
            self.device.app_version,
            day.format("%Y-%m-%d")
        );
        sha256_hex(&[material.as_bytes()])
    }
}

/// Get the device name from the system hostname.
fn get_device_name() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "nfc-guard-device".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> FingerprintService {
        FingerprintService::new(DeviceInfo {
            hostname: "pixel-7".to_string(),
            os: "android".to_string(),
            app_version: "1.0.0".to_string(),
        })
    }

    #[test]
    fn test_fingerprint_stable_within_day() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap();
        let fp = service().fingerprint_for(day);
        assert_eq!(fp, service().fingerprint_for(day));
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_fingerprint_rotates_daily() {
        let monday = NaiveDate::from_ymd_opt(2024, 3, 11).unwrap();
        let tuesday = NaiveDate::from_ymd_opt(2024, 3, 12).unwrap();
        assert_ne!(
            service().fingerprint_for(monday),
            service().fingerprint_for(tuesday)
        );
    }

    #[test]
    fn test_fingerprint_differs_per_device() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap();
        let other = FingerprintService::new(DeviceInfo {
            hostname: "iphone-15".to_string(),
            os: "ios".to_string(),
            app_version: "1.0.0".to_string(),
        });
        assert_ne!(service().fingerprint_for(day), other.fingerprint_for(day));
    }

    #[test]
    fn test_detect_has_hostname() {
        let info = DeviceInfo::detect();
        assert!(!info.hostname.is_empty());
        assert_eq!(info.app_version, env!("CARGO_PKG_VERSION"));
    }
}
