//! Daemon configuration: YAML-loaded, typed, with a default for every field.
//!
//! Dotted keys (`ad-algo.interval`, `office-time.start_time`, …) map onto
//! nested structs rather than a hand-rolled dotted-key tree walker.
//! `#[serde(default = ...)]` supplies every documented default so a key's
//! absence is an error only for the handful of fields marked required.

use std::fs;
use std::path::Path;

use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::category::ActiveSet;
use crate::clock::RunMode;
use crate::error::ConfigError;

fn default_training_period() -> i64 {
    10080
}
fn default_interval() -> i64 {
    10
}
fn default_sensitivity() -> f64 {
    1.2
}
fn default_adaptability() -> f64 {
    0.5
}
fn default_true() -> bool {
    true
}
fn default_zero_floor() -> f64 {
    0.0
}
fn default_dur_mobile() -> f64 {
    60.0
}
fn default_dur_international() -> f64 {
    40.0
}
fn default_dur_premium() -> f64 {
    60.0
}
fn default_office_start() -> u32 {
    8
}
fn default_office_end() -> u32 {
    16
}
fn default_run_mode() -> String {
    "offline".to_string()
}
fn default_alert_mode() -> String {
    "syslog".to_string()
}
fn default_alert_file() -> String {
    "/var/lib/sipguard/alert.log".to_string()
}
fn default_alert_table() -> String {
    "cdr_alert".to_string()
}
fn default_checkpoint_table() -> String {
    "ad_threshold".to_string()
}
fn default_cdr_table() -> String {
    "cdr".to_string()
}
fn default_pg_port() -> u16 {
    5432
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawAdAlgo {
    #[serde(default = "default_interval")]
    interval: i64,
    #[serde(default = "default_sensitivity")]
    sensitivity: f64,
    #[serde(default = "default_adaptability")]
    adaptability: f64,
    #[serde(default = "default_true")]
    threshold_restore: bool,
    #[serde(default = "default_zero_floor")]
    call_freq: f64,
    #[serde(default = "default_zero_floor")]
    call_duration: f64,
}

// #[derive(Default)] would give every field its zero value rather than the
// serde default functions above — those only apply when the key is present
// in a map but a nested field is missing, not when the whole section is
// absent and `RawConfig`'s own `#[serde(default)]` needs a fallback value.
impl Default for RawAdAlgo {
    fn default() -> Self {
        RawAdAlgo {
            interval: default_interval(),
            sensitivity: default_sensitivity(),
            adaptability: default_adaptability(),
            threshold_restore: default_true(),
            call_freq: default_zero_floor(),
            call_duration: default_zero_floor(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawCallDuration {
    #[serde(default = "default_dur_mobile")]
    mobile: f64,
    #[serde(default = "default_dur_international")]
    international: f64,
    #[serde(default = "default_dur_premium")]
    premium: f64,
}

impl Default for RawCallDuration {
    fn default() -> Self {
        RawCallDuration {
            mobile: default_dur_mobile(),
            international: default_dur_international(),
            premium: default_dur_premium(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawOfficeTime {
    #[serde(default = "default_office_start")]
    start_time: u32,
    #[serde(default = "default_office_end")]
    end_time: u32,
}

impl Default for RawOfficeTime {
    fn default() -> Self {
        RawOfficeTime {
            start_time: default_office_start(),
            end_time: default_office_end(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
struct RawDbConfig {
    host: Option<String>,
    #[serde(default = "default_pg_port")]
    port: u16,
    dbname: Option<String>,
    user: Option<String>,
    password: Option<String>,
    table: Option<String>,
}

impl Default for RawDbConfig {
    fn default() -> Self {
        RawDbConfig {
            host: None,
            port: default_pg_port(),
            dbname: None,
            user: None,
            password: None,
            table: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawConfig {
    institution: Option<String>,
    call_type: Option<String>,
    #[serde(default = "default_training_period")]
    training_period: i64,
    #[serde(default = "default_run_mode")]
    run_mode: String,
    initial_timestamp: Option<String>,
    detection_start_ts: Option<String>,
    ending_date: Option<String>,
    #[serde(default)]
    ad_algo: RawAdAlgo,
    #[serde(default)]
    call_duration: RawCallDuration,
    #[serde(default)]
    office_time: RawOfficeTime,
    #[serde(default = "default_alert_mode")]
    alert_mode: String,
    #[serde(default = "default_alert_file")]
    alert_file: String,
    #[serde(default)]
    cdr_database: RawDbConfig,
    #[serde(default)]
    checkpoint_database: RawDbConfig,
    #[serde(default)]
    alert_database: RawDbConfig,
}

/// A single relational collaborator's connection parameters.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    pub table: String,
}

impl DbConfig {
    fn from_raw(raw: RawDbConfig, default_table: &str) -> Self {
        DbConfig {
            host: raw.host.unwrap_or_else(|| "localhost".to_string()),
            port: raw.port,
            dbname: raw.dbname.unwrap_or_else(|| "sipguard".to_string()),
            user: raw.user.unwrap_or_else(|| "sipguard".to_string()),
            password: raw.password.unwrap_or_default(),
            table: raw.table.unwrap_or_else(|| default_table.to_string()),
        }
    }

    /// A `tokio_postgres`-compatible connection string.
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            self.host, self.port, self.dbname, self.user, self.password
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertMode {
    Syslog,
    File,
    Both,
}

fn parse_timestamp(key: &'static str, raw: &str) -> Result<NaiveDateTime, ConfigError> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}

/// Fully validated, typed daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub institution: String,
    pub active: ActiveSet,
    pub training_period_minutes: i64,
    pub run_mode: RunMode,
    pub initial_timestamp: Option<NaiveDateTime>,
    pub detection_start_ts: Option<NaiveDateTime>,
    pub ending_date: Option<NaiveDateTime>,

    pub interval_minutes: i64,
    pub sensitivity: f64,
    pub adaptability: f64,
    pub threshold_restore: bool,
    pub freq_floor: f64,
    /// Duration floor, converted from the configured minutes into seconds
    /// (`O.d_c` accumulates `billsec`).
    pub dur_floor_seconds: f64,

    /// Per-category duration thresholds, converted from minutes into
    /// seconds to compare directly against `O.d_c`.
    pub dur_mobile_seconds: f64,
    pub dur_international_seconds: f64,
    pub dur_premium_seconds: f64,

    /// Stored pre-decremented by one; compare with strict `>`.
    pub office_start_minus_one: i64,
    pub office_end: u32,

    pub alert_mode: AlertMode,
    pub alert_file: String,

    pub cdr_db: DbConfig,
    pub checkpoint_db: DbConfig,
    pub alert_db: DbConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::parse(&text)
    }

    pub(crate) fn parse(text: &str) -> Result<Config, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(text).map_err(|e| ConfigError::Invalid {
            key: "<document>",
            reason: e.to_string(),
        })?;

        let institution = raw.institution.ok_or(ConfigError::MissingKey("institution"))?;
        let call_type = raw.call_type.ok_or(ConfigError::MissingKey("call-type"))?;
        let active = ActiveSet::parse(&call_type).map_err(|reason| ConfigError::Invalid {
            key: "call-type",
            reason,
        })?;

        let run_mode = match raw.run_mode.to_ascii_lowercase().as_str() {
            "online" => RunMode::Online,
            "offline" => RunMode::Offline,
            other => {
                return Err(ConfigError::Invalid {
                    key: "run-mode",
                    reason: format!("must be 'online' or 'offline', got '{other}'"),
                })
            }
        };

        let initial_timestamp = raw
            .initial_timestamp
            .as_deref()
            .map(|s| parse_timestamp("initial-timestamp", s))
            .transpose()?;
        let detection_start_ts = raw
            .detection_start_ts
            .as_deref()
            .map(|s| parse_timestamp("detection-start-ts", s))
            .transpose()?;
        let ending_date = raw
            .ending_date
            .as_deref()
            .map(|s| parse_timestamp("ending-date", s))
            .transpose()?;

        if run_mode == RunMode::Offline && ending_date.is_none() {
            return Err(ConfigError::MissingKey("ending-date"));
        }

        let alert_mode = match raw.alert_mode.to_ascii_lowercase().as_str() {
            "syslog" => AlertMode::Syslog,
            "hobbit" => AlertMode::File,
            "both" => AlertMode::Both,
            other => {
                return Err(ConfigError::Invalid {
                    key: "alert-mode",
                    reason: format!("must be 'syslog', 'hobbit', or 'both', got '{other}'"),
                })
            }
        };

        Ok(Config {
            institution,
            active,
            training_period_minutes: raw.training_period,
            run_mode,
            initial_timestamp,
            detection_start_ts,
            ending_date,

            interval_minutes: raw.ad_algo.interval,
            sensitivity: raw.ad_algo.sensitivity,
            adaptability: raw.ad_algo.adaptability,
            threshold_restore: raw.ad_algo.threshold_restore,
            freq_floor: raw.ad_algo.call_freq,
            dur_floor_seconds: raw.ad_algo.call_duration * 60.0,

            dur_mobile_seconds: raw.call_duration.mobile * 60.0,
            dur_international_seconds: raw.call_duration.international * 60.0,
            dur_premium_seconds: raw.call_duration.premium * 60.0,

            office_start_minus_one: raw.office_time.start_time as i64 - 1,
            office_end: raw.office_time.end_time,

            alert_mode,
            alert_file: raw.alert_file,

            cdr_db: DbConfig::from_raw(raw.cdr_database, &default_cdr_table()),
            checkpoint_db: DbConfig::from_raw(raw.checkpoint_database, &default_checkpoint_table()),
            alert_db: DbConfig::from_raw(raw.alert_database, &default_alert_table()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "institution: acme\ncall-type: All\nending-date: \"2024-01-15 11:00:00\"\n";

    #[test]
    fn minimal_config_applies_every_default() {
        let cfg = Config::parse(MINIMAL).unwrap();
        assert_eq!(cfg.institution, "acme");
        assert_eq!(cfg.training_period_minutes, 10080);
        assert_eq!(cfg.interval_minutes, 10);
        assert_eq!(cfg.sensitivity, 1.2);
        assert_eq!(cfg.adaptability, 0.5);
        assert!(cfg.threshold_restore);
        assert_eq!(cfg.dur_mobile_seconds, 3600.0);
        assert_eq!(cfg.dur_international_seconds, 2400.0);
        assert_eq!(cfg.dur_premium_seconds, 3600.0);
        assert_eq!(cfg.office_start_minus_one, 7);
        assert_eq!(cfg.office_end, 16);
        assert_eq!(cfg.alert_mode, AlertMode::Syslog);
        assert_eq!(cfg.run_mode, RunMode::Offline);
    }

    #[test]
    fn missing_institution_is_reported_before_any_collaborator_is_touched() {
        let text = "call-type: All\nending-date: \"2024-01-15 11:00:00\"\n";
        let err = Config::parse(text).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey("institution")));
    }

    #[test]
    fn offline_without_ending_date_is_an_error() {
        let text = "institution: acme\ncall-type: All\n";
        let err = Config::parse(text).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey("ending-date")));
    }

    #[test]
    fn online_mode_does_not_require_ending_date() {
        let text = "institution: acme\ncall-type: All\nrun-mode: online\n";
        let cfg = Config::parse(text).unwrap();
        assert_eq!(cfg.run_mode, RunMode::Online);
        assert!(cfg.ending_date.is_none());
    }

    #[test]
    fn nested_and_dotted_keys_parse() {
        let text = "institution: acme\ncall-type: mobile,premium\nrun-mode: online\n\
                     ad-algo:\n  interval: 5\n  sensitivity: 2.0\n  adaptability: 0.3\n\
                     office-time:\n  start_time: 9\n  end_time: 18\n\
                     alert-mode: both\n";
        let cfg = Config::parse(text).unwrap();
        assert_eq!(cfg.interval_minutes, 5);
        assert_eq!(cfg.sensitivity, 2.0);
        assert_eq!(cfg.adaptability, 0.3);
        assert_eq!(cfg.office_start_minus_one, 8);
        assert_eq!(cfg.office_end, 18);
        assert_eq!(cfg.alert_mode, AlertMode::Both);
        assert!(cfg.active.is_active(crate::category::CallType::Mobile));
        assert!(!cfg.active.is_active(crate::category::CallType::Domestic));
    }

    #[test]
    fn unknown_run_mode_is_an_error() {
        let text = "institution: acme\ncall-type: All\nrun-mode: sideways\nending-date: \"2024-01-15 11:00:00\"\n";
        let err = Config::parse(text).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "run-mode", .. }));
    }
}
