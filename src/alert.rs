//! Alert sink and alert archive.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;

use crate::cdr::CdrRow;
use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertStatus {
    Ok,
    Alert,
}

/// Archive of CDR rows that produced an alert.
#[async_trait]
pub trait AlertArchive: Send + Sync {
    /// Allocate the next `alert_id` (current max + 1) and write every row
    /// under it. Returns the allocated id.
    async fn log_alert(&self, rows: &[CdrRow]) -> Result<i64, StoreError>;
}

pub struct PostgresAlertArchive {
    client: tokio_postgres::Client,
    table: String,
}

impl PostgresAlertArchive {
    pub fn new(client: tokio_postgres::Client, table: String) -> Self {
        PostgresAlertArchive { client, table }
    }
}

#[async_trait]
impl AlertArchive for PostgresAlertArchive {
    async fn log_alert(&self, rows: &[CdrRow]) -> Result<i64, StoreError> {
        let max_query = format!("select coalesce(max(alert_id), 0) + 1 from {}", self.table);
        let max_row = self.client.query_one(&max_query, &[]).await.map_err(StoreError::from)?;
        let alert_id: i64 = max_row.get(0);

        // Every row in one alert batch shares the same institution by
        // construction (the aggregate query filters on a single
        // accountcode) — read it once rather than per row.
        let accountcode = rows.first().map(|r| r.accountcode.as_str()).unwrap_or_default();

        let insert = format!(
            "insert into {}(alert_id, cdr_id, calldate, src, dst, billsec, calltype, accountcode) \
             values ($1, $2, $3, $4, $5, $6, $7, $8)",
            self.table
        );
        for row in rows {
            self.client
                .execute(
                    &insert,
                    &[
                        &alert_id,
                        &row.id,
                        &row.calldate,
                        &row.src,
                        &row.dst,
                        &row.billsec,
                        &row.calltype,
                        &accountcode,
                    ],
                )
                .await
                .map_err(StoreError::from)?;
        }
        Ok(alert_id)
    }
}

/// Status-line sink: syslog and/or a file consumed by an external monitoring
/// agent. OK lines are suppressed when the
/// sink is syslog-only, matching the source's behavior.
pub trait AlertSink: Send + Sync {
    fn notify(&self, status: AlertStatus, ts: NaiveDateTime, institution: &str, alert_id: Option<i64>);
}

pub struct FileAlertSink {
    file: Mutex<std::fs::File>,
}

impl FileAlertSink {
    pub fn open(path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(FileAlertSink { file: Mutex::new(file) })
    }

    fn format_line(status: AlertStatus, ts: NaiveDateTime, institution: &str, alert_id: Option<i64>) -> String {
        let ts = ts.format("%Y-%m-%d %H:%M:%S");
        match status {
            AlertStatus::Alert => format!(
                "[{ts}]    FATAL  {institution}  {}\n",
                alert_id.expect("alert status always carries an alert_id")
            ),
            AlertStatus::Ok => format!("[{ts}]    OK     {institution}\n"),
        }
    }
}

impl AlertSink for FileAlertSink {
    fn notify(&self, status: AlertStatus, ts: NaiveDateTime, institution: &str, alert_id: Option<i64>) {
        let line = Self::format_line(status, ts, institution, alert_id);
        if let Ok(mut file) = self.file.lock() {
            let _ = file.write_all(line.as_bytes());
        }
    }
}

pub struct SyslogAlertSink {
    writer: Mutex<syslog::Logger<syslog::LoggerBackend, syslog::Formatter3164>>,
}

impl SyslogAlertSink {
    pub fn new() -> Result<Self, syslog::Error> {
        let formatter = syslog::Formatter3164 {
            facility: syslog::Facility::LOG_USER,
            hostname: None,
            process: "sipguardd".into(),
            pid: std::process::id(),
        };
        let writer = syslog::unix(formatter)?;
        Ok(SyslogAlertSink { writer: Mutex::new(writer) })
    }
}

impl AlertSink for SyslogAlertSink {
    fn notify(&self, status: AlertStatus, ts: NaiveDateTime, institution: &str, alert_id: Option<i64>) {
        // syslog target suppresses OK lines by design.
        if status == AlertStatus::Ok {
            return;
        }
        let line = FileAlertSink::format_line(status, ts, institution, alert_id);
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writer.crit(line);
        }
    }
}

/// `alert-mode: both` — fan out to every configured sink.
pub struct CompositeAlertSink {
    pub sinks: Vec<Box<dyn AlertSink>>,
}

impl AlertSink for CompositeAlertSink {
    fn notify(&self, status: AlertStatus, ts: NaiveDateTime, institution: &str, alert_id: Option<i64>) {
        for sink in &self.sinks {
            sink.notify(status, ts, institution, alert_id);
        }
    }
}

impl AlertSink for Box<dyn AlertSink> {
    fn notify(&self, status: AlertStatus, ts: NaiveDateTime, institution: &str, alert_id: Option<i64>) {
        (**self).notify(status, ts, institution, alert_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap().and_hms_opt(10, 30, 0).unwrap()
    }

    #[test]
    fn alert_line_format_matches_source() {
        let line = FileAlertSink::format_line(AlertStatus::Alert, ts(), "uninett", Some(42));
        assert_eq!(line, "[2024-01-15 10:30:00]    FATAL  uninett  42\n");
    }

    #[test]
    fn ok_line_format_matches_source() {
        let line = FileAlertSink::format_line(AlertStatus::Ok, ts(), "uninett", None);
        assert_eq!(line, "[2024-01-15 10:30:00]    OK     uninett\n");
    }

    #[test]
    fn file_sink_appends_lines() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("sipguard-test-{}.log", std::process::id()));
        let path_str = path.to_str().unwrap();
        {
            let sink = FileAlertSink::open(path_str).unwrap();
            sink.notify(AlertStatus::Alert, ts(), "uninett", Some(1));
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("FATAL  uninett  1"));
        let _ = std::fs::remove_file(path);
    }
}
