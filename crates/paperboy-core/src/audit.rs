use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde::Serialize;

use crate::{domain::Requester, errors::Error, Result};

const AUDIT_MAX_TEXT: usize = 500;

/// RFC3339 timestamp in UTC.
pub fn iso_timestamp_utc() -> String {
    Utc::now().to_rfc3339()
}

#[derive(Clone, Debug, Serialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub event: String,
    pub user_id: i64,
    pub username: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub printer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl AuditEvent {
    fn base(event: &str, user: &Requester) -> Self {
        Self {
            timestamp: iso_timestamp_utc(),
            event: event.to_string(),
            user_id: user.id.0,
            username: user.username_or_unknown().to_string(),
            document: None,
            mime_type: None,
            bytes: None,
            printer: None,
            job_name: None,
            job_id: None,
            error: None,
            context: None,
        }
    }

    pub fn print_request(user: &Requester, document: &str, mime_type: &str, bytes: usize) -> Self {
        Self {
            document: Some(document.to_string()),
            mime_type: Some(mime_type.to_string()),
            bytes: Some(bytes),
            ..Self::base("print_request", user)
        }
    }

    pub fn print_job(user: &Requester, printer: &str, job_name: &str, job_id: i32) -> Self {
        Self {
            printer: Some(printer.to_string()),
            job_name: Some(job_name.to_string()),
            job_id: Some(job_id),
            ..Self::base("print_job", user)
        }
    }

    pub fn error(user: &Requester, error: &str, context: Option<&str>) -> Self {
        Self {
            error: Some(error.to_string()),
            context: context.map(|s| s.to_string()),
            ..Self::base("error", user)
        }
    }
}

/// Append-only audit log; a logger without a path discards events.
#[derive(Clone, Debug)]
pub struct AuditLogger {
    path: Option<PathBuf>,
    json: bool,
}

impl AuditLogger {
    pub fn new(path: Option<PathBuf>, json: bool) -> Self {
        Self { path, json }
    }

    pub fn disabled() -> Self {
        Self::new(None, false)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn write(&self, mut event: AuditEvent) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(s) = &event.error {
            event.error = Some(truncate_text(s, AUDIT_MAX_TEXT));
        }
        if let Some(s) = &event.document {
            event.document = Some(truncate_text(s, AUDIT_MAX_TEXT));
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        if self.json {
            let line = serde_json::to_string(&event)?;
            writeln!(file, "{line}")?;
            return Ok(());
        }

        // Plain text format for readability.
        let mut out = String::new();
        out.push('\n');
        out.push_str(&"=".repeat(60));

        let value = serde_json::to_value(&event)?;
        let Some(obj) = value.as_object() else {
            return Err(Error::External(
                "audit event is not a JSON object".to_string(),
            ));
        };
        for (k, v) in obj {
            out.push('\n');
            out.push_str(k);
            out.push_str(": ");
            out.push_str(&json_value_to_display(v));
        }
        out.push('\n');

        file.write_all(out.as_bytes())?;
        Ok(())
    }
}

pub fn truncate_text(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let mut out = s.chars().take(max_len).collect::<String>();
    out.push_str("...");
    out
}

fn json_value_to_display(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::UserId;

    fn tmp_file(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_nanos();
        let pid = std::process::id();
        PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}.log"))
    }

    fn alice() -> Requester {
        Requester {
            id: UserId(7),
            username: Some("alice".to_string()),
        }
    }

    #[test]
    fn truncate_text_adds_ellipsis() {
        let s = "a".repeat(AUDIT_MAX_TEXT + 10);
        let t = truncate_text(&s, AUDIT_MAX_TEXT);
        assert!(t.ends_with("..."));
        assert_eq!(t.chars().count(), AUDIT_MAX_TEXT + 3);
    }

    #[test]
    fn json_lines_include_job_fields() {
        let log = AuditLogger::new(Some(tmp_file("paperboy-audit-json")), true);
        log.write(AuditEvent::print_job(&alice(), "Apathy", "notes.txt_alice_7", 42))
            .unwrap();

        let written = std::fs::read_to_string(log.path().unwrap()).unwrap();
        let v: serde_json::Value = serde_json::from_str(written.trim()).unwrap();
        assert_eq!(v["event"], "print_job");
        assert_eq!(v["job_id"], 42);
        assert_eq!(v["printer"], "Apathy");
        assert!(v.get("error").is_none());
        let _ = std::fs::remove_file(log.path().unwrap());
    }

    #[test]
    fn plain_format_truncates_errors() {
        let log = AuditLogger::new(Some(tmp_file("paperboy-audit-plain")), false);
        let long = "z".repeat(AUDIT_MAX_TEXT + 50);
        log.write(AuditEvent::error(&alice(), &long, Some("selection")))
            .unwrap();

        let written = std::fs::read_to_string(log.path().unwrap()).unwrap();
        assert!(written.contains("event: error"));
        assert!(written.contains("context: selection"));
        assert!(written.contains("..."));
        let _ = std::fs::remove_file(log.path().unwrap());
    }

    #[test]
    fn disabled_logger_discards_events() {
        let log = AuditLogger::disabled();
        assert!(log
            .write(AuditEvent::print_request(&alice(), "a.pdf", "application/pdf", 3))
            .is_ok());
        assert!(log.path().is_none());
    }
}
