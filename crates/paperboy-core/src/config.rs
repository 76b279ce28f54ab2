use std::{env, fs, path::Path, path::PathBuf, time::Duration};

use crate::{errors::Error, printer::PrinterAliases, Result};

const DEFAULT_CUPS_SERVER: &str = "localhost:631";
const DEFAULT_PRINTER_ALIASES: &str = "Love=😍,Hope=😊,Joy=😄,Peace=🙂,Apathy=😶";

/// Typed configuration, read from the environment (and `.env` if present).
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub button_label_max_length: usize,

    // Print spooler
    pub cups_server: String,
    pub cups_user: String,
    pub ipp_timeout: Duration,
    pub printer_aliases: PrinterAliases,

    // Media
    pub max_document_bytes: u64,
    pub max_reply_depth: usize,

    // Pending selections
    pub pending_request_ttl: Duration,
    pub pending_request_capacity: usize,

    // Audit
    pub audit_log_path: Option<PathBuf>,
    pub audit_log_json: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).and_then(non_empty);

        let telegram_bot_token = var("TELEGRAM_BOT_TOKEN")
            .or_else(|| var("TG_TOKEN"))
            .ok_or_else(|| {
                Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
            })?;
        let button_label_max_length = parse_usize(var("BUTTON_LABEL_MAX_LENGTH")).unwrap_or(48);

        let cups_server = var("CUPS_SERVER").unwrap_or_else(|| DEFAULT_CUPS_SERVER.to_string());
        let cups_user = var("CUPS_USER").unwrap_or_else(|| "paperboy".to_string());
        let ipp_timeout = Duration::from_secs(parse_u64(var("IPP_TIMEOUT_SECS")).unwrap_or(30));
        let printer_aliases = PrinterAliases::parse(
            &var("PRINTER_ALIASES").unwrap_or_else(|| DEFAULT_PRINTER_ALIASES.to_string()),
        );

        // Telegram bots cannot download files above 20MB anyway.
        let max_document_bytes =
            parse_u64(var("MAX_DOCUMENT_BYTES")).unwrap_or(20 * 1024 * 1024);
        let max_reply_depth = parse_usize(var("MAX_REPLY_DEPTH")).unwrap_or(8);

        let pending_request_ttl =
            Duration::from_secs(parse_u64(var("PENDING_REQUEST_TTL_SECS")).unwrap_or(3600));
        let pending_request_capacity =
            parse_usize(var("PENDING_REQUEST_CAPACITY")).unwrap_or(256).max(1);

        let audit_log_path = var("AUDIT_LOG_PATH").map(PathBuf::from);
        let audit_log_json = parse_bool(var("AUDIT_LOG_JSON")).unwrap_or(false);

        Ok(Self {
            telegram_bot_token,
            button_label_max_length,
            cups_server,
            cups_user,
            ipp_timeout,
            printer_aliases,
            max_document_bytes,
            max_reply_depth,
            pending_request_ttl,
            pending_request_capacity,
            audit_log_path,
            audit_log_json,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, unquote(v.trim()));
    }
}

fn unquote(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return &val[1..val.len() - 1];
    }
    val
}

fn parse_bool(v: Option<String>) -> Option<bool> {
    v.map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn parse_u64(v: Option<String>) -> Option<u64> {
    v.and_then(|s| s.trim().parse::<u64>().ok())
}

fn parse_usize(v: Option<String>) -> Option<usize> {
    v.and_then(|s| s.trim().parse::<usize>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn token_is_required() {
        let err = Config::from_lookup(lookup(&[("CUPS_SERVER", "cups:631")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn legacy_token_name_is_accepted() {
        let cfg = Config::from_lookup(lookup(&[("TG_TOKEN", "abc")])).unwrap();
        assert_eq!(cfg.telegram_bot_token, "abc");
    }

    #[test]
    fn defaults_apply() {
        let cfg = Config::from_lookup(lookup(&[("TELEGRAM_BOT_TOKEN", "abc")])).unwrap();
        assert_eq!(cfg.cups_server, "localhost:631");
        assert_eq!(cfg.ipp_timeout, Duration::from_secs(30));
        assert_eq!(cfg.max_reply_depth, 8);
        assert_eq!(cfg.pending_request_capacity, 256);
        assert!(cfg.audit_log_path.is_none());
        assert_eq!(cfg.printer_aliases.get("Apathy"), Some("😶"));
    }

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        let cfg = Config::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "abc"),
            ("MAX_REPLY_DEPTH", "lots"),
            ("PENDING_REQUEST_CAPACITY", "0"),
            ("AUDIT_LOG_JSON", "yes"),
        ]))
        .unwrap();
        assert_eq!(cfg.max_reply_depth, 8);
        assert_eq!(cfg.pending_request_capacity, 1);
        assert!(cfg.audit_log_json);
    }

    #[test]
    fn unquote_strips_matching_quotes_only() {
        assert_eq!(unquote("\"a b\""), "a b");
        assert_eq!(unquote("'x'"), "x");
        assert_eq!(unquote("\"x'"), "\"x'");
    }
}
