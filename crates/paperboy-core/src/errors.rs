/// Infrastructure error type shared by all crates.
///
/// Adapter crates map their specific errors into this type. Failures of the print
/// interaction itself are modelled separately by [`PrintError`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why a print interaction was abandoned.
///
/// Spooler diagnostics are carried verbatim in the string payloads.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PrintError {
    #[error("no printable media found")]
    NoMediaFound,

    #[error("file is too large to print ({size} bytes, limit is {limit} bytes)")]
    MediaTooLarge { size: u64, limit: u64 },

    #[error("failed to download file: {0}")]
    MediaDownloadFailed(String),

    #[error("{0}")]
    PrinterQueryFailed(String),

    #[error("Failed to create job: {0}")]
    JobCreationFailed(String),

    #[error("Failed to start document: {0}")]
    DocumentStartFailed(String),

    #[error("Failed to write request data: {0}")]
    DataWriteFailed(String),

    #[error("Failed to finish document: {0}")]
    DocumentFinishFailed(String),

    #[error("no printer selected")]
    NoPrinterSelected,

    #[error("this print request has expired")]
    RequestExpired,
}

impl PrintError {
    /// Text shown to the user when the interaction is abandoned.
    ///
    /// `None` means the interaction is dropped without a reply.
    pub fn user_message(&self) -> Option<String> {
        match self {
            PrintError::NoMediaFound => None,
            PrintError::PrinterQueryFailed(reason) => {
                Some(format!("Failed to fetch printers: {reason}"))
            }
            other => Some(format!("Failed to print document: {other}")),
        }
    }

    /// Which handshake step failed, for logs.
    pub fn step(&self) -> Option<&'static str> {
        match self {
            PrintError::JobCreationFailed(_) => Some("create_job"),
            PrintError::DocumentStartFailed(_) => Some("start_document"),
            PrintError::DataWriteFailed(_) => Some("write_data"),
            PrintError::DocumentFinishFailed(_) => Some("finish_document"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_media_is_silent() {
        assert_eq!(PrintError::NoMediaFound.user_message(), None);
    }

    #[test]
    fn spooler_reason_is_reported_verbatim() {
        let err =
            PrintError::DocumentFinishFailed("client-error-document-format-not-supported".into());
        assert_eq!(
            err.user_message().unwrap(),
            "Failed to print document: Failed to finish document: client-error-document-format-not-supported"
        );
        assert_eq!(err.step(), Some("finish_document"));
    }

    #[test]
    fn printer_query_failure_uses_generic_prefix() {
        let err = PrintError::PrinterQueryFailed("connection refused".into());
        assert_eq!(
            err.user_message().unwrap(),
            "Failed to fetch printers: connection refused"
        );
    }
}
