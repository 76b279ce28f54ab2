use async_trait::async_trait;

use crate::{domain::JobId, printer::Printer};

/// A spooler-side failure, carrying the spooler's own diagnostic string.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct SpoolerFault(pub String);

impl SpoolerFault {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

pub type SpoolResult<T> = std::result::Result<T, SpoolerFault>;

/// Port for the print spooler (CUPS over IPP in production).
#[async_trait]
pub trait PrintSpooler: Send + Sync {
    /// Query the live printer table.
    async fn list_printers(&self) -> SpoolResult<Vec<Printer>>;

    /// Open a fresh session for a single job submission.
    async fn open_session(&self) -> SpoolResult<Box<dyn SpoolSession>>;
}

/// One job's conversation with the spooler.
///
/// Callers drive the steps strictly in order; each is attempted once.
#[async_trait]
pub trait SpoolSession: Send {
    /// Register a new job on `printer` titled `title`.
    async fn create_job(
        &mut self,
        printer: &str,
        title: &str,
        copies: u32,
    ) -> SpoolResult<JobId>;

    /// Announce a document of type `mime_type` for `job`; the data follows.
    async fn start_document(
        &mut self,
        printer: &str,
        job: JobId,
        document_name: &str,
        mime_type: &str,
    ) -> SpoolResult<()>;

    /// Stream document bytes.
    async fn write_data(&mut self, data: &[u8]) -> SpoolResult<()>;

    /// Close the document and wait for the spooler's final status.
    async fn finish_document(&mut self, printer: &str) -> SpoolResult<()>;
}
