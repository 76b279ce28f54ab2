//! CUPS adapter (IPP over HTTP).
//!
//! Implements the `paperboy-core` spooler port. The printer directory comes from
//! `CUPS-Get-Printers`; a job is a `Create-Job` followed by one streamed
//! `Send-Document` whose body is fed while the request is in flight.

use std::time::Duration;

use async_trait::async_trait;
use ipp::{error::IppError, model::JobState, prelude::*};
use tokio::{
    io::{AsyncWriteExt, DuplexStream},
    task::JoinHandle,
};
use tokio_util::compat::TokioAsyncReadCompatExt;
use tracing::debug;

use paperboy_core::{
    domain::JobId,
    errors::Error,
    printer::Printer,
    spooler::{PrintSpooler, SpoolResult, SpoolSession, SpoolerFault},
    Result,
};

const UPLOAD_BUFFER: usize = 64 * 1024;

/// Spooler target and request settings, threaded in from config.
#[derive(Clone, Debug)]
pub struct IppSpooler {
    base: String,
    user: String,
    timeout: Duration,
}

impl IppSpooler {
    /// `server` is `host[:port]` or an `ipp://`, `ipps://` or `http://` URI.
    pub fn new(server: &str, user: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base = normalize_server(server)?;
        // Fail at startup rather than on the first print request.
        base.parse::<Uri>()
            .map_err(|e| Error::Config(format!("invalid CUPS_SERVER {server:?}: {e}")))?;
        Ok(Self {
            base,
            user: user.into(),
            timeout,
        })
    }

    pub fn base_uri(&self) -> &str {
        &self.base
    }

    fn root_uri(&self) -> SpoolResult<Uri> {
        parse_uri(&format!("{}/", self.base))
    }

    fn printer_uri(&self, printer: &str) -> SpoolResult<Uri> {
        if printer.is_empty()
            || printer.contains(['/', '?', '#'])
            || printer.contains(char::is_whitespace)
        {
            return Err(SpoolerFault::new(format!("invalid printer name {printer:?}")));
        }
        parse_uri(&format!("{}/printers/{printer}", self.base))
    }

    fn request(&self, operation: Operation, uri: Option<Uri>) -> IppRequestResponse {
        let mut req = IppRequestResponse::new(IppVersion::v1_1(), operation, uri);
        req.attributes_mut().add(
            DelimiterTag::OperationAttributes,
            IppAttribute::new(
                "requesting-user-name",
                IppValue::NameWithoutLanguage(self.user.clone()),
            ),
        );
        req
    }

    async fn send(&self, uri: Uri, req: IppRequestResponse) -> SpoolResult<IppRequestResponse> {
        let client = AsyncIppClient::new(uri);
        match tokio::time::timeout(self.timeout, client.send(req)).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(e)) => Err(SpoolerFault::new(e.to_string())),
            Err(_) => Err(SpoolerFault::new(format!(
                "spooler did not answer within {}s",
                self.timeout.as_secs()
            ))),
        }
    }
}

#[async_trait]
impl PrintSpooler for IppSpooler {
    async fn list_printers(&self) -> SpoolResult<Vec<Printer>> {
        let mut req = self.request(Operation::CupsGetPrinters, None);
        req.attributes_mut().add(
            DelimiterTag::OperationAttributes,
            IppAttribute::new(
                "requested-attributes",
                IppValue::Array(vec![
                    IppValue::Keyword("printer-name".to_string()),
                    IppValue::Keyword("printer-location".to_string()),
                ]),
            ),
        );

        let resp = self.send(self.root_uri()?, req).await?;
        ensure_success(&resp)?;

        let printers = printers_from(resp.attributes());
        debug!(count = printers.len(), server = %self.base, "queried printer directory");
        Ok(printers)
    }

    async fn open_session(&self) -> SpoolResult<Box<dyn SpoolSession>> {
        Ok(Box::new(IppSession {
            spooler: self.clone(),
            upload: None,
        }))
    }
}

/// A `Send-Document` request whose body is still being written.
///
/// Dropping it aborts the request.
struct Upload {
    body: Option<DuplexStream>,
    response: JoinHandle<std::result::Result<IppRequestResponse, IppError>>,
}

impl Upload {
    /// Signal end of document to the request body.
    async fn close_body(&mut self) {
        if let Some(mut body) = self.body.take() {
            if let Err(e) = body.shutdown().await {
                debug!(error = %e, "closing document body failed");
            }
        }
    }

    /// Wait for the spooler's answer; `None` when it does not come in time.
    async fn response(&mut self, timeout: Duration) -> Option<SpoolResult<IppRequestResponse>> {
        match tokio::time::timeout(timeout, &mut self.response).await {
            Ok(Ok(Ok(resp))) => Some(Ok(resp)),
            Ok(Ok(Err(e))) => Some(Err(SpoolerFault::new(e.to_string()))),
            Ok(Err(e)) => Some(Err(SpoolerFault::new(format!("upload task failed: {e}")))),
            Err(_) => {
                self.response.abort();
                None
            }
        }
    }
}

impl Drop for Upload {
    fn drop(&mut self) {
        self.response.abort();
    }
}

pub struct IppSession {
    spooler: IppSpooler,
    upload: Option<Upload>,
}

impl IppSession {
    /// The job must exist and still accept documents.
    async fn check_job_open(&self, printer: &str, job: JobId) -> SpoolResult<()> {
        let uri = self.spooler.printer_uri(printer)?;
        let mut req = self
            .spooler
            .request(Operation::GetJobAttributes, Some(uri.clone()));
        let attrs = req.attributes_mut();
        attrs.add(
            DelimiterTag::OperationAttributes,
            IppAttribute::new("job-id", IppValue::Integer(job.0)),
        );
        attrs.add(
            DelimiterTag::OperationAttributes,
            IppAttribute::new(
                "requested-attributes",
                IppValue::Keyword("job-state".to_string()),
            ),
        );

        let resp = self.spooler.send(uri, req).await?;
        ensure_success(&resp)?;

        match job_state(resp.attributes()) {
            Some(JobState::Canceled) => Err(SpoolerFault::new(format!("job {job} was canceled"))),
            Some(JobState::Aborted) => Err(SpoolerFault::new(format!("job {job} was aborted"))),
            Some(JobState::Completed) => {
                Err(SpoolerFault::new(format!("job {job} is already completed")))
            }
            _ => Ok(()),
        }
    }

    /// The reason a body write failed, preferring the spooler's own answer.
    async fn upload_failure(
        mut upload: Upload,
        timeout: Duration,
        failure: String,
    ) -> SpoolerFault {
        upload.close_body().await;
        match upload.response(timeout).await {
            Some(Ok(resp)) => ensure_ok(&resp)
                .err()
                .unwrap_or_else(|| SpoolerFault::new(failure)),
            Some(Err(fault)) => fault,
            None => SpoolerFault::new(failure),
        }
    }
}

#[async_trait]
impl SpoolSession for IppSession {
    async fn create_job(
        &mut self,
        printer: &str,
        title: &str,
        copies: u32,
    ) -> SpoolResult<JobId> {
        let uri = self.spooler.printer_uri(printer)?;
        let mut req = self.spooler.request(Operation::CreateJob, Some(uri.clone()));
        let attrs = req.attributes_mut();
        attrs.add(
            DelimiterTag::OperationAttributes,
            IppAttribute::new("job-name", IppValue::NameWithoutLanguage(title.to_string())),
        );
        if copies > 1 {
            attrs.add(
                DelimiterTag::JobAttributes,
                IppAttribute::new("copies", IppValue::Integer(copies as i32)),
            );
        }

        let resp = self.spooler.send(uri, req).await?;
        ensure_success(&resp)?;

        job_id(resp.attributes())
            .map(JobId)
            .ok_or_else(|| SpoolerFault::new("spooler returned no job-id"))
    }

    async fn start_document(
        &mut self,
        printer: &str,
        job: JobId,
        document_name: &str,
        mime_type: &str,
    ) -> SpoolResult<()> {
        if self.upload.is_some() {
            return Err(SpoolerFault::new("a document is already in progress"));
        }
        self.check_job_open(printer, job).await?;

        let uri = self.spooler.printer_uri(printer)?;
        let mut req = self
            .spooler
            .request(Operation::SendDocument, Some(uri.clone()));
        let attrs = req.attributes_mut();
        attrs.add(
            DelimiterTag::OperationAttributes,
            IppAttribute::new("job-id", IppValue::Integer(job.0)),
        );
        attrs.add(
            DelimiterTag::OperationAttributes,
            IppAttribute::new(
                "document-name",
                IppValue::NameWithoutLanguage(document_name.to_string()),
            ),
        );
        attrs.add(
            DelimiterTag::OperationAttributes,
            IppAttribute::new(
                "document-format",
                IppValue::MimeMediaType(mime_type.to_string()),
            ),
        );
        attrs.add(
            DelimiterTag::OperationAttributes,
            IppAttribute::new("last-document", IppValue::Boolean(true)),
        );

        let (body, pipe) = tokio::io::duplex(UPLOAD_BUFFER);
        *req.payload_mut() = IppPayload::new_async(pipe.compat());

        let client = AsyncIppClient::new(uri);
        let response = tokio::spawn(async move { client.send(req).await });
        self.upload = Some(Upload {
            body: Some(body),
            response,
        });
        Ok(())
    }

    async fn write_data(&mut self, data: &[u8]) -> SpoolResult<()> {
        let Some(body) = self.upload.as_mut().and_then(|u| u.body.as_mut()) else {
            return Err(SpoolerFault::new("no document has been started"));
        };

        let timeout = self.spooler.timeout;
        let failure = match tokio::time::timeout(timeout, body.write_all(data)).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("spooler stopped reading within {}s", timeout.as_secs()),
        };

        // The request ended early; its own error explains more than a broken pipe.
        match self.upload.take() {
            Some(upload) => Err(Self::upload_failure(upload, timeout, failure).await),
            None => Err(SpoolerFault::new(failure)),
        }
    }

    async fn finish_document(&mut self, _printer: &str) -> SpoolResult<()> {
        let Some(mut upload) = self.upload.take() else {
            return Err(SpoolerFault::new("no document has been started"));
        };

        upload.close_body().await;
        match upload.response(self.spooler.timeout).await {
            Some(resp) => ensure_ok(&resp?),
            None => Err(SpoolerFault::new(format!(
                "spooler did not answer within {}s",
                self.spooler.timeout.as_secs()
            ))),
        }
    }
}

/// Turn `CUPS_SERVER` into a base URI without a trailing slash.
fn normalize_server(server: &str) -> Result<String> {
    let s = server.trim().trim_end_matches('/');
    if s.is_empty() {
        return Err(Error::Config("CUPS_SERVER is empty".to_string()));
    }
    if s.starts_with('/') {
        return Err(Error::Config(format!(
            "CUPS_SERVER {s:?} looks like a domain socket; only network servers are supported"
        )));
    }
    if s.contains("://") {
        return Ok(s.to_string());
    }
    if s.contains(':') {
        return Ok(format!("ipp://{s}"));
    }
    Ok(format!("ipp://{s}:631"))
}

fn parse_uri(s: &str) -> SpoolResult<Uri> {
    s.parse::<Uri>()
        .map_err(|e| SpoolerFault::new(format!("invalid spooler uri {s:?}: {e}")))
}

/// Any successful status.
fn ensure_success(resp: &IppRequestResponse) -> SpoolResult<()> {
    let status = resp.header().status_code();
    if status.is_success() {
        return Ok(());
    }
    Err(status_fault(resp, status))
}

/// Strictly `successful-ok`.
fn ensure_ok(resp: &IppRequestResponse) -> SpoolResult<()> {
    let status = resp.header().status_code();
    if matches!(status, StatusCode::SuccessfulOk) {
        return Ok(());
    }
    Err(status_fault(resp, status))
}

fn status_fault(resp: &IppRequestResponse, status: StatusCode) -> SpoolerFault {
    let keyword = status_keyword(&format!("{status:?}"));
    match status_message(resp.attributes()) {
        Some(msg) => SpoolerFault::new(format!("{keyword}: {msg}")),
        None => SpoolerFault::new(keyword),
    }
}

/// `ClientErrorNotFound` -> `client-error-not-found`.
fn status_keyword(variant: &str) -> String {
    let mut out = String::with_capacity(variant.len() + 8);
    for (i, ch) in variant.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

fn status_message(attrs: &IppAttributes) -> Option<String> {
    attr_in(attrs, DelimiterTag::OperationAttributes, "status-message")
        .map(|v| v.to_string())
        .filter(|s| !s.trim().is_empty())
}

fn job_id(attrs: &IppAttributes) -> Option<i32> {
    match attr_in(attrs, DelimiterTag::JobAttributes, "job-id")? {
        IppValue::Integer(id) => Some(*id),
        _ => None,
    }
}

fn job_state(attrs: &IppAttributes) -> Option<JobState> {
    match attr_in(attrs, DelimiterTag::JobAttributes, "job-state")? {
        IppValue::Enum(state) => JobState::from_i32(*state),
        _ => None,
    }
}

fn attr_in<'a>(attrs: &'a IppAttributes, tag: DelimiterTag, name: &str) -> Option<&'a IppValue> {
    for group in attrs.groups_of(tag) {
        if let Some(attr) = group.attributes().get(name) {
            return Some(attr.value());
        }
    }
    None
}

/// One printer per printer-attributes group, in spooler order.
fn printers_from(attrs: &IppAttributes) -> Vec<Printer> {
    let mut out = Vec::new();
    for group in attrs.groups_of(DelimiterTag::PrinterAttributes) {
        let fields = group.attributes();
        let Some(name) = fields.get("printer-name").map(|a| a.value().to_string()) else {
            continue;
        };
        let location = fields
            .get("printer-location")
            .map(|a| a.value().to_string())
            .unwrap_or_default();
        out.push(Printer::new(name, location));
    }
    out
}
