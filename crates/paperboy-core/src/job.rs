//! Print jobs and the four-step submission handshake.

use tracing::{info, warn};

use crate::{
    domain::{JobId, Requester},
    errors::PrintError,
    media::Media,
    printer::Printer,
    spooler::{PrintSpooler, SpoolSession},
};

/// Deterministic job title: `<media name>_<username>_<user id>`.
pub fn format_job_name(media: &Media, user: &Requester) -> String {
    format!(
        "{}_{}_{}",
        media.name,
        user.username_or_unknown(),
        user.id.0
    )
}

/// A job waiting for the user to pick a printer.
#[derive(Clone, Debug)]
pub struct PendingJob {
    pub media: Media,
    pub name: String,
    pub copies: u32,
}

impl PendingJob {
    pub fn new(media: Media, name: impl Into<String>) -> Self {
        Self {
            media,
            name: name.into(),
            copies: 1,
        }
    }

    pub fn bind(self, printer: Printer) -> ReadyJob {
        ReadyJob {
            printer,
            media: self.media,
            name: self.name,
            copies: self.copies,
        }
    }
}

/// A job with a printer bound; the only shape that can be submitted.
#[derive(Clone, Debug)]
pub struct ReadyJob {
    pub printer: Printer,
    pub media: Media,
    pub name: String,
    pub copies: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmissionState {
    Idle,
    JobCreated(JobId),
    DocumentStarted(JobId),
    DataWritten(JobId),
    Finished(JobId),
    Failed(PrintError),
}

impl SubmissionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionState::Finished(_) | SubmissionState::Failed(_))
    }
}

/// Drives one [`ReadyJob`] through the spooler handshake.
///
/// Every step runs at most once and a failure is terminal; a job that fails after
/// creation may already be partially spooled and is left as is.
pub struct Submission<'a> {
    job: &'a ReadyJob,
    session: Box<dyn SpoolSession>,
    state: SubmissionState,
}

impl<'a> Submission<'a> {
    pub fn new(job: &'a ReadyJob, session: Box<dyn SpoolSession>) -> Self {
        Self {
            job,
            session,
            state: SubmissionState::Idle,
        }
    }

    pub fn state(&self) -> &SubmissionState {
        &self.state
    }

    /// Run the next step. Terminal states are returned unchanged.
    pub async fn step(&mut self) -> &SubmissionState {
        let printer = self.job.printer.name.as_str();
        let next = match self.state {
            SubmissionState::Idle => {
                match self
                    .session
                    .create_job(printer, &self.job.name, self.job.copies)
                    .await
                {
                    Ok(id) if id.0 > 0 => SubmissionState::JobCreated(id),
                    Ok(id) => SubmissionState::Failed(PrintError::JobCreationFailed(format!(
                        "spooler returned invalid job id {id}"
                    ))),
                    Err(fault) => SubmissionState::Failed(PrintError::JobCreationFailed(fault.0)),
                }
            }
            SubmissionState::JobCreated(id) => {
                match self
                    .session
                    .start_document(printer, id, &self.job.name, &self.job.media.mime_type)
                    .await
                {
                    Ok(()) => SubmissionState::DocumentStarted(id),
                    Err(fault) => {
                        SubmissionState::Failed(PrintError::DocumentStartFailed(fault.0))
                    }
                }
            }
            SubmissionState::DocumentStarted(id) => {
                match self.session.write_data(&self.job.media.data).await {
                    Ok(()) => SubmissionState::DataWritten(id),
                    Err(fault) => SubmissionState::Failed(PrintError::DataWriteFailed(fault.0)),
                }
            }
            SubmissionState::DataWritten(id) => {
                match self.session.finish_document(printer).await {
                    Ok(()) => SubmissionState::Finished(id),
                    Err(fault) => {
                        SubmissionState::Failed(PrintError::DocumentFinishFailed(fault.0))
                    }
                }
            }
            SubmissionState::Finished(_) | SubmissionState::Failed(_) => return &self.state,
        };

        if let SubmissionState::Failed(err) = &next {
            warn!(
                printer,
                job_name = %self.job.name,
                step = err.step().unwrap_or("unknown"),
                reason = %err,
                "print submission failed"
            );
        }
        self.state = next;
        &self.state
    }

    /// Run every remaining step.
    pub async fn run(mut self) -> Result<JobId, PrintError> {
        while !self.state.is_terminal() {
            self.step().await;
        }
        match self.state {
            SubmissionState::Finished(id) => Ok(id),
            SubmissionState::Failed(err) => Err(err),
            _ => Err(PrintError::JobCreationFailed(
                "submission stopped before completion".to_string(),
            )),
        }
    }
}

/// Submit `job` on a fresh spooler session and return the spooler's job id.
pub async fn create_job(spooler: &dyn PrintSpooler, job: ReadyJob) -> Result<JobId, PrintError> {
    let session = spooler
        .open_session()
        .await
        .map_err(|fault| PrintError::JobCreationFailed(fault.0))?;

    let id = Submission::new(&job, session).run().await?;
    info!(
        job_id = id.0,
        printer = %job.printer.name,
        job_name = %job.name,
        bytes = job.media.data.len(),
        "print job submitted"
    );
    Ok(id)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::{
        domain::UserId,
        spooler::{SpoolResult, SpoolerFault},
    };

    /// Scripted spooler: records calls and fails at the configured step.
    #[derive(Clone, Default)]
    pub(crate) struct FakeSpooler {
        pub printers: Vec<Printer>,
        pub list_error: Option<String>,
        pub job_id: i32,
        pub fail_at: Option<&'static str>,
        pub calls: Arc<Mutex<Vec<String>>>,
        pub written: Arc<Mutex<Vec<u8>>>,
    }

    impl FakeSpooler {
        pub(crate) fn with_job_id(job_id: i32) -> Self {
            Self {
                job_id,
                ..Default::default()
            }
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    struct FakeSession(FakeSpooler);

    impl FakeSession {
        fn record(&self, step: &'static str) -> SpoolResult<()> {
            self.0.calls.lock().unwrap().push(step.to_string());
            if self.0.fail_at == Some(step) {
                return Err(SpoolerFault::new(format!("{step} refused")));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl SpoolSession for FakeSession {
        async fn create_job(
            &mut self,
            _printer: &str,
            _title: &str,
            _copies: u32,
        ) -> SpoolResult<JobId> {
            self.record("create_job")?;
            Ok(JobId(self.0.job_id))
        }

        async fn start_document(
            &mut self,
            _printer: &str,
            _job: JobId,
            _document_name: &str,
            _mime_type: &str,
        ) -> SpoolResult<()> {
            self.record("start_document")
        }

        async fn write_data(&mut self, data: &[u8]) -> SpoolResult<()> {
            self.record("write_data")?;
            self.0.written.lock().unwrap().extend_from_slice(data);
            Ok(())
        }

        async fn finish_document(&mut self, _printer: &str) -> SpoolResult<()> {
            self.record("finish_document")
        }
    }

    #[async_trait]
    impl PrintSpooler for FakeSpooler {
        async fn list_printers(&self) -> SpoolResult<Vec<Printer>> {
            self.calls.lock().unwrap().push("list_printers".to_string());
            match &self.list_error {
                Some(reason) => Err(SpoolerFault::new(reason.clone())),
                None => Ok(self.printers.clone()),
            }
        }

        async fn open_session(&self) -> SpoolResult<Box<dyn SpoolSession>> {
            if self.fail_at == Some("open_session") {
                return Err(SpoolerFault::new("connection refused"));
            }
            Ok(Box::new(FakeSession(self.clone())))
        }
    }

    pub(crate) fn media() -> Media {
        Media {
            data: b"hello printer".to_vec(),
            name: "notes.txt".to_string(),
            mime_type: "text/plain".to_string(),
        }
    }

    fn ready_job() -> ReadyJob {
        PendingJob::new(media(), "notes.txt_alice_7").bind(Printer::new("Apathy", "Room A"))
    }

    #[test]
    fn job_name_is_media_user_and_id() {
        let user = Requester {
            id: UserId(7),
            username: Some("alice".to_string()),
        };
        assert_eq!(format_job_name(&media(), &user), "notes.txt_alice_7");
        assert_eq!(format_job_name(&media(), &user), format_job_name(&media(), &user));
    }

    #[test]
    fn job_name_without_username() {
        let user = Requester {
            id: UserId(9),
            username: None,
        };
        assert_eq!(format_job_name(&media(), &user), "notes.txt_unknown_9");
    }

    #[test]
    fn binding_keeps_media_and_defaults_to_one_copy() {
        let job = ready_job();
        assert_eq!(job.printer.name, "Apathy");
        assert_eq!(job.copies, 1);
        assert_eq!(job.media, media());
    }

    #[tokio::test]
    async fn all_steps_succeed_and_return_job_id() {
        let spooler = FakeSpooler::with_job_id(42);
        let id = create_job(&spooler, ready_job()).await.unwrap();

        assert_eq!(id, JobId(42));
        assert_eq!(
            spooler.calls(),
            vec!["create_job", "start_document", "write_data", "finish_document"]
        );
        assert_eq!(*spooler.written.lock().unwrap(), media().data);
    }

    #[tokio::test]
    async fn start_failure_stops_the_handshake() {
        let spooler = FakeSpooler {
            fail_at: Some("start_document"),
            ..FakeSpooler::with_job_id(42)
        };
        let err = create_job(&spooler, ready_job()).await.unwrap_err();

        assert_eq!(
            err,
            PrintError::DocumentStartFailed("start_document refused".to_string())
        );
        assert_eq!(spooler.calls(), vec!["create_job", "start_document"]);
    }

    #[tokio::test]
    async fn each_step_maps_to_its_own_error() {
        let cases: [(&'static str, fn(String) -> PrintError); 4] = [
            ("create_job", PrintError::JobCreationFailed),
            ("start_document", PrintError::DocumentStartFailed),
            ("write_data", PrintError::DataWriteFailed),
            ("finish_document", PrintError::DocumentFinishFailed),
        ];
        for (step, expected) in cases {
            let spooler = FakeSpooler {
                fail_at: Some(step),
                ..FakeSpooler::with_job_id(5)
            };
            let err = create_job(&spooler, ready_job()).await.unwrap_err();
            assert_eq!(err, expected(format!("{step} refused")));
            assert_eq!(spooler.calls().last().map(String::as_str), Some(step));
        }
    }

    #[tokio::test]
    async fn missing_job_id_is_a_creation_failure() {
        let spooler = FakeSpooler::with_job_id(0);
        let err = create_job(&spooler, ready_job()).await.unwrap_err();

        assert!(matches!(err, PrintError::JobCreationFailed(_)));
        assert_eq!(spooler.calls(), vec!["create_job"]);
    }

    #[tokio::test]
    async fn unreachable_spooler_fails_creation() {
        let spooler = FakeSpooler {
            fail_at: Some("open_session"),
            ..FakeSpooler::with_job_id(1)
        };
        let err = create_job(&spooler, ready_job()).await.unwrap_err();
        assert_eq!(
            err,
            PrintError::JobCreationFailed("connection refused".to_string())
        );
    }

    #[tokio::test]
    async fn failed_state_is_terminal() {
        let spooler = FakeSpooler {
            fail_at: Some("create_job"),
            ..FakeSpooler::with_job_id(1)
        };
        let job = ready_job();
        let session = spooler.open_session().await.unwrap();
        let mut submission = Submission::new(&job, session);

        assert!(matches!(submission.step().await, SubmissionState::Failed(_)));
        assert!(matches!(submission.step().await, SubmissionState::Failed(_)));
        assert_eq!(spooler.calls(), vec!["create_job"]);
    }

    #[tokio::test]
    async fn steps_advance_through_every_state() {
        let spooler = FakeSpooler::with_job_id(3);
        let job = ready_job();
        let session = spooler.open_session().await.unwrap();
        let mut submission = Submission::new(&job, session);
        assert_eq!(submission.state(), &SubmissionState::Idle);

        let mut seen = Vec::new();
        while !submission.state().is_terminal() {
            seen.push(submission.step().await.clone());
        }
        assert_eq!(
            seen,
            vec![
                SubmissionState::JobCreated(JobId(3)),
                SubmissionState::DocumentStarted(JobId(3)),
                SubmissionState::DataWritten(JobId(3)),
                SubmissionState::Finished(JobId(3)),
            ]
        );
    }
}
