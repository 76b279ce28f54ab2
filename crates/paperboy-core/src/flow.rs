//! The print interaction: attachment in, printer menu out, job on selection.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    audit::{AuditEvent, AuditLogger},
    config::Config,
    domain::{ChatId, MessageRef, Requester},
    errors::PrintError,
    job::{create_job, format_job_name, PendingJob},
    media::{extract_media, ExtractLimits, FileFetcher, IncomingMessage, Media},
    messaging::{
        port::MessagingPort,
        types::{fit_message, InlineKeyboard, SelectionCallback},
    },
    pending::{parse_callback_data, Claim, PendingRequest, PendingRequests},
    printer::{Printer, PrinterAliases},
    spooler::PrintSpooler,
    Result,
};

pub const MENU_PROMPT: &str = "You're printing a file. Choose the printer you'd like to use:";
pub const NO_PRINTERS: &str = "No printers are available right now.";
pub const NOT_OWNER: &str = "Only the person who sent the document can choose the printer.";
pub const MENU_FAILED: &str = "Failed to print document: could not show the printer list.";

/// An attachment-bearing message addressed to the bot.
#[derive(Clone, Debug)]
pub struct PrintRequest {
    pub message: MessageRef,
    pub requester: Requester,
    pub content: IncomingMessage,
}

pub struct PrintFlow {
    spooler: Arc<dyn PrintSpooler>,
    messenger: Arc<dyn MessagingPort>,
    pending: PendingRequests,
    aliases: PrinterAliases,
    limits: ExtractLimits,
    button_label_max_length: usize,
    audit: AuditLogger,
}

impl PrintFlow {
    pub fn new(
        cfg: &Config,
        spooler: Arc<dyn PrintSpooler>,
        messenger: Arc<dyn MessagingPort>,
        audit: AuditLogger,
    ) -> Self {
        Self {
            spooler,
            messenger,
            pending: PendingRequests::new(cfg.pending_request_ttl, cfg.pending_request_capacity),
            aliases: cfg.printer_aliases.clone(),
            limits: ExtractLimits {
                max_bytes: cfg.max_document_bytes,
                max_depth: cfg.max_reply_depth,
            },
            button_label_max_length: cfg.button_label_max_length,
            audit,
        }
    }

    pub fn messenger(&self) -> &Arc<dyn MessagingPort> {
        &self.messenger
    }

    /// Live printer directory; one spooler round trip per call.
    pub async fn list_printers(&self) -> std::result::Result<Vec<Printer>, PrintError> {
        self.spooler
            .list_printers()
            .await
            .map_err(|fault| PrintError::PrinterQueryFailed(fault.0))
    }

    /// Text for the `/printers` command, clipped to one message.
    pub async fn printers_text(&self) -> String {
        let text = match self.list_printers().await {
            Ok(printers) if printers.is_empty() => NO_PRINTERS.to_string(),
            Ok(printers) => {
                let mut out = String::from("Available printers:");
                for p in &printers {
                    out.push_str("\n• ");
                    out.push_str(&p.get_id(&self.aliases));
                }
                out
            }
            Err(e) => e.user_message().unwrap_or_else(|| e.to_string()),
        };
        self.fit(&text)
    }

    /// Handle a message that may carry something to print.
    pub async fn handle_print_request(
        &self,
        req: PrintRequest,
        fetcher: &dyn FileFetcher,
    ) -> Result<()> {
        let media = match extract_media(&req.content, fetcher, self.limits).await {
            Ok(Some(media)) => media,
            Ok(None) => {
                debug!(user_id = req.requester.id.0, "no printable media, ignoring");
                return Ok(());
            }
            Err(e) => {
                self.audit_write(AuditEvent::error(&req.requester, &e.to_string(), Some("media")));
                return self.reply_error(req.message.chat_id, &e).await;
            }
        };

        info!(
            user_id = req.requester.id.0,
            username = req.requester.username_or_unknown(),
            document = %media.name,
            mime_type = %media.mime_type,
            bytes = media.data.len(),
            "received print request"
        );
        self.audit_write(AuditEvent::print_request(
            &req.requester,
            &media.name,
            &media.mime_type,
            media.data.len(),
        ));

        if let Err(e) = self.present(req.message, req.requester.clone(), media).await {
            self.audit_write(AuditEvent::error(&req.requester, &e.to_string(), Some("printers")));
            return self.reply_error(req.message.chat_id, &e).await;
        }
        Ok(())
    }

    /// Offer the live printer list as a menu replying to `reply_to`.
    pub async fn present(
        &self,
        reply_to: MessageRef,
        requester: Requester,
        media: Media,
    ) -> std::result::Result<(), PrintError> {
        let printers = self.list_printers().await?;
        if printers.is_empty() {
            self.send_best_effort(reply_to.chat_id, NO_PRINTERS).await;
            return Ok(());
        }

        let job_name = format_job_name(&media, &requester);
        let labels: Vec<String> = printers.iter().map(|p| p.get_id(&self.aliases)).collect();
        let printer_count = printers.len();

        let request_id = self
            .pending
            .insert(PendingRequest {
                chat_id: reply_to.chat_id,
                requester,
                job: PendingJob::new(media, job_name),
                printers,
            })
            .await;

        let keyboard =
            InlineKeyboard::one_per_row(&request_id, &labels, self.button_label_max_length);
        if let Err(e) = self
            .messenger
            .reply_inline_keyboard(reply_to, MENU_PROMPT, keyboard)
            .await
        {
            warn!(error = %e, request_id = %request_id.0, "failed to send printer menu");
            self.pending.remove(&request_id).await;
            self.send_best_effort(reply_to.chat_id, MENU_FAILED).await;
            return Ok(());
        }

        debug!(request_id = %request_id.0, printer_count, "printer menu presented");
        Ok(())
    }

    /// Handle a press on a printer menu button.
    pub async fn handle_selection(&self, cb: SelectionCallback) -> Result<()> {
        let Some((request_id, option)) = parse_callback_data(&cb.data) else {
            self.answer(&cb, None).await;
            return self
                .report_error(cb.message, None, &PrintError::RequestExpired)
                .await;
        };

        let request = match self.pending.claim(&request_id, &cb.clicker).await {
            Claim::Claimed(request) => request,
            Claim::NotOwner => {
                self.answer(&cb, Some(NOT_OWNER)).await;
                return Ok(());
            }
            Claim::Missing => {
                info!(request_id = %request_id.0, "selection for unknown or expired request");
                self.answer(&cb, None).await;
                return self
                    .report_error(cb.message, None, &PrintError::RequestExpired)
                    .await;
            }
        };
        self.answer(&cb, None).await;

        let chat_id = request.chat_id;
        let (job, requester) = match request.select(option) {
            Ok(v) => v,
            Err(e) => {
                self.audit_write(AuditEvent::error(&cb.clicker, &e.to_string(), Some("selection")));
                return self.report_error(cb.message, Some(chat_id), &e).await;
            }
        };

        let label = job.printer.get_id(&self.aliases);
        let printer_name = job.printer.name.clone();
        let job_name = job.name.clone();

        if let Some(menu) = cb.message {
            if self.messenger.capabilities().supports_edit {
                // Drop the buttons while the job is being spooled.
                if let Err(e) = self
                    .messenger
                    .edit_text(menu, &format!("Sending document to {label}..."))
                    .await
                {
                    debug!(error = %e, "failed to replace printer menu");
                }
            }
        }

        match create_job(self.spooler.as_ref(), job).await {
            Ok(job_id) => {
                self.audit_write(AuditEvent::print_job(
                    &requester,
                    &printer_name,
                    &job_name,
                    job_id.0,
                ));
                let text =
                    format!("Document sent to {label} successfully. The job ID is {job_id}.");
                self.report(cb.message, Some(chat_id), &text).await
            }
            Err(e) => {
                self.audit_write(AuditEvent::error(&requester, &e.to_string(), Some("print_job")));
                self.report_error(cb.message, Some(chat_id), &e).await
            }
        }
    }

    async fn answer(&self, cb: &SelectionCallback, text: Option<&str>) {
        if let Err(e) = self
            .messenger
            .answer_callback_query(&cb.callback_id, text)
            .await
        {
            debug!(error = %e, "failed to answer callback query");
        }
    }

    /// Show `text` in place of the menu, or as a new message when that is impossible.
    async fn report(
        &self,
        menu: Option<MessageRef>,
        chat_id: Option<ChatId>,
        text: &str,
    ) -> Result<()> {
        let text = self.fit(text);
        if let Some(menu) = menu {
            if self.messenger.capabilities().supports_edit {
                return self.messenger.edit_text(menu, &text).await;
            }
        }
        let Some(chat_id) = menu.map(|m| m.chat_id).or(chat_id) else {
            warn!("nowhere to report selection outcome");
            return Ok(());
        };
        self.messenger.send_text(chat_id, &text).await.map(|_| ())
    }

    async fn report_error(
        &self,
        menu: Option<MessageRef>,
        chat_id: Option<ChatId>,
        err: &PrintError,
    ) -> Result<()> {
        let Some(text) = err.user_message() else {
            return Ok(());
        };
        self.report(menu, chat_id, &text).await
    }

    async fn reply_error(&self, chat_id: ChatId, err: &PrintError) -> Result<()> {
        let Some(text) = err.user_message() else {
            return Ok(());
        };
        self.messenger
            .send_text(chat_id, &self.fit(&text))
            .await
            .map(|_| ())
    }

    async fn send_best_effort(&self, chat_id: ChatId, text: &str) {
        if let Err(e) = self.messenger.send_text(chat_id, &self.fit(text)).await {
            warn!(error = %e, "failed to send message");
        }
    }

    fn fit(&self, text: &str) -> String {
        fit_message(text, self.messenger.capabilities().max_message_len)
    }

    fn audit_write(&self, event: AuditEvent) {
        if let Err(e) = self.audit.write(event) {
            warn!(error = %e, "failed to write audit event");
        }
    }
}
