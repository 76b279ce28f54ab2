//! Server-side table of print requests waiting for a printer choice.
//!
//! A selection menu's buttons carry only `print:<request id>:<option index>`; the
//! media and the offered printers stay here until the first valid selection
//! consumes the entry.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::{
    domain::{ChatId, Requester},
    errors::PrintError,
    job::{PendingJob, ReadyJob},
    printer::Printer,
};

const CALLBACK_PREFIX: &str = "print";

/// Opaque id of a pending request.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

/// A print request waiting for its printer.
#[derive(Clone, Debug)]
pub struct PendingRequest {
    pub chat_id: ChatId,
    pub requester: Requester,
    pub job: PendingJob,
    pub printers: Vec<Printer>,
}

impl PendingRequest {
    /// Bind the printer at `option` and produce a submittable job.
    pub fn select(self, option: usize) -> Result<(ReadyJob, Requester), PrintError> {
        let Some(printer) = self.printers.into_iter().nth(option) else {
            return Err(PrintError::NoPrinterSelected);
        };
        Ok((self.job.bind(printer), self.requester))
    }
}

/// Button payload for `option` of request `id`.
pub fn callback_data(id: &RequestId, option: usize) -> String {
    format!("{CALLBACK_PREFIX}:{}:{option}", id.0)
}

/// Parse a button payload produced by [`callback_data`].
pub fn parse_callback_data(data: &str) -> Option<(RequestId, usize)> {
    let mut parts = data.split(':');
    if parts.next()? != CALLBACK_PREFIX {
        return None;
    }
    let id = parts.next().filter(|s| !s.is_empty())?;
    let option = parts.next()?.parse::<usize>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((RequestId(id.to_string()), option))
}

/// Outcome of trying to claim a pending request.
#[derive(Debug)]
pub enum Claim {
    Claimed(PendingRequest),
    /// The entry exists but belongs to another user; it stays in the table.
    NotOwner,
    Missing,
}

struct Entry {
    request: PendingRequest,
    created_at: Instant,
}

pub struct PendingRequests {
    ttl: Duration,
    capacity: usize,
    inner: Mutex<HashMap<RequestId, Entry>>,
}

impl PendingRequests {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, request: PendingRequest) -> RequestId {
        self.insert_at(request, Instant::now()).await
    }

    pub async fn insert_at(&self, request: PendingRequest, now: Instant) -> RequestId {
        let mut map = self.inner.lock().await;
        self.sweep(&mut map, now);

        while map.len() >= self.capacity {
            let Some(oldest) = map
                .iter()
                .min_by_key(|(_, e)| e.created_at)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            debug!(request_id = %oldest.0, "evicting oldest pending print request");
            map.remove(&oldest);
        }

        let id = RequestId::generate();
        map.insert(
            id.clone(),
            Entry {
                request,
                created_at: now,
            },
        );
        id
    }

    /// Remove and return the request if `claimant` owns it.
    pub async fn claim(&self, id: &RequestId, claimant: &Requester) -> Claim {
        self.claim_at(id, claimant, Instant::now()).await
    }

    pub async fn claim_at(&self, id: &RequestId, claimant: &Requester, now: Instant) -> Claim {
        let mut map = self.inner.lock().await;
        self.sweep(&mut map, now);

        let owner = map.get(id).map(|e| e.request.requester.id);
        match owner {
            None => Claim::Missing,
            Some(owner) if owner != claimant.id => Claim::NotOwner,
            Some(_) => match map.remove(id) {
                Some(e) => Claim::Claimed(e.request),
                None => Claim::Missing,
            },
        }
    }

    /// Drop a request whose menu never reached the chat.
    pub async fn remove(&self, id: &RequestId) -> bool {
        self.inner.lock().await.remove(id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn sweep(&self, map: &mut HashMap<RequestId, Entry>, now: Instant) {
        let ttl = self.ttl;
        map.retain(|_, e| now.saturating_duration_since(e.created_at) < ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{domain::UserId, job::tests::media};

    fn requester(id: i64) -> Requester {
        Requester {
            id: UserId(id),
            username: Some(format!("user{id}")),
        }
    }

    fn request(user: i64) -> PendingRequest {
        PendingRequest {
            chat_id: ChatId(100),
            requester: requester(user),
            job: PendingJob::new(media(), "notes.txt_user1_1"),
            printers: vec![Printer::new("Apathy", "Room A"), Printer::new("Joy", "Room B")],
        }
    }

    #[test]
    fn callback_data_round_trips_and_rejects_garbage() {
        let id = RequestId("abc123".to_string());
        let data = callback_data(&id, 2);
        assert_eq!(data, "print:abc123:2");
        assert_eq!(parse_callback_data(&data), Some((id, 2)));

        assert_eq!(parse_callback_data("askuser:abc:1"), None);
        assert_eq!(parse_callback_data("print::1"), None);
        assert_eq!(parse_callback_data("print:abc:x"), None);
        assert_eq!(parse_callback_data("print:abc:1:extra"), None);
    }

    #[test]
    fn generated_ids_fit_in_a_telegram_callback() {
        let data = callback_data(&RequestId::generate(), 999);
        assert!(data.len() <= 64, "{} bytes", data.len());
    }

    #[test]
    fn select_binds_the_chosen_printer() {
        let (job, who) = request(1).select(1).unwrap();
        assert_eq!(job.printer.name, "Joy");
        assert_eq!(who.id, UserId(1));
    }

    #[test]
    fn out_of_range_option_has_no_printer() {
        assert_eq!(request(1).select(5).unwrap_err(), PrintError::NoPrinterSelected);
    }

    #[tokio::test]
    async fn claim_consumes_the_entry_once() {
        let table = PendingRequests::new(Duration::from_secs(60), 8);
        let id = table.insert(request(1)).await;

        assert!(matches!(table.claim(&id, &requester(1)).await, Claim::Claimed(_)));
        assert!(matches!(table.claim(&id, &requester(1)).await, Claim::Missing));
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn removed_entries_cannot_be_claimed() {
        let table = PendingRequests::new(Duration::from_secs(60), 8);
        let id = table.insert(request(1)).await;

        assert!(table.remove(&id).await);
        assert!(!table.remove(&id).await);
        assert!(matches!(table.claim(&id, &requester(1)).await, Claim::Missing));
    }

    #[tokio::test]
    async fn other_users_cannot_claim() {
        let table = PendingRequests::new(Duration::from_secs(60), 8);
        let id = table.insert(request(1)).await;

        assert!(matches!(table.claim(&id, &requester(2)).await, Claim::NotOwner));
        assert!(matches!(table.claim(&id, &requester(1)).await, Claim::Claimed(_)));
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let start = Instant::now();
        let table = PendingRequests::new(Duration::from_secs(10), 8);
        let id = table.insert_at(request(1), start).await;

        let later = start + Duration::from_secs(11);
        assert!(matches!(
            table.claim_at(&id, &requester(1), later).await,
            Claim::Missing
        ));
    }

    #[tokio::test]
    async fn capacity_evicts_oldest_first() {
        let start = Instant::now();
        let table = PendingRequests::new(Duration::from_secs(600), 2);
        let first = table.insert_at(request(1), start).await;
        let second = table
            .insert_at(request(1), start + Duration::from_secs(1))
            .await;
        let third = table
            .insert_at(request(1), start + Duration::from_secs(2))
            .await;

        assert_eq!(table.len().await, 2);
        let now = start + Duration::from_secs(3);
        assert!(matches!(
            table.claim_at(&first, &requester(1), now).await,
            Claim::Missing
        ));
        assert!(matches!(
            table.claim_at(&second, &requester(1), now).await,
            Claim::Claimed(_)
        ));
        assert!(matches!(
            table.claim_at(&third, &requester(1), now).await,
            Claim::Claimed(_)
        ));
    }
}
