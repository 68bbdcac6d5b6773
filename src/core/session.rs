use crate::core::state::{SessionEvent, SessionState};
use crate::error::{DiscoveryError, Result};
use crate::protocol::{DiscoveryQuery, ResourceDescriptor, SessionId};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Work item queued for a session's dispatcher
#[derive(Debug)]
pub enum Delivery {
    ResourcesFound {
        service_address: String,
        resources: Vec<ResourceDescriptor>,
    },
    Completed,
    Failed(DiscoveryError),
    /// Terminal without a callback; the dispatcher just drops the notifier
    Release,
}

impl Delivery {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::ResourcesFound { .. })
    }
}

/// Engine-side record of one outstanding discovery session.
///
/// Every notification passes through [`SessionEntry`]'s state gate before it is
/// queued, so a terminal notification is always the last item in the queue.
pub struct SessionEntry {
    id: SessionId,
    query: DiscoveryQuery,
    state: Mutex<SessionState>,
    deliveries: mpsc::UnboundedSender<Delivery>,
    suppress: Arc<AtomicBool>,
    cancel: CancellationToken,
    batches: AtomicUsize,
    responses: AtomicUsize,
    malformed: AtomicUsize,
    last_malformed: Mutex<Option<DiscoveryError>>,
    created_at: Instant,
}

/// Receiving half of a session's delivery queue
pub struct DeliveryQueue {
    id: SessionId,
    rx: mpsc::UnboundedReceiver<Delivery>,
    suppress: Arc<AtomicBool>,
}

impl SessionEntry {
    pub fn new(
        id: SessionId,
        query: DiscoveryQuery,
        cancel: CancellationToken,
    ) -> (Arc<Self>, DeliveryQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        let suppress = Arc::new(AtomicBool::new(false));

        let entry = Arc::new(Self {
            id,
            query,
            state: Mutex::new(SessionState::Active),
            deliveries: tx,
            suppress: suppress.clone(),
            cancel,
            batches: AtomicUsize::new(0),
            responses: AtomicUsize::new(0),
            malformed: AtomicUsize::new(0),
            last_malformed: Mutex::new(None),
            created_at: Instant::now(),
        });

        (entry, DeliveryQueue { id, rx, suppress })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn query(&self) -> &DiscoveryQuery {
        &self.query
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Number of batches accepted for delivery
    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::Acquire)
    }

    /// Number of well-formed responses received, including ones filtered to nothing
    pub fn responses(&self) -> usize {
        self.responses.load(Ordering::Acquire)
    }

    pub fn malformed(&self) -> usize {
        self.malformed.load(Ordering::Acquire)
    }

    pub fn note_response(&self) {
        self.responses.fetch_add(1, Ordering::AcqRel);
    }

    pub fn note_malformed(&self, error: DiscoveryError) {
        self.malformed.fetch_add(1, Ordering::AcqRel);
        *self.last_malformed.lock() = Some(error);
    }

    /// Most recent malformed-response cause, if any
    pub fn take_malformed(&self) -> Option<DiscoveryError> {
        self.last_malformed.lock().take()
    }

    fn transition(&self, event: SessionEvent, delivery: Delivery) -> Result<()> {
        let mut state = self.state.lock();
        let next = state.apply(event)?;

        if next == SessionState::Failed {
            // Anything still queued must not reach the notifier
            self.suppress.store(true, Ordering::Release);
        }

        *state = next;
        // Queued under the lock so queue order matches transition order
        if self.deliveries.send(delivery).is_err() {
            tracing::warn!(
                "Session {}: dispatcher gone, {:?} notification dropped",
                self.id,
                event
            );
        }
        Ok(())
    }

    pub fn report(&self, service_address: String, resources: Vec<ResourceDescriptor>) -> Result<()> {
        self.transition(
            SessionEvent::ResourcesFound,
            Delivery::ResourcesFound {
                service_address,
                resources,
            },
        )?;
        self.batches.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    pub fn complete(&self) -> Result<()> {
        self.transition(SessionEvent::Completed, Delivery::Completed)
    }

    pub fn fail(&self, error: DiscoveryError) -> Result<()> {
        self.transition(SessionEvent::Failed, Delivery::Failed(error))
    }

    /// Terminate without notifying the consumer
    pub fn release(&self) -> Result<()> {
        self.transition(SessionEvent::Failed, Delivery::Release)
    }
}

impl DeliveryQueue {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Next deliverable item, skipping results suppressed by a failure.
    ///
    /// Returns `None` once the sending side is gone.
    pub async fn next(&mut self) -> Option<Delivery> {
        loop {
            let delivery = self.rx.recv().await?;
            if !delivery.is_terminal() && self.suppress.load(Ordering::Acquire) {
                tracing::debug!("Session {}: discarding results queued before failure", self.id);
                continue;
            }
            return Some(delivery);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_entry() -> (Arc<SessionEntry>, DeliveryQueue) {
        SessionEntry::new(
            SessionId::new(),
            DiscoveryQuery::all(),
            CancellationToken::new(),
        )
    }

    fn light() -> Vec<ResourceDescriptor> {
        vec![ResourceDescriptor::new("/light/1", "coap://10.0.0.5")]
    }

    #[tokio::test]
    async fn test_completion_delivers_queued_results_first() {
        let (entry, mut queue) = create_test_entry();

        entry.report("coap://10.0.0.5".to_string(), light()).unwrap();
        entry.complete().unwrap();

        assert!(matches!(
            queue.next().await,
            Some(Delivery::ResourcesFound { .. })
        ));
        assert!(matches!(queue.next().await, Some(Delivery::Completed)));
        assert_eq!(entry.batches(), 1);
        assert_eq!(entry.state(), SessionState::Completed);
    }

    #[tokio::test]
    async fn test_failure_discards_undelivered_results() {
        let (entry, mut queue) = create_test_entry();

        entry.report("coap://10.0.0.5".to_string(), light()).unwrap();
        entry.report("coap://10.0.0.6".to_string(), light()).unwrap();
        entry.fail(DiscoveryError::transport("link down")).unwrap();

        assert!(matches!(queue.next().await, Some(Delivery::Failed(_))));
    }

    #[tokio::test]
    async fn test_nothing_accepted_after_terminal() {
        let (entry, mut queue) = create_test_entry();

        entry.complete().unwrap();
        assert!(entry.report("coap://10.0.0.5".to_string(), light()).is_err());
        assert!(entry.fail(DiscoveryError::Timeout).is_err());
        assert!(entry.complete().is_err());
        assert!(entry.release().is_err());

        drop(entry);
        assert!(matches!(queue.next().await, Some(Delivery::Completed)));
        assert!(queue.next().await.is_none());
    }

    #[tokio::test]
    async fn test_release_is_terminal_and_silent() {
        let (entry, mut queue) = create_test_entry();

        entry.report("coap://10.0.0.5".to_string(), light()).unwrap();
        entry.release().unwrap();

        assert_eq!(entry.state(), SessionState::Failed);
        assert!(matches!(queue.next().await, Some(Delivery::Release)));
    }

    #[test]
    fn test_transition_survives_dead_dispatcher() {
        let (entry, queue) = create_test_entry();
        drop(queue);

        assert!(entry.report("coap://10.0.0.5".to_string(), light()).is_ok());
        assert!(entry.complete().is_ok());
        assert_eq!(entry.state(), SessionState::Completed);
        assert!(entry.fail(DiscoveryError::Timeout).is_err());
    }

    #[test]
    fn test_response_counters() {
        let (entry, _queue) = create_test_entry();
        entry.note_malformed(DiscoveryError::malformed("coap://a", "bad json"));
        entry.note_malformed(DiscoveryError::malformed("coap://b", "missing oc"));
        entry.note_response();

        assert_eq!(entry.malformed(), 2);
        assert_eq!(entry.responses(), 1);
        assert_eq!(entry.batches(), 0);

        let last = entry.take_malformed().unwrap();
        assert_eq!(last.to_string(), "Malformed response from coap://b: missing oc");
        assert!(entry.take_malformed().is_none());
    }
}
