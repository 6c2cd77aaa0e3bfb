use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use parcell_core::config::NetConfig;
use parcell_core::error::{ParcellError, Result};
use parcell_core::traits::Transport;
use parcell_core::types::{Method, QueryArgs, SlotKey};

use crate::lock;
use crate::status::StatusAggregator;
use crate::url::build_url;

/// Receives the decoded response of a request. Returning `Err` (or
/// panicking) puts the status into its error state.
pub type Callback<T> = Box<dyn FnOnce(T) -> Result<()> + Send + 'static>;

/// A request waiting for its dispatch timer.
enum PendingRequest {
    GetJson {
        url: String,
        on_complete: Callback<serde_json::Value>,
    },
    GetText {
        url: String,
        on_complete: Callback<String>,
    },
    PostJson {
        url: String,
        body: String,
        on_complete: Callback<serde_json::Value>,
    },
}

impl PendingRequest {
    fn method(&self) -> Method {
        match self {
            Self::GetJson { .. } => Method::GetJson,
            Self::GetText { .. } => Method::GetText,
            Self::PostJson { .. } => Method::PostJson,
        }
    }

    fn url(&self) -> &str {
        match self {
            Self::GetJson { url, .. } | Self::GetText { url, .. } | Self::PostJson { url, .. } => {
                url
            }
        }
    }
}

#[derive(Default)]
struct SlotTable {
    pending: HashMap<SlotKey, PendingRequest>,
    /// Bumped per dispatched GET-JSON; never decreases.
    generations: HashMap<SlotKey, u64>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    status: Arc<StatusAggregator>,
    dispatch_delay: Duration,
    active: AtomicBool,
    slots: Mutex<SlotTable>,
    cancel: CancellationToken,
}

/// Named request slots with delayed dispatch and stale GET suppression.
///
/// Each request is held back for the dispatch delay so that fast responses
/// never flash a busy state. Enqueuing into a slot that still holds an
/// undispatched request replaces it; the replaced callback never runs.
/// A GET-JSON response is dropped when a newer GET-JSON in the same slot
/// was dispatched while it was in flight. GET-TEXT and POST responses are
/// always delivered.
///
/// Enqueuing spawns a timer task, so it must happen inside a Tokio runtime.
#[derive(Clone)]
pub struct RequestScheduler {
    inner: Arc<Inner>,
}

impl RequestScheduler {
    pub fn new(
        transport: Arc<dyn Transport>,
        status: Arc<StatusAggregator>,
        dispatch_delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                status,
                dispatch_delay,
                active: AtomicBool::new(true),
                slots: Mutex::new(SlotTable::default()),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn from_config(
        config: &NetConfig,
        transport: Arc<dyn Transport>,
        status: Arc<StatusAggregator>,
    ) -> Self {
        Self::new(transport, status, config.dispatch_delay())
    }

    /// Queue a GET whose response body is decoded as JSON.
    pub fn get<F>(&self, name: impl Into<String>, url: &str, args: &QueryArgs, on_complete: F)
    where
        F: FnOnce(serde_json::Value) -> Result<()> + Send + 'static,
    {
        self.enqueue(
            name.into(),
            PendingRequest::GetJson {
                url: build_url(url, args),
                on_complete: Box::new(on_complete),
            },
        );
    }

    /// Queue a GET whose raw response body is handed to the callback.
    pub fn get_plain<F>(
        &self,
        name: impl Into<String>,
        url: &str,
        args: &QueryArgs,
        on_complete: F,
    ) where
        F: FnOnce(String) -> Result<()> + Send + 'static,
    {
        self.enqueue(
            name.into(),
            PendingRequest::GetText {
                url: build_url(url, args),
                on_complete: Box::new(on_complete),
            },
        );
    }

    /// Queue a JSON POST. The payload is serialized right away; a payload
    /// that fails to serialize is reported here and nothing is queued.
    pub fn post<P, F>(
        &self,
        name: impl Into<String>,
        url: &str,
        args: &QueryArgs,
        payload: &P,
        on_complete: F,
    ) -> Result<()>
    where
        P: Serialize + ?Sized,
        F: FnOnce(serde_json::Value) -> Result<()> + Send + 'static,
    {
        if !self.is_active() {
            return Ok(());
        }
        let body = serde_json::to_string(payload)?;
        self.enqueue(
            name.into(),
            PendingRequest::PostJson {
                url: build_url(url, args),
                body,
                on_complete: Box::new(on_complete),
            },
        );
        Ok(())
    }

    /// While inactive, every enqueue is silently ignored. Has no effect
    /// after [`RequestScheduler::shutdown`].
    pub fn set_active(&self, active: bool) {
        self.inner.active.store(active, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst) && !self.inner.cancel.is_cancelled()
    }

    /// Number of slots holding a request that has not been dispatched yet.
    pub fn pending_len(&self) -> usize {
        lock(&self.inner.slots).pending.len()
    }

    pub fn status(&self) -> &Arc<StatusAggregator> {
        &self.inner.status
    }

    /// Stop accepting requests and drop everything still waiting for its
    /// timer. Requests already on the wire run to completion. This is final:
    /// the scheduler stays inactive whatever `set_active` is called with.
    pub fn shutdown(&self) {
        self.set_active(false);
        self.inner.cancel.cancel();
        let dropped = {
            let mut slots = lock(&self.inner.slots);
            let n = slots.pending.len();
            slots.pending.clear();
            n
        };
        debug!(dropped, "Request scheduler shut down");
    }

    fn enqueue(&self, name: String, request: PendingRequest) {
        if !self.is_active() {
            return;
        }
        let slot = SlotKey::new(request.method(), name);
        debug!(slot = %slot, url = %request.url(), "Request queued");
        if lock(&self.inner.slots)
            .pending
            .insert(slot.clone(), request)
            .is_some()
        {
            debug!(slot = %slot, "Replaced undispatched request");
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(inner.dispatch_delay) => inner.dispatch(slot).await,
                _ = inner.cancel.cancelled() => {}
            }
        });
    }

    #[cfg(test)]
    fn generation(&self, method: Method, name: &str) -> u64 {
        lock(&self.inner.slots)
            .generations
            .get(&SlotKey::new(method, name))
            .copied()
            .unwrap_or(0)
    }
}

impl Inner {
    /// Runs when a timer for `slot` fires. Whatever request is live in the
    /// slot at that moment goes out; an empty slot means an earlier timer
    /// already took it.
    async fn dispatch(&self, slot: SlotKey) {
        let Some(request) = lock(&self.slots).pending.remove(&slot) else {
            return;
        };

        self.status.mark_busy();
        debug!(slot = %slot, url = %request.url(), "Dispatching request");

        match request {
            PendingRequest::GetJson { url, on_complete } => {
                let generation = self.bump_generation(&slot);
                let result = self.transport.get_json(&url).await;
                self.complete(&slot, Some(generation), result, on_complete);
            }
            PendingRequest::GetText { url, on_complete } => {
                let result = self.transport.get_text(&url).await;
                self.complete(&slot, None, result, on_complete);
            }
            PendingRequest::PostJson {
                url,
                body,
                on_complete,
            } => {
                let result = self.transport.post_json(&url, body).await;
                self.complete(&slot, None, result, on_complete);
            }
        }
    }

    fn bump_generation(&self, slot: &SlotKey) -> u64 {
        let mut slots = lock(&self.slots);
        let generation = slots.generations.entry(slot.clone()).or_insert(0);
        *generation += 1;
        *generation
    }

    /// Settle one dispatched request: exactly one `mark_settled` or
    /// `mark_error` per dispatch.
    fn complete<T>(
        &self,
        slot: &SlotKey,
        generation: Option<u64>,
        result: Result<T>,
        on_complete: Callback<T>,
    ) {
        let payload = match result {
            Ok(payload) => payload,
            Err(e) => {
                warn!(slot = %slot, error = %e, "Failed loading");
                self.status.mark_error();
                return;
            }
        };

        if let Some(mine) = generation {
            let current = lock(&self.slots).generations.get(slot).copied().unwrap_or(0);
            if current != mine {
                debug!(slot = %slot, mine, current, "Discarding superseded response");
                self.status.mark_settled();
                return;
            }
        }

        match panic::catch_unwind(AssertUnwindSafe(|| on_complete(payload))) {
            Ok(Ok(())) => self.status.mark_settled(),
            Ok(Err(e)) => {
                warn!(slot = %slot, error = %e, "Response handler failed");
                self.status.mark_error();
            }
            Err(panic) => {
                let e = ParcellError::callback(slot.to_string(), panic_message(&*panic));
                warn!(slot = %slot, error = %e, "Response handler panicked");
                self.status.mark_error();
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use parcell_core::types::StatusDisplay;
    use parcell_test_utils::{MockTransport, RecordingSurface};
    use serde_json::json;

    const DELAY: Duration = Duration::from_millis(500);

    struct Harness {
        scheduler: RequestScheduler,
        transport: Arc<MockTransport>,
        surface: Arc<RecordingSurface>,
        delivered: Arc<Mutex<Vec<String>>>,
    }

    impl Harness {
        fn new() -> Self {
            let transport = Arc::new(MockTransport::new());
            let surface = Arc::new(RecordingSurface::default());
            let status = Arc::new(StatusAggregator::new(surface.clone()));
            Self {
                scheduler: RequestScheduler::new(transport.clone(), status, DELAY),
                transport,
                surface,
                delivered: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// Callback recording `tag` together with the payload it received.
        fn record<T: std::fmt::Display + 'static>(
            &self,
            tag: &str,
        ) -> impl FnOnce(T) -> Result<()> + Send + 'static {
            let delivered = self.delivered.clone();
            let tag = tag.to_string();
            move |payload: T| {
                delivered.lock().unwrap().push(format!("{tag}:{payload}"));
                Ok(())
            }
        }

        fn delivered(&self) -> Vec<String> {
            self.delivered.lock().unwrap().clone()
        }

        fn display(&self) -> StatusDisplay {
            self.scheduler.status().display()
        }
    }

    async fn sleep_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn get_is_held_back_then_delivered() {
        let h = Harness::new();
        h.transport.reply_json("jobs?s=1", json!({"n": 1}));

        h.scheduler
            .get("jobs", "jobs", &QueryArgs::new().with("s", 1), h.record("a"));
        assert_eq!(h.scheduler.pending_len(), 1);

        sleep_ms(400).await;
        assert!(h.transport.calls().is_empty());

        sleep_ms(200).await;
        assert_eq!(h.transport.calls().len(), 1);
        assert_eq!(h.delivered(), vec![r#"a:{"n":1}"#.to_string()]);
        assert_eq!(h.display(), StatusDisplay::Idle);
        assert_eq!(
            h.surface.renders(),
            vec![StatusDisplay::Busy { count: 1 }, StatusDisplay::Idle]
        );
        assert_eq!(h.scheduler.pending_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn overwrite_before_dispatch_sends_only_the_latest() {
        let h = Harness::new();
        h.transport.reply_json("q?v=2", json!(2));

        let args1 = QueryArgs::new().with("v", 1);
        let args2 = QueryArgs::new().with("v", 2);
        h.scheduler.get("q", "q", &args1, h.record("first"));
        sleep_ms(100).await;
        h.scheduler.get("q", "q", &args2, h.record("second"));

        // The first timer fires at 500ms and takes the live (second) request.
        sleep_ms(450).await;
        let calls = h.transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].url, "q?v=2");

        sleep_ms(1000).await;
        assert_eq!(h.transport.calls().len(), 1);
        assert_eq!(h.delivered(), vec!["second:2".to_string()]);
        assert_eq!(h.display(), StatusDisplay::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_get_is_discarded_but_settles() {
        let h = Harness::new();
        // R1 is slow and lands after R2 has been dispatched and answered.
        h.transport
            .reply_json_after("r?id=1", Duration::from_millis(1000), json!("r1"));
        h.transport
            .reply_json_after("r?id=2", Duration::from_millis(10), json!("r2"));

        h.scheduler
            .get("r", "r", &QueryArgs::new().with("id", 1), h.record("cb"));
        sleep_ms(600).await; // R1 dispatched at 500
        h.scheduler
            .get("r", "r", &QueryArgs::new().with("id", 2), h.record("cb"));
        sleep_ms(550).await; // R2 dispatched at 1100, answered at 1110
        assert_eq!(h.delivered(), vec!["cb:\"r2\"".to_string()]);
        assert_eq!(h.display(), StatusDisplay::Busy { count: 1 });

        sleep_ms(500).await; // R1 answers at 1500
        assert_eq!(h.delivered(), vec!["cb:\"r2\"".to_string()]);
        assert_eq!(h.display(), StatusDisplay::Idle);
        assert_eq!(h.scheduler.generation(Method::GetJson, "r"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_check_ignores_arrival_order() {
        let h = Harness::new();
        // R1 answers first, but only after R2 was dispatched.
        h.transport
            .reply_json_after("r?id=1", Duration::from_millis(700), json!("r1"));
        h.transport
            .reply_json_after("r?id=2", Duration::from_millis(500), json!("r2"));

        h.scheduler
            .get("r", "r", &QueryArgs::new().with("id", 1), h.record("cb"));
        sleep_ms(600).await;
        h.scheduler
            .get("r", "r", &QueryArgs::new().with("id", 2), h.record("cb"));

        sleep_ms(650).await; // R1 landed at 1200, R2 still in flight
        assert!(h.delivered().is_empty());
        assert_eq!(h.display(), StatusDisplay::Busy { count: 1 });

        sleep_ms(500).await;
        assert_eq!(h.delivered(), vec!["cb:\"r2\"".to_string()]);
        assert_eq!(h.display(), StatusDisplay::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn post_and_plain_get_are_never_discarded() {
        let h = Harness::new();
        h.transport
            .reply_json_after("save", Duration::from_millis(1000), json!("p1"));
        h.transport
            .reply_json_after("save", Duration::from_millis(10), json!("p2"));
        h.transport
            .reply_text_after("log", Duration::from_millis(1000), "t1");
        h.transport
            .reply_text_after("log", Duration::from_millis(10), "t2");

        let args = QueryArgs::new();
        h.scheduler
            .post("save", "save", &args, &json!({"k": 1}), h.record("post"))
            .unwrap();
        h.scheduler.get_plain("log", "log", &args, h.record("text"));
        sleep_ms(600).await;
        h.scheduler
            .post("save", "save", &args, &json!({"k": 2}), h.record("post"))
            .unwrap();
        h.scheduler.get_plain("log", "log", &args, h.record("text"));
        sleep_ms(2000).await;

        let mut delivered = h.delivered();
        delivered.sort();
        assert_eq!(
            delivered,
            vec!["post:\"p1\"", "post:\"p2\"", "text:t1", "text:t2"]
        );
        assert_eq!(h.display(), StatusDisplay::Idle);

        let bodies: Vec<_> = h
            .transport
            .calls()
            .into_iter()
            .filter_map(|c| c.body)
            .collect();
        assert_eq!(bodies, vec![r#"{"k":1}"#, r#"{"k":2}"#]);
    }

    #[tokio::test(start_paused = true)]
    async fn same_name_different_methods_do_not_collide() {
        let h = Harness::new();
        let args = QueryArgs::new();

        h.transport.reply_json("jobs", json!([1]));
        h.transport.reply_text("jobs", "plain body");

        h.scheduler.get("jobs", "jobs", &args, h.record("json"));
        h.scheduler.get_plain("jobs", "jobs", &args, h.record("text"));
        assert_eq!(h.scheduler.pending_len(), 2);

        sleep_ms(600).await;
        assert_eq!(h.transport.calls().len(), 2);
        let mut delivered = h.delivered();
        delivered.sort();
        assert_eq!(delivered, vec!["json:[1]", "text:plain body"]);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_slots_show_a_count() {
        let h = Harness::new();
        h.transport
            .reply_json_after("a", Duration::from_millis(100), json!(1));
        h.transport
            .reply_json_after("b", Duration::from_millis(200), json!(2));

        h.scheduler.get("a", "a", &QueryArgs::new(), h.record("a"));
        h.scheduler.get("b", "b", &QueryArgs::new(), h.record("b"));
        sleep_ms(550).await;
        assert_eq!(h.display(), StatusDisplay::Busy { count: 2 });

        sleep_ms(100).await;
        assert_eq!(h.display(), StatusDisplay::Busy { count: 1 });
        sleep_ms(100).await;
        assert_eq!(h.display(), StatusDisplay::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_is_sticky_and_skips_callback() {
        let h = Harness::new();
        h.transport.fail("broken", "connection refused");

        h.scheduler
            .get("x", "broken", &QueryArgs::new(), h.record("never"));
        sleep_ms(600).await;
        assert!(h.delivered().is_empty());
        assert_eq!(h.display(), StatusDisplay::Error);

        // Later successes do not clear the error.
        h.scheduler.get("y", "fine", &QueryArgs::new(), h.record("ok"));
        sleep_ms(600).await;
        assert_eq!(h.delivered().len(), 1);
        assert_eq!(h.display(), StatusDisplay::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn callback_error_is_treated_as_failure() {
        let h = Harness::new();

        h.scheduler.get("x", "x", &QueryArgs::new(), |_| {
            Err(ParcellError::callback("GET x", "unexpected payload"))
        });
        sleep_ms(600).await;
        assert_eq!(h.display(), StatusDisplay::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn callback_panic_does_not_leave_request_busy() {
        let h = Harness::new();

        h.scheduler
            .get_plain("x", "x", &QueryArgs::new(), |_| panic!("bad body"));
        sleep_ms(600).await;
        assert_eq!(h.display(), StatusDisplay::Error);
        assert_eq!(h.scheduler.pending_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn inactive_scheduler_ignores_everything() {
        let h = Harness::new();
        h.scheduler.set_active(false);
        assert!(!h.scheduler.is_active());

        let args = QueryArgs::new();
        h.scheduler.get("a", "a", &args, h.record("a"));
        h.scheduler.get_plain("b", "b", &args, h.record("b"));
        h.scheduler
            .post("c", "c", &args, &json!({}), h.record("c"))
            .unwrap();
        assert_eq!(h.scheduler.pending_len(), 0);

        sleep_ms(1000).await;
        assert!(h.transport.calls().is_empty());
        assert!(h.delivered().is_empty());
        assert!(h.surface.renders().is_empty());

        h.scheduler.set_active(true);
        h.scheduler.get("a", "a", &args, h.record("a"));
        sleep_ms(600).await;
        assert_eq!(h.delivered().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn post_serialization_failure_queues_nothing() {
        let h = Harness::new();
        let mut bad = std::collections::HashMap::new();
        bad.insert((1, 2), "tuple keys are not JSON");

        let result = h
            .scheduler
            .post("p", "p", &QueryArgs::new(), &bad, h.record("p"));
        assert!(matches!(result, Err(ParcellError::Json(_))));
        assert_eq!(h.scheduler.pending_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drops_undispatched_requests() {
        let h = Harness::new();

        h.scheduler.get("a", "a", &QueryArgs::new(), h.record("a"));
        sleep_ms(100).await;
        h.scheduler.shutdown();
        assert_eq!(h.scheduler.pending_len(), 0);

        sleep_ms(1000).await;
        assert!(h.transport.calls().is_empty());
        assert!(h.delivered().is_empty());
        assert_eq!(h.display(), StatusDisplay::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cannot_be_undone_by_reactivating() {
        let h = Harness::new();

        h.scheduler.shutdown();
        h.scheduler.set_active(true);
        assert!(!h.scheduler.is_active());

        h.scheduler.get("a", "a", &QueryArgs::new(), h.record("a"));
        h.scheduler
            .post("b", "b", &QueryArgs::new(), &json!({}), h.record("b"))
            .unwrap();
        assert_eq!(h.scheduler.pending_len(), 0);

        sleep_ms(2000).await;
        assert!(h.transport.calls().is_empty());
        assert!(h.delivered().is_empty());
        assert!(h.surface.renders().is_empty());
    }
}
