//! Tokio shell around the Crux core.
//!
//! A single task owns the [`Core`] and feeds it events one at a time, so
//! `App::update` never runs concurrently with itself. Remote calls and timers
//! run as spawned tasks that hand their answers back through the same queue,
//! where the loop resolves the original request. A response that has gone
//! stale by the time it lands is rejected by the core's guards, not here.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crux_core::{Core, Request};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, instrument};

use crate::capabilities::{
    ApiCall, ApiResponse, Capabilities, Effect, TimerKind, TimerOperation, TimerOutput,
};
use crate::config::CoreConfig;
use crate::event::Event;
use crate::gateway::{GatewayResult, RemoteGateway};
use crate::suggest::SearchOutcome;
use crate::{App, ViewModel};

const SEARCH_OUTCOME_CAPACITY: usize = 16;

enum Envelope {
    Event(Event),
    Answered(Request<ApiCall>, ApiResponse),
    TimerElapsed { kind: TimerKind, token: u64 },
    Shutdown,
}

/// A pending timer and the request it will answer.
struct TimerSlot {
    token: u64,
    task: JoinHandle<()>,
    request: Request<TimerOperation>,
}

/// Cloneable way in and out of a running [`Runtime`].
#[derive(Clone)]
pub struct RuntimeHandle {
    tx: mpsc::UnboundedSender<Envelope>,
    view: watch::Receiver<ViewModel>,
    search: broadcast::Sender<SearchOutcome>,
}

impl RuntimeHandle {
    /// Queues an event. Returns `false` once the runtime has exited.
    pub fn dispatch(&self, event: Event) -> bool {
        self.tx.send(Envelope::Event(event)).is_ok()
    }

    /// Receiver that always holds the latest rendered view.
    pub fn view(&self) -> watch::Receiver<ViewModel> {
        self.view.clone()
    }

    /// Completed search box interactions, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<SearchOutcome> {
        self.search.subscribe()
    }

    /// Stops polling, cancels timers and ends `Runtime::run`.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Envelope::Shutdown);
    }
}

pub struct Runtime {
    core: Core<Effect, App>,
    gateway: Arc<RemoteGateway>,
    tx: mpsc::UnboundedSender<Envelope>,
    rx: mpsc::UnboundedReceiver<Envelope>,
    view_tx: watch::Sender<ViewModel>,
    search_tx: broadcast::Sender<SearchOutcome>,
    timers: HashMap<TimerKind, TimerSlot>,
    timer_tokens: u64,
}

impl Runtime {
    pub fn new(config: CoreConfig, gateway: RemoteGateway) -> Self {
        let core: Core<Effect, App> = Core::new::<Capabilities>();
        // Nothing is pending yet, so the only effect is a render.
        let _ = core.process_event(Event::Configured(Box::new(config)));
        let (tx, rx) = mpsc::unbounded_channel();
        let (view_tx, _) = watch::channel(core.view());
        let (search_tx, _) = broadcast::channel(SEARCH_OUTCOME_CAPACITY);
        Self {
            core,
            gateway: Arc::new(gateway),
            tx,
            rx,
            view_tx,
            search_tx,
            timers: HashMap::new(),
            timer_tokens: 0,
        }
    }

    /// Runtime over a `reqwest` gateway built from `config`.
    pub fn connect(config: CoreConfig) -> GatewayResult<Self> {
        let gateway = RemoteGateway::connect(&config)?;
        Ok(Self::new(config, gateway))
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            tx: self.tx.clone(),
            view: self.view_tx.subscribe(),
            search: self.search_tx.clone(),
        }
    }

    /// Processes events until a handle calls `shutdown`. Returns the final view.
    pub async fn run(mut self) -> ViewModel {
        info!(base_url = %self.gateway.base_url(), "runtime started");
        while let Some(envelope) = self.rx.recv().await {
            match envelope {
                Envelope::Event(event) => {
                    let effects = self.core.process_event(event);
                    self.apply_all(effects);
                }
                Envelope::Answered(mut request, response) => {
                    let effects = self.core.resolve(&mut request, response);
                    self.apply_all(effects);
                }
                Envelope::TimerElapsed { kind, token } => self.elapse(kind, token),
                Envelope::Shutdown => {
                    let effects = self.core.process_event(Event::Stopped);
                    self.apply_all(effects);
                    break;
                }
            }
        }
        self.cancel(TimerKind::Debounce);
        self.cancel(TimerKind::Poll);
        info!("runtime stopped");
        self.core.view()
    }

    fn apply_all(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            self.apply(effect);
        }
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::Render(_) => {
                self.view_tx.send_replace(self.core.view());
            }
            Effect::Api(request) => {
                let gateway = Arc::clone(&self.gateway);
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let response = execute(&gateway, request.operation.clone()).await;
                    let _ = tx.send(Envelope::Answered(request, response));
                });
            }
            Effect::Timer(request) => match request.operation {
                TimerOperation::Start { kind, millis } => self.schedule(kind, millis, request),
                TimerOperation::Cancel { kind } => self.cancel(kind),
            },
            Effect::Search(request) => {
                // No subscribers is fine.
                let _ = self.search_tx.send(request.operation.clone());
            }
        }
    }

    fn schedule(&mut self, kind: TimerKind, millis: u64, request: Request<TimerOperation>) {
        self.cancel(kind);
        self.timer_tokens += 1;
        let token = self.timer_tokens;
        let tx = self.tx.clone();
        debug!(?kind, millis, "timer armed");
        let task = tokio::spawn(async move {
            time::sleep(Duration::from_millis(millis)).await;
            let _ = tx.send(Envelope::TimerElapsed { kind, token });
        });
        self.timers.insert(
            kind,
            TimerSlot {
                token,
                task,
                request,
            },
        );
    }

    /// Answers the slot's request `Elapsed`, unless it was replaced in the meantime.
    fn elapse(&mut self, kind: TimerKind, token: u64) {
        if self.timers.get(&kind).map(|slot| slot.token) != Some(token) {
            return;
        }
        if let Some(mut slot) = self.timers.remove(&kind) {
            let effects = self.core.resolve(&mut slot.request, TimerOutput::Elapsed);
            self.apply_all(effects);
        }
    }

    fn cancel(&mut self, kind: TimerKind) {
        if let Some(mut slot) = self.timers.remove(&kind) {
            slot.task.abort();
            let effects = self.core.resolve(&mut slot.request, TimerOutput::Cancelled);
            self.apply_all(effects);
        }
    }
}

/// Performs one remote call and wraps its result in the matching response.
#[instrument(skip_all, fields(call = call.name()))]
async fn execute(gateway: &RemoteGateway, call: ApiCall) -> ApiResponse {
    match call {
        ApiCall::FetchFeed { filter, .. } => ApiResponse::Feed(gateway.fetch_feed(filter).await),
        ApiCall::FetchSuggestions {
            query, category, ..
        } => ApiResponse::Suggestions(gateway.fetch_suggestions(&query, category).await),
        ApiCall::Mutate(ticket) => ApiResponse::Mutation(gateway.mutate(&ticket).await),
        ApiCall::SubmitLost(report) => ApiResponse::Report(gateway.submit_lost(&report).await),
        ApiCall::SubmitFound(report) => ApiResponse::Report(gateway.submit_found(&report).await),
        ApiCall::FetchAnalytics => ApiResponse::Analytics(gateway.fetch_analytics().await),
        ApiCall::FetchCatalog => ApiResponse::Catalog(gateway.fetch_catalog().await),
        ApiCall::AdvancedSearch(filters) => {
            ApiResponse::Items(gateway.fetch_advanced_search(&filters).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::testing::StubTransport;
    use crate::capabilities::HttpMethod;
    use crate::suggest::SuggestionPhase;
    use serde_json::json;

    fn stats_json() -> serde_json::Value {
        json!({
            "totalItems": 1,
            "lostItems": 1,
            "foundItems": 0,
            "activeItems": 1,
            "archivedItems": 0
        })
    }

    fn feed_routes(stub: StubTransport) -> StubTransport {
        stub.route(
            HttpMethod::Get,
            "/history",
            200,
            json!([{
                "id": "1",
                "type": "lost",
                "name": "Wallet",
                "location": "cafeteria",
                "timestamp": 1_700_000_000
            }]),
        )
        .route(HttpMethod::Get, "/stats", 200, stats_json())
    }

    fn spawn(stub: Arc<StubTransport>) -> (RuntimeHandle, JoinHandle<ViewModel>) {
        let config = CoreConfig::default();
        let gateway = RemoteGateway::new(stub, &config).unwrap();
        let runtime = Runtime::new(config, gateway);
        let handle = runtime.handle();
        (handle, tokio::spawn(runtime.run()))
    }

    #[tokio::test(start_paused = true)]
    async fn polls_every_interval_after_initial_fetch() {
        let stub = Arc::new(feed_routes(StubTransport::new()));
        let (handle, task) = spawn(Arc::clone(&stub));

        handle.dispatch(Event::Started);
        time::sleep(Duration::from_secs(25)).await;

        assert_eq!(stub.count("/history"), 3);
        let view = handle.view().borrow().clone();
        assert!(view.is_polling);
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.stats.total_items, 1);

        handle.shutdown();
        let last = task.await.unwrap();
        assert!(!last.is_polling);

        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(stub.count("/history"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_keystrokes_fire_one_request() {
        let stub = Arc::new(StubTransport::new().route(
            HttpMethod::Get,
            "/search",
            200,
            json!(["wallet", "wall clock"]),
        ));
        let (handle, task) = spawn(Arc::clone(&stub));

        for text in ["w", "wa", "wal", "wall"] {
            handle.dispatch(Event::SearchInputChanged { text: text.into() });
        }
        time::sleep(Duration::from_secs(1)).await;

        assert_eq!(stub.count("/search"), 1);
        assert!(stub.requests()[0].contains("q=wall"));
        let view = handle.view().borrow().clone();
        assert_eq!(view.search.suggestions, vec!["wallet", "wall clock"]);
        assert_eq!(view.search.phase, SuggestionPhase::Settled);

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn slow_stale_suggestions_never_overwrite() {
        let stub = Arc::new(
            StubTransport::new()
                .route_delayed(
                    HttpMethod::Get,
                    "q=wal",
                    200,
                    json!(["wallet"]),
                    Duration::from_millis(100),
                )
                .route_delayed(
                    HttpMethod::Get,
                    "q=wa",
                    200,
                    json!(["water bottle"]),
                    Duration::from_secs(2),
                ),
        );
        let (handle, task) = spawn(Arc::clone(&stub));

        handle.dispatch(Event::SearchInputChanged { text: "wa".into() });
        time::sleep(Duration::from_millis(300)).await;
        handle.dispatch(Event::SearchInputChanged { text: "wal".into() });
        time::sleep(Duration::from_secs(5)).await;

        assert_eq!(stub.count("/search"), 2);
        let view = handle.view().borrow().clone();
        assert_eq!(view.search.suggestions, vec!["wallet"]);

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn picked_suggestion_is_broadcast() {
        let stub = Arc::new(StubTransport::new().route(
            HttpMethod::Get,
            "/search",
            200,
            json!(["umbrella"]),
        ));
        let (handle, task) = spawn(stub);
        let mut outcomes = handle.subscribe();

        handle.dispatch(Event::SearchInputChanged { text: "umb".into() });
        time::sleep(Duration::from_secs(1)).await;
        handle.dispatch(Event::SuggestionPicked { index: 0 });

        let outcome = outcomes.recv().await.unwrap();
        assert_eq!(outcome, SearchOutcome::Suggestion("umbrella".into()));

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_fails_after_exit() {
        let (handle, task) = spawn(Arc::new(StubTransport::new()));
        handle.shutdown();
        task.await.unwrap();
        assert!(!handle.dispatch(Event::RefreshRequested));
    }
}
