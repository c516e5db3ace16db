#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod capabilities;
pub mod config;
pub mod event;
pub mod gateway;
pub mod model;
pub mod mutation;
pub mod poller;
pub mod runtime;
pub mod selection;
pub mod spatial;
pub mod suggest;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use app::App;
pub use capabilities::{Capabilities, Effect};
pub use crux_core::App as CruxApp;
pub use config::CoreConfig;
pub use event::{Event, ItemId, ValidationError};
pub use gateway::{GatewayError, RemoteGateway};
pub use runtime::{Runtime, RuntimeHandle};

use crate::model::{
    Analytics, Catalog, FeedFilter, Item, ItemCollection, ReportReceipt, Stats,
};
use crate::mutation::MutationCoordinator;
use crate::poller::Poller;
use crate::selection::{SelectionAction, SelectionState};
use crate::spatial::{BuildingMarker, SpatialIndex};
use crate::suggest::{SearchOutcome, SuggestionEngine, SuggestionPhase};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_DEBOUNCE_MS: u64 = 200;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10_000;
pub const MIN_QUERY_CHARS: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    Network,
    Timeout,
    Server,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::Network => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Server => "SERVER_ERROR",
        }
    }

    /// Informational only; nothing in the core retries on its own.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::Timeout)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
    pub status: Option<u16>,
    pub context: HashMap<String, String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            context: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind {
            ErrorKind::Validation => self.message.clone(),
            ErrorKind::Network => {
                "Unable to reach the lost & found service. Please check your connection and try again."
                    .into()
            }
            ErrorKind::Timeout => "The request timed out. Please try again.".into(),
            ErrorKind::Server => match self.status {
                Some(404) => {
                    "This item could not be found. It may already have been claimed or removed."
                        .into()
                }
                Some(status) if status >= 500 => {
                    "The lost & found service ran into a problem. Please try again later.".into()
                }
                _ => self.message.clone(),
            },
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)
    }
}

impl std::error::Error for AppError {}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        Self::new(ErrorKind::Validation, e.to_string())
    }
}

impl From<GatewayError> for AppError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Network { message } => Self::new(ErrorKind::Network, message),
            GatewayError::Timeout { timeout_ms } => {
                Self::new(ErrorKind::Timeout, format!("timed out after {timeout_ms}ms"))
                    .with_context("timeout_ms", timeout_ms.to_string())
            }
            GatewayError::Server { code, message } => Self::new(ErrorKind::Server, message)
                .with_status(code)
                .with_context("http_status", code.to_string()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UserFacingError {
    pub message: String,
    pub is_retryable: bool,
    pub error_code: String,
}

impl From<&AppError> for UserFacingError {
    fn from(e: &AppError) -> Self {
        Self {
            message: e.user_facing_message(),
            is_retryable: e.is_retryable(),
            error_code: e.code().to_string(),
        }
    }
}

pub struct Model {
    pub config: CoreConfig,
    pub items: ItemCollection,
    pub stats: Stats,
    pub feed_filter: FeedFilter,
    pub local_filter: String,
    pub search: SuggestionEngine,
    pub poller: Poller,
    pub mutations: MutationCoordinator,
    pub selection: SelectionState,
    pub spatial: SpatialIndex,
    pub active_error: Option<AppError>,
    pub submitting_report: bool,
    pub last_report: Option<ReportReceipt>,
    pub last_search: Option<SearchOutcome>,
    pub analytics: Option<Analytics>,
    pub catalog: Option<Catalog>,
    pub advanced_results: Option<Vec<Item>>,
}

impl Default for Model {
    fn default() -> Self {
        Self::new(CoreConfig::default())
    }
}

impl Model {
    #[must_use]
    pub fn new(config: CoreConfig) -> Self {
        Self {
            items: ItemCollection::new(),
            stats: Stats::default(),
            feed_filter: config.feed,
            local_filter: String::new(),
            search: SuggestionEngine::new(config.debounce(), config.min_query_chars),
            poller: Poller::new(config.poll_interval()),
            mutations: MutationCoordinator::new(),
            selection: SelectionState::None,
            spatial: SpatialIndex::campus(),
            active_error: None,
            submitting_report: false,
            last_report: None,
            last_search: None,
            analytics: None,
            catalog: None,
            advanced_results: None,
            config,
        }
    }

    /// The collection narrowed by the local text filter.
    #[must_use]
    pub fn visible_items(&self) -> Vec<&Item> {
        let needle = self.local_filter.trim();
        self.items
            .iter()
            .filter(|item| item.matches_text(needle))
            .collect()
    }

    pub fn set_error(&mut self, error: AppError) {
        self.active_error = Some(error);
    }

    pub fn clear_error(&mut self) {
        self.active_error = None;
    }

    pub fn select(&mut self, action: SelectionAction) {
        self.selection = selection::reduce(&self.selection, action);
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchView {
    pub query: String,
    pub suggestions: Vec<String>,
    pub highlighted: Option<usize>,
    pub visible: bool,
    pub phase: SuggestionPhase,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BuildingView {
    pub key: String,
    pub name: String,
    pub icon: String,
    pub items: Vec<Item>,
    pub selected_item: Option<ItemId>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ViewModel {
    pub items: Vec<Item>,
    pub total_loaded: usize,
    pub stats: Stats,
    pub feed_filter: FeedFilter,
    pub local_filter: String,
    pub is_polling: bool,
    pub is_refreshing: bool,
    pub feed_error: Option<UserFacingError>,
    pub search: SearchView,
    pub markers: Vec<BuildingMarker>,
    pub selection: SelectionState,
    pub building: Option<BuildingView>,
    pub pending_ids: Vec<ItemId>,
    pub error: Option<UserFacingError>,
    pub submitting_report: bool,
    pub last_report: Option<ReportReceipt>,
    pub last_search: Option<SearchOutcome>,
    pub analytics: Option<Analytics>,
    pub catalog: Option<Catalog>,
    pub advanced_results: Option<Vec<Item>>,
}

pub mod app {
    use super::*;
    use crate::capabilities::{Capabilities, TimerKind};
    use crate::mutation::{MutationOutcome, MutationTicket};
    use crate::poller::{FetchTicket, RefreshOutcome};
    use crate::suggest::{InputOutcome, SuggestionFetch};
    use tracing::{debug, info, trace};

    #[derive(Default, Debug, Clone, Copy)]
    pub struct App;

    impl App {
        fn fetch_feed(model: &Model, ticket: FetchTicket, caps: &Capabilities) {
            caps.api
                .fetch_feed(ticket, model.feed_filter, move |result| Event::FeedLoaded {
                    ticket,
                    result,
                });
        }

        /// Re-arms the poll timer for the next tick of `generation`.
        fn schedule_poll(model: &Model, generation: u64, caps: &Capabilities) {
            caps.timer.start(
                TimerKind::Poll,
                model.poller.period(),
                Event::PollTick { generation },
            );
        }

        fn debounce(outcome: InputOutcome, caps: &Capabilities) {
            match outcome {
                InputOutcome::Cleared => caps.timer.cancel(TimerKind::Debounce),
                InputOutcome::Debounce { window, delay } => caps.timer.start(
                    TimerKind::Debounce,
                    delay,
                    Event::SuggestionDebounceElapsed { window },
                ),
            }
        }

        /// The suggestion highlight is one of the exclusive selections.
        fn sync_highlight(model: &mut Model) {
            let highlighted = if model.search.is_visible() {
                model.search.highlighted()
            } else {
                None
            };
            model.select(SelectionAction::HighlightSuggestion(highlighted));
        }

        fn finish_search(model: &mut Model, outcome: SearchOutcome, caps: &Capabilities) {
            debug!(?outcome, "search submitted");
            model.last_search = Some(outcome.clone());
            Self::sync_highlight(model);
            caps.search.completed(outcome);
        }

        fn queue_mutation(
            model: &mut Model,
            id: &ItemId,
            requested: Result<MutationTicket, ValidationError>,
            caps: &Capabilities,
        ) {
            if model.selection.open_menu() == Some(id) {
                model.select(SelectionAction::Dismiss);
            }
            match requested {
                Ok(ticket) => {
                    model.clear_error();
                    let pending = ticket.clone();
                    caps.api.mutate(ticket, move |result| Event::MutationCompleted {
                        ticket: pending,
                        result,
                    });
                }
                Err(e) => {
                    debug!(item_id = %id, error = %e, "mutation rejected locally");
                    model.set_error(AppError::from(e).with_context("item_id", id.as_str()));
                }
            }
        }

        /// Drops selections that point at items no longer in the collection.
        fn prune_selection(model: &mut Model) {
            let stale = model
                .selection
                .open_menu()
                .or_else(|| model.selection.selected_item())
                .filter(|id| !model.items.contains(id))
                .cloned();
            if let Some(id) = stale {
                model.select(SelectionAction::Forget(id));
            }
        }
    }

    impl crux_core::App for App {
        type Event = Event;
        type Model = Model;
        type ViewModel = ViewModel;
        type Capabilities = Capabilities;

        fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
            let event_name = event.name();
            if event.is_user_initiated() {
                debug!(event = event_name, "user action");
            } else {
                trace!(event = event_name, "completion");
            }

            let mut render = true;

            match event {
                Event::Noop => render = false,

                Event::Configured(config) => {
                    info!(base_url = %config.base_url, feed = ?config.feed, "core configured");
                    caps.timer.cancel(TimerKind::Poll);
                    caps.timer.cancel(TimerKind::Debounce);
                    *model = Model::new(*config);
                }

                Event::Started => {
                    if let Some(start) = model.poller.start() {
                        Self::schedule_poll(model, start.generation, caps);
                        Self::fetch_feed(model, start.initial, caps);
                    }
                }

                Event::Stopped => {
                    model.poller.stop();
                    model.search.stop();
                    caps.timer.cancel(TimerKind::Poll);
                    caps.timer.cancel(TimerKind::Debounce);
                }

                Event::SearchInputChanged { text } => {
                    let outcome = model.search.input(text);
                    Self::sync_highlight(model);
                    Self::debounce(outcome, caps);
                }

                Event::SearchCategoryChanged { category } => {
                    let outcome = model.search.set_category(category);
                    Self::sync_highlight(model);
                    Self::debounce(outcome, caps);
                }

                Event::SuggestionDebounceElapsed { window } => {
                    match model.search.debounce_elapsed(window) {
                        Some(SuggestionFetch {
                            seq,
                            query,
                            category,
                        }) => caps.api.fetch_suggestions(seq, query, category, move |result| {
                            Event::SuggestionsLoaded { seq, result }
                        }),
                        None => render = false,
                    }
                }

                Event::SuggestionsLoaded { seq, result } => {
                    if model.search.apply(seq, result) {
                        Self::sync_highlight(model);
                    } else {
                        render = false;
                    }
                }

                Event::SuggestionNext => {
                    model.search.next();
                    Self::sync_highlight(model);
                }

                Event::SuggestionPrevious => {
                    model.search.previous();
                    Self::sync_highlight(model);
                }

                Event::SuggestionSubmit => {
                    let outcome = model.search.submit();
                    Self::finish_search(model, outcome, caps);
                }

                Event::SuggestionPicked { index } => match model.search.select(index) {
                    Some(outcome) => Self::finish_search(model, outcome, caps),
                    None => render = false,
                },

                Event::SuggestionEscape => {
                    model.search.escape();
                    Self::sync_highlight(model);
                }

                Event::PollTick { generation } => match model.poller.tick(generation) {
                    Some(ticket) => {
                        Self::fetch_feed(model, ticket, caps);
                        Self::schedule_poll(model, generation, caps);
                    }
                    None => render = false,
                },

                Event::RefreshRequested => {
                    let ticket = model.poller.trigger();
                    Self::fetch_feed(model, ticket, caps);
                }

                Event::FeedFilterChanged { filter } => {
                    if filter != model.feed_filter {
                        model.feed_filter = filter;
                        model.poller.invalidate();
                    }
                    let ticket = model.poller.trigger();
                    Self::fetch_feed(model, ticket, caps);
                }

                Event::LocalFilterChanged { text } => {
                    model.local_filter = text;
                }

                Event::FeedLoaded { ticket, result } => {
                    let outcome =
                        model
                            .poller
                            .resolve(ticket, result, &mut model.items, &mut model.stats);
                    // A discarded result still renders: the refreshing flag may have cleared.
                    if let RefreshOutcome::Applied { .. } = outcome {
                        Self::prune_selection(model);
                    }
                }

                Event::DeleteRequested { id } => {
                    let requested = model.mutations.request_delete(&id, &model.items);
                    Self::queue_mutation(model, &id, requested, caps);
                }

                Event::ClaimRequested { id, name, phone } => {
                    let requested = model
                        .mutations
                        .request_claim(&id, &name, &phone, &model.items);
                    Self::queue_mutation(model, &id, requested, caps);
                }

                Event::ArchiveRequested { id } => {
                    let requested = model.mutations.request_archive(&id, &model.items);
                    Self::queue_mutation(model, &id, requested, caps);
                }

                Event::MutationCompleted { ticket, result } => {
                    let watermark = model.poller.next_request_seq();
                    let outcome = model.mutations.finish(
                        &ticket,
                        result,
                        &mut model.items,
                        &mut model.stats,
                        watermark,
                    );
                    match outcome {
                        MutationOutcome::Confirmed { item_id, .. } => {
                            model.select(SelectionAction::Forget(item_id));
                        }
                        MutationOutcome::Rejected { item_id, op, error } => {
                            model.set_error(
                                AppError::from(error)
                                    .with_context("item_id", item_id.as_str())
                                    .with_context("operation", op),
                            );
                        }
                    }
                }

                Event::BuildingSelected { key } => {
                    let entry = model.spatial.resolve(&key);
                    let first_item = model
                        .spatial
                        .items_in_zone(&entry.key, &model.items)
                        .first()
                        .map(|item| item.id.clone());
                    let key = entry.key.clone();
                    model.select(SelectionAction::SelectBuilding { key, first_item });
                }

                Event::ItemSelected { id } => {
                    if model.items.contains(&id) {
                        model.select(SelectionAction::SelectItem(id));
                    } else {
                        render = false;
                    }
                }

                Event::ItemMenuToggled { id } => {
                    model.select(SelectionAction::ToggleMenu(id));
                }

                Event::Dismissed => {
                    model.search.escape();
                    model.select(SelectionAction::Dismiss);
                }

                Event::SubmitLost(report) => match report.validate() {
                    Ok(()) => {
                        model.submitting_report = true;
                        model.clear_error();
                        caps.api
                            .submit_lost(report, |result| Event::ReportSubmitted { result });
                    }
                    Err(e) => model.set_error(e.into()),
                },

                Event::SubmitFound(report) => match report.validate() {
                    Ok(()) => {
                        model.submitting_report = true;
                        model.clear_error();
                        caps.api
                            .submit_found(report, |result| Event::ReportSubmitted { result });
                    }
                    Err(e) => model.set_error(e.into()),
                },

                Event::ReportSubmitted { result } => {
                    model.submitting_report = false;
                    match result {
                        Ok(receipt) => {
                            model.last_report = Some(receipt);
                            let ticket = model.poller.trigger();
                            Self::fetch_feed(model, ticket, caps);
                        }
                        Err(e) => model.set_error(e.into()),
                    }
                }

                Event::AnalyticsRequested => {
                    caps.api.fetch_analytics(Event::AnalyticsLoaded);
                    render = false;
                }

                Event::AnalyticsLoaded(result) => match result {
                    Ok(analytics) => model.analytics = Some(analytics),
                    Err(e) => model.set_error(e.into()),
                },

                Event::CatalogRequested => {
                    caps.api.fetch_catalog(Event::CatalogLoaded);
                    render = false;
                }

                Event::CatalogLoaded(result) => match result {
                    Ok(catalog) => model.catalog = Some(catalog),
                    Err(e) => model.set_error(e.into()),
                },

                Event::AdvancedSearchRequested(filters) => {
                    caps.api.advanced_search(filters, Event::AdvancedSearchLoaded);
                    render = false;
                }

                Event::AdvancedSearchLoaded(result) => match result {
                    Ok(items) => model.advanced_results = Some(items),
                    Err(e) => model.set_error(e.into()),
                },

                Event::ErrorDismissed => model.clear_error(),
            }

            if render {
                caps.render.render();
            }
        }

        fn view(&self, model: &Model) -> ViewModel {
            let building = model.selection.building().map(|key| {
                let entry = model.spatial.resolve(key);
                BuildingView {
                    key: entry.key.clone(),
                    name: entry.name.clone(),
                    icon: entry.icon.clone(),
                    items: model
                        .spatial
                        .items_in_zone(&entry.key, &model.items)
                        .into_iter()
                        .cloned()
                        .collect(),
                    selected_item: model.selection.selected_item().cloned(),
                }
            });

            ViewModel {
                items: model.visible_items().into_iter().cloned().collect(),
                total_loaded: model.items.len(),
                stats: model.stats,
                feed_filter: model.feed_filter,
                local_filter: model.local_filter.clone(),
                is_polling: model.poller.is_running(),
                is_refreshing: model.poller.is_refreshing(),
                feed_error: model
                    .poller
                    .last_error()
                    .map(|e| UserFacingError::from(&AppError::from(e.clone()))),
                search: SearchView {
                    query: model.search.query().to_string(),
                    suggestions: model.search.suggestions().to_vec(),
                    highlighted: model.search.highlighted(),
                    visible: model.search.is_visible(),
                    phase: model.search.phase(),
                },
                markers: model.spatial.markers(&model.items),
                selection: model.selection.clone(),
                building,
                pending_ids: model.mutations.pending_ids(),
                error: model.active_error.as_ref().map(UserFacingError::from),
                submitting_report: model.submitting_report,
                last_report: model.last_report.clone(),
                last_search: model.last_search.clone(),
                analytics: model.analytics.clone(),
                catalog: model.catalog.clone(),
                advanced_results: model.advanced_results.clone(),
            }
        }
    }
}
