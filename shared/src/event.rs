use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::CoreConfig;
use crate::gateway::GatewayError;
use crate::model::{
    AdvancedSearchFilters, Analytics, Catalog, Category, FeedFilter, FeedSnapshot, FoundReport,
    Item, LostReport, ReportReceipt,
};
use crate::mutation::MutationTicket;
use crate::poller::FetchTicket;

// --- Typed IDs ---

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

// Assigned by the remote store; the core never mints one.
typed_id!(ItemId);

// --- Local precondition failures: no network call is made when one of these is raised ---

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("item id must not be empty")]
    EmptyItemId,
    #[error("Please enter your name to claim this item.")]
    MissingClaimantName,
    #[error("Please enter your phone number to claim this item.")]
    MissingClaimantPhone,
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

// --- Event enum: everything that can happen to the core, user input and completions alike ---

#[derive(Clone, Debug)]
pub enum Event {
    Noop,

    // Lifecycle
    /// Replaces all core state with a fresh model built from the config.
    /// The shell sends this once, before anything else.
    Configured(Box<CoreConfig>),
    Started,
    Stopped,

    // Search box
    SearchInputChanged {
        text: String,
    },
    SearchCategoryChanged {
        category: Option<Category>,
    },
    SuggestionDebounceElapsed {
        window: u64,
    },
    SuggestionsLoaded {
        seq: u64,
        result: Result<Vec<String>, GatewayError>,
    },
    SuggestionNext,
    SuggestionPrevious,
    SuggestionSubmit,
    SuggestionPicked {
        index: usize,
    },
    SuggestionEscape,

    // Feed
    PollTick {
        generation: u64,
    },
    RefreshRequested,
    FeedFilterChanged {
        filter: FeedFilter,
    },
    LocalFilterChanged {
        text: String,
    },
    FeedLoaded {
        ticket: FetchTicket,
        result: Result<FeedSnapshot, GatewayError>,
    },

    // Lifecycle mutations
    DeleteRequested {
        id: ItemId,
    },
    ClaimRequested {
        id: ItemId,
        name: String,
        phone: String,
    },
    ArchiveRequested {
        id: ItemId,
    },
    MutationCompleted {
        ticket: MutationTicket,
        result: Result<(), GatewayError>,
    },

    // Map and list selection
    BuildingSelected {
        key: String,
    },
    ItemSelected {
        id: ItemId,
    },
    ItemMenuToggled {
        id: ItemId,
    },
    Dismissed,

    // Reports
    SubmitLost(Box<LostReport>),
    SubmitFound(Box<FoundReport>),
    ReportSubmitted {
        result: Result<ReportReceipt, GatewayError>,
    },

    // Auxiliary reads
    AnalyticsRequested,
    AnalyticsLoaded(Result<Analytics, GatewayError>),
    CatalogRequested,
    CatalogLoaded(Result<Catalog, GatewayError>),
    AdvancedSearchRequested(Box<AdvancedSearchFilters>),
    AdvancedSearchLoaded(Result<Vec<Item>, GatewayError>),

    ErrorDismissed,
}

impl Event {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Noop => "noop",
            Self::Configured(_) => "configured",
            Self::Started => "started",
            Self::Stopped => "stopped",
            Self::SearchInputChanged { .. } => "search_input_changed",
            Self::SearchCategoryChanged { .. } => "search_category_changed",
            Self::SuggestionDebounceElapsed { .. } => "suggestion_debounce_elapsed",
            Self::SuggestionsLoaded { .. } => "suggestions_loaded",
            Self::SuggestionNext => "suggestion_next",
            Self::SuggestionPrevious => "suggestion_previous",
            Self::SuggestionSubmit => "suggestion_submit",
            Self::SuggestionPicked { .. } => "suggestion_picked",
            Self::SuggestionEscape => "suggestion_escape",
            Self::PollTick { .. } => "poll_tick",
            Self::RefreshRequested => "refresh_requested",
            Self::FeedFilterChanged { .. } => "feed_filter_changed",
            Self::LocalFilterChanged { .. } => "local_filter_changed",
            Self::FeedLoaded { .. } => "feed_loaded",
            Self::DeleteRequested { .. } => "delete_requested",
            Self::ClaimRequested { .. } => "claim_requested",
            Self::ArchiveRequested { .. } => "archive_requested",
            Self::MutationCompleted { .. } => "mutation_completed",
            Self::BuildingSelected { .. } => "building_selected",
            Self::ItemSelected { .. } => "item_selected",
            Self::ItemMenuToggled { .. } => "item_menu_toggled",
            Self::Dismissed => "dismissed",
            Self::SubmitLost(_) => "submit_lost",
            Self::SubmitFound(_) => "submit_found",
            Self::ReportSubmitted { .. } => "report_submitted",
            Self::AnalyticsRequested => "analytics_requested",
            Self::AnalyticsLoaded(_) => "analytics_loaded",
            Self::CatalogRequested => "catalog_requested",
            Self::CatalogLoaded(_) => "catalog_loaded",
            Self::AdvancedSearchRequested(_) => "advanced_search_requested",
            Self::AdvancedSearchLoaded(_) => "advanced_search_loaded",
            Self::ErrorDismissed => "error_dismissed",
        }
    }

    /// Completions and timer callbacks are not user initiated; they are the
    /// ones that must pass a sequence or generation guard before touching state.
    #[must_use]
    pub fn is_user_initiated(&self) -> bool {
        !matches!(
            self,
            Self::Noop
                | Self::Configured(_)
                | Self::SuggestionDebounceElapsed { .. }
                | Self::SuggestionsLoaded { .. }
                | Self::PollTick { .. }
                | Self::FeedLoaded { .. }
                | Self::MutationCompleted { .. }
                | Self::ReportSubmitted { .. }
                | Self::AnalyticsLoaded(_)
                | Self::CatalogLoaded(_)
                | Self::AdvancedSearchLoaded(_)
        )
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::Noop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_id_serializes_transparently() {
        let id = ItemId::new("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
        let back: ItemId = serde_json::from_str("\"xyz\"").unwrap();
        assert_eq!(back.as_str(), "xyz");
    }

    #[test]
    fn blank_item_ids_are_detected() {
        assert!(ItemId::new("").is_blank());
        assert!(ItemId::new("   ").is_blank());
        assert!(!ItemId::new("42").is_blank());
    }

    #[test]
    fn event_default_is_noop() {
        assert!(matches!(Event::default(), Event::Noop));
    }

    #[test]
    fn event_names() {
        assert_eq!(Event::Noop.name(), "noop");
        assert_eq!(Event::RefreshRequested.name(), "refresh_requested");
        assert_eq!(
            Event::SearchInputChanged { text: "w".into() }.name(),
            "search_input_changed"
        );
        assert_eq!(Event::PollTick { generation: 1 }.name(), "poll_tick");
    }

    #[test]
    fn completions_are_not_user_initiated() {
        assert!(Event::RefreshRequested.is_user_initiated());
        assert!(Event::ClaimRequested {
            id: "a".into(),
            name: "Ali".into(),
            phone: "0300".into(),
        }
        .is_user_initiated());
        assert!(!Event::PollTick { generation: 3 }.is_user_initiated());
        assert!(!Event::Configured(Box::default()).is_user_initiated());
        assert!(!Event::SuggestionsLoaded {
            seq: 1,
            result: Ok(vec![]),
        }
        .is_user_initiated());
    }

    #[test]
    fn event_size_is_reasonable() {
        let size = std::mem::size_of::<Event>();
        assert!(
            size <= 256,
            "Event enum is {} bytes, box more variants",
            size
        );
    }
}
