use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};

use crate::gateway::{GatewayError, GatewayResult};
use crate::model::{
    AdvancedSearchFilters, Analytics, Catalog, Category, FeedFilter, FeedSnapshot, FoundReport,
    Item, LostReport, ReportReceipt,
};
use crate::mutation::MutationTicket;
use crate::poller::FetchTicket;

/// One remote call the shell performs against the lost & found backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ApiCall {
    FetchFeed {
        ticket: FetchTicket,
        filter: FeedFilter,
    },
    FetchSuggestions {
        seq: u64,
        query: String,
        category: Option<Category>,
    },
    Mutate(MutationTicket),
    SubmitLost(Box<LostReport>),
    SubmitFound(Box<FoundReport>),
    FetchAnalytics,
    FetchCatalog,
    AdvancedSearch(Box<AdvancedSearchFilters>),
}

impl ApiCall {
    pub fn name(&self) -> &'static str {
        match self {
            Self::FetchFeed { .. } => "fetch_feed",
            Self::FetchSuggestions { .. } => "fetch_suggestions",
            Self::Mutate(_) => "mutate",
            Self::SubmitLost(_) => "submit_lost",
            Self::SubmitFound(_) => "submit_found",
            Self::FetchAnalytics => "fetch_analytics",
            Self::FetchCatalog => "fetch_catalog",
            Self::AdvancedSearch(_) => "advanced_search",
        }
    }
}

/// The shell's answer to an [`ApiCall`]. Each call has exactly one matching
/// variant; the submit calls share `Report`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ApiResponse {
    Feed(GatewayResult<FeedSnapshot>),
    Suggestions(GatewayResult<Vec<String>>),
    Mutation(GatewayResult<()>),
    Report(GatewayResult<ReportReceipt>),
    Analytics(GatewayResult<Analytics>),
    Catalog(GatewayResult<Catalog>),
    Items(GatewayResult<Vec<Item>>),
}

impl Operation for ApiCall {
    type Output = ApiResponse;
}

pub struct Api<E> {
    context: CapabilityContext<ApiCall, E>,
}

impl<Ev> Capability<Ev> for Api<Ev> {
    type Operation = ApiCall;
    type MappedSelf<MappedEv> = Api<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        Api::new(self.context.map_event(f))
    }
}

impl<E> Api<E>
where
    E: Send + 'static,
{
    pub fn new(context: CapabilityContext<ApiCall, E>) -> Self {
        Self { context }
    }

    pub fn fetch_feed<F>(&self, ticket: FetchTicket, filter: FeedFilter, callback: F)
    where
        F: FnOnce(GatewayResult<FeedSnapshot>) -> E + Send + 'static,
    {
        self.call(ApiCall::FetchFeed { ticket, filter }, callback, |r| match r {
            ApiResponse::Feed(result) => Some(result),
            _ => None,
        });
    }

    pub fn fetch_suggestions<F>(
        &self,
        seq: u64,
        query: String,
        category: Option<Category>,
        callback: F,
    ) where
        F: FnOnce(GatewayResult<Vec<String>>) -> E + Send + 'static,
    {
        let call = ApiCall::FetchSuggestions {
            seq,
            query,
            category,
        };
        self.call(call, callback, |r| match r {
            ApiResponse::Suggestions(result) => Some(result),
            _ => None,
        });
    }

    pub fn mutate<F>(&self, ticket: MutationTicket, callback: F)
    where
        F: FnOnce(GatewayResult<()>) -> E + Send + 'static,
    {
        self.call(ApiCall::Mutate(ticket), callback, |r| match r {
            ApiResponse::Mutation(result) => Some(result),
            _ => None,
        });
    }

    pub fn submit_lost<F>(&self, report: Box<LostReport>, callback: F)
    where
        F: FnOnce(GatewayResult<ReportReceipt>) -> E + Send + 'static,
    {
        self.call(ApiCall::SubmitLost(report), callback, |r| match r {
            ApiResponse::Report(result) => Some(result),
            _ => None,
        });
    }

    pub fn submit_found<F>(&self, report: Box<FoundReport>, callback: F)
    where
        F: FnOnce(GatewayResult<ReportReceipt>) -> E + Send + 'static,
    {
        self.call(ApiCall::SubmitFound(report), callback, |r| match r {
            ApiResponse::Report(result) => Some(result),
            _ => None,
        });
    }

    pub fn fetch_analytics<F>(&self, callback: F)
    where
        F: FnOnce(GatewayResult<Analytics>) -> E + Send + 'static,
    {
        self.call(ApiCall::FetchAnalytics, callback, |r| match r {
            ApiResponse::Analytics(result) => Some(result),
            _ => None,
        });
    }

    pub fn fetch_catalog<F>(&self, callback: F)
    where
        F: FnOnce(GatewayResult<Catalog>) -> E + Send + 'static,
    {
        self.call(ApiCall::FetchCatalog, callback, |r| match r {
            ApiResponse::Catalog(result) => Some(result),
            _ => None,
        });
    }

    pub fn advanced_search<F>(&self, filters: Box<AdvancedSearchFilters>, callback: F)
    where
        F: FnOnce(GatewayResult<Vec<Item>>) -> E + Send + 'static,
    {
        self.call(ApiCall::AdvancedSearch(filters), callback, |r| match r {
            ApiResponse::Items(result) => Some(result),
            _ => None,
        });
    }

    fn call<T, F>(
        &self,
        call: ApiCall,
        callback: F,
        extract: fn(ApiResponse) -> Option<GatewayResult<T>>,
    ) where
        T: 'static,
        F: FnOnce(GatewayResult<T>) -> E + Send + 'static,
    {
        let context = self.context.clone();
        let name = call.name();
        self.context.spawn(async move {
            let response = context.request_from_shell(call).await;
            let result = extract(response).unwrap_or_else(|| {
                Err(GatewayError::Network {
                    message: format!("shell answered {name} with the wrong response"),
                })
            });
            context.update_app(callback(result));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_call_names() {
        assert_eq!(ApiCall::FetchAnalytics.name(), "fetch_analytics");
        assert_eq!(
            ApiCall::FetchSuggestions {
                seq: 1,
                query: "wal".into(),
                category: None
            }
            .name(),
            "fetch_suggestions"
        );
    }

    #[test]
    fn responses_survive_the_shell_boundary() {
        let response = ApiResponse::Mutation(Err(GatewayError::Server {
            code: 404,
            message: "Item not found".into(),
        }));
        let wire = serde_json::to_string(&response).unwrap();
        let back: ApiResponse = serde_json::from_str(&wire).unwrap();
        assert_eq!(back, response);
    }
}
