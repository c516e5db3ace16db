//! Typed wrapper over the campus lost & found HTTP API.
//!
//! Stateless apart from configuration. Every call is bounded by the
//! configured timeout and fails with a [`GatewayError`]; nothing is retried
//! here.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::capabilities::http::{
    HttpError, HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport,
    ValidatedUrl,
};
use crate::config::CoreConfig;
use crate::event::ItemId;
use crate::model::{
    Ack, AdvancedSearchFilters, Analytics, ArchiveExpiredResponse, Catalog, Category, FeedFilter,
    FeedSnapshot, FoundReport, Item, LostReport, ReportReceipt, Stats, SubmitFoundResponse,
    SubmitLostResponse, WebhookConfig,
};
use crate::mutation::{Claimant, MutationOp, MutationTicket};

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum GatewayError {
    #[error("network error: {message}")]
    Network { message: String },

    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("server error {code}: {message}")]
    Server { code: u16, message: String },
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl GatewayError {
    /// Maps a non-2xx response, preferring the backend's `{"error": ...}` text.
    pub fn from_response(response: &HttpResponse) -> Self {
        let code = response.status();
        let message = serde_json::from_slice::<ErrorBody>(response.body())
            .ok()
            .map(|body| body.error)
            .filter(|msg| !msg.trim().is_empty())
            .unwrap_or_else(|| format!("HTTP error: {code}"));
        Self::Server { code, message }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<HttpError> for GatewayError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Timeout { timeout_ms, .. } => Self::Timeout { timeout_ms },
            other => Self::Network {
                message: other.to_string(),
            },
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Clone)]
pub struct RemoteGateway {
    transport: Arc<dyn HttpTransport>,
    base: ValidatedUrl,
    timeout: Duration,
}

impl std::fmt::Debug for RemoteGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteGateway")
            .field("base", &self.base.as_str())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RemoteGateway {
    pub fn new(transport: Arc<dyn HttpTransport>, config: &CoreConfig) -> GatewayResult<Self> {
        let base = ValidatedUrl::new(config.base_url.as_str())?;
        Ok(Self {
            transport,
            base,
            timeout: config.request_timeout(),
        })
    }

    /// Gateway over a fresh `reqwest` client.
    pub fn connect(config: &CoreConfig) -> GatewayResult<Self> {
        let transport = ReqwestTransport::new()?;
        Self::new(Arc::new(transport), config)
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn request(&self, method: HttpMethod, segments: &[&str]) -> GatewayResult<HttpRequest> {
        let url = self.base.join_segments(segments)?;
        Ok(HttpRequest::new(method, url).with_timeout(self.timeout)?)
    }

    async fn send(&self, request: HttpRequest) -> GatewayResult<HttpResponse> {
        let timeout_ms = request.timeout_ms();
        let method = request.method().as_str();
        let url = request.url().as_str().to_string();

        let response = match tokio::time::timeout(self.timeout, self.transport.execute(request))
            .await
        {
            Err(_elapsed) => {
                warn!(method, %url, timeout_ms, "request timed out");
                return Err(GatewayError::Timeout { timeout_ms });
            }
            Ok(result) => result?,
        };

        if !response.is_success() {
            let err = GatewayError::from_response(&response);
            warn!(method, %url, status = response.status(), %err, "request rejected");
            return Err(err);
        }

        debug!(
            method,
            %url,
            status = response.status(),
            request_id = response.request_id(),
            duration_ms = response.duration_ms(),
            "request completed"
        );
        Ok(response)
    }

    fn decode<T: DeserializeOwned>(response: &HttpResponse) -> GatewayResult<T> {
        response.json().map_err(|e| GatewayError::Server {
            code: response.status(),
            message: format!("malformed response: {e}"),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> GatewayResult<T> {
        let request = self.request(HttpMethod::Get, segments)?;
        let response = self.send(request).await?;
        Self::decode(&response)
    }

    async fn post_ack(&self, segments: &[&str]) -> GatewayResult<Ack> {
        let request = self.request(HttpMethod::Post, segments)?;
        let response = self.send(request).await?;
        Self::decode(&response)
    }

    // --- Reports ---

    #[instrument(skip(self, report), fields(name = %report.name))]
    pub async fn submit_lost(&self, report: &LostReport) -> GatewayResult<ReportReceipt> {
        let request = self.request(HttpMethod::Post, &["lost"])?.with_json(report)?;
        let response = self.send(request).await?;
        let body: SubmitLostResponse = Self::decode(&response)?;
        Ok(ReportReceipt::Lost { id: body.id })
    }

    #[instrument(skip(self, report), fields(name = %report.name))]
    pub async fn submit_found(&self, report: &FoundReport) -> GatewayResult<ReportReceipt> {
        let request = self.request(HttpMethod::Post, &["found"])?.with_json(report)?;
        let response = self.send(request).await?;
        let body: SubmitFoundResponse = Self::decode(&response)?;
        Ok(ReportReceipt::Found {
            id: body.id,
            matches: body.matches,
        })
    }

    // --- Lifecycle mutations ---

    #[instrument(skip(self), fields(item_id = %id))]
    pub async fn delete_item(&self, id: &ItemId) -> GatewayResult<Ack> {
        let request = self.request(HttpMethod::Delete, &["item", id.as_str()])?;
        let response = self.send(request).await?;
        Self::decode(&response)
    }

    #[instrument(skip(self), fields(item_id = %id))]
    pub async fn archive_item(&self, id: &ItemId) -> GatewayResult<Ack> {
        self.post_ack(&["item", id.as_str(), "archive"]).await
    }

    #[instrument(skip(self, claimant), fields(item_id = %id))]
    pub async fn claim_item(&self, id: &ItemId, claimant: &Claimant) -> GatewayResult<Ack> {
        let request = self
            .request(HttpMethod::Post, &["item", id.as_str(), "claim"])?
            .with_json(claimant)?;
        let response = self.send(request).await?;
        Self::decode(&response)
    }

    /// Runs whichever remote call a mutation ticket stands for.
    pub async fn mutate(&self, ticket: &MutationTicket) -> GatewayResult<()> {
        match &ticket.op {
            MutationOp::Delete => self.delete_item(&ticket.item_id).await,
            MutationOp::Claim(claimant) => self.claim_item(&ticket.item_id, claimant).await,
            MutationOp::Archive => self.archive_item(&ticket.item_id).await,
        }
        .map(|_| ())
    }

    // --- Search ---

    #[instrument(skip(self))]
    pub async fn fetch_suggestions(
        &self,
        query: &str,
        category: Option<Category>,
    ) -> GatewayResult<Vec<String>> {
        let mut pairs = vec![("q", query.to_string())];
        if let Some(category) = category {
            pairs.push(("category", category.as_str().to_string()));
        }
        let url = self.base.join_segments(["search"])?.with_query_pairs(pairs.as_slice())?;
        let request = HttpRequest::new(HttpMethod::Get, url).with_timeout(self.timeout)?;
        let response = self.send(request).await?;
        Self::decode(&response)
    }

    #[instrument(skip(self, filters))]
    pub async fn fetch_advanced_search(
        &self,
        filters: &AdvancedSearchFilters,
    ) -> GatewayResult<Vec<Item>> {
        let url = self
            .base
            .join_segments(["search", "advanced"])?
            .with_query_pairs(filters.query_pairs().as_slice())?;
        let request = HttpRequest::new(HttpMethod::Get, url).with_timeout(self.timeout)?;
        let response = self.send(request).await?;
        Self::decode(&response)
    }

    // --- Item sets ---

    #[instrument(skip(self))]
    pub async fn fetch_history(&self) -> GatewayResult<Vec<Item>> {
        self.get_json(&["history"]).await
    }

    #[instrument(skip(self))]
    pub async fn fetch_all(&self) -> GatewayResult<Vec<Item>> {
        self.get_json(&["items"]).await
    }

    #[instrument(skip(self))]
    pub async fn fetch_active(&self) -> GatewayResult<Vec<Item>> {
        self.get_json(&["items", "active"]).await
    }

    #[instrument(skip(self))]
    pub async fn fetch_archived(&self) -> GatewayResult<Vec<Item>> {
        self.get_json(&["items", "archived"]).await
    }

    #[instrument(skip(self))]
    pub async fn fetch_lost(&self) -> GatewayResult<Vec<Item>> {
        self.get_json(&["lost"]).await
    }

    #[instrument(skip(self))]
    pub async fn fetch_found(&self) -> GatewayResult<Vec<Item>> {
        self.get_json(&["found"]).await
    }

    #[instrument(skip(self))]
    pub async fn fetch_by_category(&self, category: Category) -> GatewayResult<Vec<Item>> {
        self.get_json(&["category", category.as_str()]).await
    }

    #[instrument(skip(self))]
    pub async fn fetch_locations(&self) -> GatewayResult<Vec<String>> {
        self.get_json(&["locations"]).await
    }

    #[instrument(skip(self))]
    pub async fn fetch_categories(&self) -> GatewayResult<Vec<String>> {
        self.get_json(&["categories"]).await
    }

    #[instrument(skip(self))]
    pub async fn fetch_stats(&self) -> GatewayResult<Stats> {
        self.get_json(&["stats"]).await
    }

    #[instrument(skip(self))]
    pub async fn fetch_analytics(&self) -> GatewayResult<Analytics> {
        self.get_json(&["analytics"]).await
    }

    /// The item list behind a feed filter together with the counters. Both
    /// must succeed.
    #[instrument(skip(self))]
    pub async fn fetch_feed(&self, filter: FeedFilter) -> GatewayResult<FeedSnapshot> {
        let items = async {
            match filter {
                FeedFilter::All => self.fetch_history().await,
                FeedFilter::Lost => self.fetch_lost().await,
                FeedFilter::Found => self.fetch_found().await,
            }
        };
        let (items, stats) = tokio::try_join!(items, self.fetch_stats())?;
        Ok(FeedSnapshot { items, stats })
    }

    #[instrument(skip(self))]
    pub async fn fetch_catalog(&self) -> GatewayResult<Catalog> {
        let (locations, categories) =
            tokio::try_join!(self.fetch_locations(), self.fetch_categories())?;
        Ok(Catalog {
            locations,
            categories,
        })
    }

    // --- Admin ---

    #[instrument(skip(self))]
    pub async fn get_webhook_config(&self) -> GatewayResult<WebhookConfig> {
        self.get_json(&["webhook", "config"]).await
    }

    #[instrument(skip(self, url))]
    pub async fn set_webhook_config(&self, url: &str) -> GatewayResult<WebhookConfig> {
        let body = WebhookConfig {
            url: url.to_string(),
        };
        let request = self
            .request(HttpMethod::Post, &["webhook", "config"])?
            .with_json(&body)?;
        let response = self.send(request).await?;
        Self::decode(&response)
    }

    #[instrument(skip(self))]
    pub async fn archive_expired(&self) -> GatewayResult<ArchiveExpiredResponse> {
        let request = self.request(HttpMethod::Post, &["archive", "expired"])?;
        let response = self.send(request).await?;
        Self::decode(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::testing::StubTransport;
    use crate::model::ItemKind;
    use httpmock::prelude::*;
    use httpmock::MockServer;
    use serde_json::json;

    fn gateway_for(server: &MockServer) -> RemoteGateway {
        let config = CoreConfig {
            base_url: server.url("/api"),
            request_timeout_ms: 2_000,
            ..CoreConfig::default()
        };
        RemoteGateway::connect(&config).unwrap()
    }

    fn item_json(id: &str, kind: &str, location: &str) -> serde_json::Value {
        json!({
            "id": id,
            "name": format!("item {id}"),
            "color": "black",
            "location": location,
            "owner": "Sara",
            "type": kind,
            "timestamp": 1_700_000_000,
            "description": "",
            "category": "electronics",
            "archived": false,
            "expiresAt": 1_702_592_000
        })
    }

    #[tokio::test]
    async fn fetch_suggestions_sends_query_and_category() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/search")
                .query_param("q", "wall")
                .query_param("category", "accessories");
            then.status(200).json_body(json!(["wallet", "wall clock"]));
        });

        let gateway = gateway_for(&server);
        let suggestions = gateway
            .fetch_suggestions("wall", Some(Category::Accessories))
            .await
            .unwrap();

        assert_eq!(suggestions, vec!["wallet", "wall clock"]);
        mock.assert();
    }

    #[tokio::test]
    async fn claim_posts_claimant_body() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/item/abc/claim")
                .json_body(json!({"claimedBy": "Ali", "claimerPhone": "03001234567"}));
            then.status(200)
                .json_body(json!({"success": true, "message": "Item claimed successfully"}));
        });

        let gateway = gateway_for(&server);
        let claimant = Claimant::new("Ali", "03001234567").unwrap();
        let ack = gateway
            .claim_item(&ItemId::new("abc"), &claimant)
            .await
            .unwrap();

        assert!(ack.success);
        mock.assert();
    }

    #[tokio::test]
    async fn server_error_carries_backend_message() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(DELETE).path("/api/item/missing");
            then.status(404).json_body(json!({"error": "Item not found"}));
        });

        let gateway = gateway_for(&server);
        let err = gateway
            .delete_item(&ItemId::new("missing"))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            GatewayError::Server {
                code: 404,
                message: "Item not found".into()
            }
        );
    }

    #[tokio::test]
    async fn server_error_without_body_uses_status() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/api/analytics");
            then.status(503).body("upstream down");
        });

        let gateway = gateway_for(&server);
        let err = gateway.fetch_analytics().await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::Server {
                code: 503,
                message: "HTTP error: 503".into()
            }
        );
    }

    #[tokio::test]
    async fn malformed_success_body_is_a_server_error() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/api/stats");
            then.status(200).body("not json");
        });

        let gateway = gateway_for(&server);
        let err = gateway.fetch_stats().await.unwrap_err();
        assert!(
            matches!(err, GatewayError::Server { code: 200, ref message } if message.starts_with("malformed response"))
        );
    }

    #[tokio::test]
    async fn fetch_feed_joins_items_and_stats() {
        let server = MockServer::start_async().await;
        let lost = server.mock(|when, then| {
            when.method(GET).path("/api/lost");
            then.status(200)
                .json_body(json!([item_json("1", "lost", "Library")]));
        });
        let stats = server.mock(|when, then| {
            when.method(GET).path("/api/stats");
            then.status(200).json_body(json!({
                "totalItems": 4, "activeItems": 4, "archivedItems": 0,
                "lostItems": 3, "foundItems": 1
            }));
        });

        let gateway = gateway_for(&server);
        let snapshot = gateway.fetch_feed(FeedFilter::Lost).await.unwrap();

        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.items[0].kind, ItemKind::Lost);
        assert_eq!(snapshot.stats.lost_items, 3);
        lost.assert();
        stats.assert();
    }

    #[tokio::test]
    async fn submit_found_returns_ranked_matches() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/api/found");
            then.status(200).json_body(json!({
                "success": true,
                "matches": [{
                    "itemId": "9", "itemName": "Wallet", "owner": "Ali",
                    "location": "Library", "color": "brown",
                    "score": 27.5, "nameScore": 10, "colorScore": 5, "proximityScore": 12.5
                }]
            }));
        });

        let gateway = gateway_for(&server);
        let report = FoundReport {
            name: "Wallet".into(),
            location: "Library".into(),
            description: "brown".into(),
            ..FoundReport::default()
        };
        let receipt = gateway.submit_found(&report).await.unwrap();

        let ReportReceipt::Found { id, matches } = receipt else {
            panic!("expected found receipt");
        };
        assert!(id.is_none());
        assert_eq!(matches[0].item_name, "Wallet");
        assert_eq!(matches[0].score, 27.5);
    }

    #[tokio::test]
    async fn advanced_search_encodes_filters() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/search/advanced")
                .query_param("color", "red")
                .query_param("type", "found")
                .query_param("includeArchived", "true");
            then.status(200).json_body(json!([]));
        });

        let gateway = gateway_for(&server);
        let filters = AdvancedSearchFilters {
            color: Some("red".into()),
            kind: Some(ItemKind::Found),
            include_archived: true,
            ..AdvancedSearchFilters::default()
        };
        let items = gateway.fetch_advanced_search(&filters).await.unwrap();

        assert!(items.is_empty());
        mock.assert();
    }

    #[tokio::test]
    async fn admin_endpoints_decode() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST)
                .path("/api/webhook/config")
                .json_body(json!({"url": "https://hooks.example/n8n"}));
            then.status(200).json_body(json!({
                "success": true, "message": "Webhook URL configured",
                "url": "https://hooks.example/n8n"
            }));
        });
        server.mock(|when, then| {
            when.method(POST).path("/api/archive/expired");
            then.status(200)
                .json_body(json!({"success": true, "archivedCount": 3}));
        });

        let gateway = gateway_for(&server);
        let webhook = gateway
            .set_webhook_config("https://hooks.example/n8n")
            .await
            .unwrap();
        assert_eq!(webhook.url, "https://hooks.example/n8n");

        let archived = gateway.archive_expired().await.unwrap();
        assert_eq!(archived.archived_count, 3);
    }

    #[tokio::test]
    async fn item_sets_hit_their_own_paths() {
        let server = MockServer::start_async().await;
        let all = server.mock(|when, then| {
            when.method(GET).path("/api/items");
            then.status(200).json_body(json!([
                item_json("1", "lost", "Library"),
                item_json("2", "found", "Cafeteria")
            ]));
        });
        let active = server.mock(|when, then| {
            when.method(GET).path("/api/items/active");
            then.status(200)
                .json_body(json!([item_json("2", "found", "Cafeteria")]));
        });
        let mut archived_item = item_json("3", "lost", "Gym");
        archived_item["archived"] = json!(true);
        let archived = server.mock(|when, then| {
            when.method(GET).path("/api/items/archived");
            then.status(200).json_body(json!([archived_item]));
        });
        let by_category = server.mock(|when, then| {
            when.method(GET).path("/api/category/electronics");
            then.status(200)
                .json_body(json!([item_json("1", "lost", "Library")]));
        });

        let gateway = gateway_for(&server);

        let items = gateway.fetch_all().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].kind, ItemKind::Found);

        let items = gateway.fetch_active().await.unwrap();
        assert_eq!(items[0].id, ItemId::new("2"));

        let items = gateway.fetch_archived().await.unwrap();
        assert!(items[0].archived);

        let items = gateway.fetch_by_category(Category::Electronics).await.unwrap();
        assert_eq!(items[0].category, Category::Electronics);

        all.assert();
        active.assert();
        archived.assert();
        by_category.assert();
    }

    #[tokio::test]
    async fn catalog_joins_locations_and_categories() {
        let server = MockServer::start_async().await;
        let locations = server.mock(|when, then| {
            when.method(GET).path("/api/locations");
            then.status(200).json_body(json!(["Library", "Cafeteria"]));
        });
        let categories = server.mock(|when, then| {
            when.method(GET).path("/api/categories");
            then.status(200).json_body(json!(["electronics", "keys"]));
        });

        let gateway = gateway_for(&server);
        let catalog = gateway.fetch_catalog().await.unwrap();

        assert_eq!(catalog.locations, vec!["Library", "Cafeteria"]);
        assert_eq!(catalog.categories, vec!["electronics", "keys"]);
        locations.assert();
        categories.assert();
    }

    #[tokio::test]
    async fn catalog_fails_when_either_half_fails() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/api/locations");
            then.status(200).json_body(json!(["Library"]));
        });
        server.mock(|when, then| {
            when.method(GET).path("/api/categories");
            then.status(500).json_body(json!({"error": "database unavailable"}));
        });

        let gateway = gateway_for(&server);
        let err = gateway.fetch_catalog().await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::Server {
                code: 500,
                message: "database unavailable".into()
            }
        );
    }

    #[tokio::test]
    async fn webhook_config_reads_either_field_name() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET).path("/api/webhook/config");
            then.status(200)
                .json_body(json!({"webhookUrl": "https://hooks.example/n8n"}));
        });

        let gateway = gateway_for(&server);
        let config = gateway.get_webhook_config().await.unwrap();

        assert_eq!(config.url, "https://hooks.example/n8n");
        mock.assert();
    }

    #[tokio::test]
    async fn connection_refused_is_a_network_error() {
        let config = CoreConfig {
            base_url: "http://127.0.0.1:9/api".into(),
            ..CoreConfig::default()
        };
        let gateway = RemoteGateway::connect(&config).unwrap();
        let err = gateway.fetch_history().await.unwrap_err();
        assert!(matches!(err, GatewayError::Network { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_transport_times_out() {
        let transport = StubTransport::new().route_delayed(
            HttpMethod::Get,
            "/api/history",
            200,
            json!([]),
            Duration::from_secs(30),
        );
        let gateway = RemoteGateway::new(Arc::new(transport), &CoreConfig::default()).unwrap();

        let err = gateway.fetch_history().await.unwrap_err();
        assert_eq!(err, GatewayError::Timeout { timeout_ms: 10_000 });
    }

    #[tokio::test]
    async fn mutate_dispatches_by_op() {
        let transport = Arc::new(
            StubTransport::new()
                .route(HttpMethod::Post, "/item/7/archive", 200, json!({"success": true}))
                .route(HttpMethod::Delete, "/item/7", 200, json!({"success": true})),
        );
        let gateway = RemoteGateway::new(transport.clone(), &CoreConfig::default()).unwrap();

        let ticket = MutationTicket {
            seq: 1,
            item_id: ItemId::new("7"),
            op: MutationOp::Archive,
            kind: None,
        };
        gateway.mutate(&ticket).await.unwrap();
        gateway
            .mutate(&MutationTicket {
                op: MutationOp::Delete,
                ..ticket
            })
            .await
            .unwrap();

        assert_eq!(
            transport.requests(),
            vec![
                "POST http://localhost:8080/api/item/7/archive".to_string(),
                "DELETE http://localhost:8080/api/item/7".to_string(),
            ]
        );
    }
}
