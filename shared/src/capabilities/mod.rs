mod api;
pub mod http;
mod search;
mod timer;

pub use self::api::{Api, ApiCall, ApiResponse};
pub use self::http::{
    HttpError, HttpMethod, HttpRequest, HttpResponse, HttpResult, HttpTransport, ReqwestTransport,
    ValidatedUrl,
};
pub use self::search::Search;
pub use self::timer::{Timer, TimerKind, TimerOperation, TimerOutput};

// Crux's built-in Render covers view updates.
pub use crux_core::render::Render;

use crate::event::Event;
use crate::App;

/// Everything `App::update` may ask of the shell. The derive generates the
/// matching `Effect` enum, one variant per field.
#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub render: Render<Event>,
    pub api: Api<Event>,
    pub timer: Timer<Event>,
    pub search: Search<Event>,
}

#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    use super::http::{HttpHeaders, HttpMethod, HttpRequest, HttpResponse, HttpResult, HttpTransport};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone)]
    struct Route {
        method: HttpMethod,
        fragment: String,
        status: u16,
        body: Vec<u8>,
        delay: Duration,
    }

    /// In-memory transport for driving the gateway and runtime without a
    /// socket. Routes match on method plus a substring of the full URL, first
    /// registered wins. Unmatched requests get a 404.
    #[derive(Debug, Default)]
    pub struct StubTransport {
        routes: Mutex<Vec<Route>>,
        log: Mutex<Vec<String>>,
    }

    impl StubTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn route(
            self,
            method: HttpMethod,
            fragment: &str,
            status: u16,
            body: serde_json::Value,
        ) -> Self {
            self.route_delayed(method, fragment, status, body, Duration::ZERO)
        }

        pub fn route_delayed(
            self,
            method: HttpMethod,
            fragment: &str,
            status: u16,
            body: serde_json::Value,
            delay: Duration,
        ) -> Self {
            self.routes
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(Route {
                    method,
                    fragment: fragment.to_string(),
                    status,
                    body: body.to_string().into_bytes(),
                    delay,
                });
            self
        }

        /// Every request seen so far, as `"METHOD url"`.
        pub fn requests(&self) -> Vec<String> {
            self.log.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }

        pub fn count(&self, fragment: &str) -> usize {
            self.requests()
                .iter()
                .filter(|line| line.contains(fragment))
                .count()
        }
    }

    #[async_trait]
    impl HttpTransport for StubTransport {
        async fn execute(&self, request: HttpRequest) -> HttpResult {
            let url = request.url().as_str().to_string();
            self.log
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(format!("{} {}", request.method().as_str(), url));

            let matched = self
                .routes
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .find(|r| r.method == request.method() && url.contains(&r.fragment))
                .cloned();

            let (status, body, delay) = match matched {
                Some(route) => (route.status, route.body, route.delay),
                None => (404, br#"{"error":"no route"}"#.to_vec(), Duration::ZERO),
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            Ok(HttpResponse::new(
                status,
                HttpHeaders::new(),
                body,
                request.request_id().to_string(),
                u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            ))
        }
    }
}

