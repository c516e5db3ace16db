use std::time::Duration;

use httpmock::prelude::*;
use lostfound_shared::config::CoreConfig;
use lostfound_shared::{Event, ItemId, Runtime};
use serde_json::json;

fn config_for(server: &MockServer) -> CoreConfig {
    CoreConfig {
        base_url: server.url("/api"),
        request_timeout_ms: 2_000,
        poll_interval_ms: 60_000,
        ..CoreConfig::default()
    }
}

#[tokio::test]
async fn refresh_then_delete_over_http() {
    let server = MockServer::start_async().await;
    let history = server.mock(|when, then| {
        when.method(GET).path("/api/history");
        then.status(200).json_body(json!([
            {
                "id": "7",
                "type": "found",
                "name": "Blue umbrella",
                "location": "library",
                "finder": "Omar",
                "timestamp": 1_700_000_000
            }
        ]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/api/stats");
        then.status(200).json_body(json!({
            "totalItems": 1,
            "lostItems": 0,
            "foundItems": 1,
            "activeItems": 1,
            "archivedItems": 0
        }));
    });
    let delete = server.mock(|when, then| {
        when.method(DELETE).path("/api/item/7");
        then.status(200)
            .json_body(json!({"success": true, "message": "Item deleted successfully"}));
    });

    let runtime = Runtime::connect(config_for(&server)).unwrap();
    let handle = runtime.handle();
    let task = tokio::spawn(runtime.run());
    let mut view = handle.view();

    handle.dispatch(Event::RefreshRequested);
    tokio::time::timeout(Duration::from_secs(5), view.wait_for(|v| v.items.len() == 1))
        .await
        .unwrap()
        .unwrap();
    history.assert();

    handle.dispatch(Event::DeleteRequested { id: "7".into() });
    let done = tokio::time::timeout(
        Duration::from_secs(5),
        view.wait_for(|v| v.items.is_empty()),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();
    delete.assert();
    assert_eq!(done.stats.total_items, 0);
    assert_eq!(done.stats.found_items, 0);
    assert!(done.pending_ids.is_empty());

    handle.shutdown();
    task.await.unwrap();
}

#[tokio::test]
async fn rejected_claim_surfaces_backend_message() {
    let server = MockServer::start_async().await;
    let claim = server.mock(|when, then| {
        when.method(POST)
            .path("/api/item/9/claim")
            .json_body(json!({"claimedBy": "Sana", "claimerPhone": "0311"}));
        then.status(400).json_body(json!({"error": "Item already claimed"}));
    });

    let runtime = Runtime::connect(config_for(&server)).unwrap();
    let handle = runtime.handle();
    let task = tokio::spawn(runtime.run());
    let mut view = handle.view();

    handle.dispatch(Event::ClaimRequested {
        id: ItemId::new("9"),
        name: "Sana".into(),
        phone: "0311".into(),
    });
    let failed = tokio::time::timeout(Duration::from_secs(5), view.wait_for(|v| v.error.is_some()))
        .await
        .unwrap()
        .unwrap()
        .clone();
    claim.assert();

    let error = failed.error.unwrap();
    assert_eq!(error.error_code, "SERVER_ERROR");
    assert_eq!(error.message, "Item already claimed");

    handle.shutdown();
    task.await.unwrap();
}
