use std::sync::Arc;
use std::time::Duration;

use ridekit::api::{ApiError, HttpApi, RideApi};
use ridekit::client::{RideController, Services};
use ridekit::core::action::Action;
use ridekit::core::geo::Location;
use ridekit::core::ride::{BookingReceipt, RideStatus};
use ridekit::core::state::Store;
use ridekit::core::storage::MemoryStorage;
use ridekit::realtime::{
    ChannelSignal, LogFeedback, ReconnectPolicy, SseChannel, StatusChannel, StatusWatcher,
    StreamEvent, Topic, WatchOutcome,
};
use serde_json::json;
use tokio::sync::mpsc;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, header, method, path},
};

// ============================================================================
// Helper Functions
// ============================================================================

fn http_api(server: &MockServer) -> Arc<HttpApi> {
    Arc::new(HttpApi::new(&server.uri(), Duration::from_secs(5)).unwrap())
}

fn controller_for(server: &MockServer) -> RideController {
    let services = Services::new(http_api(server), Arc::new(MemoryStorage::default()));
    RideController::new(Store::new(30, chrono::Utc::now()), services)
}

fn ok(data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": data }))
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ok(json!({
            "user": {"id": "user-1", "name": "Rider", "email": "rider@example.com"},
            "token": "token-abc"
        })))
        .mount(server)
        .await;
}

async fn mount_options(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/rides/options"))
        .respond_with(ok(json!([{
            "id": "lux",
            "name": "Lux",
            "basePrice": 5.0,
            "perKmPrice": 2.5,
            "perMinutePrice": 0.5,
            "capacity": 4
        }])))
        .mount(server)
        .await;
}

fn manhattan() -> (Location, Location) {
    (
        Location::new(40.7128, -74.0060).with_address("City Hall"),
        Location::new(40.7589, -73.9851).with_address("Times Square"),
    )
}

// ============================================================================
// Booking
// ============================================================================

#[tokio::test]
async fn test_book_ride_returns_receipt_and_tracks_pending_ride() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_options(&server).await;
    Mock::given(method("POST"))
        .and(path("/rides"))
        .and(header("authorization", "Bearer token-abc"))
        .and(body_partial_json(json!({"optionId": "lux", "userId": "user-1"})))
        .respond_with(ok(json!({"rideId": "ride-1", "status": "pending"})))
        .expect(1)
        .mount(&server)
        .await;

    let mut controller = controller_for(&server);
    controller.login("rider@example.com", "secret-pass").await.unwrap();
    controller.fetch_ride_options().await.unwrap();

    let (pickup, dropoff) = manhattan();
    let receipt = controller
        .book_ride(pickup, dropoff, "lux", None, None)
        .await
        .unwrap();

    assert_eq!(receipt, BookingReceipt { ride_id: "ride-1".into() });
    let ride = controller.store.ride.current_ride.as_ref().unwrap();
    assert_eq!(ride.status, RideStatus::Pending);
    assert_eq!(ride.destination.label(), "Times Square");
    // No fare in the response, so one is computed from the catalog.
    assert!(ride.fare.as_ref().is_some_and(|f| f.total > 5.0));
}

#[tokio::test]
async fn test_book_ride_surfaces_server_rejection() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("POST"))
        .and(path("/rides"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "error": "No drivers nearby"
        })))
        .mount(&server)
        .await;

    let mut controller = controller_for(&server);
    controller.login("rider@example.com", "secret-pass").await.unwrap();
    let (pickup, dropoff) = manhattan();
    let err = controller
        .book_ride(pickup, dropoff, "lux", None, None)
        .await
        .unwrap_err();

    assert_eq!(err.user_message(), "No drivers nearby");
    assert!(controller.store.ride.current_ride.is_none());
    assert!(!controller.store.ride.is_loading_ride);
}

// ============================================================================
// HTTP Error Mapping
// ============================================================================

#[tokio::test]
async fn test_http_error_status_maps_to_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rides/history"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({"error": "database unavailable"})),
        )
        .mount(&server)
        .await;

    let api = http_api(&server);
    let err = api.ride_history().await.unwrap_err();

    assert_eq!(
        err,
        ApiError::Api {
            status: 500,
            message: "database unavailable".into()
        }
    );
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_envelope_failure_maps_to_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rides/ride-9/cancel"))
        .and(body_partial_json(json!({"reason": "Changed plans"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "error": "Ride already completed"
        })))
        .mount(&server)
        .await;

    let api = http_api(&server);
    let err = api.cancel_ride("ride-9", "Changed plans").await.unwrap_err();

    assert_eq!(err, ApiError::Server("Ride already completed".into()));
}

#[tokio::test]
async fn test_estimate_failure_keeps_previous_estimate() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rides/estimate"))
        .respond_with(ok(json!({
            "distanceKm": 5.2,
            "durationMin": 18.0,
            "quotes": [{
                "optionId": "lux",
                "fare": {"baseFare": 5.0, "distanceFare": 13.0, "total": 27.0}
            }]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rides/estimate"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let mut controller = controller_for(&server);
    let (pickup, dropoff) = manhattan();
    controller
        .get_ride_estimate(pickup.clone(), dropoff.clone(), vec!["lux".into()])
        .await
        .unwrap();
    let first = controller.store.ride.current_estimate.clone();
    assert!(first.is_some());

    let err = controller
        .get_ride_estimate(pickup, dropoff, vec!["lux".into()])
        .await
        .unwrap_err();

    assert_eq!(err, "The service is temporarily unavailable. Please try again.");
    assert_eq!(controller.store.ride.current_estimate, first);
}

// ============================================================================
// Session
// ============================================================================

#[tokio::test]
async fn test_logout_stops_sending_token() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/rides/history"))
        .and(header("authorization", "Bearer token-abc"))
        .respond_with(ok(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rides/history"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "unauthorized"})))
        .mount(&server)
        .await;

    let mut controller = controller_for(&server);
    controller.login("rider@example.com", "secret-pass").await.unwrap();
    controller.fetch_ride_history().await.unwrap();

    controller.logout().await;
    let err = controller.fetch_ride_history().await.unwrap_err();
    assert_eq!(err, "Your session has expired. Please sign in again.");
}

// ============================================================================
// Status Stream
// ============================================================================

const RIDE_STREAM: &str = "\
: connected

event: ride.status
data: {\"rideId\":\"ride-1\",\"status\":\"accepted\"}

event: ride.location
data: {\"rideId\":\"ride-1\",\"location\":{\"lat\":40.72,\"lon\":-74.0},\"etaMin\":3}

event: ride.status
data: {\"rideId\":\"ride-1\",\"status\":\"completed\"}

";

async fn mount_stream(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/stream/ride/ride-1"))
        .and(header("accept", "text/event-stream"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(RIDE_STREAM),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_sse_channel_decodes_events() {
    let server = MockServer::start().await;
    mount_stream(&server).await;

    let channel = SseChannel::new(&format!("{}/stream", server.uri()));
    let (tx, mut rx) = mpsc::channel(16);
    channel
        .subscribe(&Topic::Ride("ride-1".into()), tx)
        .await
        .unwrap();

    let mut signals = Vec::new();
    while let Some(signal) = rx.recv().await {
        signals.push(signal);
    }
    assert_eq!(signals.len(), 4);
    assert_eq!(signals[0], ChannelSignal::Open);
    assert_eq!(
        signals[3],
        ChannelSignal::Event(StreamEvent::RideStatus {
            ride_id: "ride-1".into(),
            status: RideStatus::Completed,
        })
    );
}

#[tokio::test]
async fn test_watcher_follows_stream_to_completion() {
    let server = MockServer::start().await;
    mount_stream(&server).await;

    let channel = SseChannel::new(&format!("{}/stream", server.uri()));
    let watcher = StatusWatcher::new(
        Arc::new(channel),
        Arc::new(LogFeedback),
        ReconnectPolicy {
            base: Duration::from_millis(10),
            max: Duration::from_millis(50),
            max_attempts: 2,
        },
        Duration::from_secs(300),
    );
    let (tx, mut rx) = mpsc::channel(16);
    let handle = watcher.spawn("ride-1", tx, None);

    assert_eq!(handle.join().await, WatchOutcome::Finished(RideStatus::Completed));

    let mut statuses = Vec::new();
    while let Ok(action) = rx.try_recv() {
        if let Action::RideStatusChanged { status, .. } = action {
            statuses.push(status);
        }
    }
    assert_eq!(statuses, vec![RideStatus::Accepted, RideStatus::Completed]);
}
