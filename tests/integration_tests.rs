/// End-to-end tests: a fake upstream feed and the real router on loopback.
///
/// Run with: cargo test --test integration_tests -- --nocapture
use axum::{http::StatusCode, routing::get, Router};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;

use traffic_dashboard::{
    dataset::Dataset,
    fetch::{DataFetchError, DataFetcher},
    map::MapSettings,
    model::{DenseModel, IN_DIM},
    monitor::{ErrorRateMonitor, ResponseTimer},
    predictor::Predictor,
    server::{self, AppContext, GENERIC_ERROR_MESSAGE},
};

const FEED: &str = r#"[
    {"datetime": "2024-05-02T08:10:00+02:00", "trafficstatus": "freeFlow",
     "geo_point_2d": {"lat": 48.1105, "lon": -1.6823}, "averagevehiclespeed": 48, "traveltime": 11},
    {"datetime": "2024-05-02T08:10:00+02:00", "trafficstatus": "heavy",
     "geo_point_2d": {"lat": 48.1201, "lon": -1.7002}, "averagevehiclespeed": 21, "traveltime": 34},
    {"datetime": "2024-05-02T08:10:00+02:00", "trafficstatus": "unknown",
     "geo_point_2d": {"lat": 48.0999, "lon": -1.6500}, "averagevehiclespeed": 0, "traveltime": 0},
    {"datetime": "2024-05-02T08:10:00+02:00", "trafficstatus": "congested",
     "geo_point_2d": {"lat": 48.1302, "lon": -1.6601}, "averagevehiclespeed": 9, "traveltime": 70}
]"#;

async fn spawn(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn spawn_dashboard(ctx: AppContext) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        server::serve(listener, ctx, std::future::pending()).await.unwrap();
    });
    addr
}

async fn fake_feed() -> SocketAddr {
    spawn(
        Router::new()
            .route("/feed", get(|| async { FEED }))
            .route("/broken", get(|| async { "<html>maintenance</html>" }))
            .route("/down", get(|| async { StatusCode::SERVICE_UNAVAILABLE })),
    )
    .await
}

/// Dense layer whose argmax is `Dense` (1) at 8h and `Free` (0) otherwise.
fn rush_hour_model() -> Predictor {
    let mut weights = vec![vec![0.0; IN_DIM]; 3];
    for h in 0..IN_DIM {
        weights[0][h] = 1.0;
    }
    weights[0][8] = 0.0;
    weights[1][8] = 4.0;
    Predictor::new(Arc::new(DenseModel::new(weights, vec![0.0; 3]).unwrap()))
}

fn context(dataset: Option<Dataset>) -> AppContext {
    AppContext::new(
        dataset,
        Some(rush_hour_model()),
        MapSettings::default(),
        ErrorRateMonitor::new(0.05, 100),
        ResponseTimer::new(Duration::from_secs(2)),
    )
}

async fn fetched_dataset() -> Dataset {
    let feed = fake_feed().await;
    let fetcher = DataFetcher::new(format!("http://{feed}/feed"), Duration::from_secs(5));
    Dataset::from_records(fetcher.fetch().await.unwrap())
}

#[tokio::test]
async fn test_fetch_and_build_dataset() {
    println!("\n=== Test: Fetch And Build ===");
    let ds = fetched_dataset().await;

    assert_eq!(ds.len(), 3, "unknown reading should be dropped");
    assert!(ds.iter().all(|r| !r.traffic.is_unknown()));
    assert_eq!(ds.records()[1].lat, 48.1201);
    assert_eq!(ds.records()[1].lon, -1.7002);
    println!("✓ {} records kept", ds.len());
}

#[tokio::test]
async fn test_fetch_failures_are_typed() {
    let feed = fake_feed().await;

    let down = DataFetcher::new(format!("http://{feed}/down"), Duration::from_secs(5));
    assert!(matches!(
        down.fetch().await,
        Err(DataFetchError::Status(s)) if s == StatusCode::SERVICE_UNAVAILABLE
    ));

    let broken = DataFetcher::new(format!("http://{feed}/broken"), Duration::from_secs(5));
    assert!(matches!(broken.fetch().await, Err(DataFetchError::Decode(_))));

    // grab a free port, then release it so the connection is refused
    let closed = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let refused = DataFetcher::new(format!("http://{closed}/feed"), Duration::from_secs(5));
    assert!(matches!(refused.fetch().await, Err(DataFetchError::Http(_))));
}

#[tokio::test]
async fn test_get_index_embeds_map() {
    let addr = spawn_dashboard(context(Some(fetched_dataset().await))).await;

    let resp = reqwest::get(format!("http://{addr}/")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body = resp.text().await.unwrap();

    assert!(body.contains("scattermapbox"));
    assert!(body.contains("\"color\":\"green\""));
    assert!(body.contains("\"color\":\"orange\""));
    assert!(body.contains("\"color\":\"red\""));
    assert!(!body.contains("id=\"prediction\""));
}

#[tokio::test]
async fn test_post_hour_predicts() {
    let addr = spawn_dashboard(context(Some(fetched_dataset().await))).await;
    let client = reqwest::Client::new();

    let body = client
        .post(format!("http://{addr}/"))
        .form(&[("hour", "8")])
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("Prediction: Dense for 8 h"));
    assert!(body.contains("color: orange"));

    let body = client
        .post(format!("http://{addr}/"))
        .form(&[("hour", "14")])
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("Prediction: Free for 14 h"));
    assert!(body.contains("color: green"));
}

#[tokio::test]
async fn test_post_bad_input_degrades() {
    let addr = spawn_dashboard(context(Some(fetched_dataset().await))).await;
    let client = reqwest::Client::new();

    for form in [vec![("hour", "abc")], vec![("hour", "42")], vec![("other", "1")]] {
        let resp = client
            .post(format!("http://{addr}/"))
            .form(&form)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body = resp.text().await.unwrap();
        assert!(body.contains(">Prediction failed</p>"), "form {form:?}");
        assert!(body.contains("color: gray"));
    }

    // no form body at all
    let resp = client.post(format!("http://{addr}/")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.text().await.unwrap().contains("Prediction failed"));
}

#[tokio::test]
async fn test_missing_data_is_generic_500() {
    let ctx = context(None);
    let addr = spawn_dashboard(ctx.clone()).await;

    let resp = reqwest::get(format!("http://{addr}/")).await.unwrap();
    assert_eq!(resp.status(), 500);
    assert_eq!(resp.text().await.unwrap(), GENERIC_ERROR_MESSAGE);
    assert_eq!(ctx.error_rate.total_errors(), 1);
}

#[tokio::test]
async fn test_error_route_raises_error_rate_alert() {
    let ctx = context(Some(fetched_dataset().await));
    let addr = spawn_dashboard(ctx.clone()).await;

    let resp = reqwest::get(format!("http://{addr}/test_log")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "Log test succeeded");
    assert_eq!(ctx.error_rate.alert_count(), 0);

    let resp = reqwest::get(format!("http://{addr}/error")).await.unwrap();
    assert_eq!(resp.status(), 500);
    assert!(resp.text().await.unwrap().is_empty());

    assert_eq!(ctx.error_rate.total_requests(), 2);
    assert_eq!(ctx.error_rate.alert_count(), 1);
}

#[tokio::test]
async fn test_slow_route_triggers_response_time_alert() {
    println!("\n=== Test: Slow Route ===");
    let ctx = context(Some(fetched_dataset().await));
    let addr = spawn_dashboard(ctx.clone()).await;

    reqwest::get(format!("http://{addr}/")).await.unwrap();
    assert_eq!(ctx.response_timer.alert_count(), 0, "index is fast");

    let started = std::time::Instant::now();
    let resp = reqwest::get(format!("http://{addr}/slow")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "This route is too slow!");
    assert!(started.elapsed() >= Duration::from_secs(3));

    assert_eq!(ctx.response_timer.alert_count(), 1);
    println!("✓ slow route flagged");
}
