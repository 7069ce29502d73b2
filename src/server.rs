use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{Html, IntoResponse, Response},
    routing::get,
    Form, Router,
};
use serde::Deserialize;
use std::{future::Future, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::net::TcpListener;

use crate::{
    config::Settings,
    dataset::Dataset,
    fetch::DataFetcher,
    map::{MapRenderer, MapSettings},
    model,
    monitor::{self, ErrorRateMonitor, ResponseTimer},
    page,
    predictor::{PredictError, PredictionResult, Predictor},
};

pub const GENERIC_ERROR_MESSAGE: &str =
    "An error occurred while processing the request. Please try again later.";

const SLOW_ROUTE_DELAY: Duration = Duration::from_secs(3);

// ---------- Errors ----------

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no traffic data loaded")]
    NoData,
    #[error("failed to serialize map figure: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl IntoResponse for RenderError {
    fn into_response(self) -> Response {
        tracing::error!("An error occurred: {}", self);
        (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_ERROR_MESSAGE).into_response()
    }
}

// ---------- Server state ----------

/// Everything handlers share. Built once at startup; the dataset and model
/// are read-only snapshots.
#[derive(Clone)]
pub struct AppContext {
    dataset: Option<Arc<Dataset>>,
    predictor: Option<Predictor>,
    renderer: Arc<MapRenderer>,
    pub error_rate: Arc<ErrorRateMonitor>,
    pub response_timer: Arc<ResponseTimer>,
}

impl AppContext {
    pub fn new(
        dataset: Option<Dataset>,
        predictor: Option<Predictor>,
        map: MapSettings,
        error_rate: ErrorRateMonitor,
        response_timer: ResponseTimer,
    ) -> Self {
        Self {
            dataset: dataset.map(Arc::new),
            predictor,
            renderer: Arc::new(MapRenderer::new(map)),
            error_rate: Arc::new(error_rate),
            response_timer: Arc::new(response_timer),
        }
    }

    /// Fetch the feed and load the model. Either may fail; the failure is
    /// logged and the server starts without it.
    pub async fn load(settings: &Settings) -> Self {
        let fetcher = DataFetcher::new(settings.data_url.clone(), settings.fetch_timeout());
        let dataset = match fetcher.fetch().await {
            Ok(records) => {
                let ds = Dataset::from_records(records);
                tracing::info!(
                    "Data retrieved successfully: {} records {:?}",
                    ds.len(),
                    ds.status_counts()
                );
                Some(ds)
            }
            Err(e) => {
                tracing::error!("Error while retrieving data from {}: {}", fetcher.url(), e);
                None
            }
        };

        let predictor = match model::load_model(&settings.model_path) {
            Ok((mdl, n_classes)) => {
                tracing::info!(
                    "Model loaded successfully from {} ({} backend, {} classes)",
                    settings.model_path.display(),
                    mdl.name(),
                    n_classes
                );
                Some(Predictor::new(mdl))
            }
            Err(e) => {
                tracing::error!("Error while loading the model: {:#}", e);
                None
            }
        };

        Self::new(
            dataset,
            predictor,
            settings.map_settings(),
            ErrorRateMonitor::new(settings.error_rate_threshold, settings.error_rate_window),
            ResponseTimer::new(settings.response_time_threshold()),
        )
    }

    pub fn graph_json(&self) -> Result<String, RenderError> {
        let dataset = self.dataset.as_deref().ok_or(RenderError::NoData)?;
        Ok(self.renderer.render(dataset).to_json()?)
    }

    fn try_predict(&self, hour: Option<&str>) -> Result<PredictionResult, PredictError> {
        let hour = hour.ok_or(PredictError::InvalidHour {
            input: String::new(),
            reason: "hour field is missing",
        })?;
        let predictor = self.predictor.as_ref().ok_or(PredictError::NoModel)?;
        predictor.predict(hour)
    }

    /// Prediction banner for a POSTed hour; failures become the gray indicator.
    pub fn prediction_for(&self, hour: Option<&str>) -> PredictionResult {
        match self.try_predict(hour) {
            Ok(res) => {
                tracing::info!("Prediction result: {}", res.text);
                res
            }
            Err(e) => {
                tracing::error!("Error during prediction: {}", e);
                PredictionResult::failed()
            }
        }
    }
}

// ---------- Handlers ----------

#[derive(Debug, Deserialize)]
pub struct HourForm {
    pub hour: Option<String>,
}

pub async fn index_get(State(ctx): State<AppContext>) -> Result<Html<String>, RenderError> {
    let graph = ctx.graph_json()?;
    tracing::info!("GET request received");
    Ok(Html(page::render(&graph, None)))
}

/// A body that is not a form is treated like a form without `hour`.
pub async fn index_post(
    State(ctx): State<AppContext>,
    form: Option<Form<HourForm>>,
) -> Result<Html<String>, RenderError> {
    let graph = ctx.graph_json()?;
    tracing::info!("POST request received");

    let hour = form.and_then(|Form(f)| f.hour);
    tracing::info!("Hour selected by user: {:?}", hour);

    let prediction = ctx.prediction_for(hour.as_deref());
    Ok(Html(page::render(&graph, Some(&prediction))))
}

async fn test_log() -> &'static str {
    tracing::info!("Accessed /test_log route");
    "Log test succeeded"
}

async fn slow() -> &'static str {
    tokio::time::sleep(SLOW_ROUTE_DELAY).await;
    "This route is too slow!"
}

async fn error_route() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

// ---------- Router ----------

pub fn router(ctx: AppContext) -> Router {
    let timed = Router::new()
        .route("/", get(index_get).post(index_post))
        .route("/slow", get(slow))
        .route_layer(middleware::from_fn_with_state(
            ctx.response_timer.clone(),
            monitor::track_response_time,
        ));

    Router::new()
        .merge(timed)
        .route("/test_log", get(test_log))
        .route("/error", get(error_route))
        .layer(middleware::from_fn_with_state(
            ctx.error_rate.clone(),
            monitor::track_errors,
        ))
        .with_state(ctx)
}

pub async fn serve<F>(listener: TcpListener, ctx: AppContext, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(shutdown)
        .await
}
