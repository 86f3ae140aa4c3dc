//! HTTP API over a shared [`Studio`].
//!
//! Every handler only touches the studio through short critical sections, so
//! the frame loop keeps running while requests (including a snapshot
//! countdown) are in flight.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use bytes::Bytes;
use futures::Stream;
use log::{info, warn};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::calibration::{CalibrationTable, ConvertedMeasurements, LengthUnit};
use crate::protocol::{
    mjpeg_part, CalibrationResponse, CancelResponse, ConversionAck, ConversionUpdate, ErrorBody,
    SnapshotFormat, SnapshotJson, SnapshotQuery, UnitQuery, MJPEG_CONTENT_TYPE,
};
use crate::sizing::{recommend_all, SizeRecommendation};
use crate::snapshot::SnapshotState;
use crate::studio::Studio;
use crate::tryon::{TryOnClient, TryOnRequest};
use crate::Error;

const INDEX_HTML: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>bodyfit</title></head>
<body>
<img src="/video_feed" alt="camera">
<p>
<button onclick="fetch('/snapshot?duration=3').then(r => r.blob()).then(b => { document.getElementById('shot').src = URL.createObjectURL(b); })">Snapshot</button>
<button onclick="fetch('/calibrate', {method: 'POST'})">Calibrate</button>
</p>
<img id="shot" alt="">
</body>
</html>
"#;

/// Shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub studio: Arc<Studio>,
    pub tryon: Arc<TryOnClient>,
    /// Countdown used when `/snapshot` has no `duration`
    pub default_snapshot_secs: u64,
}

/// Library error as an HTTP response
#[derive(Debug)]
pub struct AppError(pub Error);

impl From<Error> for AppError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

pub fn status_for(e: &Error) -> StatusCode {
    match e {
        Error::InvalidCalibrationInput(_) | Error::ImageDecode(_) => StatusCode::BAD_REQUEST,
        Error::NoMeasurementsForCalibration | Error::SnapshotBusy => StatusCode::CONFLICT,
        Error::SnapshotCancelled => StatusCode::GONE,
        Error::NoFrameAvailable => StatusCode::SERVICE_UNAVAILABLE,
        Error::UpstreamService(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            warn!("request failed: {}", self.0);
        }
        (status, Json(ErrorBody::from(&self.0))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, AppError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/video_feed", get(video_feed))
        .route("/snapshot", get(snapshot))
        .route("/snapshot/status", get(snapshot_status))
        .route("/snapshot/cancel", post(cancel_snapshot))
        .route("/measurements", get(measurements))
        .route("/conversion", get(conversion))
        .route("/update_conversion", post(update_conversion))
        .route("/calibrate", post(calibrate))
        .route("/size", get(size))
        .route("/tryon", post(tryon))
        .layer(middleware::map_response(allow_any_origin))
        .with_state(state)
}

/// Bind and serve until the process exits
pub async fn serve(addr: &str, state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}

async fn allow_any_origin(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// One multipart part per newly published frame, starting with the current one
pub fn mjpeg_stream(
    mut rx: watch::Receiver<Option<Bytes>>,
) -> impl Stream<Item = Result<Bytes, Infallible>> {
    rx.mark_changed();
    futures::stream::unfold(rx, |mut rx| async move {
        loop {
            // sender dropped: the frame loop is gone, end the stream
            rx.changed().await.ok()?;
            let frame = rx.borrow_and_update().clone();
            if let Some(jpeg) = frame {
                return Some((Ok(mjpeg_part(&jpeg)), rx));
            }
        }
    })
}

async fn video_feed(State(state): State<AppState>) -> Response {
    let body = Body::from_stream(mjpeg_stream(state.studio.subscribe()));
    ([(header::CONTENT_TYPE, MJPEG_CONTENT_TYPE)], body).into_response()
}

async fn snapshot(State(state): State<AppState>, Query(query): Query<SnapshotQuery>) -> ApiResult<Response> {
    let duration = query.duration.unwrap_or(state.default_snapshot_secs);
    let jpeg = state.studio.snapshot(duration).await?;
    info!("[snapshot] captured {} bytes", jpeg.len());

    Ok(match query.format {
        SnapshotFormat::Jpeg => ([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response(),
        SnapshotFormat::Json => Json(SnapshotJson::from_jpeg(&jpeg)).into_response(),
    })
}

async fn snapshot_status(State(state): State<AppState>) -> Json<SnapshotState> {
    Json(state.studio.snapshot_state())
}

async fn cancel_snapshot(State(state): State<AppState>) -> Json<CancelResponse> {
    Json(CancelResponse {
        cancelled: state.studio.cancel_snapshot(),
    })
}

async fn measurements(
    State(state): State<AppState>,
    Query(query): Query<UnitQuery>,
) -> Json<ConvertedMeasurements> {
    let unit = query.unit.unwrap_or(state.studio.settings().api_unit);
    Json(state.studio.measurements(unit))
}

async fn conversion(State(state): State<AppState>) -> Json<CalibrationTable> {
    Json(state.studio.factors())
}

async fn update_conversion(
    State(state): State<AppState>,
    Json(update): Json<ConversionUpdate>,
) -> ApiResult<Json<ConversionAck>> {
    let value = update.value.as_f64()?;
    let m = state.studio.override_factor(&update.key, value)?;
    Ok(Json(ConversionAck::ok(m, value)))
}

async fn calibrate(State(state): State<AppState>) -> ApiResult<Json<CalibrationResponse>> {
    let updated_factors = state.studio.calibrate()?;
    Ok(Json(CalibrationResponse { updated_factors }))
}

async fn size(State(state): State<AppState>) -> Json<SizeRecommendation> {
    Json(recommend_all(&state.studio.measurements(LengthUnit::Centimeter)))
}

async fn tryon(State(state): State<AppState>, Json(request): Json<TryOnRequest>) -> ApiResult<Response> {
    let image = state.tryon.try_on(request, state.studio.last_frame()).await?;
    Ok(([(header::CONTENT_TYPE, image.content_type)], image.data).into_response())
}
