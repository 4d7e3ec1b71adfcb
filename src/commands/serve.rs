use std::net::SocketAddr;

use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Path, State};
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use tokio_util::sync::{CancellationToken, DropGuard};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::controllers::paste::PasteService;
use crate::error::ApiError;
use crate::models::{Paste, PasteForm};
use crate::storage::Store;
use crate::types::api::{DocumentCreated, Info};
use crate::App;

/// The usage page served at the root.
const USAGE: &str = include_str!("../../assets/usage.txt");

pub async fn run(app: App) -> anyhow::Result<()> {
    let addr = SocketAddr::from((app.config.bind, app.config.port));
    let shutdown = app.shutdown.clone();
    let store = app.service.store().clone();

    info!("listening on {addr}");

    axum::Server::bind(&addr)
        .serve(router(app).into_make_service())
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for ctrl-c: {err}");
            }
            info!("shutting down");
            shutdown.cancel();
        })
        .await?;

    store.close().await;
    Ok(())
}

pub fn router(app: App) -> Router {
    let limits = app.config.limits.clone();

    Router::new()
        .route("/", get(index).post(create_paste))
        .route("/info", get(info))
        .route("/documents", post(create_document))
        .route("/p/:id", get(view_paste))
        .route("/clone/:id", get(clone_paste))
        .route("/:id", get(raw_paste))
        .layer(DefaultBodyLimit::max(limits.max_upload_size))
        .layer(TimeoutLayer::new(limits.request_timeout()))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(app)
}

/// A token for one request. It is cancelled on shutdown, or when the guard is
/// dropped because the request went away.
fn request_token(shutdown: &CancellationToken) -> (CancellationToken, DropGuard) {
    let token = shutdown.child_token();
    let guard = token.clone().drop_guard();
    (token, guard)
}

fn base_url(config: &Config) -> &str {
    config.app_url.trim_end_matches('/')
}

async fn index() -> &'static str {
    USAGE
}

async fn info(State(config): State<Config>) -> Json<Info> {
    Json(Info {
        app_name: config.app_name.clone(),
        app_url: config.app_url.clone(),
    })
}

/// Create a paste from a url-encoded or multipart form.
async fn create_paste(
    State(app): State<App>,
    request: Request<Body>,
) -> crate::ApiResult<Response> {
    let form = if is_multipart(&request) {
        read_multipart_form(multipart(request, &app).await?).await?
    } else {
        let Form(form) = Form::<PasteForm>::from_request(request, &app)
            .await
            .map_err(|rejection| ApiError::InvalidRequest(rejection.body_text()))?;
        form
    };

    let (cancel, _guard) = request_token(&app.shutdown);
    let paste = app.service.create_paste(&form, &cancel).await?;

    let base_url = base_url(&app.config);
    if form.raw != "0" {
        return Ok(format!("{base_url}/{}", paste.id).into_response());
    }

    let view_url = format!("{base_url}/p/{}", paste.id);
    if form.nojs == "1" {
        Ok((StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, view_url)]).into_response())
    } else {
        Ok(view_url.into_response())
    }
}

/// Create a paste from a bare request body, or from the `data` field of a
/// multipart form.
async fn create_document(
    State(app): State<App>,
    request: Request<Body>,
) -> crate::ApiResult<Json<DocumentCreated>> {
    let body = if is_multipart(&request) {
        let mut multipart = multipart(request, &app).await?;
        let mut data = String::new();
        while let Some(field) = multipart.next_field().await? {
            if field.name() == Some("data") {
                data = field.text().await?;
                break;
            }
        }
        data
    } else {
        let bytes = Bytes::from_request(request, &app)
            .await
            .map_err(|rejection| ApiError::InvalidRequest(rejection.body_text()))?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| ApiError::InvalidRequest("paste is not valid UTF-8".to_owned()))?
    };

    let (cancel, _guard) = request_token(&app.shutdown);
    let paste = app
        .service
        .create_paste(&PasteForm::document(body), &cancel)
        .await?;

    Ok(Json(DocumentCreated { key: paste.id }))
}

fn is_multipart(request: &Request<Body>) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"))
}

async fn multipart(request: Request<Body>, app: &App) -> crate::ApiResult<Multipart> {
    Multipart::from_request(request, app)
        .await
        .map_err(|rejection| ApiError::InvalidRequest(rejection.body_text()))
}

/// Collect the paste form fields of a multipart body. Unknown fields are skipped.
async fn read_multipart_form(mut multipart: Multipart) -> crate::ApiResult<PasteForm> {
    let mut form = PasteForm::default();
    while let Some(field) = multipart.next_field().await? {
        let slot = match field.name() {
            Some("title") => &mut form.title,
            Some("p") => &mut form.body,
            Some("mime") => &mut form.mime,
            Some("expire") => &mut form.expire,
            Some("raw") => &mut form.raw,
            Some("nojs") => &mut form.nojs,
            _ => continue,
        };
        *slot = field.text().await?;
    }
    Ok(form)
}

async fn raw_paste(
    State(service): State<PasteService>,
    State(shutdown): State<CancellationToken>,
    Path(id): Path<String>,
) -> crate::ApiResult<impl IntoResponse> {
    let (cancel, _guard) = request_token(&shutdown);
    let paste = service.read_paste(&id, &cancel).await?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        paste.body,
    ))
}

async fn view_paste(
    State(service): State<PasteService>,
    State(shutdown): State<CancellationToken>,
    Path(id): Path<String>,
) -> crate::ApiResult<Json<Paste>> {
    let (cancel, _guard) = request_token(&shutdown);
    Ok(Json(service.read_paste(&id, &cancel).await?))
}

async fn clone_paste(
    State(service): State<PasteService>,
    State(shutdown): State<CancellationToken>,
    Path(id): Path<String>,
) -> crate::ApiResult<Json<Paste>> {
    let (cancel, _guard) = request_token(&shutdown);
    Ok(Json(service.clone_paste(&id, &cancel).await?))
}
