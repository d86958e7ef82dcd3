//! HTTP server module
//!
//! Accepts connections on a `hyper` HTTP/1.1 listener, one tokio task per
//! connection, and routes requests to the form page, the upload handler, the
//! ping endpoint and static assets.
//!
//! # Example
//!
//! ```no_run
//! use form_uploadr::config::Config;
//! use form_uploadr::s3::S3Store;
//! use form_uploadr::server::{AppState, Server};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("config.yaml")?;
//! let store = Arc::new(S3Store::from_config(&config.storage).await?);
//! let state = AppState::from_config(&config, store)?;
//! let server = Server::bind(&config.server.address, state).await?;
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::Config;
use crate::metrics;
use crate::s3::ObjectStore;
use crate::upload::{UploadHandler, UploadSettings, SUCCESS_MESSAGE};
use crate::web::{PageMessage, PageRenderer, StaticAssets, TemplateError};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

const HTML: &str = "text/html; charset=utf-8";
const TEXT: &str = "text/plain; charset=utf-8";

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(String),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),
}

/// Everything a request needs, shared by all connections
pub struct AppState {
    pub handler: UploadHandler,
    pub renderer: PageRenderer,
    pub assets: Option<StaticAssets>,
}

impl AppState {
    pub fn new(
        handler: UploadHandler,
        renderer: PageRenderer,
        assets: Option<StaticAssets>,
    ) -> Self {
        Self {
            handler,
            renderer,
            assets,
        }
    }

    /// Build the state from configuration and an already-constructed store
    pub fn from_config(config: &Config, store: Arc<dyn ObjectStore>) -> Result<Self, ServerError> {
        let renderer =
            PageRenderer::from_dir(&config.web.templates_dir, config.web.page_template.clone())?;
        let assets = config.web.assets_dir.as_ref().map(StaticAssets::new);
        let handler = UploadHandler::new(store, UploadSettings::from(config));

        Ok(Self::new(handler, renderer, assets))
    }
}

/// HTTP server
pub struct Server {
    state: Arc<AppState>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Bind to `address`
    ///
    /// Port 0 lets the OS pick a port; see [`Server::local_addr`].
    pub async fn bind(address: &str, state: AppState) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::BindError(format!("Invalid address: {}", e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("Failed to bind to {}: {}", addr, e)))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(format!("Failed to get local address: {}", e)))?;

        info!("Server bound to {}", local_addr);

        Ok(Self {
            state: Arc::new(state),
            listener,
            local_addr,
        })
    }

    /// The address the server is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until the process is killed
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves
    ///
    /// Stops accepting new connections once `shutdown` completes. Connections
    /// already accepted keep running in their own tasks.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        info!("Serving uploads on {}", self.local_addr);
        tokio::pin!(shutdown);

        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
            };

            let state = Arc::clone(&self.state);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let state = Arc::clone(&state);
                    async move { Ok::<_, Infallible>(handle_request(req, state).await) }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    warn!("Error serving connection from {}: {}", peer_addr, e);
                }
            });
        }

        info!("Stopped accepting connections");
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Route<'a> {
    Ping,
    FormPage,
    Upload,
    Asset(&'a str),
    MethodNotAllowed(&'static str),
    NotFound,
}

impl Route<'_> {
    fn resolve<'a>(method: &Method, path: &'a str) -> Route<'a> {
        match path {
            "/ping" if method == Method::GET => Route::Ping,
            "/ping" => Route::MethodNotAllowed("GET"),
            "/" if method == Method::GET => Route::FormPage,
            "/" if method == Method::POST => Route::Upload,
            "/" => Route::MethodNotAllowed("GET, POST"),
            _ => match path.strip_prefix("/assets/") {
                Some(asset) if method == Method::GET && !asset.is_empty() => Route::Asset(asset),
                _ => Route::NotFound,
            },
        }
    }

    /// Low-cardinality label for metrics
    fn label(&self) -> &'static str {
        match self {
            Route::Ping => "/ping",
            Route::FormPage | Route::Upload => "/",
            Route::Asset(_) => "/assets",
            Route::MethodNotAllowed(_) | Route::NotFound => "other",
        }
    }
}

/// Logs and counts a request whose future was dropped before it responded
struct InFlight {
    route: &'static str,
    done: bool,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.done {
            warn!(route = self.route, "Request cancelled before completion");
            metrics::record_error("cancelled");
        }
    }
}

async fn handle_request(req: Request<Incoming>, state: Arc<AppState>) -> Response<Full<Bytes>> {
    let span = tracing::info_span!(
        "http.request",
        request_id = %Uuid::new_v4(),
        http.method = %req.method(),
        http.target = %req.uri().path(),
        http.status_code = tracing::field::Empty,
    );

    async move {
        let path = req.uri().path().to_string();
        let route = Route::resolve(req.method(), &path);
        let label = route.label();
        let mut in_flight = InFlight {
            route: label,
            done: false,
        };

        let response = match route {
            Route::Ping => response(
                StatusCode::OK,
                "application/json",
                Bytes::from(serde_json::json!({ "message": "pong" }).to_string()),
            ),
            Route::FormPage => render_page(&state, StatusCode::OK, PageMessage::Empty),
            Route::Upload => upload(req, &state).await,
            Route::Asset(asset) => serve_asset(&state, asset).await,
            Route::MethodNotAllowed(allow) => {
                let mut response = response(
                    StatusCode::METHOD_NOT_ALLOWED,
                    TEXT,
                    Bytes::from_static(b"Method Not Allowed"),
                );
                response
                    .headers_mut()
                    .insert(ALLOW, HeaderValue::from_static(allow));
                response
            }
            Route::NotFound => not_found(),
        };

        in_flight.done = true;
        let status = response.status().as_u16();
        tracing::Span::current().record("http.status_code", status);
        metrics::record_http_request(label, status);
        info!(status, "Request completed");

        response
    }
    .instrument(span)
    .await
}

async fn upload(req: Request<Incoming>, state: &AppState) -> Response<Full<Bytes>> {
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let body = req.into_body().into_data_stream();

    match state.handler.handle(content_type.as_deref(), body).await {
        Ok(_) => render_page(state, StatusCode::OK, PageMessage::Success(SUCCESS_MESSAGE)),
        Err(e) => render_page(
            state,
            StatusCode::BAD_REQUEST,
            PageMessage::Error(e.user_message()),
        ),
    }
}

async fn serve_asset(state: &AppState, asset: &str) -> Response<Full<Bytes>> {
    let Some(assets) = state.assets.as_ref() else {
        return not_found();
    };

    match assets.load(asset).await {
        Ok((bytes, content_type)) => response(StatusCode::OK, content_type, bytes),
        Err(e) => {
            info!(asset, error = %e, "Asset not served");
            not_found()
        }
    }
}

/// Render the form page, falling back to plain text if the template fails
fn render_page(state: &AppState, status: StatusCode, message: PageMessage<'_>) -> Response<Full<Bytes>> {
    match state.renderer.render(message) {
        Ok(html) => response(status, HTML, Bytes::from(html)),
        Err(e) => {
            error!(error = %e, "Failed to render page");
            let text = match message {
                PageMessage::Success(text) | PageMessage::Error(text) => text,
                PageMessage::Empty => status.canonical_reason().unwrap_or_default(),
            };
            response(status, TEXT, Bytes::from(text.to_string()))
        }
    }
}

fn not_found() -> Response<Full<Bytes>> {
    response(StatusCode::NOT_FOUND, TEXT, Bytes::from_static(b"Not Found"))
}

fn response(status: StatusCode, content_type: &'static str, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
