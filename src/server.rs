use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, Path, Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_typed_multipart::TypedMultipart;
use http::StatusCode;
use tokio::fs;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::converter::{Converter, ProgressSink};
use crate::dto::{
    ConvertRequest, ConvertResponse, FormatsResponse, ProbeResponse, UploadRequest,
    UploadResponse,
};
use crate::error::{Error, Result};
use crate::formats;
use crate::upload::{self, UploadGate};

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

pub struct Server {
    converter: Arc<Converter>,
    uploads: UploadGate,
    convert_timeout: Duration,
}

impl Server {
    pub fn new(
        converter: Arc<Converter>,
        uploads: UploadGate,
        convert_timeout: Duration,
    ) -> Server {
        Server {
            converter,
            uploads,
            convert_timeout,
        }
    }

    pub fn router(self) -> Router {
        let body_limit = (self.uploads.size_limit() + MULTIPART_OVERHEAD) as usize;
        let downloads = ServeDir::new(self.uploads.dir());
        let this = Arc::new(self);

        Router::new()
            .route(
                "/upload",
                post(upload_file).layer(DefaultBodyLimit::max(body_limit)),
            )
            .route("/convert", post(convert_file))
            .route("/probe/:file_name", get(probe_file))
            .route("/formats", get(list_formats))
            .nest_service("/download", downloads)
            .with_state(this)
            .layer(middleware::from_fn(hide_staging_files))
            .layer(TraceLayer::new_for_http())
    }

    pub async fn serve<F>(self, addr: &str, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();

        tracing::info!("listening on {addr}");
        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
    }
}

/// Uploads are staged under dot-prefixed names in the served directory.
async fn hide_staging_files(req: Request, next: Next) -> Response {
    let hidden = req.uri().path().strip_prefix("/download/").is_some_and(|path| {
        path.split('/').any(|segment| {
            upload::is_hidden(segment) || segment.to_ascii_lowercase().starts_with("%2e")
        })
    });
    if hidden {
        return StatusCode::NOT_FOUND.into_response();
    }
    next.run(req).await
}

async fn upload_file(
    State(server): State<Arc<Server>>,
    TypedMultipart(req): TypedMultipart<UploadRequest>,
) -> Result<(StatusCode, Json<UploadResponse>)> {
    let file = req.file;
    let name = file.metadata.file_name.clone().unwrap_or_default();
    let size = file
        .contents
        .as_file()
        .metadata()
        .map_err(Error::StorageFailure)?
        .len();
    let stream = fs::File::from_std(file.contents.reopen().map_err(Error::StorageFailure)?);

    let stored = server
        .uploads
        .accept(stream, &name, size, file.metadata.content_type.as_deref())
        .await?;

    Ok((StatusCode::CREATED, Json(stored.into())))
}

async fn convert_file(
    State(server): State<Arc<Server>>,
    Json(req): Json<ConvertRequest>,
) -> Result<Json<ConvertResponse>> {
    let input = server.uploads.resolve(&req.file_name)?;

    // Cancels the transcoder if the client goes away and this future is dropped.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let progress: ProgressSink = {
        let file_name = req.file_name.clone();
        Arc::new(move |pct| debug!(file = %file_name, "conversion at {:.1}%", pct))
    };

    let convert = server.converter.convert(
        &input,
        &req.output_format,
        Some(progress),
        Some(cancel.clone()),
    );
    tokio::pin!(convert);

    let result = tokio::select! {
        result = &mut convert => result,
        _ = tokio::time::sleep(server.convert_timeout) => {
            warn!(file = %req.file_name, "conversion timed out");
            cancel.cancel();
            convert.await
        }
    };
    let result = result?;

    let converted_file = result
        .output_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(Json(ConvertResponse {
        original_file: req.file_name,
        converted_file,
        duration: result.duration.as_secs_f64(),
    }))
}

async fn probe_file(
    State(server): State<Arc<Server>>,
    Path(file_name): Path<String>,
) -> Result<Json<ProbeResponse>> {
    let input = server.uploads.resolve(&file_name)?;
    let info = server.converter.probe(&input).await?;

    Ok(Json(ProbeResponse {
        file_name,
        duration: info.duration.as_secs_f64(),
        has_video: info.has_video,
    }))
}

async fn list_formats(State(server): State<Arc<Server>>) -> Json<FormatsResponse> {
    Json(FormatsResponse {
        output_formats: formats::OUTPUT_FORMATS.iter().map(|f| f.to_string()).collect(),
        upload_extensions: formats::UPLOAD_EXTENSIONS
            .iter()
            .map(|f| f.to_string())
            .collect(),
        max_upload_size: server.uploads.size_limit(),
    })
}
