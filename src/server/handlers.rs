use std::path::Path as FsPath;

use axum::{
    body::Body,
    extract::{Path, State},
    http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    response::{Html, IntoResponse, Response},
};
use repack_archive::OutputCompression;
use repack_config::{ServeMode, is_plain_file_name};
use tokio_util::io::ReaderStream;

use super::{error::ServerError, state::AppState};

pub async fn index(State(state): State<AppState>) -> Result<Html<String>, ServerError> {
    Ok(Html(state.render_index()?))
}

pub async fn download(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
) -> Result<Response, ServerError> {
    if !is_plain_file_name(&file_name) {
        return Err(ServerError::BadRequest(format!(
            "'{file_name}' is not a plain file name"
        )));
    }

    let config = state.config();
    let path = match config.serve_mode {
        ServeMode::Eager => config.download_dir.join(&file_name),
        ServeMode::Lazy => {
            // Only the configured archive can be built on demand.
            if file_name != config.output_name {
                return Err(ServerError::NotFound(file_name));
            }
            state.rebuild().await?.path
        }
    };

    serve_file(&path, &file_name).await
}

/// Streams the file at `path` as an attachment named `file_name`.
async fn serve_file(path: &FsPath, file_name: &str) -> Result<Response, ServerError> {
    let file = match fs_err::tokio::File::open(path).await {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ServerError::NotFound(file_name.to_string()));
        }
        Err(err) => return Err(err.into()),
    };

    let metadata = file.metadata().await?;
    if !metadata.is_file() {
        return Err(ServerError::NotFound(file_name.to_string()));
    }

    let content_type = OutputCompression::from_file_name(file_name).content_type();
    let disposition = format!(
        "attachment; filename=\"{}\"",
        file_name.replace(['"', '\\'], "_")
    );
    let body = Body::from_stream(ReaderStream::new(file));

    Ok((
        [
            (CONTENT_TYPE, content_type.to_string()),
            (CONTENT_LENGTH, metadata.len().to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}
