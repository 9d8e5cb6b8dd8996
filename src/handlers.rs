use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use actix_files::Files;
use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpResponse};
use futures_util::StreamExt;

use crate::classifier::Classifier;
use crate::error::UploadError;
use crate::models::{HealthResponse, UploadResponse};
use crate::staging::StagedUpload;

pub const IMAGE_FIELD: &str = "image";

pub struct AppState {
    pub classifier: Arc<dyn Classifier>,
    pub upload_dir: PathBuf,
    pub retain_uploads: bool,
    pub public_base_url: String,
}

/// Registers the API routes, plus `/uploads` when uploads are retained.
pub fn routes(state: web::Data<AppState>) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        cfg.app_data(state.clone())
            .service(web::resource("/api/upload").route(web::post().to(upload)))
            .service(web::resource("/api/health").route(web::get().to(health)));

        if state.retain_uploads {
            cfg.service(Files::new("/uploads", state.upload_dir.clone()));
        }
    }
}

pub async fn upload(
    state: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, UploadError> {
    let mut staged = stage_image(&state.upload_dir, &mut payload)
        .await?
        .ok_or(UploadError::NoImage)?;

    tracing::info!(file = %staged.file_name(), "running classifier");
    let result = state.classifier.classify(staged.path()).await?;
    tracing::info!(
        file = %staged.file_name(),
        class_number = result.class_number,
        class_name = %result.class_name,
        confidence = result.confidence,
        "classified upload"
    );

    let image_url = if state.retain_uploads {
        staged.retain();
        Some(format!("{}/uploads/{}", state.public_base_url, staged.file_name()))
    } else {
        None
    };

    Ok(HttpResponse::Ok().json(UploadResponse { result, image_url }))
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse { status: "ok" })
}

/// Streams the first non-empty `image` file part to disk. Other fields,
/// including an `image` part without a filename, are drained and ignored.
///
/// Multipart errors seen before the image arrives mean there is no image to
/// work with; errors after that point mean the body was cut or mangled.
async fn stage_image(
    dir: &Path,
    payload: &mut Multipart,
) -> Result<Option<StagedUpload>, UploadError> {
    let mut staged: Option<StagedUpload> = None;

    while let Some(item) = payload.next().await {
        let mut field = match item {
            Ok(field) => field,
            Err(e) if staged.is_none() => {
                tracing::debug!(error = %e, "unreadable multipart body");
                return Ok(None);
            }
            Err(e) => return Err(UploadError::Malformed(e.to_string())),
        };

        let disposition = field.content_disposition();
        let is_image = disposition.get_name() == Some(IMAGE_FIELD)
            && disposition.get_filename().is_some();
        if !is_image || staged.is_some() {
            while let Some(chunk) = field.next().await {
                if let Err(e) = chunk {
                    if staged.is_none() {
                        tracing::debug!(error = %e, "unreadable multipart field");
                        return Ok(None);
                    }
                    return Err(UploadError::Malformed(e.to_string()));
                }
            }
            continue;
        }

        let upload = StagedUpload::new(dir, field.content_disposition().get_filename());
        let written = write_field(&upload, &mut field).await?;
        if written == 0 {
            tracing::debug!("ignoring empty image field");
            continue;
        }
        tracing::debug!(file = %upload.file_name(), bytes = written, "staged upload");
        staged = Some(upload);
    }

    Ok(staged)
}

async fn write_field(upload: &StagedUpload, field: &mut Field) -> Result<u64, UploadError> {
    let path = upload.path().to_path_buf();
    let mut f = web::block(move || File::create(&path))
        .await
        .map_err(blocking_error)?
        .map_err(|e| {
            tracing::error!(path = %upload.path().display(), error = %e, "failed to create file");
            UploadError::Staging(e)
        })?;

    let mut written = 0u64;
    while let Some(chunk) = field.next().await {
        let data = chunk.map_err(|e| UploadError::Malformed(e.to_string()))?;
        written += data.len() as u64;
        f = web::block(move || f.write_all(&data).map(|_| f))
            .await
            .map_err(blocking_error)?
            .map_err(|e| {
                tracing::error!(path = %upload.path().display(), error = %e, "failed to write data to file");
                UploadError::Staging(e)
            })?;
    }

    Ok(written)
}

fn blocking_error(e: actix_web::error::BlockingError) -> UploadError {
    tracing::error!(error = %e, "blocking file task failed");
    UploadError::Staging(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
}
