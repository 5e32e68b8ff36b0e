//! HTTP handlers
//!
//! Thin actix-web layer over `FileService`: parse the request, tag the log
//! context, delegate, and let `FileError` render itself.

use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType, EntityTag, ETag};
use actix_web::{delete, get, post, web, HttpRequest, HttpResponse};
use log::{debug, info};
use serde::Deserialize;
use serde_json::json;

use crate::app_state::AppState;
use crate::error::FileError;
use crate::service::UploadRequest;

/// Optional password on upload
pub const PASSWORD_HEADER: &str = "X-File-Password";

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub name: String,
    pub retention: String,
}

#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    pub password: Option<String>,
}

fn password_header(req: &HttpRequest) -> Result<Option<String>, FileError> {
    match req.headers().get(PASSWORD_HEADER) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|v| Some(v.to_string()))
            .map_err(|_| FileError::Validation(format!("invalid {} header value", PASSWORD_HEADER))),
    }
}

/// Tags log lines with `file_id` until dropped at handler exit
struct FileIdContext;

impl FileIdContext {
    fn tag(id: &str) -> Self {
        log_mdc::insert("file_id", id);
        FileIdContext
    }
}

impl Drop for FileIdContext {
    fn drop(&mut self) {
        log_mdc::remove("file_id");
    }
}

#[post("/upload")]
pub async fn upload(
    query: web::Query<UploadParams>,
    payload: web::Payload,
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, FileError> {
    let params = query.into_inner();
    let request = UploadRequest {
        original_name: params.name,
        retention: params.retention,
        password: password_header(&req)?,
    };
    debug!("Upload request for {} (retention {})", request.original_name, request.retention);

    let cancel = state.shutdown.child_token();
    let receipt = state.service.upload(request, payload, &cancel).await?;
    let _tag = FileIdContext::tag(&receipt.id);
    info!("Upload complete, expires at {}", receipt.expires_at);
    Ok(HttpResponse::Ok().json(receipt))
}

#[get("/download/{id}")]
pub async fn download(
    path: web::Path<String>,
    query: web::Query<DownloadParams>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, FileError> {
    let id = path.into_inner();
    let _tag = FileIdContext::tag(&id);

    let service = state.service.clone();
    let cancel = state.shutdown.child_token();
    let password = query.into_inner().password;
    let download = web::block(move || service.download(&id, password.as_deref(), cancel))
        .await
        .map_err(|e| FileError::Storage(format!("download task failed: {}", e)))??;

    Ok(HttpResponse::Ok()
        .content_type(download.content_type)
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(download.original_name)],
        })
        .insert_header(ETag(EntityTag::new_strong(download.checksum)))
        .no_chunking(download.size_bytes)
        .streaming(download.stream))
}

#[get("/files")]
pub async fn list_files(state: web::Data<AppState>) -> Result<HttpResponse, FileError> {
    let service = state.service.clone();
    let files = web::block(move || service.list_all())
        .await
        .map_err(|e| FileError::Storage(format!("list task failed: {}", e)))??;
    debug!("Listing {} files", files.len());
    Ok(HttpResponse::Ok().json(files))
}

#[delete("/files/{id}")]
pub async fn delete_file(path: web::Path<String>, state: web::Data<AppState>) -> Result<HttpResponse, FileError> {
    let id = path.into_inner();
    let _tag = FileIdContext::tag(&id);

    let service = state.service.clone();
    let target = id.clone();
    web::block(move || service.delete(&target))
        .await
        .map_err(|e| FileError::Storage(format!("delete task failed: {}", e)))??;

    Ok(HttpResponse::Ok().json(json!({ "message": "File deleted successfully", "id": id })))
}

/// Register every route on an actix `App`
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(upload)
        .service(download)
        .service(list_files)
        .service(delete_file);
}
