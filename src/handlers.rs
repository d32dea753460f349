use crate::{
    auth,
    error::ApiError,
    ffmpeg,
    models::{AppState, CreateVideoRequest, Video},
    storage,
};
use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE},
        HeaderMap, StatusCode,
    },
    response::Json,
};
use multer::{Constraints, Field, Multipart, SizeLimit};
use std::{
    path::{Path as FsPath, PathBuf},
    sync::Arc,
    time::Instant,
};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

const VIDEO_MEDIA_TYPES: &[&str] = &["video/mp4"];
const THUMBNAIL_MEDIA_TYPES: &[&str] = &["image/jpeg", "image/png"];

fn parse_video_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest("Invalid video ID".to_string()))
}

async fn find_video(state: &AppState, video_id: Uuid) -> Result<Video, ApiError> {
    state
        .db
        .get_video(video_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Video not found".to_string()))
}

fn ensure_owner(video: &Video, user_id: Uuid) -> Result<(), ApiError> {
    if video.user_id != user_id {
        debug!(
            "user {} attempted to modify video {} owned by {}",
            user_id, video.id, video.user_id
        );
        return Err(ApiError::Unauthorized("Unauthorized".to_string()));
    }
    Ok(())
}

fn too_large(limit: u64) -> ApiError {
    ApiError::PayloadTooLarge(format!("Upload exceeds the {} byte limit", limit))
}

fn multipart_error(message: &str, err: multer::Error) -> ApiError {
    match err {
        multer::Error::StreamSizeExceeded { limit }
        | multer::Error::FieldSizeExceeded { limit, .. } => too_large(limit),
        other => ApiError::internal(message, other),
    }
}

/// Multipart reader over the request body, capped at `limit` bytes.
///
/// A declared `Content-Length` over the limit is rejected up front; chunked
/// bodies are cut off by multer once they cross it.
fn multipart_reader(request: Request<Body>, limit: u64) -> Result<Multipart<'static>, ApiError> {
    let declared_length = request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared_length.is_some_and(|length| length > limit) {
        return Err(too_large(limit));
    }

    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let boundary = multer::parse_boundary(content_type)
        .map_err(|e| ApiError::internal("Could not parse formdata", e))?;

    Ok(Multipart::with_constraints(
        request.into_body().into_data_stream(),
        boundary,
        Constraints::new().size_limit(SizeLimit::new().whole_stream(limit).per_field(limit)),
    ))
}

/// Advances to the field called `name`, skipping any others.
async fn find_field(
    multipart: &mut Multipart<'static>,
    name: &str,
    message: &str,
) -> Result<Field<'static>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(message, e))?
    {
        if field.name() == Some(name) {
            return Ok(field);
        }
    }

    Err(ApiError::internal(
        message,
        format!("form field {:?} is missing", name),
    ))
}

/// Validates the part's declared media type against `allowed`, returning the
/// media type and the file extension derived from its subtype.
fn accepted_media_type(
    field: &Field<'_>,
    allowed: &[&str],
) -> Result<(String, String), ApiError> {
    let mime = field
        .content_type()
        .ok_or_else(|| ApiError::BadRequest("Unable to parse media type".to_string()))?;

    let media_type = mime.essence_str().to_string();
    if !allowed.contains(&media_type.as_str()) {
        return Err(ApiError::BadRequest(format!(
            "Invalid media type {:?}, expected one of {}",
            media_type,
            allowed.join(", ")
        )));
    }

    Ok((media_type, mime.subtype().as_str().to_string()))
}

/// A thumbnail read off the wire: in memory while it fits, otherwise in a
/// scratch file that is removed with `_dir`.
enum SpooledUpload {
    Memory(Vec<u8>),
    Disk { _dir: TempDir, path: PathBuf },
}

impl SpooledUpload {
    async fn persist(&self, destination: &FsPath) -> std::io::Result<()> {
        match self {
            SpooledUpload::Memory(data) => tokio::fs::write(destination, data).await,
            SpooledUpload::Disk { path, .. } => tokio::fs::copy(path, destination).await.map(|_| ()),
        }
    }
}

/// Reads `field` chunk by chunk, keeping at most `memory_limit` bytes in
/// memory before moving everything into a file under `scratch_dir`.
async fn spool_field(
    field: &mut Field<'static>,
    memory_limit: u64,
    scratch_dir: &FsPath,
) -> Result<(SpooledUpload, u64), ApiError> {
    let mut memory = Vec::new();
    let mut spill: Option<(TempDir, PathBuf, tokio::fs::File)> = None;
    let mut received: u64 = 0;

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| multipart_error("Unable to read file", e))?
    {
        received += chunk.len() as u64;

        if spill.is_none() && received > memory_limit {
            let dir = tempfile::Builder::new()
                .prefix("thumbnail-upload-")
                .tempdir_in(scratch_dir)
                .map_err(|e| ApiError::internal("Unable to read file", e))?;
            let path = dir.path().join("thumbnail-upload");
            let mut file = tokio::fs::File::create(&path)
                .await
                .map_err(|e| ApiError::internal("Unable to read file", e))?;
            file.write_all(&memory)
                .await
                .map_err(|e| ApiError::internal("Unable to read file", e))?;
            memory = Vec::new();
            spill = Some((dir, path, file));
        }

        match spill.as_mut() {
            Some((_, _, file)) => file
                .write_all(&chunk)
                .await
                .map_err(|e| ApiError::internal("Unable to read file", e))?,
            None => memory.extend_from_slice(&chunk),
        }
    }

    let spooled = match spill {
        Some((dir, path, mut file)) => {
            file.flush()
                .await
                .map_err(|e| ApiError::internal("Unable to read file", e))?;
            debug!("thumbnail spilled to {:?} after {} bytes", path, received);
            SpooledUpload::Disk { _dir: dir, path }
        }
        None => SpooledUpload::Memory(memory),
    };

    Ok((spooled, received))
}

/// Upload the video file for a record: inspect, remux for fast start, and
/// store under a random aspect-ratio-prefixed key.
pub async fn upload_video_handler(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
    request: Request<Body>,
) -> Result<Json<Video>, ApiError> {
    let start_time = Instant::now();
    let config = &state.config;

    let video_id = parse_video_id(&video_id)?;
    let mut video = find_video(&state, video_id).await?;

    let user_id = auth::authenticate(request.headers(), &config.jwt_secret)?;
    ensure_owner(&video, user_id)?;

    info!(
        "[POST /api/videos/upload] video {} by user {}",
        video_id, user_id
    );

    let mut multipart = multipart_reader(request, config.max_upload_bytes)?;
    let mut field = find_field(&mut multipart, "video", "Could not get video file").await?;
    let (media_type, extension) = accepted_media_type(&field, VIDEO_MEDIA_TYPES)?;

    // Both the raw upload and its fast-start copy live here; the directory is
    // removed when this guard drops, whichever way the handler exits.
    let scratch = tempfile::Builder::new()
        .prefix("video-upload-")
        .tempdir_in(&config.scratch_dir)
        .map_err(|e| ApiError::internal("unable to create temp file", e))?;
    let upload_path = scratch.path().join("video-upload.mp4");

    let mut upload = tokio::fs::File::create(&upload_path)
        .await
        .map_err(|e| ApiError::internal("unable to create temp file", e))?;

    let mut received: u64 = 0;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| multipart_error("unable to copy file", e))?
    {
        upload
            .write_all(&chunk)
            .await
            .map_err(|e| ApiError::internal("unable to copy file", e))?;
        received += chunk.len() as u64;
    }
    upload
        .flush()
        .await
        .map_err(|e| ApiError::internal("unable to copy file", e))?;
    drop(upload);

    info!(
        "[POST /api/videos/upload] received {:.2} MB",
        received as f64 / 1024.0 / 1024.0
    );

    let aspect_ratio = ffmpeg::get_video_aspect_ratio(&config.media, &upload_path).await?;
    let processed_path = ffmpeg::process_video_for_fast_start(&config.media, &upload_path).await?;

    let mut processed = tokio::fs::File::open(&processed_path)
        .await
        .map_err(|e| ApiError::internal("error reading processed file", e))?;

    let key = storage::object_key(Some(aspect_ratio.storage_prefix()), &extension);
    state
        .storage
        .put_object(&key, &mut processed, &media_type)
        .await?;

    video.video_url = Some(config.video_url(&key));
    let video = state.db.update_video(&video).await.map_err(|e| {
        ApiError::internal("unable to update video metadata", e)
    })?;

    info!(
        "[POST /api/videos/upload] ✅ video {} stored as {} ({}) in {:.2}s",
        video_id,
        key,
        aspect_ratio,
        start_time.elapsed().as_secs_f64()
    );

    Ok(Json(video))
}

/// Upload a thumbnail image for a record into the local assets directory.
pub async fn upload_thumbnail_handler(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
    request: Request<Body>,
) -> Result<Json<Video>, ApiError> {
    let config = &state.config;

    let video_id = parse_video_id(&video_id)?;
    let user_id = auth::authenticate(request.headers(), &config.jwt_secret)?;

    info!(
        "[POST /api/videos/thumbnail] video {} by user {}",
        video_id, user_id
    );

    let mut multipart = multipart_reader(request, config.max_upload_bytes)?;
    let mut field = find_field(&mut multipart, "thumbnail", "Unable to read file").await?;
    let declared_type = accepted_media_type(&field, THUMBNAIL_MEDIA_TYPES);
    let (data, received) =
        spool_field(&mut field, config.thumbnail_memory_bytes, &config.scratch_dir).await?;

    let mut video = find_video(&state, video_id).await?;
    ensure_owner(&video, user_id)?;

    let (_, extension) = declared_type?;
    let filename = storage::object_key(None, &extension);
    let asset_path = config.assets_root.join(&filename);

    data.persist(&asset_path)
        .await
        .map_err(|e| ApiError::internal("could not create new file", e))?;

    video.thumbnail_url = Some(config.asset_url(&filename));
    let video = state.db.update_video(&video).await.map_err(|e| {
        ApiError::internal("could not update video metadata", e)
    })?;

    info!(
        "[POST /api/videos/thumbnail] ✅ video {} thumbnail {} ({} bytes)",
        video_id,
        filename,
        received
    );

    Ok(Json(video))
}

/// Create a draft video record owned by the caller
pub async fn create_video_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreateVideoRequest>,
) -> Result<(StatusCode, Json<Video>), ApiError> {
    let user_id = auth::authenticate(&headers, &state.config.jwt_secret)?;

    let title = request.title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("Title is required".to_string()));
    }

    let video = state
        .db
        .create_video(Video::new(user_id, title.to_string(), request.description))
        .await
        .map_err(|e| ApiError::internal("Couldn't create video", e))?;

    info!("[POST /api/videos] created video {} for user {}", video.id, user_id);

    Ok((StatusCode::CREATED, Json(video)))
}

pub async fn list_videos_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Video>>, ApiError> {
    let user_id = auth::authenticate(&headers, &state.config.jwt_secret)?;
    let videos = state
        .db
        .get_videos(user_id)
        .await
        .map_err(|e| ApiError::internal("Couldn't retrieve videos", e))?;
    Ok(Json(videos))
}

pub async fn get_video_handler(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
) -> Result<Json<Video>, ApiError> {
    let video_id = parse_video_id(&video_id)?;
    Ok(Json(find_video(&state, video_id).await?))
}

/// Delete a record. Objects and assets it points at are left in place.
pub async fn delete_video_handler(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let video_id = parse_video_id(&video_id)?;
    let user_id = auth::authenticate(&headers, &state.config.jwt_secret)?;

    let video = find_video(&state, video_id).await?;
    ensure_owner(&video, user_id)?;

    state.db.delete_video(video_id).await?;
    info!("[DELETE /api/videos] deleted video {}", video_id);

    Ok(StatusCode::NO_CONTENT)
}
