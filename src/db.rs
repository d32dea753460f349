//! Video metadata store.

use crate::models::Video;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("video {0} does not exist")]
    NotFound(Uuid),
}

/// Storage for video records. Reads and writes are individually atomic; a
/// read-modify-write spanning two calls is not, and the last update wins.
#[async_trait]
pub trait VideoRepository: Send + Sync {
    async fn create_video(&self, video: Video) -> Result<Video, RepositoryError>;

    async fn get_video(&self, id: Uuid) -> Result<Option<Video>, RepositoryError>;

    /// Videos owned by `user_id`, newest first.
    async fn get_videos(&self, user_id: Uuid) -> Result<Vec<Video>, RepositoryError>;

    /// Replaces the stored record and bumps `updated_at`.
    async fn update_video(&self, video: &Video) -> Result<Video, RepositoryError>;

    async fn delete_video(&self, id: Uuid) -> Result<(), RepositoryError>;
}

#[derive(Default)]
pub struct InMemoryVideoRepository {
    videos: RwLock<HashMap<Uuid, Video>>,
}

impl InMemoryVideoRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VideoRepository for InMemoryVideoRepository {
    async fn create_video(&self, video: Video) -> Result<Video, RepositoryError> {
        self.videos.write().await.insert(video.id, video.clone());
        Ok(video)
    }

    async fn get_video(&self, id: Uuid) -> Result<Option<Video>, RepositoryError> {
        Ok(self.videos.read().await.get(&id).cloned())
    }

    async fn get_videos(&self, user_id: Uuid) -> Result<Vec<Video>, RepositoryError> {
        let mut videos: Vec<Video> = self
            .videos
            .read()
            .await
            .values()
            .filter(|v| v.user_id == user_id)
            .cloned()
            .collect();
        videos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(videos)
    }

    async fn update_video(&self, video: &Video) -> Result<Video, RepositoryError> {
        let mut videos = self.videos.write().await;
        let stored = videos
            .get_mut(&video.id)
            .ok_or(RepositoryError::NotFound(video.id))?;

        let mut updated = video.clone();
        updated.updated_at = Utc::now();
        *stored = updated.clone();
        Ok(updated)
    }

    async fn delete_video(&self, id: Uuid) -> Result<(), RepositoryError> {
        self.videos
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound(id))
    }
}
