use crate::models::{Post, PostDraft};

use super::{ApiClient, ApiError};

/// Typed endpoints for the `/posts` resource.
#[derive(Clone)]
pub struct PostsApi {
    client: ApiClient,
}

impl PostsApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> Result<Vec<Post>, ApiError> {
        self.client.get("/posts").await
    }

    pub async fn get(&self, id: u64) -> Result<Post, ApiError> {
        self.client.get(&format!("/posts/{}", id)).await
    }

    pub async fn create(&self, draft: &PostDraft) -> Result<Post, ApiError> {
        self.client.post("/posts", draft).await
    }

    pub async fn update(&self, id: u64, draft: &PostDraft) -> Result<Post, ApiError> {
        self.client.put(&format!("/posts/{}", id), draft).await
    }

    pub async fn delete(&self, id: u64) -> Result<(), ApiError> {
        // Some backends answer `{}`; the body is not needed
        let _: serde_json::Value = self.client.delete(&format!("/posts/{}", id)).await?;
        Ok(())
    }
}
