//! API client for communicating with the stories REST API.
//!
//! This module provides the `ApiClient` struct for making authenticated
//! requests for paged and location-tagged story lists, and for posting
//! new stories.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{header, multipart, Client};
use tracing::{debug, info, warn};

use super::RemotePager;
use crate::auth::AuthToken;
use crate::error::FeedError;
use crate::models::{NewStory, StatusResponse, StoriesResponse, Story};

/// Path of the stories collection, relative to the API root
const STORIES_PATH: &str = "stories";

/// Multipart field the photo is uploaded under
const PHOTO_FIELD: &str = "photo";

const USER_AGENT: &str = concat!("storyfeed/", env!("CARGO_PKG_VERSION"));

/// Whether an unpaged story listing should be limited to stories with a
/// location attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationFilter {
    /// Every story, located or not (home-screen widget)
    Any,
    /// Only stories posted with coordinates (map view)
    WithLocation,
}

impl LocationFilter {
    fn query_value(self) -> &'static str {
        match self {
            LocationFilter::Any => "0",
            LocationFilter::WithLocation => "1",
        }
    }
}

/// API client for the stories service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Arc<str>,
}

impl ApiClient {
    /// Create a new API client rooted at `base_url`.
    ///
    /// No request timeout is configured; a hung request stays pending until
    /// the transport gives up or the caller drops the future.
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;

        Ok(Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn stories_url(&self) -> String {
        format!("{}/{}", self.base_url, STORIES_PATH)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, FeedError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(FeedError::from_status(status, &body))
        }
    }

    async fn get_stories(
        &self,
        query: &[(&str, String)],
        token: &AuthToken,
    ) -> Result<Vec<Story>, FeedError> {
        let url = self.stories_url();

        let response = self
            .client
            .get(&url)
            .header(header::ACCEPT, "application/json")
            .bearer_auth(token.as_str())
            .query(query)
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let status = response.status();

        let text = response.text().await?;
        let parsed: StoriesResponse = serde_json::from_str(&text)?;

        // The service sometimes reports failures in-band with a 200
        if parsed.error {
            warn!(url = %url, message = %parsed.message, "Stories request rejected in-band");
            return Err(FeedError::Http {
                status: status.as_u16(),
                body: parsed.message,
            });
        }

        Ok(parsed.stories)
    }

    /// Fetch one page of the story feed
    pub async fn fetch_page(
        &self,
        page: u32,
        size: u32,
        token: &AuthToken,
    ) -> Result<Vec<Story>, FeedError> {
        debug_assert!(page >= 1, "pages are 1-based");
        debug_assert!(size > 0, "page size must be positive");

        let stories = self
            .get_stories(&[("page", page.to_string()), ("size", size.to_string())], token)
            .await?;
        debug!(page, size, received = stories.len(), "Fetched story page");
        Ok(stories)
    }

    /// Fetch the unpaged story listing used by the map view and widget
    pub async fn fetch_stories(
        &self,
        filter: LocationFilter,
        token: &AuthToken,
    ) -> Result<Vec<Story>, FeedError> {
        let stories = self
            .get_stories(&[("location", filter.query_value().to_string())], token)
            .await?;
        debug!(?filter, count = stories.len(), "Fetched story listing");
        Ok(stories)
    }

    /// Upload a new story (`POST /stories`, multipart).
    ///
    /// The cached feed is not touched; callers refresh it afterwards to see
    /// the new story at the head.
    pub async fn add_story(&self, story: NewStory, token: &AuthToken) -> Result<(), FeedError> {
        let url = self.stories_url();
        let mime = story.photo_mime();
        let photo_len = story.photo.len();

        let photo = multipart::Part::bytes(story.photo)
            .file_name(story.file_name)
            .mime_str(mime)?;
        let mut form = multipart::Form::new()
            .part(PHOTO_FIELD, photo)
            .text("description", story.description);
        if let Some((lat, lon)) = story.location {
            form = form.text("lat", lat.to_string()).text("lon", lon.to_string());
        }

        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .bearer_auth(token.as_str())
            .multipart(form)
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let status = response.status();
        let text = response.text().await?;
        let parsed: StatusResponse = serde_json::from_str(&text)?;

        if parsed.error {
            warn!(url = %url, message = %parsed.message, "Story upload rejected in-band");
            return Err(FeedError::Http {
                status: status.as_u16(),
                body: parsed.message,
            });
        }

        info!(photo_bytes = photo_len, located = story.location.is_some(), "Story posted");
        Ok(())
    }
}

#[async_trait]
impl RemotePager for ApiClient {
    async fn fetch(
        &self,
        page: u32,
        size: u32,
        token: &AuthToken,
    ) -> Result<Vec<Story>, FeedError> {
        self.fetch_page(page, size, token).await
    }
}
