//! Live chat from a YouTube stream through the Data API.
//!
//! The live chat id is resolved once from the watch URL. After that every
//! poll fetches the page after the last one seen, so each message is
//! returned once.

use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use gptuber_core::collab::ChatFeed;
use gptuber_core::types::ChatMessage;
use reqwest::Client;
use serde::Deserialize;

// ---------------------------------------------------------------------------
// API shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct VideoList {
    #[serde(default)]
    items: Vec<Video>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Video {
    live_streaming_details: Option<LiveStreamingDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LiveStreamingDetails {
    active_live_chat_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatPage {
    #[serde(default)]
    items: Vec<ChatItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ChatItem {
    snippet: Snippet,
    author_details: AuthorDetails,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Snippet {
    display_message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AuthorDetails {
    display_name: String,
}

/// Parse one `liveChat/messages` response into chat messages and the token
/// of the next page. Items without a message come back empty and are
/// dropped later by the report builder.
pub fn parse_chat_page(body: &str) -> anyhow::Result<(Vec<ChatMessage>, Option<String>)> {
    let page: ChatPage = serde_json::from_str(body).context("malformed live chat page")?;
    let messages = page
        .items
        .into_iter()
        .map(|item| {
            ChatMessage::new(item.author_details.display_name, item.snippet.display_message)
        })
        .collect();
    Ok((messages, page.next_page_token))
}

/// Video id from a watch URL (`watch?v=`, `youtu.be/`, `/live/`) or a bare id.
pub fn video_id_from_url(url: &str) -> Option<&str> {
    let url = url.trim();
    if let Some((_, query)) = url.split_once('?') {
        for pair in query.split('&') {
            if let Some(id) = pair.strip_prefix("v=") {
                return (!id.is_empty()).then_some(id);
            }
        }
    }
    let path = url.split(|c: char| c == '?' || c == '#').next()?;
    let last = path.trim_end_matches('/').rsplit('/').next()?;
    if last.is_empty() || last.contains('.') || last.contains(':') {
        None
    } else {
        Some(last)
    }
}

// ---------------------------------------------------------------------------
// YoutubeChat
// ---------------------------------------------------------------------------

pub struct YoutubeChat {
    client: Client,
    api_base: String,
    api_key: String,
    chat_id: String,
    page_token: Mutex<Option<String>>,
}

impl YoutubeChat {
    fn with_chat_id(client: Client, api_base: &str, api_key: &str, chat_id: String) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            chat_id,
            page_token: Mutex::new(None),
        }
    }

    /// Resolve the live chat of `watch_url`. Fails if the video is unknown
    /// or not live right now.
    pub async fn connect(api_base: &str, api_key: &str, watch_url: &str) -> anyhow::Result<Self> {
        let video_id = video_id_from_url(watch_url)
            .ok_or_else(|| anyhow!("no video id in '{watch_url}'"))?;

        let client = Client::new();
        let videos: VideoList = client
            .get(format!("{}/videos", api_base.trim_end_matches('/')))
            .query(&[
                ("key", api_key),
                ("id", video_id),
                ("part", "liveStreamingDetails"),
            ])
            .send()
            .await
            .context("YouTube video lookup failed")?
            .error_for_status()
            .context("YouTube video lookup was refused")?
            .json()
            .await
            .context("malformed YouTube video lookup")?;

        let video = videos
            .items
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("video '{video_id}' not found"))?;
        let chat_id = video
            .live_streaming_details
            .and_then(|d| d.active_live_chat_id)
            .ok_or_else(|| anyhow!("video '{video_id}' is not live"))?;

        tracing::info!(video_id, chat_id = %chat_id, "watching YouTube live chat");
        Ok(Self::with_chat_id(client, api_base, api_key, chat_id))
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    fn page_token(&self) -> MutexGuard<'_, Option<String>> {
        self.page_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fetch the messages after the last page seen.
    pub async fn fetch_page(&self) -> anyhow::Result<Vec<ChatMessage>> {
        let token = self.page_token().clone();

        let mut request = self
            .client
            .get(format!("{}/liveChat/messages", self.api_base))
            .query(&[
                ("key", self.api_key.as_str()),
                ("liveChatId", self.chat_id.as_str()),
                ("part", "id,snippet,authorDetails"),
            ]);
        if let Some(token) = &token {
            request = request.query(&[("pageToken", token.as_str())]);
        }

        let body = request
            .send()
            .await
            .context("YouTube chat request failed")?
            .error_for_status()
            .context("YouTube chat request was refused")?
            .text()
            .await?;

        let (messages, next) = parse_chat_page(&body)?;
        // without a next token the old one still marks what was seen
        if next.is_some() {
            *self.page_token() = next;
        }
        Ok(messages)
    }
}

#[async_trait]
impl ChatFeed for YoutubeChat {
    async fn poll_recent(&self) -> Vec<ChatMessage> {
        match self.fetch_page().await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "YouTube chat poll failed");
                Vec::new()
            }
        }
    }
}
