//! The scrape flow: load the channel's video list, read the channel, scroll
//! until enough entries are rendered, then extract every entry in DOM order.

use chrono::{Local, NaiveDateTime};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::browser::{ElementHandle, PageSession, Selector};
use crate::config::ExtractionSettings;
use crate::error::ExtractionError;
use crate::extract::{extract_about, extract_channel, extract_video, merge_about, scripts};
use crate::models::{ExtractionReport, FailedVideo, VideoRecord};

pub const DEFAULT_MAX_VIDEOS: usize = 100;

const ENTRIES: Selector = Selector::Css(scripts::ENTRY_SELECTOR);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    /// Already normalized, see [`normalize_handle`].
    pub channel_handle: String,
    /// `0` lifts the cap.
    pub max_videos: usize,
    pub include_about: bool,
}

impl ExtractionRequest {
    pub fn new(channel_handle: impl Into<String>) -> Self {
        Self {
            channel_handle: channel_handle.into(),
            max_videos: DEFAULT_MAX_VIDEOS,
            include_about: false,
        }
    }

    fn limit(&self) -> Option<usize> {
        (self.max_videos > 0).then_some(self.max_videos)
    }
}

/// Trims whitespace and slashes, and prefixes bare names with `@`. Paths such
/// as `channel/UC...` pass through. Returns `None` for an empty handle.
pub fn normalize_handle(raw: &str) -> Option<String> {
    let handle = raw.trim().trim_matches('/').trim();
    if handle.is_empty() {
        return None;
    }
    if handle.starts_with('@') || handle.contains('/') {
        Some(handle.to_string())
    } else {
        Some(format!("@{handle}"))
    }
}

pub fn videos_url(channel_handle: &str) -> String {
    format!("https://youtube.com/{channel_handle}/videos")
}

pub async fn extract(
    session: &mut dyn PageSession,
    request: &ExtractionRequest,
    settings: &ExtractionSettings,
) -> Result<ExtractionReport, ExtractionError> {
    extract_at(session, request, settings, Local::now().naive_local()).await
}

/// Same as [`extract`] with relative publish times resolved against `now`.
pub async fn extract_at(
    session: &mut dyn PageSession,
    request: &ExtractionRequest,
    settings: &ExtractionSettings,
    now: NaiveDateTime,
) -> Result<ExtractionReport, ExtractionError> {
    let handle = request.channel_handle.as_str();
    let url = videos_url(handle);
    info!(channel = handle, max_videos = request.max_videos, "scraping channel");

    let load_timeout = || ExtractionError::UpstreamLoadTimeout {
        url: url.clone(),
        timeout: settings.page_load_timeout,
    };
    if let Err(err) = session.navigate(&url).await {
        warn!(%url, error = %err, "navigation failed");
        return Err(load_timeout());
    }
    if !session
        .wait_until_ready(settings.page_load_timeout, settings.poll_interval)
        .await
    {
        warn!(%url, timeout = ?settings.page_load_timeout, "channel page never became ready");
        return Err(load_timeout());
    }

    let channel = extract_channel(session, settings).await;
    let mut record = channel.record;
    let Some(channel_id) = record.channel_id.clone() else {
        return Err(ExtractionError::ChannelNotFound {
            channel_handle: handle.to_string(),
        });
    };

    let entries = load_entries(session, request.limit(), settings).await;
    info!(channel = handle, found = entries.len(), "video entries after scrolling");
    if entries.is_empty() {
        return Err(ExtractionError::NoVideosFound {
            channel_handle: handle.to_string(),
            channel_id,
        });
    }

    let total_videos_found = entries.len();
    let mut videos: Vec<VideoRecord> = Vec::with_capacity(total_videos_found);
    let mut failures = Vec::new();
    for entry in entries {
        let index = videos.len() + failures.len();
        match extract_video(session, entry, now).await {
            Ok(Some(video)) => videos.push(video),
            Ok(None) => failures.push(FailedVideo {
                index,
                reason: "Failed to extract metadata".into(),
            }),
            Err(err) => {
                debug!(index, error = %err, "video entry failed");
                failures.push(FailedVideo {
                    index,
                    reason: err.to_string(),
                });
            }
        }
    }

    if request.include_about && !channel.reveal.is_revealed() {
        if let Some(about) = extract_about(session, handle, settings).await {
            merge_about(&mut record, about);
        }
    }

    info!(
        channel = handle,
        processed = videos.len(),
        failed = failures.len(),
        "channel scraped"
    );
    Ok(ExtractionReport::new(record, videos, failures, total_videos_found))
}

/// Scrolls until `limit` entries are rendered, the count stalls, or the scroll
/// timeout passes. Returns at most `limit` handles in DOM order.
async fn load_entries(
    session: &mut dyn PageSession,
    limit: Option<usize>,
    settings: &ExtractionSettings,
) -> Vec<ElementHandle> {
    let started = Instant::now();
    let mut last_count = 0;
    let mut stalled = 0;

    loop {
        if let Err(err) = session.scroll_to_bottom().await {
            warn!(error = %err, "scroll failed");
        }
        sleep(settings.scroll_pause).await;

        let count = match session.count(&ENTRIES).await {
            Ok(count) => count,
            Err(err) => {
                warn!(error = %err, "counting entries failed");
                last_count
            }
        };
        debug!(count, "entries visible");

        if limit.is_some_and(|limit| count >= limit) {
            info!(count, "reached requested number of videos");
            break;
        }
        if count == last_count {
            stalled += 1;
            if stalled >= settings.max_stalled_attempts {
                info!(count, "no new videos after several scrolls");
                break;
            }
        } else {
            stalled = 0;
        }
        last_count = count;

        if started.elapsed() >= settings.scroll_timeout {
            warn!(count, "scrolling timed out");
            break;
        }
    }

    let mut entries = match session.find(&ENTRIES).await {
        Ok(found) => found,
        Err(err) => {
            warn!(error = %err, "collecting entries failed");
            Vec::new()
        }
    };
    if let Some(limit) = limit {
        entries.truncate(limit);
    }
    entries
}
