use chrono::NaiveDateTime;
use serde::Deserialize;
use url::Url;

use crate::browser::{BrowserError, ElementHandle, PageSession};
use crate::extract::scripts;
use crate::models::{Thumbnail, ThumbnailSet, VideoRecord};
use crate::normalize::{parse_duration, parse_magnitude, parse_relative_time_at};

const WATCH_BASE: &str = "https://www.youtube.com/watch";

/// What `scripts::VIDEO_ENTRY` reports for one entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawVideoEntry {
    pub href: Option<String>,
    pub title: Option<String>,
    #[serde(default)]
    pub metadata: Vec<String>,
    pub duration: Option<String>,
}

/// Runs the entry script against `entry` and builds the record.
///
/// `Ok(None)` means the entry has no usable watch link. Browser errors are
/// returned so the caller can record them against the entry.
pub async fn extract_video(
    session: &mut dyn PageSession,
    entry: ElementHandle,
    now: NaiveDateTime,
) -> Result<Option<VideoRecord>, BrowserError> {
    let value = session.run_script_on(entry, scripts::VIDEO_ENTRY).await?;
    if value.is_null() {
        return Ok(None);
    }
    let raw: RawVideoEntry = serde_json::from_value(value)?;
    Ok(build_video_record(&raw, now))
}

/// Pure half of the extractor: turns the raw entry into a canonical record.
pub fn build_video_record(raw: &RawVideoEntry, now: NaiveDateTime) -> Option<VideoRecord> {
    let video_id = raw.href.as_deref().and_then(video_id_from_href)?;

    let title = raw
        .title
        .as_deref()
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .map(str::to_string);

    let mut time_ago = None;
    let mut view_text = None;
    for fragment in &raw.metadata {
        if fragment.contains("ago") {
            time_ago.get_or_insert(fragment.as_str());
        } else if fragment.contains("view") {
            view_text.get_or_insert(fragment.as_str());
        }
    }

    Some(VideoRecord {
        title,
        published_at: time_ago.and_then(|text| parse_relative_time_at(text, now)),
        duration: parse_duration(raw.duration.as_deref().unwrap_or_default()),
        view_count: view_text.and_then(parse_magnitude),
        thumbnails: video_thumbnails(&video_id),
        url: watch_url(&video_id),
        video_id,
    })
}

/// Reads the `v` query parameter of a watch link. Relative links resolve
/// against the platform origin.
pub fn video_id_from_href(href: &str) -> Option<String> {
    let base = Url::parse(WATCH_BASE).ok()?;
    let url = base.join(href.trim()).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "v")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

pub fn watch_url(video_id: &str) -> String {
    format!("{WATCH_BASE}?v={video_id}")
}

/// The platform serves fixed-size stills for every video id, so the tiers
/// are built rather than scraped.
pub fn video_thumbnails(video_id: &str) -> ThumbnailSet {
    let still = |name: &str, width, height| {
        Some(Thumbnail::new(
            format!("https://i.ytimg.com/vi/{video_id}/{name}.jpg"),
            width,
            height,
        ))
    };
    ThumbnailSet {
        default: still("default", 120, 90),
        medium: still("mqdefault", 320, 180),
        high: still("hqdefault", 480, 360),
    }
}
