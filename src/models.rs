//! Canonical records returned by the scrape endpoint.
//!
//! Every struct here is a request-scoped value object: it is built from page
//! state, serialized into the HTTP response and then dropped. Field names are
//! the JSON keys callers depend on, so renaming a field is a breaking change.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A single image variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

impl Thumbnail {
    pub fn new(url: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            url: url.into(),
            width,
            height,
        }
    }
}

/// Three quality tiers, ordered so that `default.width <= medium.width <=
/// high.width` whenever all three are present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailSet {
    pub default: Option<Thumbnail>,
    pub medium: Option<Thumbnail>,
    pub high: Option<Thumbnail>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Banner {
    #[serde(rename = "bannerExternalUrl")]
    pub banner_external_url: String,
}

/// Channel-level metadata.
///
/// `channel_id` is the only field the caller treats as mandatory: a record
/// without it means the channel could not be resolved. Every count stays
/// `None` unless the stats reveal (or the about page) produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub channel_id: Option<String>,
    pub custom_url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// `YYYY-MM-DD HH:MM:SS`, taken from the "Joined <date>" row.
    pub published_at: Option<String>,
    pub thumbnails: ThumbnailSet,
    pub banner: Option<Banner>,
    /// Never exposed by the rendered page; kept for schema compatibility.
    pub default_language: Option<String>,
    pub country: Option<String>,
    pub subscriber_count: Option<u64>,
    pub video_count: Option<u64>,
    pub view_count: Option<u64>,
    /// Not observable from the channel page, so it is always `false`.
    pub made_for_kids: bool,
    pub keywords: Vec<String>,
}

/// Metadata for one entry of the channel's video list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub video_id: String,
    pub title: Option<String>,
    /// Derived from a relative "3 days ago" label, so it is only as precise as
    /// that label.
    pub published_at: Option<String>,
    /// ISO-8601 duration such as `PT5M36S`.
    pub duration: String,
    pub view_count: Option<u64>,
    pub thumbnails: ThumbnailSet,
    pub url: String,
}

/// One entry that could not be turned into a `VideoRecord`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedVideo {
    /// Position in the output sequence at the time the failure was recorded
    /// (`videos.len() + failures.len()`).
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub total_videos_found: usize,
    pub videos_processed: usize,
    pub videos_failed: usize,
    #[serde(serialize_with = "empty_as_null", deserialize_with = "null_as_empty", default)]
    pub failed_videos_details: Vec<FailedVideo>,
}

/// Successful outcome of one scrape request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub channel: ChannelRecord,
    pub videos: Vec<VideoRecord>,
    pub metadata: ReportMetadata,
}

impl ExtractionReport {
    pub fn new(
        channel: ChannelRecord,
        videos: Vec<VideoRecord>,
        failures: Vec<FailedVideo>,
        total_videos_found: usize,
    ) -> Self {
        let metadata = ReportMetadata {
            total_videos_found,
            videos_processed: videos.len(),
            videos_failed: failures.len(),
            failed_videos_details: failures,
        };
        Self {
            channel,
            videos,
            metadata,
        }
    }
}

// Callers historically receive `null` instead of `[]` when nothing failed.
fn empty_as_null<S: Serializer>(values: &[FailedVideo], serializer: S) -> Result<S::Ok, S::Error> {
    if values.is_empty() {
        serializer.serialize_none()
    } else {
        serializer.collect_seq(values)
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<FailedVideo>, D::Error> {
    Ok(Option::<Vec<FailedVideo>>::deserialize(deserializer)?.unwrap_or_default())
}
