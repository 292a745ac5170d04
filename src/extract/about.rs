//! Optional second pass over the channel's `/about` page. It only fills counts
//! and dates the stats reveal could not provide.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::browser::PageSession;
use crate::config::ExtractionSettings;
use crate::extract::scripts;
use crate::models::ChannelRecord;
use crate::normalize::{parse_joined_date, parse_magnitude};

static SUBSCRIBER_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([\d,.]+[KMB]?)\s+sub").expect("subscriber regex"));

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AboutStats {
    pub subscriber_count: Option<u64>,
    pub view_count: Option<u64>,
    pub country: Option<String>,
    pub published_at: Option<String>,
}

pub fn about_url(channel_handle: &str) -> String {
    format!("https://youtube.com/{channel_handle}/about")
}

/// Navigates to the about page and reads its stats. Every failure yields
/// `None`; the caller keeps whatever it already had.
pub async fn extract_about(
    session: &mut dyn PageSession,
    channel_handle: &str,
    settings: &ExtractionSettings,
) -> Option<AboutStats> {
    let url = about_url(channel_handle);
    if let Err(err) = session.navigate(&url).await {
        warn!(%url, error = %err, "could not open about page");
        return None;
    }
    if !session
        .wait_until_ready(settings.about_page_timeout, settings.poll_interval)
        .await
    {
        warn!(%url, timeout = ?settings.about_page_timeout, "about page did not finish loading");
        return None;
    }
    match session.run_script(scripts::INITIAL_DATA).await {
        Ok(data) if data.is_object() => Some(parse_about_data(&data)),
        Ok(_) => {
            warn!(%url, "no initial data on about page");
            None
        }
        Err(err) => {
            warn!(%url, error = %err, "error reading about page data");
            None
        }
    }
}

pub fn parse_about_data(initial_data: &Value) -> AboutStats {
    let mut stats = AboutStats::default();

    for (title, value) in metadata_rows(initial_data) {
        let title = title.to_lowercase();
        if title.contains("joined") {
            stats.published_at = parse_joined_date(value);
        } else if title.contains("views") {
            stats.view_count = parse_magnitude(value);
        } else if title.contains("location") {
            let country = value.trim();
            if !country.is_empty() {
                stats.country = Some(country.to_string());
            }
        }
    }

    stats.subscriber_count = initial_data
        .pointer("/header/c4TabbedHeaderRenderer/subscriberCountText/simpleText")
        .and_then(Value::as_str)
        .and_then(|text| SUBSCRIBER_LABEL.captures(text))
        .and_then(|captures| captures.get(1))
        .and_then(|count| parse_magnitude(count.as_str()));

    stats
}

/// `(title, value)` pairs of every metadata row under the about tab.
fn metadata_rows(initial_data: &Value) -> Vec<(&str, &str)> {
    let Some(tabs) = initial_data
        .pointer("/contents/twoColumnBrowseResultsRenderer/tabs")
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    let about_tab = tabs.iter().filter_map(|tab| tab.get("tabRenderer")).find(|tab| {
        tab.pointer("/endpoint/commandMetadata/webCommandMetadata/url")
            .and_then(Value::as_str)
            .is_some_and(|url| url.contains("about"))
    });
    let Some(about_tab) = about_tab else {
        debug!("no about tab in initial data");
        return Vec::new();
    };

    let items = about_tab
        .pointer("/content/sectionListRenderer/items")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    items
        .iter()
        .filter_map(|item| {
            item.pointer("/itemSectionRenderer/contents/0/metadataRowContainerRenderer/rows")
                .and_then(Value::as_array)
        })
        .flatten()
        .filter_map(|row| row.get("metadataRowRenderer"))
        .filter_map(|row| {
            let title = row.pointer("/title/simpleText").and_then(Value::as_str)?;
            let value = row
                .pointer("/contents/0/simpleText")
                .and_then(Value::as_str)
                .unwrap_or_default();
            Some((title, value))
        })
        .collect()
}

/// Copies about-page values into fields that are still empty.
pub fn merge_about(record: &mut ChannelRecord, about: AboutStats) {
    if record.subscriber_count.is_none() {
        record.subscriber_count = about.subscriber_count;
    }
    if record.view_count.is_none() {
        record.view_count = about.view_count;
    }
    if record.country.is_none() {
        record.country = about.country;
    }
    if record.published_at.is_none() {
        record.published_at = about.published_at;
    }
}
