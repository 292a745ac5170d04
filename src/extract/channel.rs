//! Channel-level extraction: the embedded initial-state blob provides identity,
//! text and avatar; the optional stats reveal provides the counts.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::browser::{BrowserError, ElementHandle, PageSession, Selector, wait_for_element};
use crate::config::ExtractionSettings;
use crate::extract::scripts;
use crate::models::{Banner, ChannelRecord, Thumbnail, ThumbnailSet};
use crate::normalize::{parse_joined_date, parse_magnitude};

/// One way of locating the "more" affordance that expands the channel info.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealStrategy {
    pub name: &'static str,
    pub selector: Selector,
}

/// Tried in order; the first strategy that finds an element wins.
pub const REVEAL_STRATEGIES: &[RevealStrategy] = &[
    RevealStrategy {
        name: "truncated-text button",
        selector: Selector::XPath(
            "//button[contains(@class, 'truncated-text-wiz__absolute-button') or contains(@class, 'truncated-text-wiz__inline-button')]",
        ),
    },
    RevealStrategy {
        name: "description preview",
        selector: Selector::Css("yt-description-preview-view-model button"),
    },
    RevealStrategy {
        name: "tagline more link",
        selector: Selector::Css("ytd-channel-tagline-renderer #more, #channel-tagline #more"),
    },
];

/// Labelled rows read from the expanded info region.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RevealedStats {
    pub subscribers: Option<String>,
    pub views: Option<String>,
    pub videos: Option<String>,
    pub join_date: Option<String>,
    pub country: Option<String>,
}

impl RevealedStats {
    fn is_empty(&self) -> bool {
        [
            &self.subscribers,
            &self.views,
            &self.videos,
            &self.join_date,
            &self.country,
        ]
        .iter()
        .all(|field| field.as_deref().is_none_or(|text| text.trim().is_empty()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealIncomplete {
    /// The channel page itself could not be read, so no reveal was tried.
    NotAttempted,
    AffordanceNotFound,
    ExpansionTimeout,
    FieldsMissing,
    Browser(String),
}

/// Result of the best-effort stats reveal. `Incomplete` never fails the
/// channel record; it only leaves the counts empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealOutcome {
    Revealed(RevealedStats),
    Incomplete(RevealIncomplete),
}

impl RevealOutcome {
    pub fn is_revealed(&self) -> bool {
        matches!(self, RevealOutcome::Revealed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelExtraction {
    pub record: ChannelRecord,
    pub reveal: RevealOutcome,
}

impl ChannelExtraction {
    fn degraded(reason: RevealIncomplete) -> Self {
        Self {
            record: ChannelRecord::default(),
            reveal: RevealOutcome::Incomplete(reason),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawThumbnail {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

impl RawThumbnail {
    fn usable_url(&self) -> Option<&str> {
        self.url.as_deref().filter(|url| !url.is_empty())
    }
}

/// Extracts the channel record from the currently loaded channel page.
///
/// Never fails: any browser error yields the default record, whose missing
/// `channel_id` the caller interprets as "channel not found".
pub async fn extract_channel(
    session: &mut dyn PageSession,
    settings: &ExtractionSettings,
) -> ChannelExtraction {
    match try_extract_channel(session, settings).await {
        Ok(extraction) => extraction,
        Err(err) => {
            error!(error = %err, "error extracting channel metadata");
            ChannelExtraction::degraded(RevealIncomplete::Browser(err.to_string()))
        }
    }
}

async fn try_extract_channel(
    session: &mut dyn PageSession,
    settings: &ExtractionSettings,
) -> Result<ChannelExtraction, BrowserError> {
    let initial_data = session.run_script(scripts::INITIAL_DATA).await?;
    if !initial_data.is_object() {
        warn!("page has no initial data blob");
        return Ok(ChannelExtraction::degraded(RevealIncomplete::NotAttempted));
    }
    let current_url = session.current_url().await?;

    let mut record = parse_channel_state(&initial_data, &current_url);

    let reveal = reveal_stats(session, settings).await;
    match &reveal {
        RevealOutcome::Revealed(stats) => {
            debug!(?stats, "stats reveal succeeded");
            apply_revealed_stats(&mut record, stats);
        }
        RevealOutcome::Incomplete(reason) => {
            info!(?reason, "stats reveal incomplete, counts left empty");
        }
    }

    record.banner = find_banner(session, &initial_data).await;

    Ok(ChannelExtraction { record, reveal })
}

/// Builds everything the initial-state blob can tell us about the channel.
pub fn parse_channel_state(initial_data: &Value, current_url: &str) -> ChannelRecord {
    let empty = Map::new();
    let header = resolve_header(initial_data).unwrap_or(&empty);

    let channel_id = string_field(header, "externalId")
        .or_else(|| string_field(header, "channelId"))
        .or_else(|| {
            initial_data
                .pointer("/header/c4TabbedHeaderRenderer/channelId")
                .and_then(Value::as_str)
                .filter(|value| !value.is_empty())
        })
        .map(str::to_string);

    let custom_url = string_field(header, "vanityChannelUrl")
        .and_then(handle_from_vanity_url)
        .or_else(|| handle_from_page_url(current_url));

    let keywords = string_field(header, "keywords")
        .map(split_keywords)
        .unwrap_or_default();

    let candidates: Vec<RawThumbnail> = header
        .get("avatar")
        .and_then(|avatar| avatar.get("thumbnails"))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default();

    ChannelRecord {
        channel_id,
        custom_url,
        title: header
            .get("title")
            .and_then(Value::as_str)
            .map(|title| title.trim().to_string()),
        description: header
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
        thumbnails: select_thumbnails(&candidates),
        keywords,
        ..ChannelRecord::default()
    }
}

/// The channel metadata renderer wins; the microformat renderer is the
/// fallback. Empty objects count as absent.
fn resolve_header(initial_data: &Value) -> Option<&Map<String, Value>> {
    ["/metadata/channelMetadataRenderer", "/microformat/microformatDataRenderer"]
        .into_iter()
        .filter_map(|pointer| initial_data.pointer(pointer).and_then(Value::as_object))
        .find(|header| !header.is_empty())
}

fn string_field<'a>(header: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    header
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}

/// `"http://www.youtube.com/@MyChannel"` becomes `"@MyChannel"`.
fn handle_from_vanity_url(vanity: &str) -> Option<String> {
    let (_, handle) = vanity.rsplit_once('@')?;
    let handle = handle.trim_end_matches('/');
    (!handle.is_empty()).then(|| format!("@{handle}"))
}

/// Uses the last-but-one path segment, e.g. `.../@MyChannel/videos`.
fn handle_from_page_url(current_url: &str) -> Option<String> {
    let without_query = current_url
        .split(['?', '#'])
        .next()
        .unwrap_or(current_url);
    let segments: Vec<&str> = without_query.split('/').collect();
    if segments.len() < 2 {
        return None;
    }
    let segment = segments[segments.len() - 2].trim_start_matches('@');
    (!segment.is_empty()).then(|| format!("@{segment}"))
}

fn split_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|keyword| !keyword.is_empty())
        .map(str::to_string)
        .collect()
}

/// Sorts candidates by width and picks smallest, second-smallest and largest.
/// Missing dimensions inherit the previous tier's values.
fn select_thumbnails(candidates: &[RawThumbnail]) -> ThumbnailSet {
    let mut sorted: Vec<&RawThumbnail> = candidates.iter().collect();
    sorted.sort_by_key(|candidate| candidate.width.unwrap_or(0));

    let Some(fallback_url) = sorted.iter().find_map(|candidate| candidate.usable_url()) else {
        return ThumbnailSet::default();
    };
    let (Some(first), Some(last)) = (sorted.first(), sorted.last()) else {
        return ThumbnailSet::default();
    };
    let middle = sorted[(sorted.len() - 1).min(1)];

    let default = Thumbnail::new(
        first.usable_url().unwrap_or(fallback_url).to_string(),
        first.width.unwrap_or(0),
        first.height.unwrap_or(0),
    );
    let medium = inherit_tier(middle, &default);
    let high = inherit_tier(last, &medium);

    ThumbnailSet {
        default: Some(default),
        medium: Some(medium),
        high: Some(high),
    }
}

fn inherit_tier(candidate: &RawThumbnail, previous: &Thumbnail) -> Thumbnail {
    Thumbnail {
        url: candidate
            .usable_url()
            .map_or_else(|| previous.url.clone(), str::to_string),
        width: candidate.width.unwrap_or(previous.width),
        height: candidate.height.unwrap_or(previous.height),
    }
}

/// Tries every reveal strategy, expands the info region and reads its rows.
pub async fn reveal_stats(
    session: &mut dyn PageSession,
    settings: &ExtractionSettings,
) -> RevealOutcome {
    let Some((strategy, button)) = find_reveal_affordance(session).await else {
        return RevealOutcome::Incomplete(RevealIncomplete::AffordanceNotFound);
    };
    debug!(strategy = strategy.name, "activating stats reveal");

    if let Err(err) = session.click(button).await {
        return RevealOutcome::Incomplete(RevealIncomplete::Browser(err.to_string()));
    }

    let expanded = wait_for_element(
        session,
        &scripts::INFO_CONTAINER,
        settings.reveal_wait,
        settings.poll_interval,
    )
    .await;
    if !expanded {
        return RevealOutcome::Incomplete(RevealIncomplete::ExpansionTimeout);
    }

    let value = match session.run_script(scripts::REVEALED_STATS).await {
        Ok(value) => value,
        Err(err) => return RevealOutcome::Incomplete(RevealIncomplete::Browser(err.to_string())),
    };
    if value.is_null() {
        return RevealOutcome::Incomplete(RevealIncomplete::FieldsMissing);
    }
    match serde_json::from_value::<RevealedStats>(value) {
        Ok(stats) if !stats.is_empty() => RevealOutcome::Revealed(stats),
        Ok(_) => RevealOutcome::Incomplete(RevealIncomplete::FieldsMissing),
        Err(err) => RevealOutcome::Incomplete(RevealIncomplete::Browser(err.to_string())),
    }
}

/// First strategy with a match wins. Lookup errors just move on to the next
/// strategy.
pub async fn find_reveal_affordance(
    session: &mut dyn PageSession,
) -> Option<(&'static RevealStrategy, ElementHandle)> {
    for strategy in REVEAL_STRATEGIES {
        match session.find(&strategy.selector).await {
            Ok(found) => {
                if let Some(first) = found.into_iter().next() {
                    return Some((strategy, first));
                }
            }
            Err(err) => debug!(strategy = strategy.name, error = %err, "reveal lookup failed"),
        }
    }
    None
}

pub fn apply_revealed_stats(record: &mut ChannelRecord, stats: &RevealedStats) {
    record.subscriber_count = stats.subscribers.as_deref().and_then(parse_magnitude);
    record.view_count = stats.views.as_deref().and_then(parse_magnitude);
    record.video_count = stats.videos.as_deref().and_then(parse_magnitude);
    record.published_at = stats.join_date.as_deref().and_then(parse_joined_date);
    record.country = stats
        .country
        .as_deref()
        .map(str::trim)
        .filter(|country| !country.is_empty())
        .map(str::to_string);
}

/// DOM banner first, then the widest banner in the legacy header.
async fn find_banner(session: &mut dyn PageSession, initial_data: &Value) -> Option<Banner> {
    let from_dom = match session.run_script(scripts::BANNER_SRC).await {
        Ok(Value::String(src)) if !src.is_empty() => Some(src),
        Ok(_) => None,
        Err(err) => {
            debug!(error = %err, "banner lookup failed");
            None
        }
    };
    from_dom
        .or_else(|| banner_from_initial_data(initial_data))
        .map(|url| Banner {
            banner_external_url: clean_banner_url(&url),
        })
}

fn banner_from_initial_data(initial_data: &Value) -> Option<String> {
    initial_data
        .pointer("/header/c4TabbedHeaderRenderer/banner/thumbnails")?
        .as_array()?
        .iter()
        .filter(|thumb| thumb.get("url").and_then(Value::as_str).is_some_and(|url| !url.is_empty()))
        .max_by_key(|thumb| thumb.get("width").and_then(Value::as_u64).unwrap_or(0))
        .and_then(|thumb| thumb.get("url"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Drops the size modifiers appended after the first `=`.
pub fn clean_banner_url(url: &str) -> String {
    url.split('=').next().unwrap_or(url).to_string()
}
