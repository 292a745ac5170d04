//! JavaScript snippets evaluated inside the rendered page, plus the selectors
//! they share with the Rust side.
//!
//! Each script is a function body that `return`s plain JSON data. The heavy
//! lifting (parsing, classification, fallbacks) happens in Rust so it can be
//! tested without a browser.

use crate::browser::Selector;

/// Rendered entries of a channel's video grid.
pub const ENTRY_SELECTOR: &str = "ytd-rich-item-renderer, ytd-grid-video-renderer";

/// Region that appears once the channel's "more" affordance is activated.
pub const INFO_CONTAINER: Selector = Selector::Css("#additional-info-container");

pub const INITIAL_DATA: &str = "return window.ytInitialData || null;";

pub const USER_AGENT: &str = "return navigator.userAgent;";

pub const BANNER_SRC: &str = r#"
const img = document.querySelector('yt-image-banner-view-model img.yt-core-image');
return img && img.src ? img.src : null;
"#;

/// Reads the rows of the expanded info region by their icon names.
pub const REVEALED_STATS: &str = r#"
const section = document.querySelector('#additional-info-container');
if (!section) return null;
const textFor = (iconName) => {
    for (const row of section.querySelectorAll('tr')) {
        if (row.querySelector(`yt-icon[icon="${iconName}"]`)) {
            const cell = row.querySelector('td:last-child');
            return cell ? cell.textContent.trim() : null;
        }
    }
    return null;
};
return {
    subscribers: textFor('person_radar'),
    views: textFor('trending_up'),
    videos: textFor('my_videos'),
    join_date: textFor('info_outline'),
    country: textFor('privacy_public'),
};
"#;

/// Collects the raw pieces of one video entry. `el` is the entry element.
pub const VIDEO_ENTRY: &str = r#"
const link = el.querySelector('a#video-title-link, a#thumbnail');
const titleElem = el.querySelector('#video-title, #title');
const metadataLine = el.querySelector('#metadata-line');
const spans = metadataLine
    ? Array.from(metadataLine.querySelectorAll('span.inline-metadata-item, span.style-scope.ytd-video-meta-block'))
    : [];
const durationElem = el.querySelector('span#text.ytd-thumbnail-overlay-time-status-renderer, badge-shape .badge-shape-wiz__text');
return {
    href: link && link.href ? link.href : null,
    title: titleElem && titleElem.textContent ? titleElem.textContent.trim() : null,
    metadata: spans.map((span) => span.textContent.trim()),
    duration: durationElem && durationElem.textContent ? durationElem.textContent.trim() : null,
};
"#;
