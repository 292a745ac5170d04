//! Per-entity extractors: they read page state through a `PageSession` and
//! hand the raw values to the normalizer.

pub mod about;
pub mod channel;
pub mod scripts;
pub mod video;

pub use about::{AboutStats, extract_about, merge_about};
pub use channel::{ChannelExtraction, RevealIncomplete, RevealOutcome, extract_channel};
pub use video::{build_video_record, extract_video};
