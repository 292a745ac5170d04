use std::time::Duration;

use thiserror::Error;

use crate::browser::BrowserError;

/// Outcomes that end an extraction without a report.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("channel page {url} did not load within {}s", timeout.as_secs())]
    UpstreamLoadTimeout { url: String, timeout: Duration },
    #[error("channel {channel_handle} not found")]
    ChannelNotFound { channel_handle: String },
    #[error("no videos found for channel {channel_handle}")]
    NoVideosFound {
        channel_handle: String,
        channel_id: String,
    },
    #[error("browser session unavailable: {0}")]
    SessionUnavailable(#[source] BrowserError),
}
