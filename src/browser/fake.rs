//! Scripted in-memory page used by the tests. It answers the known scripts
//! and selectors from fixture data instead of running JavaScript.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{BrowserError, ElementHandle, PageSession, READY_SCRIPT, Selector, SessionProvider};
use crate::extract::scripts;

const REVEAL_HANDLE: usize = usize::MAX - 1;
const CONTAINER_HANDLE: usize = usize::MAX - 2;

#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub url: String,
    pub ready: bool,
    pub fail_navigation: bool,
    pub initial_data: Option<Value>,
    pub about_ready: bool,
    pub about_initial_data: Option<Value>,
    /// Selector text of the reveal strategy that matches, if any.
    pub reveal_selector: Option<&'static str>,
    /// Whether the info region shows up after the reveal click.
    pub expands: bool,
    pub stats: Value,
    pub banner: Value,
    /// Raw `VIDEO_ENTRY` results, in DOM order.
    pub entries: Vec<Value>,
    pub visible_initially: usize,
    pub per_scroll: usize,
    pub failing_entries: Vec<usize>,
    /// Script names from the log vocabulary (`"initial_data"`, ...) that fail.
    pub failing_scripts: Vec<&'static str>,
    pub log: Vec<String>,
    scrolls: usize,
    clicked: bool,
}

impl FakePage {
    /// A ready channel page with a resolvable id and `count` entries that are
    /// all visible without scrolling.
    pub fn channel_with_entries(count: usize) -> Self {
        Self {
            ready: true,
            about_ready: true,
            initial_data: Some(sample_initial_data()),
            entries: (0..count).map(|i| sample_entry(&format!("vid{i:08}"))).collect(),
            visible_initially: count,
            ..Self::default()
        }
    }

    pub fn scroll_count(&self) -> usize {
        self.scrolls
    }

    pub fn ran(&self, entry: &str) -> bool {
        self.log.iter().any(|line| line == entry)
    }

    pub fn times(&self, entry: &str) -> usize {
        self.log.iter().filter(|line| *line == entry).count()
    }

    fn visible(&self) -> usize {
        let target = self.visible_initially + self.per_scroll * self.scrolls;
        target.min(self.entries.len())
    }

    fn matches(&self, selector: &Selector) -> Vec<ElementHandle> {
        if *selector == Selector::Css(scripts::ENTRY_SELECTOR) {
            return (0..self.visible()).map(ElementHandle::new).collect();
        }
        if *selector == scripts::INFO_CONTAINER {
            let shown = self.clicked && self.expands;
            return if shown {
                vec![ElementHandle::new(CONTAINER_HANDLE)]
            } else {
                Vec::new()
            };
        }
        if self.reveal_selector == Some(selector.as_str()) {
            return vec![ElementHandle::new(REVEAL_HANDLE)];
        }
        Vec::new()
    }

    fn on_about_page(&self) -> bool {
        self.url.ends_with("/about")
    }

    fn script_name(script: &str) -> Option<&'static str> {
        [
            (READY_SCRIPT, "ready"),
            (scripts::INITIAL_DATA, "initial_data"),
            (scripts::BANNER_SRC, "banner"),
            (scripts::REVEALED_STATS, "stats"),
            (scripts::USER_AGENT, "user_agent"),
        ]
        .into_iter()
        .find(|(known, _)| *known == script)
        .map(|(_, name)| name)
    }
}

#[async_trait]
impl PageSession for FakePage {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.log.push(format!("navigate:{url}"));
        if self.fail_navigation {
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_NAME_NOT_RESOLVED".into(),
            });
        }
        self.url = url.to_string();
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, BrowserError> {
        Ok(self.url.clone())
    }

    async fn run_script(&mut self, script: &str) -> Result<Value, BrowserError> {
        let name = Self::script_name(script)
            .ok_or_else(|| BrowserError::Script("unexpected script".into()))?;
        self.log.push(format!("script:{name}"));
        if self.failing_scripts.contains(&name) {
            return Err(BrowserError::Script(format!("{name} threw")));
        }
        let value = match name {
            "ready" if self.on_about_page() => Value::Bool(self.about_ready),
            "ready" => Value::Bool(self.ready),
            "initial_data" if self.on_about_page() => {
                self.about_initial_data.clone().unwrap_or(Value::Null)
            }
            "initial_data" => self.initial_data.clone().unwrap_or(Value::Null),
            "banner" => self.banner.clone(),
            "stats" if self.clicked && self.expands => self.stats.clone(),
            "stats" => Value::Null,
            "user_agent" => json!("FakeBrowser/1.0"),
            _ => Value::Null,
        };
        Ok(value)
    }

    async fn run_script_on(
        &mut self,
        element: ElementHandle,
        script: &str,
    ) -> Result<Value, BrowserError> {
        if script != scripts::VIDEO_ENTRY {
            return Err(BrowserError::Script("unexpected element script".into()));
        }
        let index = element.index();
        self.log.push(format!("entry:{index}"));
        if self.failing_entries.contains(&index) {
            return Err(BrowserError::Script(format!("node {index} detached")));
        }
        self.entries
            .get(index)
            .cloned()
            .ok_or_else(|| BrowserError::Element(format!("no entry {index}")))
    }

    async fn find(&mut self, selector: &Selector) -> Result<Vec<ElementHandle>, BrowserError> {
        self.log.push(format!("find:{}", selector.as_str()));
        Ok(self.matches(selector))
    }

    async fn count(&mut self, selector: &Selector) -> Result<usize, BrowserError> {
        self.log.push(format!("count:{}", selector.as_str()));
        Ok(self.matches(selector).len())
    }

    async fn click(&mut self, element: ElementHandle) -> Result<(), BrowserError> {
        if element.index() != REVEAL_HANDLE {
            return Err(BrowserError::Element("not clickable".into()));
        }
        self.log.push("click:reveal".into());
        self.clicked = true;
        Ok(())
    }

    async fn scroll_to_bottom(&mut self) -> Result<(), BrowserError> {
        self.log.push("scroll".into());
        self.scrolls += 1;
        Ok(())
    }
}

/// Provider that hands out clones of one fixture page.
pub struct FakeProvider {
    pub page: FakePage,
    pub unavailable: bool,
}

#[async_trait]
impl SessionProvider for FakeProvider {
    async fn acquire(&self) -> Result<Box<dyn PageSession>, BrowserError> {
        if self.unavailable {
            return Err(BrowserError::Launch("no browser binary".into()));
        }
        Ok(Box::new(self.page.clone()))
    }
}

pub fn sample_initial_data() -> Value {
    json!({
        "metadata": {
            "channelMetadataRenderer": {
                "externalId": "UCfixture0000000000000001",
                "title": "  Fixture Channel  ",
                "description": "Videos about fixtures.",
                "vanityChannelUrl": "http://www.youtube.com/@FixtureChannel",
                "keywords": "rust, scraping, ,testing ",
                "avatar": {
                    "thumbnails": [
                        {"url": "https://yt3.example/avatar=s900", "width": 900, "height": 900},
                        {"url": "https://yt3.example/avatar=s88", "width": 88, "height": 88},
                        {"url": "https://yt3.example/avatar=s176", "width": 176, "height": 176}
                    ]
                }
            }
        }
    })
}

pub fn sample_entry(video_id: &str) -> Value {
    json!({
        "href": format!("https://www.youtube.com/watch?v={video_id}&pp=sAQA"),
        "title": format!("Episode {video_id}"),
        "metadata": ["12K views", "3 days ago"],
        "duration": "12:34",
    })
}

pub fn sample_about_data() -> Value {
    json!({
        "contents": {"twoColumnBrowseResultsRenderer": {"tabs": [
            {"tabRenderer": {"endpoint": {"commandMetadata": {"webCommandMetadata": {"url": "/@Fixture/videos"}}}}},
            {"tabRenderer": {
                "endpoint": {"commandMetadata": {"webCommandMetadata": {"url": "/@Fixture/about"}}},
                "content": {"sectionListRenderer": {"items": [
                    {"itemSectionRenderer": {"contents": [{"metadataRowContainerRenderer": {"rows": [
                        {"metadataRowRenderer": {"title": {"simpleText": "Joined"}, "contents": [{"simpleText": "Joined Mar 5, 2015"}]}},
                        {"metadataRowRenderer": {"title": {"simpleText": "Total views"}, "contents": [{"simpleText": "1,234,567 views"}]}},
                        {"metadataRowRenderer": {"title": {"simpleText": "Location"}, "contents": [{"simpleText": "Canada"}]}}
                    ]}}]}}
                ]}}
            }}
        ]}},
        "header": {"c4TabbedHeaderRenderer": {"subscriberCountText": {"simpleText": "3.14M subscribers"}}}
    })
}
