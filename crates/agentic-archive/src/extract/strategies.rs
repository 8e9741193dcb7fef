//! Named extraction strategies, in the order they are consulted.
//!
//! Each strategy is a pure function from the parsed document to an optional
//! raw candidate. Validation of a candidate (domain allow-list, date parsing)
//! happens in the caller so a malformed candidate falls through to the next
//! strategy instead of ending the search.

use scraper::{Html, Selector};

/// One way of finding a field in a snapshot page.
#[derive(Clone, Copy)]
pub struct Strategy {
    pub name: &'static str,
    pub probe: fn(&Html) -> Option<String>,
}

impl std::fmt::Debug for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy").field("name", &self.name).finish()
    }
}

/// Where the archived page's own URL may be recorded.
pub const ORIGINAL_URL_STRATEGIES: &[Strategy] = &[
    Strategy {
        name: "og_url_meta",
        probe: |doc| attr_of(doc, r#"meta[property="og:url"]"#, "content"),
    },
    Strategy {
        name: "canonical_link",
        probe: |doc| attr_of(doc, r#"link[rel="canonical"]"#, "href"),
    },
    Strategy {
        name: "original_url_input",
        probe: |doc| attr_of(doc, "input#originalUrl", "value"),
    },
    Strategy {
        name: "original_url_meta",
        probe: |doc| attr_of(doc, r#"meta[name="original-url"]"#, "content"),
    },
];

/// Where the time the snapshot was taken may be recorded.
pub const SNAPSHOT_DATE_STRATEGIES: &[Strategy] = &[
    Strategy {
        name: "modified_time_meta",
        probe: |doc| attr_of(doc, r#"meta[property="article:modified_time"]"#, "content"),
    },
    Strategy {
        name: "archive_date_meta",
        probe: |doc| attr_of(doc, r#"meta[name="archive-date"]"#, "content"),
    },
    Strategy {
        name: "archive_date_element",
        probe: |doc| text_of(doc, ".archive-date"),
    },
];

/// Where the archived content's publication time may be recorded.
pub const CONTENT_DATE_STRATEGIES: &[Strategy] = &[
    Strategy {
        name: "time_element",
        probe: |doc| attr_of(doc, "time[datetime]", "datetime"),
    },
    Strategy {
        name: "data_time_attr",
        probe: |doc| attr_of(doc, "span[data-time]", "data-time"),
    },
    Strategy {
        name: "tweet_timestamp_title",
        probe: |doc| attr_of(doc, ".tweet-timestamp[title]", "title"),
    },
];

/// Run `strategies` in order and return the first candidate `accept` keeps.
pub fn first_match<T>(
    strategies: &[Strategy],
    doc: &Html,
    mut accept: impl FnMut(&str) -> Option<T>,
) -> Option<(&'static str, T)> {
    strategies.iter().find_map(|strategy| {
        let raw = (strategy.probe)(doc)?;
        accept(&raw).map(|value| (strategy.name, value))
    })
}

/// Trimmed value of `attr` on the first element matching `css`.
fn attr_of(doc: &Html, css: &str, attr: &str) -> Option<String> {
    let sel = Selector::parse(css).ok()?;
    let value = doc.select(&sel).next()?.value().attr(attr)?.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Trimmed text of the first element matching `css`.
fn text_of(doc: &Html, css: &str) -> Option<String> {
    let sel = Selector::parse(css).ok()?;
    let el = doc.select(&sel).next()?;
    let text = el.text().collect::<Vec<_>>().join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}
