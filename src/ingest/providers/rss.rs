// src/ingest/providers/rss.rs
//! HTTP feed fetcher for RSS 2.0, RSS 1.0 (RDF) and Atom documents.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use encoding_rs::{Encoding, UTF_8};
use metrics::histogram;
use once_cell::sync::Lazy;
use quick_xml::de::from_str;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::bytes::Regex;
use serde::Deserialize;
use std::borrow::Cow;
use std::time::Duration;

use crate::ingest::types::{FeedEntry, FeedFetcher};

pub const DEFAULT_USER_AGENT: &str =
    "news-dataset-pipeline/0.1 (+https://huggingface.co/datasets)";

// ---- RSS 2.0 ----

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

// ---- RSS 1.0 (RDF): items are siblings of the channel ----

#[derive(Debug, Deserialize)]
struct Rdf {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

// ---- Atom ----

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entry: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<AtomText>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    summary: Option<AtomText>,
    published: Option<String>,
    updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomText {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href", default)]
    href: Option<String>,
    #[serde(rename = "@rel", default)]
    rel: Option<String>,
}

impl AtomEntry {
    /// `rel="alternate"` (or no rel) wins over other link relations.
    fn canonical_link(&self) -> Option<String> {
        let alternate = self
            .links
            .iter()
            .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")));
        alternate
            .or_else(|| self.links.first())
            .and_then(|l| l.href.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedKind {
    Rss,
    Rdf,
    Atom,
}

fn detect_kind(xml: &str) -> Option<FeedKind> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return match e.local_name().as_ref() {
                    b"rss" => Some(FeedKind::Rss),
                    b"RDF" => Some(FeedKind::Rdf),
                    b"feed" => Some(FeedKind::Atom),
                    _ => None,
                };
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

/// Parse a feed document into entries, keeping document order.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedEntry>> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);

    let entries = match detect_kind(&xml_clean) {
        Some(FeedKind::Rss) => {
            let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;
            rss.channel.item.into_iter().map(item_to_entry).collect()
        }
        Some(FeedKind::Rdf) => {
            let rdf: Rdf = from_str(&xml_clean).context("parsing rdf xml")?;
            rdf.item.into_iter().map(item_to_entry).collect()
        }
        Some(FeedKind::Atom) => {
            let feed: AtomFeed = from_str(&xml_clean).context("parsing atom xml")?;
            feed.entry
                .into_iter()
                .map(|e| FeedEntry {
                    link: clean_opt(e.canonical_link()),
                    title: clean_opt(e.title.map(|t| t.value)),
                    summary: clean_opt(e.summary.map(|t| t.value)),
                    published: clean_opt(e.published.or(e.updated)),
                })
                .collect()
        }
        None => return Err(anyhow!("not an rss/atom document")),
    };

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("ingest_parse_ms").record(ms);
    Ok(entries)
}

fn item_to_entry(it: Item) -> FeedEntry {
    FeedEntry {
        title: clean_opt(it.title),
        link: clean_opt(it.link),
        summary: clean_opt(it.description),
        published: clean_opt(it.pub_date),
    }
}

fn clean_opt(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Feed bodies routinely carry HTML-only entities that XML rejects.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
        .replace("&copy;", "(c)")
}

static RE_XML_ENCODING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(?-u:\xEF\xBB\xBF)?\s*<\?xml[^>]*?encoding\s*=\s*["']([A-Za-z0-9._:-]+)["']"#).unwrap()
});

/// Decode a raw feed body. A byte-order mark wins, then the XML declaration's
/// `encoding`, then UTF-8. Unmappable bytes become U+FFFD.
pub fn decode_feed_bytes(bytes: &[u8]) -> Cow<'_, str> {
    let head = &bytes[..bytes.len().min(512)];
    let declared = RE_XML_ENCODING
        .captures(head)
        .and_then(|c| c.get(1))
        .and_then(|m| Encoding::for_label(m.as_bytes()))
        .unwrap_or(UTF_8);
    let (text, used, had_errors) = declared.decode(bytes);
    if had_errors {
        tracing::debug!(target: "ingest", encoding = used.name(), "feed body had undecodable bytes");
    }
    text
}

/// Fetches feeds over HTTP and parses them with [`parse_feed`].
pub struct HttpFeedFetcher {
    client: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(5).min(timeout))
            .timeout(timeout)
            .build()
            .context("building feed http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<FeedEntry>> {
        let resp = self
            .client
            .get(url)
            .header(
                reqwest::header::ACCEPT,
                "application/rss+xml, application/atom+xml, application/xml;q=0.9, */*;q=0.8",
            )
            .send()
            .await
            .context("feed http get()")?
            .error_for_status()
            .context("feed http status")?;
        let bytes = resp.bytes().await.context("feed http body")?;
        parse_feed(&decode_feed_bytes(&bytes))
    }
}
