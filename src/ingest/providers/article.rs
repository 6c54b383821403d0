// src/ingest/providers/article.rs
//! Best-effort full-text extraction: fetch the page, keep paragraph text.

use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::time::Duration;

use crate::ingest::types::ArticleExtractor;

static ARTICLE_PARAGRAPHS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("article p").expect("static selector"));
static ALL_PARAGRAPHS: Lazy<Selector> = Lazy::new(|| Selector::parse("p").expect("static selector"));

/// Paragraphs shorter than this are usually bylines, captions or cookie banners.
const MIN_PARAGRAPH_CHARS: usize = 40;

/// Pull readable paragraph text out of an HTML page. Paragraphs inside
/// `<article>` win; pages without any fall back to every `<p>`.
pub fn extract_text_from_html(html: &str) -> String {
    let document = Html::parse_document(html);

    let mut paragraphs = collect_paragraphs(&document, &ARTICLE_PARAGRAPHS);
    if paragraphs.is_empty() {
        paragraphs = collect_paragraphs(&document, &ALL_PARAGRAPHS);
    }
    paragraphs.join("\n\n")
}

fn collect_paragraphs(document: &Html, selector: &Selector) -> Vec<String> {
    document
        .select(selector)
        .map(|el| crate::ingest::clean_text(&el.text().collect::<String>()))
        .filter(|p| p.chars().count() >= MIN_PARAGRAPH_CHARS)
        .collect()
}

pub struct HttpArticleExtractor {
    client: reqwest::Client,
}

impl HttpArticleExtractor {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .context("building article http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ArticleExtractor for HttpArticleExtractor {
    async fn extract(&self, url: &str) -> Result<String> {
        let html = self
            .client
            .get(url)
            .send()
            .await
            .context("article http get()")?
            .error_for_status()
            .context("article http status")?
            .text()
            .await
            .context("article http .text()")?;
        Ok(extract_text_from_html(&html))
    }
}
