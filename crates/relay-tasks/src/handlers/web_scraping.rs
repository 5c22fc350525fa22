//! `web_scraping` tasks: fetch a page and pull out its readable content.

use std::time::Duration;

use async_trait::async_trait;
use relay_core::Task;
use relay_core::time::timestamp;
use scraper::{Html, Selector};
use serde_json::{Map, Value, json};
use tracing::debug;

use super::required_str;
use crate::errors::HandlerError;
use crate::handler::TaskHandler;

/// Pages larger than this are truncated before parsing.
const MAX_HTML_BYTES: usize = 2 * 1024 * 1024;

/// Column width for html2text rendering.
const TEXT_WIDTH: usize = 100;

/// Fetches pages over HTTP and extracts title, description, and text.
pub struct WebScrapingHandler {
    client: reqwest::Client,
}

impl WebScrapingHandler {
    /// Handler with a default HTTP client.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .user_agent("relay/0.1")
                .build()
                .unwrap_or_default(),
        }
    }

    async fn fetch(&self, url: &str) -> Result<String, HandlerError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| HandlerError::Collaborator(format!("Web scraping failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(HandlerError::Collaborator(format!(
                "Web scraping failed: {url} returned {status}"
            )));
        }
        response
            .text()
            .await
            .map_err(|e| HandlerError::Collaborator(format!("Web scraping failed: {e}")))
    }
}

impl Default for WebScrapingHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// What was extracted from one page.
#[derive(Debug, PartialEq)]
struct PageExtract {
    title: String,
    description: Option<String>,
    text: String,
    selections: Map<String, Value>,
}

fn parse_selectors(input: &Value) -> Result<Vec<(String, Selector)>, HandlerError> {
    let Some(raw) = input.get("selectors") else {
        return Ok(Vec::new());
    };
    let list = raw
        .as_array()
        .ok_or_else(|| HandlerError::invalid("'selectors' must be an array of strings"))?;
    list.iter()
        .map(|v| {
            let css = v
                .as_str()
                .ok_or_else(|| HandlerError::invalid("'selectors' must be an array of strings"))?;
            let selector = Selector::parse(css)
                .map_err(|e| HandlerError::invalid(format!("bad selector '{css}': {e}")))?;
            Ok((css.to_owned(), selector))
        })
        .collect()
}

/// `Html` is not `Send`, so all parsing stays in this synchronous function.
fn extract(html: &str, selectors: &[(String, Selector)]) -> PageExtract {
    let html = truncate(html, MAX_HTML_BYTES);
    let document = Html::parse_document(html);

    let mut selections = Map::new();
    for (css, selector) in selectors {
        let texts: Vec<Value> = document
            .select(selector)
            .map(|el| Value::String(collapse_ws(&el.text().collect::<String>())))
            .collect();
        let _ = selections.insert(css.clone(), Value::Array(texts));
    }

    let text = html2text::from_read(html.as_bytes(), TEXT_WIDTH).unwrap_or_default();

    PageExtract {
        title: extract_title(&document),
        description: extract_description(&document),
        text: clean_text(&text),
        selections,
    }
}

fn first_text(doc: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    let el = doc.select(&selector).next()?;
    let text = collapse_ws(&el.text().collect::<String>());
    (!text.is_empty()).then_some(text)
}

fn first_attr(doc: &Html, css: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    let el = doc.select(&selector).next()?;
    let text = el.value().attr(attr)?.trim().to_owned();
    (!text.is_empty()).then_some(text)
}

fn extract_title(doc: &Html) -> String {
    // <title> → og:title → <h1>
    first_text(doc, "title")
        .or_else(|| first_attr(doc, r#"meta[property="og:title"]"#, "content"))
        .or_else(|| first_text(doc, "h1"))
        .unwrap_or_default()
}

fn extract_description(doc: &Html) -> Option<String> {
    first_attr(doc, r#"meta[name="description"]"#, "content")
        .or_else(|| first_attr(doc, r#"meta[property="og:description"]"#, "content"))
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collapse runs of 3+ blank lines to 2.
fn clean_text(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut blank = 0;
    for line in text.lines() {
        if line.trim().is_empty() {
            blank += 1;
            if blank <= 2 {
                result.push('\n');
            }
        } else {
            blank = 0;
            result.push_str(line);
            result.push('\n');
        }
    }
    result.trim().to_owned()
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[async_trait]
impl TaskHandler for WebScrapingHandler {
    async fn handle(&self, task: &Task) -> Result<Value, HandlerError> {
        let url = required_str(&task.input, "url")?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(HandlerError::invalid(format!("unsupported url: {url}")));
        }
        let selectors = parse_selectors(&task.input)?;

        let html = self.fetch(url).await?;
        debug!(url, bytes = html.len(), "fetched page");
        let page = extract(&html, &selectors);

        Ok(json!({
            "url": url,
            "title": page.title,
            "description": page.description,
            "text": page.text,
            "selections": page.selections,
            "timestamp": timestamp(),
        }))
    }
}
