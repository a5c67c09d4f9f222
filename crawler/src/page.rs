use crate::CrawlError;
use lazy_static::lazy_static;
use reqwest::{header, Client, Url};
use scraper::{ElementRef, Html, Selector};

lazy_static! {
    static ref SEL_TITLE: Selector = Selector::parse("title").expect("valid selector");
    static ref SEL_BODY: Selector = Selector::parse("body").expect("valid selector");
    static ref SEL_A: Selector = Selector::parse("a[href]").expect("valid selector");
}

const HIDDEN: &[&str] = &["script", "style", "noscript", "template"];

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPage {
    pub title: String,
    pub text: String,
    pub links: Vec<Url>,
}

/// Canonical form used for dedup and as document id: fragment stripped.
pub fn canonical(u: &Url) -> String {
    let mut s = u.clone();
    s.set_fragment(None);
    s.to_string()
}

pub async fn fetch(client: &Client, url: &Url, max_bytes: usize) -> Result<String, CrawlError> {
    let resp = client.get(url.clone()).send().await.map_err(|e| CrawlError::fetch(url, e))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(CrawlError::fetch(url, format!("HTTP {status}")));
    }
    if let Some(ct) = resp.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        if !ct.starts_with("text/html") {
            return Err(CrawlError::parse(url, format!("unsupported content type {ct}")));
        }
    }
    if resp.content_length().is_some_and(|len| len as usize > max_bytes) {
        return Err(CrawlError::parse(url, "body exceeds size limit"));
    }
    let bytes = resp.bytes().await.map_err(|e| CrawlError::fetch(url, e))?;
    if bytes.len() > max_bytes {
        return Err(CrawlError::parse(url, "body exceeds size limit"));
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn visible_text(root: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else { continue };
        let hidden = node
            .ancestors()
            .any(|a| a.value().as_element().is_some_and(|e| HIDDEN.contains(&e.name())));
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract title, visible body text and absolute http(s) links.
pub fn parse_page(url: &Url, html: &str) -> Result<ParsedPage, CrawlError> {
    let doc = Html::parse_document(html);
    let title = doc
        .select(&SEL_TITLE)
        .next()
        .map(|n| n.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();
    let text = match doc.select(&SEL_BODY).next() {
        Some(body) => visible_text(body),
        None => visible_text(doc.root_element()),
    };
    if title.is_empty() && text.is_empty() {
        return Err(CrawlError::parse(url, "page has no text"));
    }

    let mut links = Vec::new();
    for a in doc.select(&SEL_A) {
        let Some(href) = a.value().attr("href") else { continue };
        if let Ok(mut u) = url.join(href.trim()) {
            if matches!(u.scheme(), "http" | "https") {
                u.set_fragment(None);
                links.push(u);
            }
        }
    }
    Ok(ParsedPage { title, text, links })
}
