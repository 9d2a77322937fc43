//! arXiv discovery client.
//!
//! Searches the arXiv Atom API and downloads paper PDFs. Parsing uses a
//! streaming pull-parser over the feed; only the fields the pipeline needs
//! (id, title, abstract, authors, dates, links, categories) are kept.

use tracing::info;

use crate::config::ArxivConfig;
use crate::error::{RagError, Result};
use crate::models::PaperMeta;

pub struct ArxivClient {
    base_url: String,
    max_results: usize,
    client: reqwest::Client,
}

impl ArxivClient {
    pub fn new(config: &ArxivConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::Ingestion(e.to_string()))?;
        Ok(Self {
            base_url: config.base_url.clone(),
            max_results: config.max_results,
            client,
        })
    }

    /// Search arXiv by relevance, returning at most `max` papers.
    pub async fn search(&self, query: &str, max: Option<usize>) -> Result<Vec<PaperMeta>> {
        let max = max.unwrap_or(self.max_results);
        info!(query, max, "searching arXiv");

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("search_query", format!("all:{}", query)),
                ("max_results", max.to_string()),
                ("sortBy", "relevance".to_string()),
            ])
            .send()
            .await
            .map_err(|e| RagError::Ingestion(format!("arXiv request failed: {}", e.without_url())))?;

        if !response.status().is_success() {
            return Err(RagError::Ingestion(format!(
                "arXiv API error {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RagError::Ingestion(format!("arXiv response read failed: {}", e)))?;

        parse_atom_feed(&body)
    }

    /// Fetch a paper by its arXiv id (e.g. `"1706.03762"`).
    pub async fn fetch_by_id(&self, id: &str) -> Result<Option<PaperMeta>> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("id_list", id.to_string()), ("max_results", "1".to_string())])
            .send()
            .await
            .map_err(|e| RagError::Ingestion(format!("arXiv request failed: {}", e.without_url())))?;

        let body = response
            .text()
            .await
            .map_err(|e| RagError::Ingestion(format!("arXiv response read failed: {}", e)))?;

        Ok(parse_atom_feed(&body)?.into_iter().next())
    }

    /// Download a paper PDF, enforcing the byte ceiling on the way in.
    pub async fn fetch_pdf(&self, url: &str, max_bytes: usize) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RagError::Ingestion(format!("PDF download failed: {}", e.without_url())))?;

        if !response.status().is_success() {
            return Err(RagError::Ingestion(format!(
                "PDF download error {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RagError::Ingestion(format!("PDF download failed: {}", e)))?;

        if bytes.len() > max_bytes {
            return Err(RagError::Extraction(format!(
                "document too large: {} bytes (max {})",
                bytes.len(),
                max_bytes
            )));
        }
        Ok(bytes.to_vec())
    }
}

/// Parse an arXiv Atom feed into paper metadata.
pub fn parse_atom_feed(xml: &str) -> Result<Vec<PaperMeta>> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut papers = Vec::new();
    let mut entry: Option<PaperMeta> = None;
    let mut path: Vec<String> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == "entry" {
                    entry = Some(empty_meta());
                }
                path.push(name);
            }
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"link" {
                    if let Some(meta) = entry.as_mut() {
                        apply_link(meta, &e)?;
                    }
                } else if e.local_name().as_ref() == b"category" {
                    if let Some(meta) = entry.as_mut() {
                        if let Some(term) = attr(&e, b"term")? {
                            meta.categories.push(term);
                        }
                    }
                }
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| RagError::Ingestion(format!("feed parse failed: {}", e)))?;
                if let Some(meta) = entry.as_mut() {
                    apply_text(meta, &path, text.trim());
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == "entry" {
                    if let Some(meta) = entry.take() {
                        if !meta.id.is_empty() {
                            papers.push(meta);
                        }
                    }
                }
                path.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(RagError::Ingestion(format!("feed parse failed: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    Ok(papers)
}

fn empty_meta() -> PaperMeta {
    PaperMeta {
        id: String::new(),
        title: String::new(),
        authors: Vec::new(),
        published: String::new(),
        url: String::new(),
        pdf_url: String::new(),
        summary: String::new(),
        categories: Vec::new(),
    }
}

fn apply_text(meta: &mut PaperMeta, path: &[String], text: &str) {
    if text.is_empty() {
        return;
    }
    // Paths are relative to the entry element.
    let in_entry = |tail: &[&str]| {
        path.len() >= tail.len()
            && path[path.len() - tail.len()..]
                .iter()
                .zip(tail)
                .all(|(a, b)| a == b)
            && path.contains(&"entry".to_string())
    };

    if in_entry(&["id"]) {
        // "http://arxiv.org/abs/1706.03762v7" => "1706.03762v7"
        meta.url = text.to_string();
        meta.id = text.rsplit("/abs/").next().unwrap_or(text).to_string();
    } else if in_entry(&["title"]) {
        append_joined(&mut meta.title, text);
    } else if in_entry(&["summary"]) {
        append_joined(&mut meta.summary, text);
    } else if in_entry(&["published"]) {
        // "2017-06-12T17:57:34Z" => "2017-06-12"
        meta.published = text.chars().take(10).collect();
    } else if in_entry(&["author", "name"]) {
        meta.authors.push(text.to_string());
    }
}

// Atom text nodes can be split across lines; rejoin with single spaces.
fn append_joined(field: &mut String, text: &str) {
    if !field.is_empty() {
        field.push(' ');
    }
    field.push_str(&text.split_whitespace().collect::<Vec<_>>().join(" "));
}

fn apply_link(meta: &mut PaperMeta, e: &quick_xml::events::BytesStart<'_>) -> Result<()> {
    let href = attr(e, b"href")?;
    let title = attr(e, b"title")?;
    let rel = attr(e, b"rel")?;

    if let Some(href) = href {
        if title.as_deref() == Some("pdf") {
            meta.pdf_url = href;
        } else if rel.as_deref() == Some("alternate") {
            meta.url = href;
        }
    }
    Ok(())
}

fn attr(e: &quick_xml::events::BytesStart<'_>, name: &[u8]) -> Result<Option<String>> {
    for a in e.attributes() {
        let a = a.map_err(|e| RagError::Ingestion(format!("feed parse failed: {}", e)))?;
        if a.key.as_ref() == name {
            let value = a
                .unescape_value()
                .map_err(|e| RagError::Ingestion(format!("feed parse failed: {}", e)))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}
