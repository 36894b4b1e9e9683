use crate::chunker::{Chunker, Segment, SentenceSplitter};
use crate::error::{PipelineError, Result};
use crate::llm::LlmProvider;
use crate::records::ContentBlock;
use crate::results::{Image, Snapshot};
use crate::retry::RetryPolicy;
use crate::search::SearchHit;
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, LazyLock};

/// Images appended after the text blocks
const MAX_IMAGES: usize = 3;

const SUMMARY_SYSTEM_PROMPT: &str = "You write concise, factual introductions to tourist attractions. \
Focus on the attraction's history and culture. Reply with JSON only.";

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").unwrap());

#[derive(Debug, Deserialize)]
struct ContentReply {
    content: Vec<ContentBlock>,
}

/// Turns fetched page content into display blocks through the LLM.
///
/// Text within the safe token budget goes out as one request covering the
/// whole record; a reply that cannot be parsed fails the record. Longer text
/// is segmented and each segment is summarized on its own; a segment whose
/// reply cannot be parsed is dropped and the rest are kept. Both paths end
/// with up to three images from the fetched pages.
pub struct Summarizer {
    llm: Arc<dyn LlmProvider>,
    splitter: Box<dyn SentenceSplitter>,
    retry: RetryPolicy,
}

impl Summarizer {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        splitter: Box<dyn SentenceSplitter>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            llm,
            splitter,
            retry,
        }
    }

    /// Ask the LLM which search hits best describe `name`.
    ///
    /// Only reply lines starting with `http` count, at most `max_urls` of them.
    pub async fn select_urls(
        &self,
        name: &str,
        hits: &[SearchHit],
        max_urls: usize,
    ) -> Result<Vec<String>> {
        let listing = serde_json::to_string_pretty(hits)?;
        let prompt = format!(
            "From the search results below, choose the {max} URLs most likely to contain a \
detailed introduction of the attraction \"{name}\".\n\
Each result has a title, a link and a snippet.\n\n\
Search results:\n{listing}\n\n\
Reply with the URLs only, one per line, and nothing else.",
            max = max_urls,
            name = name,
            listing = listing
        );

        let reply = self.complete("Selecting URLs", &prompt, None).await?;
        let urls = parse_url_lines(&reply, max_urls);
        ::log::info!("LLM selected {} URLs for {}: {:?}", urls.len(), name, urls);

        if urls.is_empty() {
            return Err(PipelineError::NoResults(format!(
                "LLM selected no URLs for {}",
                name
            )));
        }
        Ok(urls)
    }

    /// Summarize everything fetched for `name` into display blocks
    pub async fn summarize(&self, name: &str, snapshot: &Snapshot) -> Result<Vec<ContentBlock>> {
        let text = snapshot.combined_text();
        let images = snapshot.all_images();
        ::log::debug!(
            "Summarizing {}: {} results, {} images",
            name,
            snapshot.results.len(),
            images.len()
        );

        if text.trim().is_empty() {
            ::log::warn!("No text fetched for {}, using raw content", name);
            return Ok(format_raw_content(name, snapshot));
        }

        let chunker = Chunker::new(
            self.llm.as_ref(),
            self.splitter.as_ref(),
            self.llm.safe_token_budget(),
        );
        let segments = chunker.chunk(&text);

        let mut blocks = match segments.as_slice() {
            [] => return Ok(format_raw_content(name, snapshot)),
            [_] => self.summarize_whole(name, &text, &images).await?,
            _ => self.summarize_segments(name, &segments).await,
        };

        blocks.extend(
            images
                .iter()
                .filter(|image| !image.url.is_empty())
                .take(MAX_IMAGES)
                .map(|image| ContentBlock::Image {
                    access_url: image.url.clone(),
                }),
        );
        Ok(blocks)
    }

    async fn summarize_whole(
        &self,
        name: &str,
        text: &str,
        images: &[Image],
    ) -> Result<Vec<ContentBlock>> {
        let catalog = serde_json::to_string_pretty(images)?;
        let prompt = format!(
            "Summarize the introduction of the attraction \"{name}\" from the raw text and images below.\n\
1. Write a short title as heading1.\n\
2. Organize the text into 3-5 sections, each a heading2 followed by a paragraph.\n\
3. Place the 2-3 most representative images, showing the attraction from different angles.\n\
4. Keep to the attraction's own history and culture.\n\n\
Raw text:\n{text}\n\n\
Available images:\n{catalog}\n\n\
Reply with valid JSON in this shape and nothing else:\n\
{{\"content\": [\
{{\"type\": \"heading1\", \"text\": \"Title\"}}, \
{{\"type\": \"heading2\", \"text\": \"Section title\"}}, \
{{\"type\": \"paragraph\", \"text\": \"Section body\"}}, \
{{\"type\": \"image\", \"access_url\": \"Image URL\"}}]}}",
            name = name,
            text = text,
            catalog = catalog
        );

        let reply = self
            .complete("Summarizing", &prompt, Some(SUMMARY_SYSTEM_PROMPT))
            .await?;
        parse_content_reply(&reply).inspect_err(|e| {
            ::log::error!("Summary of {} could not be parsed: {}", name, e);
        })
    }

    async fn summarize_segments(&self, name: &str, segments: &[Segment]) -> Vec<ContentBlock> {
        let total = segments.len();
        ::log::info!("Summarizing {} in {} segments", name, total);

        let mut blocks = Vec::new();
        for (i, segment) in segments.iter().enumerate() {
            let part = i + 1;
            let prompt = format!(
                "Summarize this part of the introduction of the attraction \"{name}\". \
This is part {part}/{total} of the text.\n\
Write 1-2 key sections, each a heading2 followed by a paragraph.\n\n\
Text:\n{text}\n\n\
Reply with valid JSON in this shape and nothing else:\n\
{{\"content\": [\
{{\"type\": \"heading2\", \"text\": \"Section title\"}}, \
{{\"type\": \"paragraph\", \"text\": \"Section body\"}}]}}",
                name = name,
                part = part,
                total = total,
                text = segment.text
            );

            let label = format!("Summarizing segment {}/{}", part, total);
            let parsed = match self
                .complete(&label, &prompt, Some(SUMMARY_SYSTEM_PROMPT))
                .await
            {
                Ok(reply) => parse_content_reply(&reply),
                Err(e) => Err(e),
            };
            match parsed {
                Ok(segment_blocks) => blocks.extend(segment_blocks),
                Err(e) => {
                    ::log::warn!(
                        "Dropping segment {}/{} of {}: {}",
                        part,
                        total,
                        name,
                        e
                    );
                }
            }
        }
        blocks
    }

    async fn complete(&self, label: &str, prompt: &str, system: Option<&str>) -> Result<String> {
        let llm = self.llm.as_ref();
        self.retry
            .execute(label, move || llm.complete(prompt, system))
            .await
    }
}

/// Keep reply lines that look like URLs
fn parse_url_lines(reply: &str, max_urls: usize) -> Vec<String> {
    reply
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("http"))
        .take(max_urls)
        .map(str::to_string)
        .collect()
}

/// Parse `{"content": [...]}` out of an LLM reply, tolerating code fences
/// and prose around the object
pub fn parse_content_reply(reply: &str) -> Result<Vec<ContentBlock>> {
    let body = FENCE
        .captures(reply)
        .and_then(|c| c.get(1))
        .map_or(reply, |m| m.as_str());

    let json = match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => &body[start..=end],
        _ => {
            return Err(PipelineError::MalformedResponse(format!(
                "no JSON object in reply: {}",
                truncate(reply, 200)
            )));
        }
    };

    serde_json::from_str::<ContentReply>(json)
        .map(|r| r.content)
        .map_err(|e| PipelineError::MalformedResponse(e.to_string()))
}

/// Blocks built directly from the fetched pages, used when there is no text
/// to summarize
pub fn format_raw_content(name: &str, snapshot: &Snapshot) -> Vec<ContentBlock> {
    let mut blocks = vec![ContentBlock::Heading1 {
        text: name.to_string(),
    }];
    for result in &snapshot.results {
        if !result.content.text.trim().is_empty() {
            blocks.push(ContentBlock::Paragraph {
                text: result.content.text.clone(),
            });
        }
        blocks.extend(
            result
                .content
                .images
                .iter()
                .filter(|image| !image.url.is_empty())
                .map(|image| ContentBlock::Image {
                    access_url: image.url.clone(),
                }),
        );
    }
    blocks
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
