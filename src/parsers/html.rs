use crate::results::{Image, Link, PageContent};
use crate::utils::to_absolute_url;
use scraper::{ElementRef, Html, Node, Selector};

/// Elements whose text never counts as visible content
const HIDDEN_ELEMENTS: [&str; 2] = ["script", "style"];

/// Extracts visible text, images and links from a rendered document.
///
/// `base_url` is the page's URL after redirects; relative image sources and
/// link targets are resolved against it.
pub fn extract_content(html: &str, base_url: &str) -> PageContent {
    let doc = Html::parse_document(html);

    let text = visible_text(&doc);
    let images = extract_images(&doc, base_url);
    let links = extract_links(&doc, base_url);

    ::log::debug!(
        "Extracted {} chars, {} images, {} links from {}",
        text.len(),
        images.len(),
        links.len(),
        base_url
    );

    PageContent {
        text,
        images,
        links,
    }
}

/// Every non-blank text node outside script/style, trimmed and joined by
/// single spaces. Layout is not preserved.
pub fn visible_text(doc: &Html) -> String {
    doc.tree
        .root()
        .descendants()
        .filter_map(|node| match node.value() {
            Node::Text(text) => {
                let hidden = node.ancestors().any(|ancestor| {
                    ancestor
                        .value()
                        .as_element()
                        .is_some_and(|e| HIDDEN_ELEMENTS.contains(&e.name()))
                });
                (!hidden).then(|| text.trim())
            }
            _ => None,
        })
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn extract_images(doc: &Html, base_url: &str) -> Vec<Image> {
    let img_selector = Selector::parse("img").unwrap();
    doc.select(&img_selector)
        .filter_map(|e| {
            let src = e.value().attr("src")?;
            let url = to_absolute_url(base_url, src.trim())?;
            Some(Image {
                url,
                alt: e.value().attr("alt").unwrap_or_default().to_string(),
            })
        })
        .collect()
}

fn extract_links(doc: &Html, base_url: &str) -> Vec<Link> {
    let link_selector = Selector::parse("a").unwrap();
    doc.select(&link_selector)
        .filter_map(|e| {
            let href = e.value().attr("href")?;
            let text = element_text(e);
            if href.is_empty() || text.is_empty() {
                return None;
            }
            let url = to_absolute_url(base_url, href.trim())?;
            Some(Link { url, text })
        })
        .collect()
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
