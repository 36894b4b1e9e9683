use crate::parsers::extract_content;
use crate::results::{Image, Link};

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html>
<head>
  <title>West Lake</title>
  <style>body { color: red; }</style>
  <script>var tracking = "do not extract";</script>
</head>
<body>
  <h1>  West   Lake </h1>
  <p>Famous for its scenery.</p>
  <script type="text/javascript">console.log("hidden");</script>
  <img src="photos/lake.jpg" alt="The lake">
  <img src="//cdn.example.com/pagoda.png">
  <img src="/static/bridge.jpg" alt="Bridge">
  <img src="">
  <img alt="no source">
  <a href="history.html">History</a>
  <a href="/tickets">  Tickets  </a>
  <a href="https://other.org/map">Map</a>
  <a href="https://other.org/empty"></a>
  <a>No target</a>
</body>
</html>"#;

    const BASE: &str = "https://travel.example.com/spots/westlake";

    #[test]
    fn test_text_excludes_script_and_style() {
        let content = extract_content(PAGE, BASE);
        assert!(!content.text.contains("tracking"));
        assert!(!content.text.contains("color: red"));
        assert!(!content.text.contains("hidden"));
        assert!(content.text.starts_with("West Lake West   Lake Famous for its scenery."));
    }

    #[test]
    fn test_text_nodes_joined_by_single_space() {
        let content = extract_content("<p>One</p>\n\n<p>Two <b>Three</b></p>", BASE);
        assert_eq!(content.text, "One Two Three");
    }

    #[test]
    fn test_images_resolved_against_base() {
        let content = extract_content(PAGE, BASE);
        assert_eq!(
            content.images,
            vec![
                Image {
                    url: "https://travel.example.com/spots/photos/lake.jpg".to_string(),
                    alt: "The lake".to_string(),
                },
                Image {
                    url: "https://cdn.example.com/pagoda.png".to_string(),
                    alt: String::new(),
                },
                Image {
                    url: "https://travel.example.com/static/bridge.jpg".to_string(),
                    alt: "Bridge".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_links_need_target_and_text() {
        let content = extract_content(PAGE, BASE);
        assert_eq!(
            content.links,
            vec![
                Link {
                    url: "https://travel.example.com/spots/history.html".to_string(),
                    text: "History".to_string(),
                },
                Link {
                    url: "https://travel.example.com/tickets".to_string(),
                    text: "Tickets".to_string(),
                },
                Link {
                    url: "https://other.org/map".to_string(),
                    text: "Map".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_empty_document() {
        let content = extract_content("", BASE);
        assert!(content.text.is_empty());
        assert!(content.images.is_empty());
        assert!(content.links.is_empty());
    }
}
