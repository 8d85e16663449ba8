pub mod result_page;
pub mod sites;

use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::warn;

/// Violations of the result-page markup invariants. These are fatal: they
/// mean the upstream site changed its layout and silently continuing would
/// persist wrong data.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("similarity marker missing in result cell (header: {0:?})")]
    MissingSimilarity(String),
    #[error("could not parse similarity from {0:?}")]
    BadSimilarity(String),
    #[error("could not parse size from {0:?}")]
    BadSize(String),
    #[error("result table has no {0} element")]
    MissingElement(&'static str),
    #[error("result table has {0} anchors, expected at most 2")]
    TooManyAnchors(usize),
}

/// All selectors in this crate are static strings, so a parse failure is a
/// programming error rather than an input error.
pub(crate) fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static css selector")
}

pub(crate) fn text_of(el: ElementRef) -> String {
    el.text().collect()
}

/// The `alt` and `title` attributes of a page's primary image carry the
/// same metadata string. A difference is an anomaly worth logging but never
/// fatal; the title attribute wins where logic depends on the content.
pub(crate) fn redundant_image_metadata(doc: &Html) -> Option<String> {
    let img = doc.select(&sel("img[alt][title]")).next()?;
    let alt = img.value().attr("alt")?;
    let title = img.value().attr("title")?;
    if alt != title {
        warn!(alt, title, "alt and title attributes of primary image differ");
    }
    Some(title.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redundant_metadata_prefers_title() {
        let doc = Html::parse_document(r#"<img src="a.jpg" alt="x" title="y">"#);
        assert_eq!(redundant_image_metadata(&doc), Some("y".to_string()));
    }

    #[test]
    fn test_redundant_metadata_absent() {
        let doc = Html::parse_document(r#"<img src="a.jpg">"#);
        assert_eq!(redundant_image_metadata(&doc), None);
    }
}
