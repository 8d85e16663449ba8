use scraper::{ElementRef, Html};
use serde::Serialize;
use tracing::{debug, warn};

use crate::database::models::{MatchStatus, Rating};
use crate::scrape::{sel, text_of, ParseError};

/// One structured record from the search engine's result page. A table with
/// two anchors produces two of these, identical except for the href.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedMatch {
    pub status: MatchStatus,
    pub similarity: i64,
    pub href: String,
    pub thumb: String,
    pub rating: Rating,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub img_alt: Option<String>,
}

/// Parse the engine's result page. Each `.pages table` is one candidate
/// match or a placeholder; placeholders ("Your image", "No relevant
/// matches") are dropped. When a table carries an alternate anchor, the
/// synthetic record is yielded before the primary one.
pub fn parse_result(html: &str) -> Result<Vec<ParsedMatch>, ParseError> {
    let doc = Html::parse_document(html);
    let table_sel = sel(".pages table");
    let anchor_sel = sel("a");

    let mut out = Vec::new();
    for table in doc.select(&table_sel) {
        let Some(record) = parse_table(table)? else {
            continue;
        };
        let anchors: Vec<ElementRef> = table.select(&anchor_sel).collect();
        if anchors.len() > 2 {
            return Err(ParseError::TooManyAnchors(anchors.len()));
        }
        if anchors.len() == 2 {
            let mut additional = record.clone();
            additional.href = anchors[1]
                .value()
                .attr("href")
                .unwrap_or_default()
                .to_string();
            out.push(additional);
        }
        out.push(record);
    }
    Ok(out)
}

fn parse_table(table: ElementRef) -> Result<Option<ParsedMatch>, ParseError> {
    let header = table.select(&sel("th")).next().map(text_of);
    let status = match header.as_deref() {
        Some("Your image") | Some("No relevant matches") => return Ok(None),
        Some("Possible match") => MatchStatus::PossibleMatch,
        Some("Best match") | Some("Additional match") | Some("Probable match:") => {
            MatchStatus::BestMatch
        }
        Some("Improbable match:") => MatchStatus::Other,
        Some(other) => {
            debug!(header = other, "unrecognized result header");
            MatchStatus::Other
        }
        None => MatchStatus::Other,
    };

    let cells: Vec<String> = table.select(&sel("td")).map(text_of).collect();
    if cells.len() < 2 {
        return Err(ParseError::MissingElement("td"));
    }
    let similarity_text = &cells[cells.len() - 1];
    if !similarity_text.contains("% similarity") {
        return Err(ParseError::MissingSimilarity(header.unwrap_or_default()));
    }
    let similarity: i64 = similarity_text
        .split("% similarity")
        .next()
        .unwrap_or_default()
        .trim()
        .parse()
        .map_err(|_| ParseError::BadSimilarity(similarity_text.clone()))?;

    let size_and_rating = &cells[cells.len() - 2];
    let rating = Rating::from_text(size_and_rating);
    let (width, height) = parse_size(size_and_rating)?;

    let img = table
        .select(&sel("img"))
        .next()
        .ok_or(ParseError::MissingElement("img"))?;
    let mut img_alt = img.value().attr("alt").map(str::to_string);
    let img_title = img.value().attr("title").map(str::to_string);
    // a bare "[IMG]" placeholder means the engine had no metadata at all
    if img_alt.as_deref() == Some("[IMG]") && img_title.is_none() {
        img_alt = None;
    }
    if img_alt != img_title {
        warn!(
            alt = ?img_alt,
            title = ?img_title,
            "alt and title attributes of match image differ"
        );
    }
    let thumb = img.value().attr("src").unwrap_or_default().to_string();

    let href = table
        .select(&sel("a"))
        .next()
        .ok_or(ParseError::MissingElement("a"))?
        .value()
        .attr("href")
        .unwrap_or_default()
        .to_string();

    Ok(Some(ParsedMatch {
        status,
        similarity,
        href,
        thumb,
        rating,
        width,
        height,
        img_alt,
    }))
}

/// The size cell reads like "600×800 [Safe]". A cell with no
/// multiplication sign is the valid "no size available" case.
fn parse_size(text: &str) -> Result<(Option<i64>, Option<i64>), ParseError> {
    let first = text.trim().split_whitespace().next().unwrap_or_default();
    match first.split_once('×') {
        Some((w, h)) => {
            let w = w
                .parse()
                .map_err(|_| ParseError::BadSize(text.to_string()))?;
            let h = h
                .parse()
                .map_err(|_| ParseError::BadSize(text.to_string()))?;
            Ok((Some(w), Some(h)))
        }
        None => Ok((None, None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(tables: &str) -> String {
        format!(r#"<html><body><div class="pages">{}</div></body></html>"#, tables)
    }

    const BEST_MATCH_TABLE: &str = r#"
        <table>
          <tr><th>Best match</th></tr>
          <tr><td class="image">
            <a href="//danbooru.donmai.us/posts/1">
              <img src="/t/1.jpg" alt="Rating: s Tags: solo" title="Rating: s Tags: solo">
            </a>
          </td></tr>
          <tr><td>600×800 [Safe]</td></tr>
          <tr><td>92% similarity</td></tr>
        </table>"#;

    #[test]
    fn test_best_match_table() {
        let res = parse_result(&page(BEST_MATCH_TABLE)).unwrap();
        assert_eq!(res.len(), 1);
        let m = &res[0];
        assert_eq!(m.status, MatchStatus::BestMatch);
        assert_eq!(m.similarity, 92);
        assert_eq!(m.rating, Rating::Safe);
        assert_eq!(m.width, Some(600));
        assert_eq!(m.height, Some(800));
        assert_eq!(m.href, "//danbooru.donmai.us/posts/1");
        assert_eq!(m.thumb, "/t/1.jpg");
        assert_eq!(m.img_alt.as_deref(), Some("Rating: s Tags: solo"));
    }

    #[test]
    fn test_placeholder_tables_are_skipped() {
        let html = page(
            r#"<table><tr><th>Your image</th></tr><tr><td>160×160</td></tr></table>
               <table><tr><th>No relevant matches</th></tr></table>"#,
        );
        assert!(parse_result(&html).unwrap().is_empty());
    }

    #[test]
    fn test_possible_match_status() {
        let html = page(&BEST_MATCH_TABLE.replace("Best match", "Possible match"));
        let res = parse_result(&html).unwrap();
        assert_eq!(res[0].status, MatchStatus::PossibleMatch);
    }

    #[test]
    fn test_additional_match_maps_to_best_match() {
        let html = page(&BEST_MATCH_TABLE.replace("Best match", "Additional match"));
        let res = parse_result(&html).unwrap();
        assert_eq!(res[0].status, MatchStatus::BestMatch);
    }

    #[test]
    fn test_improbable_and_unrecognized_headers_map_to_other() {
        let html = page(&BEST_MATCH_TABLE.replace("Best match", "Improbable match:"));
        assert_eq!(parse_result(&html).unwrap()[0].status, MatchStatus::Other);
        let html = page(&BEST_MATCH_TABLE.replace("Best match", "Something new"));
        assert_eq!(parse_result(&html).unwrap()[0].status, MatchStatus::Other);
    }

    #[test]
    fn test_missing_header_maps_to_other() {
        let html = page(&BEST_MATCH_TABLE.replace("<tr><th>Best match</th></tr>", ""));
        assert_eq!(parse_result(&html).unwrap()[0].status, MatchStatus::Other);
    }

    #[test]
    fn test_missing_similarity_is_fatal() {
        let html = page(&BEST_MATCH_TABLE.replace("92% similarity", "92%"));
        assert!(matches!(
            parse_result(&html),
            Err(ParseError::MissingSimilarity(_))
        ));
    }

    #[test]
    fn test_explicit_rating_marker() {
        let html = page(&BEST_MATCH_TABLE.replace("[Safe]", "[Explicit]"));
        assert_eq!(parse_result(&html).unwrap()[0].rating, Rating::Explicit);
    }

    #[test]
    fn test_no_size_available() {
        let html = page(&BEST_MATCH_TABLE.replace("600×800 [Safe]", "[Safe]"));
        let res = parse_result(&html).unwrap();
        assert_eq!(res[0].width, None);
        assert_eq!(res[0].height, None);
        assert_eq!(res[0].rating, Rating::Safe);
    }

    #[test]
    fn test_img_placeholder_means_no_metadata() {
        let html = page(
            &BEST_MATCH_TABLE
                .replace(r#" title="Rating: s Tags: solo""#, "")
                .replace(r#"alt="Rating: s Tags: solo""#, r#"alt="[IMG]""#),
        );
        let res = parse_result(&html).unwrap();
        assert_eq!(res[0].img_alt, None);
    }

    const TWO_ANCHOR_TABLE: &str = r#"
        <table>
          <tr><th>Best match</th></tr>
          <tr><td class="image">
            <a href="//danbooru.donmai.us/posts/1">
              <img src="/t/1.jpg" alt="Rating: s Tags: solo" title="Rating: s Tags: solo">
            </a>
            <a href="//yande.re/post/show/2">mirror</a>
          </td></tr>
          <tr><td>600×800 [Safe]</td></tr>
          <tr><td>92% similarity</td></tr>
        </table>"#;

    #[test]
    fn test_two_anchors_yield_additional_record_first() {
        let res = parse_result(&page(TWO_ANCHOR_TABLE)).unwrap();
        assert_eq!(res.len(), 2);
        assert_eq!(res[0].href, "//yande.re/post/show/2");
        assert_eq!(res[1].href, "//danbooru.donmai.us/posts/1");
        // all fields but the href are shared
        let mut clone = res[0].clone();
        clone.href = res[1].href.clone();
        assert_eq!(clone, res[1]);
    }

    #[test]
    fn test_three_anchors_is_fatal() {
        let html = page(&TWO_ANCHOR_TABLE.replace(
            r#"<a href="//yande.re/post/show/2">mirror</a>"#,
            r#"<a href="//yande.re/post/show/2">mirror</a><a href="//b">y</a>"#,
        ));
        assert!(matches!(
            parse_result(&html),
            Err(ParseError::TooManyAnchors(3))
        ));
    }
}
