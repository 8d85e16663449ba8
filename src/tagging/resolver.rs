use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;

use crate::database::models::{ImageMatchRecord, MatchStatus, TagRecord};
use crate::database::repo::Database;
use crate::net::absolute_url;
use crate::net::client::{BypassClient, HttpClient};

/// Filtering applied before tag resolution. The status filter runs first,
/// then the similarity threshold.
#[derive(Debug, Clone, Default)]
pub struct MatchFilter {
    pub best_match_only: bool,
    pub min_similarity: Option<i64>,
}

pub fn apply_filter(
    results: Vec<ImageMatchRecord>,
    filter: &MatchFilter,
) -> Vec<ImageMatchRecord> {
    let results: Vec<ImageMatchRecord> = if filter.best_match_only {
        results
            .into_iter()
            .filter(|r| r.status == MatchStatus::BestMatch)
            .collect()
    } else {
        results
    };
    match filter.min_similarity {
        Some(min) => results
            .into_iter()
            .filter(|r| r.similarity >= min)
            .collect(),
        None => results,
    }
}

/// Outcome of resolving tags for a batch of match results. An error on one
/// match never blocks the remaining matches; it is recorded here instead.
#[derive(Debug, Default)]
pub struct TagReport {
    pub resolved: Vec<(ImageMatchRecord, Vec<TagRecord>)>,
    pub errors: Vec<(String, String)>,
}

pub fn resolve_tags(
    db: &mut Database,
    results: Vec<ImageMatchRecord>,
    filter: &MatchFilter,
    http: &HttpClient,
    bypass: Option<&BypassClient>,
) -> TagReport {
    let mut report = TagReport::default();
    for result in apply_filter(results, filter) {
        match db.resolve_tags_for_match(&result.match_result, http, bypass) {
            Ok(tags) => report.resolved.push((result, tags)),
            Err(err) => {
                warn!(href = %result.match_result.href, err = %format!("{:#}", err), "tag resolution failed");
                report
                    .errors
                    .push((result.match_result.href.clone(), format!("{:#}", err)));
            }
        }
    }
    report
}

/// Append every distinct resolved tag (presentation form) to a text file,
/// one per line.
pub fn write_tags_sink(path: &Path, report: &TagReport) -> Result<()> {
    let names: BTreeSet<String> = report
        .resolved
        .iter()
        .flat_map(|(_, tags)| tags.iter().map(TagRecord::display_name))
        .collect();
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open tag sink: {:?}", path))?;
    for name in names {
        writeln!(file, "{}", name)?;
    }
    Ok(())
}

/// Append the source URL of every resolved match to a text file.
pub fn write_urls_sink(path: &Path, report: &TagReport) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open url sink: {:?}", path))?;
    for (result, _) in &report.resolved {
        writeln!(file, "{}", absolute_url(&result.match_result.href))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{MatchRecord, Rating, SearchPlace};

    fn record(status: MatchStatus, similarity: i64, href: &str) -> ImageMatchRecord {
        ImageMatchRecord {
            id: 0,
            relationship_id: 0,
            search_place: SearchPlace::Iqdb,
            force_gray: false,
            status,
            similarity,
            match_result: MatchRecord {
                id: 0,
                href: href.to_string(),
                thumb: String::new(),
                rating: Rating::Unknown,
                img_alt: None,
                width: None,
                height: None,
            },
        }
    }

    #[test]
    fn test_filter_best_match_only() {
        let results = vec![
            record(MatchStatus::BestMatch, 90, "//a"),
            record(MatchStatus::PossibleMatch, 95, "//b"),
            record(MatchStatus::Other, 99, "//c"),
        ];
        let filter = MatchFilter {
            best_match_only: true,
            min_similarity: None,
        };
        let kept = apply_filter(results, &filter);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].match_result.href, "//a");
    }

    #[test]
    fn test_filter_min_similarity() {
        let results = vec![
            record(MatchStatus::BestMatch, 90, "//a"),
            record(MatchStatus::BestMatch, 60, "//b"),
        ];
        let filter = MatchFilter {
            best_match_only: false,
            min_similarity: Some(75),
        };
        let kept = apply_filter(results, &filter);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].match_result.href, "//a");
    }

    #[test]
    fn test_status_filter_applies_before_similarity() {
        let results = vec![
            record(MatchStatus::PossibleMatch, 99, "//a"),
            record(MatchStatus::BestMatch, 80, "//b"),
        ];
        let filter = MatchFilter {
            best_match_only: true,
            min_similarity: Some(75),
        };
        let kept = apply_filter(results, &filter);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].match_result.href, "//b");
    }

    #[test]
    fn test_sinks() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let tag_path = dir.path().join("tags.txt");
        let url_path = dir.path().join("urls.txt");
        let report = TagReport {
            resolved: vec![(
                record(MatchStatus::BestMatch, 90, "//danbooru.donmai.us/posts/1"),
                vec![
                    TagRecord {
                        id: 1,
                        name: "hatsune_miku".to_string(),
                        namespace: Some("character".to_string()),
                    },
                    TagRecord {
                        id: 2,
                        name: "solo".to_string(),
                        namespace: None,
                    },
                ],
            )],
            errors: Vec::new(),
        };
        write_tags_sink(&tag_path, &report)?;
        write_urls_sink(&url_path, &report)?;
        let tags = std::fs::read_to_string(&tag_path)?;
        assert!(tags.contains("character:hatsune miku\n"));
        assert!(tags.contains("solo\n"));
        let urls = std::fs::read_to_string(&url_path)?;
        assert_eq!(urls, "https://danbooru.donmai.us/posts/1\n");
        Ok(())
    }
}
