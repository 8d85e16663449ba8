mod database;
mod ingest;
mod media;
mod net;
mod scrape;
mod tagging;
mod utils;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use indicatif::ProgressBar;
use tracing::{debug, error, info};

use crate::database::models::{ImageRecord, SearchPlace};
use crate::database::repo::Database;
use crate::ingest::scanner;
use crate::net::client::{BypassClient, HttpClient};
use crate::scrape::result_page;
use crate::tagging::resolver::{self, MatchFilter};
use crate::utils::config::{AppConfig, DEFAULT_THUMB_SIZE, NETWORK_TIMEOUT, RESIZE_SIZE};

#[derive(Parser, Debug)]
#[command(author, version, about = "Find similar images on iqdb and cache matches and tags")]
struct Args {
    /// Image file, or a folder to process as a batch
    target: PathBuf,

    /// Search place to submit the image to
    #[arg(long, value_enum, default_value = "iqdb")]
    place: SearchPlace,

    /// Database file (defaults to the user data dir)
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Folder for generated thumbnails (defaults to the user data dir)
    #[arg(long)]
    thumb_folder: Option<PathBuf>,

    /// Submit a resized copy instead of the original file
    #[arg(long)]
    resize: bool,

    /// Resize bounding box as WxH, e.g. 200x200 (implies --resize)
    #[arg(long, value_parser = parse_size)]
    size: Option<(u32, u32)>,

    /// Only keep best matches
    #[arg(long)]
    best_match: bool,

    /// Minimum similarity percentage to keep
    #[arg(long)]
    min_similarity: Option<i64>,

    /// Append resolved tag names to this file
    #[arg(long)]
    tag_output: Option<PathBuf>,

    /// Append match source urls to this file
    #[arg(long)]
    url_output: Option<PathBuf>,

    /// Ask the engine to match in grayscale
    #[arg(long)]
    force_gray: bool,

    /// Stop at the first failing item instead of continuing
    #[arg(long)]
    abort_on_error: bool,

    /// Print parsed match records as json (debugging aid)
    #[arg(long)]
    dump_json: bool,
}

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got {:?}", s))?;
    let w = w.parse().map_err(|_| format!("bad width in {:?}", s))?;
    let h = h.parse().map_err(|_| format!("bad height in {:?}", s))?;
    Ok((w, h))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config = AppConfig::resolve(args.db_path.clone(), args.thumb_folder.clone())?;
    let mut db = Database::open(&config.db_path)?;
    let http = HttpClient::new(NETWORK_TIMEOUT)?;
    let bypass = BypassClient::new().ok();

    let targets = if args.target.is_dir() {
        scanner::scan_images(&args.target)?
    } else {
        vec![args.target.clone()]
    };
    if targets.is_empty() {
        return Err(anyhow!("no images found under {:?}", args.target));
    }

    let batch = targets.len() > 1;
    let progress = batch.then(|| ProgressBar::new(targets.len() as u64));
    let mut failures: Vec<(PathBuf, String)> = Vec::new();

    for path in &targets {
        if let Some(pb) = &progress {
            pb.set_message(path.display().to_string());
        }
        let outcome = process_image(&mut db, &config, &http, bypass.as_ref(), &args, path);
        if let Err(err) = outcome {
            if !batch || args.abort_on_error {
                return Err(err.context(format!("while processing {}", path.display())));
            }
            error!(path = %path.display(), err = %format!("{:#}", err), "item failed");
            failures.push((path.clone(), format!("{:#}", err)));
        }
        if let Some(pb) = &progress {
            pb.inc(1);
        }
    }
    if let Some(pb) = &progress {
        pb.finish_and_clear();
    }

    if !failures.is_empty() {
        println!("\nFailed items:");
        for (path, err) in &failures {
            println!("  {}: {}", path.display(), err);
        }
    }
    Ok(())
}

fn process_image(
    db: &mut Database,
    config: &AppConfig,
    http: &HttpClient,
    bypass: Option<&BypassClient>,
    args: &Args,
    path: &Path,
) -> Result<()> {
    let (img, _) = db.get_or_create_image(path)?;
    let (default_thumb, _) = db.get_or_create_thumbnail(&img, DEFAULT_THUMB_SIZE, &config.thumb_folder)?;

    // the posted image is what gets submitted and what keys the cache
    let posted: ImageRecord = if args.resize || args.size.is_some() {
        let size = args.size.unwrap_or(RESIZE_SIZE);
        if size == DEFAULT_THUMB_SIZE {
            default_thumb.thumbnail
        } else {
            db.get_or_create_thumbnail(&img, size, &config.thumb_folder)?
                .0
                .thumbnail
        }
    } else {
        img
    };

    let cached = db.cached_match_results(posted.id, args.place, args.force_gray)?;
    let results = if cached.is_empty() {
        info!(place = ?args.place, checksum = %posted.checksum, "no cached results, querying");
        let posted_path = posted
            .path
            .as_deref()
            .ok_or_else(|| anyhow!("image {} has no file to submit", posted.checksum))?;
        let page = http
            .submit_file_for_search(args.place.engine_url(), Path::new(posted_path), args.force_gray)
            .context("search submission failed")?;
        if args.dump_json {
            let parsed = result_page::parse_result(&page)?;
            println!("{}", serde_json::to_string_pretty(&parsed)?);
        }
        db.get_or_create_match_results(&page, &posted, args.place, args.force_gray)?
            .into_iter()
            .map(|(record, _)| record)
            .collect()
    } else {
        debug!(count = cached.len(), "serving cached match results");
        cached
    };

    let filter = MatchFilter {
        best_match_only: args.best_match,
        min_similarity: args.min_similarity,
    };
    let report = resolver::resolve_tags(db, results, &filter, http, bypass);

    println!("{}", path.display());
    for (result, tags) in &report.resolved {
        println!(
            "  {:?} {}% {:?} {}",
            result.status, result.similarity, result.match_result.rating, result.match_result.href
        );
        if !tags.is_empty() {
            let names: Vec<String> = tags.iter().map(|t| t.display_name()).collect();
            println!("    tags: {}", names.join(", "));
        }
    }
    for (href, err) in &report.errors {
        println!("  error: {}: {}", href, err);
    }

    if let Some(tag_output) = &args.tag_output {
        resolver::write_tags_sink(tag_output, &report)?;
    }
    if let Some(url_output) = &args.url_output {
        resolver::write_urls_sink(url_output, &report)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("200x200"), Ok((200, 200)));
        assert_eq!(parse_size("150X100"), Ok((150, 100)));
        assert!(parse_size("200").is_err());
        assert!(parse_size("axb").is_err());
    }
}
