use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::database::models::{
    ImageMatchRecord, ImageRecord, MatchRecord, MatchStatus, Rating, SearchPlace, TagRecord,
    ThumbnailRecord,
};
use crate::database::schema::{SCHEMA, SCHEMA_VERSION};
use crate::ingest::hasher;
use crate::media::thumbnail;
use crate::net::client::{BypassClient, HttpClient};
use crate::net::{absolute_url, host_of};
use crate::scrape::result_page::{self, ParsedMatch};
use crate::scrape::sites::{self, ScrapedTag};
use crate::utils::config::NO_TAGS_HOSTS;

/// One open handle per run. Every get-or-create runs inside a single
/// transaction, so the uniqueness invariants hold even if a second writer
/// ever appears.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create db folder: {:?}", parent))?;
            }
        }
        let conn = Connection::open(path).context("Failed to open database")?;
        conn.execute_batch(SCHEMA).context("Failed to initialize schema")?;
        let existing: Option<i64> = conn
            .query_row("SELECT version FROM program LIMIT 1", [], |row| row.get(0))
            .optional()?;
        match existing {
            Some(version) => {
                debug!(version, "db already existed");
                if version != SCHEMA_VERSION {
                    warn!(version, expected = SCHEMA_VERSION, "schema version mismatch");
                }
            }
            None => {
                conn.execute(
                    "INSERT INTO program (version) VALUES (?1)",
                    params![SCHEMA_VERSION],
                )?;
            }
        }
        Ok(Self { conn })
    }

    /// Hash the file and return the existing row for its checksum, or probe
    /// the pixel dimensions and insert. Byte-identical files map to one row
    /// no matter their path.
    pub fn get_or_create_image(&mut self, path: &Path) -> Result<(ImageRecord, bool)> {
        let checksum = hasher::sha256_checksum(path)?;
        let tx = self.conn.transaction()?;
        if let Some(record) = image_by_checksum(&tx, &checksum)? {
            tx.commit()?;
            return Ok((record, false));
        }
        let (width, height) = thumbnail::image_dimensions(path)?;
        let path_str = path.to_string_lossy().into_owned();
        tx.execute(
            "INSERT INTO images (checksum, width, height, path) VALUES (?1, ?2, ?3, ?4)",
            params![checksum, width, height, path_str],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok((
            ImageRecord {
                id,
                checksum,
                width: i64::from(width),
                height: i64::from(height),
                path: Some(path_str),
            },
            true,
        ))
    }

    /// Look up the thumbnail relationship for (original, size); on a miss
    /// render the file into the thumb folder, register it as an image and
    /// link it. A zero-byte file left behind by a crashed write counts as
    /// absent and is regenerated.
    pub fn get_or_create_thumbnail(
        &mut self,
        image: &ImageRecord,
        size: (u32, u32),
        thumb_folder: &Path,
    ) -> Result<(ThumbnailRecord, bool)> {
        if let Some(record) = self.thumbnail_for(image.id, size)? {
            let stale = match record.thumbnail.path.as_deref() {
                Some(p) => fs::metadata(p).map(|m| m.len() == 0).unwrap_or(true),
                None => true,
            };
            if stale {
                warn!(checksum = %image.checksum, "thumbnail file missing or empty, regenerating");
                let src = source_path(image)?;
                // regenerate where the row says the file lives, not where the
                // caller's thumb folder happens to point this run
                let dest = match record.thumbnail.path.as_deref() {
                    Some(p) => PathBuf::from(p),
                    None => thumbnail::thumbnail_path(thumb_folder, &image.checksum, size),
                };
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                thumbnail::render_thumbnail(src, &dest, size)?;
            }
            return Ok((record, false));
        }

        let src = source_path(image)?;
        fs::create_dir_all(thumb_folder)
            .with_context(|| format!("Failed to create thumb folder: {:?}", thumb_folder))?;
        let dest = thumbnail::thumbnail_path(thumb_folder, &image.checksum, size);
        let present = fs::metadata(&dest).map(|m| m.len() > 0).unwrap_or(false);
        if !present {
            thumbnail::render_thumbnail(src, &dest, size)?;
        }
        let (thumb_image, _) = self.get_or_create_image(&dest)?;

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO thumbnail_relationships (original_id, thumbnail_id, width, height)
             VALUES (?1, ?2, ?3, ?4)",
            params![image.id, thumb_image.id, size.0, size.1],
        )?;
        let id: i64 = tx.query_row(
            "SELECT id FROM thumbnail_relationships
             WHERE original_id = ?1 AND width = ?2 AND height = ?3",
            params![image.id, size.0, size.1],
            |row| row.get(0),
        )?;
        tx.commit()?;
        Ok((
            ThumbnailRecord {
                id,
                original_id: image.id,
                thumbnail: thumb_image,
                width: i64::from(size.0),
                height: i64::from(size.1),
            },
            true,
        ))
    }

    fn thumbnail_for(&self, original_id: i64, size: (u32, u32)) -> Result<Option<ThumbnailRecord>> {
        self.conn
            .query_row(
                "SELECT tr.id, tr.original_id, tr.width, tr.height,
                        i.id, i.checksum, i.width, i.height, i.path
                 FROM thumbnail_relationships tr
                 JOIN images i ON tr.thumbnail_id = i.id
                 WHERE tr.original_id = ?1 AND tr.width = ?2 AND tr.height = ?3",
                params![original_id, size.0, size.1],
                |row| {
                    Ok(ThumbnailRecord {
                        id: row.get(0)?,
                        original_id: row.get(1)?,
                        width: row.get(2)?,
                        height: row.get(3)?,
                        thumbnail: ImageRecord {
                            id: row.get(4)?,
                            checksum: row.get(5)?,
                            width: row.get(6)?,
                            height: row.get(7)?,
                            path: row.get(8)?,
                        },
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    /// Parse a result page and persist every record: Match by href, the
    /// (image, match) relationship, and the ImageMatch keyed on
    /// (relationship, place, force_gray). Idempotent under the same page.
    pub fn get_or_create_match_results(
        &mut self,
        page: &str,
        image: &ImageRecord,
        place: SearchPlace,
        force_gray: bool,
    ) -> Result<Vec<(ImageMatchRecord, bool)>> {
        let parsed = result_page::parse_result(page)?;
        let mut out = Vec::with_capacity(parsed.len());
        for item in parsed {
            out.push(self.get_or_create_image_match(&item, image, place, force_gray)?);
        }
        Ok(out)
    }

    fn get_or_create_image_match(
        &mut self,
        item: &ParsedMatch,
        image: &ImageRecord,
        place: SearchPlace,
        force_gray: bool,
    ) -> Result<(ImageMatchRecord, bool)> {
        let tx = self.conn.transaction()?;

        let match_result = match match_by_href(&tx, &item.href)? {
            Some(m) => m,
            None => {
                tx.execute(
                    "INSERT INTO match_results (href, thumb, rating, img_alt, width, height)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        item.href,
                        item.thumb,
                        item.rating.as_i64(),
                        item.img_alt,
                        item.width,
                        item.height
                    ],
                )?;
                MatchRecord {
                    id: tx.last_insert_rowid(),
                    href: item.href.clone(),
                    thumb: item.thumb.clone(),
                    rating: item.rating,
                    img_alt: item.img_alt.clone(),
                    width: item.width,
                    height: item.height,
                }
            }
        };

        tx.execute(
            "INSERT OR IGNORE INTO image_match_relationships (image_id, match_id) VALUES (?1, ?2)",
            params![image.id, match_result.id],
        )?;
        let relationship_id: i64 = tx.query_row(
            "SELECT id FROM image_match_relationships WHERE image_id = ?1 AND match_id = ?2",
            params![image.id, match_result.id],
            |row| row.get(0),
        )?;

        let existing: Option<(i64, i64, i64)> = tx
            .query_row(
                "SELECT id, status, similarity FROM image_matches
                 WHERE relationship_id = ?1 AND search_place = ?2 AND force_gray = ?3",
                params![relationship_id, place.as_i64(), force_gray],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        let (id, status, similarity, created) = match existing {
            Some((id, status, similarity)) => {
                (id, MatchStatus::from_i64(status), similarity, false)
            }
            None => {
                tx.execute(
                    "INSERT INTO image_matches
                         (relationship_id, search_place, force_gray, similarity, status)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        relationship_id,
                        place.as_i64(),
                        force_gray,
                        item.similarity,
                        item.status.as_i64()
                    ],
                )?;
                (tx.last_insert_rowid(), item.status, item.similarity, true)
            }
        };
        tx.commit()?;

        Ok((
            ImageMatchRecord {
                id,
                relationship_id,
                search_place: place,
                force_gray,
                status,
                similarity,
                match_result,
            },
            created,
        ))
    }

    /// The cache-hit branch: rows here mean the (image, place) pair was
    /// queried before and the network is never consulted again.
    pub fn cached_match_results(
        &self,
        image_id: i64,
        place: SearchPlace,
        force_gray: bool,
    ) -> Result<Vec<ImageMatchRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT im.id, im.relationship_id, im.search_place, im.force_gray,
                    im.status, im.similarity,
                    m.id, m.href, m.thumb, m.rating, m.img_alt, m.width, m.height
             FROM image_matches im
             JOIN image_match_relationships rel ON im.relationship_id = rel.id
             JOIN match_results m ON rel.match_id = m.id
             WHERE rel.image_id = ?1 AND im.search_place = ?2 AND im.force_gray = ?3
             ORDER BY im.id",
        )?;
        let rows = stmt.query_map(params![image_id, place.as_i64(), force_gray], |row| {
            Ok(ImageMatchRecord {
                id: row.get(0)?,
                relationship_id: row.get(1)?,
                search_place: SearchPlace::from_i64(row.get(2)?),
                force_gray: row.get(3)?,
                status: MatchStatus::from_i64(row.get(4)?),
                similarity: row.get(5)?,
                match_result: MatchRecord {
                    id: row.get(6)?,
                    href: row.get(7)?,
                    thumb: row.get(8)?,
                    rating: Rating::from_i64(row.get(9)?),
                    img_alt: row.get(10)?,
                    width: row.get(11)?,
                    height: row.get(12)?,
                },
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Cached tags short-circuit the fetch: tags are pulled from the source
    /// site at most once per match. Hosts on the no-tags list are skipped
    /// entirely. Network errors bubble up for the caller to record against
    /// this match.
    pub fn resolve_tags_for_match(
        &mut self,
        match_result: &MatchRecord,
        http: &HttpClient,
        bypass: Option<&BypassClient>,
    ) -> Result<Vec<TagRecord>> {
        let cached = self.tags_for_match(match_result.id)?;
        if !cached.is_empty() {
            return Ok(cached);
        }
        let url = absolute_url(&match_result.href);
        if NO_TAGS_HOSTS.contains(&host_of(&url)) {
            debug!(url, "host on no-tags list, skipping tag fetch");
            return Ok(Vec::new());
        }
        let page = http
            .fetch(&url)
            .with_context(|| format!("Failed to fetch match page: {}", url))?;
        let scraped = sites::get_tags(&page, &url, bypass)?;
        if scraped.is_empty() {
            info!(url, "no tags found for match");
            return Ok(Vec::new());
        }
        self.persist_tags(match_result.id, &scraped)
    }

    /// Get-or-create every (namespace, name) pair and link it to the match.
    /// SQLite's UNIQUE treats NULLs as distinct, so the namespace-less case
    /// is handled with an explicit lookup instead of INSERT OR IGNORE.
    fn persist_tags(&mut self, match_id: i64, scraped: &[ScrapedTag]) -> Result<Vec<TagRecord>> {
        let tx = self.conn.transaction()?;
        let mut tags = Vec::with_capacity(scraped.len());
        for (namespace, name) in scraped {
            let namespace = namespace.as_deref().filter(|s| !s.is_empty());
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM tags WHERE name = ?1 AND namespace IS ?2",
                    params![name, namespace],
                    |row| row.get(0),
                )
                .optional()?;
            let tag_id = match existing {
                Some(id) => id,
                None => {
                    tx.execute(
                        "INSERT INTO tags (name, namespace) VALUES (?1, ?2)",
                        params![name, namespace],
                    )?;
                    tx.last_insert_rowid()
                }
            };
            tx.execute(
                "INSERT OR IGNORE INTO match_tag_relationships (match_id, tag_id) VALUES (?1, ?2)",
                params![match_id, tag_id],
            )?;
            tags.push(TagRecord {
                id: tag_id,
                name: name.clone(),
                namespace: namespace.map(str::to_string),
            });
        }
        tx.commit()?;
        Ok(tags)
    }

    pub fn tags_for_match(&self, match_id: i64) -> Result<Vec<TagRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.id, t.name, t.namespace
             FROM match_tag_relationships mtr
             JOIN tags t ON mtr.tag_id = t.id
             WHERE mtr.match_id = ?1
             ORDER BY t.id",
        )?;
        let rows = stmt.query_map(params![match_id], |row| {
            Ok(TagRecord {
                id: row.get(0)?,
                name: row.get(1)?,
                namespace: row.get(2)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

fn source_path(image: &ImageRecord) -> Result<&Path> {
    image
        .path
        .as_deref()
        .map(Path::new)
        .ok_or_else(|| anyhow!("image {} has no source path", image.checksum))
}

fn image_by_checksum(conn: &Connection, checksum: &str) -> Result<Option<ImageRecord>> {
    conn.query_row(
        "SELECT id, checksum, width, height, path FROM images WHERE checksum = ?1",
        params![checksum],
        |row| {
            Ok(ImageRecord {
                id: row.get(0)?,
                checksum: row.get(1)?,
                width: row.get(2)?,
                height: row.get(3)?,
                path: row.get(4)?,
            })
        },
    )
    .optional()
    .map_err(Into::into)
}

fn match_by_href(conn: &Connection, href: &str) -> Result<Option<MatchRecord>> {
    conn.query_row(
        "SELECT id, href, thumb, rating, img_alt, width, height
         FROM match_results WHERE href = ?1",
        params![href],
        |row| {
            Ok(MatchRecord {
                id: row.get(0)?,
                href: row.get(1)?,
                thumb: row.get(2)?,
                rating: Rating::from_i64(row.get(3)?),
                img_alt: row.get(4)?,
                width: row.get(5)?,
                height: row.get(6)?,
            })
        },
    )
    .optional()
    .map_err(Into::into)
}
