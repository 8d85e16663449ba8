/// Bumped when the table layout changes; stored in `program` so a run can
/// tell a first start from an existing database.
pub const SCHEMA_VERSION: i64 = 1;

/// Seven entity tables plus the version marker. ImageMatch uniqueness is
/// keyed on (relationship, search_place, force_gray): re-querying the same
/// image at the same place serves the cached rows.
pub const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS program (
        id INTEGER PRIMARY KEY,
        version INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS images (
        id INTEGER PRIMARY KEY,
        checksum TEXT UNIQUE NOT NULL,
        width INTEGER NOT NULL,
        height INTEGER NOT NULL,
        path TEXT
    );

    CREATE TABLE IF NOT EXISTS match_results (
        id INTEGER PRIMARY KEY,
        href TEXT UNIQUE NOT NULL,
        thumb TEXT NOT NULL,
        rating INTEGER NOT NULL DEFAULT 0,
        img_alt TEXT,
        width INTEGER,
        height INTEGER
    );

    CREATE TABLE IF NOT EXISTS image_match_relationships (
        id INTEGER PRIMARY KEY,
        image_id INTEGER NOT NULL REFERENCES images(id),
        match_id INTEGER NOT NULL REFERENCES match_results(id),
        UNIQUE(image_id, match_id)
    );

    CREATE TABLE IF NOT EXISTS image_matches (
        id INTEGER PRIMARY KEY,
        relationship_id INTEGER NOT NULL REFERENCES image_match_relationships(id),
        search_place INTEGER NOT NULL,
        force_gray INTEGER NOT NULL DEFAULT 0,
        similarity INTEGER NOT NULL,
        status INTEGER NOT NULL,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        UNIQUE(relationship_id, search_place, force_gray)
    );

    CREATE TABLE IF NOT EXISTS tags (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        namespace TEXT,
        UNIQUE(name, namespace)
    );

    CREATE TABLE IF NOT EXISTS match_tag_relationships (
        id INTEGER PRIMARY KEY,
        match_id INTEGER NOT NULL REFERENCES match_results(id),
        tag_id INTEGER NOT NULL REFERENCES tags(id),
        UNIQUE(match_id, tag_id)
    );

    CREATE TABLE IF NOT EXISTS thumbnail_relationships (
        id INTEGER PRIMARY KEY,
        original_id INTEGER NOT NULL REFERENCES images(id),
        thumbnail_id INTEGER NOT NULL REFERENCES images(id),
        width INTEGER NOT NULL,
        height INTEGER NOT NULL,
        UNIQUE(original_id, width, height)
    );
";
