use clap::ValueEnum;
use serde::Serialize;

/// Confidence tier assigned by the search engine's own page layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchStatus {
    Unknown,
    BestMatch,
    PossibleMatch,
    Other,
}

impl MatchStatus {
    pub fn as_i64(self) -> i64 {
        match self {
            MatchStatus::Unknown => 0,
            MatchStatus::BestMatch => 1,
            MatchStatus::PossibleMatch => 2,
            MatchStatus::Other => 3,
        }
    }

    pub fn from_i64(v: i64) -> Self {
        match v {
            1 => MatchStatus::BestMatch,
            2 => MatchStatus::PossibleMatch,
            3 => MatchStatus::Other,
            _ => MatchStatus::Unknown,
        }
    }
}

/// Content rating inferred from bracketed markers in the result page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Rating {
    Unknown,
    Safe,
    Ero,
    Explicit,
}

impl Rating {
    /// Bracketed markers as they appear in the size-and-rating cell,
    /// scanned in this order.
    pub const MARKERS: &'static [(&'static str, Rating)] = &[
        ("[Safe]", Rating::Safe),
        ("[Ero]", Rating::Ero),
        ("[Explicit]", Rating::Explicit),
    ];

    /// Scan free text for a rating marker; unrecognized or absent markers
    /// fall back to `Unknown`.
    pub fn from_text(text: &str) -> Self {
        let mut rating = Rating::Unknown;
        for (marker, value) in Self::MARKERS {
            if text.contains(marker) {
                rating = *value;
            }
        }
        rating
    }

    pub fn as_i64(self) -> i64 {
        match self {
            Rating::Unknown => 0,
            Rating::Safe => 1,
            Rating::Ero => 2,
            Rating::Explicit => 3,
        }
    }

    pub fn from_i64(v: i64) -> Self {
        match v {
            1 => Rating::Safe,
            2 => Rating::Ero,
            3 => Rating::Explicit,
            _ => Rating::Unknown,
        }
    }
}

/// The reverse-image-search frontends a query can be submitted to. Each is
/// a separate cache key: results fetched from one place are never reused
/// for another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
pub enum SearchPlace {
    Iqdb,
    AnimePictures,
    Danbooru,
    E621,
    Eshuushuu,
    Gelbooru,
    Konachan,
    Sankaku,
    TheAnimeGallery,
    Yandere,
    Zerochan,
}

impl SearchPlace {
    pub fn engine_url(self) -> &'static str {
        match self {
            SearchPlace::Iqdb => "http://iqdb.org",
            SearchPlace::AnimePictures => "http://anime-pictures.iqdb.org",
            SearchPlace::Danbooru => "http://danbooru.iqdb.org",
            SearchPlace::E621 => "http://e621.iqdb.org",
            SearchPlace::Eshuushuu => "http://e-shuushuu.iqdb.org",
            SearchPlace::Gelbooru => "http://gelbooru.iqdb.org",
            SearchPlace::Konachan => "http://konachan.iqdb.org",
            SearchPlace::Sankaku => "http://sankaku.iqdb.org",
            SearchPlace::TheAnimeGallery => "http://theanimegallery.iqdb.org",
            SearchPlace::Yandere => "http://yandere.iqdb.org",
            SearchPlace::Zerochan => "http://zerochan.iqdb.org",
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            SearchPlace::Iqdb => 0,
            SearchPlace::AnimePictures => 1,
            SearchPlace::Danbooru => 2,
            SearchPlace::E621 => 3,
            SearchPlace::Eshuushuu => 4,
            SearchPlace::Gelbooru => 5,
            SearchPlace::Konachan => 6,
            SearchPlace::Sankaku => 7,
            SearchPlace::TheAnimeGallery => 8,
            SearchPlace::Yandere => 9,
            SearchPlace::Zerochan => 10,
        }
    }

    pub fn from_i64(v: i64) -> Self {
        match v {
            1 => SearchPlace::AnimePictures,
            2 => SearchPlace::Danbooru,
            3 => SearchPlace::E621,
            4 => SearchPlace::Eshuushuu,
            5 => SearchPlace::Gelbooru,
            6 => SearchPlace::Konachan,
            7 => SearchPlace::Sankaku,
            8 => SearchPlace::TheAnimeGallery,
            9 => SearchPlace::Yandere,
            10 => SearchPlace::Zerochan,
            _ => SearchPlace::Iqdb,
        }
    }
}

/// A content-addressed image row. `path` is only meaningful at ingestion
/// time; thumbnails registered through the same table carry the thumbnail
/// file path.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub id: i64,
    pub checksum: String,
    pub width: i64,
    pub height: i64,
    pub path: Option<String>,
}

/// A remote post returned by a search place, unique by href.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRecord {
    pub id: i64,
    pub href: String,
    pub thumb: String,
    pub rating: Rating,
    pub img_alt: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
}

/// One search outcome: a (local image, remote match) relationship queried
/// at a particular place. Denormalized with its match row since every
/// caller needs both.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageMatchRecord {
    pub id: i64,
    pub relationship_id: i64,
    pub search_place: SearchPlace,
    pub force_gray: bool,
    pub status: MatchStatus,
    pub similarity: i64,
    pub match_result: MatchRecord,
}

/// A (name, namespace) pair; namespace is absent for general tags.
#[derive(Debug, Clone, PartialEq)]
pub struct TagRecord {
    pub id: i64,
    pub name: String,
    pub namespace: Option<String>,
}

impl TagRecord {
    /// Storage form: `namespace:name`, or the bare name when there is no
    /// namespace.
    pub fn full_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}:{}", ns, self.name),
            None => self.name.clone(),
        }
    }

    /// Presentation form: underscores in the scraped name shown as spaces.
    /// Storage always keeps the raw scraped form.
    pub fn display_name(&self) -> String {
        self.full_name().replace('_', " ")
    }
}

/// A thumbnail relationship row joined with its derived image.
#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailRecord {
    pub id: i64,
    pub original_id: i64,
    pub thumbnail: ImageRecord,
    pub width: i64,
    pub height: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_full_name_with_namespace() {
        let tag = TagRecord {
            id: 1,
            name: "hestia".to_string(),
            namespace: Some("character".to_string()),
        };
        assert_eq!(tag.full_name(), "character:hestia");
    }

    #[test]
    fn test_tag_full_name_without_namespace() {
        let tag = TagRecord {
            id: 1,
            name: "hestia".to_string(),
            namespace: None,
        };
        assert_eq!(tag.full_name(), "hestia");
    }

    #[test]
    fn test_tag_display_name_replaces_underscores() {
        let tag = TagRecord {
            id: 1,
            name: "hatsune_miku".to_string(),
            namespace: Some("character".to_string()),
        };
        assert_eq!(tag.display_name(), "character:hatsune miku");
        // raw form untouched
        assert_eq!(tag.name, "hatsune_miku");
    }

    #[test]
    fn test_rating_from_text() {
        assert_eq!(Rating::from_text("600×800 [Safe]"), Rating::Safe);
        assert_eq!(Rating::from_text("123×456 [Explicit]"), Rating::Explicit);
        assert_eq!(Rating::from_text("[Ero]"), Rating::Ero);
        assert_eq!(Rating::from_text("600×800"), Rating::Unknown);
    }

    #[test]
    fn test_enum_i64_round_trips() {
        for status in [
            MatchStatus::Unknown,
            MatchStatus::BestMatch,
            MatchStatus::PossibleMatch,
            MatchStatus::Other,
        ] {
            assert_eq!(MatchStatus::from_i64(status.as_i64()), status);
        }
        for place in [
            SearchPlace::Iqdb,
            SearchPlace::Danbooru,
            SearchPlace::Zerochan,
            SearchPlace::TheAnimeGallery,
        ] {
            assert_eq!(SearchPlace::from_i64(place.as_i64()), place);
        }
        for rating in [Rating::Unknown, Rating::Safe, Rating::Ero, Rating::Explicit] {
            assert_eq!(Rating::from_i64(rating.as_i64()), rating);
        }
    }
}
