use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::parser::ParsedName;
use crate::tree::CandidateData;

/// Media type classification shared between criteria and candidates.
///
/// `NotFound` and `DeleteMarker` are sentinel types carried by reserved
/// result entries, never by real provider data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    #[default]
    Unknown,
    Movie,
    TvShow,
    TvSeason,
    TvEpisode,
    NotFound,
    DeleteMarker,
}

impl MediaType {
    /// True for any of the TV node kinds.
    pub fn is_tv(&self) -> bool {
        matches!(self, Self::TvShow | Self::TvSeason | Self::TvEpisode)
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self, Self::NotFound | Self::DeleteMarker)
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Movie => write!(f, "movie"),
            Self::TvShow => write!(f, "tv show"),
            Self::TvSeason => write!(f, "tv season"),
            Self::TvEpisode => write!(f, "tv episode"),
            Self::NotFound => write!(f, "not found"),
            Self::DeleteMarker => write!(f, "delete marker"),
        }
    }
}

/// Snapshot of a previously accepted candidate, used to seed a follow-up
/// search. Fields present here override whatever the parser extracted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeedFields {
    pub title: Option<String>,
    pub season: Option<u32>,
    pub episodes: Vec<u32>,
    pub provider_id: Option<String>,
    pub show_id: Option<String>,
    pub media_type: Option<MediaType>,
}

impl SeedFields {
    /// Capture seed fields from a chosen candidate. Sentinel candidates
    /// contribute nothing.
    pub fn from_candidate(data: &CandidateData) -> Self {
        if data.is_sentinel() {
            return Self::default();
        }
        Self {
            title: (!data.title.is_empty()).then(|| data.title.clone()),
            season: data.season_number(),
            episodes: data.all_episode_numbers(),
            provider_id: data.id.clone(),
            show_id: data.show_id.clone(),
            media_type: Some(data.media_type),
        }
    }
}

/// Structured search input derived from a filename.
///
/// Constructed once per path, then narrowed in place (page cursor, season or
/// episode edits) until a result is accepted or the batch item is skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchCriteria {
    /// Name used to query the provider.
    pub search_name: String,
    /// Title after separator cleanup, used for candidate comparison.
    pub normalized_title: String,
    /// Release date extracted from the name, if any.
    pub release_date: Option<NaiveDate>,
    /// Raw date string as it appeared in the name.
    pub raw_date: String,
    /// Pagination cursor for the provider search.
    pub page: Option<u32>,
    pub season: Option<u32>,
    /// Ordered episode numbers (a range parses into every member).
    pub episodes: Vec<u32>,
    pub disk: Option<u32>,
    /// Explicit provider id from a `[tmdbid=...]` tag or a seed.
    pub provider_id: Option<String>,
    pub media_type: MediaType,
    /// Whether `media_type` was inferred rather than set by the caller.
    pub type_auto_determined: bool,
    /// Exact-match-only mode: token order and year+month must agree.
    pub exact_match: bool,
    /// Search by provider id instead of by name.
    pub search_by_id: bool,
    /// Cut/edition marker ("Director's Cut" and friends).
    pub extra_info: Option<String>,
    /// Defaults taken from a previously accepted candidate.
    pub seed: Option<SeedFields>,
}

impl SearchCriteria {
    /// Build criteria from parser output. Seed fields, when attached later
    /// via [`SearchCriteria::apply_seed`], override these values.
    pub fn from_parsed(parsed: &ParsedName) -> Self {
        Self {
            search_name: parsed.title.clone(),
            normalized_title: parsed.title.clone(),
            release_date: parsed.date,
            raw_date: parsed.raw_date.clone(),
            page: None,
            season: parsed.season,
            episodes: parsed.episodes.clone(),
            disk: parsed.disk,
            provider_id: parsed.provider_id.clone(),
            media_type: parsed.media_type,
            type_auto_determined: true,
            exact_match: false,
            search_by_id: parsed.provider_id.is_some(),
            extra_info: parsed.extra_info.clone(),
            seed: None,
        }
    }

    /// Copy criteria from an accepted candidate, for follow-up searches.
    pub fn from_candidate(data: &CandidateData) -> Self {
        let seed = SeedFields::from_candidate(data);
        let mut criteria = Self {
            search_name: seed.title.clone().unwrap_or_default(),
            normalized_title: seed.title.clone().unwrap_or_default(),
            media_type: seed.media_type.unwrap_or_default(),
            type_auto_determined: false,
            ..Self::default()
        };
        criteria.apply_seed(seed);
        criteria
    }

    /// Overlay seed fields onto this criteria. Every field the seed resolved
    /// wins over the parsed value.
    pub fn apply_seed(&mut self, seed: SeedFields) {
        if let Some(ref title) = seed.title {
            self.search_name = title.clone();
            self.normalized_title = title.clone();
        }
        if seed.season.is_some() {
            self.season = seed.season;
        }
        if !seed.episodes.is_empty() {
            self.episodes = seed.episodes.clone();
        }
        if seed.provider_id.is_some() {
            self.provider_id = seed.provider_id.clone();
            self.search_by_id = true;
        }
        if let Some(media_type) = seed.media_type {
            self.media_type = media_type;
            self.type_auto_determined = false;
        }
        self.seed = Some(seed);
    }

    /// Force the media type, e.g. from the caller's "treat as TV" flag.
    pub fn set_media_type(&mut self, media_type: MediaType) {
        self.media_type = media_type;
        self.type_auto_determined = false;
    }

    /// Advance the pagination cursor.
    pub fn set_page(&mut self, page: u32) {
        self.page = Some(page);
    }

    pub fn has_id(&self) -> bool {
        self.provider_id.as_deref().is_some_and(|id| !id.is_empty())
    }

    pub fn has_date(&self) -> bool {
        self.release_date.is_some()
    }

    /// Year-only precision marker: a date of January 1st means "only the
    /// year is known".
    pub fn is_year_only(&self) -> bool {
        self.release_date
            .is_some_and(|d| d.month() == 1 && d.day() == 1)
    }

    pub fn release_year(&self) -> Option<i32> {
        self.release_date.map(|d| d.year())
    }

    /// Whether the criteria targets a specific season or episode.
    pub fn wants_episode(&self) -> bool {
        self.season.is_some() || !self.episodes.is_empty()
    }

    /// Provider query: search name split on whitespace and dots, rejoined
    /// with `+`.
    pub fn query_string(&self) -> String {
        self.search_name
            .split(|c: char| c.is_whitespace() || c == '.')
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("+")
    }

    /// Lowercased tokens of the search name, used by name matching.
    pub fn name_tokens(&self) -> Vec<String> {
        self.search_name
            .split(|c: char| c.is_whitespace() || c == '.')
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_string_joins_tokens() {
        let criteria = SearchCriteria {
            search_name: "The.Lord of the.Rings".to_string(),
            ..Default::default()
        };
        assert_eq!(criteria.query_string(), "The+Lord+of+the+Rings");
    }

    #[test]
    fn test_year_only_marker() {
        let criteria = SearchCriteria {
            release_date: NaiveDate::from_ymd_opt(2021, 1, 1),
            ..Default::default()
        };
        assert!(criteria.is_year_only());

        let criteria = SearchCriteria {
            release_date: NaiveDate::from_ymd_opt(2021, 9, 15),
            ..Default::default()
        };
        assert!(!criteria.is_year_only());
    }

    #[test]
    fn test_seed_overrides_parsed_fields() {
        let mut criteria = SearchCriteria {
            search_name: "parsed title".to_string(),
            season: Some(1),
            ..Default::default()
        };

        criteria.apply_seed(SeedFields {
            title: Some("Seeded Title".to_string()),
            season: Some(3),
            provider_id: Some("42".to_string()),
            media_type: Some(MediaType::TvShow),
            ..Default::default()
        });

        assert_eq!(criteria.search_name, "Seeded Title");
        assert_eq!(criteria.season, Some(3));
        assert!(criteria.search_by_id);
        assert_eq!(criteria.media_type, MediaType::TvShow);
        assert!(!criteria.type_auto_determined);
    }

    #[test]
    fn test_media_type_flags() {
        assert!(MediaType::TvSeason.is_tv());
        assert!(!MediaType::Movie.is_tv());
        assert!(MediaType::NotFound.is_sentinel());
        assert!(!MediaType::TvShow.is_sentinel());
    }
}
