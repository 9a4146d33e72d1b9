use regex::Regex;
use std::sync::LazyLock;

/// Pre-compiled regex patterns for filename parsing.
///
/// The cascade order in `filename.rs` is load-bearing: season marker first,
/// then episode marker, then the compact `NxE` form (which may override
/// both), then the trailing `- Season N` suffix (season only). Matching
/// behavior downstream depends on this exact precedence.
pub struct Patterns {
    // Season/episode markers
    pub season_marker: Regex,   // S01, SEASON 1
    pub episode_range: Regex,   // E02-E04
    pub episode_single: Regex,  // E05
    pub compact: Regex,         // 2x05
    pub trailing_season: Regex, // "... - Season 2"

    // Subordinate extractions
    pub disk: Regex,         // D1, DISC2, DISK 3
    pub year_in_parens: Regex, // (2021), (99)
    pub year_token: Regex,     // bare 1900-2099, not adjacent to digits
    pub provider_id: Regex,    // [tmdbid=438631]
}

impl Patterns {
    pub fn new() -> Self {
        Self {
            season_marker: Regex::new(r"(?i)\b(?:SEASON[ ._-]*|S)(\d{1,3})")
                .expect("Invalid season_marker regex"),
            episode_range: Regex::new(r"(?i)E(\d{1,4})[ ._-]*-[ ._-]*E(\d{1,4})")
                .expect("Invalid episode_range regex"),
            episode_single: Regex::new(r"(?i)E(\d{1,4})")
                .expect("Invalid episode_single regex"),
            compact: Regex::new(r"(?i)\b(\d{1,2})x(\d{1,4})\b")
                .expect("Invalid compact regex"),
            trailing_season: Regex::new(r"(?i)[ ._-]+season[ ._-]*(\d{1,3})\s*$")
                .expect("Invalid trailing_season regex"),

            disk: Regex::new(r"(?i)(?:^|[\s._-])(?:DISC|DISK|D)[ ._]?(\d{1,2})(?:[\s._-]|$)")
                .expect("Invalid disk regex"),
            year_in_parens: Regex::new(r"\((\d{4}|\d{2})\)")
                .expect("Invalid year_in_parens regex"),
            year_token: Regex::new(r"(?:^|[^0-9])((?:19|20)\d{2})(?:[^0-9]|$)")
                .expect("Invalid year_token regex"),
            provider_id: Regex::new(r"(?i)\[tmdbid=(\d+)\]")
                .expect("Invalid provider_id regex"),
        }
    }
}

impl Default for Patterns {
    fn default() -> Self {
        Self::new()
    }
}

/// Global singleton for patterns
pub static PATTERNS: LazyLock<Patterns> = LazyLock::new(Patterns::new);
