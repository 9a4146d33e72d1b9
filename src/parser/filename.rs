use super::patterns::PATTERNS;
use crate::criteria::MediaType;
use chrono::NaiveDate;
use dashmap::DashMap;
use std::path::Path;

/// Parsed information from a media filename
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedName {
    /// Cleaned title for searching
    pub title: String,
    /// Original input (before cleaning)
    pub original: String,
    /// Media type guess derived from the markers found
    pub media_type: MediaType,
    /// Season number, if a season marker matched
    pub season: Option<u32>,
    /// Episode numbers; a range `E2-E4` parses into every member
    pub episodes: Vec<u32>,
    /// Release date; January 1st means only the year is known
    pub date: Option<NaiveDate>,
    /// Raw date string as matched in the input
    pub raw_date: String,
    /// Disk number from a standalone `D1`/`DISC1`/`DISK1` token
    pub disk: Option<u32>,
    /// Provider id from a `[tmdbid=...]` tag
    pub provider_id: Option<String>,
    /// Cut/edition marker ("Director's Cut", "Extended", ...)
    pub extra_info: Option<String>,
}

/// Parser configuration. Passed in explicitly so the allow/strip lists are
/// caller-controlled rather than ambient state.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Multi-word hyphenated phrases whose dashes survive the dash-to-space
    /// collapse (checked case-insensitively by substring).
    pub hyphen_allowlist: Vec<String>,
    /// Standalone tokens dropped from the cleaned title (resolutions,
    /// sources, codecs).
    pub strip_tokens: Vec<String>,
    /// Edition markers extracted into `extra_info`.
    pub edition_tags: Vec<String>,
    /// Remove colons during smart-trim.
    pub strip_colons: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            hyphen_allowlist: vec!["Spider-Man".to_string(), "Ant-Man".to_string()],
            strip_tokens: [
                "480p", "576p", "720p", "1080p", "2160p", "4k", "uhd", "hdr", "hdtv",
                "bluray", "bdrip", "brrip", "dvdrip", "webrip", "web-dl", "webdl",
                "remux", "x264", "x265", "h264", "h265", "hevc", "avc", "xvid",
                "aac", "ac3", "dts", "proper", "repack", "mkv", "mp4", "avi",
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
            edition_tags: [
                "Director's Cut",
                "Directors Cut",
                "Extended Edition",
                "Extended Cut",
                "Extended",
                "Unrated",
                "Remastered",
                "Theatrical Cut",
                "Special Edition",
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
            strip_colons: true,
        }
    }
}

/// Stateless filename parser with an internal memo table.
///
/// The same raw string runs through the full regex cascade only once per
/// `(input, force_movie)` pair.
pub struct NameParser {
    config: ParserConfig,
    memo: DashMap<(String, bool), ParsedName>,
}

impl NameParser {
    pub fn new(config: ParserConfig) -> Self {
        Self {
            config,
            memo: DashMap::new(),
        }
    }

    /// Parse a file path's stem.
    pub fn parse_path(&self, path: &Path, force_movie: bool) -> ParsedName {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
        self.parse(stem, force_movie)
    }

    /// Parse a raw name. `force_movie` turns an otherwise `Unknown` guess
    /// into `Movie`.
    pub fn parse(&self, raw: &str, force_movie: bool) -> ParsedName {
        let key = (raw.to_string(), force_movie);
        if let Some(hit) = self.memo.get(&key) {
            return hit.clone();
        }

        let parsed = self.parse_uncached(raw, force_movie);
        self.memo.insert(key, parsed.clone());
        parsed
    }

    pub fn clear_memo(&self) {
        self.memo.clear();
    }

    fn parse_uncached(&self, raw: &str, force_movie: bool) -> ParsedName {
        let mut result = ParsedName {
            original: raw.to_string(),
            ..Default::default()
        };

        if raw.is_empty() {
            return result;
        }

        let patterns = &*PATTERNS;
        // Byte spans of matched markers, stripped from the title afterward.
        let mut spans: Vec<(usize, usize)> = Vec::new();

        // 1. Season marker: S<digits> or SEASON <digits>.
        if let Some(caps) = patterns.season_marker.captures(raw) {
            result.season = caps.get(1).and_then(|m| m.as_str().parse().ok());
            let m = caps.get(0).expect("match group 0");
            spans.push((m.start(), m.end()));
        }

        // 2. Episode marker: range form wins over a single E<digits>.
        if let Some(caps) = patterns.episode_range.captures(raw) {
            let from: Option<u32> = caps.get(1).and_then(|m| m.as_str().parse().ok());
            let to: Option<u32> = caps.get(2).and_then(|m| m.as_str().parse().ok());
            if let (Some(from), Some(to)) = (from, to)
                && from <= to
            {
                result.episodes = (from..=to).collect();
            }
            let m = caps.get(0).expect("match group 0");
            spans.push((m.start(), m.end()));
        } else if let Some(caps) = patterns.episode_single.captures(raw) {
            if let Some(ep) = caps.get(1).and_then(|m| m.as_str().parse().ok()) {
                result.episodes = vec![ep];
            }
            let m = caps.get(0).expect("match group 0");
            spans.push((m.start(), m.end()));
        }

        // 3. Compact <season>x<episode> form, applied afterward and allowed
        //    to override both fields. Preserved order, not re-derived.
        if let Some(caps) = patterns.compact.captures(raw) {
            let season: Option<u32> = caps.get(1).and_then(|m| m.as_str().parse().ok());
            let episode: Option<u32> = caps.get(2).and_then(|m| m.as_str().parse().ok());
            if let (Some(season), Some(episode)) = (season, episode) {
                result.season = Some(season);
                result.episodes = vec![episode];
            }
            let m = caps.get(0).expect("match group 0");
            spans.push((m.start(), m.end()));
        }

        // 4. Trailing " - Season <n>" suffix overrides the season only.
        if let Some(caps) = patterns.trailing_season.captures(raw) {
            if let Some(season) = caps.get(1).and_then(|m| m.as_str().parse().ok()) {
                result.season = Some(season);
            }
            let m = caps.get(0).expect("match group 0");
            spans.push((m.start(), m.end()));
        }

        // 5. Media type guess from the markers found.
        result.media_type = if !result.episodes.is_empty() {
            MediaType::TvEpisode
        } else if result.season.is_some() {
            MediaType::TvSeason
        } else if force_movie {
            MediaType::Movie
        } else {
            MediaType::Unknown
        };

        let mut title = strip_spans(raw, &mut spans);

        // Subordinate extractions, each removing its span so later steps see
        // a cleaner string.
        result.disk = self.extract_disk(&mut title);
        (result.date, result.raw_date) = self.extract_date(&mut title);
        result.provider_id = self.extract_provider_id(&mut title);
        result.extra_info = self.extract_edition(&mut title);

        result.title = self.smart_trim(&title);

        result
    }

    fn extract_disk(&self, title: &mut String) -> Option<u32> {
        let caps = PATTERNS.disk.captures(title)?;
        let disk = caps.get(1).and_then(|m| m.as_str().parse().ok());
        let m = caps.get(0).expect("match group 0");
        let (start, end) = (m.start(), m.end());
        title.replace_range(start..end, " ");
        disk
    }

    fn extract_date(&self, title: &mut String) -> (Option<NaiveDate>, String) {
        // Parenthesized years are preferred; a bare token must look like a
        // real year and not sit next to other digits.
        if let Some(caps) = PATTERNS.year_in_parens.captures(title) {
            let raw = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
            if let Some(year) = expand_year(&raw) {
                let m = caps.get(0).expect("match group 0");
                let (start, end) = (m.start(), m.end());
                title.replace_range(start..end, " ");
                return (NaiveDate::from_ymd_opt(year, 1, 1), raw);
            }
        }

        if let Some(caps) = PATTERNS.year_token.captures(title) {
            let m = caps.get(1).expect("year capture");
            let raw = m.as_str().to_string();
            if let Ok(year) = raw.parse::<i32>()
                && year >= 1900
            {
                let (start, end) = (m.start(), m.end());
                title.replace_range(start..end, " ");
                return (NaiveDate::from_ymd_opt(year, 1, 1), raw);
            }
        }

        (None, String::new())
    }

    fn extract_provider_id(&self, title: &mut String) -> Option<String> {
        let caps = PATTERNS.provider_id.captures(title)?;
        let id = caps.get(1).map(|m| m.as_str().to_string());
        let m = caps.get(0).expect("match group 0");
        let (start, end) = (m.start(), m.end());
        title.replace_range(start..end, " ");
        id
    }

    fn extract_edition(&self, title: &mut String) -> Option<String> {
        let lower = title.to_lowercase();
        for tag in &self.config.edition_tags {
            if let Some(pos) = lower.find(&tag.to_lowercase()) {
                let end = pos + tag.len();
                let found = title[pos..end].to_string();
                title.replace_range(pos..end, " ");
                return Some(found);
            }
        }
        None
    }

    /// Separator cleanup: leading/trailing `. _ -` removed, separator runs
    /// collapsed to single spaces, colons optionally dropped. Allow-listed
    /// hyphenated phrases keep their dashes.
    fn smart_trim(&self, title: &str) -> String {
        const PLACEHOLDER: char = '\u{1}';

        let mut work = title.to_string();

        // Protect allow-listed phrases from the dash-to-space collapse.
        let lower = work.to_lowercase();
        let mut protected: Vec<usize> = Vec::new();
        for phrase in &self.config.hyphen_allowlist {
            let needle = phrase.to_lowercase();
            let mut offset = 0;
            while let Some(pos) = lower[offset..].find(&needle) {
                let start = offset + pos;
                for (i, c) in phrase.char_indices() {
                    if c == '-' {
                        protected.push(start + i);
                    }
                }
                offset = start + needle.len();
            }
        }
        if !protected.is_empty() {
            let mut bytes: Vec<char> = work.chars().collect();
            // Allow-list phrases are ASCII; byte offset == char offset only
            // holds when the prefix is ASCII, so guard on that.
            for idx in protected {
                if work.is_char_boundary(idx) && work[..idx].is_ascii() {
                    bytes[idx] = PLACEHOLDER;
                }
            }
            work = bytes.into_iter().collect();
        }

        let mut cleaned: String = work
            .chars()
            .map(|c| match c {
                '.' | '_' | '-' => ' ',
                PLACEHOLDER => '-',
                c => c,
            })
            .collect();

        if self.config.strip_colons {
            cleaned = cleaned.replace(':', "");
        }

        let strip = &self.config.strip_tokens;
        cleaned
            .split_whitespace()
            .filter(|token| !strip.iter().any(|s| s.eq_ignore_ascii_case(token)))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for NameParser {
    fn default() -> Self {
        Self::new(ParserConfig::default())
    }
}

/// Remove matched spans from the input, highest position first, skipping
/// spans that overlap one already removed.
fn strip_spans(raw: &str, spans: &mut Vec<(usize, usize)>) -> String {
    spans.sort_by(|a, b| b.0.cmp(&a.0));

    let mut out = raw.to_string();
    let mut last_start = usize::MAX;
    for &(start, end) in spans.iter() {
        if end > last_start {
            continue;
        }
        out.replace_range(start..end, " ");
        last_start = start;
    }
    out
}

/// Expand a 2- or 4-digit year string. Years before 1900 are false
/// positives (misread resolutions and the like) and are discarded.
fn expand_year(raw: &str) -> Option<i32> {
    match raw.len() {
        4 => {
            let year: i32 = raw.parse().ok()?;
            (year >= 1900).then_some(year)
        }
        2 => {
            let yy: i32 = raw.parse().ok()?;
            Some(if yy < 40 { 2000 + yy } else { 1900 + yy })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> NameParser {
        NameParser::default()
    }

    #[test]
    fn test_parse_season_episode() {
        let info = parser().parse("Show.Name.S02E05", false);
        assert_eq!(info.title, "Show Name");
        assert_eq!(info.season, Some(2));
        assert_eq!(info.episodes, vec![5]);
        assert_eq!(info.media_type, MediaType::TvEpisode);
    }

    #[test]
    fn test_parse_episode_range() {
        let info = parser().parse("Show.S1E2-E4", false);
        assert_eq!(info.season, Some(1));
        assert_eq!(info.episodes, vec![2, 3, 4]);
    }

    #[test]
    fn test_parse_season_word_form() {
        let info = parser().parse("Some Show Season 3", false);
        assert_eq!(info.season, Some(3));
        assert_eq!(info.title, "Some Show");
        assert_eq!(info.media_type, MediaType::TvSeason);
    }

    #[test]
    fn test_parse_compact_form() {
        let info = parser().parse("Friends.2x05", false);
        assert_eq!(info.season, Some(2));
        assert_eq!(info.episodes, vec![5]);
        assert!(info.title.to_lowercase().contains("friends"));
    }

    #[test]
    fn test_compact_form_overrides_markers() {
        // Both forms present: the compact pattern runs last and wins.
        let info = parser().parse("Show.S02E05.3x07", false);
        assert_eq!(info.season, Some(3));
        assert_eq!(info.episodes, vec![7]);
    }

    #[test]
    fn test_trailing_season_suffix() {
        let info = parser().parse("The Wire - Season 4", false);
        assert_eq!(info.season, Some(4));
        assert_eq!(info.title, "The Wire");
    }

    #[test]
    fn test_parse_movie_year() {
        let info = parser().parse("Dune.2021.1080p", false);
        assert_eq!(info.title, "Dune");
        assert_eq!(info.date, NaiveDate::from_ymd_opt(2021, 1, 1));
        assert_eq!(info.raw_date, "2021");
        assert!(info.episodes.is_empty());
    }

    #[test]
    fn test_parse_year_in_parens_preferred() {
        let info = parser().parse("Blade Runner (1982) 2019", false);
        assert_eq!(info.raw_date, "1982");
        assert_eq!(info.date, NaiveDate::from_ymd_opt(1982, 1, 1));
    }

    #[test]
    fn test_two_digit_year_expansion() {
        let info = parser().parse("The Matrix (99)", false);
        assert_eq!(info.date, NaiveDate::from_ymd_opt(1999, 1, 1));
    }

    #[test]
    fn test_year_not_adjacent_to_digits() {
        // "1080" inside "1080p" fails the year shape; "72018" is adjacent
        // digits and must not yield 2018.
        let info = parser().parse("Some.Film.72018.1080p", false);
        assert!(info.date.is_none());
    }

    #[test]
    fn test_parse_disk_number() {
        let info = parser().parse("Big Movie D2", false);
        assert_eq!(info.disk, Some(2));
        assert_eq!(info.title, "Big Movie");

        let info = parser().parse("Big Movie DISC 1", false);
        // "DISC 1" needs the separator-attached form.
        assert_eq!(parser().parse("Big Movie DISC1", false).disk, Some(1));
        assert!(info.title.starts_with("Big Movie"));
    }

    #[test]
    fn test_parse_provider_id_tag() {
        let info = parser().parse("Whatever [tmdbid=438631]", false);
        assert_eq!(info.provider_id.as_deref(), Some("438631"));
        assert_eq!(info.title, "Whatever");
    }

    #[test]
    fn test_parse_edition_tag() {
        let info = parser().parse("Aliens.1986.Director's Cut", false);
        assert_eq!(info.extra_info.as_deref(), Some("Director's Cut"));
        assert_eq!(info.title, "Aliens");
    }

    #[test]
    fn test_empty_input() {
        let info = parser().parse("", false);
        assert!(info.title.is_empty());
        assert_eq!(info.media_type, MediaType::Unknown);
        assert!(info.episodes.is_empty());
        assert!(info.date.is_none());
    }

    #[test]
    fn test_force_movie() {
        let info = parser().parse("Dune.2021", true);
        assert_eq!(info.media_type, MediaType::Movie);

        // Markers beat the forced type.
        let info = parser().parse("Show.S01E01", true);
        assert_eq!(info.media_type, MediaType::TvEpisode);
    }

    #[test]
    fn test_hyphen_allowlist_protects_phrase() {
        let info = parser().parse("Spider-Man.Far.From.Home.2019", false);
        assert_eq!(info.title, "Spider-Man Far From Home");
    }

    #[test]
    fn test_strip_tokens_removed() {
        let info = parser().parse("The.Matrix.1999.1080p.BluRay.x264", false);
        assert_eq!(info.title, "The Matrix");
    }

    #[test]
    fn test_colon_stripped() {
        let info = parser().parse("Alien: Covenant 2017", false);
        assert_eq!(info.title, "Alien Covenant");
    }

    #[test]
    fn test_parse_idempotent_on_clean_title() {
        let p = parser();
        let first = p.parse("Breaking.Bad.S02E05", false);
        let second = p.parse(&first.title, false);
        assert_eq!(second.title, first.title);
        assert!(second.episodes.is_empty());
        assert!(second.date.is_none());
    }

    #[test]
    fn test_memo_returns_same_result() {
        let p = parser();
        let a = p.parse("Show.Name.S02E05", false);
        let b = p.parse("Show.Name.S02E05", false);
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_path_uses_stem() {
        let p = parser();
        let info = p.parse_path(Path::new("/media/in/Show.Name.S02E05.mkv"), false);
        assert_eq!(info.title, "Show Name");
        assert_eq!(info.season, Some(2));
    }
}
