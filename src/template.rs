use regex::Regex;

use crate::criteria::MediaType;
use crate::tree::{NodeId, ResultTree};
use crate::{Error, Result};

/// Field values a template can reference, resolved from a chosen candidate.
///
/// Dates use the tree's inheritance rules, so an episode node renders its
/// show's first-air year even when only the show node carries it.
#[derive(Debug, Clone, Default)]
pub struct ResultView {
    pub title: String,
    pub year: String,
    pub show_year: String,
    pub season_year: String,
    pub episode_year: String,
    pub tmdbid: String,
    pub show_tmdbid: String,
    pub season: Option<u32>,
    /// Pre-formatted multi-episode label (`E05`, `E01-E03`).
    pub episode: String,
    pub episode_title: String,
    pub extra_info: String,
}

impl ResultView {
    pub fn from_tree(tree: &ResultTree, id: NodeId) -> Self {
        let data = tree.get(id);
        let show_node = tree.tv_show_info(id);
        let show = tree.get(show_node);

        let year_str = |y: Option<i32>| y.map(|y| y.to_string()).unwrap_or_default();

        let show_year = year_str(tree.show_first_air_date(id).year());
        let year = if data.media_type == MediaType::Movie {
            year_str(tree.movie_release_date(id).year())
        } else {
            show_year.clone()
        };

        // Episode nodes carry the episode name as their own title; the show
        // title comes from the owning show node.
        let (title, episode_title) = if data.media_type.is_tv() {
            let episode_title = if data.media_type == MediaType::TvEpisode {
                if data.subtitle.is_empty() {
                    data.title.clone()
                } else {
                    data.subtitle.clone()
                }
            } else {
                data.subtitle.clone()
            };
            (show.title.clone(), episode_title)
        } else {
            (data.title.clone(), data.subtitle.clone())
        };

        let season = data.season.or_else(|| {
            tree.parent(id)
                .and_then(|parent| tree.get(parent).season)
        });

        Self {
            title,
            year,
            show_year,
            season_year: year_str(tree.season_start_date(id).year()),
            episode_year: year_str(tree.episode_air_date(id).year()),
            tmdbid: data.id.clone().unwrap_or_default(),
            show_tmdbid: show.id.clone().unwrap_or_default(),
            season,
            episode: data.episode_label(),
            episode_title,
            extra_info: data.extra_info.clone().unwrap_or_default(),
        }
    }

    fn field(&self, name: &str, is_directory: bool) -> Option<String> {
        let value = match name {
            "title" => self.title.clone(),
            "year" => self.year.clone(),
            "show_year" => self.show_year.clone(),
            "season_year" => self.season_year.clone(),
            "episode_year" => self.episode_year.clone(),
            "tmdbid" => self.tmdbid.clone(),
            "show_tmdbid" => self.show_tmdbid.clone(),
            "season" => match self.season {
                // Directories keep the natural width, files pad to two.
                Some(s) if is_directory => format!("{s:01}"),
                Some(s) => format!("{s:02}"),
                None => String::new(),
            },
            "episode" => self.episode.clone(),
            "episode_title" => self.episode_title.clone(),
            "extra_info" => self.extra_info.clone(),
            _ => return None,
        };
        Some(value)
    }
}

/// Template substitution and validation over a resolved result.
///
/// Patterns contain literal text, `<field>` placeholders, and optional
/// segments `{literal}:<field>` whose literal renders only when the field is
/// non-empty.
pub struct TemplateEngine;

impl TemplateEngine {
    /// Render `pattern` for the given result. Non-directory output appends
    /// `extension` when provided.
    pub fn render(
        pattern: &str,
        view: &ResultView,
        is_directory: bool,
        extension: Option<&str>,
    ) -> String {
        let rendered = render_fragment(pattern, view, is_directory);
        let mut out = sanitize(&rendered, is_directory);

        if !is_directory
            && let Some(ext) = extension
            && !ext.is_empty()
        {
            out.push('.');
            out.push_str(ext);
        }
        out
    }

    /// Inverse mode: convert the same template syntax into a regex matching
    /// names that already conform to the pattern. Optional segments are
    /// dropped when `remove_optional` is set, otherwise made optional in the
    /// regex itself. `is_directory` must match the render-side flag so
    /// literal text is cleaned up the same way on both sides.
    pub fn validator_regex(
        pattern: &str,
        remove_optional: bool,
        is_directory: bool,
    ) -> Result<Regex> {
        let mut expr = String::from("^");
        build_validator(pattern, remove_optional, is_directory, &mut expr)?;
        // Tolerate a file extension on on-disk names.
        expr.push_str(r"(?:\.[A-Za-z0-9]+)?$");
        Regex::new(&expr).map_err(|e| Error::Parse(format!("invalid pattern regex: {e}")))
    }
}

/// Substitute placeholders and optional segments; the literal text of an
/// optional segment is rendered recursively.
fn render_fragment(fragment: &str, view: &ResultView, is_directory: bool) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut rest = fragment;

    while !rest.is_empty() {
        if let Some(stripped) = rest.strip_prefix('{') {
            if let Some((inner, field, tail)) = split_optional(stripped) {
                let value = view.field(field, is_directory).unwrap_or_default();
                if !value.is_empty() {
                    out.push_str(&render_fragment(inner, view, is_directory));
                }
                rest = tail;
                continue;
            }
            out.push('{');
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix('<') {
            if let Some(end) = stripped.find('>') {
                let name = &stripped[..end];
                match view.field(name, is_directory) {
                    Some(value) => out.push_str(&value),
                    // Unknown placeholders pass through unchanged.
                    None => {
                        out.push('<');
                        out.push_str(name);
                        out.push('>');
                    }
                }
                rest = &stripped[end + 1..];
                continue;
            }
            out.push('<');
            rest = stripped;
        } else {
            let next = rest
                .find(['{', '<'])
                .unwrap_or(rest.len());
            out.push_str(&rest[..next]);
            rest = &rest[next..];
        }
    }

    out
}

/// Split `literal}:<field>rest` (already past the opening brace) into the
/// literal, the controlling field name and the remainder. Braces nest.
fn split_optional(s: &str) -> Option<(&str, &str, &str)> {
    let mut depth = 1usize;
    let mut close = None;
    for (i, c) in s.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }
    let close = close?;
    let after = &s[close + 1..];
    let after = after.strip_prefix(":<")?;
    let end = after.find('>')?;
    Some((&s[..close], &after[..end], &after[end + 1..]))
}

fn build_validator(
    fragment: &str,
    remove_optional: bool,
    is_directory: bool,
    out: &mut String,
) -> Result<()> {
    let mut rest = fragment;

    while !rest.is_empty() {
        if let Some(stripped) = rest.strip_prefix('{') {
            if let Some((inner, _field, tail)) = split_optional(stripped) {
                if !remove_optional {
                    out.push_str("(?:");
                    build_validator(inner, remove_optional, is_directory, out)?;
                    out.push_str(")?");
                }
                rest = tail;
                continue;
            }
            out.push_str(&regex::escape("{"));
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix('<') {
            if let Some(end) = stripped.find('>') {
                out.push_str(field_class(&stripped[..end])?);
                rest = &stripped[end + 1..];
                continue;
            }
            out.push_str(&regex::escape("<"));
            rest = stripped;
        } else {
            let next = rest.find(['{', '<']).unwrap_or(rest.len());
            // Literal text goes through the same character cleanup as
            // rendered output, so the round trip holds.
            out.push_str(&regex::escape(&sanitize(&rest[..next], is_directory)));
            rest = &rest[next..];
        }
    }

    Ok(())
}

fn field_class(name: &str) -> Result<&'static str> {
    Ok(match name {
        "year" | "show_year" | "season_year" | "episode_year" => r"\d{2,4}",
        "tmdbid" | "show_tmdbid" => r"\d+",
        "season" => r"\d{1,2}",
        "episode" => r"[Ee]\d{1,4}(?:[-,] ?[Ee]\d{1,4})*",
        "title" | "episode_title" | "extra_info" => r".*",
        other => return Err(Error::Parse(format!("unknown template field: {other}"))),
    })
}

/// Output cleanup: strip a leading drive/path prefix, collapse `HH:MM`
/// time-like substrings, turn a bare `" : "` into `"- "`, then drop
/// filesystem-illegal characters (`/` and `\` only for files, since
/// directory patterns may span path components).
fn sanitize(s: &str, is_directory: bool) -> String {
    static DRIVE_PREFIX: std::sync::LazyLock<Regex> = std::sync::LazyLock::new(|| {
        Regex::new(r"^(?:[A-Za-z]:)?[/\\]+").expect("Invalid drive prefix regex")
    });
    static TIME_LIKE: std::sync::LazyLock<Regex> = std::sync::LazyLock::new(|| {
        Regex::new(r"(\d{2}):(\d{2})").expect("Invalid time regex")
    });

    let mut out = DRIVE_PREFIX.replace(s, "").to_string();
    out = TIME_LIKE.replace_all(&out, "$1$2").to_string();
    out = out.replace(" : ", "- ");

    out.chars()
        .filter(|c| {
            !matches!(c, ':' | '<' | '>' | '"' | '|' | '?' | '*')
                && (is_directory || !matches!(c, '/' | '\\'))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{CandidateData, DateField};

    fn movie_view() -> ResultView {
        ResultView {
            title: "Dune".to_string(),
            year: "2021".to_string(),
            tmdbid: "438631".to_string(),
            ..Default::default()
        }
    }

    fn episode_view() -> ResultView {
        ResultView {
            title: "Show Name".to_string(),
            year: "2008".to_string(),
            show_year: "2008".to_string(),
            season_year: "2009".to_string(),
            episode_year: "2009".to_string(),
            tmdbid: "5001".to_string(),
            show_tmdbid: "1396".to_string(),
            season: Some(2),
            episode: "E05".to_string(),
            episode_title: "The One Episode".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_render_movie_pattern() {
        let out = TemplateEngine::render("<title> (<year>)", &movie_view(), false, Some("mkv"));
        assert_eq!(out, "Dune (2021).mkv");
    }

    #[test]
    fn test_render_tv_file_pattern() {
        let out = TemplateEngine::render(
            "<title> - S<season><episode> - <episode_title>",
            &episode_view(),
            false,
            Some("mkv"),
        );
        assert_eq!(out, "Show Name - S02E05 - The One Episode.mkv");
    }

    #[test]
    fn test_season_padding_differs_for_directories() {
        let view = episode_view();
        let dir = TemplateEngine::render("Season <season>", &view, true, None);
        assert_eq!(dir, "Season 2");

        let file = TemplateEngine::render("S<season>", &view, false, None);
        assert_eq!(file, "S02");
    }

    #[test]
    fn test_optional_segment_renders_when_set() {
        let out = TemplateEngine::render("<title>{ (<year>)}:<year>", &movie_view(), true, None);
        assert_eq!(out, "Dune (2021)");
    }

    #[test]
    fn test_optional_segment_skipped_when_empty() {
        let mut view = movie_view();
        view.year = String::new();
        let out = TemplateEngine::render("<title>{ (<year>)}:<year>", &view, true, None);
        assert_eq!(out, "Dune");
    }

    #[test]
    fn test_optional_segment_nested() {
        let out = TemplateEngine::render(
            "<title>{ [<tmdbid>{ y<year>}:<year>]}:<tmdbid>",
            &movie_view(),
            true,
            None,
        );
        assert_eq!(out, "Dune [438631 y2021]");
    }

    #[test]
    fn test_sanitize_illegal_characters() {
        let mut view = movie_view();
        view.title = "Dune: Part <One>?".to_string();
        let out = TemplateEngine::render("<title>", &view, false, None);
        assert_eq!(out, "Dune Part One");
    }

    #[test]
    fn test_sanitize_time_like_and_colon_forms() {
        let mut view = movie_view();
        view.title = "News at 10:30".to_string();
        let out = TemplateEngine::render("<title>", &view, false, None);
        assert_eq!(out, "News at 1030");

        view.title = "Alien : Covenant".to_string();
        let out = TemplateEngine::render("<title>", &view, false, None);
        assert_eq!(out, "Alien- Covenant");
    }

    #[test]
    fn test_sanitize_strips_drive_prefix() {
        let mut view = movie_view();
        view.title = "Dune".to_string();
        let out = TemplateEngine::render("C:\\<title>", &view, false, None);
        assert_eq!(out, "Dune");
    }

    #[test]
    fn test_slashes_kept_for_directories_only() {
        let view = movie_view();
        let dir = TemplateEngine::render("<title> (<year>)/extras", &view, true, None);
        assert_eq!(dir, "Dune (2021)/extras");

        let file = TemplateEngine::render("<title>/cut", &view, false, None);
        assert_eq!(file, "Dunecut");
    }

    #[test]
    fn test_validator_round_trip() {
        let pattern = "<title> (<year>) [tmdbid=<tmdbid>]";
        let rendered = TemplateEngine::render(pattern, &movie_view(), false, Some("mkv"));
        let validator = TemplateEngine::validator_regex(pattern, false, false).unwrap();
        assert!(validator.is_match(&rendered));
    }

    #[test]
    fn test_validator_round_trip_file_literal_with_slash() {
        // A slash in a file pattern's literal is stripped from the rendered
        // name, so the validator must strip it too.
        let pattern = "<title>/cut (<year>)";
        let rendered = TemplateEngine::render(pattern, &movie_view(), false, Some("mkv"));
        assert_eq!(rendered, "Dunecut (2021).mkv");

        let validator = TemplateEngine::validator_regex(pattern, false, false).unwrap();
        assert!(validator.is_match(&rendered));

        // Directory patterns keep the separator on both sides.
        let dir_pattern = "<title> (<year>)/extras";
        let dir = TemplateEngine::render(dir_pattern, &movie_view(), true, None);
        let dir_validator = TemplateEngine::validator_regex(dir_pattern, false, true).unwrap();
        assert!(dir_validator.is_match(&dir));
    }

    #[test]
    fn test_validator_round_trip_tv() {
        let pattern = "<title> - S<season><episode>{ - <episode_title>}:<episode_title>";
        let rendered =
            TemplateEngine::render(pattern, &episode_view(), false, Some("mkv"));
        assert_eq!(rendered, "Show Name - S02E05 - The One Episode.mkv");

        let validator = TemplateEngine::validator_regex(pattern, false, false).unwrap();
        assert!(validator.is_match(&rendered));

        // Optional part absent still matches when kept optional.
        assert!(validator.is_match("Show Name - S02E05.mkv"));

        // With optional segments removed, the long form no longer matches.
        let strict = TemplateEngine::validator_regex(pattern, true, false).unwrap();
        assert!(strict.is_match("Show Name - S02E05.mkv"));
        assert!(!strict.is_match(&rendered));
    }

    #[test]
    fn test_validator_rejects_malformed() {
        let validator =
            TemplateEngine::validator_regex("<title> (<year>)", false, false).unwrap();
        assert!(!validator.is_match("Dune (year unknown)"));
    }

    #[test]
    fn test_validator_unknown_field_errors() {
        assert!(TemplateEngine::validator_regex("<bogus>", false, false).is_err());
    }

    #[test]
    fn test_view_from_tree_inherits_dates() {
        let mut tree = ResultTree::new();

        let mut show = CandidateData::new(MediaType::TvShow, "Show Name");
        show.id = Some("1396".to_string());
        show.show_first_air = DateField::from_provider(Some("2008-01-20"));
        let show = tree.insert(show, None);

        let mut season = CandidateData::new(MediaType::TvSeason, "Season 2");
        season.season = Some(2);
        season.season_start = DateField::from_provider(Some("2009-03-08"));
        let season = tree.insert(season, Some(show));

        let mut episode = CandidateData::new(MediaType::TvEpisode, "The One Episode");
        episode.episode = Some(5);
        episode.id = Some("5001".to_string());
        episode.episode_air = DateField::from_provider(Some("2009-04-05"));
        let episode = tree.insert(episode, Some(season));

        let view = ResultView::from_tree(&tree, episode);
        assert_eq!(view.title, "Show Name");
        assert_eq!(view.show_year, "2008");
        assert_eq!(view.season_year, "2009");
        assert_eq!(view.episode_year, "2009");
        assert_eq!(view.show_tmdbid, "1396");
        assert_eq!(view.tmdbid, "5001");
        assert_eq!(view.season, Some(2));
        assert_eq!(view.episode, "E05");
        assert_eq!(view.episode_title, "The One Episode");
    }
}
