use chrono::{Datelike, NaiveDate};

use crate::criteria::MediaType;

/// Title carried by the reserved "search exhausted" sentinel entry.
pub const NOT_FOUND_TITLE: &str = "-- NOT FOUND --";
/// Title carried by the reserved "remove this file" sentinel entry.
pub const DELETE_MARKER_TITLE: &str = "-- DELETE THIS --";

/// Index of a node inside a [`ResultTree`] arena.
pub type NodeId = usize;

/// A (date, raw string) pair. The raw string is kept verbatim from the
/// provider so the template engine can re-render it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DateField {
    pub date: Option<NaiveDate>,
    pub raw: String,
}

impl DateField {
    pub fn new(date: Option<NaiveDate>, raw: impl Into<String>) -> Self {
        Self {
            date,
            raw: raw.into(),
        }
    }

    /// Parse a provider `YYYY-MM-DD` string, keeping the raw text either way.
    pub fn from_provider(raw: Option<&str>) -> Self {
        let raw = raw.unwrap_or_default();
        Self {
            date: NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok(),
            raw: raw.to_string(),
        }
    }

    pub fn is_set(&self) -> bool {
        self.date.is_some()
    }

    /// January 1st marks year-only precision.
    pub fn is_year_only(&self) -> bool {
        self.date.is_some_and(|d| d.month() == 1 && d.day() == 1)
    }

    pub fn year(&self) -> Option<i32> {
        self.date.map(|d| d.year())
    }
}

/// Content fields of one resolved metadata node.
///
/// Equality covers content only; the poster reference and tree links are
/// excluded.
#[derive(Debug, Clone, Default)]
pub struct CandidateData {
    pub media_type: MediaType,
    pub title: String,
    pub id: Option<String>,
    pub show_id: Option<String>,
    pub season_id: Option<String>,
    pub episode_id: Option<String>,
    /// Movie release date.
    pub movie_release: DateField,
    /// Show first-air date.
    pub show_first_air: DateField,
    /// Season start date.
    pub season_start: DateField,
    /// Episode air date.
    pub episode_air: DateField,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    /// Episode title or other secondary title.
    pub subtitle: String,
    pub description: String,
    pub extra_info: Option<String>,
    pub disk: Option<u32>,
    /// Poster URL, populated only when image enrichment is available.
    pub poster: Option<String>,
    /// Episode numbers merged in from additional files of the same episode
    /// node (multi-episode files).
    pub extra_episodes: Vec<u32>,
}

impl PartialEq for CandidateData {
    fn eq(&self, other: &Self) -> bool {
        self.media_type == other.media_type
            && self.title == other.title
            && self.id == other.id
            && self.show_id == other.show_id
            && self.season_id == other.season_id
            && self.episode_id == other.episode_id
            && self.movie_release == other.movie_release
            && self.show_first_air == other.show_first_air
            && self.season_start == other.season_start
            && self.episode_air == other.episode_air
            && self.season == other.season
            && self.episode == other.episode
            && self.subtitle == other.subtitle
            && self.description == other.description
            && self.extra_info == other.extra_info
            && self.disk == other.disk
            && self.extra_episodes == other.extra_episodes
    }
}

impl CandidateData {
    pub fn new(media_type: MediaType, title: impl Into<String>) -> Self {
        Self {
            media_type,
            title: title.into(),
            ..Default::default()
        }
    }

    /// The "search exhausted" sentinel.
    pub fn not_found() -> Self {
        Self::new(MediaType::NotFound, NOT_FOUND_TITLE)
    }

    /// The "user chose to remove the file" sentinel.
    pub fn delete_marker() -> Self {
        Self::new(MediaType::DeleteMarker, DELETE_MARKER_TITLE)
    }

    pub fn is_sentinel(&self) -> bool {
        self.media_type.is_sentinel()
            || self.title == NOT_FOUND_TITLE
            || self.title == DELETE_MARKER_TITLE
    }

    pub fn season_number(&self) -> Option<u32> {
        self.season
    }

    /// Own episode plus merged extras, sorted and deduplicated.
    pub fn all_episode_numbers(&self) -> Vec<u32> {
        let mut numbers: Vec<u32> = self
            .episode
            .into_iter()
            .chain(self.extra_episodes.iter().copied())
            .collect();
        numbers.sort_unstable();
        numbers.dedup();
        numbers
    }

    /// Merge an additional episode number into this node.
    pub fn merge_extra_episode(&mut self, episode: u32) {
        if self.episode != Some(episode) && !self.extra_episodes.contains(&episode) {
            self.extra_episodes.push(episode);
        }
    }

    /// Render the episode numbers as contiguous runs: `E05`, `E01-E03`.
    /// Disjoint runs are joined with a comma.
    pub fn episode_label(&self) -> String {
        let numbers = self.all_episode_numbers();
        if numbers.is_empty() {
            return String::new();
        }

        let mut runs: Vec<(u32, u32)> = Vec::new();
        for n in numbers {
            match runs.last_mut() {
                Some((_, end)) if *end + 1 == n => *end = n,
                _ => runs.push((n, n)),
            }
        }

        runs.iter()
            .map(|&(start, end)| {
                if start == end {
                    format!("E{start:02}")
                } else {
                    format!("E{start:02}-E{end:02}")
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

struct Node {
    data: CandidateData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena of candidate nodes. Children hold owning indices; the parent link
/// is a plain index, so the show -> season -> episode hierarchy never forms
/// an ownership cycle.
#[derive(Default)]
pub struct ResultTree {
    nodes: Vec<Node>,
}

impl std::fmt::Debug for ResultTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultTree")
            .field("len", &self.nodes.len())
            .finish()
    }
}

impl ResultTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Insert a node, attaching it to `parent` when given.
    pub fn insert(&mut self, data: CandidateData, parent: Option<NodeId>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            data,
            parent,
            children: Vec::new(),
        });
        if let Some(parent) = parent {
            self.nodes[parent].children.push(id);
        }
        id
    }

    pub fn get(&self, id: NodeId) -> &CandidateData {
        &self.nodes[id].data
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut CandidateData {
        &mut self.nodes[id].data
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    /// Walk up through season/episode nodes to the owning show node.
    pub fn tv_show_info(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while matches!(
            self.nodes[current].data.media_type,
            MediaType::TvSeason | MediaType::TvEpisode
        ) {
            match self.nodes[current].parent {
                Some(parent) => current = parent,
                None => break,
            }
        }
        current
    }

    pub fn movie_release_date(&self, id: NodeId) -> &DateField {
        self.inherited(id, |d| &d.movie_release)
    }

    pub fn show_first_air_date(&self, id: NodeId) -> &DateField {
        self.inherited(id, |d| &d.show_first_air)
    }

    pub fn season_start_date(&self, id: NodeId) -> &DateField {
        self.inherited(id, |d| &d.season_start)
    }

    pub fn episode_air_date(&self, id: NodeId) -> &DateField {
        self.inherited(id, |d| &d.episode_air)
    }

    /// Return the node's own field when set, else the nearest ancestor's.
    fn inherited<F>(&self, id: NodeId, field: F) -> &DateField
    where
        F: Fn(&CandidateData) -> &DateField,
    {
        let mut current = id;
        loop {
            let value = field(&self.nodes[current].data);
            if value.is_set() {
                return value;
            }
            match self.nodes[current].parent {
                Some(parent) => current = parent,
                None => return field(&self.nodes[current].data),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn show() -> CandidateData {
        let mut data = CandidateData::new(MediaType::TvShow, "Show");
        data.id = Some("100".to_string());
        data.show_id = Some("100".to_string());
        data.show_first_air = DateField::from_provider(Some("2008-01-20"));
        data
    }

    #[test]
    fn test_date_field_from_provider() {
        let field = DateField::from_provider(Some("2021-09-15"));
        assert!(field.is_set());
        assert_eq!(field.year(), Some(2021));
        assert_eq!(field.raw, "2021-09-15");

        let empty = DateField::from_provider(None);
        assert!(!empty.is_set());

        let junk = DateField::from_provider(Some("soon"));
        assert!(!junk.is_set());
        assert_eq!(junk.raw, "soon");
    }

    #[test]
    fn test_date_inheritance_falls_back_to_parent() {
        let mut tree = ResultTree::new();
        let show = tree.insert(show(), None);

        let mut season = CandidateData::new(MediaType::TvSeason, "Season 2");
        season.season = Some(2);
        let season = tree.insert(season, Some(show));

        let mut episode = CandidateData::new(MediaType::TvEpisode, "Ep");
        episode.episode = Some(5);
        let episode = tree.insert(episode, Some(season));

        // Episode has no show date of its own: inherited from the show node.
        assert_eq!(tree.show_first_air_date(episode).year(), Some(2008));
        // Season start is unset all the way up.
        assert!(!tree.season_start_date(episode).is_set());
    }

    #[test]
    fn test_tv_show_info_walks_up() {
        let mut tree = ResultTree::new();
        let show_id = tree.insert(show(), None);
        let season = tree.insert(
            CandidateData::new(MediaType::TvSeason, "S2"),
            Some(show_id),
        );
        let episode = tree.insert(
            CandidateData::new(MediaType::TvEpisode, "E5"),
            Some(season),
        );

        assert_eq!(tree.tv_show_info(episode), show_id);
        assert_eq!(tree.tv_show_info(season), show_id);
        assert_eq!(tree.tv_show_info(show_id), show_id);
    }

    #[test]
    fn test_episode_label_single_and_runs() {
        let mut data = CandidateData::new(MediaType::TvEpisode, "Ep");
        data.episode = Some(5);
        assert_eq!(data.episode_label(), "E05");

        data.episode = Some(2);
        data.extra_episodes = vec![3, 4];
        assert_eq!(data.episode_label(), "E02-E04");

        data.extra_episodes = vec![3, 7];
        assert_eq!(data.episode_label(), "E02-E03, E07");
    }

    #[test]
    fn test_merge_extra_episode_dedups() {
        let mut data = CandidateData::new(MediaType::TvEpisode, "Ep");
        data.episode = Some(2);
        data.merge_extra_episode(2);
        data.merge_extra_episode(3);
        data.merge_extra_episode(3);
        assert_eq!(data.extra_episodes, vec![3]);
    }

    #[test]
    fn test_equality_ignores_poster() {
        let mut a = CandidateData::new(MediaType::Movie, "Dune");
        let mut b = a.clone();
        a.poster = Some("https://img/a.jpg".to_string());
        b.poster = None;
        assert_eq!(a, b);

        b.title = "Dune Part Two".to_string();
        assert_ne!(a, b);
    }

    #[test]
    fn test_sentinels() {
        assert!(CandidateData::not_found().is_sentinel());
        assert!(CandidateData::delete_marker().is_sentinel());
        assert!(!CandidateData::new(MediaType::Movie, "Dune").is_sentinel());
    }
}
