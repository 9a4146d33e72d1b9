use crate::criteria::{MediaType, SearchCriteria};
use crate::tree::{CandidateData, NodeId, ResultTree};

/// Whether a candidate satisfies the search criteria.
///
/// An explicit id match short-circuits everything else; otherwise the
/// candidate must be date-, id- and name-compatible.
pub fn is_match(criteria: &SearchCriteria, candidate: &CandidateData) -> bool {
    if candidate.is_sentinel() {
        return false;
    }

    if criteria.has_id() && candidate.id == criteria.provider_id {
        return true;
    }

    date_compatible(criteria, candidate)
        && id_compatible(criteria, candidate)
        && name_compatible(criteria, candidate)
}

/// Whether `candidate` ranks ahead of `current_best`.
///
/// Season/episode criteria rank by closer season match first, then by title
/// equality; movie and show criteria rank by title equality alone. A real
/// candidate always beats a sentinel.
pub fn is_better_match(
    criteria: &SearchCriteria,
    candidate: &CandidateData,
    current_best: &CandidateData,
) -> bool {
    if current_best.is_sentinel() {
        return !candidate.is_sentinel();
    }
    if candidate.is_sentinel() {
        return false;
    }

    if matches!(
        criteria.media_type,
        MediaType::TvSeason | MediaType::TvEpisode
    ) {
        let candidate_season = is_season_match(criteria, candidate);
        let best_season = is_season_match(criteria, current_best);
        if candidate_season != best_season {
            return candidate_season;
        }
    }

    title_match(criteria, candidate) && !title_match(criteria, current_best)
}

/// Season agreement between criteria and candidate.
pub fn is_season_match(criteria: &SearchCriteria, candidate: &CandidateData) -> bool {
    criteria.season.is_some() && candidate.season == criteria.season
}

fn title_match(criteria: &SearchCriteria, candidate: &CandidateData) -> bool {
    criteria.search_name.to_lowercase() == candidate.title.to_lowercase()
}

/// The candidate-side date relevant for its media type.
fn candidate_date(candidate: &CandidateData) -> &crate::tree::DateField {
    match candidate.media_type {
        MediaType::Movie => &candidate.movie_release,
        MediaType::TvSeason => &candidate.season_start,
        MediaType::TvEpisode => &candidate.episode_air,
        _ => &candidate.show_first_air,
    }
}

fn date_compatible(criteria: &SearchCriteria, candidate: &CandidateData) -> bool {
    if !criteria.has_date() {
        return true;
    }

    let candidate_field = candidate_date(candidate);
    let Some(candidate_day) = candidate_field.date else {
        // Only one side has a valid date.
        return false;
    };
    let criteria_day = criteria.release_date.expect("has_date checked");

    // January 1st on either side means year-only precision.
    if criteria.is_year_only() || candidate_field.is_year_only() {
        return criteria_day.format("%Y").to_string() == candidate_day.format("%Y").to_string();
    }

    if criteria.exact_match {
        return criteria_day.format("%Y-%m").to_string()
            == candidate_day.format("%Y-%m").to_string();
    }

    true
}

fn id_compatible(criteria: &SearchCriteria, candidate: &CandidateData) -> bool {
    // TV ids at this level may be season or episode ids, so no check applies.
    if criteria.media_type.is_tv() {
        return true;
    }
    if !criteria.has_id() {
        return true;
    }
    candidate.id == criteria.provider_id
}

fn name_compatible(criteria: &SearchCriteria, candidate: &CandidateData) -> bool {
    let tokens = criteria.name_tokens();
    if tokens.is_empty() {
        return true;
    }
    let candidate_name = candidate.title.to_lowercase();

    if !criteria.exact_match {
        return tokens.iter().all(|t| candidate_name.contains(t.as_str()));
    }

    // Exact mode: every token present, in order.
    let mut offset = 0;
    for token in &tokens {
        match candidate_name[offset..].find(token.as_str()) {
            Some(pos) => offset += pos + token.len(),
            None => return false,
        }
    }
    true
}

/// Ordered result list. Seeded with a NOT-FOUND sentinel that is evicted
/// the moment any real candidate is inserted; the best match is the first
/// non-sentinel entry.
#[derive(Debug, Default)]
pub struct RankedResults {
    ids: Vec<NodeId>,
}

impl RankedResults {
    /// Create a list whose only entry is a fresh NOT-FOUND sentinel node.
    pub fn with_sentinel(tree: &mut ResultTree) -> Self {
        let sentinel = tree.insert(CandidateData::not_found(), None);
        Self {
            ids: vec![sentinel],
        }
    }

    pub fn ids(&self) -> &[NodeId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of real (non-sentinel) candidates.
    pub fn match_count(&self, tree: &ResultTree) -> usize {
        self.ids
            .iter()
            .filter(|&&id| !tree.get(id).is_sentinel())
            .count()
    }

    /// Insert a candidate at its ranked position. The leading sentinel is
    /// evicted as soon as a real candidate arrives.
    pub fn insert(&mut self, tree: &ResultTree, criteria: &SearchCriteria, id: NodeId) {
        if !tree.get(id).is_sentinel() {
            self.ids.retain(|&existing| !tree.get(existing).is_sentinel());
        }

        let candidate = tree.get(id);
        let position = self
            .ids
            .iter()
            .position(|&existing| is_better_match(criteria, candidate, tree.get(existing)))
            .unwrap_or(self.ids.len());
        self.ids.insert(position, id);
    }

    /// First non-sentinel entry.
    pub fn best_match(&self, tree: &ResultTree) -> Option<NodeId> {
        self.ids
            .iter()
            .copied()
            .find(|&id| !tree.get(id).is_sentinel())
    }
}
