use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cache::{RequestCache, RequestKey, RequestKind};
use crate::criteria::{MediaType, SearchCriteria};
use crate::matcher::{RankedResults, is_match};
use crate::parser::{NameParser, ParserConfig};
use crate::provider::api_types::{
    Configuration, MovieDetails, MovieResult, SearchResponse, SeasonDetails, TvDetails, TvResult,
};
use crate::provider::Transport;
use crate::tree::{CandidateData, DateField, NodeId, ResultTree};
use crate::{Error, Result};

/// Poster size requested from the provider.
const POSTER_SIZE: &str = "original";
/// Config fetch attempts before the session becomes fatal.
const CONFIG_MAX_ATTEMPTS: u32 = 5;

/// Orchestrator configuration. Everything the engine needs is passed in
/// here; there is no ambient global state.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub api_key: String,
    pub base_url: String,
    /// Cap on search pagination. `None` means unlimited.
    pub max_pages: Option<u32>,
    /// Wait before issuing the next search page.
    pub page_debounce: Duration,
    /// Wait before retrying a failed config fetch.
    pub config_retry_debounce: Duration,
    /// Emit a partial-results event whenever the accumulated match count
    /// crosses a multiple of this.
    pub partial_batch: usize,
    pub parser: ParserConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.themoviedb.org".to_string(),
            max_pages: Some(10),
            page_debounce: Duration::from_millis(200),
            config_retry_debounce: Duration::from_millis(500),
            partial_batch: 20,
            parser: ParserConfig::default(),
        }
    }
}

/// Image base URL and size from the one-time configuration document.
#[derive(Debug, Clone)]
pub struct ImageConfig {
    pub base_url: String,
    pub size: String,
}

impl ImageConfig {
    pub fn poster_url(&self, poster_path: &str) -> String {
        format!("{}{}{}", self.base_url, self.size, poster_path)
    }
}

#[derive(Debug, Clone, Default)]
enum ImageState {
    #[default]
    NotFetched,
    /// Config fetched; `None` means an empty document, which only disables
    /// image enrichment.
    Fetched(Option<ImageConfig>),
}

/// Events emitted while a session runs. The orchestrator stays passive and
/// only reports through this channel; it never assumes a particular UI.
#[derive(Debug, Clone)]
pub enum SearchEvent {
    SearchFinished {
        path: PathBuf,
    },
    PartialResults {
        path: PathBuf,
        count: usize,
    },
    AutoSearchPartial {
        path: PathBuf,
    },
    AutoSearchFinished {
        path: PathBuf,
        criteria: SearchCriteria,
        has_more: bool,
    },
}

/// Result of one session: the candidate tree plus the ranked ids into it.
/// An exhausted search leaves only the NOT-FOUND sentinel in the list.
#[derive(Debug)]
pub struct SearchOutcome {
    pub tree: ResultTree,
    pub results: RankedResults,
}

impl SearchOutcome {
    pub fn best_match(&self) -> Option<NodeId> {
        self.results.best_match(&self.tree)
    }

    pub fn match_count(&self) -> usize {
        self.results.match_count(&self.tree)
    }
}

#[derive(Default)]
struct Pending {
    config: Option<RequestKey>,
    search: Option<RequestKey>,
    movie_detail: Option<RequestKey>,
    show_detail: Option<RequestKey>,
    images: HashMap<RequestKey, NodeId>,
    show_details: HashMap<RequestKey, NodeId>,
    season_details: HashMap<RequestKey, NodeId>,
}

impl Pending {
    fn is_active(&self) -> bool {
        self.config.is_some()
            || self.search.is_some()
            || self.movie_detail.is_some()
            || self.show_detail.is_some()
            || !self.images.is_empty()
            || !self.show_details.is_empty()
            || !self.season_details.is_empty()
    }
}

#[derive(Clone, Copy)]
enum ScalarSlot {
    Config,
    Search,
    MovieDetail,
    ShowDetail,
}

#[derive(Clone, Copy)]
enum KeyedMap {
    Image,
    ShowDetail,
    SeasonDetail,
}

/// Drives the multi-stage provider workflow for one search criteria at a
/// time: config fetch, paginated search, per-candidate detail cascade.
pub struct Orchestrator {
    transport: Arc<dyn Transport>,
    cache: RequestCache,
    config: OrchestratorConfig,
    parser: NameParser,
    image_state: Mutex<ImageState>,
    pending: Mutex<Pending>,
    stop_flag: AtomicBool,
    /// Pagination suppression for batch ("auto search") mode.
    suppress_pagination: AtomicBool,
    /// Cache keys stored by the current session, cleared on cancellation.
    session_keys: Mutex<Vec<RequestKey>>,
    events: Mutex<Option<mpsc::UnboundedSender<SearchEvent>>>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, transport: Arc<dyn Transport>) -> Self {
        let parser = NameParser::new(config.parser.clone());
        Self {
            transport,
            cache: RequestCache::new(),
            config,
            parser,
            image_state: Mutex::new(ImageState::NotFetched),
            pending: Mutex::new(Pending::default()),
            stop_flag: AtomicBool::new(false),
            suppress_pagination: AtomicBool::new(false),
            session_keys: Mutex::new(Vec::new()),
            events: Mutex::new(None),
        }
    }

    /// Register the channel session events are emitted on.
    pub fn set_event_sender(&self, sender: mpsc::UnboundedSender<SearchEvent>) {
        *self.events.lock() = Some(sender);
    }

    pub fn parser(&self) -> &NameParser {
        &self.parser
    }

    /// Whether any request slot or detail map is occupied.
    pub fn is_active(&self) -> bool {
        self.pending.lock().is_active()
    }

    pub fn set_suppress_pagination(&self, suppress: bool) {
        self.suppress_pagination.store(suppress, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.stop_flag.load(Ordering::SeqCst)
    }

    /// Suppress new requests and pagination. In-flight calls complete; the
    /// session's own cached lookups are removed so a retry starts clean.
    pub async fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        let keys: Vec<RequestKey> = std::mem::take(&mut *self.session_keys.lock());
        self.cache.remove_all(&keys).await;
    }

    /// Drop every cached response.
    pub fn clear_search_cache(&self) {
        self.cache.clear();
        self.session_keys.lock().clear();
    }

    /// Send an event to the registered channel, if any.
    pub fn emit_event(&self, event: SearchEvent) {
        if let Some(sender) = self.events.lock().as_ref() {
            let _ = sender.send(event);
        }
    }

    /// Run one session. The criteria's page cursor advances in place as
    /// pagination proceeds.
    pub async fn search(
        &self,
        path: &Path,
        criteria: &mut SearchCriteria,
    ) -> Result<SearchOutcome> {
        self.stop_flag.store(false, Ordering::SeqCst);
        self.session_keys.lock().clear();

        info!(
            "Searching: {} ({})",
            criteria.search_name, criteria.media_type
        );

        self.ensure_config().await?;

        let mut tree = ResultTree::new();
        let mut results = RankedResults::with_sentinel(&mut tree);

        let matched = if criteria.search_by_id && criteria.has_id() {
            self.resolve_by_id(criteria, &mut tree, &mut results).await?
        } else {
            self.run_search_pages(path, criteria, &mut tree, &mut results)
                .await?
        };

        self.resolve_candidates(criteria, &mut tree, &mut results, &matched)
            .await?;

        debug!(
            "Session done: {} match(es) for {}",
            results.match_count(&tree),
            criteria.search_name
        );
        self.emit_event(SearchEvent::SearchFinished {
            path: path.to_path_buf(),
        });

        Ok(SearchOutcome { tree, results })
    }

    /// Fetch the configuration document at most once per orchestrator
    /// lifetime, retrying up to the attempt cap.
    async fn ensure_config(&self) -> Result<()> {
        if matches!(*self.image_state.lock(), ImageState::Fetched(_)) {
            return Ok(());
        }

        let url = format!(
            "{}/3/configuration?api_key={}",
            self.config.base_url, self.config.api_key
        );

        let key = RequestKey::from_url(RequestKind::Config, &url);
        let mut last_error = String::new();
        for attempt in 1..=CONFIG_MAX_ATTEMPTS {
            match self.fetch_scalar(ScalarSlot::Config, RequestKind::Config, &url).await {
                Ok(bytes) => match serde_json::from_slice::<Configuration>(&bytes) {
                    Ok(parsed) => {
                        let image_config = parsed.images.and_then(|images| {
                            let base_url = images.secure_base_url?;
                            debug!(
                                "Provider lists {} poster size(s), using {POSTER_SIZE}",
                                images.poster_sizes.len()
                            );
                            Some(ImageConfig {
                                base_url,
                                size: POSTER_SIZE.to_string(),
                            })
                        });
                        if image_config.is_none() {
                            debug!("Empty provider configuration, image enrichment disabled");
                        }
                        *self.image_state.lock() = ImageState::Fetched(image_config);
                        return Ok(());
                    }
                    // A malformed payload counts as a failed attempt. Drop
                    // the stored bytes so the retry goes back to the wire
                    // instead of replaying the bad body from cache.
                    Err(e) => {
                        warn!("Config fetch attempt {attempt} returned an unusable payload: {e}");
                        last_error = format!("configuration: {e}");
                        self.cache.remove(&key).await;
                        if attempt < CONFIG_MAX_ATTEMPTS {
                            tokio::time::sleep(self.config.config_retry_debounce).await;
                        }
                    }
                },
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    warn!("Config fetch attempt {attempt} failed: {e}");
                    last_error = e.to_string();
                    if attempt < CONFIG_MAX_ATTEMPTS {
                        tokio::time::sleep(self.config.config_retry_debounce).await;
                    }
                }
            }
        }

        Err(Error::ConfigFetch {
            attempts: CONFIG_MAX_ATTEMPTS,
            message: last_error,
        })
    }

    fn image_config(&self) -> Option<ImageConfig> {
        match &*self.image_state.lock() {
            ImageState::Fetched(config) => config.clone(),
            ImageState::NotFetched => None,
        }
    }

    fn search_url(&self, criteria: &SearchCriteria, page: Option<u32>) -> (RequestKind, String) {
        let (kind, endpoint) = if criteria.media_type.is_tv() {
            (RequestKind::TvSearch, "tv")
        } else {
            (RequestKind::MovieSearch, "movie")
        };

        let mut url = format!(
            "{}/3/search/{}?api_key={}&include_adult=true",
            self.config.base_url, endpoint, self.config.api_key
        );
        if let Some(year) = criteria.release_year() {
            url.push_str(&format!("&year={year}"));
        }
        if let Some(page) = page {
            url.push_str(&format!("&page={page}"));
        }

        let query = criteria
            .search_name
            .split(|c: char| c.is_whitespace() || c == '.')
            .filter(|t| !t.is_empty())
            .map(|t| urlencoding::encode(t).into_owned())
            .collect::<Vec<_>>()
            .join("+");
        url.push_str(&format!("&query={query}"));

        (kind, url)
    }

    /// Paginated text search. Returns ids of matched candidates.
    async fn run_search_pages(
        &self,
        path: &Path,
        criteria: &mut SearchCriteria,
        tree: &mut ResultTree,
        results: &mut RankedResults,
    ) -> Result<Vec<NodeId>> {
        let mut matched = Vec::new();
        let mut partials_emitted = 0usize;
        let mut page = criteria.page;

        loop {
            let (kind, url) = self.search_url(criteria, page);
            let bytes = match self.fetch_scalar(ScalarSlot::Search, kind, &url).await {
                Ok(bytes) => bytes,
                // Not-Found on the search call is a terminal negative
                // outcome for the session, not a transport failure.
                Err(Error::NotFound(message)) => {
                    debug!("Search returned not-found: {message}");
                    return Ok(matched);
                }
                Err(e) => return Err(e),
            };

            let (page_no, total_pages, total_results) = if criteria.media_type.is_tv() {
                let parsed: SearchResponse<TvResult> = serde_json::from_slice(&bytes)
                    .map_err(|e| Error::Parse(format!("tv search: {e}")))?;
                for result in parsed.results {
                    let data = self.tv_result_to_candidate(result);
                    if is_match(criteria, &data) {
                        let id = tree.insert(data, None);
                        results.insert(tree, criteria, id);
                        matched.push(id);
                    }
                }
                (parsed.page, parsed.total_pages, parsed.total_results)
            } else {
                let parsed: SearchResponse<MovieResult> = serde_json::from_slice(&bytes)
                    .map_err(|e| Error::Parse(format!("movie search: {e}")))?;
                for result in parsed.results {
                    let data = self.movie_result_to_candidate(result);
                    if is_match(criteria, &data) {
                        let id = tree.insert(data, None);
                        results.insert(tree, criteria, id);
                        matched.push(id);
                    }
                }
                (parsed.page, parsed.total_pages, parsed.total_results)
            };
            debug!(
                "Search page {page_no}/{total_pages}: {} of {total_results} reported result(s) matched so far",
                matched.len()
            );

            let count = results.match_count(tree);
            if self.config.partial_batch > 0 && count / self.config.partial_batch > partials_emitted
            {
                partials_emitted = count / self.config.partial_batch;
                self.emit_event(SearchEvent::PartialResults {
                    path: path.to_path_buf(),
                    count,
                });
            }

            let under_cap = self
                .config
                .max_pages
                .is_none_or(|max| page_no + 1 <= max);
            let more = page_no < total_pages
                && under_cap
                && !self.suppress_pagination.load(Ordering::SeqCst)
                && !self.is_stopped();
            if !more {
                break;
            }

            tokio::time::sleep(self.config.page_debounce).await;
            page = Some(page_no + 1);
            criteria.set_page(page_no + 1);
        }

        Ok(matched)
    }

    /// Resolve an explicit provider id through the scalar detail slots.
    async fn resolve_by_id(
        &self,
        criteria: &SearchCriteria,
        tree: &mut ResultTree,
        results: &mut RankedResults,
    ) -> Result<Vec<NodeId>> {
        let requested = criteria.provider_id.clone().expect("has_id checked");

        let data = if criteria.media_type.is_tv() {
            self.fetch_show_by_id(&requested).await?
        } else if criteria.media_type == MediaType::Movie {
            self.fetch_movie_by_id(&requested).await?
        } else {
            // Unknown type: movie first, then TV.
            match self.fetch_movie_by_id(&requested).await {
                Ok(data) => data,
                Err(e) if e.is_not_found() => self.fetch_show_by_id(&requested).await?,
                Err(e) => return Err(e),
            }
        };

        let id = tree.insert(data, None);
        results.insert(tree, criteria, id);
        Ok(vec![id])
    }

    async fn fetch_movie_by_id(&self, requested: &str) -> Result<CandidateData> {
        let url = format!(
            "{}/3/movie/{}?api_key={}",
            self.config.base_url, requested, self.config.api_key
        );
        let bytes = self
            .fetch_scalar(ScalarSlot::MovieDetail, RequestKind::GetMovie, &url)
            .await?;
        let details: MovieDetails = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Parse(format!("movie detail: {e}")))?;

        if details.id.to_string() != requested {
            return Err(Error::IdMismatch {
                requested: requested.to_string(),
                received: details.id.to_string(),
            });
        }

        let mut data = CandidateData::new(MediaType::Movie, details.title);
        data.id = Some(details.id.to_string());
        data.movie_release = DateField::from_provider(details.release_date.as_deref());
        data.description = details.overview.unwrap_or_default();
        data.poster = self.poster_url(details.poster_path.as_deref());
        Ok(data)
    }

    async fn fetch_show_by_id(&self, requested: &str) -> Result<CandidateData> {
        let url = format!(
            "{}/3/tv/{}?api_key={}",
            self.config.base_url, requested, self.config.api_key
        );
        let bytes = self
            .fetch_scalar(ScalarSlot::ShowDetail, RequestKind::GetTvShow, &url)
            .await?;
        let details: TvDetails = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Parse(format!("tv detail: {e}")))?;

        if details.id.to_string() != requested {
            return Err(Error::IdMismatch {
                requested: requested.to_string(),
                received: details.id.to_string(),
            });
        }

        Ok(self.tv_details_to_candidate(details))
    }

    /// Detail cascade: show detail, per-season fetches, episode
    /// materialization and image enrichment for every matched candidate.
    /// These run inside the keyed maps and may degrade individual
    /// candidates without failing the session.
    async fn resolve_candidates(
        &self,
        criteria: &SearchCriteria,
        tree: &mut ResultTree,
        results: &mut RankedResults,
        matched: &[NodeId],
    ) -> Result<()> {
        // Show details for TV candidates, when the criteria actually
        // targets a season or episode.
        let show_fetches: Vec<(NodeId, String)> = if criteria.wants_episode() {
            matched
                .iter()
                .filter_map(|&id| {
                    let data = tree.get(id);
                    if data.media_type == MediaType::TvShow && data.season.is_none() {
                        data.id.clone().map(|show_id| (id, show_id))
                    } else {
                        None
                    }
                })
                .collect()
        } else {
            Vec::new()
        };

        let season_lists = self.fetch_show_details(tree, &show_fetches).await?;

        // Season payloads, fetched concurrently per (show, season).
        let season_fetches: Vec<(NodeId, String, u32)> = season_lists
            .iter()
            .flat_map(|(node, show_id, seasons)| {
                seasons
                    .iter()
                    .map(|&season| (*node, show_id.clone(), season))
            })
            .collect();

        self.fetch_seasons(criteria, tree, results, &season_fetches)
            .await?;

        self.fetch_images(tree, matched).await?;

        Ok(())
    }

    /// Fetch `/3/tv/{id}` for each candidate. Returns the season numbers to
    /// cascade into for each surviving candidate.
    async fn fetch_show_details(
        &self,
        tree: &mut ResultTree,
        fetches: &[(NodeId, String)],
    ) -> Result<Vec<(NodeId, String, Vec<u32>)>> {
        let futures = fetches.iter().map(|(node, show_id)| {
            let url = format!(
                "{}/3/tv/{}?api_key={}",
                self.config.base_url, show_id, self.config.api_key
            );
            async move {
                let outcome = self
                    .fetch_keyed(KeyedMap::ShowDetail, RequestKind::TvInfo, &url, *node)
                    .await;
                (*node, show_id.clone(), outcome)
            }
        });

        let outcomes = join_all(futures).await;
        let total = outcomes.len();
        let mut season_lists = Vec::new();
        for (index, (node, show_id, outcome)) in outcomes.into_iter().enumerate() {
            let last = index + 1 == total;
            match outcome {
                Ok(bytes) => {
                    let details: TvDetails = serde_json::from_slice(&bytes)
                        .map_err(|e| Error::Parse(format!("tv detail: {e}")))?;
                    let seasons: Vec<u32> = details
                        .seasons
                        .iter()
                        .map(|s| s.season_number)
                        .collect();
                    debug!(
                        "Show {}: {} season(s), {} episode(s) reported",
                        details.id,
                        details.number_of_seasons.unwrap_or(seasons.len() as u32),
                        details.number_of_episodes.unwrap_or_default()
                    );

                    let data = tree.get_mut(node);
                    data.show_id = Some(details.id.to_string());
                    data.show_first_air =
                        DateField::from_provider(details.first_air_date.as_deref());
                    if data.description.is_empty() {
                        data.description = details.overview.unwrap_or_default();
                    }
                    season_lists.push((node, show_id, seasons));
                }
                // Not-found degrades this candidate only, unless it was the
                // last outstanding fetch in the map.
                Err(e) if e.is_not_found() && !last => {
                    debug!("Show detail not found for candidate {node}, skipping cascade");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(season_lists)
    }

    /// Fetch `/3/tv/{id}/season/{n}` payloads and materialize season and
    /// episode children for the requested episode numbers.
    async fn fetch_seasons(
        &self,
        criteria: &SearchCriteria,
        tree: &mut ResultTree,
        results: &mut RankedResults,
        fetches: &[(NodeId, String, u32)],
    ) -> Result<()> {
        let futures = fetches.iter().map(|(node, show_id, season)| {
            let url = format!(
                "{}/3/tv/{}/season/{}?api_key={}",
                self.config.base_url, show_id, season, self.config.api_key
            );
            async move {
                let outcome = self
                    .fetch_keyed(KeyedMap::SeasonDetail, RequestKind::SeasonInfo, &url, *node)
                    .await;
                (*node, outcome)
            }
        });

        let outcomes = join_all(futures).await;
        let total = outcomes.len();
        for (index, (show_node, outcome)) in outcomes.into_iter().enumerate() {
            let last = index + 1 == total;
            match outcome {
                Ok(bytes) => {
                    let details: SeasonDetails = serde_json::from_slice(&bytes)
                        .map_err(|e| Error::Parse(format!("season detail: {e}")))?;

                    if let Some(wanted) = criteria.season
                        && details.season_number != wanted
                    {
                        continue;
                    }

                    let mut season_data = CandidateData::new(
                        MediaType::TvSeason,
                        details.name.clone().unwrap_or_else(|| {
                            format!("Season {}", details.season_number)
                        }),
                    );
                    season_data.season = Some(details.season_number);
                    season_data.season_id = Some(details.id.to_string());
                    season_data.season_start =
                        DateField::from_provider(details.air_date.as_deref());
                    let season_node = tree.insert(season_data, Some(show_node));

                    // Season-level criteria rank the season node itself.
                    if criteria.episodes.is_empty() {
                        results.insert(tree, criteria, season_node);
                        continue;
                    }

                    for episode in details.episodes {
                        if !criteria.episodes.contains(&episode.episode_number) {
                            continue;
                        }
                        let mut data =
                            CandidateData::new(MediaType::TvEpisode, episode.name.clone());
                        data.season = Some(episode.season_number);
                        data.episode = Some(episode.episode_number);
                        data.episode_id = Some(episode.id.to_string());
                        data.id = Some(episode.id.to_string());
                        data.show_id = tree.get(show_node).show_id.clone();
                        data.episode_air = DateField::from_provider(episode.air_date.as_deref());
                        data.subtitle = episode.name;
                        data.description = episode.overview.unwrap_or_default();

                        // Merge the extra episode numbers of a multi-episode
                        // file into the first materialized node.
                        let episode_node = tree.insert(data, Some(season_node));
                        if criteria.episodes.len() > 1
                            && criteria.episodes.first() == Some(&episode.episode_number)
                        {
                            for &extra in &criteria.episodes[1..] {
                                tree.get_mut(episode_node).merge_extra_episode(extra);
                            }
                        }
                        results.insert(tree, criteria, episode_node);
                    }
                }
                Err(e) if e.is_not_found() && !last => {
                    debug!("Season fetch not found for candidate {show_node}, no episode match");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Validate poster URLs through the image map. A missing poster clears
    /// that one candidate's poster, under the same last-outstanding rule as
    /// the detail maps.
    async fn fetch_images(&self, tree: &mut ResultTree, matched: &[NodeId]) -> Result<()> {
        let fetches: Vec<(NodeId, String)> = matched
            .iter()
            .filter_map(|&id| tree.get(id).poster.clone().map(|url| (id, url)))
            .collect();

        let futures = fetches.iter().map(|(node, url)| async move {
            let outcome = self
                .fetch_keyed(KeyedMap::Image, RequestKind::GetImage, url, *node)
                .await;
            (*node, outcome)
        });

        let outcomes = join_all(futures).await;
        let total = outcomes.len();
        for (index, (node, outcome)) in outcomes.into_iter().enumerate() {
            let last = index + 1 == total;
            match outcome {
                Ok(_) => {}
                Err(e) if e.is_not_found() && !last => {
                    tree.get_mut(node).poster = None;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn poster_url(&self, poster_path: Option<&str>) -> Option<String> {
        let config = self.image_config()?;
        poster_path.map(|p| config.poster_url(p))
    }

    fn movie_result_to_candidate(&self, result: MovieResult) -> CandidateData {
        let mut data = CandidateData::new(MediaType::Movie, result.title);
        data.id = Some(result.id.to_string());
        data.movie_release = DateField::from_provider(result.release_date.as_deref());
        data.description = result.overview.unwrap_or_default();
        data.poster = self.poster_url(result.poster_path.as_deref());
        data
    }

    fn tv_result_to_candidate(&self, result: TvResult) -> CandidateData {
        let mut data = CandidateData::new(MediaType::TvShow, result.name);
        data.id = Some(result.id.to_string());
        data.show_id = Some(result.id.to_string());
        data.show_first_air = DateField::from_provider(result.first_air_date.as_deref());
        data.description = result.overview.unwrap_or_default();
        data.poster = self.poster_url(result.poster_path.as_deref());
        data
    }

    fn tv_details_to_candidate(&self, details: TvDetails) -> CandidateData {
        let mut data = CandidateData::new(MediaType::TvShow, details.name);
        data.id = Some(details.id.to_string());
        data.show_id = Some(details.id.to_string());
        data.show_first_air = DateField::from_provider(details.first_air_date.as_deref());
        data.description = details.overview.unwrap_or_default();
        data.poster = self.poster_url(details.poster_path.as_deref());
        data
    }

    /// Issue a request through one of the scalar slots. At most one request
    /// of each scalar kind may be in flight.
    async fn fetch_scalar(
        &self,
        slot: ScalarSlot,
        kind: RequestKind,
        url: &str,
    ) -> Result<Vec<u8>> {
        let key = RequestKey::from_url(kind, url);
        {
            let mut pending = self.pending.lock();
            let slot_ref = scalar_slot(&mut pending, slot);
            if slot_ref.is_some() {
                return Err(Error::Config(
                    "request slot already occupied".to_string(),
                ));
            }
            *slot_ref = Some(key.clone());
        }

        let outcome = self.fetch(key, url).await;

        let mut pending = self.pending.lock();
        *scalar_slot(&mut pending, slot) = None;
        outcome
    }

    /// Issue a request through one of the keyed detail maps.
    async fn fetch_keyed(
        &self,
        map: KeyedMap,
        kind: RequestKind,
        url: &str,
        node: NodeId,
    ) -> Result<Vec<u8>> {
        let key = RequestKey::from_url(kind, url);
        {
            let mut pending = self.pending.lock();
            keyed_map(&mut pending, map).insert(key.clone(), node);
        }

        let outcome = self.fetch(key.clone(), url).await;

        let mut pending = self.pending.lock();
        keyed_map(&mut pending, map).remove(&key);
        drop(pending);

        outcome
    }

    /// Cache-aware fetch. A hit replays the stored bytes on a later
    /// scheduler tick, so callers observe the same issue-then-complete
    /// protocol on both paths.
    async fn fetch(&self, key: RequestKey, url: &str) -> Result<Vec<u8>> {
        if self.is_stopped() {
            return Err(Error::Cancelled);
        }

        if let Some(bytes) = self.cache.get(&key).await {
            debug!("Cache hit: {:?} {}", key.kind, key.path_query);
            tokio::task::yield_now().await;
            return Ok(bytes.to_vec());
        }

        let response = self.transport.get(url).await?;
        if !response.is_success() {
            return Err(response.into_error());
        }

        self.cache.insert(key.clone(), response.body.clone()).await;
        self.session_keys.lock().push(key);
        Ok(response.body)
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("base_url", &self.config.base_url)
            .field("active", &self.is_active())
            .finish()
    }
}

fn scalar_slot(pending: &mut Pending, slot: ScalarSlot) -> &mut Option<RequestKey> {
    match slot {
        ScalarSlot::Config => &mut pending.config,
        ScalarSlot::Search => &mut pending.search,
        ScalarSlot::MovieDetail => &mut pending.movie_detail,
        ScalarSlot::ShowDetail => &mut pending.show_detail,
    }
}

fn keyed_map(pending: &mut Pending, map: KeyedMap) -> &mut HashMap<RequestKey, NodeId> {
    match map {
        KeyedMap::Image => &mut pending.images,
        KeyedMap::ShowDetail => &mut pending.show_details,
        KeyedMap::SeasonDetail => &mut pending.season_details,
    }
}
