use serde::Deserialize;

// Provider error body
#[derive(Debug, Deserialize)]
pub struct ApiError {
    pub status_code: i32,
    pub status_message: String,
}

/// Provider status code for "the resource you requested could not be found".
pub const STATUS_NOT_FOUND: i32 = 34;

// One-time configuration document
#[derive(Debug, Deserialize, Default)]
pub struct Configuration {
    #[serde(default)]
    pub images: Option<ImagesConfiguration>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ImagesConfiguration {
    pub secure_base_url: Option<String>,
    #[serde(default)]
    pub poster_sizes: Vec<String>,
}

// Search responses
#[derive(Debug, Deserialize)]
pub struct SearchResponse<T> {
    pub results: Vec<T>,
    pub page: u32,
    pub total_pages: u32,
    #[serde(default)]
    pub total_results: u32,
}

#[derive(Debug, Deserialize)]
pub struct MovieResult {
    pub id: i64,
    pub title: String,
    pub release_date: Option<String>,
    pub poster_path: Option<String>,
    pub overview: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TvResult {
    pub id: i64,
    pub name: String,
    pub first_air_date: Option<String>,
    pub poster_path: Option<String>,
    pub overview: Option<String>,
}

// Detail responses
#[derive(Debug, Deserialize)]
pub struct MovieDetails {
    pub id: i64,
    pub title: String,
    pub overview: Option<String>,
    pub release_date: Option<String>,
    pub poster_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TvDetails {
    pub id: i64,
    pub name: String,
    pub overview: Option<String>,
    pub first_air_date: Option<String>,
    pub poster_path: Option<String>,
    #[serde(default)]
    pub number_of_seasons: Option<u32>,
    #[serde(default)]
    pub number_of_episodes: Option<u32>,
    #[serde(default)]
    pub seasons: Vec<SeasonSummary>,
}

/// Season stub inside a show detail payload. Only the number is consumed;
/// it drives the per-season fetches that carry the full data.
#[derive(Debug, Deserialize)]
pub struct SeasonSummary {
    pub season_number: u32,
}

#[derive(Debug, Deserialize)]
pub struct SeasonDetails {
    pub id: i64,
    pub season_number: u32,
    pub name: Option<String>,
    pub air_date: Option<String>,
    #[serde(default)]
    pub episodes: Vec<EpisodeDetails>,
}

#[derive(Debug, Deserialize)]
pub struct EpisodeDetails {
    pub id: i64,
    pub name: String,
    pub season_number: u32,
    pub episode_number: u32,
    pub air_date: Option<String>,
    pub overview: Option<String>,
}
