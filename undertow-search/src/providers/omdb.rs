//! OMDb API provider.

use async_trait::async_trait;
use serde::Deserialize;
use undertow_core::config::SearchConfig;
use url::Url;

use super::MetadataProvider;
use crate::errors::MediaSearchError;
use crate::types::SearchResult;

/// OMDb answers these with `Response: "False"` when nothing matched.
const NO_MATCH_MESSAGES: [&str; 3] = ["Movie not found!", "Series not found!", "Incorrect IMDb ID."];

#[derive(Debug, Deserialize)]
struct OmdbResponse {
    #[serde(rename = "Search", default)]
    search: Vec<OmdbItem>,
    #[serde(rename = "Response", default)]
    response: String,
    #[serde(rename = "Error")]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OmdbItem {
    #[serde(rename = "Title", default)]
    title: String,
    #[serde(rename = "Year", default)]
    year: String,
    #[serde(rename = "imdbID", default)]
    imdb_id: String,
    #[serde(rename = "Type", default)]
    media_type: String,
    #[serde(rename = "Poster", default)]
    poster: String,
}

impl From<OmdbItem> for SearchResult {
    fn from(item: OmdbItem) -> Self {
        Self {
            title: item.title,
            year: item.year,
            imdb_id: item.imdb_id,
            media_type: item.media_type,
            poster: item.poster,
        }
    }
}

/// Title search against `http://www.omdbapi.com/`.
#[derive(Debug)]
pub struct OmdbProvider {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

impl OmdbProvider {
    /// Creates the provider. A missing API key is reported on first search.
    ///
    /// # Errors
    /// - `MediaSearchError::NotConfigured` - Base URL is not a valid URL
    /// - `MediaSearchError::NetworkError` - HTTP client could not be built
    pub fn new(config: &SearchConfig) -> Result<Self, MediaSearchError> {
        let base_url =
            Url::parse(&config.omdb_base_url).map_err(|e| MediaSearchError::NotConfigured {
                reason: format!("invalid OMDb base URL '{}': {e}", config.omdb_base_url),
            })?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        let api_key = config.omdb_api_key.clone().filter(|key| !key.is_empty());
        if api_key.is_none() {
            tracing::warn!("OMDb API key is not set; searches will fail until OMDB_API_KEY is provided");
        }

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    fn search_url(&self, query: &str, api_key: &str) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("s", query)
            .append_pair("apikey", api_key);
        url
    }
}

/// Turns a decoded OMDb body into results.
fn interpret_response(
    query: &str,
    response: OmdbResponse,
) -> Result<Vec<SearchResult>, MediaSearchError> {
    if response.response.eq_ignore_ascii_case("false") {
        let message = response.error.unwrap_or_default();
        if NO_MATCH_MESSAGES.contains(&message.as_str()) {
            return Ok(Vec::new());
        }
        return Err(MediaSearchError::SearchFailed {
            query: query.to_string(),
            reason: format!("OMDb API error: {message}"),
        });
    }

    Ok(response.search.into_iter().map(SearchResult::from).collect())
}

#[async_trait]
impl MetadataProvider for OmdbProvider {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, MediaSearchError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| MediaSearchError::NotConfigured {
                reason: "OMDb API key is not configured".to_string(),
            })?;

        let response = self
            .client
            .get(self.search_url(query, api_key))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MediaSearchError::ProviderError {
                reason: format!("OMDb API request failed with status: {status}"),
            });
        }

        let body = response.text().await?;
        let decoded: OmdbResponse =
            serde_json::from_str(&body).map_err(|e| MediaSearchError::ParseError {
                reason: format!("failed to decode OMDb API response: {e}"),
            })?;

        let results = interpret_response(query, decoded)?;
        tracing::debug!("OMDb returned {} results for '{}'", results.len(), query);
        Ok(results)
    }

    fn name(&self) -> &'static str {
        "omdb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(body: &str) -> OmdbResponse {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_results_are_mapped() {
        let body = r#"{
            "Search": [
                {"Title": "Sintel", "Year": "2010", "imdbID": "tt1727587", "Type": "movie", "Poster": "https://img.example/sintel.jpg"},
                {"Title": "Sintel Making Of", "Year": "2011", "imdbID": "tt0000001", "Type": "episode", "Poster": "N/A"}
            ],
            "totalResults": "2",
            "Response": "True"
        }"#;

        let results = interpret_response("sintel", decode(body)).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].imdb_id, "tt1727587");
        assert_eq!(results[1].media_type, "episode");
    }

    #[test]
    fn test_not_found_is_empty() {
        for message in NO_MATCH_MESSAGES {
            let body = format!(r#"{{"Response": "False", "Error": "{message}"}}"#);
            assert!(interpret_response("zzz", decode(&body)).unwrap().is_empty());
        }
    }

    #[test]
    fn test_other_false_response_is_error() {
        let body = r#"{"Response": "False", "Error": "Invalid API key!"}"#;
        let result = interpret_response("sintel", decode(body));
        assert!(matches!(result, Err(MediaSearchError::SearchFailed { .. })));
    }

    #[test]
    fn test_search_url_encodes_query() {
        let provider = OmdbProvider::new(&SearchConfig::default()).unwrap();
        let url = provider.search_url("big buck & bunny", "k3y");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("s".to_string(), "big buck & bunny".to_string()),
                ("apikey".to_string(), "k3y".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_key_is_not_configured() {
        let provider = OmdbProvider::new(&SearchConfig::default()).unwrap();
        assert!(matches!(
            provider.search("sintel").await,
            Err(MediaSearchError::NotConfigured { .. })
        ));
    }
}
