//! Demo provider for development mode.

use async_trait::async_trait;

use super::MetadataProvider;
use crate::errors::MediaSearchError;
use crate::types::SearchResult;

const CATALOGUE: [(&str, &str, &str, &str); 6] = [
    ("Big Buck Bunny", "2008", "tt1254207", "movie"),
    ("Elephants Dream", "2006", "tt0807840", "movie"),
    ("Sintel", "2010", "tt1727587", "movie"),
    ("Tears of Steel", "2012", "tt2285752", "movie"),
    ("Cosmos Laundromat", "2015", "tt4957236", "movie"),
    ("Caminandes", "2013", "tt3256226", "series"),
];

/// Answers searches from a fixed catalogue of open movies.
#[derive(Debug, Default)]
pub struct DemoProvider;

impl DemoProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MetadataProvider for DemoProvider {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, MediaSearchError> {
        let needle = query.trim().to_lowercase();
        Ok(CATALOGUE
            .iter()
            .filter(|(title, ..)| title.to_lowercase().contains(&needle))
            .map(|(title, year, imdb_id, media_type)| SearchResult {
                title: title.to_string(),
                year: year.to_string(),
                imdb_id: imdb_id.to_string(),
                media_type: media_type.to_string(),
                poster: "N/A".to_string(),
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "demo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_case_insensitive_match() {
        let results = DemoProvider::new().search("SINTEL").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].imdb_id, "tt1727587");
    }

    #[tokio::test]
    async fn test_no_match_is_empty() {
        assert!(DemoProvider::new().search("zzzz").await.unwrap().is_empty());
    }
}
