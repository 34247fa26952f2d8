//! Search result types returned to API clients.

use serde::{Deserialize, Serialize};

/// One title matching a search query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub year: String,
    #[serde(rename = "imdbId")]
    pub imdb_id: String,
    /// "movie", "series" or "episode"
    #[serde(rename = "type")]
    pub media_type: String,
    /// Poster image URL, "N/A" when the provider has none
    pub poster: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_field_names() {
        let result = SearchResult {
            title: "Big Buck Bunny".to_string(),
            year: "2008".to_string(),
            imdb_id: "tt1254207".to_string(),
            media_type: "movie".to_string(),
            poster: "N/A".to_string(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["imdbId"], "tt1254207");
        assert_eq!(json["type"], "movie");
        assert_eq!(json["poster"], "N/A");
    }
}
