//! Magnet descriptor parsing

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use super::SourceError;

const BTIH_PREFIX: &str = "urn:btih:";

/// SHA-1 hash identifying a unique torrent.
///
/// Magnet links carry it either as 40 hex characters or as 32 base32
/// characters; both forms decode to the same 20 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Creates InfoHash from 20-byte SHA-1 hash.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Returns reference to underlying 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Parses the hex form used in most magnet links.
    ///
    /// # Errors
    /// - `SourceError::InvalidDescriptor` - Wrong length or non-hex characters
    pub fn from_hex(value: &str) -> Result<Self, SourceError> {
        let bytes = hex::decode(value).map_err(|e| SourceError::InvalidDescriptor {
            reason: format!("Invalid hex info hash '{value}': {e}"),
        })?;
        let hash: [u8; 20] = bytes
            .try_into()
            .map_err(|_| SourceError::InvalidDescriptor {
                reason: format!("Invalid hash length: {} (expected 40)", value.len()),
            })?;
        Ok(Self(hash))
    }

    /// Parses the RFC 4648 base32 form.
    ///
    /// # Errors
    /// - `SourceError::InvalidDescriptor` - Wrong length or characters outside the alphabet
    pub fn from_base32(value: &str) -> Result<Self, SourceError> {
        if value.len() != 32 {
            return Err(SourceError::InvalidDescriptor {
                reason: format!("Invalid hash length: {} (expected 32)", value.len()),
            });
        }

        let mut hash = [0u8; 20];
        let mut buffer: u64 = 0;
        let mut bits = 0;
        let mut index = 0;

        for c in value.chars() {
            let digit = match c.to_ascii_uppercase() {
                letter @ 'A'..='Z' => letter as u64 - 'A' as u64,
                number @ '2'..='7' => number as u64 - '2' as u64 + 26,
                _ => {
                    return Err(SourceError::InvalidDescriptor {
                        reason: format!("Invalid base32 character '{c}' in info hash"),
                    });
                }
            };
            buffer = (buffer << 5) | digit;
            bits += 5;
            if bits >= 8 {
                bits -= 8;
                hash[index] = (buffer >> bits) as u8;
                index += 1;
            }
        }

        Ok(Self(hash))
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for InfoHash {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.len() {
            32 => Self::from_base32(s),
            _ => Self::from_hex(s),
        }
    }
}

impl From<InfoHash> for String {
    fn from(hash: InfoHash) -> Self {
        hash.to_string()
    }
}

impl TryFrom<String> for InfoHash {
    type Error = SourceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Parsed `magnet:` descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetLink {
    /// Exact topic (`xt=urn:btih:`)
    pub info_hash: InfoHash,
    /// Display name (`dn`)
    pub display_name: Option<String>,
    /// Tracker URLs (`tr`)
    pub trackers: Vec<String>,
    /// HTTP web seeds (`ws`)
    pub web_seeds: Vec<Url>,
    /// Exact length in bytes (`xl`)
    pub exact_length: Option<u64>,
}

impl MagnetLink {
    /// Parses a magnet URI.
    ///
    /// # Errors
    /// - `SourceError::InvalidDescriptor` - Not a magnet URI, or no usable BitTorrent info hash
    pub fn parse(descriptor: &str) -> Result<Self, SourceError> {
        let descriptor = descriptor.trim();
        if descriptor.is_empty() {
            return Err(SourceError::InvalidDescriptor {
                reason: "empty descriptor".to_string(),
            });
        }

        let magnet =
            magnet_url::Magnet::new(descriptor).map_err(|e| SourceError::InvalidDescriptor {
                reason: format!("Invalid magnet link: {e}"),
            })?;

        let url = Url::parse(descriptor).map_err(|e| SourceError::InvalidDescriptor {
            reason: format!("Invalid magnet link: {e}"),
        })?;
        if url.scheme() != "magnet" {
            return Err(SourceError::InvalidDescriptor {
                reason: format!("Unsupported scheme '{}'", url.scheme()),
            });
        }

        let mut info_hash = None;
        let mut display_name = None;
        let mut web_seeds = Vec::new();
        let mut exact_length = None;

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "xt" => {
                    if let Some(hash) = value.strip_prefix(BTIH_PREFIX) {
                        info_hash = Some(hash.parse::<InfoHash>()?);
                    }
                }
                "dn" if !value.is_empty() => display_name = Some(value.into_owned()),
                "ws" => match Url::parse(&value) {
                    Ok(seed) if matches!(seed.scheme(), "http" | "https") => web_seeds.push(seed),
                    _ => tracing::debug!("Ignoring unusable web seed: {}", value),
                },
                "xl" => exact_length = value.parse().ok(),
                _ => {}
            }
        }

        let info_hash = info_hash.ok_or_else(|| SourceError::InvalidDescriptor {
            reason: format!("Missing or invalid info hash in magnet link: {descriptor}"),
        })?;

        Ok(Self {
            info_hash,
            display_name,
            trackers: magnet.trackers().to_vec(),
            web_seeds,
            exact_length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH_HEX: &str = "0123456789abcdef0123456789abcdef01234567";

    #[test]
    fn test_info_hash_display() {
        let hash = [
            0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef, 0x01, 0x23, 0x45, 0x67, 0x89, 0xab,
            0xcd, 0xef, 0x01, 0x23, 0x45, 0x67,
        ];
        assert_eq!(InfoHash::new(hash).to_string(), HASH_HEX);
    }

    #[test]
    fn test_base32_and_hex_agree() {
        // base32 of 0x00..0x13 (twenty bytes counting up from zero)
        let bytes: [u8; 20] = std::array::from_fn(|i| i as u8);
        let from_hex = InfoHash::from_hex(&hex::encode(bytes)).unwrap();
        let from_base32 = InfoHash::from_base32("AAAQEAYEAUDAOCAJBIFQYDIOB4IBCEQT").unwrap();
        assert_eq!(from_hex, from_base32);
        assert_eq!(from_hex.as_bytes(), &bytes);
    }

    #[test]
    fn test_parse_full_magnet() {
        let descriptor = format!(
            "magnet:?xt=urn:btih:{HASH_HEX}&dn=Big%20Buck%20Bunny&tr=http://tracker.example.com/announce&ws=https://seed.example.com/bbb.mkv&xl=5000"
        );
        let magnet = MagnetLink::parse(&descriptor).unwrap();

        assert_eq!(magnet.info_hash.to_string(), HASH_HEX);
        assert_eq!(magnet.display_name.as_deref(), Some("Big Buck Bunny"));
        assert_eq!(magnet.web_seeds.len(), 1);
        assert_eq!(magnet.web_seeds[0].path(), "/bbb.mkv");
        assert_eq!(magnet.exact_length, Some(5000));
    }

    #[test]
    fn test_parse_rejects_missing_info_hash() {
        let result = MagnetLink::parse("magnet:?dn=Test%20Torrent&tr=http://tracker.example.com/announce");
        assert!(matches!(result, Err(SourceError::InvalidDescriptor { .. })));
    }

    #[test]
    fn test_parse_rejects_short_hash() {
        let result = MagnetLink::parse("magnet:?xt=urn:btih:tooshort&dn=Test");
        assert!(matches!(result, Err(SourceError::InvalidDescriptor { .. })));
    }

    #[test]
    fn test_parse_rejects_non_magnet() {
        assert!(MagnetLink::parse("").is_err());
        assert!(MagnetLink::parse("https://example.com/file.torrent").is_err());
    }

    #[test]
    fn test_info_hash_serde_uses_hex() {
        let hash = InfoHash::from_hex(HASH_HEX).unwrap();
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{HASH_HEX}\""));
        let back: InfoHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }
}
