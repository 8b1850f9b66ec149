use std::fmt;

use serde::{Deserialize, Serialize};

/// Vendor API key
///
/// `Debug` and `Display` only ever show a masked form; `expose` is the single
/// accessor that yields the usable secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// First and last four characters, or `****` for short keys
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 12 {
            return "****".to_string();
        }

        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}…{}", head, tail)
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey({})", self.masked())
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

impl From<&str> for ApiKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ApiKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masking() {
        let key = ApiKey::new("sk-abcdefghijklmnopwxyz");
        assert_eq!(key.masked(), "sk-a…wxyz");
        assert_eq!(format!("{:?}", key), "ApiKey(sk-a…wxyz)");
        assert_eq!(key.to_string(), "sk-a…wxyz");
        assert_eq!(key.expose(), "sk-abcdefghijklmnopwxyz");
    }

    #[test]
    fn test_short_key_fully_masked() {
        let key = ApiKey::new("short");
        assert_eq!(key.masked(), "****");
    }

    #[test]
    fn test_blank_key_is_empty() {
        assert!(ApiKey::new("   ").is_empty());
        assert!(!ApiKey::new("k").is_empty());
    }
}
