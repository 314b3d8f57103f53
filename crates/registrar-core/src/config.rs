use serde::{Deserialize, Serialize};

/// Registration lifetime granted when the client asks for none, in seconds
pub const DEFAULT_EXPIRY: u32 = 3600;

/// Longest registration lifetime granted, in seconds
pub const MAX_EXPIRY: u32 = 7200;

/// Registrar settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrarConfig {
    /// Domain registrations are accepted for
    pub domain: String,
    /// Lifetime when the REGISTER carries no `Expires`
    pub default_expiry: u32,
    /// Upper bound on any requested lifetime
    pub max_expiry: u32,
}

impl RegistrarConfig {
    /// Settings for `domain` with the default lifetimes
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Self::default()
        }
    }

    /// Lifetime granted for a requested one
    pub fn grant(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_expiry)
            .min(self.max_expiry)
    }
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            domain: "localhost".to_string(),
            default_expiry: DEFAULT_EXPIRY,
            max_expiry: MAX_EXPIRY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant() {
        let config = RegistrarConfig::new("example.com");
        assert_eq!(config.grant(None), 3600);
        assert_eq!(config.grant(Some(60)), 60);
        assert_eq!(config.grant(Some(86400)), 7200);
    }

    #[test]
    fn test_partial_toml() {
        let config: RegistrarConfig = toml::from_str("domain = \"example.com\"").unwrap();
        assert_eq!(config, RegistrarConfig::new("example.com"));
    }
}
