//! The fixed set of monitored endpoints.

use std::collections::HashSet;
use std::ops::Deref;

use url::Url;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no targets configured")]
    Empty,
    #[error("invalid target `{target}`: {reason}")]
    InvalidTarget { target: String, reason: String },
}

/// Immutable, ordered list of target identifiers established at startup.
///
/// Entries are trimmed, blanks dropped and duplicates removed keeping the first occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRegistry {
    targets: Vec<String>,
}

impl TargetRegistry {
    pub fn new<I, S>(raw: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut targets = Vec::new();

        for entry in raw {
            let target = entry.as_ref().trim();
            if target.is_empty() || !seen.insert(target.to_string()) {
                continue;
            }
            validate_target(target)?;
            targets.push(target.to_string());
        }

        if targets.is_empty() {
            return Err(RegistryError::Empty);
        }

        Ok(Self { targets })
    }

    #[cfg(test)]
    pub(crate) fn from_csv(raw: &str) -> Result<Self, RegistryError> {
        Self::new(raw.split(','))
    }
}

impl Deref for TargetRegistry {
    type Target = [String];

    fn deref(&self) -> &Self::Target {
        &self.targets
    }
}

/// Targets are probed over HTTP, so each must be an absolute http(s) URL with a host
fn validate_target(target: &str) -> Result<(), RegistryError> {
    let invalid = |reason: String| RegistryError::InvalidTarget { target: target.to_string(), reason };

    let url = Url::parse(target).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme `{other}`"))),
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    if url.port() == Some(0) {
        return Err(invalid("port 0 is not valid".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_and_deduplicates_preserving_order() {
        let registry = TargetRegistry::from_csv(
            " https://b.example , https://a.example,https://b.example,, https://c.example ",
        )
        .unwrap();

        assert_eq!(
            &*registry,
            ["https://b.example", "https://a.example", "https://c.example"]
        );
    }

    #[test]
    fn empty_list_is_rejected() {
        assert_eq!(TargetRegistry::from_csv(" , ,"), Err(RegistryError::Empty));
        assert_eq!(TargetRegistry::new(Vec::<String>::new()), Err(RegistryError::Empty));
    }

    #[test]
    fn rejects_non_http_targets() {
        assert!(matches!(
            TargetRegistry::from_csv("ftp://example.com"),
            Err(RegistryError::InvalidTarget { .. })
        ));
        assert!(TargetRegistry::from_csv("not a url").is_err());
        assert!(TargetRegistry::from_csv("http://example.com:0").is_err());
    }

    #[test]
    fn allows_private_addresses() {
        // Home-network monitoring is a normal use case.
        assert!(TargetRegistry::from_csv("http://192.168.1.1,http://localhost:8080").is_ok());
    }
}
