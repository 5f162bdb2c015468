use crate::core::{RegistryError, Result};
use crate::filter::SortField;
use std::time::Duration;

/// Registry and query engine configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Page size used when a caller does not ask for one
    pub default_page_size: usize,

    /// Upper bound applied to every requested page size
    pub max_page_size: usize,

    /// Cap on no-pagination reads; `None` returns the whole set
    pub unpaginated_limit: Option<usize>,

    /// How long locked reads and writes wait for another transaction's row lock
    pub lock_timeout: Duration,

    /// Ordering used when a read passes no sort keys
    pub default_sort: Vec<SortField>,
}

impl RegistryConfig {
    pub fn new() -> Self {
        Self {
            default_page_size: 10,
            max_page_size: 100,
            unpaginated_limit: None,
            lock_timeout: Duration::from_secs(5),
            default_sort: vec![SortField::desc("created_at")],
        }
    }

    /// Set the default page size
    pub fn default_page_size(mut self, size: usize) -> Self {
        self.default_page_size = size;
        self
    }

    /// Set the maximum page size
    pub fn max_page_size(mut self, size: usize) -> Self {
        self.max_page_size = size;
        self
    }

    /// Cap no-pagination reads
    pub fn unpaginated_limit(mut self, limit: usize) -> Self {
        self.unpaginated_limit = Some(limit);
        self
    }

    /// Set the row lock timeout
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Set the fallback ordering
    pub fn default_sort(mut self, sort: Vec<SortField>) -> Self {
        self.default_sort = sort;
        self
    }

    /// Defaults overridden by `REGISTRY_DEFAULT_PAGE_SIZE`, `REGISTRY_MAX_PAGE_SIZE`,
    /// `REGISTRY_UNPAGINATED_LIMIT` and `REGISTRY_LOCK_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let read = |key: &str| -> Result<Option<u64>> {
            match lookup(key) {
                None => Ok(None),
                Some(raw) if raw.trim().is_empty() => Ok(None),
                Some(raw) => raw.trim().parse::<u64>().map(Some).map_err(|e| {
                    RegistryError::Validation(format!("{} must be a number, got '{}': {}", key, raw, e))
                }),
            }
        };

        let mut config = Self::new();
        if let Some(size) = read("REGISTRY_DEFAULT_PAGE_SIZE")? {
            config.default_page_size = size as usize;
        }
        if let Some(size) = read("REGISTRY_MAX_PAGE_SIZE")? {
            config.max_page_size = size as usize;
        }
        if let Some(limit) = read("REGISTRY_UNPAGINATED_LIMIT")? {
            config.unpaginated_limit = Some(limit as usize);
        }
        if let Some(ms) = read("REGISTRY_LOCK_TIMEOUT_MS")? {
            config.lock_timeout = Duration::from_millis(ms);
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_page_size == 0 {
            return Err(RegistryError::Validation(
                "max_page_size must be > 0".to_string(),
            ));
        }

        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(RegistryError::Validation(
                "default_page_size must be between 1 and max_page_size".to_string(),
            ));
        }

        if self.unpaginated_limit == Some(0) {
            return Err(RegistryError::Validation(
                "unpaginated_limit must be > 0 when set".to_string(),
            ));
        }

        if self.lock_timeout.is_zero() {
            return Err(RegistryError::Validation(
                "lock_timeout must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = RegistryConfig::default();
        assert_eq!(config.default_page_size, 10);
        assert_eq!(config.max_page_size, 100);
        assert_eq!(config.unpaginated_limit, None);
        assert_eq!(config.default_sort, vec![SortField::desc("created_at")]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_validation() {
        assert!(RegistryConfig::new().max_page_size(5).validate().is_err());
        assert!(RegistryConfig::new()
            .default_page_size(5)
            .max_page_size(5)
            .validate()
            .is_ok());
        assert!(RegistryConfig::new()
            .lock_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_environment_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("REGISTRY_MAX_PAGE_SIZE", "50"),
            ("REGISTRY_UNPAGINATED_LIMIT", "1000"),
            ("REGISTRY_LOCK_TIMEOUT_MS", "250"),
            ("REGISTRY_DEFAULT_PAGE_SIZE", ""),
        ]);
        let config =
            RegistryConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.max_page_size, 50);
        assert_eq!(config.default_page_size, 10);
        assert_eq!(config.unpaginated_limit, Some(1000));
        assert_eq!(config.lock_timeout, Duration::from_millis(250));

        let bad = RegistryConfig::from_lookup(|key| {
            (key == "REGISTRY_MAX_PAGE_SIZE").then(|| "lots".to_string())
        });
        assert!(bad.is_err());
    }
}
