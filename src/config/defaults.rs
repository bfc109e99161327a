//! Default configuration values

use super::schema::Config;

/// Get the default configuration
pub fn default_config() -> Config {
    Config::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = default_config();
        assert_eq!(config.namespace, None);
        assert_eq!(config.webhook.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.trigger.debounce_seconds, 10);
        assert_eq!(config.trigger.min_interval_seconds, 30);
        assert_eq!(config.policy.config_map_name, "buildwright-policy");
    }
}
