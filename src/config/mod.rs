//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::game::MatchSettings;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Supabase project URL
    pub supabase_url: String,
    /// Supabase service role key (bypasses RLS - server only!)
    pub supabase_service_role_key: String,

    /// Allowed client origins for CORS; empty allows any origin
    pub client_origins: Vec<String>,

    /// Gameplay tunables applied to every new match
    pub match_settings: MatchSettings,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Render provides PORT env var, fall back to SERVER_ADDR or default
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port),
            None => lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        };

        let defaults = MatchSettings::default();
        let bot_spawn_delay_secs: u64 =
            parse_or(&lookup, "BOT_SPAWN_DELAY_SECS", defaults.bot_spawn_delay_ms / 1000)?;

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),

            supabase_url: lookup("SUPABASE_URL").ok_or(ConfigError::Missing("SUPABASE_URL"))?,
            supabase_service_role_key: lookup("SUPABASE_SERVICE_ROLE_KEY")
                .ok_or(ConfigError::Missing("SUPABASE_SERVICE_ROLE_KEY"))?,

            client_origins: lookup("CLIENT_ORIGIN")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),

            match_settings: MatchSettings {
                duration_secs: parse_or(&lookup, "MATCH_DURATION_SECS", defaults.duration_secs)?,
                bot_spawn_delay_ms: bot_spawn_delay_secs
                    .checked_mul(1000)
                    .ok_or(ConfigError::Invalid("BOT_SPAWN_DELAY_SECS"))?,
                bot_enabled: parse_or(&lookup, "BOT_ENABLED", defaults.bot_enabled)?,
            },
        })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            log_level: "debug".to_string(),
            supabase_url: "http://127.0.0.1:9".to_string(),
            supabase_service_role_key: "test-key".to_string(),
            client_origins: Vec::new(),
            match_settings: MatchSettings::default(),
        }
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("SUPABASE_URL", "https://example.supabase.co"),
        ("SUPABASE_SERVICE_ROLE_KEY", "secret"),
    ];

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(config.server_addr.port(), 8080);
        assert_eq!(config.log_level, "info");
        assert!(config.client_origins.is_empty());
        assert_eq!(config.match_settings, MatchSettings::default());
    }

    #[test]
    fn port_and_match_settings_override() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("PORT", "3000"),
            ("MATCH_DURATION_SECS", "90"),
            ("BOT_SPAWN_DELAY_SECS", "10"),
            ("BOT_ENABLED", "false"),
            ("CLIENT_ORIGIN", "https://a.example, https://b.example"),
        ]);
        let config = Config::from_lookup(lookup(&vars)).unwrap();

        assert_eq!(config.server_addr.port(), 3000);
        assert_eq!(config.match_settings.duration_secs, 90);
        assert_eq!(config.match_settings.bot_spawn_delay_ms, 10_000);
        assert!(!config.match_settings.bot_enabled);
        assert_eq!(
            config.client_origins,
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn missing_and_invalid_values_are_reported() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("SUPABASE_URL")));

        let mut vars = REQUIRED.to_vec();
        vars.push(("MATCH_DURATION_SECS", "soon"));
        let err = Config::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("MATCH_DURATION_SECS")));
    }

    #[test]
    fn oversized_bot_delay_is_rejected() {
        // Parses as u64 but overflows once converted to milliseconds
        let mut vars = REQUIRED.to_vec();
        vars.push(("BOT_SPAWN_DELAY_SECS", "18446744073709551615"));
        let err = Config::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("BOT_SPAWN_DELAY_SECS")));
    }
}
