use config::{Config, ConfigError, Environment, File, Map};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Telegram {
    pub token: String,
    pub operator_id: i64,
    pub relay_channel: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Catbox {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Enhancer {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Http {
    pub listen: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Limits {
    pub signup_credits: i32,
    pub referral_bonus: i32,
    pub daily_quota: i32,
    pub pending_action_secs: u64,
    pub link_ttl_secs: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            signup_credits: 50,
            referral_bonus: 30,
            daily_quota: 50,
            pending_action_secs: 300,
            link_ttl_secs: 86_400,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Handles {
    pub salt: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub telegram: Telegram,
    pub postgres: Postgres,
    pub catbox: Catbox,
    pub enhancer: Enhancer,
    pub http: Http,
    pub limits: Limits,
    pub handles: Handles,
}

/// Unprefixed names kept from earlier deployments, mapped onto settings keys.
const LEGACY_KEYS: [(&str, &str); 4] = [
    ("BOT_TOKEN", "TELEGRAM__TOKEN"),
    ("ADMIN_ID", "TELEGRAM__OPERATOR_ID"),
    ("CHANNEL_ID", "TELEGRAM__RELAY_CHANNEL"),
    ("DATABASE_URL", "POSTGRES__URL"),
];

impl Settings {
    /// Loads settings from an optional TOML file, then from the legacy
    /// `BOT_TOKEN`/`ADMIN_ID`/`CHANNEL_ID`/`DATABASE_URL` variables, then from
    /// `ENHANCE_BOT_*` environment variables (`ENHANCE_BOT_TELEGRAM__TOKEN`, ...).
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        Self::load(path, std::env::vars().collect())
    }

    fn load(path: &str, vars: Vec<(String, String)>) -> Result<Self, ConfigError> {
        let limits = Limits::default();

        let legacy: Map<String, String> = vars
            .iter()
            .filter_map(|(name, value)| {
                LEGACY_KEYS
                    .iter()
                    .find(|(legacy, _)| *legacy == name.as_str())
                    .map(|(_, key)| (key.to_string(), value.clone()))
            })
            .collect();
        let prefixed: Map<String, String> = vars.into_iter().collect();

        let config = Config::builder()
            .set_default("postgres.max_connections", 5)?
            .set_default("catbox.url", "https://catbox.moe/user/api.php")?
            .set_default(
                "enhancer.url",
                "https://romek-xd-api.vercel.app/imagecreator/remini",
            )?
            .set_default("http.listen", "0.0.0.0:8080")?
            .set_default("http.timeout_secs", 60)?
            .set_default("limits.signup_credits", limits.signup_credits)?
            .set_default("limits.referral_bonus", limits.referral_bonus)?
            .set_default("limits.daily_quota", limits.daily_quota)?
            .set_default("limits.pending_action_secs", limits.pending_action_secs as i64)?
            .set_default("limits.link_ttl_secs", limits.link_ttl_secs as i64)?
            .set_default("handles.salt", "")?
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(legacy)),
            )
            .add_source(
                Environment::with_prefix("ENHANCE_BOT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(prefixed)),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect()
    }

    fn legacy_vars() -> Vec<(String, String)> {
        vars(&[
            ("BOT_TOKEN", "123:abc"),
            ("ADMIN_ID", "42"),
            ("CHANNEL_ID", "-1001234567890"),
            ("DATABASE_URL", "postgres://bot@localhost/enhance"),
            ("PATH", "/usr/bin"),
        ])
    }

    #[test]
    fn reads_legacy_variable_names() {
        let settings = Settings::load("missing-settings.toml", legacy_vars()).unwrap();

        assert_eq!(settings.telegram.token, "123:abc");
        assert_eq!(settings.telegram.operator_id, 42);
        assert_eq!(settings.telegram.relay_channel, -1001234567890);
        assert_eq!(settings.postgres.url, "postgres://bot@localhost/enhance");
        assert_eq!(settings.postgres.max_connections, 5);
        assert_eq!(settings.limits.daily_quota, 50);
    }

    #[test]
    fn prefixed_variables_win_over_legacy_names() {
        let mut env = legacy_vars();
        env.extend(vars(&[
            ("ENHANCE_BOT_TELEGRAM__TOKEN", "456:def"),
            ("ENHANCE_BOT_LIMITS__DAILY_QUOTA", "10"),
        ]));

        let settings = Settings::load("missing-settings.toml", env).unwrap();

        assert_eq!(settings.telegram.token, "456:def");
        assert_eq!(settings.telegram.operator_id, 42);
        assert_eq!(settings.limits.daily_quota, 10);
    }

    #[test]
    fn missing_token_is_an_error() {
        let env = vars(&[("ADMIN_ID", "42"), ("CHANNEL_ID", "-100")]);

        assert!(Settings::load("missing-settings.toml", env).is_err());
    }
}
