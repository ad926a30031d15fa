//! Environment variable mapping onto the schema.

use std::str::FromStr;

use crate::{
    error::{Error, Result},
    schema::GarupaConfig,
};

impl GarupaConfig {
    /// Build a config from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup. Empty and
    /// whitespace-only values count as unset, matching how orchestrators pass
    /// through blank variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key).and_then(|v| {
                let v = v.trim().to_owned();
                if v.is_empty() { None } else { Some(v) }
            })
        };

        let mut config = Self::default();

        if let Some(v) = get("GARUPA_BIND") {
            config.server.bind = v;
        }
        config.server.public_base_url =
            get("PUBLIC_BASE_URL").map(|v| v.trim_end_matches('/').to_owned());

        if let Some(v) = get("INSTAGRAM_VERIFY_TOKEN") {
            config.instagram.verify_token = v;
        }
        if let Some(v) = get("INSTAGRAM_ACCESS_TOKEN") {
            config.instagram.access_token = v;
        }
        config.instagram.app_secret = get("INSTAGRAM_APP_SECRET");
        if let Some(v) = get("INSTAGRAM_API_VERSION") {
            config.instagram.api_version = v;
        }

        config.openai.api_key = get("OPENAI_API_KEY");
        config.openai.api_base = get("OPENAI_API_BASE").map(|v| v.trim_end_matches('/').to_owned());
        if let Some(v) = get("AGENT_MODEL") {
            config.agent.model = v;
        }

        if let Some(v) = get("ENABLE_INSTAGRAM_AUDIO_REPLY") {
            config.voice.audio_replies_enabled = parse_bool("ENABLE_INSTAGRAM_AUDIO_REPLY", &v)?;
        }
        if let Some(v) = get("AUDIO_REPLY_MODEL") {
            config.voice.reply_model = v;
        }
        if let Some(v) = get("AUDIO_REPLY_VOICE") {
            config.voice.reply_voice = v;
        }

        config.lead.webhook_url = get("LEAD_WEBHOOK_URL");
        config.lead.webhook_token = get("LEAD_WEBHOOK_TOKEN");

        if let Some(v) = get("GARUPA_DB_PATH") {
            config.storage.db_path = v;
        }
        if let Some(v) = get("GARUPA_MEDIA_DIR") {
            config.storage.media_dir = v;
        }

        if let Some(v) = get("GARUPA_QUIET_PERIOD_SECS") {
            config.coalesce.quiet_period_secs = parse_number("GARUPA_QUIET_PERIOD_SECS", &v)?;
        }
        if let Some(v) = get("GARUPA_HANDOFF_TTL_SECS") {
            config.handoff.ttl_secs = parse_number("GARUPA_HANDOFF_TTL_SECS", &v)?;
        }

        Ok(config)
    }
}

fn parse_number<T>(key: &'static str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| Error::invalid_value(key, value, e.to_string()))
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::invalid_value(key, value, "expected a boolean")),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, std::collections::HashMap};

    fn from_map(vars: &[(&str, &str)]) -> Result<GarupaConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        GarupaConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = from_map(&[]).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.instagram.verify_token, "my_verify_token");
        assert_eq!(config.instagram.api_version, "v22.0");
        assert_eq!(config.agent.model, "gpt-4o-mini");
        assert_eq!(config.coalesce.quiet_period_secs, 5);
        assert_eq!(config.handoff.ttl_secs, 300);
        assert!(!config.voice.audio_replies_enabled);
    }

    #[test]
    fn overrides_take_effect() {
        let config = from_map(&[
            ("INSTAGRAM_ACCESS_TOKEN", "tok"),
            ("GARUPA_QUIET_PERIOD_SECS", "2"),
            ("ENABLE_INSTAGRAM_AUDIO_REPLY", "true"),
            ("PUBLIC_BASE_URL", "https://bot.example.com/"),
        ])
        .unwrap();
        assert_eq!(config.instagram.access_token, "tok");
        assert_eq!(config.coalesce.quiet_period_secs, 2);
        assert!(config.voice.audio_replies_enabled);
        // Trailing slash is stripped so URL joins stay clean.
        assert_eq!(
            config.server.public_base_url.as_deref(),
            Some("https://bot.example.com")
        );
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = from_map(&[("INSTAGRAM_APP_SECRET", "   ")]).unwrap();
        assert!(config.instagram.app_secret.is_none());
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let err = from_map(&[("GARUPA_QUIET_PERIOD_SECS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("GARUPA_QUIET_PERIOD_SECS"));
    }

    #[test]
    fn bad_booleans_are_rejected() {
        assert!(from_map(&[("ENABLE_INSTAGRAM_AUDIO_REPLY", "sim")]).is_err());
    }

    #[test]
    fn validate_flags_missing_credentials() {
        let config = from_map(&[]).unwrap();
        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains("INSTAGRAM_ACCESS_TOKEN")));
        assert!(warnings.iter().any(|w| w.contains("OPENAI_API_KEY")));
    }

    #[test]
    fn validate_is_quiet_when_fully_configured() {
        let config = from_map(&[
            ("INSTAGRAM_ACCESS_TOKEN", "tok"),
            ("INSTAGRAM_APP_SECRET", "secret"),
            ("OPENAI_API_KEY", "sk-test"),
            ("LEAD_WEBHOOK_URL", "https://hooks.example.com/leads"),
        ])
        .unwrap();
        assert!(config.validate().is_empty());
    }
}
