// src/config.rs
use anyhow::{Context, Result};
use std::str::FromStr;

const DEFAULT_LLM_MODEL: &str = "minimax/minimax-m2.5";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";

/// Process configuration. Credentials are required; tunables fall back to
/// defaults when unset or unparseable.
#[derive(Debug, Clone)]
pub struct Settings {
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub finnhub_api_key: String,
    pub gnews_api_key: String,
    pub openrouter_api_key: String,
    pub llm_model: String,
    pub bind_addr: String,
    pub batch_size: usize,
    pub stale_after_secs: u64,
    pub sweep_cap: usize,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            supabase_url: required("SUPABASE_URL")?,
            supabase_service_key: required("SUPABASE_SERVICE_KEY")?,
            finnhub_api_key: required("FINNHUB_API_KEY")?,
            gnews_api_key: required("GNEWS_API_KEY")?,
            openrouter_api_key: required("OPENROUTER_API_KEY")?,
            llm_model: std::env::var("LLM_MODEL")
                .unwrap_or_else(|_| DEFAULT_LLM_MODEL.to_string()),
            bind_addr: std::env::var("BIND_ADDR")
                .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string()),
            batch_size: env_or("PIPELINE_BATCH_SIZE", 5),
            stale_after_secs: env_or("PIPELINE_STALE_AFTER_SECS", 600),
            sweep_cap: env_or("PIPELINE_SWEEP_CAP", 25),
        })
    }
}

fn required(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("missing {name} env var"))
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[serial_test::serial]
    #[test]
    fn env_or_falls_back_on_garbage() {
        std::env::set_var("PIPELINE_BATCH_SIZE", "not-a-number");
        assert_eq!(env_or("PIPELINE_BATCH_SIZE", 5usize), 5);
        std::env::set_var("PIPELINE_BATCH_SIZE", "9");
        assert_eq!(env_or("PIPELINE_BATCH_SIZE", 5usize), 9);
        std::env::remove_var("PIPELINE_BATCH_SIZE");
        assert_eq!(env_or("PIPELINE_BATCH_SIZE", 5usize), 5);
    }
}
