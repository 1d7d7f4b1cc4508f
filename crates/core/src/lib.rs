pub mod chat;
pub mod dashboard;
pub mod domain;
pub mod llm;
pub mod market;
pub mod refresh;
pub mod render;

pub mod config {
    use anyhow::Context;

    pub const DEFAULT_REFRESH_INTERVAL_SECS: u32 = 600;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub gemini_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub refresh_interval_secs: u32,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let refresh_interval_secs = match std::env::var("REFRESH_INTERVAL_SECS") {
                Ok(s) => s
                    .trim()
                    .parse::<u32>()
                    .with_context(|| format!("REFRESH_INTERVAL_SECS is not a number: {s}"))?,
                Err(_) => DEFAULT_REFRESH_INTERVAL_SECS,
            };
            anyhow::ensure!(
                refresh_interval_secs >= 1,
                "REFRESH_INTERVAL_SECS must be at least 1"
            );

            Ok(Self {
                gemini_api_key: std::env::var("GEMINI_API_KEY")
                    .or_else(|_| std::env::var("API_KEY"))
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                refresh_interval_secs,
            })
        }
    }
}
