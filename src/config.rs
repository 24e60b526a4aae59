use serde::Deserialize;

/// Upload ceiling advertised by the history-import screen.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Row count above which an import is logged as oversized. Not enforced.
pub const DEFAULT_IMPORT_SOFT_ROW_LIMIT: usize = 5_000;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Shared secret the session proxy sends in `X-Session-Secret`.
    pub session_proxy_secret: Option<String>,
    pub max_upload_bytes: usize,
    pub import_soft_row_limit: usize,
    /// Fill missing `gestor` from historical produto/gestor pairs on import.
    pub predict_gestor: bool,
    pub gestor_cache_ttl_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            session_proxy_secret: std::env::var("SESSION_PROXY_SECRET")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            max_upload_bytes: parse_or_default(
                "MAX_UPLOAD_BYTES",
                DEFAULT_MAX_UPLOAD_BYTES,
            )
            .and_then(|bytes| {
                if bytes == 0 {
                    anyhow::bail!("MAX_UPLOAD_BYTES must be greater than zero");
                }
                Ok(bytes)
            })?,
            import_soft_row_limit: parse_or_default(
                "IMPORT_SOFT_ROW_LIMIT",
                DEFAULT_IMPORT_SOFT_ROW_LIMIT,
            )?,
            predict_gestor: parse_flag("PREDICT_GESTOR", true)?,
            gestor_cache_ttl_secs: parse_or_default("GESTOR_CACHE_TTL_SECS", 300u64)?,
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        if config.session_proxy_secret.is_none() {
            tracing::warn!(
                "SESSION_PROXY_SECRET not set - session headers are trusted without verification"
            );
        }
        tracing::debug!("Server Port: {}", config.port);
        tracing::debug!(
            "Import limits: {} bytes, {} rows (soft)",
            config.max_upload_bytes,
            config.import_soft_row_limit
        );

        Ok(config)
    }
}

fn parse_or_default<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid number", key)),
        _ => Ok(default),
    }
}

fn parse_flag(key: &str, default: bool) -> anyhow::Result<bool> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => anyhow::bail!("{} must be true or false", key),
        },
        _ => Ok(default),
    }
}
