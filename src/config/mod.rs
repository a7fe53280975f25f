use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string (catalog, saved items, entitlements, history)
    pub database_url: String,

    /// Object storage bucket name (S3-compatible)
    pub s3_bucket: String,

    /// Object storage endpoint URL
    pub s3_endpoint: String,

    /// Object storage access key ID
    pub s3_access_key: String,

    /// Object storage secret access key
    pub s3_secret_key: String,

    /// Public base URL under which uploaded objects are reachable,
    /// e.g. "https://files.example.com/storage/v1/object/public/files"
    pub s3_public_base_url: String,

    /// Synthesis provider API key
    pub fashn_api_key: String,

    /// Synthesis provider base URL
    #[serde(default = "default_fashn_base_url")]
    pub fashn_base_url: String,

    /// remove.bg API key. Background removal is skipped when unset.
    pub removebg_api_key: Option<String>,

    /// Directory where saved results land (the device photo library analog)
    #[serde(default = "default_media_dir")]
    pub media_dir: String,

    /// Fixed delay before the first status query. The provider never resolves
    /// a job faster than this, so an earlier query is a wasted request.
    #[serde(default = "default_poll_quiescence_secs")]
    pub poll_quiescence_secs: u64,

    /// Initial interval between status queries
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Upper bound on the backed-off poll interval
    #[serde(default = "default_poll_max_interval_secs")]
    pub poll_max_interval_secs: u64,

    /// Wall-clock budget for the polling phase; the job is forced to a
    /// timeout failure once exceeded
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

fn default_fashn_base_url() -> String {
    "https://api.fashn.ai".to_string()
}

fn default_media_dir() -> String {
    "tryon-media".to_string()
}

fn default_poll_quiescence_secs() -> u64 {
    30
}

fn default_poll_interval_secs() -> u64 {
    3
}

fn default_poll_max_interval_secs() -> u64 {
    10
}

fn default_poll_timeout_secs() -> u64 {
    120
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_poll_tunables() {
        let config: AppConfig = serde_json::from_value(serde_json::json!({
            "database_url": "postgres://localhost/elo",
            "s3_bucket": "files",
            "s3_endpoint": "https://s3.example.com",
            "s3_access_key": "key",
            "s3_secret_key": "secret",
            "s3_public_base_url": "https://files.example.com/public",
            "fashn_api_key": "fa-test",
        }))
        .unwrap();

        assert_eq!(config.fashn_base_url, "https://api.fashn.ai");
        assert_eq!(config.poll_quiescence_secs, 30);
        assert_eq!(config.poll_interval_secs, 3);
        assert_eq!(config.poll_max_interval_secs, 10);
        assert_eq!(config.poll_timeout_secs, 120);
        assert!(config.removebg_api_key.is_none());
    }
}
