use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_addr: SocketAddr,
    /// Directory holding records.log and authorities.log.
    pub registry_dir: PathBuf,
    /// Master key table file (BMKT). Absent means a fresh pilot-scale
    /// table is generated at startup, which only suits development.
    pub key_table_path: Option<PathBuf>,
    /// Trusted roots file (BMRT).
    pub trusted_roots_path: Option<PathBuf>,
    /// Base URL of a remote MA validator. Absent means validation runs
    /// in-process.
    pub remote_validator: Option<String>,
    /// Hard bound on a remote validation round trip. A timeout is FAIL.
    pub validator_timeout: Duration,
    /// Retries for registry writes that fail with a storage error.
    pub storage_retries: u32,
    pub retry_backoff: Duration,
    pub auth_token: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".parse().unwrap(),
            registry_dir: PathBuf::from("./birthmark-data"),
            key_table_path: None,
            trusted_roots_path: None,
            remote_validator: None,
            validator_timeout: Duration::from_secs(5),
            storage_retries: 3,
            retry_backoff: Duration::from_millis(50),
            auth_token: None,
        }
    }
}

impl NodeConfig {
    /// Environment overrides over the defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(addr) = std::env::var("BIRTHMARK_BIND") {
            if let Ok(addr) = addr.parse() {
                cfg.bind_addr = addr;
            }
        }
        if let Ok(dir) = std::env::var("BIRTHMARK_REGISTRY_DIR") {
            cfg.registry_dir = PathBuf::from(dir);
        }
        if let Ok(path) = std::env::var("BIRTHMARK_KEY_TABLES") {
            cfg.key_table_path = Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("BIRTHMARK_TRUSTED_ROOTS") {
            cfg.trusted_roots_path = Some(PathBuf::from(path));
        }
        if let Ok(url) = std::env::var("BIRTHMARK_REMOTE_VALIDATOR") {
            cfg.remote_validator = Some(url);
        }
        if let Ok(secs) = std::env::var("BIRTHMARK_VALIDATOR_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                cfg.validator_timeout = Duration::from_secs(secs);
            }
        }
        if let Ok(retries) = std::env::var("BIRTHMARK_STORAGE_RETRIES") {
            if let Ok(retries) = retries.parse() {
                cfg.storage_retries = retries;
            }
        }
        if let Ok(ms) = std::env::var("BIRTHMARK_RETRY_BACKOFF_MS") {
            if let Ok(ms) = ms.parse() {
                cfg.retry_backoff = Duration::from_millis(ms);
            }
        }
        if let Ok(token) = std::env::var("BIRTHMARK_AUTH_TOKEN") {
            cfg.auth_token = Some(token);
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test touches the process environment; keeping it singular avoids
    // races with parallel test threads.
    #[test]
    fn env_overrides_storage_retry_settings() {
        std::env::set_var("BIRTHMARK_STORAGE_RETRIES", "7");
        std::env::set_var("BIRTHMARK_RETRY_BACKOFF_MS", "250");
        let cfg = NodeConfig::from_env();
        std::env::remove_var("BIRTHMARK_STORAGE_RETRIES");
        std::env::remove_var("BIRTHMARK_RETRY_BACKOFF_MS");

        assert_eq!(cfg.storage_retries, 7);
        assert_eq!(cfg.retry_backoff, Duration::from_millis(250));

        // Unset, the defaults hold.
        let cfg = NodeConfig::from_env();
        assert_eq!(cfg.storage_retries, 3);
        assert_eq!(cfg.retry_backoff, Duration::from_millis(50));
    }
}
