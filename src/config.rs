use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    /// Upper bound for mutex waits that carry no timeout of their own.
    pub mutex_max_wait: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9876".to_string(),
            mutex_max_wait: None,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let mutex_max_wait = match env::var("MUTEX_MAX_WAIT_MS") {
            Ok(raw) => {
                let ms: u64 = raw
                    .parse()
                    .map_err(|_| anyhow::anyhow!("MUTEX_MAX_WAIT_MS must be a positive integer"))?;
                if ms == 0 {
                    anyhow::bail!("MUTEX_MAX_WAIT_MS must be a positive integer");
                }
                Some(Duration::from_millis(ms))
            }
            Err(_) => None,
        };

        Ok(Config {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:9876".to_string()),
            mutex_max_wait,
        })
    }
}
