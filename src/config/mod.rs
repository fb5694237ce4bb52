use std::{env, error::Error, path::PathBuf, time::Duration};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub max_body_size_bytes: usize,
    pub retention: Duration,
    pub sweep_interval: Duration,
    pub trust_proxy: bool,
    pub static_dir: PathBuf,
}

const DEFAULT_PORT: &str = "3000";
const DEFAULT_DB_PATH: &str = "lobster-trap.db";
const DEFAULT_MAX_BODY_SIZE_BYTES: usize = 1_048_576;
const DEFAULT_RETENTION_SECS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60 * 60;
const DEFAULT_STATIC_DIR: &str = "public";

impl AppConfig {
    pub fn from_env() -> Result<Self, Box<dyn Error>> {
        let bind_addr = match env::var("BIND_ADDR") {
            Ok(raw) => raw,
            Err(env::VarError::NotPresent) => {
                let port = optional("PORT")?.unwrap_or_else(|| DEFAULT_PORT.to_owned());
                format!("0.0.0.0:{port}")
            }
            Err(err) => return Err(Box::new(err)),
        };
        let database_url = match env::var("DATABASE_URL") {
            Ok(raw) => raw,
            Err(env::VarError::NotPresent) => {
                let path = optional("DB_PATH")?.unwrap_or_else(|| DEFAULT_DB_PATH.to_owned());
                format!("sqlite://{path}")
            }
            Err(err) => return Err(Box::new(err)),
        };
        let max_body_size_bytes = match optional("MAX_BODY_SIZE_BYTES")? {
            Some(raw) => raw.parse::<usize>()?,
            None => DEFAULT_MAX_BODY_SIZE_BYTES,
        };
        let retention = match optional("RETENTION_SECS")? {
            Some(raw) => Duration::from_secs(raw.parse::<u64>()?),
            None => Duration::from_secs(DEFAULT_RETENTION_SECS),
        };
        let sweep_interval = match optional("SWEEP_INTERVAL_SECS")? {
            Some(raw) => Duration::from_secs(raw.parse::<u64>()?),
            None => Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        };
        if sweep_interval.is_zero() {
            return Err("SWEEP_INTERVAL_SECS must be greater than zero".into());
        }
        let trust_proxy = match optional("TRUST_PROXY")? {
            Some(raw) => parse_flag(&raw)?,
            None => false,
        };
        let static_dir = optional("STATIC_DIR")?
            .unwrap_or_else(|| DEFAULT_STATIC_DIR.to_owned())
            .into();

        Ok(Self {
            database_url,
            bind_addr,
            max_body_size_bytes,
            retention,
            sweep_interval,
            trust_proxy,
            static_dir,
        })
    }
}

fn optional(key: &str) -> Result<Option<String>, Box<dyn Error>> {
    match env::var(key) {
        Ok(raw) => Ok(Some(raw)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(Box::new(err)),
    }
}

fn parse_flag(raw: &str) -> Result<bool, Box<dyn Error>> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(format!("invalid boolean flag: {other}").into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    const KEYS: [&str; 9] = [
        "BIND_ADDR",
        "PORT",
        "DATABASE_URL",
        "DB_PATH",
        "MAX_BODY_SIZE_BYTES",
        "RETENTION_SECS",
        "SWEEP_INTERVAL_SECS",
        "TRUST_PROXY",
        "STATIC_DIR",
    ];

    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_env() {
        for key in KEYS {
            env::remove_var(key);
        }
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let _guard = env_lock().lock().expect("env lock should be acquired");
        clear_env();

        let config = AppConfig::from_env().expect("config should parse");

        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.database_url, "sqlite://lobster-trap.db");
        assert_eq!(config.max_body_size_bytes, 1_048_576);
        assert_eq!(config.retention, Duration::from_secs(604_800));
        assert_eq!(config.sweep_interval, Duration::from_secs(3_600));
        assert!(!config.trust_proxy);
        assert_eq!(config.static_dir, PathBuf::from("public"));
    }

    #[test]
    fn port_and_db_path_fill_in_derived_values() {
        let _guard = env_lock().lock().expect("env lock should be acquired");
        clear_env();
        env::set_var("PORT", "8080");
        env::set_var("DB_PATH", "/var/lib/trap.db");
        env::set_var("TRUST_PROXY", "yes");

        let config = AppConfig::from_env().expect("config should parse");
        clear_env();

        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.database_url, "sqlite:///var/lib/trap.db");
        assert!(config.trust_proxy);
    }

    #[test]
    fn rejects_malformed_numbers_and_zero_interval() {
        let _guard = env_lock().lock().expect("env lock should be acquired");
        clear_env();
        env::set_var("RETENTION_SECS", "a week");
        assert!(AppConfig::from_env().is_err());

        clear_env();
        env::set_var("SWEEP_INTERVAL_SECS", "0");
        assert!(AppConfig::from_env().is_err());
        clear_env();
    }
}
