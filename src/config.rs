use serde::{Deserialize, Serialize};
use crate::error::ConfigurationError;
use crate::util;
use std::env;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    MongoDb,
    Memory,
}

fn default_storage() -> StorageBackend {
    match env::var("STORAGE_BACKEND").as_deref() {
        Ok("memory") => StorageBackend::Memory,
        _ => StorageBackend::MongoDb,
    }
}

fn default_mongodb_uri() -> String {
    env::var("MONGODB_URI").unwrap_or("mongodb://localhost:27017".to_string())
}

fn default_mongodb_db() -> String {
    env::var("MONGODB_DB_NAME").unwrap_or("dci".to_string())
}

fn default_public_content() -> PathBuf {
    PathBuf::from(env::var("PUBLIC_CONTENT_PATH").unwrap_or("./public".to_string()))
}

fn default_security_dir() -> PathBuf {
    PathBuf::from(env::var("SECURITY_DIR").unwrap_or("./security".to_string()))
}

#[cfg(debug_assertions)]
fn default_admin_emails() -> Vec<String> {
    vec![String::from("admin@localhost")]
}
#[cfg(not(debug_assertions))]
fn default_admin_emails() -> Vec<String> {
    vec![]
}

fn default_password_cost() -> u32 {
    12
}

fn default_token_lifetime_hours() -> i64 {
    24 * 7
}

fn default_payment_delay_ms() -> u64 {
    2000
}

fn default_currency() -> String {
    "NGN".to_string()
}

fn default_feed_capacity() -> usize {
    256
}

/// Rules used when a live-session schedule is generated for a course.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub per_module_cap: usize,
    pub hour_utc: u32,
    pub duration_minutes: u32,
    pub max_participants: u32,
    pub days_between_modules: i64,
    pub days_between_sessions: i64,
    pub meet_link_base: String,
    pub recording_base: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            per_module_cap: 3,
            hour_utc: 14,
            duration_minutes: 90,
            max_participants: 50,
            days_between_modules: 7,
            days_between_sessions: 2,
            meet_link_base: "https://meet.google.com".to_string(),
            recording_base: "https://drive.google.com/recordings".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip)]
    file_path: PathBuf,

    #[serde(default = "default_storage")]
    pub storage: StorageBackend,
    #[serde(default = "default_mongodb_uri")]
    pub mongodb_uri: String,
    #[serde(default = "default_mongodb_db")]
    pub mongodb_db: String,

    #[serde(default = "default_public_content")]
    pub public_content: PathBuf,
    #[serde(default = "default_security_dir")]
    pub security_dir: PathBuf,

    /// Accounts registered with one of these e-mails start out as admins.
    #[serde(default = "default_admin_emails")]
    pub admin_emails: Vec<String>,

    #[serde(default = "default_password_cost")]
    pub password_cost: u32,
    #[serde(default = "default_token_lifetime_hours")]
    pub token_lifetime_hours: i64,

    #[serde(default = "default_payment_delay_ms")]
    pub payment_delay_ms: u64,
    #[serde(default = "default_currency")]
    pub currency: String,

    #[serde(default)]
    pub seed_sample_data: bool,
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,

    #[serde(default)]
    pub sessions: SessionSettings,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            file_path: config_dir().join("settings.yml"),
            storage: default_storage(),
            mongodb_uri: default_mongodb_uri(),
            mongodb_db: default_mongodb_db(),
            public_content: default_public_content(),
            security_dir: default_security_dir(),
            admin_emails: default_admin_emails(),
            password_cost: default_password_cost(),
            token_lifetime_hours: default_token_lifetime_hours(),
            payment_delay_ms: default_payment_delay_ms(),
            currency: default_currency(),
            seed_sample_data: false,
            feed_capacity: default_feed_capacity(),
            sessions: SessionSettings::default(),
        }
    }
}

#[inline]
fn config_dir() -> PathBuf {
    PathBuf::from(env::var("CONFIG_DIR").unwrap_or("./config".to_string()))
}

impl Config {
    pub fn load() -> Result<Config, ConfigurationError> {
        let config_file = util::find_first_subpath(
            config_dir(),
            &["settings.yml", "settings.yaml"],
            Path::exists,
        )
        .ok_or_else(|| ConfigurationError::NotFound(config_dir()))?;

        let file = File::open(&config_file)?;
        let mut config: Config = serde_yaml::from_reader(BufReader::new(file))?;
        config.file_path = config_file;

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigurationError> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&self.file_path)?;
        let mut out = BufWriter::new(file);
        serde_yaml::to_writer(&mut out, self)?;
        out.flush()?;
        Ok(())
    }

    /// In-memory storage, instant payments and cheap password hashing.
    pub fn testing() -> Config {
        Config {
            storage: StorageBackend::Memory,
            admin_emails: vec![],
            password_cost: 4,
            payment_delay_ms: 0,
            seed_sample_data: false,
            ..Config::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_falls_back_to_defaults() {
        let config: Config = serde_yaml::from_str(
            "storage: memory\npayment_delay_ms: 10\nsessions:\n  per_module_cap: 2\n",
        )
        .expect("valid settings");

        assert_eq!(config.storage, StorageBackend::Memory);
        assert_eq!(config.payment_delay_ms, 10);
        assert_eq!(config.sessions.per_module_cap, 2);
        assert_eq!(config.sessions.hour_utc, 14);
        assert_eq!(config.currency, "NGN");
    }
}
