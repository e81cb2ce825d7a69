use chrono::Duration;
use std::convert::TryInto;
use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::error::SecurityError;

const PASSWORD_SALT: &str = "password.salt";
const JWT_SECRET: &str = "jwt.secret";

pub type Salt = [u8; 16];
pub type Secret = [u8; 32];

#[derive(Clone)]
pub struct Security {
    pub salt: Salt,
    pub jwt_secret: Secret,
    pub password_cost: u32,
    pub token_lifetime: Duration,
}

impl std::fmt::Debug for Security {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Security")
            .field("password_cost", &self.password_cost)
            .field("token_lifetime", &self.token_lifetime)
            .finish_non_exhaustive()
    }
}

fn load_or_generate<const N: usize>(
    dir: &Path,
    name: &str,
    generate: impl FnOnce() -> [u8; N],
) -> Result<[u8; N], SecurityError> {
    let path = dir.join(name);

    match fs::read(&path) {
        Ok(bytes) => {
            tracing::info!("Loaded '{}'.", path.display());
            bytes.try_into().map_err(|_| SecurityError::Malformed(path))
        }
        Err(_) if cfg!(feature = "generate-security") => {
            tracing::info!("'{}' not found. Generating a new one.", path.display());
            let value = generate();
            fs::write(&path, value)?;
            Ok(value)
        }
        Err(_) => Err(SecurityError::Missing(path)),
    }
}

impl Security {
    pub fn load(config: &Config) -> Result<Security, SecurityError> {
        let dir = config.security_dir.as_path();

        if cfg!(feature = "generate-security") {
            fs::create_dir_all(dir)
                .map_err(|e| SecurityError::Directory(dir.to_path_buf(), e))?;
        }

        tracing::info!("Loading password salt...");
        let salt = load_or_generate(dir, PASSWORD_SALT, rand::random)?;

        tracing::info!("Loading JWT signing secret...");
        let jwt_secret = load_or_generate(dir, JWT_SECRET, rand::random)?;

        Ok(Security {
            salt,
            jwt_secret,
            password_cost: config.password_cost,
            token_lifetime: Duration::hours(config.token_lifetime_hours),
        })
    }

    /// Random keys that only live as long as the process.
    pub fn ephemeral(config: &Config) -> Security {
        Security {
            salt: rand::random(),
            jwt_secret: rand::random(),
            password_cost: config.password_cost,
            token_lifetime: Duration::hours(config.token_lifetime_hours),
        }
    }
}
