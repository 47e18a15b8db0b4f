use serde::Deserialize;

/// Tokens are valid for a fixed day.
const TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppMode {
    Debug,
    Release,
}

impl AppMode {
    fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "debug" => Ok(Self::Debug),
            "release" => Ok(Self::Release),
            other => anyhow::bail!("unknown APP_MODE {other:?}, expected debug or release"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub ttl_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    pub name: String,
    pub port: u16,
    /// Full connection string; wins over the individual parts when set.
    pub url: Option<String>,
}

impl DbConfig {
    pub fn database_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub db: DbConfig,
    pub host: String,
    pub port: u16,
    pub jwt: JwtConfig,
    pub mode: AppMode,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup, so tests never touch process env.
    pub fn from_lookup<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let secret = get("JWT_SECRET").unwrap_or_default();
        if secret.is_empty() {
            anyhow::bail!("JWT_SECRET environment variable must be set");
        }

        let db = DbConfig {
            host: var("DB_HOST", "localhost"),
            user: var("DB_USER", "postgres"),
            password: var("DB_PASSWORD", ""),
            name: var("DB_NAME", "userauth"),
            port: parse_port("DB_PORT", &var("DB_PORT", "5432"))?,
            url: get("DATABASE_URL").filter(|v| !v.is_empty()),
        };

        Ok(Self {
            db,
            host: var("APP_HOST", "0.0.0.0"),
            port: parse_port("SERVER_PORT", &var("SERVER_PORT", "8080"))?,
            jwt: JwtConfig {
                secret,
                ttl_hours: TOKEN_TTL_HOURS,
            },
            mode: AppMode::parse(&var("APP_MODE", "debug"))?,
        })
    }
}

fn parse_port(key: &str, raw: &str) -> anyhow::Result<u16> {
    raw.trim()
        .parse::<u16>()
        .map_err(|e| anyhow::anyhow!("{key} must be a port number, got {raw:?}: {e}"))
}
