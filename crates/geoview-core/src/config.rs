//! Configuration module
//!
//! All runtime knobs live in one explicit struct that is loaded once at
//! startup and passed down to the pieces that need it (the ingestion
//! pipeline takes it by reference in its constructor). Nothing reads
//! process-wide state after startup, so tests can build an `AppConfig`
//! by hand and vary the scratch directory, upload ceiling, or default
//! SRID per case.

use std::env;
use std::path::PathBuf;

const MAX_CONNECTIONS: u32 = 10;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const MAX_UPLOAD_SIZE_MB: usize = 100;
const DEFAULT_SRID: u32 = 4326;

/// Application configuration.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_port: u16,
    pub database_url: String,
    pub cors_origins: Vec<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub environment: String,
    /// Hard ceiling on upload body size, enforced before the pipeline runs.
    pub max_upload_size_bytes: usize,
    /// Root directory for staged archives and their expansion scratch dirs.
    pub scratch_dir: PathBuf,
    /// SRID every imported table is normalized to (WGS84 unless overridden).
    pub default_srid: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let cors_origins_str = env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string());
        let is_production =
            environment.to_lowercase() == "production" || environment.to_lowercase() == "prod";
        if is_production && cors_origins_str.trim() == "*" {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }

        let cors_origins: Vec<String> = cors_origins_str
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let max_upload_size_mb = env::var("MAX_UPLOAD_SIZE_MB")
            .unwrap_or_else(|_| MAX_UPLOAD_SIZE_MB.to_string())
            .parse::<usize>()
            .unwrap_or(MAX_UPLOAD_SIZE_MB);

        let scratch_dir = env::var("SCRATCH_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| env::temp_dir().join("geoview-uploads"));

        let config = AppConfig {
            server_port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            cors_origins,
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: env::var("DB_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| CONNECTION_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
            environment,
            max_upload_size_bytes: max_upload_size_mb * 1024 * 1024,
            scratch_dir,
            default_srid: env::var("DEFAULT_SRID")
                .unwrap_or_else(|_| DEFAULT_SRID.to_string())
                .parse()
                .unwrap_or(DEFAULT_SRID),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.database_url.starts_with("postgresql://")
            && !self.database_url.starts_with("postgres://")
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if self.max_upload_size_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_UPLOAD_SIZE_MB must be greater than 0"));
        }

        if self.default_srid == 0 {
            return Err(anyhow::anyhow!("DEFAULT_SRID must be a valid SRID"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            server_port: 8080,
            database_url: "postgresql://localhost/geoview".to_string(),
            cors_origins: vec!["*".to_string()],
            db_max_connections: 10,
            db_timeout_seconds: 30,
            environment: "development".to_string(),
            max_upload_size_bytes: 100 * 1024 * 1024,
            scratch_dir: std::env::temp_dir(),
            default_srid: 4326,
        }
    }

    #[test]
    fn test_validate_accepts_postgres_urls() {
        let mut config = base_config();
        assert!(config.validate().is_ok());
        config.database_url = "postgres://localhost/geoview".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_non_postgres_url() {
        let mut config = base_config();
        config.database_url = "mysql://localhost/geoview".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = base_config();
        config.max_upload_size_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.default_srid = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_is_production() {
        let mut config = base_config();
        assert!(!config.is_production());
        config.environment = "Production".to_string();
        assert!(config.is_production());
    }
}
