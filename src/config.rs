// Configuration - flags with environment fallbacks
//
// Every setting can come from a flag or its environment variable; a `.env`
// file in the working directory is loaded first by the binaries.

use std::path::PathBuf;

use clap::{Args, Parser};

use crate::chat::DEFAULT_GEMINI_MODEL;

/// Load `.env` if present. Returns the file that was read.
pub fn load_dotenv() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

#[derive(Debug, Clone, Args)]
pub struct DatabaseConfig {
    /// SQLite database file
    #[arg(long, env = "DATABASE_PATH", default_value = "pokedex.db")]
    pub database_path: PathBuf,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "pokedex-server", version, about = "Pokédex HTTP API")]
pub struct ServerConfig {
    #[command(flatten)]
    pub database: DatabaseConfig,

    #[arg(long, env = "PORT", default_value_t = 3001)]
    pub port: u16,

    /// Secret used to sign access tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    #[arg(long, env = "JWT_EXPIRES_HOURS", default_value_t = 24, value_parser = clap::value_parser!(i64).range(1..))]
    pub jwt_expires_hours: i64,

    #[arg(long, env = "BCRYPT_COST", default_value_t = 10, value_parser = clap::value_parser!(u32).range(4..=31))]
    pub bcrypt_cost: u32,

    /// Chat is disabled when unset
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    #[arg(long, env = "GEMINI_MODEL", default_value = DEFAULT_GEMINI_MODEL)]
    pub gemini_model: String,

    /// Built frontend to serve for non-API paths
    #[arg(long, env = "STATIC_DIR")]
    pub static_dir: Option<PathBuf>,
}

impl ServerConfig {
    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.jwt_expires_hours)
    }

    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<ServerConfig, clap::Error> {
        let mut args = vec![
            "pokedex-server",
            "--jwt-secret",
            "test-secret",
            "--database-path",
            "test.db",
        ];
        args.extend_from_slice(extra);
        ServerConfig::try_parse_from(args)
    }

    #[test]
    fn test_flags_parse() {
        let config = parse(&["--port", "3001", "--jwt-expires-hours", "24", "--static-dir", "web/dist"]).unwrap();

        assert_eq!(config.jwt_secret, "test-secret");
        assert_eq!(config.database.database_path, PathBuf::from("test.db"));
        assert_eq!(config.bind_address(), "0.0.0.0:3001");
        assert_eq!(config.token_ttl(), chrono::Duration::hours(24));
        assert_eq!(config.static_dir, Some(PathBuf::from("web/dist")));
    }

    #[test]
    fn test_bcrypt_cost_out_of_range_is_rejected() {
        assert!(parse(&["--bcrypt-cost", "3"]).is_err());
        assert!(parse(&["--bcrypt-cost", "32"]).is_err());
        assert_eq!(parse(&["--bcrypt-cost", "12"]).unwrap().bcrypt_cost, 12);
    }

    #[test]
    fn test_token_lifetime_must_be_positive() {
        assert!(parse(&["--jwt-expires-hours", "0"]).is_err());
    }
}
