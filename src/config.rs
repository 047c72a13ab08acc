// Server Configuration
// Command line flags with environment variable fallbacks.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::time::Duration;
use url::Url;

pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";
pub const DEFAULT_API_PREFIX: &str = "/api";

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Formbase form builder API server")]
pub struct ServerConfig {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL", required_unless_present = "in_memory")]
    pub database_url: Option<String>,

    /// Public frontend URL used to compose shareable links
    #[arg(long, default_value = DEFAULT_FRONTEND_URL, env = "FRONTEND_URL")]
    pub frontend_url: String,

    /// Server port
    #[arg(short = 'p', long, default_value = "5000", env = "PORT")]
    pub port: u16,

    /// Prefix every API route is mounted under
    #[arg(long, default_value = DEFAULT_API_PREFIX, env = "API_PREFIX")]
    pub api_prefix: String,

    /// Maximum database connections
    #[arg(long, default_value = "10", env = "DATABASE_MAX_CONNECTIONS")]
    pub max_connections: u32,

    /// Database connection timeout in seconds
    #[arg(long, default_value = "30", env = "DATABASE_CONNECT_TIMEOUT")]
    pub connect_timeout: u64,

    /// Keep all data in process memory instead of Postgres
    #[arg(long)]
    pub in_memory: bool,

    /// Enable verbose logging
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short = 'q', long, env = "QUIET_MODE")]
    pub quiet: bool,
}

impl ServerConfig {
    /// Parsed frontend base URL. Only http and https are accepted.
    pub fn frontend_base_url(&self) -> Result<Url> {
        let url = Url::parse(&self.frontend_url)
            .with_context(|| format!("invalid FRONTEND_URL: {}", self.frontend_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("FRONTEND_URL must use http or https, got {}", url.scheme());
        }
        Ok(url)
    }

    /// Route prefix normalized to `/segment` form. An empty or `/` prefix mounts at the root.
    pub fn normalized_api_prefix(&self) -> Result<String> {
        let trimmed = self.api_prefix.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Ok(String::new());
        }
        if trimmed.contains(':') || trimmed.contains('*') {
            bail!("API_PREFIX cannot contain path parameters: {}", self.api_prefix);
        }
        Ok(format!("/{trimmed}"))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Check everything that can be checked before touching the network
    pub fn validate(&self) -> Result<()> {
        self.frontend_base_url()?;
        self.normalized_api_prefix()?;
        if self.max_connections == 0 {
            bail!("DATABASE_MAX_CONNECTIONS must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<ServerConfig> {
        let mut argv = vec!["formbase-server"];
        argv.extend_from_slice(args);
        Ok(ServerConfig::try_parse_from(argv)?)
    }

    #[test]
    fn test_in_memory_does_not_need_database_url() -> Result<()> {
        let config = parse(&["--in-memory", "--frontend-url", "https://forms.example.com"])?;
        assert!(config.in_memory);
        assert_eq!(config.frontend_base_url()?.host_str(), Some("forms.example.com"));
        config.validate()?;
        Ok(())
    }

    #[test]
    fn test_api_prefix_normalization() -> Result<()> {
        let config = parse(&["--in-memory", "--api-prefix", "v2/"])?;
        assert_eq!(config.normalized_api_prefix()?, "/v2");

        let root = parse(&["--in-memory", "--api-prefix", "/"])?;
        assert_eq!(root.normalized_api_prefix()?, "");

        let bad = parse(&["--in-memory", "--api-prefix", "/:tenant"])?;
        assert!(bad.validate().is_err());
        Ok(())
    }

    #[test]
    fn test_frontend_url_validation() -> Result<()> {
        let config = parse(&["--in-memory", "--frontend-url", "ftp://files.example.com"])?;
        assert!(config.validate().is_err());

        let config = parse(&["--in-memory", "--frontend-url", "not a url"])?;
        assert!(config.frontend_base_url().is_err());
        Ok(())
    }
}
