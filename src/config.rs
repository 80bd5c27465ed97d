use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser, Clone)]
#[command(name = "workspace-hub")]
#[command(about = "Real-time workspace chat hub bridging humans and coding agents")]
pub struct Config {
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, default_value_t = 7910)]
    pub port: u16,

    #[arg(long, default_value = "hub.db")]
    pub db_path: PathBuf,

    /// Shared API token. Falls back to HUB_API_KEY; unset leaves the hub open.
    #[arg(long)]
    pub api_key: Option<String>,

    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::Config;
    use clap::Parser;

    #[test]
    fn defaults_match_docs() {
        let cfg = Config::parse_from(["workspace-hub"]);
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 7910);
        assert_eq!(cfg.db_path.to_str(), Some("hub.db"));
        assert_eq!(cfg.api_key, None);
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.bind_addr(), "127.0.0.1:7910");
    }
}
