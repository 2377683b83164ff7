use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "terminal-site-server")]
pub struct Args {
    /// Run mode; `production` turns on origin gating and command auditing
    #[arg(long, env = "MODE", default_value = "development")]
    pub mode: String,

    /// Listen port
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Listen address
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// SQLite database path holding site content and the command log
    #[arg(long, env = "DATABASE_URL", default_value = "content.db")]
    pub database: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    Development,
    Production,
}

impl RunMode {
    pub fn from_value(raw: &str) -> Self {
        if raw.trim() == "production" {
            RunMode::Production
        } else {
            RunMode::Development
        }
    }

    pub fn is_production(self) -> bool {
        self == RunMode::Production
    }
}
