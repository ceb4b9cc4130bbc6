use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

impl Config {
    /// Load the common settings from `.env`, an optional `configuration`
    /// file and `APP__` prefixed environment variables.
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_is_8080() {
        assert_eq!(Config::default().port, 8080);
    }

    #[test]
    fn port_deserializes_from_source() {
        let cfg = Cfg::builder()
            .set_override("port", 0)
            .expect("override")
            .build()
            .expect("build");
        let config: Config = cfg.try_deserialize().expect("deserialize");
        assert_eq!(config.port, 0);
    }
}
