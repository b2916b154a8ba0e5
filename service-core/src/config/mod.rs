use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;

/// Settings common to every service: layered from an optional
/// `configuration` file and `APP__*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Explicit gRPC port; the HTTP port + 1 when unset.
    #[serde(default)]
    pub grpc_port: Option<u16>,
}

fn default_port() -> u16 {
    8080
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Port the gRPC listener binds to.
    pub fn grpc_port(&self) -> u16 {
        match self.grpc_port {
            Some(port) => port,
            None if self.port == 0 => 0,
            None => self.port.saturating_add(1),
        }
    }
}
