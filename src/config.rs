//! Configuration parsing and validation for the validation server
//!
//! This module handles command-line argument parsing and validation using clap.
use anyhow::anyhow;
use clap::{ArgAction, Parser};
use request_validation::DEFAULT_BODY_LIMIT;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// The port on which the server will listen.
    #[arg(short = 'p', long, default_value_t = 3000)]
    pub port: u16,

    /// The JSON file declaring the routes and their schemas.
    #[arg(short = 'r', long, env = "ROUTES_FILE")]
    pub routes: PathBuf,

    /// The largest JSON body, in bytes, a route will buffer for validation.
    #[arg(long, default_value_t = DEFAULT_BODY_LIMIT)]
    pub body_limit: usize,

    /// Whether to enable the metrics endpoint.
    #[arg(short = 'm', long, action = ArgAction::Set, default_value_t = true)]
    pub metrics: bool,

    /// The port on which the metrics server will listen.
    #[arg(long, default_value_t = 9090)]
    pub metrics_port: u16,

    /// The prefix to use for metrics.
    #[arg(long, default_value = "request_validation")]
    pub metrics_prefix: String,
}

impl Config {
    pub fn validate(self) -> Result<Self, anyhow::Error> {
        if !self.routes.exists() {
            return Err(anyhow!(
                "Routes file '{}' does not exist",
                self.routes.display()
            ));
        }
        if self.metrics && self.metrics_port == self.port {
            return Err(anyhow!(
                "Metrics port {} clashes with the server port",
                self.metrics_port
            ));
        }
        Ok(self)
    }
}
