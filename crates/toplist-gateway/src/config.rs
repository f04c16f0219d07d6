use clap::Parser;
use std::time::Duration;

use crate::error::Error;

/// toplist-gateway: fan-out aggregation service for crypto top-list requests
#[derive(Parser, Debug, Clone)]
#[command(name = "toplist-gateway")]
pub struct Config {
    /// Broker backend: redis or memory
    #[arg(long, env = "BROKER_BACKEND", default_value = "redis")]
    pub backend: String,

    /// Redis server URL
    #[arg(long, env = "REDIS_URL", default_value = "redis://localhost:6379")]
    pub redis_url: String,

    /// HTTP listen address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8000")]
    pub listen_addr: String,

    /// Comma-separated upstream service names
    #[arg(long, env = "SERVICES", default_value = "ranking,pricing")]
    pub services: String,

    /// Service whose records set the merged row order and column namespace
    #[arg(long, env = "MAIN_SERVICE", default_value = "ranking")]
    pub main_service: String,

    /// Upper bound on waiting for one upstream response, in milliseconds
    #[arg(long, env = "CORRELATION_TIMEOUT_MS", default_value = "30000")]
    pub correlation_timeout_ms: u64,

    /// TTL for cached results, in seconds. Entries persist when unset.
    #[arg(long, env = "CACHE_TTL_SECS")]
    pub cache_ttl_secs: Option<u64>,
}

/// Stream and group naming for one upstream service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub name: String,
    pub request_stream: String,
    pub response_stream: String,
    pub group: String,
    pub consumer: String,
}

impl ServiceConfig {
    pub fn for_service(name: &str) -> Self {
        Self {
            name: name.to_string(),
            request_stream: format!("{name}:requests"),
            response_stream: format!("{name}:responses"),
            group: format!("{name}_response_consumers"),
            consumer: "toplist-gateway".to_string(),
        }
    }
}

/// Runtime parameters handed to the coordinator.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upstream services in fan-out order; the main service leads so its
    /// payload sets merged row order and wins column-name collisions.
    pub services: Vec<ServiceConfig>,
    pub correlation_timeout: Duration,
    pub cache_ttl: Option<Duration>,
}

impl Config {
    pub fn pipeline(&self) -> Result<PipelineConfig, Error> {
        let mut names: Vec<&str> = self
            .services
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .collect();
        if names.is_empty() {
            return Err(Error::Config(
                "at least one upstream service is required".to_string(),
            ));
        }

        let Some(position) = names.iter().position(|name| *name == self.main_service) else {
            return Err(Error::Config(format!(
                "main service '{}' is not in the service list '{}'",
                self.main_service, self.services
            )));
        };
        let main = names.remove(position);
        names.insert(0, main);

        Ok(PipelineConfig {
            services: names.iter().map(|name| ServiceConfig::for_service(name)).collect(),
            correlation_timeout: Duration::from_millis(self.correlation_timeout_ms),
            cache_ttl: self.cache_ttl_secs.map(Duration::from_secs),
        })
    }
}
