//! Operator tool: report depth and newest entry of every pipeline stream.

use clap::Parser;

use toplist_gateway::config::ServiceConfig;
use toplist_middleware::{BackendKind, MiddlewareFactory, Transport};

#[derive(Parser, Debug)]
#[command(name = "toplist-monitor")]
struct Args {
    /// Redis server URL
    #[arg(long, env = "REDIS_URL", default_value = "redis://localhost:6379")]
    redis_url: String,

    /// Comma-separated upstream service names
    #[arg(long, env = "SERVICES", default_value = "ranking,pricing")]
    services: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let transport = MiddlewareFactory::create_transport(BackendKind::Redis, &args.redis_url).await?;

    for name in args.services.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let service = ServiceConfig::for_service(name);
        for stream in [&service.request_stream, &service.response_stream] {
            let depth = transport.len(stream).await?;
            match transport.last(stream).await? {
                Some(msg) => {
                    println!("{stream}: {depth} message(s), newest {} {:?}", msg.id, msg.fields)
                }
                None => println!("{stream}: empty"),
            }
        }
    }

    Ok(())
}
