//! proxy-bridge binary
//!
//! Usage: proxy-bridge [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>  Path to configuration file
//!   -p, --port <PORT>    Listen on 127.0.0.1:<PORT> with defaults
//!   -h, --help           Print help information

use std::env;
use std::sync::Arc;

use proxy_bridge::{Bridge, BridgeConfig, Context, DirectAdapter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    proxy_bridge::init_logging(tracing::Level::INFO);

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return Ok(());
    }

    let config = match args[1].as_str() {
        "-h" | "--help" => {
            print_usage();
            return Ok(());
        }
        "-c" | "--config" => {
            if args.len() < 3 {
                eprintln!("Error: --config requires a file path");
                return Ok(());
            }
            load_config(&args[2])?
        }
        "-p" | "--port" => {
            if args.len() < 3 {
                eprintln!("Error: --port requires a port number");
                return Ok(());
            }
            BridgeConfig::new(args[2].parse()?)
        }
        _ => {
            eprintln!("Unknown option: {}", args[1]);
            print_usage();
            return Ok(());
        }
    };

    run(config).await
}

fn print_usage() {
    println!(
        r#"proxy-bridge - local SOCKS endpoint over a direct outbound

USAGE:
    proxy-bridge [OPTIONS]

OPTIONS:
    -c, --config <FILE>  Path to configuration file
    -p, --port <PORT>    Listen on 127.0.0.1:<PORT>
    -h, --help           Print help information

CONFIGURATION FILE FORMAT (JSON):
    {{
        "listen_host": "127.0.0.1",
        "socks_port": 1080,
        "accept_queue": 100
    }}
"#
    );
}

async fn run(config: BridgeConfig) -> anyhow::Result<()> {
    let ctx = Context::current()?;
    let bridge = Bridge::new(ctx, config, Arc::new(DirectAdapter::new()));
    bridge.start()?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    bridge.close().await?;
    Ok(())
}

fn load_config(path: &str) -> anyhow::Result<BridgeConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: BridgeConfig = serde_json::from_str(&content)?;
    config.validate().map_err(|e| anyhow::anyhow!(e))?;
    Ok(config)
}
