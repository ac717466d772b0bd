use clap::Parser;
use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

use chatlink::{Server, ServerConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path; defaults apply when omitted
    #[arg(short, long)]
    config: Option<String>,

    /// Override the control-plane port from the configuration
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the file-transfer port from the configuration
    #[arg(short, long)]
    transfer_port: Option<u16>,
}

fn init_logger() {
    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter_level(LevelFilter::Info)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(port) = args.transfer_port {
        config.server.transfer_port = port;
    }

    let server = Server::bind(config).await?;
    server.serve().await
}
