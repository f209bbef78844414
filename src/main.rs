use std::{net::IpAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use bftp::{protocol::DEFAULT_MAX_FILE_SIZE, server::ServerBuilder};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;

/// Serves files from a directory over the Basic File Transfer Protocol.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
	/// Address to listen on
	#[arg(short, long, default_value = "127.0.0.1")]
	address: IpAddr,
	/// Port to listen on
	#[arg(short, long, default_value_t = 7007)]
	port: u16,
	/// Directory to serve files from
	#[arg(short, long, default_value = ".")]
	root: PathBuf,
	/// Largest file, in bytes, that will be served
	#[arg(long, default_value_t = DEFAULT_MAX_FILE_SIZE)]
	max_file_size: u64,
	/// Close connections that send nothing for this many seconds
	#[arg(long)]
	idle_timeout: Option<u64>,
	/// Seconds to wait for open connections to wind down on shutdown
	#[arg(long, default_value_t = 10)]
	drain_timeout: u64,
	/// Enable debug logging
	#[arg(short, long)]
	verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();
	let level = if args.verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };
	tracing_subscriber::fmt().with_max_level(level).init();

	let mut builder = ServerBuilder::default()
		.address(args.address)
		.port(args.port)
		.root(&args.root)
		.max_file_size(args.max_file_size);
	if let Some(seconds) = args.idle_timeout {
		builder = builder.idle_timeout(Duration::from_secs(seconds));
	}

	let server = Arc::new(builder.build().await.context("starting server")?);

	#[cfg(feature = "signals")]
	tokio::task::spawn({
		let server = server.clone();
		async move {
			if let Err(e) = tokio::signal::ctrl_c().await {
				warn!("Could not listen for ctrl + c: {:?}", e);
				return;
			}
			info!("Shutting down");
			server.shutdown().await;
		}
	});

	server.run().await.context("running server")?;

	if tokio::time::timeout(Duration::from_secs(args.drain_timeout), server.wait_for_handlers())
		.await
		.is_err()
	{
		warn!(
			"{} connection(s) still open after {}s, exiting anyway",
			server.connection_count().await,
			args.drain_timeout
		);
	}

	Ok(())
}
