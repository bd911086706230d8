use std::net::Ipv4Addr;
use std::path::PathBuf;

use async_shutdown::ShutdownManager;
use clap::Parser;
use wfd_session::session::{DisplaySource, PeerLink};
use wfd_session::{SessionConfig, WfdOutSession};

/// Standalone driver for a single outgoing WFD session, for smoke-testing
/// the RTSP core without a full P2P/WFD discovery stack.
#[derive(Parser, Debug)]
#[clap(version)]
struct Args {
	/// Path to a SessionConfig TOML file. Defaults are used if omitted.
	#[clap(long)]
	config: Option<PathBuf>,

	/// Display to mirror, as `<scheme>://<name>` (only `x://<display>` is supported).
	#[clap(long, default_value = "x://0")]
	display: String,

	/// Horizontal offset of the captured region.
	#[clap(long, default_value_t = 0)]
	x: u16,

	/// Vertical offset of the captured region.
	#[clap(long, default_value_t = 0)]
	y: u16,

	/// Width of the captured region; must be a resolution in the WFD table.
	#[clap(long, default_value_t = 1920)]
	width: u16,

	/// Height of the captured region; must be a resolution in the WFD table.
	#[clap(long, default_value_t = 1080)]
	height: u16,

	/// IPv4 address of the local interface the sink connects back to.
	#[clap(long)]
	local_address: Ipv4Addr,

	/// IPv4 address of the sink.
	#[clap(long)]
	remote_address: Ipv4Addr,

	/// Raw WFD subelements advertised by the sink, hex-encoded.
	#[clap(long)]
	wfd_subelements: String,

	/// Show more log messages.
	#[clap(long, short, action = clap::ArgAction::Count)]
	verbose: u8,

	/// Show less log messages.
	#[clap(long, short, action = clap::ArgAction::Count)]
	quiet: u8,
}

fn log_level(verbose: u8, quiet: u8) -> tracing::Level {
	match i16::from(verbose) - i16::from(quiet) {
		..=-2 => tracing::Level::ERROR,
		-1 => tracing::Level::WARN,
		0 => tracing::Level::INFO,
		1 => tracing::Level::DEBUG,
		2.. => tracing::Level::TRACE,
	}
}

fn decode_hex(hex: &str) -> Result<Vec<u8>, ()> {
	if hex.len() % 2 != 0 {
		return Err(tracing::error!("WFD subelements hex string has odd length"));
	}
	(0..hex.len())
		.step_by(2)
		.map(|i| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| tracing::error!("invalid hex byte in WFD subelements: {e}")))
		.collect()
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), ()> {
	let args = Args::parse();

	tracing_subscriber::fmt()
		.with_max_level(log_level(args.verbose, args.quiet))
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.init();

	let config = match &args.config {
		Some(path) => SessionConfig::read_from_file(path).map_err(|e| tracing::error!("failed to read configuration: {e}"))?,
		None => SessionConfig::default(),
	};
	tracing::debug!("using configuration:\n{:#?}", config);

	let display = DisplaySource::parse(&args.display, args.x, args.y, args.width, args.height)
		.map_err(|e| tracing::error!("invalid display spec: {e}"))?;

	let wfd_subelements = decode_hex(&args.wfd_subelements)?;
	let peer = PeerLink { local_address: args.local_address, remote_address: args.remote_address, connected: true, wfd_subelements };

	let shutdown = ShutdownManager::new();
	tokio::spawn({
		let shutdown = shutdown.clone();
		async move {
			if let Err(e) = tokio::signal::ctrl_c().await {
				tracing::error!("failed to wait for CTRL+C: {e}");
				std::process::exit(1);
			}
			tracing::info!("received interrupt signal, shutting down session");
			shutdown.trigger_shutdown(()).ok();
		}
	});

	let session = WfdOutSession::connect(config, display, peer)
		.await
		.map_err(|e| tracing::error!("failed to start session: {e}"))?;

	shutdown.wait_shutdown_triggered().await;

	session.teardown().await.map_err(|e| tracing::error!("failed to tear down session: {e}"))?;

	Ok(())
}
