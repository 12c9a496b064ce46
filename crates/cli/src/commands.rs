use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use bidi::{Router, RouterConfig};
use bidi_runtime::{ChromedriverLauncher, WsConnector, paths};

use crate::cli::{Cli, Command};
use crate::server;

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

pub async fn run(cli: Cli) -> Result<()> {
	match cli.command {
		Command::Serve {
			host,
			port,
			headful,
		} => serve(&host, port, headful).await,
		Command::Paths => paths_command(),
	}
}

async fn serve(host: &str, port: u16, headful: bool) -> Result<()> {
	let router = Arc::new(Router::new(
		Arc::new(ChromedriverLauncher::default()),
		Arc::new(WsConnector),
		RouterConfig { headless: !headful },
	));

	let server = server::start(host, port, router).await?;
	println!("BiDi proxy listening on ws://{}", server.local_addr());

	wait_for_signal().await?;

	server.stop(SHUTDOWN_DEADLINE).await
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<()> {
	use tokio::signal::unix::{SignalKind, signal};

	let mut sigterm =
		signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
	let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

	tokio::select! {
		_ = sigterm.recv() => {}
		_ = sigint.recv() => {}
	}

	Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<()> {
	tokio::signal::ctrl_c()
		.await
		.context("Failed to listen for ctrl-c")?;
	Ok(())
}

fn paths_command() -> Result<()> {
	match paths::find_chromedriver() {
		Ok(path) => println!("chromedriver: {}", path.display()),
		Err(_) => println!("chromedriver: not found"),
	}

	match paths::find_chrome() {
		Some(path) => println!("chrome: {}", path.display()),
		None => println!("chrome: not found"),
	}

	Ok(())
}
