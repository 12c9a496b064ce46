use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
	name = "bidi",
	version,
	about = "WebDriver BiDi proxy: one browser per client, frames relayed verbatim"
)]
pub struct Cli {
	/// Increase log verbosity (-v, -vv)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Run the proxy server
	Serve {
		/// Address to listen on
		#[arg(long, default_value = "127.0.0.1")]
		host: String,

		/// Port to listen on (0 picks a free port)
		#[arg(long, default_value_t = 9515)]
		port: u16,

		/// Launch browsers with a visible window
		#[arg(long)]
		headful: bool,
	},

	/// Print resolved browser and driver paths
	Paths,
}
