use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "shellbus")]
#[command(about = "Event bus between a browser shell and its engine")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Bus configuration file (JSON). Defaults to $SHELLBUS_CONFIG.
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Dispatch newline-delimited JSON messages from a file through a bus
	Replay(ReplayArgs),

	/// Serve the bus to an engine over stdin/stdout
	Serve(SubscribeArgs),

	/// Print the engine launch states and their transitions
	States,
}

/// Logging subscribers to register before messages flow.
#[derive(Args, Debug, Clone, Default)]
pub struct SubscribeArgs {
	/// Log messages of TYPE through a native subscriber (repeatable)
	#[arg(long = "native", value_name = "TYPE")]
	pub native: Vec<String>,

	/// Log messages of TYPE through a structured subscriber (repeatable)
	#[arg(long = "structured", value_name = "TYPE")]
	pub structured: Vec<String>,

	/// Attach the preference store (answers Preferences:Get)
	#[arg(long)]
	pub prefs: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ReplayArgs {
	/// Message script: one JSON object per line, `#` starts a comment
	pub file: PathBuf,

	#[command(flatten)]
	pub subscribe: SubscribeArgs,
}
