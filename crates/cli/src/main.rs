use clap::Parser;
use colored::Colorize;
use shellbus_cli::{cli::Cli, commands, logging};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	if let Err(err) = commands::dispatch(cli).await {
		eprintln!("{} {:#}", "error:".red().bold(), err);
		std::process::exit(1);
	}
}
