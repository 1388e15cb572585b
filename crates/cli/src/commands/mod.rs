//! Command implementations.

mod replay;
mod serve;
mod states;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde_json::Value;
use shellbus::{Bundle, BusConfig, EventDispatcher, Subscriber};

use crate::cli::{Cli, Commands, SubscribeArgs};

pub use replay::{ReplayEntry, ReplayReport, replay};
pub use serve::serve;
pub use states::print_states;

pub async fn dispatch(cli: Cli) -> anyhow::Result<()> {
	let config = load_config(cli.config.as_deref())?;

	match cli.command {
		Commands::Replay(args) => {
			let report = replay(config, &args)?;
			report.print();
			Ok(())
		}
		Commands::Serve(args) => serve(config, &args).await,
		Commands::States => {
			print_states();
			Ok(())
		}
	}
}

/// Reads the bus configuration from `path`, or from `$SHELLBUS_CONFIG`.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<BusConfig> {
	match path {
		Some(path) => BusConfig::load(path)
			.with_context(|| format!("failed to load config from {}", path.display())),
		None => BusConfig::from_env().context("failed to load config from $SHELLBUS_CONFIG"),
	}
}

/// Registers one logging subscriber per requested type.
pub fn register_loggers(dispatcher: &Arc<EventDispatcher>, args: &SubscribeArgs) -> anyhow::Result<()> {
	if !args.native.is_empty() {
		let events: Vec<&str> = args.native.iter().map(String::as_str).collect();
		let logger = Subscriber::native(|event: &str, message: &Bundle| {
			tracing::info!(event, "native: {}", message);
		});
		dispatcher
			.register(&logger, &events)
			.context("failed to register native logger")?;
	}

	if !args.structured.is_empty() {
		let events: Vec<&str> = args.structured.iter().map(String::as_str).collect();
		let logger = Subscriber::structured(|event: &str, message: &Value| {
			tracing::info!(event, "structured: {}", message);
		});
		dispatcher
			.register(&logger, &events)
			.context("failed to register structured logger")?;
	}

	Ok(())
}
