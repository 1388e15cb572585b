//! `shellbus serve`: run the bus against an engine on stdin/stdout.

use shellbus::{BusConfig, PipeTransport, PreferencesStore, Shell};

use super::register_loggers;
use crate::cli::SubscribeArgs;

pub async fn serve(config: BusConfig, args: &SubscribeArgs) -> anyhow::Result<()> {
	let (transport, message_rx) = PipeTransport::new(tokio::io::stdout(), tokio::io::stdin());
	let shell = Shell::connect(config, transport.into_transport_parts(message_rx))?;

	register_loggers(shell.dispatcher(), args)?;
	let _prefs = if args.prefs {
		Some(PreferencesStore::attach(shell.dispatcher())?)
	} else {
		None
	};

	tracing::info!(handshake = %shell.config().handshake_event, "Serving bus on stdio");

	tokio::select! {
		result = shell.run() => result?,
		_ = tokio::signal::ctrl_c() => {
			tracing::info!("Interrupted");
		}
	}

	shell.shutdown();
	Ok(())
}
