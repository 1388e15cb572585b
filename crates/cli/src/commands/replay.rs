//! `shellbus replay`: push a message script through an in-process bus.

use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use serde_json::Value;
use shellbus::{BusConfig, Dispatched, LaunchState, PreferencesStore, RecordingSink, Shell, json_to_bundle};

use super::register_loggers;
use crate::cli::ReplayArgs;

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayEntry {
	/// 1-based line in the script.
	pub line: usize,
	pub event: Option<String>,
	pub outcome: Dispatched,
}

#[derive(Debug)]
pub struct ReplayReport {
	pub entries: Vec<ReplayEntry>,
	/// Messages that reached the engine side, in send order.
	pub outbound: Vec<Value>,
	/// Messages still held because the engine never became ready.
	pub held: usize,
	pub final_state: LaunchState,
}

impl ReplayReport {
	pub fn count(&self, matches: impl Fn(Dispatched) -> bool) -> usize {
		self.entries.iter().filter(|e| matches(e.outcome)).count()
	}

	pub fn print(&self) {
		for entry in &self.entries {
			let event = entry.event.as_deref().unwrap_or("<untyped>");
			let outcome = match entry.outcome {
				Dispatched::Native(n) => format!("native ({n})").green(),
				Dispatched::Structured(n) => format!("structured ({n})").cyan(),
				Dispatched::Unhandled => "unhandled".to_string().yellow(),
				Dispatched::Dropped => "dropped".to_string().red(),
			};
			println!("{:>4}  {:<32} {}", entry.line, event, outcome);
		}

		for message in &self.outbound {
			println!("{} {}", "->".dimmed(), message);
		}

		println!(
			"{} messages: {} native, {} structured, {} unhandled, {} dropped; {} sent, {} held; state {}",
			self.entries.len(),
			self.count(|d| matches!(d, Dispatched::Native(_))),
			self.count(|d| matches!(d, Dispatched::Structured(_))),
			self.count(|d| d == Dispatched::Unhandled),
			self.count(|d| d == Dispatched::Dropped),
			self.outbound.len(),
			self.held,
			self.final_state.to_string().bold(),
		);
	}
}

pub fn replay(config: BusConfig, args: &ReplayArgs) -> anyhow::Result<ReplayReport> {
	let script = std::fs::read_to_string(&args.file)
		.with_context(|| format!("failed to read {}", args.file.display()))?;

	let sink = Arc::new(RecordingSink::new());
	let shell = Shell::new(config, sink.clone())?;
	register_loggers(shell.dispatcher(), &args.subscribe)?;
	let _prefs = if args.subscribe.prefs {
		Some(PreferencesStore::attach(shell.dispatcher())?)
	} else {
		None
	};

	let mut entries = Vec::new();
	for (index, raw) in script.lines().enumerate() {
		let line = index + 1;
		let raw = raw.trim();
		if raw.is_empty() || raw.starts_with('#') {
			continue;
		}

		let value: Value =
			serde_json::from_str(raw).with_context(|| format!("line {line}: invalid JSON"))?;
		let bundle = json_to_bundle(&value).with_context(|| format!("line {line}: not a message"))?;

		let outcome = shell.dispatcher().dispatch(&bundle);
		tracing::debug!(line, ?outcome, "Replayed message");
		entries.push(ReplayEntry {
			line,
			event: bundle.event_type().map(str::to_string),
			outcome,
		});
	}

	Ok(ReplayReport {
		entries,
		outbound: sink.take(),
		held: shell.queue().pending_len(),
		final_state: shell.launch_state().current(),
	})
}

#[cfg(test)]
mod tests {
	use std::io::Write;
	use std::path::PathBuf;

	use serde_json::json;

	use super::*;
	use crate::cli::SubscribeArgs;

	fn script(lines: &[&str]) -> tempfile::NamedTempFile {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		for line in lines {
			writeln!(file, "{line}").unwrap();
		}
		file
	}

	fn args(file: PathBuf, subscribe: SubscribeArgs) -> ReplayArgs {
		ReplayArgs { file, subscribe }
	}

	#[test]
	fn replay_routes_and_counts() {
		let file = script(&[
			"# startup",
			r#"{"type": "Tab:Added", "tabID": 1}"#,
			r#"{"type": "Session:Data", "windows": []}"#,
			"",
			r#"{"type": "Nobody:Listens"}"#,
			r#"{"tabID": 2}"#,
			r#"{"type": "Gecko:Ready"}"#,
		]);
		let subscribe = SubscribeArgs {
			native: vec!["Tab:Added".into()],
			structured: vec!["Session:Data".into()],
			prefs: false,
		};

		let report = replay(BusConfig::default(), &args(file.path().to_path_buf(), subscribe)).unwrap();

		let outcomes: Vec<_> = report.entries.iter().map(|e| (e.line, e.outcome)).collect();
		assert_eq!(
			outcomes,
			vec![
				(2, Dispatched::Native(1)),
				(3, Dispatched::Structured(1)),
				(5, Dispatched::Unhandled),
				(6, Dispatched::Dropped),
				(7, Dispatched::Native(1)),
			]
		);
		assert_eq!(report.final_state, LaunchState::GeckoRunning);
		assert_eq!(report.entries[3].event, None);
	}

	#[test]
	fn replay_with_prefs_holds_replies_until_ready() {
		let file = script(&[
			r#"{"type": "Preferences:Data", "preferences": [{"name": "a", "value": 1}]}"#,
			r#"{"type": "Preferences:Get", "GUID": "g1", "preferences": ["a"]}"#,
		]);
		let subscribe = SubscribeArgs {
			prefs: true,
			..SubscribeArgs::default()
		};

		let report = replay(BusConfig::default(), &args(file.path().to_path_buf(), subscribe)).unwrap();
		assert!(report.outbound.is_empty());
		assert_eq!(report.held, 1);
		assert_eq!(report.final_state, LaunchState::Launching);

		let file = script(&[
			r#"{"type": "Preferences:Get", "GUID": "g2", "preferences": ["a"]}"#,
			r#"{"type": "Gecko:Ready"}"#,
		]);
		let subscribe = SubscribeArgs {
			prefs: true,
			..SubscribeArgs::default()
		};
		let report = replay(BusConfig::default(), &args(file.path().to_path_buf(), subscribe)).unwrap();
		assert_eq!(
			report.outbound,
			vec![json!({
				"type": "Preferences:Get:Return",
				"GUID": "g2",
				"response": {"preferences": [{"name": "a", "value": null}]},
			})]
		);
		assert_eq!(report.held, 0);
	}

	#[test]
	fn replay_rejects_conflicting_subscriptions() {
		let file = script(&[r#"{"type": "X"}"#]);
		let subscribe = SubscribeArgs {
			native: vec!["X".into()],
			structured: vec!["X".into()],
			prefs: false,
		};

		let err = replay(BusConfig::default(), &args(file.path().to_path_buf(), subscribe)).unwrap_err();
		assert!(format!("{err:#}").contains("Illegal state"), "got {err:#}");
	}

	#[test]
	fn replay_reports_bad_line() {
		let file = script(&[r#"{"type": "A"}"#, "{oops"]);
		let err = replay(
			BusConfig::default(),
			&args(file.path().to_path_buf(), SubscribeArgs::default()),
		)
		.unwrap_err();
		assert!(err.to_string().contains("line 2"), "got {err}");
	}
}
