use colored::Colorize;
use shellbus::LaunchState;

/// Prints every launch state with the states it may move to.
pub fn print_states() {
	for state in LaunchState::ALL {
		let next: Vec<&str> = state.successors().iter().map(|s| s.as_str()).collect();
		let next = if next.is_empty() {
			"(terminal)".dimmed().to_string()
		} else {
			next.join(", ")
		};
		println!("{:<16} -> {}", state.as_str().bold(), next);
	}
}
