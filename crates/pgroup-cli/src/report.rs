use std::time::Duration;

use owo_colors::OwoColorize;
use pgroup::ExitResult;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
	Exited,
	Signaled,
	Unknown,
}

/// Why the CLI asked the group to terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StopReason {
	Interrupt,
	Terminate,
	Timeout,
}

#[derive(Debug, Serialize)]
pub struct Report {
	pub pid: u32,
	pub outcome: Outcome,
	pub code: Option<i32>,
	pub signal: Option<&'static str>,
	#[serde(skip)]
	signal_number: Option<i32>,
	pub stopped_by: Option<StopReason>,
	pub elapsed_ms: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl Report {
	pub fn new(
		pid: u32,
		result: &ExitResult,
		stopped_by: Option<StopReason>,
		elapsed: Duration,
	) -> Self {
		let (outcome, code, signal) = match result {
			Ok(()) => (Outcome::Exited, Some(0), None),
			Err(e) => match (e.code(), e.signal()) {
				(Some(code), _) => (Outcome::Exited, Some(code), None),
				(None, Some(sig)) => (Outcome::Signaled, None, Some(sig)),
				(None, None) => (Outcome::Unknown, None, None),
			},
		};
		Self {
			pid,
			outcome,
			code,
			signal: signal.map(|s| s.as_str()),
			signal_number: signal.map(|s| s as i32),
			stopped_by,
			elapsed_ms: elapsed.as_millis() as u64,
			error: match (outcome, result) {
				(Outcome::Unknown, Err(e)) => Some(e.to_string()),
				_ => None,
			},
		}
	}

	/// What the CLI itself exits with, shell style.
	pub fn exit_code(&self) -> i32 {
		match self.outcome {
			Outcome::Exited => self.code.unwrap_or(1),
			Outcome::Signaled => 128 + self.signal_number.unwrap_or(0),
			Outcome::Unknown => 1,
		}
	}

	pub fn render(&self) -> String {
		let stopped = match self.stopped_by {
			Some(StopReason::Interrupt) => " after interrupt",
			Some(StopReason::Terminate) => " after SIGTERM",
			Some(StopReason::Timeout) => " after timeout",
			None => "",
		};
		let what = match (self.outcome, self.code, self.signal) {
			(Outcome::Exited, Some(0), _) => format!("{}", "exited cleanly".green()),
			(Outcome::Exited, Some(code), _) => format!("{}", format!("exited with code {}", code).red()),
			(Outcome::Signaled, _, Some(sig)) => format!("{}", format!("killed by {}", sig).yellow()),
			_ => format!(
				"{}",
				format!("ended, {}", self.error.as_deref().unwrap_or("status unknown")).red()
			),
		};
		format!(
			"{} group {} {}{} ({}ms)",
			"[pgroup]".dimmed(),
			self.pid,
			what,
			stopped,
			self.elapsed_ms
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pgroup::ExitError;
	use std::os::unix::process::ExitStatusExt;
	use std::process::ExitStatus;

	fn failed(raw: i32) -> ExitResult {
		Err(ExitError::Status(ExitStatus::from_raw(raw)))
	}

	#[test]
	fn clean_exit() {
		let report = Report::new(10, &Ok(()), None, Duration::from_millis(12));
		assert_eq!(report.outcome, Outcome::Exited);
		assert_eq!(report.exit_code(), 0);
		assert!(report.render().contains("exited cleanly"));
	}

	#[test]
	fn exit_code_passes_through() {
		let report = Report::new(10, &failed(3 << 8), None, Duration::ZERO);
		assert_eq!(report.code, Some(3));
		assert_eq!(report.exit_code(), 3);
	}

	#[test]
	fn signal_death_maps_to_128_plus_signal() {
		let report = Report::new(10, &failed(9), Some(StopReason::Timeout), Duration::ZERO);
		assert_eq!(report.outcome, Outcome::Signaled);
		assert_eq!(report.signal, Some("SIGKILL"));
		assert_eq!(report.exit_code(), 137);
		let text = report.render();
		assert!(text.contains("SIGKILL"), "{}", text);
		assert!(text.contains("after timeout"), "{}", text);
	}

	#[test]
	fn unobserved_exit_is_unknown() {
		let report = Report::new(0, &Err(ExitError::NotObserved), None, Duration::ZERO);
		assert_eq!(report.outcome, Outcome::Unknown);
		assert_eq!(report.exit_code(), 1);
		assert!(report.error.is_some());
	}

	#[test]
	fn json_shape() {
		let report = Report::new(
			42,
			&failed(15),
			Some(StopReason::Interrupt),
			Duration::from_millis(1500),
		);
		let value = serde_json::to_value(&report).unwrap();
		assert_eq!(value["pid"], 42);
		assert_eq!(value["outcome"], "signaled");
		assert_eq!(value["signal"], "SIGTERM");
		assert_eq!(value["stopped_by"], "interrupt");
		assert_eq!(value["elapsed_ms"], 1500);
		assert!(value.get("signal_number").is_none());
		assert!(value.get("error").is_none());
	}
}
