mod config;
mod report;

use std::ffi::OsString;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use owo_colors::OwoColorize;
use pgroup::{Command, Group, PlatformPolicy};
use tokio::signal::unix::{signal, SignalKind};

use config::PolicyKind;
use report::{Report, StopReason};

/// Run a command as its own process group. On Ctrl-C, SIGTERM or timeout the
/// whole group gets SIGTERM, then SIGKILL once the patience runs out.
#[derive(Debug, Parser)]
#[command(name = "pgroup", version)]
struct Cli {
	/// Time between SIGTERM and SIGKILL, e.g. 500ms or 5s
	#[arg(long, value_parser = config::parse_duration)]
	patience: Option<Duration>,

	/// Terminate the group after this long
	#[arg(long, value_parser = config::parse_duration)]
	timeout: Option<Duration>,

	/// Which processes receive signals
	#[arg(long, value_enum)]
	policy: Option<PolicyKind>,

	/// Print the final report as JSON on stdout
	#[arg(long)]
	json: bool,

	/// error, warn, info, debug or trace
	#[arg(long)]
	log_level: Option<String>,

	/// Config file (default: ~/.config/pgroup/config.toml)
	#[arg(long)]
	config: Option<PathBuf>,

	/// The program to run and its arguments
	#[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
	command: Vec<OsString>,
}

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	let config = config::load_global_config(cli.config.as_deref());

	let level = cli
		.log_level
		.as_deref()
		.or(std::env::var("PGROUP_LOG").ok().as_deref())
		.or(config.log.level.as_deref())
		.and_then(config::parse_level)
		.unwrap_or(tracing::Level::WARN);
	tracing_subscriber::fmt()
		.with_max_level(level)
		.with_writer(std::io::stderr)
		.init();

	let patience = cli.patience.unwrap_or(config.terminate.patience);
	let policy = cli.policy.unwrap_or(config.terminate.policy);

	let mut cmd = Command::new(&cli.command[0]);
	cmd.args(&cli.command[1..]);

	let stop = match stop_requested(cli.timeout) {
		Ok(stop) => stop,
		Err(e) => {
			eprintln!("{} {}", "error:".red(), e);
			std::process::exit(1);
		}
	};

	match run(&cmd, policy.policy(), patience, stop).await {
		Ok(report) => {
			if cli.json {
				match serde_json::to_string(&report) {
					Ok(json) => println!("{}", json),
					Err(e) => eprintln!("{} {}", "error:".red(), e),
				}
			} else {
				eprintln!("{}", report.render());
			}
			std::process::exit(report.exit_code());
		}
		Err(e) => {
			eprintln!("{} {}", "error:".red(), e);
			std::process::exit(1);
		}
	}
}

/// Resolves when the group should be stopped: Ctrl-C, SIGTERM to the CLI,
/// or `timeout` elapsing.
fn stop_requested(
	timeout: Option<Duration>,
) -> Result<impl Future<Output = StopReason>, String> {
	let mut sigterm = signal(SignalKind::terminate())
		.map_err(|e| format!("failed to install SIGTERM handler: {}", e))?;

	Ok(async move {
		let deadline = async {
			match timeout {
				Some(t) => tokio::time::sleep(t).await,
				None => std::future::pending().await,
			}
		};
		tokio::select! {
			_ = tokio::signal::ctrl_c() => StopReason::Interrupt,
			_ = sigterm.recv() => StopReason::Terminate,
			_ = deadline => StopReason::Timeout,
		}
	})
}

async fn run(
	cmd: &Command,
	policy: Arc<dyn PlatformPolicy>,
	patience: Duration,
	stop: impl Future<Output = StopReason>,
) -> Result<Report, String> {
	let started = Instant::now();

	let group = Group::background_with(cmd, policy)
		.await
		.map_err(|e| e.to_string())?;
	let pid = group.pid().unwrap_or(0);
	tracing::info!("started {:?} as process group {}", cmd.get_program(), pid);

	let reason = tokio::select! {
		result = group.wait() => {
			return Ok(Report::new(pid, &result, None, started.elapsed()));
		}
		reason = stop => reason,
	};

	tracing::info!("stopping process group {} ({:?}), patience {:?}", pid, reason, patience);
	stop_group(&group, patience).await?;

	let result = group.wait().await;
	Ok(Report::new(pid, &result, Some(reason), started.elapsed()))
}

/// `terminate`, except that a group which is already gone is not an error.
async fn stop_group(group: &Group, patience: Duration) -> Result<(), String> {
	match group.terminate(patience).await {
		Ok(()) => Ok(()),
		Err(e) if e.is_no_such_process() => {
			tracing::debug!("process group {:?} already gone: {}", group.pid(), e);
			Ok(())
		}
		Err(e) => Err(e.to_string()),
	}
}
