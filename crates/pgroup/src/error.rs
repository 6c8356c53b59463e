use std::io;
use std::path::PathBuf;

use nix::errno::Errno;
use nix::sys::signal::Signal;

/// Errors from launching or signaling a process group.
///
/// OS failures are carried as-is so callers can match on the native errno.
/// A process that ran and exited badly is not an `Error`; see
/// [`ExitError`](crate::ExitError).
#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// The command has already run to completion.
	#[error("process: command already executed: {program:?}")]
	AlreadyExecuted { program: PathBuf },

	/// The command is currently running.
	#[error("process: command already executing: {program:?}")]
	AlreadyExecuting { program: PathBuf },

	/// The requested process attributes cannot be honored.
	#[error("process: invalid process attributes: {0}")]
	Config(&'static str),

	/// The OS refused to start the command.
	#[error("process: failed to start {program:?}: {source}")]
	Launch {
		program: PathBuf,
		#[source]
		source: io::Error,
	},

	/// There is no group to signal: never launched, or already terminated.
	#[error("process: no such process")]
	NotFound,

	#[error("process: could not send {signal} to group {pgid}: {source}")]
	Signal {
		pgid: i32,
		signal: Signal,
		#[source]
		source: Errno,
	},
}

impl Error {
	/// The native errno behind this error, if there is one.
	pub fn errno(&self) -> Option<Errno> {
		match self {
			Error::NotFound => Some(Errno::ESRCH),
			Error::Signal { source, .. } => Some(*source),
			Error::Launch { source, .. } => source.raw_os_error().map(Errno::from_raw),
			_ => None,
		}
	}

	/// True when the target process (group) does not exist.
	///
	/// During `terminate` this usually means the group already exited and was
	/// reaped through another path. It is reported, not swallowed.
	pub fn is_no_such_process(&self) -> bool {
		self.errno() == Some(Errno::ESRCH)
	}
}
