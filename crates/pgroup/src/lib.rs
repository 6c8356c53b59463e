//! # pgroup
//!
//! Run a command as the leader of its own process group, so that it and
//! everything it forks can be signaled and shut down as one unit.
//!
//! The process exit is observed exactly once and handed to both
//! [`Group::terminate`] and [`Group::wait`], which can run from different
//! tasks.
//!
//! Unix only: groups are created with `setpgid` and signaled with `killpg`.
//! [`SingleProcessPolicy`] signals just the launched process, for callers
//! that manage the process group or session themselves.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use pgroup::{Command, Group};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), pgroup::Error> {
//! let mut cmd = Command::new("sh");
//! cmd.args(["-c", "sleep 30 & sleep 30"]);
//!
//! let group = Group::background(&cmd).await?;
//! group.terminate(Duration::from_secs(2)).await?;
//!
//! let result = group.wait().await;
//! println!("exit code {}", pgroup::exit_code(&result));
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod error;
pub mod exit;
pub mod group;
mod launch;
pub mod platform;

pub use command::{Attributes, Command, RunState, Stdio};
pub use error::Error;
pub use exit::{exit_code, ExitError, ExitResult};
pub use group::Group;
pub use platform::{default_policy, PlatformPolicy, ProcessGroupPolicy, SingleProcessPolicy};

pub use nix::sys::signal::Signal;
