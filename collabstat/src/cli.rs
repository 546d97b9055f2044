// SPDX-License-Identifier: Apache-2.0

//! Data structures for the command line.

use std::{env, ffi::OsString, path::PathBuf};

/// The environment variable that turns on review statistics in CI jobs.
static CI_VAR: &str = "CI";

/// Attribute lines, commits, and pull requests in a repository to a roster
/// of contributors, split into solo and co-authored work.
#[derive(Debug, clap::Parser)]
#[command(name = "collabstat", about, version, long_about = None)]
pub struct CliConfig {
	/// Path to the git repository.
	#[arg(value_name = "REPO", default_value = ".")]
	pub repo: PathBuf,

	/// Include pull request statistics from GitHub.
	#[arg(
		long = "github",
		long_help = "Include pull request statistics from GitHub. Also enabled when the `CI` environment variable is set"
	)]
	github: bool,

	/// Clear all cached data and exit.
	#[arg(long = "clear-cache", conflicts_with = "init")]
	pub clear_cache: bool,

	/// Write a roster template into the repository and exit.
	#[arg(long = "init")]
	pub init: bool,

	/// Directory for the persistent cache.
	#[arg(
		long = "cache-dir",
		value_name = "DIR",
		env = "COLLABSTAT_CACHE_DIR",
		long_help = "Directory for the persistent cache. Defaults to the platform cache directory"
	)]
	pub cache_dir: Option<PathBuf>,

	/// Don't draw progress bars.
	#[arg(long = "no-progress")]
	pub no_progress: bool,
}

impl CliConfig {
	/// Whether review statistics should be gathered.
	pub fn use_github(&self) -> bool {
		self.github || ci_enabled(env::var_os(CI_VAR))
	}
}

/// A set, non-empty `CI` variable counts as running in CI.
fn ci_enabled(value: Option<OsString>) -> bool {
	value.is_some_and(|v| !v.is_empty())
}
