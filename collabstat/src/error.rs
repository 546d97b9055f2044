// SPDX-License-Identifier: Apache-2.0

//! The error type shared by every layer of the tool.
//!
//! Errors are grouped into a small taxonomy (see [`ErrorKind`]) so callers
//! can decide which failures to recover from locally and which must end
//! the run.

use crate::command::Program;
use std::{error::Error as StdError, io, path::PathBuf, result::Result as StdResult};

/// A `Result` whose error is the crate-wide [`Error`].
pub type Result<T> = StdResult<T, Error>;

/// A boxed error used as the cause of review-service failures.
pub type DynError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// A ref could not be resolved to a commit.
	#[error("commit not found: {reference} in {}", repo.display())]
	CommitNotFound { reference: String, repo: PathBuf },

	/// A path does not exist at the given commit.
	#[error("file not found: {path} at commit {} in {}", short_hash(commit), repo.display())]
	FileNotFoundInRepo {
		path: String,
		commit: String,
		repo: PathBuf,
	},

	/// A required external program isn't on the `PATH`.
	#[error("{}", missing_program_message(*program))]
	ExecutableNotFound {
		program: Program,
		#[source]
		source: which::Error,
	},

	#[error("not a git repository: {}", path.display())]
	NotARepository { path: PathBuf },

	/// The roster document is missing or malformed.
	#[error("invalid roster configuration: {0}")]
	Config(String),

	/// A name/email pair that isn't registered to any contributor.
	#[error(
		"unknown author '{name} <{email}>' found in {context_kind} {context_detail}; add them to the roster (or its ignore list)"
	)]
	UnknownAuthor {
		name: String,
		email: String,
		context_kind: String,
		context_detail: String,
	},

	#[error("review service error: {message}")]
	ReviewService {
		message: String,
		#[source]
		source: Option<DynError>,
	},

	/// An external program exited unsuccessfully.
	#[error("{program} failed [{status}]{}", stderr_suffix(stderr))]
	CommandFailed {
		program: Program,
		status: String,
		stderr: String,
	},

	#[error("{context}")]
	Io {
		context: String,
		#[source]
		source: io::Error,
	},
}

/// The broad category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	NotFound,
	Environment,
	Configuration,
	Identity,
	ReviewService,
	Command,
}

impl Error {
	pub fn kind(&self) -> ErrorKind {
		match self {
			Error::CommitNotFound { .. } | Error::FileNotFoundInRepo { .. } => ErrorKind::NotFound,
			Error::ExecutableNotFound { .. } | Error::NotARepository { .. } | Error::Io { .. } => {
				ErrorKind::Environment
			}
			Error::Config(_) => ErrorKind::Configuration,
			Error::UnknownAuthor { .. } => ErrorKind::Identity,
			Error::ReviewService { .. } => ErrorKind::ReviewService,
			Error::CommandFailed { .. } => ErrorKind::Command,
		}
	}

	/// Whether a commit-level pass may drop the offending commit and move on.
	pub fn is_skippable(&self) -> bool {
		matches!(self.kind(), ErrorKind::NotFound | ErrorKind::Identity)
	}

	pub fn io(context: impl Into<String>, source: io::Error) -> Error {
		Error::Io {
			context: context.into(),
			source,
		}
	}

	pub fn review_service(message: impl Into<String>, source: impl Into<DynError>) -> Error {
		Error::ReviewService {
			message: message.into(),
			source: Some(source.into()),
		}
	}
}

/// The first eight characters of a commit hash, for display.
pub fn short_hash(hash: &str) -> &str {
	hash.get(..8).unwrap_or(hash)
}

fn missing_program_message(program: Program) -> String {
	match program {
		Program::Gh => "can't find the GitHub CLI ('gh'); install it from https://cli.github.com/ and run 'gh auth login'".to_owned(),
		other => format!("can't find the '{}' command; make sure it is installed and on the PATH", other),
	}
}

fn stderr_suffix(stderr: &str) -> String {
	if stderr.is_empty() {
		String::new()
	} else {
		format!(": {}", stderr)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn not_found_and_identity_errors_are_skippable() {
		let not_found = Error::CommitNotFound {
			reference: "abc".to_owned(),
			repo: PathBuf::from("."),
		};
		let unknown = Error::UnknownAuthor {
			name: "Eve".to_owned(),
			email: "eve@example.com".to_owned(),
			context_kind: "commit".to_owned(),
			context_detail: "0123abcd".to_owned(),
		};
		let config = Error::Config("bad".to_owned());

		assert!(not_found.is_skippable());
		assert!(unknown.is_skippable());
		assert!(!config.is_skippable());
		assert_eq!(config.kind(), ErrorKind::Configuration);
	}

	#[test]
	fn unknown_author_message_names_the_context() {
		let err = Error::UnknownAuthor {
			name: "Eve".to_owned(),
			email: "eve@example.com".to_owned(),
			context_kind: "co-author in commit".to_owned(),
			context_detail: "0123abcd".to_owned(),
		};
		let msg = err.to_string();
		assert!(msg.contains("Eve <eve@example.com>"));
		assert!(msg.contains("co-author in commit 0123abcd"));
	}

	#[test]
	fn missing_gh_asks_for_login() {
		assert!(missing_program_message(Program::Gh).contains("gh auth login"));
	}

	#[test]
	fn short_hash_handles_short_input() {
		assert_eq!(short_hash("0123456789abcdef"), "01234567");
		assert_eq!(short_hash("0123"), "0123");
	}
}
