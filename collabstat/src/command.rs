// SPDX-License-Identifier: Apache-2.0

//! Running the external programs the data layers are built on.

use crate::error::{Error, Result};
use std::{
	ffi::OsStr,
	fmt::{self, Display, Formatter},
	path::Path,
	process::Command,
};

/// An external program we depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Program {
	Git,
	Gh,
}

impl Program {
	pub fn name(&self) -> &'static str {
		match self {
			Program::Git => "git",
			Program::Gh => "gh",
		}
	}
}

impl Display for Program {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.name())
	}
}

/// A configured invocation of an external program in a repository.
#[derive(Debug)]
pub struct ExternalCommand {
	program: Program,
	command: Command,
}

impl ExternalCommand {
	pub fn for_repo<I, S>(program: Program, repo_path: &Path, args: I) -> Result<ExternalCommand>
	where
		I: IntoIterator<Item = S> + Copy,
		S: AsRef<OsStr>,
	{
		let program_path = which::which(program.name())
			.map_err(|source| Error::ExecutableNotFound { program, source })?;

		log::debug!(
			"running external command [program='{}', repo='{}', args='{}']",
			program_path.display(),
			repo_path.display(),
			command_line(args)
		);

		let mut command = Command::new(&program_path);

		if program == Program::Git {
			command.args(["--no-pager", "-c", "core.quotePath=false"]);
		}

		command.args(args).current_dir(repo_path);

		Ok(ExternalCommand { program, command })
	}

	/// Run the command, returning its stdout.
	///
	/// Invalid UTF-8 in the output is replaced rather than rejected.
	pub fn output(&mut self) -> Result<String> {
		let output = self.command.output().map_err(|e| {
			Error::io(format!("failed to run {}", self.program), e)
		})?;

		if output.status.success() {
			return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
		}

		let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
		log::debug!(
			"external command failed [program='{}', status='{}', stderr='{}']",
			self.program,
			output.status,
			stderr
		);

		Err(Error::CommandFailed {
			program: self.program,
			status: output.status.to_string(),
			stderr,
		})
	}
}

/// Arguments joined with spaces, for logging.
fn command_line<I, S>(args: I) -> String
where
	I: IntoIterator<Item = S>,
	S: AsRef<OsStr>,
{
	args.into_iter()
		.map(|arg| arg.as_ref().to_string_lossy().into_owned())
		.collect::<Vec<_>>()
		.join(" ")
}
