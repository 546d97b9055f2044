// SPDX-License-Identifier: Apache-2.0

//! First-time setup of a repository.

use crate::error::{Error, Result};
use pathbuf::pathbuf;
use std::{
	fs::OpenOptions,
	io::{ErrorKind as IoErrorKind, Write as _},
	path::{Path, PathBuf},
};

/// Where the roster template is written, relative to the repository root.
pub const EXAMPLE_FILE_NAME: &str = ".students.json.example";

static TEMPLATE: &str = include_str!("../templates/students.json");

/// Write the roster template into `repo`, never replacing an existing file.
pub fn init_repo(repo: &Path) -> Result<PathBuf> {
	if !repo.is_dir() {
		return Err(Error::io(
			format!("can't initialize '{}'", repo.display()),
			IoErrorKind::NotFound.into(),
		));
	}

	let path = pathbuf![repo, EXAMPLE_FILE_NAME];

	let mut file = OpenOptions::new()
		.write(true)
		.create_new(true)
		.open(&path)
		.map_err(|e| match e.kind() {
			IoErrorKind::AlreadyExists => {
				Error::io(format!("refusing to overwrite '{}'", path.display()), e)
			}
			_ => Error::io(format!("failed to create '{}'", path.display()), e),
		})?;

	file.write_all(TEMPLATE.as_bytes())
		.map_err(|e| Error::io(format!("failed to write '{}'", path.display()), e))?;

	log::info!("wrote roster template [path='{}']", path.display());

	Ok(path)
}

/// Instructions printed once the template is in place.
pub fn next_steps(created: &Path) -> String {
	format!(
		"Created: {}\n\n\
		 Next steps:\n  \
		 1. Rename {} to .students.json\n  \
		 2. Edit .students.json with your student information\n  \
		 3. Commit and push the changes",
		created.display(),
		EXAMPLE_FILE_NAME
	)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::{identity::IdentityRegistry, roster::Roster};
	use std::fs;

	#[test]
	fn template_is_a_valid_roster() {
		let dir = tempfile::tempdir().unwrap();
		let path = init_repo(dir.path()).unwrap();
		assert_eq!(path.file_name().unwrap(), EXAMPLE_FILE_NAME);

		// The template only takes effect once renamed.
		fs::rename(&path, dir.path().join(".students.json")).unwrap();

		let mut registry = IdentityRegistry::new();
		let roster = Roster::discover(dir.path(), &mut registry).unwrap();
		assert_eq!(roster.students().len(), 2);
		assert!(roster.filter().selects("src/main.rs"));
		assert!(!roster.filter().selects("tests/cli.rs"));
	}

	#[test]
	fn existing_template_is_kept() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join(EXAMPLE_FILE_NAME);
		fs::write(&path, "mine").unwrap();

		let err = init_repo(dir.path()).unwrap_err();
		assert!(err.to_string().contains("refusing to overwrite"));
		assert_eq!(fs::read_to_string(&path).unwrap(), "mine");
	}

	#[test]
	fn missing_directory_is_an_error() {
		let dir = tempfile::tempdir().unwrap();
		assert!(init_repo(&dir.path().join("nope")).is_err());
	}
}
