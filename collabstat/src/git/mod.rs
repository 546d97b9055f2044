// SPDX-License-Identifier: Apache-2.0

//! The history layer: commits, co-authors, and blame, read from git.

pub mod data;
pub mod parse;

use crate::{
	cache::{ProcessCache, Retention},
	command::{ExternalCommand, Program},
	error::{short_hash, Error, Result},
	identity::{Contributor, IdentityRegistry},
	roster::FilePattern,
};
use chrono::NaiveDate;
use std::{
	collections::{HashMap, HashSet},
	path::{Path, PathBuf},
	sync::{Arc, OnceLock},
	vec,
};

pub use data::{BlameLine, Commit, TrackedFile};

/// The queries attribution needs from a project's history.
///
/// `GitRepo` answers them with the `git` CLI; tests answer them from memory.
pub trait History: Sync {
	/// The registry commit authors are resolved against.
	fn registry(&self) -> &IdentityRegistry;

	/// Resolve any ref to a full commit hash.
	fn resolve_hash(&self, reference: &str) -> Result<String>;

	/// Resolve a ref and fetch the commit it names.
	fn resolve_commit(&self, reference: &str) -> Result<Arc<Commit>>;

	/// Every path in the tree of a commit, given as a full hash.
	fn tracked_paths(&self, commit: &str) -> Result<Vec<String>>;

	/// Which commit last touched each line of `path` at `reference`.
	fn blame(&self, path: &str, reference: &str) -> Result<TrackedFile>;

	/// Every commit reachable from `HEAD` with the paths it touched.
	fn all_commits_with_files(&self) -> Result<Vec<(String, Vec<String>)>>;

	/// Paths with at least one non-blank added or removed line in a commit.
	///
	/// A diff that can't be read counts as no such change.
	fn non_whitespace_files(&self, hash: &str) -> HashSet<String>;

	/// Contributors named in a commit's co-author trailers.
	///
	/// Any trailer naming someone outside the registry fails the lookup.
	fn co_authors(&self, commit: &Commit) -> Result<Vec<Arc<Contributor>>> {
		parse::co_author_trailers(&commit.message_lines)
			.into_iter()
			.map(|trailer| {
				self.registry().lookup(
					&trailer.name,
					&trailer.email,
					"co-author in commit",
					commit.short_hash(),
				)
			})
			.collect()
	}

	/// Blame every path at `reference` matching `pattern`, one file at a time.
	fn files_matching(
		&self,
		pattern: &FilePattern,
		reference: &str,
	) -> Result<FilesMatching<'_, Self>>
	where
		Self: Sized,
	{
		let commit = self.resolve_hash(reference)?;
		let paths = self
			.tracked_paths(&commit)?
			.into_iter()
			.filter(|path| pattern.matches(path))
			.collect::<Vec<_>>();

		log::debug!(
			"matched tracked files [pattern='{}', commit='{}', files='{}']",
			pattern,
			short_hash(&commit),
			paths.len()
		);

		Ok(FilesMatching {
			history: self,
			commit,
			paths: paths.into_iter(),
		})
	}
}

/// Lazily blames a list of paths at one commit.
///
/// Clone it to walk the same files again.
#[derive(Debug)]
pub struct FilesMatching<'h, H> {
	history: &'h H,
	commit: String,
	paths: vec::IntoIter<String>,
}

impl<'h, H> Clone for FilesMatching<'h, H> {
	fn clone(&self) -> Self {
		FilesMatching {
			history: self.history,
			commit: self.commit.clone(),
			paths: self.paths.clone(),
		}
	}
}

impl<'h, H: History> FilesMatching<'h, H> {
	/// Drop paths before any of them are blamed.
	pub fn retain<F>(self, mut keep: F) -> Self
	where
		F: FnMut(&str) -> bool,
	{
		let paths = self.paths.filter(|p| keep(p)).collect::<Vec<_>>();
		FilesMatching {
			history: self.history,
			commit: self.commit,
			paths: paths.into_iter(),
		}
	}

	/// The paths still to be blamed.
	pub fn paths(&self) -> &[String] {
		self.paths.as_slice()
	}
}

impl<'h, H: History> Iterator for FilesMatching<'h, H> {
	type Item = Result<TrackedFile>;

	fn next(&mut self) -> Option<Self::Item> {
		let path = self.paths.next()?;
		Some(self.history.blame(&path, &self.commit))
	}

	fn size_hint(&self) -> (usize, Option<usize>) {
		self.paths.size_hint()
	}
}

impl<'h, H: History> ExactSizeIterator for FilesMatching<'h, H> {}

/// Make sure `path` is inside a git work tree and return its absolute path.
pub fn verify_repository(path: &Path) -> Result<PathBuf> {
	let absolute = path.canonicalize().map_err(|_| Error::NotARepository {
		path: path.to_owned(),
	})?;

	let mut command =
		ExternalCommand::for_repo(Program::Git, &absolute, ["rev-parse", "--git-dir"])?;

	match command.output() {
		Ok(_) => Ok(absolute),
		Err(Error::CommandFailed { .. }) => Err(Error::NotARepository {
			path: path.to_owned(),
		}),
		Err(e) => Err(e),
	}
}

/// A local git repository read through the `git` CLI.
pub struct GitRepo<'a> {
	path: PathBuf,
	cache: &'a ProcessCache,
	registry: &'a IdentityRegistry,
	repo_id: OnceLock<String>,
}

impl<'a> GitRepo<'a> {
	pub fn new(path: PathBuf, cache: &'a ProcessCache, registry: &'a IdentityRegistry) -> Self {
		GitRepo {
			path,
			cache,
			registry,
			repo_id: OnceLock::new(),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// An identity shared by every clone of the repository, taken from the
	/// `origin` remote, or the directory name when there is none.
	pub fn repo_id(&self) -> &str {
		self.repo_id.get_or_init(|| {
			let from_remote = self
				.git(&["remote", "get-url", "origin"])
				.ok()
				.and_then(|url| parse::repo_id_from_remote(&url));

			let id = from_remote.unwrap_or_else(|| {
				self.path
					.file_name()
					.map(|name| name.to_string_lossy().into_owned())
					.unwrap_or_else(|| self.path.display().to_string())
			});

			log::debug!("resolved repository identity [repo_id='{}']", id);
			id
		})
	}

	fn git(&self, args: &[&str]) -> Result<String> {
		ExternalCommand::for_repo(Program::Git, &self.path, args)?.output()
	}

	fn git_cached(&self, key: &str, retention: Retention, args: &[&str]) -> Result<String> {
		self.cache.get_or_run(key, retention, || self.git(args))
	}

	fn commit_not_found(&self, reference: &str) -> Error {
		Error::CommitNotFound {
			reference: reference.to_owned(),
			repo: self.path.clone(),
		}
	}

	/// Fetch the commit for a full hash.
	fn commit(&self, hash: &str) -> Result<Arc<Commit>> {
		let key = format!("commit:{}:{}", self.repo_id(), hash);
		let output = self
			.git_cached(
				&key,
				Retention::Persistent,
				&["show", "-s", "--format=%aN%n%aE%n%as%n%B", hash],
			)
			.map_err(|e| match e {
				Error::CommandFailed { .. } => self.commit_not_found(hash),
				other => other,
			})?;

		let raw = parse::show(&output).ok_or_else(|| self.commit_not_found(hash))?;

		let author = self.registry.lookup(
			&raw.author_name,
			&raw.author_email,
			"commit",
			short_hash(hash),
		)?;

		let date = NaiveDate::parse_from_str(&raw.date, "%Y-%m-%d")
			.map_err(|e| {
				log::warn!(
					"git commit has invalid date [commit='{}', date='{}', error='{}']",
					short_hash(hash),
					raw.date,
					e
				);
			})
			.ok();

		Ok(Arc::new(Commit {
			hash: hash.to_owned(),
			author,
			date,
			message_lines: raw.message_lines,
		}))
	}
}

fn is_full_hash(reference: &str) -> bool {
	reference.len() == 40
		&& reference
			.bytes()
			.all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn is_missing_path(stderr: &str) -> bool {
	let stderr = stderr.to_lowercase();
	["no such path", "no such file", "does not exist"]
		.iter()
		.any(|needle| stderr.contains(needle))
}

impl<'a> History for GitRepo<'a> {
	fn registry(&self) -> &IdentityRegistry {
		self.registry
	}

	fn resolve_hash(&self, reference: &str) -> Result<String> {
		// Full hashes can be stored for good; anything else may move.
		let retention = if is_full_hash(reference) {
			Retention::Persistent
		} else {
			Retention::Session
		};
		let key = format!("rev-parse:{}:{}", self.repo_id(), reference);
		let target = format!("{}^{{commit}}", reference);

		let output = self
			.git_cached(&key, retention, &["rev-parse", "--verify", "--quiet", &target])
			.map_err(|e| match e {
				Error::CommandFailed { .. } => self.commit_not_found(reference),
				other => other,
			})?;

		let hash = output.trim();
		if is_full_hash(hash) {
			Ok(hash.to_owned())
		} else {
			Err(self.commit_not_found(reference))
		}
	}

	fn resolve_commit(&self, reference: &str) -> Result<Arc<Commit>> {
		let hash = self.resolve_hash(reference)?;
		self.commit(&hash)
	}

	fn tracked_paths(&self, commit: &str) -> Result<Vec<String>> {
		let key = format!("ls-tree:{}:{}", self.repo_id(), commit);
		let output = self.git_cached(
			&key,
			Retention::Persistent,
			&["ls-tree", "-r", "--name-only", commit],
		)?;
		Ok(parse::tree_paths(&output))
	}

	fn blame(&self, path: &str, reference: &str) -> Result<TrackedFile> {
		let commit = self.resolve_hash(reference)?;
		let key = format!("blame:{}:{}:{}", self.repo_id(), commit, path);

		let output = self
			.git_cached(
				&key,
				Retention::Persistent,
				&["blame", "--porcelain", "-M", "-C", "-C", &commit, "--", path],
			)
			.map_err(|e| match e {
				Error::CommandFailed { ref stderr, .. } if is_missing_path(stderr) => {
					Error::FileNotFoundInRepo {
						path: path.to_owned(),
						commit: commit.clone(),
						repo: self.path.clone(),
					}
				}
				other => other,
			})?;

		let mut commits: HashMap<String, Arc<Commit>> = HashMap::new();
		let mut lines = Vec::new();

		for (hash, content) in parse::blame_porcelain(&output) {
			let commit = match commits.get(&hash) {
				Some(commit) => Arc::clone(commit),
				None => {
					let commit = self.commit(&hash)?;
					commits.insert(hash, Arc::clone(&commit));
					commit
				}
			};
			lines.push(BlameLine { commit, content });
		}

		log::trace!(
			"blamed file [path='{}', lines='{}', commits='{}']",
			path,
			lines.len(),
			commits.len()
		);

		Ok(TrackedFile {
			path: path.to_owned(),
			commit,
			lines,
		})
	}

	fn all_commits_with_files(&self) -> Result<Vec<(String, Vec<String>)>> {
		let head = self.resolve_hash("HEAD")?;
		let key = format!("log-files:{}:{}", self.repo_id(), head);
		let output = self.git_cached(
			&key,
			Retention::Persistent,
			&["log", "--pretty=format:%H", "--name-only", &head],
		)?;
		Ok(parse::log_name_only(&output))
	}

	fn non_whitespace_files(&self, hash: &str) -> HashSet<String> {
		let key = format!("show-diff:{}:{}", self.repo_id(), hash);
		match self.git_cached(&key, Retention::Persistent, &["show", hash, "--format=", "-p"]) {
			Ok(diff) => parse::non_whitespace_files(&diff),
			Err(e) => {
				log::debug!(
					"treating unreadable diff as whitespace-only [commit='{}', error='{}']",
					short_hash(hash),
					e
				);
				HashSet::new()
			}
		}
	}
}
