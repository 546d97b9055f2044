// SPDX-License-Identifier: Apache-2.0

//! Crediting lines, commits, and review requests to the roster.
//!
//! Each pass classifies a unit of work as done alone or in collaboration,
//! based on whether its commit names any valid (non-ignored) co-author.
//! Work by an ignored author is dropped entirely.

mod progress;
mod result;

pub use result::{Attribution, Credit, FileLines, ReviewStats, Share};

use crate::{
	error::{short_hash, Result},
	git::{Commit, History, TrackedFile},
	github::data::{is_bot, ReviewRequest},
	identity::Contributor,
	roster::Roster,
};
use rayon::prelude::*;
use result::FilePartial;
use std::{
	collections::{HashMap, HashSet},
	sync::{Arc, Mutex, PoisonError},
};

/// The snapshot line attribution reads.
const SNAPSHOT: &str = "HEAD";

type CoAuthors = Arc<[Arc<Contributor>]>;

pub struct Engine<'a, H> {
	history: &'a H,
	roster: &'a Roster,
	co_authors: Mutex<HashMap<String, CoAuthors>>,
	show_progress: bool,
}

impl<'a, H: History> Engine<'a, H> {
	pub fn new(history: &'a H, roster: &'a Roster) -> Self {
		Engine {
			history,
			roster,
			co_authors: Mutex::new(HashMap::new()),
			show_progress: false,
		}
	}

	pub fn show_progress(mut self, show: bool) -> Self {
		self.show_progress = show;
		self
	}

	/// Run the line and commit passes, plus the review pass when requests
	/// are given.
	pub fn run(&self, requests: Option<&[ReviewRequest]>) -> Result<Attribution> {
		let mut result = Attribution::for_students(self.roster.students());

		self.attribute_lines(&mut result)?;
		self.attribute_commits(&mut result)?;

		if let Some(requests) = requests {
			self.attribute_reviews(requests, &mut result);
		}

		Ok(result)
	}

	/// Credit every non-blank line of every selected file at `HEAD`.
	pub fn attribute_lines(&self, result: &mut Attribution) -> Result<()> {
		let filter = self.roster.filter();
		let mut seen = HashSet::new();

		for pattern in filter.include() {
			let files = self
				.history
				.files_matching(pattern, SNAPSHOT)?
				.retain(|path| !filter.is_excluded(path) && seen.insert(path.to_owned()));

			let bar = progress::bar(
				self.show_progress,
				files.len() as u64,
				format!("blaming {}", pattern),
			);

			let partials = files
				.par_bridge()
				.map(|file| {
					let partial = self.attribute_file(file?);
					bar.inc(1);
					partial
				})
				.collect::<Result<Vec<_>>>()?;

			bar.finish_and_clear();

			for partial in partials {
				result.merge_file(partial);
			}
		}

		log::info!(
			"attributed lines [files='{}']",
			result.file_commits.len()
		);

		Ok(())
	}

	fn attribute_file(&self, file: TrackedFile) -> Result<FilePartial> {
		let mut partial = FilePartial::new(file.path);

		for line in &file.lines {
			if line.content.trim().is_empty() {
				continue;
			}

			if let Some(credit) = self.credit(&line.commit)? {
				partial.add(line, &credit);
			}
		}

		Ok(partial)
	}

	/// Credit every commit that made a non-blank change to a selected file.
	pub fn attribute_commits(&self, result: &mut Attribution) -> Result<()> {
		let commits = self.history.all_commits_with_files()?;
		let bar = progress::bar(self.show_progress, commits.len() as u64, "scanning commits");

		let credited = commits
			.par_iter()
			.map(|(hash, paths)| {
				let credit = self.attribute_commit(hash, paths);
				bar.inc(1);
				credit
			})
			.collect::<Result<Vec<_>>>()?;

		bar.finish_and_clear();

		let mut counted = 0;
		for (hash, credit) in credited.into_iter().flatten() {
			result.credit_commit(&hash, &credit);
			counted += 1;
		}

		log::info!(
			"attributed commits [total='{}', counted='{}']",
			commits.len(),
			counted
		);

		Ok(())
	}

	fn attribute_commit(&self, hash: &str, paths: &[String]) -> Result<Option<(String, Credit)>> {
		let filter = self.roster.filter();
		let selected = paths
			.iter()
			.filter(|path| filter.selects(path))
			.collect::<Vec<_>>();

		if selected.is_empty() {
			return Ok(None);
		}

		let changed = self.history.non_whitespace_files(hash);
		if !selected.iter().any(|path| changed.contains(path.as_str())) {
			log::trace!("skipping whitespace-only commit [commit='{}']", short_hash(hash));
			return Ok(None);
		}

		let credit = self
			.history
			.resolve_commit(hash)
			.and_then(|commit| Ok(self.credit(&commit)?.map(|c| (commit.hash.clone(), c))));

		match credit {
			Err(e) if e.is_skippable() => {
				log::debug!(
					"skipping commit [commit='{}', reason='{}']",
					short_hash(hash),
					e
				);
				Ok(None)
			}
			other => other,
		}
	}

	/// Count review requests by their authors, and reviews by reviewers.
	pub fn attribute_reviews(&self, requests: &[ReviewRequest], result: &mut Attribution) {
		let filter = self.roster.filter();
		let mut stats: HashMap<Arc<Contributor>, ReviewStats> = self
			.roster
			.students()
			.iter()
			.map(|s| (Arc::clone(s), ReviewStats::default()))
			.collect();

		for request in requests {
			if is_bot(&request.author) {
				continue;
			}

			let touches_selected = request
				.files
				.iter()
				.any(|f| f.has_non_whitespace_changes && filter.selects(&f.path));
			if !touches_selected {
				continue;
			}

			if !request.is_merged() && !request.is_open() {
				continue;
			}

			if let Some(author) = self.roster.student_by_handle(&request.author) {
				let entry = stats.entry(Arc::clone(author)).or_default();
				match (request.is_collaborative(), request.is_merged()) {
					(false, true) => entry.alone_merged += 1,
					(false, false) => entry.alone_open += 1,
					(true, true) => entry.collab_merged += 1,
					(true, false) => entry.collab_open += 1,
				}
			}

			for reviewer in request.approvers() {
				if let Some(student) = self.roster.student_by_handle(reviewer) {
					stats.entry(Arc::clone(student)).or_default().approvals_given += 1;
				}
			}

			for reviewer in request.change_requesters() {
				if let Some(student) = self.roster.student_by_handle(reviewer) {
					stats.entry(Arc::clone(student)).or_default().change_requests_given += 1;
				}
			}
		}

		log::info!("attributed review requests [total='{}']", requests.len());

		result.review_stats = Some(stats);
	}

	/// How a commit's work is credited, or `None` if its author is ignored.
	pub fn credit(&self, commit: &Commit) -> Result<Option<Credit>> {
		if self.roster.is_ignored(&commit.author) {
			return Ok(None);
		}

		let co_authors = self.valid_co_authors(commit)?;
		let mut recipients = vec![Arc::clone(&commit.author)];

		if co_authors.is_empty() {
			return Ok(Some(Credit {
				share: Share::Alone,
				recipients,
			}));
		}

		for co_author in co_authors.iter() {
			if !recipients.contains(co_author) {
				recipients.push(Arc::clone(co_author));
			}
		}

		Ok(Some(Credit {
			share: Share::Collab,
			recipients,
		}))
	}

	/// A commit's co-authors minus ignored ones, computed once per commit.
	fn valid_co_authors(&self, commit: &Commit) -> Result<CoAuthors> {
		if let Some(known) = self
			.co_authors
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.get(&commit.hash)
		{
			return Ok(Arc::clone(known));
		}

		let valid: CoAuthors = self
			.history
			.co_authors(commit)?
			.into_iter()
			.filter(|c| !self.roster.is_ignored(c))
			.collect();

		self.co_authors
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.insert(commit.hash.clone(), Arc::clone(&valid));

		Ok(valid)
	}
}

#[cfg(test)]
pub(crate) mod test;
