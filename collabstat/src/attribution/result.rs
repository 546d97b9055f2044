// SPDX-License-Identifier: Apache-2.0

use crate::{git::BlameLine, identity::Contributor};
use std::{
	collections::{BTreeMap, BTreeSet, HashMap},
	sync::Arc,
};

/// Attributed lines, by file path.
pub type FileLines = BTreeMap<String, Vec<BlameLine>>;

/// Whether a unit of work had a valid co-author.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Share {
	Alone,
	Collab,
}

/// Who gets credit for a commit, and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credit {
	pub share: Share,
	/// The author first, then each distinct valid co-author.
	pub recipients: Vec<Arc<Contributor>>,
}

/// Review-request counts for one contributor.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReviewStats {
	pub alone_merged: usize,
	pub alone_open: usize,
	pub collab_merged: usize,
	pub collab_open: usize,
	pub approvals_given: usize,
	pub change_requests_given: usize,
}

/// Everything the attribution passes found.
///
/// Only tracked contributors have entries; work credited to anyone else is
/// dropped, though their commits still appear in `file_commits`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Attribution {
	pub alone_lines: HashMap<Arc<Contributor>, FileLines>,
	pub collab_lines: HashMap<Arc<Contributor>, FileLines>,
	pub alone_commits: HashMap<Arc<Contributor>, BTreeSet<String>>,
	pub collab_commits: HashMap<Arc<Contributor>, BTreeSet<String>>,
	/// Every commit hash that owns a counted line, by file path.
	pub file_commits: BTreeMap<String, BTreeSet<String>>,
	/// Present only when review requests were attributed.
	pub review_stats: Option<HashMap<Arc<Contributor>, ReviewStats>>,
}

impl Attribution {
	/// An empty result with an entry for each tracked contributor.
	pub fn for_students(students: &[Arc<Contributor>]) -> Attribution {
		let mut result = Attribution::default();
		for student in students {
			result.alone_lines.insert(Arc::clone(student), FileLines::new());
			result.collab_lines.insert(Arc::clone(student), FileLines::new());
			result.alone_commits.insert(Arc::clone(student), BTreeSet::new());
			result.collab_commits.insert(Arc::clone(student), BTreeSet::new());
		}
		result
	}

	/// Add one file's lines.
	pub(crate) fn merge_file(&mut self, partial: FilePartial) {
		if !partial.commits.is_empty() {
			self.file_commits
				.entry(partial.path.clone())
				.or_default()
				.extend(partial.commits);
		}

		for (share, by_contributor) in [
			(Share::Alone, partial.alone),
			(Share::Collab, partial.collab),
		] {
			let buckets = match share {
				Share::Alone => &mut self.alone_lines,
				Share::Collab => &mut self.collab_lines,
			};
			for (who, lines) in by_contributor {
				if let Some(files) = buckets.get_mut(&who) {
					files.entry(partial.path.clone()).or_default().extend(lines);
				}
			}
		}
	}

	/// Credit one commit hash.
	pub(crate) fn credit_commit(&mut self, hash: &str, credit: &Credit) {
		let buckets = match credit.share {
			Share::Alone => &mut self.alone_commits,
			Share::Collab => &mut self.collab_commits,
		};
		for who in &credit.recipients {
			if let Some(hashes) = buckets.get_mut(who) {
				hashes.insert(hash.to_owned());
			}
		}
	}

	/// Alone and collab line totals across all files.
	pub fn line_totals(&self, who: &Contributor) -> (usize, usize) {
		let total = |lines: Option<&FileLines>| {
			lines.map_or(0, |files| files.values().map(Vec::len).sum())
		};
		(total(self.alone_lines.get(who)), total(self.collab_lines.get(who)))
	}

	/// Alone and collab line counts for one file.
	pub fn file_line_counts(&self, who: &Contributor, path: &str) -> (usize, usize) {
		let count = |lines: Option<&FileLines>| {
			lines.and_then(|files| files.get(path)).map_or(0, Vec::len)
		};
		(count(self.alone_lines.get(who)), count(self.collab_lines.get(who)))
	}

	/// Alone and collab commit counts.
	pub fn commit_totals(&self, who: &Contributor) -> (usize, usize) {
		(
			self.alone_commits.get(who).map_or(0, BTreeSet::len),
			self.collab_commits.get(who).map_or(0, BTreeSet::len),
		)
	}

	pub fn review_stats_for(&self, who: &Contributor) -> Option<ReviewStats> {
		self.review_stats
			.as_ref()
			.map(|stats| stats.get(who).copied().unwrap_or_default())
	}
}

/// Lines from a single file, before they are merged into the result.
#[derive(Debug, Default)]
pub(crate) struct FilePartial {
	pub path: String,
	pub commits: BTreeSet<String>,
	pub alone: HashMap<Arc<Contributor>, Vec<BlameLine>>,
	pub collab: HashMap<Arc<Contributor>, Vec<BlameLine>>,
}

impl FilePartial {
	pub fn new(path: String) -> FilePartial {
		FilePartial {
			path,
			..FilePartial::default()
		}
	}

	pub fn add(&mut self, line: &BlameLine, credit: &Credit) {
		self.commits.insert(line.commit.hash.clone());
		let bucket = match credit.share {
			Share::Alone => &mut self.alone,
			Share::Collab => &mut self.collab,
		};
		for who in &credit.recipients {
			bucket.entry(Arc::clone(who)).or_default().push(line.clone());
		}
	}
}
