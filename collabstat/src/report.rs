// SPDX-License-Identifier: Apache-2.0

//! Rendering attribution results as tables.

use crate::{
	attribution::{Attribution, ReviewStats},
	error::short_hash,
	git::Commit,
	roster::Roster,
};
use std::{
	fmt::{self, Display, Formatter},
	sync::Arc,
};
use tabled::{builder::Builder, Table, Tabled};

/// Longest commit subject shown before it is cut short.
const SUBJECT_WIDTH: usize = 50;

/// Everything printed at the end of a run.
pub struct Report<'a> {
	roster: &'a Roster,
	result: &'a Attribution,
	/// Commits owning counted lines, newest first.
	commits: Vec<Arc<Commit>>,
}

impl<'a> Report<'a> {
	pub fn new(
		roster: &'a Roster,
		result: &'a Attribution,
		mut commits: Vec<Arc<Commit>>,
	) -> Self {
		commits.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.hash.cmp(&b.hash)));
		commits.dedup_by(|a, b| a.hash == b.hash);

		Report {
			roster,
			result,
			commits,
		}
	}

	/// Per-student totals for review requests, commits, and lines.
	pub fn summary(&self) -> Table {
		let mut builder = Builder::default();

		let mut header = vec!["ID", "Name"];
		if self.result.review_stats.is_some() {
			header.extend(["PR.Alone", "PR.Collab", "PR.Appr"]);
		}
		header.extend(["C.Alone", "C.Collab", "L.Alone", "L.Collab"]);
		builder.push_record(header);

		for student in self.roster.students() {
			let mut row = vec![student.id.clone(), student.name.clone()];

			if let Some(stats) = self.result.review_stats_for(student) {
				row.extend(review_cells(&stats));
			}

			let (commits_alone, commits_collab) = self.result.commit_totals(student);
			let (lines_alone, lines_collab) = self.result.line_totals(student);
			row.extend(
				[commits_alone, commits_collab, lines_alone, lines_collab]
					.iter()
					.map(ToString::to_string),
			);

			builder.push_record(row);
		}

		builder.build()
	}

	/// Line counts per student for every file with counted lines.
	pub fn file_details(&self) -> Table {
		let mut builder = Builder::default();

		let mut header = self
			.roster
			.students()
			.iter()
			.map(|s| s.id.clone())
			.collect::<Vec<_>>();
		header.extend(["File".to_owned(), "Commits".to_owned()]);
		builder.push_record(header);

		for (path, hashes) in &self.result.file_commits {
			let mut row = self
				.roster
				.students()
				.iter()
				.map(|student| {
					let (alone, collab) = self.result.file_line_counts(student, path);
					line_cell(alone, collab)
				})
				.collect::<Vec<_>>();

			let hashes = hashes
				.iter()
				.map(|hash| short_hash(hash))
				.collect::<Vec<_>>()
				.join("\n");

			row.extend([path.clone(), hashes]);
			builder.push_record(row);
		}

		builder.build()
	}

	/// The commits named in the file details, newest first.
	pub fn commit_lookup(&self) -> Table {
		Table::new(self.commits.iter().map(|commit| CommitRow {
			hash: commit.short_hash().to_owned(),
			date: commit.date.map(|d| d.to_string()).unwrap_or_default(),
			message: truncate(commit.subject(), SUBJECT_WIDTH),
		}))
	}

	fn pattern_lines(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let filter = self.roster.filter();

		let include = filter
			.include()
			.iter()
			.map(|p| p.as_str())
			.collect::<Vec<_>>()
			.join(", ");
		writeln!(f, "Include: {}", include)?;

		if filter.exclude().is_empty() {
			writeln!(f, "Exclude: (none)")
		} else {
			let exclude = filter
				.exclude()
				.iter()
				.map(|p| p.as_str())
				.collect::<Vec<_>>()
				.join(", ");
			writeln!(f, "Exclude: {}", exclude)
		}
	}
}

impl Display for Report<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		self.pattern_lines(f)?;
		writeln!(f)?;

		writeln!(f, "Student summary:")?;
		writeln!(f, "  C=Commits, L=Lines, Alone=without co-authors, Collab=with co-authors")?;
		if self.result.review_stats.is_some() {
			writeln!(f, "  PR cells show merged(open); Appr=approvals given")?;
		}
		writeln!(f, "{}", self.summary())?;
		writeln!(f)?;

		writeln!(f, "File details:")?;
		writeln!(f, "  A=Alone (no co-authors), C=Collab (with co-authors), number=line count")?;
		writeln!(f, "{}", self.file_details())?;
		writeln!(f)?;

		writeln!(f, "Commits:")?;
		write!(f, "{}", self.commit_lookup())
	}
}

#[derive(Debug, Tabled)]
struct CommitRow {
	#[tabled(rename = "Hash")]
	hash: String,
	#[tabled(rename = "Date")]
	date: String,
	#[tabled(rename = "Message")]
	message: String,
}

fn review_cells(stats: &ReviewStats) -> [String; 3] {
	[
		request_cell(stats.alone_merged, stats.alone_open),
		request_cell(stats.collab_merged, stats.collab_open),
		stats.approvals_given.to_string(),
	]
}

/// `merged(open)`, or just `merged` when nothing is open.
fn request_cell(merged: usize, open: usize) -> String {
	if open > 0 {
		format!("{}({})", merged, open)
	} else {
		merged.to_string()
	}
}

/// `A{n},C{n}`, leaving out zero counts.
fn line_cell(alone: usize, collab: usize) -> String {
	let mut parts = Vec::new();
	if alone > 0 {
		parts.push(format!("A{}", alone));
	}
	if collab > 0 {
		parts.push(format!("C{}", collab));
	}
	parts.join(",")
}

fn truncate(text: &str, width: usize) -> String {
	match text.char_indices().nth(width) {
		Some((end, _)) => format!("{}...", &text[..end]),
		None => text.to_owned(),
	}
}
