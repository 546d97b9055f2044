// SPDX-License-Identifier: Apache-2.0

use super::*;
use crate::{
	error::Error,
	git::{BlameLine, Commit, History, TrackedFile},
	github::data::{ChangedFile, RequestState, Review, ReviewCommit, ReviewDisposition},
	identity::IdentityRegistry,
	roster::ROSTER_ID,
};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use test_log::test;

/// A history kept entirely in memory.
#[derive(Default)]
pub(crate) struct MemoryHistory {
	pub(crate) registry: IdentityRegistry,
	commits: HashMap<String, Arc<Commit>>,
	/// Lines at `HEAD`, as (commit hash, content), by path.
	files: BTreeMap<String, Vec<(String, String)>>,
	log: Vec<(String, Vec<String>)>,
	non_whitespace: HashMap<String, HashSet<String>>,
}

impl MemoryHistory {
	pub(crate) fn commit(&mut self, hash: &str, author: (&str, &str), message: &[&str]) {
		let author = self
			.registry
			.lookup(author.0, author.1, "commit", hash)
			.unwrap();
		self.commits.insert(
			hash.to_owned(),
			Arc::new(Commit {
				hash: hash.to_owned(),
				author,
				date: None,
				message_lines: message.iter().map(|l| l.to_string()).collect(),
			}),
		);
	}

	/// Record that `hash` appended `lines` to `path`.
	fn write(&mut self, hash: &str, path: &str, lines: &[&str]) {
		self.files
			.entry(path.to_owned())
			.or_default()
			.extend(lines.iter().map(|l| (hash.to_owned(), l.to_string())));

		match self.log.iter_mut().find(|(h, _)| h == hash) {
			Some((_, paths)) => paths.push(path.to_owned()),
			None => self.log.push((hash.to_owned(), vec![path.to_owned()])),
		}

		if lines.iter().any(|l| !l.trim().is_empty()) {
			self.non_whitespace
				.entry(hash.to_owned())
				.or_default()
				.insert(path.to_owned());
		}
	}
}

impl History for MemoryHistory {
	fn registry(&self) -> &IdentityRegistry {
		&self.registry
	}

	fn resolve_hash(&self, reference: &str) -> Result<String> {
		if reference == "HEAD" || self.commits.contains_key(reference) {
			Ok(reference.to_owned())
		} else {
			Err(Error::CommitNotFound {
				reference: reference.to_owned(),
				repo: "memory".into(),
			})
		}
	}

	fn resolve_commit(&self, reference: &str) -> Result<Arc<Commit>> {
		self.commits
			.get(reference)
			.cloned()
			.ok_or_else(|| Error::CommitNotFound {
				reference: reference.to_owned(),
				repo: "memory".into(),
			})
	}

	fn tracked_paths(&self, _commit: &str) -> Result<Vec<String>> {
		Ok(self.files.keys().cloned().collect())
	}

	fn blame(&self, path: &str, reference: &str) -> Result<TrackedFile> {
		let lines = self.files.get(path).ok_or_else(|| Error::FileNotFoundInRepo {
			path: path.to_owned(),
			commit: reference.to_owned(),
			repo: "memory".into(),
		})?;

		Ok(TrackedFile {
			path: path.to_owned(),
			commit: reference.to_owned(),
			lines: lines
				.iter()
				.map(|(hash, content)| {
					Ok(BlameLine {
						commit: self.resolve_commit(hash)?,
						content: content.clone(),
					})
				})
				.collect::<Result<Vec<_>>>()?,
		})
	}

	fn all_commits_with_files(&self) -> Result<Vec<(String, Vec<String>)>> {
		Ok(self.log.clone())
	}

	fn non_whitespace_files(&self, hash: &str) -> HashSet<String> {
		self.non_whitespace.get(hash).cloned().unwrap_or_default()
	}
}

const X: (&str, &str) = ("Xavier", "x@x");
const Y: (&str, &str) = ("Yolanda", "y@y");
const Z: (&str, &str) = ("Zed", "z@z");
const BOT: (&str, &str) = ("Course Bot", "bot@course");

fn roster_document(files: Value) -> Value {
	json!({
		"id": ROSTER_ID,
		"students": [
			{ "id": "1", "name": X.0, "email": X.1, "github_username": "xavier" },
			{ "id": "2", "name": Y.0, "email": Y.1, "github_username": "yolanda" },
			{ "id": "3", "name": Z.0, "email": Z.1, "github_username": "zed" }
		],
		"ignore": [
			{ "name": BOT.0, "email": BOT.1, "github_username": "course-bot" }
		],
		"files": files
	})
}

fn setup(files: Value) -> (MemoryHistory, Roster) {
	let mut history = MemoryHistory::default();
	let roster = Roster::from_document(&roster_document(files), &mut history.registry).unwrap();
	(history, roster)
}

fn student<'r>(roster: &'r Roster, name: &str) -> &'r Arc<Contributor> {
	roster.students().iter().find(|s| s.name == name).unwrap()
}

/// X writes three lines alone; Y writes two with Z as co-author.
fn scenario() -> (MemoryHistory, Roster) {
	let (mut history, roster) = setup(json!({ "include": ["*.py"] }));

	history.commit("c1", X, &["Add a"]);
	history.write("c1", "a.py", &["import os", "", "def a():", "    return 1"]);

	history.commit("c2", Y, &["Pair on a", "", "Co-authored-by: Zed <z@z>"]);
	history.write("c2", "a.py", &["def b():", "    return 2"]);

	(history, roster)
}

#[test]
fn solo_and_paired_lines_are_split() {
	let (history, roster) = scenario();
	let result = Engine::new(&history, &roster).run(None).unwrap();

	let x = student(&roster, X.0);
	let y = student(&roster, Y.0);
	let z = student(&roster, Z.0);

	assert_eq!(result.alone_lines[x]["a.py"].len(), 3);
	assert!(result.collab_lines[x].is_empty());
	assert_eq!(result.collab_lines[y]["a.py"].len(), 2);
	assert_eq!(result.collab_lines[z]["a.py"].len(), 2);
	assert!(result.alone_lines[y].is_empty());
	assert!(result.alone_lines[z].is_empty());

	assert_eq!(result.commit_totals(x), (1, 0));
	assert_eq!(result.commit_totals(y), (0, 1));
	assert_eq!(result.commit_totals(z), (0, 1));

	let touching = result.file_commits["a.py"].iter().cloned().collect::<Vec<_>>();
	assert_eq!(touching, vec!["c1", "c2"]);
	assert!(result.review_stats.is_none());
}

#[test]
fn alone_and_collab_never_overlap() {
	let (history, roster) = scenario();
	let result = Engine::new(&history, &roster).run(None).unwrap();

	for who in roster.students() {
		for (path, alone) in &result.alone_lines[who] {
			let collab = result.collab_lines[who].get(path).cloned().unwrap_or_default();
			for line in alone {
				assert!(
					!collab.iter().any(|c| c.commit.hash == line.commit.hash),
					"{} counted both ways in {}",
					who,
					path
				);
			}
		}
		let alone = &result.alone_commits[who];
		assert!(alone.is_disjoint(&result.collab_commits[who]));
	}
}

#[test]
fn whitespace_only_commits_count_for_nothing() {
	let (mut history, roster) = scenario();
	history.commit("c3", X, &["Reformat"]);
	history.write("c3", "a.py", &["", "   "]);

	let result = Engine::new(&history, &roster).run(None).unwrap();
	let x = student(&roster, X.0);

	assert_eq!(result.alone_lines[x]["a.py"].len(), 3);
	assert!(!result.alone_commits[x].contains("c3"));
	assert!(!result.file_commits["a.py"].contains("c3"));
}

#[test]
fn ignored_authors_are_invisible() {
	let (mut history, roster) = scenario();
	history.commit("c4", BOT, &["Sync template", "", "Co-authored-by: Xavier <x@x>"]);
	history.write("c4", "b.py", &["print('template')"]);

	let result = Engine::new(&history, &roster).run(None).unwrap();
	let x = student(&roster, X.0);

	assert!(!result.file_commits.contains_key("b.py"));
	assert!(result.alone_lines[x].get("b.py").is_none());
	assert!(result.collab_lines[x].get("b.py").is_none());
	assert!(!result.collab_commits[x].contains("c4"));
}

#[test]
fn ignored_co_authors_do_not_make_work_collaborative() {
	let (mut history, roster) = setup(json!({}));
	history.commit("c1", Y, &["Apply bot fix", "", "Co-authored-by: Course Bot <bot@course>"]);
	history.write("c1", "lib.rs", &["fn main() {}"]);

	let result = Engine::new(&history, &roster).run(None).unwrap();
	let y = student(&roster, Y.0);

	assert_eq!(result.line_totals(y), (1, 0));
	assert_eq!(result.commit_totals(y), (1, 0));
}

#[test]
fn unknown_co_author_fails_line_attribution() {
	let (mut history, roster) = setup(json!({}));
	history.commit("c1", X, &["Pair", "", "Co-authored-by: Mallory <m@evil>"]);
	history.write("c1", "a.py", &["x = 1"]);

	let err = Engine::new(&history, &roster).run(None).unwrap_err();
	match err {
		Error::UnknownAuthor {
			name,
			context_kind,
			context_detail,
			..
		} => {
			assert_eq!(name, "Mallory");
			assert_eq!(context_kind, "co-author in commit");
			assert_eq!(context_detail, "c1");
		}
		other => panic!("unexpected error: {other}"),
	}
}

#[test]
fn unresolvable_commits_are_skipped_by_the_commit_pass() {
	let (mut history, roster) = scenario();
	// In the log, but not resolvable.
	history.log.push(("gone".to_owned(), vec!["a.py".to_owned()]));
	history
		.non_whitespace
		.insert("gone".to_owned(), HashSet::from(["a.py".to_owned()]));

	let mut result = Attribution::for_students(roster.students());
	Engine::new(&history, &roster)
		.attribute_commits(&mut result)
		.unwrap();

	let x = student(&roster, X.0);
	assert_eq!(result.commit_totals(x), (1, 0));
}

#[test]
fn contributors_outside_the_roster_get_no_buckets() {
	let (mut history, roster) = scenario();
	history
		.registry
		.register(Contributor::new("Teaching Assistant", "ta@course"));
	history.commit("c5", ("Teaching Assistant", "ta@course"), &["Hint"]);
	history.write("c5", "hint.py", &["# try harder"]);

	let result = Engine::new(&history, &roster).run(None).unwrap();

	assert!(result.file_commits["hint.py"].contains("c5"));
	for who in roster.students() {
		assert!(result.alone_lines[who].get("hint.py").is_none());
	}
	assert!(!result.alone_lines.keys().any(|c| c.name == "Teaching Assistant"));
}

#[test]
fn exclude_wins_and_overlapping_patterns_count_once() {
	let (mut history, roster) = setup(json!({
		"include": ["*.py", "src/*"],
		"exclude": ["tests/*"]
	}));
	history.commit("c1", X, &["Add code"]);
	history.write("c1", "src/app.py", &["run()"]);
	history.write("c1", "tests/test_app.py", &["assert run()"]);
	history.write("c1", "README.md", &["# App"]);

	let result = Engine::new(&history, &roster).run(None).unwrap();
	let x = student(&roster, X.0);

	assert_eq!(result.alone_lines[x]["src/app.py"].len(), 1);
	assert!(result.alone_lines[x].get("tests/test_app.py").is_none());
	assert!(result.alone_lines[x].get("README.md").is_none());
	assert_eq!(result.line_totals(x), (1, 0));
}

#[test]
fn nested_pattern_skips_top_level_files() {
	let (mut history, roster) = setup(json!({ "include": ["src/**/*.py", "**.md"] }));
	history.commit("c1", X, &["Add top level"]);
	history.write("c1", "src/main.py", &["main()"]);
	history.commit("c2", Y, &["Add package"]);
	history.write("c2", "src/pkg/util.py", &["util()"]);
	history.write("c2", "docs/guide.md", &["Guide"]);

	let result = Engine::new(&history, &roster).run(None).unwrap();
	let x = student(&roster, X.0);
	let y = student(&roster, Y.0);

	assert_eq!(result.line_totals(x), (0, 0));
	assert_eq!(result.commit_totals(x), (0, 0));
	assert_eq!(result.alone_lines[y]["src/pkg/util.py"].len(), 1);
	assert_eq!(result.alone_lines[y]["docs/guide.md"].len(), 1);
	assert!(!result.file_commits.contains_key("src/main.py"));
}

#[test]
fn commit_touching_only_excluded_files_is_not_counted() {
	let (mut history, roster) = setup(json!({ "exclude": ["docs/*"] }));
	history.commit("c1", Z, &["Docs"]);
	history.write("c1", "docs/guide.md", &["Read me"]);

	let result = Engine::new(&history, &roster).run(None).unwrap();
	assert_eq!(result.commit_totals(student(&roster, Z.0)), (0, 0));
}

#[test]
fn repeated_runs_agree() {
	let (history, roster) = scenario();
	let first = Engine::new(&history, &roster).run(None).unwrap();
	let second = Engine::new(&history, &roster).run(None).unwrap();
	assert_eq!(first, second);
}

fn request(number: u64, author: &str, state: RequestState) -> ReviewRequest {
	ReviewRequest {
		number,
		author: author.to_owned(),
		state,
		files: vec![ChangedFile {
			path: "a.py".to_owned(),
			additions: 2,
			deletions: 0,
			has_non_whitespace_changes: true,
		}],
		..ReviewRequest::default()
	}
}

fn commit_with_co_authors(co_authors: &[&str]) -> ReviewCommit {
	ReviewCommit {
		hash: "c2".to_owned(),
		author: "yolanda".to_owned(),
		author_email: Y.1.to_owned(),
		subject: "Pair on a".to_owned(),
		authored_on: None,
		co_authors: co_authors.iter().map(|c| c.to_string()).collect(),
	}
}

fn review(reviewer: &str, disposition: ReviewDisposition) -> Review {
	Review {
		reviewer: reviewer.to_owned(),
		disposition,
		submitted_on: None,
	}
}

#[test]
fn review_requests_are_classified() {
	let (history, roster) = setup(json!({ "include": ["*.py"] }));

	let mut paired = request(1, "Yolanda", RequestState::Merged);
	paired.commits = vec![commit_with_co_authors(&["zed"])];
	paired.reviews = vec![
		review("xavier", ReviewDisposition::Approved),
		review("xavier", ReviewDisposition::Approved),
		review("zed", ReviewDisposition::ChangesRequested),
	];

	let solo_open = request(2, "xavier", RequestState::Open);
	let abandoned = request(3, "xavier", RequestState::Closed);

	let mut docs_only = request(4, "xavier", RequestState::Merged);
	docs_only.files[0].path = "README.md".to_owned();
	docs_only.reviews = vec![review("zed", ReviewDisposition::Approved)];

	let mut bot = request(5, "app/dependabot", RequestState::Merged);
	bot.reviews = vec![review("zed", ReviewDisposition::Approved)];

	let mut whitespace = request(6, "zed", RequestState::Merged);
	whitespace.files[0].has_non_whitespace_changes = false;

	let requests = [paired, solo_open, abandoned, docs_only, bot, whitespace];
	let mut result = Attribution::for_students(roster.students());
	Engine::new(&history, &roster).attribute_reviews(&requests, &mut result);

	let x = result.review_stats_for(student(&roster, X.0)).unwrap();
	let y = result.review_stats_for(student(&roster, Y.0)).unwrap();
	let z = result.review_stats_for(student(&roster, Z.0)).unwrap();

	assert_eq!(y.collab_merged, 1);
	assert_eq!(y.alone_merged, 0);
	assert_eq!(x.alone_open, 1);
	assert_eq!(x.alone_merged, 0);
	assert_eq!(x.approvals_given, 1);
	assert_eq!(z.change_requests_given, 1);
	assert_eq!(z.approvals_given, 0);
	assert_eq!(z.alone_merged, 0);
}
