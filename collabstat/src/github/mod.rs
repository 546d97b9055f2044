// SPDX-License-Identifier: Apache-2.0

//! The review layer: pull requests, their commits, and their reviews, read
//! through the `gh` CLI.

pub mod data;
pub mod parse;

use crate::{
	cache::ProcessCache,
	command::{ExternalCommand, Program},
	error::{Error, Result},
	git::{self, History},
};
use std::{
	collections::{HashMap, HashSet},
	path::PathBuf,
};

pub use data::{ReviewCommit, ReviewRequest};

/// How many requests a single listing asks for.
const REQUEST_LIMIT: &str = "500";

const DETAIL_FIELDS: &str = "number,author,createdAt,state,mergedAt,mergedBy,reviews,files";

/// The review requests attribution runs over.
pub trait Reviews {
	/// Every request in the repository, whatever its state.
	fn list_requests(&self) -> Result<Vec<ReviewRequest>>;

	/// Paths with a non-blank change in a request's diff.
	///
	/// A diff that can't be read counts as no such change.
	fn diff_non_whitespace_files(&self, number: u64) -> HashSet<String>;
}

/// Something that answers `gh` subcommands with their stdout.
pub trait GhClient {
	fn run(&self, args: &[&str]) -> Result<String>;
}

/// The `gh` CLI, run inside a local clone.
#[derive(Debug)]
pub struct GhCli {
	repo_path: PathBuf,
}

impl GhCli {
	pub fn new(repo_path: PathBuf) -> GhCli {
		GhCli { repo_path }
	}
}

impl GhClient for GhCli {
	fn run(&self, args: &[&str]) -> Result<String> {
		ExternalCommand::for_repo(Program::Gh, &self.repo_path, args)?.output()
	}
}

/// Review requests for a local clone, fetched with `gh`.
pub struct GitHubReviews<'a, H, C = GhCli> {
	history: &'a H,
	cache: &'a ProcessCache,
	client: C,
	repo_id: String,
}

impl<'a, H: History> GitHubReviews<'a, H, GhCli> {
	pub fn new(
		history: &'a H,
		cache: &'a ProcessCache,
		repo_path: PathBuf,
		repo_id: impl Into<String>,
	) -> Self {
		GitHubReviews::with_client(history, cache, GhCli::new(repo_path), repo_id)
	}
}

impl<'a, H: History, C: GhClient> GitHubReviews<'a, H, C> {
	pub fn with_client(
		history: &'a H,
		cache: &'a ProcessCache,
		client: C,
		repo_id: impl Into<String>,
	) -> Self {
		GitHubReviews {
			history,
			cache,
			client,
			repo_id: repo_id.into(),
		}
	}

	fn gh(&self, args: &[&str]) -> Result<String> {
		self.client.run(args)
	}

	/// Run a `gh` listing, turning command failures into review errors.
	fn gh_listing(&self, args: &[&str]) -> Result<String> {
		self.gh(args).map_err(|e| match e {
			Error::CommandFailed { stderr, .. } => Error::ReviewService {
				message: format!("failed to fetch pull requests: {}", stderr),
				source: None,
			},
			other => other,
		})
	}

	/// The commits of one request, or none if they can't be fetched.
	fn request_commits(&self, number: u64) -> Vec<ReviewCommit> {
		let number_arg = number.to_string();
		let listing = self
			.gh(&["pr", "view", &number_arg, "--json", "commits"])
			.and_then(|json| parse::commits(&json));

		let raw_commits = match listing {
			Ok(raw) => raw,
			Err(e) => {
				log::warn!(
					"can't fetch review request commits [number='{}', error='{}']",
					number,
					e
				);
				return Vec::new();
			}
		};

		raw_commits
			.into_iter()
			.map(|raw| match self.local_commit(&raw.oid) {
				Ok(commit) => ReviewCommit {
					authored_on: commit.authored_on.or_else(|| {
						raw.authored_date.as_deref().and_then(parse::day)
					}),
					..commit
				},
				Err(e) => {
					log::debug!(
						"using review service record for commit [commit='{}', error='{}']",
						raw.oid,
						e
					);
					raw.into_review_commit()
				}
			})
			.collect()
	}

	/// Describe a commit from local history, which knows its co-authors.
	fn local_commit(&self, hash: &str) -> Result<ReviewCommit> {
		let commit = self.history.resolve_commit(hash)?;
		let co_authors = self
			.history
			.co_authors(&commit)?
			.iter()
			.map(|c| c.handle().to_owned())
			.collect();

		Ok(ReviewCommit {
			hash: commit.hash.clone(),
			author: commit.author.handle().to_owned(),
			author_email: commit.author.email.clone(),
			subject: commit.subject().to_owned(),
			authored_on: commit.date,
			co_authors,
		})
	}
}

impl<'a, H: History, C: GhClient> Reviews for GitHubReviews<'a, H, C> {
	fn list_requests(&self) -> Result<Vec<ReviewRequest>> {
		let listing = self.gh_listing(&[
			"pr",
			"list",
			"--state",
			"all",
			"--limit",
			REQUEST_LIMIT,
			"--json",
			"number,state",
		])?;

		let summaries = parse::summaries(&listing)?;

		let mut found: HashMap<u64, ReviewRequest> = HashMap::new();
		let mut missing: HashSet<u64> = HashSet::new();

		for summary in &summaries {
			let cached = match summary.state() {
				data::RequestState::Open => None,
				_ => self.cache.closed_request(&self.repo_id, summary.number),
			};
			match cached {
				Some(request) => {
					found.insert(summary.number, request);
				}
				None => {
					missing.insert(summary.number);
				}
			}
		}

		log::info!(
			"listed review requests [total='{}', cached='{}', to_fetch='{}']",
			summaries.len(),
			found.len(),
			missing.len()
		);

		if !missing.is_empty() {
			let details = self.gh_listing(&[
				"pr",
				"list",
				"--state",
				"all",
				"--limit",
				REQUEST_LIMIT,
				"--json",
				DETAIL_FIELDS,
			])?;

			for raw in parse::requests(&details)? {
				if !missing.contains(&raw.number) {
					continue;
				}

				let number = raw.number;
				let commits = self.request_commits(number);
				let non_whitespace = self.diff_non_whitespace_files(number);
				let request = raw.into_request(commits, &non_whitespace);

				self.cache.store_request(&self.repo_id, &request);
				found.insert(number, request);
			}
		}

		// Keep the service's listing order.
		Ok(summaries
			.iter()
			.filter_map(|summary| found.remove(&summary.number))
			.collect())
	}

	fn diff_non_whitespace_files(&self, number: u64) -> HashSet<String> {
		let number_arg = number.to_string();
		match self.gh(&["pr", "diff", &number_arg]) {
			Ok(diff) => git::parse::non_whitespace_files(&diff),
			Err(e) => {
				log::debug!(
					"treating unreadable request diff as whitespace-only [number='{}', error='{}']",
					number,
					e
				);
				HashSet::new()
			}
		}
	}
}
