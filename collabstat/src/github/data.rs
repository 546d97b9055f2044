// SPDX-License-Identifier: Apache-2.0

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Where a review request is in its lifecycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestState {
	#[default]
	Open,
	Closed,
	Merged,
}

impl RequestState {
	/// Parse the service's state name. Anything unrecognized is treated as
	/// open, since an open request is never cached.
	pub fn from_service(state: &str) -> RequestState {
		match state.to_uppercase().as_str() {
			"OPEN" => RequestState::Open,
			"CLOSED" => RequestState::Closed,
			"MERGED" => RequestState::Merged,
			other => {
				log::warn!("unknown review request state [state='{}']", other);
				RequestState::Open
			}
		}
	}
}

/// The verdict a review left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReviewDisposition {
	Approved,
	ChangesRequested,
	Commented,
	Dismissed,
	Pending,
	Other,
}

impl ReviewDisposition {
	pub fn from_service(state: &str) -> ReviewDisposition {
		match state.to_uppercase().as_str() {
			"APPROVED" => ReviewDisposition::Approved,
			"CHANGES_REQUESTED" => ReviewDisposition::ChangesRequested,
			"COMMENTED" => ReviewDisposition::Commented,
			"DISMISSED" => ReviewDisposition::Dismissed,
			"PENDING" => ReviewDisposition::Pending,
			_ => ReviewDisposition::Other,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
	pub reviewer: String,
	pub disposition: ReviewDisposition,
	pub submitted_on: Option<NaiveDate>,
}

/// A commit that is part of a review request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewCommit {
	pub hash: String,
	/// Handle of the author, or their name when they have no handle.
	pub author: String,
	pub author_email: String,
	pub subject: String,
	pub authored_on: Option<NaiveDate>,
	/// Handles (or names) of everyone credited as co-author.
	pub co_authors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
	pub path: String,
	pub additions: u64,
	pub deletions: u64,
	pub has_non_whitespace_changes: bool,
}

/// A pull request and everything attribution needs to know about it.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRequest {
	pub number: u64,
	/// Handle of whoever opened the request.
	pub author: String,
	pub created_on: Option<NaiveDate>,
	pub state: RequestState,
	pub merged_on: Option<NaiveDate>,
	pub merged_by: Option<String>,
	pub commits: Vec<ReviewCommit>,
	pub reviews: Vec<Review>,
	pub files: Vec<ChangedFile>,
}

impl ReviewRequest {
	pub fn is_merged(&self) -> bool {
		self.state == RequestState::Merged
	}

	pub fn is_open(&self) -> bool {
		self.state == RequestState::Open
	}

	/// Whether any commit credits a co-author.
	pub fn is_collaborative(&self) -> bool {
		self.commits.iter().any(|c| !c.co_authors.is_empty())
	}

	/// Reviewers with an approving review, each listed once.
	pub fn approvers(&self) -> BTreeSet<&str> {
		self.reviewers_with(ReviewDisposition::Approved)
	}

	/// Reviewers who requested changes, each listed once.
	pub fn change_requesters(&self) -> BTreeSet<&str> {
		self.reviewers_with(ReviewDisposition::ChangesRequested)
	}

	pub fn commenters(&self) -> BTreeSet<&str> {
		self.reviewers_with(ReviewDisposition::Commented)
	}

	/// Everyone who authored or co-authored a commit in the request.
	pub fn commit_authors(&self) -> BTreeSet<&str> {
		self.commits
			.iter()
			.flat_map(|c| {
				std::iter::once(c.author.as_str()).chain(c.co_authors.iter().map(String::as_str))
			})
			.filter(|a| !a.is_empty())
			.collect()
	}

	fn reviewers_with(&self, disposition: ReviewDisposition) -> BTreeSet<&str> {
		self.reviews
			.iter()
			.filter(|r| r.disposition == disposition && !r.reviewer.is_empty())
			.map(|r| r.reviewer.as_str())
			.collect()
	}
}

/// Whether a handle belongs to an automation account rather than a person.
pub fn is_bot(handle: &str) -> bool {
	handle.starts_with("app/") || handle.ends_with("[bot]")
}
