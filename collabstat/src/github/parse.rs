// SPDX-License-Identifier: Apache-2.0

//! Decoding the JSON the `gh` CLI prints.

use crate::{
	error::{Error, Result},
	github::data::{
		ChangedFile, RequestState, Review, ReviewCommit, ReviewDisposition, ReviewRequest,
	},
};
use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Deserialize};
use std::collections::HashSet;

#[derive(Debug, Deserialize)]
pub struct RawSummary {
	pub number: u64,
	#[serde(default)]
	pub state: Option<String>,
}

impl RawSummary {
	pub fn state(&self) -> RequestState {
		RequestState::from_service(self.state.as_deref().unwrap_or("OPEN"))
	}
}

#[derive(Debug, Default, Deserialize)]
pub struct RawActor {
	#[serde(default)]
	pub login: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReview {
	#[serde(default)]
	pub author: Option<RawActor>,
	#[serde(default)]
	pub state: Option<String>,
	#[serde(default)]
	pub submitted_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawFile {
	#[serde(default)]
	pub path: String,
	#[serde(default)]
	pub additions: u64,
	#[serde(default)]
	pub deletions: u64,
}

/// A review request as `gh pr list --json ...` describes it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRequest {
	pub number: u64,
	#[serde(default)]
	pub author: Option<RawActor>,
	#[serde(default)]
	pub created_at: Option<String>,
	#[serde(default)]
	pub state: Option<String>,
	#[serde(default)]
	pub merged_at: Option<String>,
	#[serde(default)]
	pub merged_by: Option<RawActor>,
	#[serde(default)]
	pub reviews: Vec<RawReview>,
	#[serde(default)]
	pub files: Vec<RawFile>,
}

impl RawRequest {
	/// Combine the listing with the request's commits and the files whose
	/// diff has non-blank changes.
	pub fn into_request(
		self,
		commits: Vec<ReviewCommit>,
		non_whitespace: &HashSet<String>,
	) -> ReviewRequest {
		let reviews = self
			.reviews
			.into_iter()
			.map(|r| Review {
				reviewer: login(r.author),
				disposition: ReviewDisposition::from_service(r.state.as_deref().unwrap_or("")),
				submitted_on: r.submitted_at.as_deref().and_then(day),
			})
			.collect();

		let files = self
			.files
			.into_iter()
			.map(|f| ChangedFile {
				has_non_whitespace_changes: non_whitespace.contains(&f.path),
				path: f.path,
				additions: f.additions,
				deletions: f.deletions,
			})
			.collect();

		ReviewRequest {
			number: self.number,
			author: login(self.author),
			created_on: self.created_at.as_deref().and_then(day),
			state: RequestState::from_service(self.state.as_deref().unwrap_or("OPEN")),
			merged_on: self.merged_at.as_deref().and_then(day),
			merged_by: self.merged_by.and_then(|actor| actor.login).filter(|l| !l.is_empty()),
			commits,
			reviews,
			files,
		}
	}
}

#[derive(Debug, Default, Deserialize)]
pub struct RawCommitAuthor {
	#[serde(default)]
	pub login: Option<String>,
	#[serde(default)]
	pub email: Option<String>,
}

/// A commit as `gh pr view --json commits` describes it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCommit {
	pub oid: String,
	#[serde(default)]
	pub authors: Vec<RawCommitAuthor>,
	#[serde(default)]
	pub message_headline: Option<String>,
	#[serde(default)]
	pub authored_date: Option<String>,
}

impl RawCommit {
	/// Build a commit from the service's own record: the first author is
	/// the author, every other author is a co-author.
	pub fn into_review_commit(self) -> ReviewCommit {
		let mut authors = self.authors.into_iter();
		let first = authors.next().unwrap_or_default();
		let co_authors = authors
			.filter_map(|a| a.login)
			.filter(|login| !login.is_empty())
			.collect();

		ReviewCommit {
			hash: self.oid,
			author: first.login.unwrap_or_default(),
			author_email: first.email.unwrap_or_default(),
			subject: self.message_headline.unwrap_or_default(),
			authored_on: self.authored_date.as_deref().and_then(day),
			co_authors,
		}
	}
}

#[derive(Debug, Deserialize)]
struct RawCommitList {
	#[serde(default)]
	commits: Vec<RawCommit>,
}

pub fn summaries(json: &str) -> Result<Vec<RawSummary>> {
	decode(json)
}

pub fn requests(json: &str) -> Result<Vec<RawRequest>> {
	decode(json)
}

pub fn commits(json: &str) -> Result<Vec<RawCommit>> {
	decode::<RawCommitList>(json).map(|list| list.commits)
}

fn decode<T: DeserializeOwned>(json: &str) -> Result<T> {
	serde_json::from_str(json)
		.map_err(|e| Error::review_service(format!("invalid JSON from gh: {}", e), e))
}

fn login(actor: Option<RawActor>) -> String {
	actor.and_then(|a| a.login).unwrap_or_default()
}

/// The day part of a service timestamp like `2024-03-05T10:00:00Z`.
pub fn day(timestamp: &str) -> Option<NaiveDate> {
	let date = timestamp.get(..10)?;
	NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn parse_summaries() {
		let json = r#"[{"number": 3, "state": "OPEN"}, {"number": 2, "state": "MERGED"}, {"number": 1}]"#;
		let parsed = summaries(json).unwrap();
		assert_eq!(parsed.len(), 3);
		assert_eq!(parsed[1].state(), RequestState::Merged);
		assert_eq!(parsed[2].state(), RequestState::Open);
	}

	#[test]
	fn invalid_json_is_a_review_service_error() {
		let err = summaries("not json").unwrap_err();
		assert!(matches!(err, Error::ReviewService { .. }));
		assert!(err.to_string().contains("invalid JSON from gh"));
	}

	#[test]
	fn parse_request_details() {
		let json = r#"[{
			"number": 7,
			"author": {"login": "alice", "name": "Alice"},
			"createdAt": "2024-03-01T09:15:00Z",
			"state": "MERGED",
			"mergedAt": "2024-03-02T18:00:00Z",
			"mergedBy": {"login": "bob"},
			"reviews": [
				{"author": {"login": "bob"}, "state": "APPROVED", "submittedAt": "2024-03-02T17:00:00Z"},
				{"author": null, "state": "COMMENTED", "submittedAt": null}
			],
			"files": [
				{"path": "src/a.py", "additions": 3, "deletions": 1},
				{"path": "README.md", "additions": 1, "deletions": 0}
			]
		}]"#;

		let raw = requests(json).unwrap().into_iter().next().unwrap();
		let non_whitespace = HashSet::from(["src/a.py".to_owned()]);
		let request = raw.into_request(Vec::new(), &non_whitespace);

		assert_eq!(request.number, 7);
		assert_eq!(request.author, "alice");
		assert_eq!(request.created_on, NaiveDate::from_ymd_opt(2024, 3, 1));
		assert_eq!(request.merged_on, NaiveDate::from_ymd_opt(2024, 3, 2));
		assert_eq!(request.merged_by.as_deref(), Some("bob"));
		assert!(request.is_merged());
		assert_eq!(request.reviews[0].disposition, ReviewDisposition::Approved);
		assert_eq!(request.reviews[1].reviewer, "");
		assert!(request.files[0].has_non_whitespace_changes);
		assert!(!request.files[1].has_non_whitespace_changes);
		assert_eq!(request.files[0].additions, 3);
	}

	#[test]
	fn deleted_author_is_empty() {
		let json = r#"[{"number": 1, "author": null, "state": "CLOSED"}]"#;
		let request = requests(json)
			.unwrap()
			.remove(0)
			.into_request(Vec::new(), &HashSet::new());
		assert_eq!(request.author, "");
		assert_eq!(request.state, RequestState::Closed);
	}

	#[test]
	fn service_commit_fallback() {
		let json = r#"{"commits": [{
			"oid": "0123456789abcdef0123456789abcdef01234567",
			"authors": [
				{"login": "alice", "email": "alice@example.com", "name": "Alice"},
				{"login": "bob", "email": "bob@example.com"},
				{"login": "", "email": "ghost@example.com"}
			],
			"messageHeadline": "Pair on parser",
			"authoredDate": "2024-03-01T09:15:00Z"
		}]}"#;

		let commit = commits(json).unwrap().remove(0).into_review_commit();
		assert_eq!(commit.author, "alice");
		assert_eq!(commit.author_email, "alice@example.com");
		assert_eq!(commit.co_authors, vec!["bob"]);
		assert_eq!(commit.subject, "Pair on parser");
		assert_eq!(commit.authored_on, NaiveDate::from_ymd_opt(2024, 3, 1));
	}

	#[test]
	fn days_need_a_full_date() {
		assert_eq!(day("2024-03-05"), NaiveDate::from_ymd_opt(2024, 3, 5));
		assert_eq!(day("2024-03"), None);
		assert_eq!(day("yesterday!"), None);
	}
}
