// SPDX-License-Identifier: Apache-2.0

use crate::{error::short_hash, identity::Contributor};
use chrono::NaiveDate;
use std::{
	fmt::{self, Display, Formatter},
	sync::Arc,
};

/// A commit as the attribution passes see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
	/// The full hash.
	pub hash: String,
	pub author: Arc<Contributor>,
	/// Authoring day. `None` if git reported something unparsable.
	pub date: Option<NaiveDate>,
	/// The message, without trailing blank lines.
	pub message_lines: Vec<String>,
}

impl Commit {
	pub fn short_hash(&self) -> &str {
		short_hash(&self.hash)
	}

	/// The first line of the message.
	pub fn subject(&self) -> &str {
		self.message_lines.first().map(String::as_str).unwrap_or("")
	}
}

impl Display for Commit {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "{} {}", self.short_hash(), self.subject())
	}
}

/// One line of a file and the commit that last touched it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlameLine {
	pub commit: Arc<Commit>,
	pub content: String,
}

/// Every line of one path at one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFile {
	pub path: String,
	/// The full hash of the snapshot the file was read at.
	pub commit: String,
	pub lines: Vec<BlameLine>,
}

/// Fields of a commit as printed by `git show`, before author lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCommit {
	pub author_name: String,
	pub author_email: String,
	pub date: String,
	pub message_lines: Vec<String>,
}

/// A co-author named in a commit message trailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trailer {
	pub name: String,
	pub email: String,
}
