// SPDX-License-Identifier: Apache-2.0

//! Canonical contributor identities and the registry that resolves raw
//! name/email pairs to them.

use crate::error::{Error, Result};
use std::{
	collections::HashMap,
	fmt::{self, Display, Formatter},
	hash::{Hash, Hasher},
	sync::Arc,
};

/// One real person, however many names and emails they commit under.
///
/// Equality and hashing only consider the primary name and email, which is
/// the key the person was first registered under.
#[derive(Debug, Clone, Default)]
pub struct Contributor {
	pub name: String,
	pub email: String,
	/// Roster id, empty for ignored contributors.
	pub id: String,
	/// Handle on the code-review service.
	pub github_username: String,
	pub other_names: Vec<String>,
	pub other_emails: Vec<String>,
	pub allow_auto_update: bool,
}

impl Contributor {
	pub fn new(name: impl Into<String>, email: impl Into<String>) -> Contributor {
		Contributor {
			name: name.into(),
			email: email.into(),
			..Contributor::default()
		}
	}

	/// The name to show for this person on the review service.
	pub fn handle(&self) -> &str {
		if self.github_username.is_empty() {
			&self.name
		} else {
			&self.github_username
		}
	}

	fn key(&self) -> (&str, &str) {
		(&self.name, &self.email)
	}
}

impl PartialEq for Contributor {
	fn eq(&self, other: &Self) -> bool {
		self.key() == other.key()
	}
}

impl Eq for Contributor {}

impl Hash for Contributor {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.key().hash(state)
	}
}

impl Display for Contributor {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "{} <{}>", self.name, self.email)
	}
}

/// Maps raw `(name, email)` pairs to canonical contributors.
///
/// Built once while the roster loads, then only read.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
	entries: HashMap<(String, String), Arc<Contributor>>,
}

impl IdentityRegistry {
	pub fn new() -> IdentityRegistry {
		IdentityRegistry::default()
	}

	/// Register a contributor under its primary name and email.
	///
	/// If the pair is already registered the existing entry is returned and
	/// `contributor` is discarded.
	pub fn register(&mut self, contributor: Contributor) -> Arc<Contributor> {
		let key = (contributor.name.clone(), contributor.email.clone());
		Arc::clone(
			self.entries
				.entry(key)
				.or_insert_with(|| Arc::new(contributor)),
		)
	}

	/// Register a contributor plus every combination of its alias names and
	/// emails. Keys that are already taken keep their current owner.
	pub fn register_with_aliases(&mut self, contributor: Contributor) -> Arc<Contributor> {
		let names = std::iter::once(contributor.name.clone())
			.chain(contributor.other_names.iter().cloned())
			.collect::<Vec<_>>();
		let emails = std::iter::once(contributor.email.clone())
			.chain(contributor.other_emails.iter().cloned())
			.collect::<Vec<_>>();

		let canonical = self.register(contributor);

		for name in &names {
			for email in &emails {
				self.entries
					.entry((name.clone(), email.clone()))
					.or_insert_with(|| Arc::clone(&canonical));
			}
		}

		log::debug!(
			"registered contributor [name='{}', aliases='{}']",
			canonical.name,
			names.len() * emails.len()
		);

		canonical
	}

	/// Find the contributor for a raw pair.
	///
	/// `context_kind` and `context_detail` describe where the pair was seen,
	/// for example `"commit"` and a short hash.
	pub fn lookup(
		&self,
		name: &str,
		email: &str,
		context_kind: &str,
		context_detail: &str,
	) -> Result<Arc<Contributor>> {
		self.entries
			.get(&(name.to_owned(), email.to_owned()))
			.cloned()
			.ok_or_else(|| Error::UnknownAuthor {
				name: name.to_owned(),
				email: email.to_owned(),
				context_kind: context_kind.to_owned(),
				context_detail: context_detail.to_owned(),
			})
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}
