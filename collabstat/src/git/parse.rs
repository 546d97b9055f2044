// SPDX-License-Identifier: Apache-2.0

//! Parsers for the text git prints.

use crate::git::data::{RawCommit, Trailer};
use nom::{
	character::complete::one_of,
	combinator::recognize,
	multi::count,
	IResult,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

const HEX_CHARS: &str = "0123456789abcdef";
const GIT_HASH_LEN: usize = 40;

/// Trailer forms, most precise first.
static CO_AUTHOR_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
	[
		// Co-authored-by: Name <email>
		r"(?i)^Co-authored-by:\s*(.+?)\s*<([^>]+)>\s*$",
		// Co-authored-by: Name email
		r"(?i)^Co-authored-by:\s*(.+?)\s+(\S+@\S+)\s*$",
		// co-authored Name email, co-authored-by Name email, ...
		r"(?i)^co-authored(?:-by)?[:\s]+(.+?)\s+(\S+@\S+)\s*$",
	]
	.iter()
	.filter_map(|pattern| match Regex::new(pattern) {
		Ok(regex) => Some(regex),
		Err(e) => {
			log::error!("invalid co-author pattern [pattern='{}', error='{}']", pattern, e);
			None
		}
	})
	.collect()
});

fn hex_char(input: &str) -> IResult<&str, char> {
	one_of(HEX_CHARS)(input)
}

/// A full, lowercase commit hash at the start of the input.
fn full_hash(input: &str) -> IResult<&str, &str> {
	recognize(count(hex_char, GIT_HASH_LEN))(input)
}

/// The hash a line starts with, if it starts with one.
fn leading_hash(line: &str) -> Option<&str> {
	full_hash(line).ok().map(|(_, hash)| hash)
}

/// Parse `git show -s --format=%aN%n%aE%n%as%n%B` output.
pub fn show(input: &str) -> Option<RawCommit> {
	let mut lines = input.lines();

	let author_name = lines.next()?.to_owned();
	let author_email = lines.next()?.to_owned();
	let date = lines.next()?.trim().to_owned();

	let mut message_lines = lines.map(str::to_owned).collect::<Vec<_>>();
	while message_lines.last().is_some_and(|l| l.trim().is_empty()) {
		message_lines.pop();
	}

	Some(RawCommit {
		author_name,
		author_email,
		date,
		message_lines,
	})
}

/// Parse `git blame --porcelain` output into `(hash, content)` pairs.
///
/// A header line starts with a full hash; content lines start with a tab
/// and belong to the most recent header. Everything else is metadata.
pub fn blame_porcelain(input: &str) -> Vec<(String, String)> {
	let mut current: Option<&str> = None;
	let mut lines = Vec::new();

	for line in input.lines() {
		if let Some(hash) = leading_hash(line) {
			current = Some(hash);
		} else if let Some(content) = line.strip_prefix('\t') {
			match current {
				Some(hash) => lines.push((hash.to_owned(), content.to_owned())),
				None => log::warn!("blame content before any header [line='{}']", content),
			}
		}
	}

	lines
}

/// Parse `git log --pretty=format:%H --name-only` output.
pub fn log_name_only(input: &str) -> Vec<(String, Vec<String>)> {
	let mut commits: Vec<(String, Vec<String>)> = Vec::new();

	for line in input.lines() {
		if line.len() == GIT_HASH_LEN && leading_hash(line).is_some() {
			commits.push((line.to_owned(), Vec::new()));
		} else if !line.is_empty() {
			match commits.last_mut() {
				Some((_, paths)) => paths.push(line.to_owned()),
				None => log::warn!("path before any commit in log [path='{}']", line),
			}
		}
	}

	commits
}

/// `git ls-tree -r --name-only` output as a list of paths.
pub fn tree_paths(input: &str) -> Vec<String> {
	input
		.lines()
		.filter(|l| !l.is_empty())
		.map(str::to_owned)
		.collect()
}

/// Files in a unified diff with at least one added or removed line that
/// isn't blank.
pub fn non_whitespace_files(diff: &str) -> HashSet<String> {
	let mut files = HashSet::new();
	let mut current: Option<String> = None;

	for line in diff.lines() {
		if line.starts_with("diff --git ") {
			current = file_name_from_header(line);
			continue;
		}

		if line.starts_with("+++") || line.starts_with("---") {
			continue;
		}

		let Some(changed) = line.strip_prefix('+').or_else(|| line.strip_prefix('-')) else {
			continue;
		};

		if changed.trim().is_empty() {
			continue;
		}

		if let Some(file) = &current {
			files.insert(file.clone());
		}
	}

	files
}

fn file_name_from_header(header: &str) -> Option<String> {
	// Example: diff --git a/README.md b/README.md
	let name = header.split_whitespace().nth(3)?;
	Some(name.strip_prefix("b/").unwrap_or(name).to_owned())
}

/// Co-author trailers found in a commit message.
pub fn co_author_trailers<S: AsRef<str>>(message_lines: &[S]) -> Vec<Trailer> {
	message_lines
		.iter()
		.filter_map(|line| co_author_trailer(line.as_ref().trim()))
		.collect()
}

fn co_author_trailer(line: &str) -> Option<Trailer> {
	CO_AUTHOR_PATTERNS.iter().find_map(|pattern| {
		let captures = pattern.captures(line)?;
		let name = captures.get(1)?.as_str().trim().to_owned();
		let email = captures
			.get(2)?
			.as_str()
			.trim()
			.trim_matches(|c| c == '<' || c == '>')
			.to_owned();
		Some(Trailer { name, email })
	})
}

/// A stable identity for a repository from its `origin` URL.
///
/// `git@github.com:org/repo.git` and `https://github.com/org/repo` both
/// become `org/repo`.
pub fn repo_id_from_remote(url: &str) -> Option<String> {
	let url = url.trim();
	if url.is_empty() {
		return None;
	}

	let path = match url.split_once("://") {
		Some((_, rest)) => {
			let segments = rest
				.split('/')
				.skip(1)
				.filter(|s| !s.is_empty())
				.collect::<Vec<_>>();
			match segments.as_slice() {
				[] => return None,
				[only] => (*only).to_owned(),
				[.., owner, name] => format!("{}/{}", owner, name),
			}
		}
		None => match url.split_once(':') {
			Some((_, path)) => path.trim_matches('/').to_owned(),
			None => return None,
		},
	};

	let id = path.strip_suffix(".git").unwrap_or(&path).to_owned();
	(!id.is_empty()).then_some(id)
}
