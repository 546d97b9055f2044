// SPDX-License-Identifier: Apache-2.0

//! Loading the roster document and the file filters it carries.

use crate::{
	error::{Error, Result},
	identity::{Contributor, IdentityRegistry},
};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::{
	collections::{HashMap, HashSet},
	fmt::{self, Display, Formatter},
	fs,
	path::{Path, PathBuf},
	sync::Arc,
};

/// The `id` a JSON document must carry to be recognized as the roster.
pub const ROSTER_ID: &str = "619a9605-0e2b-45ee-ac51-a539c59d70bb";

/// The tracked contributors, the ignored ones, and the files that count.
#[derive(Debug)]
pub struct Roster {
	students: Vec<Arc<Contributor>>,
	ignored: HashSet<Arc<Contributor>>,
	by_handle: HashMap<String, Arc<Contributor>>,
	filter: FileFilter,
}

impl Roster {
	/// Find the roster document in the root of `repo` and load it.
	pub fn discover(repo: &Path, registry: &mut IdentityRegistry) -> Result<Roster> {
		let (path, document) = find_document(repo)?;
		log::info!("loading roster [path='{}']", path.display());
		Roster::from_document(&document, registry)
	}

	/// Validate a parsed roster document, registering every entry.
	pub fn from_document(document: &Value, registry: &mut IdentityRegistry) -> Result<Roster> {
		let students = match document.get("students") {
			None => return Err(config("Config missing 'students' field")),
			Some(Value::Array(entries)) => entries,
			Some(_) => return Err(config("'students' must be a list")),
		};

		let students = students
			.iter()
			.enumerate()
			.map(|(i, entry)| student(i, entry).map(|s| registry.register_with_aliases(s)))
			.collect::<Result<Vec<_>>>()?;

		let ignored = match document.get("ignore") {
			None => return Err(config("Config missing 'ignore' field")),
			Some(Value::Array(entries)) => entries,
			Some(_) => return Err(config("'ignore' must be a list")),
		};

		let ignored = ignored
			.iter()
			.enumerate()
			.map(|(i, entry)| ignored_entry(i, entry).map(|c| registry.register_with_aliases(c)))
			.collect::<Result<HashSet<_>>>()?;

		let filter = match document.get("files") {
			None => FileFilter::new::<&str>(&[], &[])?,
			Some(Value::Object(files)) => {
				let include = pattern_list(files, "include")?;
				let exclude = pattern_list(files, "exclude")?;
				FileFilter::new(&include, &exclude)?
			}
			Some(_) => return Err(config("'files' must be an object")),
		};

		let by_handle = students
			.iter()
			.filter(|s| !s.github_username.is_empty())
			.map(|s| (s.github_username.to_lowercase(), Arc::clone(s)))
			.collect();

		log::debug!(
			"loaded roster [students='{}', ignored='{}']",
			students.len(),
			ignored.len()
		);

		Ok(Roster {
			students,
			ignored,
			by_handle,
			filter,
		})
	}

	/// Tracked contributors, in document order.
	pub fn students(&self) -> &[Arc<Contributor>] {
		&self.students
	}

	pub fn is_ignored(&self, contributor: &Contributor) -> bool {
		self.ignored.contains(contributor)
	}

	pub fn is_student(&self, contributor: &Contributor) -> bool {
		self.students.iter().any(|s| **s == *contributor)
	}

	/// Find a student by their review-service handle, ignoring case.
	pub fn student_by_handle(&self, handle: &str) -> Option<&Arc<Contributor>> {
		self.by_handle.get(&handle.to_lowercase())
	}

	pub fn filter(&self) -> &FileFilter {
		&self.filter
	}
}

/// Locate the roster document by its `id` rather than its name.
///
/// Every `*.json` file in the repository root is a candidate, hidden ones
/// included. Files that don't parse are skipped.
pub fn find_document(repo: &Path) -> Result<(PathBuf, Value)> {
	let entries = fs::read_dir(repo)
		.map_err(|e| Error::io(format!("failed to list '{}'", repo.display()), e))?;

	let mut candidates = entries
		.filter_map(|entry| entry.ok())
		.map(|entry| entry.path())
		.filter(|path| path.is_file())
		.filter(|path| {
			path.file_name()
				.and_then(|name| name.to_str())
				.is_some_and(|name| name.ends_with(".json"))
		})
		.collect::<Vec<_>>();
	candidates.sort();

	for path in candidates {
		let Ok(text) = fs::read_to_string(&path) else {
			log::debug!("skipping unreadable roster candidate [path='{}']", path.display());
			continue;
		};
		let Ok(document) = serde_json::from_str::<Value>(&text) else {
			log::debug!("skipping invalid JSON roster candidate [path='{}']", path.display());
			continue;
		};
		if document.get("id").and_then(Value::as_str) == Some(ROSTER_ID) {
			return Ok((path, document));
		}
	}

	Err(config(format!(
		"no roster found in '{}'; expected a JSON file with \"id\": \"{}\"",
		repo.display(),
		ROSTER_ID
	)))
}

#[derive(Debug, Deserialize)]
struct Aliases {
	#[serde(default)]
	github_username: Option<String>,
	#[serde(default)]
	other_names: Option<Vec<String>>,
	#[serde(default)]
	other_emails: Option<Vec<String>>,
	#[serde(default)]
	allow_auto_update: Option<bool>,
}

fn student(index: usize, entry: &Value) -> Result<Contributor> {
	let fields = entry
		.as_object()
		.ok_or_else(|| config(format!("Student entry {} must be an object", index)))?;

	let id = match fields.get("id") {
		Some(Value::String(id)) if !id.is_empty() => id.clone(),
		Some(Value::Number(id)) => id.to_string(),
		_ => return Err(config(format!("Student entry {} missing 'id'", index))),
	};

	let name = required_str(fields, "name", || format!("Student entry {}", index))?;
	let email = required_str(fields, "email", || format!("Student entry {}", index))?;
	let github_username =
		required_str(fields, "github_username", || format!("Student entry {}", index))?;

	let aliases = aliases(entry, || format!("Student entry {}", index))?;

	Ok(Contributor {
		name,
		email,
		id,
		github_username,
		other_names: aliases.other_names.unwrap_or_default(),
		other_emails: aliases.other_emails.unwrap_or_default(),
		allow_auto_update: aliases.allow_auto_update.unwrap_or(true),
	})
}

fn ignored_entry(index: usize, entry: &Value) -> Result<Contributor> {
	let fields = entry
		.as_object()
		.ok_or_else(|| config(format!("Ignore entry {} must be an object", index)))?;

	let name = required_str(fields, "name", || format!("Ignore entry {}", index))?;

	let email = match fields.get("email") {
		Some(Value::String(email)) => email.clone(),
		Some(Value::Null) => String::new(),
		Some(_) => return Err(config(format!("Ignore entry {} 'email' must be a string", index))),
		None => return Err(config(format!("Ignore entry {} missing 'email'", index))),
	};

	let aliases = aliases(entry, || format!("Ignore entry {}", index))?;

	Ok(Contributor {
		name,
		email,
		id: String::new(),
		github_username: aliases.github_username.unwrap_or_default(),
		other_names: aliases.other_names.unwrap_or_default(),
		other_emails: aliases.other_emails.unwrap_or_default(),
		allow_auto_update: aliases.allow_auto_update.unwrap_or(true),
	})
}

fn required_str<F>(fields: &Map<String, Value>, field: &str, entry: F) -> Result<String>
where
	F: Fn() -> String,
{
	match fields.get(field) {
		Some(Value::String(value)) if !value.is_empty() => Ok(value.clone()),
		Some(Value::String(_)) | Some(Value::Null) | None => {
			Err(config(format!("{} missing '{}'", entry(), field)))
		}
		Some(_) => Err(config(format!("{} '{}' must be a string", entry(), field))),
	}
}

fn aliases<F>(entry: &Value, describe: F) -> Result<Aliases>
where
	F: Fn() -> String,
{
	Aliases::deserialize(entry).map_err(|e| config(format!("{} is malformed: {}", describe(), e)))
}

fn pattern_list(files: &Map<String, Value>, field: &str) -> Result<Vec<String>> {
	match files.get(field) {
		None => Ok(Vec::new()),
		Some(Value::Array(patterns)) => Ok(patterns
			.iter()
			.map(|p| match p {
				Value::String(s) => s.clone(),
				other => other.to_string(),
			})
			.collect()),
		Some(_) => Err(config(format!("'files.{}' must be a list", field))),
	}
}

fn config(message: impl Into<String>) -> Error {
	Error::Config(message.into())
}

/// Include and exclude patterns over repository paths.
///
/// A path matching an exclude pattern is never selected, whatever the
/// include patterns say.
#[derive(Debug, Clone)]
pub struct FileFilter {
	include: Vec<FilePattern>,
	exclude: Vec<FilePattern>,
}

impl FileFilter {
	/// Build a filter. No include patterns means every path is included.
	pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Result<FileFilter> {
		let include = if include.is_empty() {
			vec![FilePattern::new("*")?]
		} else {
			include
				.iter()
				.map(|p| FilePattern::new(p.as_ref()))
				.collect::<Result<_>>()?
		};
		let exclude = exclude
			.iter()
			.map(|p| FilePattern::new(p.as_ref()))
			.collect::<Result<_>>()?;

		Ok(FileFilter { include, exclude })
	}

	pub fn include(&self) -> &[FilePattern] {
		&self.include
	}

	pub fn exclude(&self) -> &[FilePattern] {
		&self.exclude
	}

	pub fn is_included(&self, path: &str) -> bool {
		self.include.iter().any(|p| p.matches(path))
	}

	pub fn is_excluded(&self, path: &str) -> bool {
		self.exclude.iter().any(|p| p.matches(path))
	}

	/// Whether `path` counts toward attribution.
	pub fn selects(&self, path: &str) -> bool {
		self.is_included(path) && !self.is_excluded(path)
	}
}

/// A shell-style pattern with `fnmatch` rules.
///
/// `*` matches any run of characters, `/` included, so `*.py` matches
/// `src/app.py` and `src/**/*.py` needs at least two slashes. `?` matches
/// one character. `[seq]` and `[!seq]` match one character in or out of
/// `seq`. A `[` with no closing `]` is a literal. Matching is case-sensitive.
#[derive(Debug, Clone)]
pub struct FilePattern {
	source: String,
	regex: Regex,
}

impl FilePattern {
	pub fn new(pattern: &str) -> Result<FilePattern> {
		let regex = Regex::new(&translate(pattern))
			.map_err(|e| config(format!("invalid file pattern '{}': {}", pattern, e)))?;

		Ok(FilePattern {
			source: pattern.to_owned(),
			regex,
		})
	}

	pub fn as_str(&self) -> &str {
		&self.source
	}

	pub fn matches(&self, path: &str) -> bool {
		self.regex.is_match(path)
	}
}

impl Display for FilePattern {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.source)
	}
}

/// Turn a shell pattern into an anchored regular expression.
fn translate(pattern: &str) -> String {
	let chars = pattern.chars().collect::<Vec<_>>();
	let mut out = String::from("^(?s:");
	let mut i = 0;

	while i < chars.len() {
		let c = chars[i];
		i += 1;

		match c {
			'*' => {
				while chars.get(i) == Some(&'*') {
					i += 1;
				}
				out.push_str(".*");
			}
			'?' => out.push('.'),
			'[' => match class_end(&chars, i) {
				Some(end) => {
					out.push_str(&class(&chars[i..end]));
					i = end + 1;
				}
				None => out.push_str("\\["),
			},
			other => out.push_str(&escape_char(other)),
		}
	}

	out.push_str(")$");
	out
}

/// Index of the `]` closing a class whose body starts at `start`.
///
/// A `]` right after the `[` or `[!` is part of the body.
fn class_end(chars: &[char], start: usize) -> Option<usize> {
	let mut j = start;
	if chars.get(j) == Some(&'!') {
		j += 1;
	}
	if chars.get(j) == Some(&']') {
		j += 1;
	}
	chars[j.min(chars.len())..]
		.iter()
		.position(|&c| c == ']')
		.map(|offset| j + offset)
}

/// A bracket class. Reversed ranges like `z-a` match nothing.
fn class(body: &[char]) -> String {
	let (negated, body) = match body.split_first() {
		Some(('!', rest)) => (true, rest),
		_ => (false, body),
	};

	let mut items = String::new();
	let mut k = 0;
	while k < body.len() {
		if body.get(k + 1) == Some(&'-') && k + 2 < body.len() {
			let (lo, hi) = (body[k], body[k + 2]);
			if lo <= hi {
				items.push_str(&escape_char(lo));
				items.push('-');
				items.push_str(&escape_char(hi));
			}
			k += 3;
		} else {
			items.push_str(&escape_char(body[k]));
			k += 1;
		}
	}

	match (items.is_empty(), negated) {
		(true, false) => "[^\\s\\S]".to_owned(),
		(true, true) => ".".to_owned(),
		(false, false) => format!("[{}]", items),
		(false, true) => format!("[^{}]", items),
	}
}

fn escape_char(c: char) -> String {
	regex::escape(c.encode_utf8(&mut [0; 4]))
}
