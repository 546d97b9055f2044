// SPDX-License-Identifier: Apache-2.0

//! A persistent memo of external command output and finalized review
//! requests.
//!
//! History queries against a large repository are slow, and their answers
//! never change once they are keyed by a full commit hash. The cache keeps
//! them for the rest of the process and, through [`ProcessCache::flush`],
//! for later runs too. Review requests are only stored once they are no
//! longer open.
//!
//! Nothing here is allowed to fail a run: an unreadable cache loads as
//! empty, and a failed write leaves the previous file in place.

use crate::{
	error::{Error, Result},
	github::data::ReviewRequest,
};
use pathbuf::pathbuf;
use serde::{Deserialize, Serialize};
use std::{
	collections::{BTreeMap, HashMap},
	fs,
	io::Write as _,
	path::{Path, PathBuf},
	sync::{
		atomic::{AtomicBool, AtomicUsize, Ordering},
		Arc, Mutex, MutexGuard, PoisonError,
	},
};
use tempfile::NamedTempFile;

static CACHE_DIR_NAME: &str = "collabstat";
static CACHE_FILE_NAME: &str = "cache.json";

/// Bumped whenever the stored layout or the meaning of a key changes.
const CACHE_VERSION: u32 = 1;

/// How long a cached command result lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
	/// Kept for this process and written to disk.
	Persistent,
	/// Kept for this process only. Used for answers that can change between
	/// runs, like what `HEAD` points at.
	Session,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredCache {
	version: u32,
	#[serde(default)]
	commands: HashMap<String, String>,
	/// Finalized review requests, by repository identity then number.
	#[serde(default)]
	reviews: HashMap<String, BTreeMap<u64, ReviewRequest>>,
}

#[derive(Debug, Default)]
struct CacheState {
	stored: StoredCache,
	session: HashMap<String, String>,
}

impl CacheState {
	fn get(&self, key: &str, retention: Retention) -> Option<&String> {
		match retention {
			Retention::Persistent => self.stored.commands.get(key),
			Retention::Session => self.session.get(key),
		}
	}
}

#[derive(Debug)]
pub struct ProcessCache {
	dir: Option<PathBuf>,
	state: Mutex<CacheState>,
	in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
	dirty: AtomicBool,
	persistent_misses: AtomicUsize,
}

impl ProcessCache {
	/// A cache that is never read from or written to disk.
	pub fn in_memory() -> ProcessCache {
		ProcessCache::with_state(None, StoredCache::default())
	}

	/// Load the cache kept in `dir`, or start empty.
	pub fn load(dir: impl Into<PathBuf>) -> ProcessCache {
		let dir = dir.into();
		let path = pathbuf![&dir, CACHE_FILE_NAME];
		let stored = load_or_get_empty(&path);

		log::debug!(
			"loaded process cache [path='{}', commands='{}', repos='{}']",
			path.display(),
			stored.commands.len(),
			stored.reviews.len()
		);

		ProcessCache::with_state(Some(dir), stored)
	}

	/// Load the cache from `dir`, or from the platform cache directory when
	/// no directory is given.
	pub fn open(dir: Option<PathBuf>) -> ProcessCache {
		match dir.or_else(default_dir) {
			Some(dir) => ProcessCache::load(dir),
			None => {
				log::warn!("no cache directory available; results won't persist between runs");
				ProcessCache::in_memory()
			}
		}
	}

	fn with_state(dir: Option<PathBuf>, stored: StoredCache) -> ProcessCache {
		ProcessCache {
			dir,
			state: Mutex::new(CacheState {
				stored,
				session: HashMap::new(),
			}),
			in_flight: Mutex::new(HashMap::new()),
			dirty: AtomicBool::new(false),
			persistent_misses: AtomicUsize::new(0),
		}
	}

	pub fn dir(&self) -> Option<&Path> {
		self.dir.as_deref()
	}

	/// Return the cached output for `key`, running `run` to produce it on a
	/// miss.
	///
	/// At most one caller runs `run` for a given key; concurrent callers for
	/// the same key wait for that result instead of running it again. Errors
	/// are returned without being cached.
	pub fn get_or_run<F>(&self, key: &str, retention: Retention, run: F) -> Result<String>
	where
		F: FnOnce() -> Result<String>,
	{
		if let Some(hit) = self.lookup(key, retention) {
			log::trace!("process cache hit [key='{}']", key);
			return Ok(hit);
		}

		let key_lock = self.key_lock(key);
		let _running = lock(&key_lock);

		// Someone else may have finished while we waited for the key.
		if let Some(hit) = self.lookup(key, retention) {
			log::trace!("process cache hit after wait [key='{}']", key);
			return Ok(hit);
		}

		log::trace!("process cache miss [key='{}']", key);
		let result = run();

		if let Ok(output) = &result {
			let mut state = lock(&self.state);
			match retention {
				Retention::Persistent => {
					state.stored.commands.insert(key.to_owned(), output.clone());
					self.dirty.store(true, Ordering::SeqCst);
					self.persistent_misses.fetch_add(1, Ordering::SeqCst);
				}
				Retention::Session => {
					state.session.insert(key.to_owned(), output.clone());
				}
			}
		}

		lock(&self.in_flight).remove(key);
		result
	}

	fn lookup(&self, key: &str, retention: Retention) -> Option<String> {
		lock(&self.state).get(key, retention).cloned()
	}

	fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
		Arc::clone(lock(&self.in_flight).entry(key.to_owned()).or_default())
	}

	/// A finalized review request stored by an earlier fetch.
	pub fn closed_request(&self, repo_id: &str, number: u64) -> Option<ReviewRequest> {
		lock(&self.state)
			.stored
			.reviews
			.get(repo_id)
			.and_then(|requests| requests.get(&number))
			.cloned()
	}

	/// Store a review request. Open requests can still change and are not
	/// stored.
	pub fn store_request(&self, repo_id: &str, request: &ReviewRequest) {
		if request.is_open() {
			log::trace!("not caching open review request [number='{}']", request.number);
			return;
		}

		lock(&self.state)
			.stored
			.reviews
			.entry(repo_id.to_owned())
			.or_default()
			.insert(request.number, request.clone());
		self.dirty.store(true, Ordering::SeqCst);
	}

	/// How many persistent entries were computed rather than found.
	pub fn persistent_misses(&self) -> usize {
		self.persistent_misses.load(Ordering::SeqCst)
	}

	pub fn is_dirty(&self) -> bool {
		self.dirty.load(Ordering::SeqCst)
	}

	/// Write the cache to disk if anything changed since the last write.
	///
	/// Failures are logged and otherwise ignored.
	pub fn flush(&self) {
		if let Err(e) = self.try_flush() {
			log::warn!("failed to write process cache [error='{}']", e);
		}
	}

	fn try_flush(&self) -> Result<()> {
		let Some(dir) = &self.dir else {
			return Ok(());
		};

		let bytes = {
			let mut state = lock(&self.state);
			if !self.dirty.swap(false, Ordering::SeqCst) {
				return Ok(());
			}
			state.stored.version = CACHE_VERSION;
			match serde_json::to_vec(&state.stored) {
				Ok(bytes) => bytes,
				Err(e) => {
					self.dirty.store(true, Ordering::SeqCst);
					return Err(Error::io("failed to serialize process cache", e.into()));
				}
			}
		};

		let result = write_atomically(dir, &bytes);

		match &result {
			Ok(path) => log::debug!(
				"wrote process cache [path='{}', bytes='{}']",
				path.display(),
				bytes.len()
			),
			Err(_) => self.dirty.store(true, Ordering::SeqCst),
		}

		result.map(|_| ())
	}
}

fn write_atomically(dir: &Path, bytes: &[u8]) -> Result<PathBuf> {
	let path = pathbuf![dir, CACHE_FILE_NAME];

	fs::create_dir_all(dir).map_err(|e| {
		Error::io(format!("failed to create cache directory '{}'", dir.display()), e)
	})?;

	let mut file = NamedTempFile::new_in(dir)
		.map_err(|e| Error::io("failed to create temporary cache file", e))?;
	file.write_all(bytes)
		.map_err(|e| Error::io("failed to write temporary cache file", e))?;
	file.persist(&path).map_err(|e| {
		Error::io(format!("failed to replace '{}'", path.display()), e.error)
	})?;

	Ok(path)
}

fn try_load(path: &Path) -> Result<StoredCache> {
	let data = fs::read_to_string(path)
		.map_err(|e| Error::io(format!("failed to read '{}'", path.display()), e))?;
	let stored: StoredCache = serde_json::from_str(&data)
		.map_err(|e| Error::io(format!("failed to parse '{}'", path.display()), e.into()))?;
	Ok(stored)
}

fn load_or_get_empty(path: &Path) -> StoredCache {
	if !path.exists() {
		return StoredCache::default();
	}

	match try_load(path) {
		Ok(stored) if stored.version == CACHE_VERSION => stored,
		Ok(stored) => {
			log::warn!(
				"ignoring process cache from another version [path='{}', version='{}']",
				path.display(),
				stored.version
			);
			StoredCache::default()
		}
		Err(e) => {
			log::warn!("ignoring unreadable process cache [error='{}']", e);
			StoredCache::default()
		}
	}
}

/// The platform's conventional cache location for this tool.
pub fn default_dir() -> Option<PathBuf> {
	dirs::cache_dir().map(|dir| pathbuf![&dir, CACHE_DIR_NAME])
}

/// Delete the cache directory. Returns whether there was anything to delete.
pub fn clear(dir: &Path) -> Result<bool> {
	if !dir.exists() {
		return Ok(false);
	}

	fs::remove_dir_all(dir)
		.map_err(|e| Error::io(format!("failed to remove '{}'", dir.display()), e))?;
	Ok(true)
}

/// Flushes the cache when dropped, so every way out of a scope writes it.
pub struct FlushGuard {
	cache: Arc<ProcessCache>,
}

impl FlushGuard {
	pub fn new(cache: Arc<ProcessCache>) -> FlushGuard {
		FlushGuard { cache }
	}
}

impl Drop for FlushGuard {
	fn drop(&mut self) {
		self.cache.flush();
	}
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::github::data::{RequestState, ReviewRequest};
	use std::{sync::Barrier, thread};

	fn request(number: u64, state: RequestState) -> ReviewRequest {
		ReviewRequest {
			number,
			author: "alice".to_owned(),
			state,
			..ReviewRequest::default()
		}
	}

	#[test]
	fn runs_once_per_key() {
		let cache = ProcessCache::in_memory();
		let calls = AtomicUsize::new(0);

		for _ in 0..3 {
			let out = cache
				.get_or_run("k", Retention::Persistent, || {
					calls.fetch_add(1, Ordering::SeqCst);
					Ok("value".to_owned())
				})
				.unwrap();
			assert_eq!(out, "value");
		}

		assert_eq!(calls.load(Ordering::SeqCst), 1);
		assert_eq!(cache.persistent_misses(), 1);
	}

	#[test]
	fn errors_are_not_cached() {
		let cache = ProcessCache::in_memory();
		let first = cache.get_or_run("k", Retention::Persistent, || {
			Err(Error::Config("boom".to_owned()))
		});
		assert!(first.is_err());
		assert!(!cache.is_dirty());

		let second = cache
			.get_or_run("k", Retention::Persistent, || Ok("ok".to_owned()))
			.unwrap();
		assert_eq!(second, "ok");
	}

	#[test]
	fn concurrent_callers_share_one_run() {
		let cache = ProcessCache::in_memory();
		let calls = AtomicUsize::new(0);
		let barrier = Barrier::new(8);

		thread::scope(|s| {
			for _ in 0..8 {
				s.spawn(|| {
					barrier.wait();
					cache
						.get_or_run("shared", Retention::Persistent, || {
							calls.fetch_add(1, Ordering::SeqCst);
							thread::sleep(std::time::Duration::from_millis(20));
							Ok("v".to_owned())
						})
						.unwrap()
				});
			}
		});

		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn session_entries_are_not_persisted() {
		let dir = tempfile::tempdir().unwrap();

		let cache = ProcessCache::load(dir.path());
		cache
			.get_or_run("rev-parse:HEAD", Retention::Session, || Ok("abc".to_owned()))
			.unwrap();
		assert!(!cache.is_dirty());
		cache
			.get_or_run("commit:abc", Retention::Persistent, || Ok("body".to_owned()))
			.unwrap();
		cache.flush();

		let reloaded = ProcessCache::load(dir.path());
		let hit = reloaded
			.get_or_run("commit:abc", Retention::Persistent, || {
				panic!("should have been cached")
			})
			.unwrap();
		assert_eq!(hit, "body");
		assert_eq!(reloaded.persistent_misses(), 0);
		assert!(reloaded.lookup("rev-parse:HEAD", Retention::Session).is_none());
	}

	#[test]
	fn only_finalized_requests_are_stored() {
		let dir = tempfile::tempdir().unwrap();
		let cache = ProcessCache::load(dir.path());

		cache.store_request("org/repo", &request(1, RequestState::Open));
		assert!(!cache.is_dirty());
		cache.store_request("org/repo", &request(2, RequestState::Merged));
		cache.store_request("org/repo", &request(3, RequestState::Closed));
		cache.flush();

		let reloaded = ProcessCache::load(dir.path());
		assert!(reloaded.closed_request("org/repo", 1).is_none());
		assert_eq!(reloaded.closed_request("org/repo", 2).unwrap().state, RequestState::Merged);
		assert!(reloaded.closed_request("org/repo", 3).is_some());
		assert!(reloaded.closed_request("other/repo", 2).is_none());
	}

	#[test]
	fn corrupt_cache_loads_empty() {
		let dir = tempfile::tempdir().unwrap();
		fs::write(dir.path().join(CACHE_FILE_NAME), b"{ not json").unwrap();

		let cache = ProcessCache::load(dir.path());
		assert!(cache.lookup("anything", Retention::Persistent).is_none());

		cache
			.get_or_run("k", Retention::Persistent, || Ok("v".to_owned()))
			.unwrap();
		cache.flush();
		assert!(!cache.is_dirty());
		assert!(ProcessCache::load(dir.path())
			.lookup("k", Retention::Persistent)
			.is_some());
	}

	#[test]
	fn clean_cache_does_not_write() {
		let dir = tempfile::tempdir().unwrap();
		let cache = ProcessCache::load(dir.path());
		cache.flush();
		assert!(!dir.path().join(CACHE_FILE_NAME).exists());
	}

	#[test]
	fn guard_flushes_on_drop() {
		let dir = tempfile::tempdir().unwrap();
		let cache = Arc::new(ProcessCache::load(dir.path()));
		{
			let _guard = FlushGuard::new(Arc::clone(&cache));
			cache
				.get_or_run("k", Retention::Persistent, || Ok("v".to_owned()))
				.unwrap();
		}
		assert!(dir.path().join(CACHE_FILE_NAME).exists());
		assert!(!cache.is_dirty());
	}

	#[test]
	fn clear_removes_the_directory() {
		let parent = tempfile::tempdir().unwrap();
		let dir = parent.path().join("collabstat");
		let cache = ProcessCache::load(&dir);
		cache
			.get_or_run("k", Retention::Persistent, || Ok("v".to_owned()))
			.unwrap();
		cache.flush();

		assert!(clear(&dir).unwrap());
		assert!(!dir.exists());
		assert!(!clear(&dir).unwrap());
	}
}
