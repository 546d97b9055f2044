// SPDX-License-Identifier: Apache-2.0

//! Attribute the work in a git repository to a roster of contributors.
//!
//! Lines at `HEAD`, commits in history, and (optionally) pull requests are
//! each credited to the roster, split into work done alone and work done
//! with at least one co-author.

pub mod attribution;
pub mod cache;
pub mod cli;
pub mod command;
pub mod error;
pub mod git;
pub mod github;
pub mod identity;
pub mod init;
pub mod report;
pub mod roster;
pub mod shutdown;

use crate::{
	attribution::{Attribution, Engine},
	cache::{FlushGuard, ProcessCache},
	cli::CliConfig,
	error::Result,
	git::{Commit, GitRepo, History},
	github::{GitHubReviews, Reviews},
	identity::IdentityRegistry,
	report::Report,
	roster::Roster,
};
use std::{
	collections::BTreeSet,
	io::{self, IsTerminal as _},
	path::{Path, PathBuf},
	sync::Arc,
};

/// Everything one run found about a repository.
#[derive(Debug)]
pub struct Analysis {
	pub roster: Roster,
	pub result: Attribution,
	/// Every commit owning a counted line.
	pub commits: Vec<Arc<Commit>>,
}

impl Analysis {
	pub fn report(&self) -> Report<'_> {
		Report::new(&self.roster, &self.result, self.commits.clone())
	}
}

/// Run whatever the command line asked for.
pub fn run(config: &CliConfig) -> Result<()> {
	if config.clear_cache {
		return clear_cache(config.cache_dir.clone());
	}

	if config.init {
		let created = init::init_repo(&config.repo)?;
		println!("{}", init::next_steps(&created));
		return Ok(());
	}

	let cache = Arc::new(ProcessCache::open(config.cache_dir.clone()));
	shutdown::flush_on_termination(Arc::clone(&cache))?;
	let _guard = FlushGuard::new(Arc::clone(&cache));

	let show_progress = !config.no_progress && io::stderr().is_terminal();
	let analysis = analyze(&config.repo, &cache, config.use_github(), show_progress)?;

	println!("{}", analysis.report());

	Ok(())
}

/// Run every attribution pass over the repository at `path`.
pub fn analyze(
	path: &Path,
	cache: &ProcessCache,
	use_github: bool,
	show_progress: bool,
) -> Result<Analysis> {
	let repo_path = git::verify_repository(path)?;

	let mut registry = IdentityRegistry::new();
	let roster = Roster::discover(&repo_path, &mut registry)?;
	let repo = GitRepo::new(repo_path, cache, &registry);

	let requests = if use_github {
		let reviews = GitHubReviews::new(&repo, cache, repo.path().to_owned(), repo.repo_id());
		Some(reviews.list_requests()?)
	} else {
		None
	};

	let result = Engine::new(&repo, &roster)
		.show_progress(show_progress)
		.run(requests.as_deref())?;

	let commits = result
		.file_commits
		.values()
		.flatten()
		.collect::<BTreeSet<_>>()
		.into_iter()
		.map(|hash| repo.resolve_commit(hash))
		.collect::<Result<Vec<_>>>()?;

	Ok(Analysis {
		roster,
		result,
		commits,
	})
}

fn clear_cache(dir: Option<PathBuf>) -> Result<()> {
	let Some(dir) = dir.or_else(cache::default_dir) else {
		println!("No cache directory on this platform");
		return Ok(());
	};

	if cache::clear(&dir)? {
		println!("Cache cleared: {}", dir.display());
	} else {
		println!("Cache directory does not exist: {}", dir.display());
	}

	Ok(())
}
