// SPDX-License-Identifier: Apache-2.0

//! Writing the process cache when the tool is told to stop.

use crate::{
	cache::ProcessCache,
	error::{Error, Result},
};
use std::{process, sync::Arc, thread};

/// Exit status used when a termination signal ends the run.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Watch for interrupt, terminate, and hangup signals on a background
/// thread. When one arrives the cache is flushed and the process exits.
pub fn flush_on_termination(cache: Arc<ProcessCache>) -> Result<()> {
	let runtime = tokio::runtime::Builder::new_current_thread()
		.enable_all()
		.build()
		.map_err(|e| Error::io("failed to start signal watcher", e))?;

	thread::Builder::new()
		.name("signal-watcher".to_owned())
		.spawn(move || {
			runtime.block_on(async {
				let signal = termination().await;
				log::info!("received termination signal [signal='{}']", signal);
				cache.flush();
				process::exit(INTERRUPTED_EXIT_CODE);
			})
		})
		.map_err(|e| Error::io("failed to start signal watcher", e))?;

	Ok(())
}

#[cfg(unix)]
async fn termination() -> &'static str {
	use tokio::signal::unix::{signal, SignalKind};

	let (Ok(mut terminate), Ok(mut hangup)) =
		(signal(SignalKind::terminate()), signal(SignalKind::hangup()))
	else {
		log::warn!("can't listen for SIGTERM/SIGHUP; only Ctrl-C will flush the cache");
		return interrupt().await;
	};

	tokio::select! {
		name = interrupt() => name,
		_ = terminate.recv() => "SIGTERM",
		_ = hangup.recv() => "SIGHUP",
	}
}

#[cfg(not(unix))]
async fn termination() -> &'static str {
	interrupt().await
}

async fn interrupt() -> &'static str {
	if let Err(e) = tokio::signal::ctrl_c().await {
		log::warn!("can't listen for Ctrl-C [error='{}']", e);
		std::future::pending::<()>().await;
	}
	"SIGINT"
}
