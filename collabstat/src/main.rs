// SPDX-License-Identifier: Apache-2.0

use clap::Parser as _;
use collabstat::{cli::CliConfig, error::Error};
use env_logger::{Builder, Env};
use std::{error::Error as StdError, process::exit};

/// Entry point for collabstat.
///
/// Sets up logging and makes sure error codes are output correctly.
fn main() {
	init_log();
	exit(go().exit_code())
}

/// The environment variable for configuring logging output.
static LOG_NAME: &str = "COLLABSTAT_LOG";

/// The environment variable for configuring logging style.
static LOG_STYLE: &str = "COLLABSTAT_LOG_STYLE";

/// Initialize the logger.
fn init_log() {
	let env = Env::new().filter(LOG_NAME).write_style(LOG_STYLE);
	Builder::from_env(env).init();
}

fn go() -> Outcome {
	let config = CliConfig::parse();

	match collabstat::run(&config) {
		Ok(()) => Outcome::Ok,
		Err(e) => {
			print_error(&e);
			Outcome::Err
		}
	}
}

/// Print an error and each of its causes to stderr.
fn print_error(error: &Error) {
	log::debug!("run failed [kind='{:?}']", error.kind());

	eprintln!("Error: {}", error);

	let mut source = error.source();
	while let Some(cause) = source {
		eprintln!("  caused by: {}", cause);
		source = cause.source();
	}
}

/// How a run ended.
#[derive(Debug, Clone, Copy)]
enum Outcome {
	Ok,
	Err,
}

impl Outcome {
	fn exit_code(self) -> i32 {
		match self {
			Outcome::Ok => 0,
			Outcome::Err => 1,
		}
	}
}
