// SPDX-License-Identifier: Apache-2.0

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::{borrow::Cow, sync::OnceLock};

/// Style shared by every attribution progress bar.
static STYLE: OnceLock<ProgressStyle> = OnceLock::new();

fn style() -> &'static ProgressStyle {
	STYLE.get_or_init(|| {
		ProgressStyle::with_template(
			"{msg:.bold.dim} {wide_bar} [{pos}/{len}] ({percent:>3.bold}%) {elapsed:.italic}",
		)
		.unwrap_or_else(|_| ProgressStyle::default_bar())
	})
}

/// A progress bar on stderr, or a hidden one when progress is turned off.
pub fn bar(show: bool, len: u64, message: impl Into<Cow<'static, str>>) -> ProgressBar {
	if !show {
		return ProgressBar::with_draw_target(Some(len), ProgressDrawTarget::hidden());
	}

	let bar = ProgressBar::new(len).with_style(style().clone());
	bar.set_message(message);
	bar
}
