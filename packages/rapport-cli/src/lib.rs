use clap::builder::{
	Styles,
	styling::{AnsiColor, Effects},
};

/// Package version, git commit and target triple, stamped at build time.
pub const VERSION: &str = concat!(
	env!("CARGO_PKG_VERSION"),
	"-",
	env!("VERGEN_GIT_SHA"),
	"-",
	env!("VERGEN_CARGO_TARGET_TRIPLE"),
);

pub const WORKER_ABOUT: &str =
	"Runs the Rapport background jobs: memory consolidation, proactivity detection and delivery.";

pub fn styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Yellow.on_default() | Effects::BOLD)
		.usage(AnsiColor::Yellow.on_default() | Effects::BOLD)
		.literal(AnsiColor::Cyan.on_default() | Effects::BOLD)
		.placeholder(AnsiColor::Green.on_default())
		.error(AnsiColor::Red.on_default() | Effects::BOLD)
		.valid(AnsiColor::Green.on_default() | Effects::BOLD)
		.invalid(AnsiColor::Yellow.on_default())
}
