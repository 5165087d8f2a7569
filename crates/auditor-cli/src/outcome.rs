// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Exit-code mapping for the CLI (spec.md §6 "Exit codes").
//!
//! Every subcommand returns a `CliOutcome` rather than calling
//! `std::process::exit` itself; `main` is the single place that maps it to
//! a process exit code.

/// What a subcommand accomplished, independent of how it reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliOutcome {
    /// Nothing failed and no safety blocker was hit (includes partial
    /// success with zero failed actions).
    Success,
    /// At least one action failed, or a safety blocker rejected the run.
    FailedOrBlocked,
    /// Configuration could not be loaded, or ingestion failed outright.
    ConfigOrIngestError,
}

impl CliOutcome {
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::FailedOrBlocked => 1,
            Self::ConfigOrIngestError => 2,
        }
    }
}
