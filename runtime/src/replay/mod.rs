//! Record/replay harness for portal traffic.
//!
//! A [`Replayer`] answers intercepted browser requests from a recorded
//! [`ReplayLog`], which makes bot-defended login flows deterministic in tests.

pub mod engine;
pub mod log;
pub mod sanitize;

pub use engine::{coarse_key, MatchKind, ReplayOutcome, ReplayStats, Replayer, MAX_REDIRECTS};
pub use log::{
    load_replay_log, parse_replay_log, save_replay_log, Header, RecordedContent, RecordedRequest,
    RecordedResponse, ReplayEntry, ReplayLog,
};
pub use sanitize::{count_redactions, sanitize_log, sanitize_markup, MarkupReport, REDACTED};
