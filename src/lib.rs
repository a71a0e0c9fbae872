//! sonar-match: find where a short reference clip occurs inside a longer recording.
//!
//! Both inputs are decoded to mono (WAV fast path, symphonia otherwise), decimated to a low
//! matching rate, normalized to unit peak and compared with a normalized cross-correlation
//! computed with a single packed FFT. Peaks of the NCC curve become matches.
//!
//! ```no_run
//! let pattern = std::fs::read("jingle.wav").unwrap();
//! let search = std::fs::read("broadcast.mp3").unwrap();
//! for m in sonar_match::find_matches(&pattern, &search, 2000, 0.7, None).unwrap() {
//!     println!("{:.2}s..{:.2}s sim={:.2}", m.start_s, m.end_s, m.similarity);
//! }
//! ```

pub mod error;
pub mod logger;
pub mod mods;

pub use error::{ MatchError, Result };
pub use logger::{ LogLevel, Logger };
pub use mods::matcher::{ find_matches, Match, MatchConfig, MatchReport, Matcher, RunMetrics, Signal };
