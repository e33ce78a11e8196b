//! Pseudo-real-time change feed built on periodic snapshot polling.
//!
//! Stores have no push channel, so a subscription polls `get_items()` on a
//! timer and diffs each snapshot against the previous one.

mod diff;
mod subscription;

pub use diff::{diff_snapshots, ChangeEvent, ChangeKind, PollState};
pub use subscription::{start_feed, ChangeCallback, Subscription};
