//! # confdiff
//!
//! Configuration drift detection for network devices.
//!
//! Running configurations carry lines that change on every capture without any
//! operational meaning (clock settings, NTP clock-period, "last changed"
//! banners). This crate:
//! - Filters those volatile lines out before comparing
//! - Produces a deterministic unified diff (3 lines of context)
//! - Counts added and removed lines for alert summaries
//!
//! ## Example
//!
//! ```
//! use confdiff::compare;
//!
//! let old = "hostname r1\nip address 192.168.1.1 255.255.255.0\n";
//! let new = "hostname r1\nip address 192.168.1.2 255.255.255.0\n";
//!
//! let result = compare(old, new);
//! assert!(result.has_changes);
//! assert_eq!(result.summary(), "1 lines added, 1 lines removed");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod compare;
mod filter;

pub use compare::{DiffResult, NEW_LABEL, OLD_LABEL, compare, summarize};
pub use filter::{filter_volatile, is_volatile};
