//! # dnspod-ddns
//!
//! A Dynamic DNS client that keeps DNSPod host records pointed at the
//! machine's current public IP address.
//!
//! ## Features
//!
//! - Periodic reconciliation: public IP vs. the provider's published record
//! - Record discovery (domain → domain ID → record ID) every cycle
//! - Optional creation of missing A/AAAA records
//! - Single shared timer or one independent task per domain
//! - Bounded request timeouts and opt-in retry of transport failures
//!
//! ## Usage
//!
//! ```bash
//! # Write an example config.json
//! dnspod-ddns init
//!
//! # Run the reconciliation loop (default command)
//! dnspod-ddns run
//!
//! # One cycle, pushing updates even when unchanged
//! dnspod-ddns update --force
//!
//! # Show current IP and published records
//! dnspod-ddns status
//! ```

pub mod config;
pub mod detector;
pub mod error;
pub mod providers;
pub mod reconciler;

pub use config::Config;
pub use detector::{IpDetector, IpSource};
pub use error::{DdnsError, Result};
pub use reconciler::{CycleOutcome, Reconciler};
