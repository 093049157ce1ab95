//! kubecheck-health — HTTP reachability and content checks for probes.
//!
//! # Architecture
//!
//! ```text
//! poll_target()            AddressChecker::verify()
//!   └── Poller               ├── Resolver → every address
//!        └── fetch ──┐       └── rounds of pinned fetches
//!                    ▼                 │
//!             ContentFetcher ◄─────────┘
//!               └── HttpFetcher (hyper, rustls)
//! ```
//!
//! Both checkers retry under the probe's [`kubecheck_core::Deadline`] with
//! [`kubecheck_core::Backoff`] sleeps, and share one
//! [`kubecheck_core::ValidationPolicy`] for content mismatches.

pub mod consistency;
pub mod fetch;
pub mod poller;
pub mod resolve;
pub mod target;
pub mod tls;

pub use consistency::{AddressCandidate, AddressChecker, AttemptBounds, ConsistencyReport};
pub use fetch::{ContentFetcher, FetchResponse, HttpFetcher, fetch_and_validate};
pub use poller::{PollState, PollSuccess, Poller, poll_target};
pub use resolve::{AddressFamily, Resolver, SystemResolver};
pub use target::{CheckTarget, ProbeUrl, Scheme};
pub use tls::TlsConfig;
