//! Device-side streaming: encode captured frames and push them to the
//! collector over an unreliable link.
//!
//! The pieces, leaves first: [`encode`] turns a frame into a wire payload,
//! [`transport`] sends one payload per fresh connection with bounded retry,
//! [`link`] owns the link handle's lifecycle and the consecutive-failure
//! policy, and [`capture_loop`] orchestrates all of it on a fixed cadence.

pub mod capture_loop;
pub mod config;
pub mod encode;
pub mod link;
pub mod transport;

pub use capture_loop::{CaptureLoop, RoundOutcome};
pub use config::StreamConfig;
pub use encode::{EncodeFault, encode};
pub use link::{ConnectFault, LinkBackend, LinkState, LinkSupervisor, TcpLinkBackend};
pub use transport::{Dial, Request, TcpDialer, TransportConfig, TransportFault};
