//! The duolens collector: accepts frame uploads from the capture device,
//! validates them, blind-disambiguates the byte order of raw RGB565
//! payloads, and maintains per-side "latest" files a viewer can poll.

pub mod disambiguate;
pub mod error;
pub mod routes;
pub mod store;

pub use disambiguate::{ByteOrder, DisambiguationReport, disambiguate};
pub use error::DecodeFault;
pub use routes::router;
pub use store::FrameStore;
