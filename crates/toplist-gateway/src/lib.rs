//! toplist-gateway: fan-out / correlate / merge / cache pipeline for crypto
//! top-list requests.
//!
//! A client request is resolved to a correlation id, fanned out to the
//! configured upstream data services over the stream broker, the responses
//! are correlated back by id and inner-joined into one ranked record set,
//! cached, then sliced and rendered.

pub mod config;
pub mod correlator;
pub mod error;
pub mod fanout;
pub mod format;
pub mod merge;
pub mod messages;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
