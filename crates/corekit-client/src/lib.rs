//! # corekit client
//!
//! A small JSON-over-HTTP client for calling corekit services:
//!
//! - [`HttpClient`] - `send`/`execute` plus `get`/`post`/`put`/`delete`
//! - [`ClientError`] - `404`, other non-2xx statuses with the decoded
//!   [`ErrorBody`](corekit_core::ErrorBody), and encode/decode/transport
//!   failures, each naming the method and path
//! - [`Transport`] - the network seam, implemented for `reqwest::Client`
//!
//! There are no retries.

#![doc(html_root_url = "https://docs.rs/corekit-client/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod client;
mod error;
mod transport;

pub use client::HttpClient;
pub use error::ClientError;
pub use transport::{Transport, TransportError};
