//! # hydropump-cloud
//!
//! Remote schedule provider for hydropump.
//!
//! Each pump line is identified by a short code (`"#03"`). Its irrigation
//! document lives in a hosted document store and is read through an HTTP
//! data API: one `POST` per pump with a `pumperCode` filter, answered with
//! `{"document": {...}}`.
//!
//! ## Design
//!
//! - One shared [`reqwest::Client`] per [`DataApiClient`], carrying the
//!   request timeout from [`CloudConfig`]
//! - The document is decoded into a transport-neutral [`RemoteConfig`];
//!   deciding which entries are active is left to the caller
//! - Both the current (`schedule` / `enabled`) and the legacy firmware
//!   (`driveTimes` / `state`) field names are accepted
//!
//! ## Security
//!
//! - The API key is only ever sent as a request header and never logged

pub mod client;
pub mod config;
pub mod error;
pub mod types;

pub use client::DataApiClient;
pub use config::CloudConfig;
pub use error::{CloudError, Result};
pub use types::{RemoteConfig, ScheduleEntry};
