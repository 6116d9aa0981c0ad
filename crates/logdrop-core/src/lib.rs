//! logdrop Core - Shared types, message encoding, configuration, and error handling

pub mod codec;
pub mod config;
pub mod constants;
pub mod error;
pub mod policy;
pub mod types;

pub use codec::{decode_form, encode_form};
pub use config::*;
pub use constants::*;
pub use error::{Error, Result};
pub use policy::{FieldRule, IngestPolicy, Missing, RecordField};
pub use types::*;
