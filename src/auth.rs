//! Auth-domain identifiers, SASL extensions, and bearer token models.

pub mod extensions;
pub mod id;
pub mod token;

pub use extensions::*;
pub use id::*;
pub use token::{record::*, secret::*};
