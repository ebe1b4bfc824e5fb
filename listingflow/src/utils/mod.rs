//! Utility functions for timestamps and identifiers.

mod ids;
pub mod timestamps;
pub mod urls;

pub use ids::{name_uuid, short_digest, slugify};
pub use timestamps::{format_iso, iso_timestamp, run_stamp, Timestamp};
pub use urls::{host_of, normalize_url};
