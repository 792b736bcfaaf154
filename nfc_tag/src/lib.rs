pub mod external;
pub mod ndef;
pub mod tag;
pub mod well_known;

pub mod error;
