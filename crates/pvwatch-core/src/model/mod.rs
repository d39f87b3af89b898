// Domain model: validated identifiers and canonical sample records.

mod pv_name;
mod sample;

pub use pv_name::PvName;
pub use sample::{AlarmLevel, ErrorKind, ErrorRecord, PvSample, PvStatus};
