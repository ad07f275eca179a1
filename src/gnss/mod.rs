
/// Acquisition machinery usable by any DSSS signal with a periodic spreading code
pub mod common;

pub mod gps_l1_ca;
