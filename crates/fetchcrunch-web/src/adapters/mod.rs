#[cfg(feature = "flate2")]
pub mod flate;
