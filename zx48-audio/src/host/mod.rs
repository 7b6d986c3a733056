//! Host audio backends. Only [`cpal`] is provided, gated behind the
//! crate's `cpal` feature — the core [`crate::BeeperQueue`] and
//! [`crate::SampleRenderer`] work standalone for hosts (or tests) that
//! don't want a live device.
pub mod cpal;
