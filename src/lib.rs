pub mod analysis;
pub mod config;
pub mod cup;
pub mod data;
pub mod error;
pub mod indicators;
pub mod output;
pub mod pivot;
pub mod power_play;
pub mod rs;
pub mod screen;
pub mod signal;
pub mod source;
pub mod trend_template;
pub mod vcp;

#[cfg(test)]
pub(crate) mod testing;
