pub mod categorize;
pub mod config;
pub mod correct;
pub mod errors;
pub mod features;
pub mod frame;
pub mod inference;
pub mod ingest;
pub mod pipeline;
pub mod resample;

#[cfg(test)]
mod tests;
