//! Pairing of identified connections into matches

pub mod service;
pub mod waiting;

pub use service::MatchmakingService;
