pub mod classifier;
pub mod event_channel;
pub mod filter_set;
pub mod radio;
pub mod service;
pub mod service_builder;
pub mod session;
pub mod simulated;
pub mod technology;

pub mod error;
