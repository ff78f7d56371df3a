pub mod capture;
pub mod configuration;
pub mod controller;
pub mod error_handling;
pub mod events;
pub mod fingerprint;
pub mod network;
pub mod storage;
