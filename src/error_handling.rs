//! Error types of every subsystem, plus [`types::ControllerError`] which
//! wraps them all at the top level.

pub mod types;
