//! Session controller and runner

pub mod controller;
pub mod runner;

pub use controller::{ControllerState, SessionController};
pub use runner::{SectionSignal, SessionHandle, SessionParts, SessionRunner, SessionSummary};
