//! Traffic Simulation Library
//!
//! A discrete-time, multi-agent traffic simulation with strategy-driven
//! light retiming and rerouting. Runs headless; rendering is left to callers.

pub mod simulation;
