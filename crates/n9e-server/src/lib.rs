//! `n9e-alertd`: hosts the alert lifecycle engine together with its store,
//! registry and notification emitter.

pub mod app;
pub mod config;
