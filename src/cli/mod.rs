//! Terminal front end: rendering and per-command drivers.

pub mod calc;
pub mod history;
pub mod refresh;
pub mod setup;
pub mod show;
pub mod ui;
