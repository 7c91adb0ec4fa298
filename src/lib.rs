//! Turns tagged tasks into per day activity weights and projects them onto a one year calendar
//! with month labels and a running streak.
//!
//! Every task creation adds the weight of its tags to the aggregate of the day it happened,
//! every deletion takes the same weight back. Aggregates are updated with a revision check so
//! concurrent writers never lose an update.

pub mod calendar;
pub mod cli;
pub mod engine;
pub mod storage;
pub mod tags;
pub mod tasks;
pub mod utils;
