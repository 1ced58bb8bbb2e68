//! Domain model: catalog entities, slots and the rules that guard them,
//! appointment and payment state machines, and the ports the application
//! layer talks through.

pub mod access;
pub mod appointment;
pub mod catalog;
pub mod conflict;
pub mod money;
pub mod payment;
pub mod ports;
pub mod schedule;
