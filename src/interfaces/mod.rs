//! Outer surfaces: CSV replay of booking commands and the gateway webhook intake.

pub mod csv;
pub mod replay;
pub mod webhook;
