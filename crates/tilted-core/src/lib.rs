//! Hardware-independent core library for the Tilted hydrometer
//!
//! This crate contains the platform-agnostic logic for both nodes of the
//! pipeline. The battery-powered sensor node samples its orientation, runs
//! one duty cycle per wake and broadcasts a [`reading::ReadingRecord`] over
//! the radio. The gateway node receives that record, derives a gravity value,
//! keeps a short history for the trend display and fans the result out to
//! the configured sinks.
//!
//! Hardware and network access go through small port traits (IMU, clock,
//! radio, scratch memory, HTTP, MQTT) so that the same code runs on the
//! boards, in the desktop simulator and in the unit tests.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets and desktop hosts.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod duty_cycle;
pub mod gateway;
pub mod gravity;
pub mod history;
pub mod publish;
pub mod radio;
pub mod reading;
pub mod rounding;
pub mod sampling;
pub mod sensors;
pub mod storage;
pub mod time;

#[cfg(test)]
pub(crate) mod testing;
