// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Segment-reclaim (garbage collection) engine for a log-structured
//! filesystem.
//!
//! The filesystem writes only at the tail of a circular log of fixed-size
//! segments; nothing is ever overwritten in place. Deletes and rewrites
//! just leave the old copy of a block marked invalid in its segment, so
//! free space has to be recovered by picking a segment, checking which of
//! its blocks are still live, and migrating the live ones elsewhere
//! before the segment can be reused. This crate is that reclaimer: victim
//! selection ([`victim`]), validity cross-checking ([`validity`]), block
//! migration ([`migrator`]) and the driver/background loop that ties them
//! together ([`driver`], [`background`]).
//!
//! Everything the engine calls out to — the SIT, node/inode tables, page
//! cache, allocator, checkpoint area — is modeled as a trait in
//! [`collaborators`] and supplied by the embedding filesystem; this crate
//! owns none of that storage itself.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::missing_const_for_fn)]

pub mod background;
pub mod bitmap;
pub mod collaborators;
pub mod config;
pub mod dirty_segmap;
pub mod driver;
pub mod error;
pub mod gc_inode_list;
pub mod migrator;
pub mod segment;
pub mod sit;
pub mod stop_signal;
pub mod summary;
#[cfg(test)]
pub mod testkit;
pub mod validity;
pub mod victim;

pub use config::Config;
pub use driver::Mount;
pub use error::{Error, Result};
pub use stop_signal::StopSignal;
