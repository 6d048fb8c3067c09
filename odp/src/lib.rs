// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![forbid(unsafe_code)] // Validation logic should always be strictly safe
#![deny(missing_docs, clippy::all, clippy::pedantic)] // yeah, I'm that guy.  I'm not sorry.
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Do you know where your towel is?

//! Flow keys, masks and actions in the datapath attribute format.
//!
//! A [`flow::Flow`] is the header state of a packet.  The [`key`] module turns flows (and their
//! wildcard masks) into attribute sequences and back, grading every decode with a
//! [`Fitness`].  The [`action`] module does the same for action lists, including their text
//! form.  Finally [`execute`] replays action lists against packets and [`commit`] computes the
//! actions that take a packet from one flow state to another.

pub mod action;
pub mod attr;
pub mod commit;
pub mod execute;
pub mod fitness;
pub mod flow;
pub mod key;
mod text;

pub use fitness::Fitness;

/// The "no port" value of the 32 bit datapath port number space.
pub const ODPP_NONE: u32 = u32::MAX;
