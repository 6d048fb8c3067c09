// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![forbid(unsafe_code)] // Validation logic should always be strictly safe
#![deny(missing_docs, clippy::all, clippy::pedantic)] // yeah, I'm that guy.  I'm not sorry.
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Do you know where your towel is?

//! Packet buffers, header value types and in-place header mutation for the switch datapath.
//!
//! This crate knows how to find the layers of a frame (Ethernet, 802.1Q, MPLS, IPv4, IPv6,
//! ARP and the common transport headers) and how to rewrite them while keeping checksums
//! consistent.  It has no notion of flows or actions; see the `vswitch-odp` crate for that.

pub mod buffer;
pub mod checksum;
pub mod eth;
pub mod ip;
pub mod mpls;
pub mod packet;
pub mod parse;
pub mod vlan;
