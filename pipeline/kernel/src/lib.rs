//! Shared kernel-side glue for the XDP stage pipeline programs
//!
//! The dispatcher and both stage extensions link this crate. It adapts the
//! XDP context to the bounds-checked packet reader from `pipeline-common`
//! and provides the atomic map helpers every program uses.

#![no_std]

pub mod helpers;
pub mod packet;
