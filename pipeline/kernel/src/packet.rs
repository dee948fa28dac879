//! XDP frame access
//!
//! Every read is checked against `data_end` before the pointer is formed,
//! which is the shape the verifier needs to accept the access.

use core::mem;

use aya_ebpf::programs::XdpContext;
use pipeline_common::packet::{Header, PacketBuf};

/// Packet view over the `data`/`data_end` window of an XDP context
pub struct XdpPacket<'a> {
    ctx: &'a XdpContext,
}

impl<'a> XdpPacket<'a> {
    #[inline(always)]
    pub fn new(ctx: &'a XdpContext) -> Self {
        Self { ctx }
    }
}

impl PacketBuf for XdpPacket<'_> {
    #[inline(always)]
    fn load<T: Header>(&self, offset: usize) -> Option<T> {
        let start = self.ctx.data();
        let end = self.ctx.data_end();
        let len = mem::size_of::<T>();

        if start + offset + len > end {
            return None;
        }

        // SAFETY: [start + offset, start + offset + len) lies inside the frame
        Some(unsafe { core::ptr::read_unaligned((start + offset) as *const T) })
    }
}
