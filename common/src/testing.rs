//! Frame construction for tests
//!
//! Builds Ethernet/IPv4/UDP frames with an optional RTP + H.265 payload or
//! a coordinate record. Nothing is appended after the last header so that
//! truncating the frame by one byte always removes part of it.

use std::vec::Vec;

use crate::{constants::*, packet::CoordinateRecord};

const SOURCE_ADDR: [u8; 4] = [10, 1, 1, 1];
const SOURCE_PORT: u16 = 40_000;

#[derive(Clone, Debug)]
pub struct FrameBuilder {
    ether_type: u16,
    protocol: u8,
    ihl: u8,
    dst_addr: [u8; 4],
    dport: u16,
    payload: Vec<u8>,
}

impl FrameBuilder {
    pub fn udp(dst_addr: [u8; 4], dport: u16) -> Self {
        Self {
            ether_type: ETH_P_IP,
            protocol: IPPROTO_UDP,
            ihl: IPV4_MIN_IHL,
            dst_addr,
            dport,
            payload: Vec::new(),
        }
    }

    pub fn ether_type(mut self, ether_type: u16) -> Self {
        self.ether_type = ether_type;
        self
    }

    pub fn protocol(mut self, protocol: u8) -> Self {
        self.protocol = protocol;
        self
    }

    /// IHL written into the IPv4 header; values above 5 add zeroed options
    pub fn ihl(mut self, ihl: u8) -> Self {
        self.ihl = ihl;
        self
    }

    /// Append a 12-byte RTP header with the given version
    pub fn rtp(mut self, version: u8) -> Self {
        self.payload.push(version << 6);
        self.payload.push(96);
        self.payload.extend_from_slice(&1u16.to_be_bytes());
        self.payload.extend_from_slice(&90_000u32.to_be_bytes());
        self.payload.extend_from_slice(&0xC0FF_EE00u32.to_be_bytes());
        self
    }

    /// Append a single-NAL H.265 payload header
    pub fn h265(mut self, nal_type: u8) -> Self {
        self.payload.push((nal_type & 0x3F) << 1);
        self.payload.push(1);
        self
    }

    /// Append an FU payload header and FU header
    pub fn fu(mut self, start: bool, end: bool, inner_type: u8) -> Self {
        self.payload.push(H265_NAL_FU << 1);
        self.payload.push(1);
        let mut fu = inner_type & 0x3F;
        if start {
            fu |= 0x80;
        }
        if end {
            fu |= 0x40;
        }
        self.payload.push(fu);
        self
    }

    pub fn coordinate(mut self, x: u32, y: u32) -> Self {
        self.payload
            .extend_from_slice(&CoordinateRecord::new(x, y).to_bytes());
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let ip_len = usize::from(self.ihl.max(IPV4_MIN_IHL)) * 4;
        let udp_len = 8 + self.payload.len();
        let mut frame = Vec::with_capacity(14 + ip_len + udp_len);

        // Ethernet
        frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 0x02]);
        frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 0x01]);
        frame.extend_from_slice(&self.ether_type.to_be_bytes());

        // IPv4
        frame.push(0x40 | (self.ihl & 0x0F));
        frame.push(0);
        frame.extend_from_slice(&((ip_len + udp_len) as u16).to_be_bytes());
        frame.extend_from_slice(&[0, 0, 0x40, 0]);
        frame.push(64);
        frame.push(self.protocol);
        frame.extend_from_slice(&[0, 0]);
        frame.extend_from_slice(&SOURCE_ADDR);
        frame.extend_from_slice(&self.dst_addr);
        frame.resize(14 + ip_len, 0);

        // UDP
        frame.extend_from_slice(&SOURCE_PORT.to_be_bytes());
        frame.extend_from_slice(&self.dport.to_be_bytes());
        frame.extend_from_slice(&(udp_len as u16).to_be_bytes());
        frame.extend_from_slice(&[0, 0]);

        frame.extend_from_slice(&self.payload);
        frame
    }
}
