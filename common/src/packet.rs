//! Bounds-checked packet access and wire header layouts
//!
//! Every header is a byte-array struct with alignment 1 so it can be read
//! at any offset with `read_unaligned`. Multi-byte fields are kept in
//! network order and decoded by the accessors.
//!
//! Readers go through [`PacketBuf::load`], which refuses any read that
//! would cross the end of the captured bytes. In the kernel that check is
//! what the verifier needs to see; on the host it is a slice length check.

use crate::constants::*;

/// Marker for plain-old-data wire headers
///
/// # Safety
///
/// Implementors must be `repr(C)`, contain only `u8` or byte arrays, and be
/// valid for any bit pattern.
pub unsafe trait Header: Copy {
    const LEN: usize = core::mem::size_of::<Self>();
}

/// Why a header could not be decoded
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseError {
    /// The read would go past the end of the packet
    Truncated,
    /// EtherType is not IPv4
    NotIpv4,
    /// IPv4 protocol is not UDP
    NotUdp,
    /// IPv4 IHL below the 5-word minimum
    BadHeaderLength,
}

/// Read-only view over a received frame
pub trait PacketBuf {
    /// Copy a header out of the packet at `offset`, or `None` if any byte of
    /// it lies outside the packet.
    fn load<T: Header>(&self, offset: usize) -> Option<T>;

    #[inline(always)]
    fn read<T: Header>(&self, offset: usize) -> Result<T, ParseError> {
        self.load(offset).ok_or(ParseError::Truncated)
    }
}

impl PacketBuf for [u8] {
    #[inline(always)]
    fn load<T: Header>(&self, offset: usize) -> Option<T> {
        let end = offset.checked_add(T::LEN)?;
        if end > self.len() {
            return None;
        }
        // SAFETY: the range was checked above and T is valid for any bytes.
        Some(unsafe { core::ptr::read_unaligned(self.as_ptr().add(offset) as *const T) })
    }
}

// ============================================================================
// Ethernet / IPv4 / UDP
// ============================================================================

pub const ETH_HDR_LEN: usize = 14;
pub const IPV4_MIN_HDR_LEN: usize = 20;
pub const UDP_HDR_LEN: usize = 8;

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct EthHdr {
    pub dst_addr: [u8; 6],
    pub src_addr: [u8; 6],
    pub ether_type: [u8; 2],
}

unsafe impl Header for EthHdr {}

impl EthHdr {
    #[inline(always)]
    pub fn ether_type(&self) -> u16 {
        u16::from_be_bytes(self.ether_type)
    }

    #[inline(always)]
    pub fn is_ipv4(&self) -> bool {
        self.ether_type() == ETH_P_IP
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct Ipv4Hdr {
    pub version_ihl: u8,
    pub tos: u8,
    pub tot_len: [u8; 2],
    pub id: [u8; 2],
    pub frag_off: [u8; 2],
    pub ttl: u8,
    pub protocol: u8,
    pub check: [u8; 2],
    pub src_addr: [u8; 4],
    pub dst_addr: [u8; 4],
}

unsafe impl Header for Ipv4Hdr {}

impl Ipv4Hdr {
    /// Header length in 32-bit words
    #[inline(always)]
    pub fn ihl(&self) -> u8 {
        self.version_ihl & 0x0F
    }

    #[inline(always)]
    pub fn is_udp(&self) -> bool {
        self.protocol == IPPROTO_UDP
    }

    /// Byte length of the header including options
    ///
    /// An IHL below 5 cannot describe a real header; the packet is treated
    /// as malformed rather than letting the transport header overlap it.
    #[inline(always)]
    pub fn header_len(&self) -> Result<usize, ParseError> {
        let ihl = self.ihl();
        if ihl < IPV4_MIN_IHL {
            return Err(ParseError::BadHeaderLength);
        }
        Ok(ihl as usize * 4)
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct UdpHdr {
    pub source: [u8; 2],
    pub dest: [u8; 2],
    pub len: [u8; 2],
    pub check: [u8; 2],
}

unsafe impl Header for UdpHdr {}

impl UdpHdr {
    #[inline(always)]
    pub fn dest(&self) -> u16 {
        u16::from_be_bytes(self.dest)
    }
}

// ============================================================================
// RTP / H.265
// ============================================================================

/// Fixed 12-byte RTP header (CSRC list and extensions are not inspected)
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct RtpHdr {
    pub vpxcc: u8,
    pub m_pt: u8,
    pub seq: [u8; 2],
    pub timestamp: [u8; 4],
    pub ssrc: [u8; 4],
}

unsafe impl Header for RtpHdr {}

impl RtpHdr {
    #[inline(always)]
    pub fn version(&self) -> u8 {
        (self.vpxcc >> 6) & 0x03
    }
}

/// Two-byte H.265 payload header
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct H265PayloadHdr {
    pub byte0: u8,
    pub byte1: u8,
}

unsafe impl Header for H265PayloadHdr {}

impl H265PayloadHdr {
    #[inline(always)]
    pub fn nal_type(&self) -> u8 {
        (self.byte0 >> 1) & 0x3F
    }

    #[inline(always)]
    pub fn is_fragment(&self) -> bool {
        self.nal_type() == H265_NAL_FU
    }
}

/// Fragmentation unit header following an FU payload header
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct FuHdr {
    pub s_e_type: u8,
}

unsafe impl Header for FuHdr {}

impl FuHdr {
    #[inline(always)]
    pub fn is_start(&self) -> bool {
        self.s_e_type & 0x80 != 0
    }

    #[inline(always)]
    pub fn is_end(&self) -> bool {
        self.s_e_type & 0x40 != 0
    }

    /// NAL type of the fragmented unit
    #[inline(always)]
    pub fn inner_type(&self) -> u8 {
        self.s_e_type & 0x3F
    }
}

/// NAL types 1..=9 are the P-slice family
#[inline(always)]
pub fn is_p_slice(nal_type: u8) -> bool {
    (H265_P_SLICE_MIN..=H265_P_SLICE_MAX).contains(&nal_type)
}

// ============================================================================
// Coordinate updates
// ============================================================================

/// Payload of a coordinate-update packet: big-endian `x` then `y`
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct CoordinateRecord {
    pub x: [u8; 4],
    pub y: [u8; 4],
}

unsafe impl Header for CoordinateRecord {}

impl CoordinateRecord {
    pub const fn new(x: u32, y: u32) -> Self {
        Self {
            x: x.to_be_bytes(),
            y: y.to_be_bytes(),
        }
    }

    #[inline(always)]
    pub fn x(&self) -> u32 {
        u32::from_be_bytes(self.x)
    }

    #[inline(always)]
    pub fn y(&self) -> u32 {
        u32::from_be_bytes(self.y)
    }

    /// Wire bytes, as sent by the position source
    pub fn to_bytes(&self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[..4].copy_from_slice(&self.x);
        out[4..].copy_from_slice(&self.y);
        out
    }
}

const _: () = {
    assert!(core::mem::size_of::<EthHdr>() == ETH_HDR_LEN);
    assert!(core::mem::size_of::<Ipv4Hdr>() == IPV4_MIN_HDR_LEN);
    assert!(core::mem::size_of::<UdpHdr>() == UDP_HDR_LEN);
    assert!(core::mem::size_of::<RtpHdr>() == 12);
    assert!(core::mem::size_of::<H265PayloadHdr>() == 2);
    assert!(core::mem::size_of::<FuHdr>() == 1);
    assert!(core::mem::size_of::<CoordinateRecord>() == 8);
};
