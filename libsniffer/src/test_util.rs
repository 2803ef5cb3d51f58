//! Frame builders shared by the unit tests

use crate::layers::TcpFlags;

pub fn ethernet(payload: &[u8]) -> Vec<u8> {
    let mut v = vec![0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0x08, 0x00];
    v.extend_from_slice(payload);
    v
}

pub fn ipv4(proto: u8, src: [u8; 4], dst: [u8; 4], payload: &[u8]) -> Vec<u8> {
    ipv4_with_options(proto, src, dst, &[], payload)
}

/// IPv4 header with options (length must be a multiple of 4)
pub fn ipv4_with_options(proto: u8, src: [u8; 4], dst: [u8; 4], options: &[u8], payload: &[u8]) -> Vec<u8> {
    let hlen = 20 + options.len();
    let total = (hlen + payload.len()) as u16;
    let mut v = vec![0x40 | (hlen / 4) as u8, 0];
    v.extend_from_slice(&total.to_be_bytes());
    v.extend_from_slice(&[0, 1, 0x40, 0, 64, proto, 0, 0]);
    v.extend_from_slice(&src);
    v.extend_from_slice(&dst);
    v.extend_from_slice(options);
    v.extend_from_slice(payload);
    v
}

pub fn tcp(sport: u16, dport: u16, flags: TcpFlags) -> Vec<u8> {
    let mut v = Vec::with_capacity(20);
    v.extend_from_slice(&sport.to_be_bytes());
    v.extend_from_slice(&dport.to_be_bytes());
    v.extend_from_slice(&0x0102_0304_u32.to_be_bytes());
    v.extend_from_slice(&0_u32.to_be_bytes());
    v.extend_from_slice(&[0x50, flags.bits()]);
    v.extend_from_slice(&[0xff, 0xff, 0, 0, 0, 0]);
    v
}

pub fn udp(sport: u16, dport: u16, payload: &[u8]) -> Vec<u8> {
    let len = (8 + payload.len()) as u16;
    let mut v = Vec::with_capacity(len as usize);
    v.extend_from_slice(&sport.to_be_bytes());
    v.extend_from_slice(&dport.to_be_bytes());
    v.extend_from_slice(&len.to_be_bytes());
    v.extend_from_slice(&[0, 0]);
    v.extend_from_slice(payload);
    v
}

/// Ethernet + IPv4 + TCP frame
pub fn tcp_frame(src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16, flags: TcpFlags) -> Vec<u8> {
    ethernet(&ipv4(6, src, dst, &tcp(sport, dport, flags)))
}

/// Ethernet + IPv4 + UDP frame
pub fn udp_frame(src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16) -> Vec<u8> {
    ethernet(&ipv4(17, src, dst, &udp(sport, dport, b"payload")))
}

/// Ethernet + IPv4 + ICMP echo request
pub fn icmp_frame(src: [u8; 4], dst: [u8; 4]) -> Vec<u8> {
    ethernet(&ipv4(1, src, dst, &[8, 0, 0xf7, 0xff, 0, 0, 0, 0]))
}

/// Decode an Ethernet frame into a `DecodedFrame` ready for the store
pub fn decoded(frame: &[u8], secs: u32) -> crate::record::DecodedFrame {
    let fields = crate::decoder::decode(frame, 14).expect("test frame must decode");
    crate::record::DecodedFrame {
        fields,
        captured_at: libsniffer_tools::Duration::new(secs, 0),
        elapsed_seconds: f64::from(secs),
        link_header_len: 14,
        original_len: frame.len() as u32,
        raw_frame: frame[14..].to_vec(),
    }
}
