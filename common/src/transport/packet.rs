//! LCM UDP multicast wire format
//!
//! Short messages fit in one datagram:
//!
//! ```text
//! u32 magic "LC02" | u32 seqno | channel NUL | payload
//! ```
//!
//! Larger messages are split into fragments:
//!
//! ```text
//! u32 magic "LC03" | u32 seqno | u32 msg_size | u32 fragment_offset
//! | u16 fragment_no | u16 fragment_count | (fragment 0 only: channel NUL) | data
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;

use thiserror::Error;
use tracing::debug;

pub const SHORT_MAGIC: u32 = 0x4c43_3032;
pub const FRAGMENT_MAGIC: u32 = 0x4c43_3033;

const SHORT_HEADER_SIZE: usize = 8;
const FRAGMENT_HEADER_SIZE: usize = 20;

/// Largest datagram sent as a short message
pub const SHORT_MESSAGE_MAX_SIZE: usize = 65499;
/// Largest fragment body, channel name included
pub const FRAGMENT_MAX_PAYLOAD: usize = 65487;
pub const CHANNEL_MAX_LENGTH: usize = 63;
/// Reassembly refuses to buffer anything larger
pub const MAX_MESSAGE_SIZE: usize = 1 << 28;
/// Senders with a partially received message kept at once
const MAX_PENDING_SENDERS: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("datagram of {0} bytes is too short")]
    TooShort(usize),

    #[error("unknown magic {0:#010x}")]
    BadMagic(u32),

    #[error("channel name is not terminated or not valid UTF-8")]
    BadChannel,

    #[error("channel name longer than {CHANNEL_MAX_LENGTH} bytes")]
    ChannelTooLong,

    #[error("inconsistent fragment header: {0}")]
    BadFragment(String),

    #[error("message of {0} bytes is too large")]
    TooLarge(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment<'a> {
    pub seqno: u32,
    pub msg_size: u32,
    pub offset: u32,
    pub fragment_no: u16,
    pub fragment_count: u16,
    /// Only present in fragment 0
    pub channel: Option<&'a str>,
    pub data: &'a [u8],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet<'a> {
    Short {
        seqno: u32,
        channel: &'a str,
        payload: &'a [u8],
    },
    Fragment(Fragment<'a>),
}

fn be_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn be_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([buf[at], buf[at + 1]])
}

/// Split a NUL-terminated channel name off the front of `buf`
fn split_channel(buf: &[u8]) -> Result<(&str, &[u8]), PacketError> {
    let nul = buf.iter().position(|&b| b == 0).ok_or(PacketError::BadChannel)?;
    let channel = std::str::from_utf8(&buf[..nul]).map_err(|_| PacketError::BadChannel)?;
    if channel.len() > CHANNEL_MAX_LENGTH {
        return Err(PacketError::ChannelTooLong);
    }
    Ok((channel, &buf[nul + 1..]))
}

/// Parse one received datagram
pub fn parse(buf: &[u8]) -> Result<Packet<'_>, PacketError> {
    if buf.len() < SHORT_HEADER_SIZE {
        return Err(PacketError::TooShort(buf.len()));
    }
    let seqno = be_u32(buf, 4);

    match be_u32(buf, 0) {
        SHORT_MAGIC => {
            let (channel, payload) = split_channel(&buf[SHORT_HEADER_SIZE..])?;
            Ok(Packet::Short {
                seqno,
                channel,
                payload,
            })
        }
        FRAGMENT_MAGIC => {
            if buf.len() < FRAGMENT_HEADER_SIZE {
                return Err(PacketError::TooShort(buf.len()));
            }
            let msg_size = be_u32(buf, 8);
            let offset = be_u32(buf, 12);
            let fragment_no = be_u16(buf, 16);
            let fragment_count = be_u16(buf, 18);
            if fragment_no >= fragment_count {
                return Err(PacketError::BadFragment(format!(
                    "fragment {fragment_no} of {fragment_count}"
                )));
            }

            let body = &buf[FRAGMENT_HEADER_SIZE..];
            let (channel, data) = if fragment_no == 0 {
                let (channel, data) = split_channel(body)?;
                (Some(channel), data)
            } else {
                (None, body)
            };

            if offset as usize + data.len() > msg_size as usize {
                return Err(PacketError::BadFragment(format!(
                    "{} bytes at offset {offset} overrun message of {msg_size}",
                    data.len()
                )));
            }

            Ok(Packet::Fragment(Fragment {
                seqno,
                msg_size,
                offset,
                fragment_no,
                fragment_count,
                channel,
                data,
            }))
        }
        other => Err(PacketError::BadMagic(other)),
    }
}

/// Encode a message into one or more datagrams
pub fn encode(channel: &str, payload: &[u8], seqno: u32) -> Result<Vec<Vec<u8>>, PacketError> {
    if channel.len() > CHANNEL_MAX_LENGTH {
        return Err(PacketError::ChannelTooLong);
    }

    let short_size = SHORT_HEADER_SIZE + channel.len() + 1 + payload.len();
    if short_size <= SHORT_MESSAGE_MAX_SIZE {
        let mut datagram = Vec::with_capacity(short_size);
        datagram.extend_from_slice(&SHORT_MAGIC.to_be_bytes());
        datagram.extend_from_slice(&seqno.to_be_bytes());
        datagram.extend_from_slice(channel.as_bytes());
        datagram.push(0);
        datagram.extend_from_slice(payload);
        return Ok(vec![datagram]);
    }

    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(PacketError::TooLarge(payload.len()));
    }

    let first_chunk = FRAGMENT_MAX_PAYLOAD - channel.len() - 1;
    let rest = payload.len().saturating_sub(first_chunk);
    let fragment_count = 1 + rest.div_ceil(FRAGMENT_MAX_PAYLOAD);
    let fragment_count =
        u16::try_from(fragment_count).map_err(|_| PacketError::TooLarge(payload.len()))?;

    let mut datagrams = Vec::with_capacity(fragment_count as usize);
    let mut offset = 0;
    for fragment_no in 0..fragment_count {
        let chunk_len = if fragment_no == 0 { first_chunk } else { FRAGMENT_MAX_PAYLOAD };
        let end = (offset + chunk_len).min(payload.len());

        let mut datagram = Vec::with_capacity(FRAGMENT_HEADER_SIZE + FRAGMENT_MAX_PAYLOAD);
        datagram.extend_from_slice(&FRAGMENT_MAGIC.to_be_bytes());
        datagram.extend_from_slice(&seqno.to_be_bytes());
        datagram.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        datagram.extend_from_slice(&(offset as u32).to_be_bytes());
        datagram.extend_from_slice(&fragment_no.to_be_bytes());
        datagram.extend_from_slice(&fragment_count.to_be_bytes());
        if fragment_no == 0 {
            datagram.extend_from_slice(channel.as_bytes());
            datagram.push(0);
        }
        datagram.extend_from_slice(&payload[offset..end]);
        datagrams.push(datagram);
        offset = end;
    }
    Ok(datagrams)
}

#[derive(Debug)]
struct Partial {
    seqno: u32,
    channel: Option<String>,
    data: Vec<u8>,
    received: Vec<bool>,
    remaining: usize,
}

/// Reassembles fragmented messages, one in flight per sender
#[derive(Debug, Default)]
pub struct Reassembler {
    pending: HashMap<SocketAddr, Partial>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fragment; returns `(channel, payload)` once the message is complete.
    ///
    /// A fragment with a newer sequence number from the same sender discards
    /// any incomplete earlier message; fragments of older messages are dropped.
    pub fn insert(&mut self, from: SocketAddr, fragment: Fragment<'_>) -> Option<(String, Vec<u8>)> {
        let msg_size = fragment.msg_size as usize;
        if msg_size > MAX_MESSAGE_SIZE {
            debug!("Dropping fragment from {from}: message of {msg_size} bytes too large");
            return None;
        }

        if let Some(p) = self.pending.get(&from) {
            // Sequence numbers wrap; compare by signed distance
            let distance = fragment.seqno.wrapping_sub(p.seqno) as i32;
            if distance < 0 {
                debug!(
                    "Dropping late fragment of message {} from {from}, assembling {}",
                    fragment.seqno, p.seqno
                );
                return None;
            }
            let stale = distance > 0
                || p.data.len() != msg_size
                || p.received.len() != fragment.fragment_count as usize;
            if stale {
                debug!("Discarding incomplete message {} from {from}", p.seqno);
                self.pending.remove(&from);
            }
        }

        if !self.pending.contains_key(&from) && self.pending.len() >= MAX_PENDING_SENDERS {
            // Bounded number of tracked senders
            if let Some(victim) = self.pending.keys().next().copied() {
                self.pending.remove(&victim);
            }
        }

        let partial = self.pending.entry(from).or_insert_with(|| Partial {
            seqno: fragment.seqno,
            channel: None,
            data: vec![0; msg_size],
            received: vec![false; fragment.fragment_count as usize],
            remaining: fragment.fragment_count as usize,
        });

        let index = fragment.fragment_no as usize;
        if partial.received[index] {
            return None;
        }
        let start = fragment.offset as usize;
        partial.data[start..start + fragment.data.len()].copy_from_slice(fragment.data);
        if let Some(channel) = fragment.channel {
            partial.channel = Some(channel.to_string());
        }
        partial.received[index] = true;
        partial.remaining -= 1;

        if partial.remaining > 0 {
            return None;
        }
        let partial = self.pending.remove(&from)?;
        partial.channel.map(|channel| (channel, partial.data))
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender(port: u16) -> SocketAddr {
        SocketAddr::from(([192, 168, 3, 7], port))
    }

    fn fragments(datagrams: &[Vec<u8>]) -> Vec<Fragment<'_>> {
        datagrams
            .iter()
            .map(|d| match parse(d).unwrap() {
                Packet::Fragment(f) => f,
                other => panic!("expected fragment, got {other:?}"),
            })
            .collect()
    }

    #[test]
    fn test_short_message() {
        let datagrams = encode("MBOT_IMU", &[1, 2, 3], 9).unwrap();
        assert_eq!(datagrams.len(), 1);
        assert_eq!(&datagrams[0][..4], b"LC02");
        assert_eq!(
            parse(&datagrams[0]).unwrap(),
            Packet::Short {
                seqno: 9,
                channel: "MBOT_IMU",
                payload: &[1, 2, 3],
            }
        );
    }

    #[test]
    fn test_large_message_is_fragmented_and_reassembled_out_of_order() {
        let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let datagrams = encode("LIDAR", &payload, 77).unwrap();
        assert_eq!(datagrams.len(), 4);
        assert!(datagrams.iter().all(|d| d.len() <= FRAGMENT_HEADER_SIZE + FRAGMENT_MAX_PAYLOAD));

        let mut frags = fragments(&datagrams);
        frags.reverse();
        let mut reassembler = Reassembler::new();
        let last = frags.pop().unwrap();
        for frag in frags {
            assert!(reassembler.insert(sender(1), frag).is_none());
        }
        let (channel, data) = reassembler.insert(sender(1), last).unwrap();
        assert_eq!(channel, "LIDAR");
        assert_eq!(data, payload);
        assert_eq!(reassembler.pending(), 0);
    }

    #[test]
    fn test_new_sequence_discards_incomplete_message() {
        let payload = vec![7u8; 100_000];
        let first = encode("MAP", &payload, 1).unwrap();
        let second = encode("MAP", &payload, 2).unwrap();
        let first = fragments(&first);
        let second = fragments(&second);

        let mut reassembler = Reassembler::new();
        assert!(reassembler.insert(sender(1), first[0].clone()).is_none());
        assert!(reassembler.insert(sender(1), second[0].clone()).is_none());
        // The rest of message 1 no longer completes anything
        assert!(reassembler.insert(sender(1), first[1].clone()).is_none());
        assert_eq!(reassembler.pending(), 1);
        let (channel, data) = reassembler.insert(sender(1), second[1].clone()).unwrap();
        assert_eq!(channel, "MAP");
        assert_eq!(data, payload);
    }

    #[test]
    fn test_late_fragment_does_not_evict_newer_message() {
        let payload = vec![3u8; 100_000];
        let older_datagrams = encode("MAP", &payload, 41).unwrap();
        let older = fragments(&older_datagrams);
        let newer_datagrams = encode("MAP", &payload, 42).unwrap();
        let newer = fragments(&newer_datagrams);

        let mut reassembler = Reassembler::new();
        assert!(reassembler.insert(sender(1), newer[0].clone()).is_none());
        assert!(reassembler.insert(sender(1), older[0].clone()).is_none());
        assert!(reassembler.insert(sender(1), older[1].clone()).is_none());
        assert_eq!(reassembler.insert(sender(1), newer[1].clone()).unwrap().1, payload);
    }

    #[test]
    fn test_sequence_order_wraps() {
        let payload = vec![9u8; 100_000];
        let before_wrap_datagrams = encode("MAP", &payload, u32::MAX).unwrap();
        let before_wrap = fragments(&before_wrap_datagrams);
        let after_wrap_datagrams = encode("MAP", &payload, 0).unwrap();
        let after_wrap = fragments(&after_wrap_datagrams);

        let mut reassembler = Reassembler::new();
        assert!(reassembler.insert(sender(1), before_wrap[0].clone()).is_none());
        // Sequence 0 follows u32::MAX, so it replaces the pending message
        assert!(reassembler.insert(sender(1), after_wrap[0].clone()).is_none());
        assert!(reassembler.insert(sender(1), before_wrap[1].clone()).is_none());
        assert!(reassembler.insert(sender(1), after_wrap[1].clone()).is_some());
    }

    #[test]
    fn test_senders_are_independent() {
        let payload = vec![1u8; 70_000];
        let datagrams = encode("MAP", &payload, 5).unwrap();
        let frags = fragments(&datagrams);

        let mut reassembler = Reassembler::new();
        assert!(reassembler.insert(sender(1), frags[0].clone()).is_none());
        assert!(reassembler.insert(sender(2), frags[0].clone()).is_none());
        assert_eq!(reassembler.pending(), 2);
        assert!(reassembler.insert(sender(2), frags[1].clone()).is_some());
        assert_eq!(reassembler.pending(), 1);
    }

    #[test]
    fn test_duplicate_fragment_ignored() {
        let payload = vec![3u8; 70_000];
        let datagrams = encode("MAP", &payload, 5).unwrap();
        let frags = fragments(&datagrams);

        let mut reassembler = Reassembler::new();
        assert!(reassembler.insert(sender(1), frags[1].clone()).is_none());
        assert!(reassembler.insert(sender(1), frags[1].clone()).is_none());
        assert!(reassembler.insert(sender(1), frags[0].clone()).is_some());
    }

    #[test]
    fn test_rejects_malformed_datagrams() {
        assert_eq!(parse(b"LC02"), Err(PacketError::TooShort(4)));
        assert_eq!(parse(b"XXXX\0\0\0\0chan\0"), Err(PacketError::BadMagic(0x5858_5858)));
        assert_eq!(parse(b"LC02\0\0\0\x01no-terminator"), Err(PacketError::BadChannel));

        let mut fragment = encode("MAP", &vec![0u8; 70_000], 1).unwrap().remove(1);
        // fragment_no past fragment_count
        fragment[16..18].copy_from_slice(&9u16.to_be_bytes());
        assert!(matches!(parse(&fragment), Err(PacketError::BadFragment(_))));
    }

    #[test]
    fn test_channel_name_limit() {
        let long = "C".repeat(CHANNEL_MAX_LENGTH + 1);
        assert_eq!(encode(&long, b"", 0), Err(PacketError::ChannelTooLong));
    }
}
