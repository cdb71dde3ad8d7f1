//! Packet assembly and parsing: §4.1's `encode`/`decode` pair.
//!
//! `decode` never panics or propagates a decryption error through the
//! boundary — every rejection reason is a `DecodeError` variant so callers
//! (the transport layer) can tell corruption apart from a short read.

use crate::{crypto, Header, Key, PacketType, HEADER_SIZE, IV_SIZE, MAGIC};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Eq, PartialEq)]
pub enum DecodeError {
    TooShort,
    BadMagic,
    UnknownType(u8),
    LengthMismatch,
    ChecksumMismatch,
}

/// Per-sender sequence counter. `seq` is diagnostic only (spec §4.1: "not
/// required for ordering on a stream transport"), but must still be
/// monotonic modulo 2^32 per sender, so each connection direction owns one.
pub struct SeqCounter(AtomicU32);

impl SeqCounter {
    #[inline]
    pub fn new() -> SeqCounter {
        SeqCounter(AtomicU32::new(0))
    }

    #[inline]
    fn next(&self) -> u32 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for SeqCounter {
    fn default() -> SeqCounter {
        SeqCounter::new()
    }
}

fn checksum(header_prefix: &[u8], iv: &[u8], ciphertext: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(header_prefix);
    hasher.update(iv);
    hasher.update(ciphertext);
    hasher.finalize()
}

/// Draws the next `seq` from `counter`, encrypts `plaintext` under `key`
/// with a fresh IV, and assembles the full wire packet.
pub fn encode(counter: &SeqCounter, packet_type: PacketType, plaintext: &[u8], key: &Key) -> Vec<u8> {
    let seq = counter.next();
    let iv = crypto::random_iv();
    let ciphertext = crypto::encrypt(plaintext, key, &iv);
    let data_len = (IV_SIZE + ciphertext.len()) as u32;

    let mut header_prefix = Vec::with_capacity(HEADER_SIZE - 4);
    header_prefix.write_u32::<BigEndian>(MAGIC).unwrap();
    header_prefix.write_u32::<BigEndian>(seq).unwrap();
    header_prefix.write_u8(packet_type as u8).unwrap();
    header_prefix.write_u32::<BigEndian>(data_len).unwrap();

    let crc = checksum(&header_prefix, &iv, &ciphertext);

    let mut out = Vec::with_capacity(HEADER_SIZE + data_len as usize);
    out.extend_from_slice(&header_prefix);
    out.write_u32::<BigEndian>(crc).unwrap();
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    out
}

/// Parses and decrypts one complete wire packet. `bytes` must be exactly one
/// packet (header + iv + ciphertext); the transport layer is responsible
/// for reading exactly `data_len` payload bytes before calling this.
pub fn decode(bytes: &[u8], key: &Key) -> Result<(Header, Vec<u8>), DecodeError> {
    if bytes.len() < HEADER_SIZE {
        return Err(DecodeError::TooShort);
    }

    let mut cursor = Cursor::new(&bytes[..HEADER_SIZE]);
    let magic = cursor.read_u32::<BigEndian>().unwrap();
    let seq = cursor.read_u32::<BigEndian>().unwrap();
    let type_byte = cursor.read_u8().unwrap();
    let data_len = cursor.read_u32::<BigEndian>().unwrap();
    let checksum_field = cursor.read_u32::<BigEndian>().unwrap();

    if magic != MAGIC {
        return Err(DecodeError::BadMagic);
    }

    let packet_type = PacketType::from_byte(type_byte).ok_or(DecodeError::UnknownType(type_byte))?;

    if (data_len as usize) < IV_SIZE {
        return Err(DecodeError::LengthMismatch);
    }
    if bytes.len() - HEADER_SIZE != data_len as usize {
        return Err(DecodeError::LengthMismatch);
    }

    let body = &bytes[HEADER_SIZE..];
    let iv_slice = &body[..IV_SIZE];
    let ciphertext = &body[IV_SIZE..];

    let expected = checksum(&bytes[..HEADER_SIZE - 4], iv_slice, ciphertext);
    if expected != checksum_field {
        return Err(DecodeError::ChecksumMismatch);
    }

    let mut iv = [0u8; IV_SIZE];
    iv.copy_from_slice(iv_slice);

    let plaintext = crypto::decrypt(ciphertext, key, &iv);

    Ok((
        Header {
            magic,
            seq,
            packet_type,
            data_len,
            checksum: checksum_field,
        },
        plaintext,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> Key {
        Key::new([7u8; Key::SIZE])
    }

    #[test]
    fn roundtrip_preserves_plaintext() {
        let counter = SeqCounter::new();
        let wire = encode(&counter, PacketType::Chat, b"hello, admiral", &key());
        let (header, plain) = decode(&wire, &key()).expect("valid packet");
        assert_eq!(header.packet_type, PacketType::Chat);
        assert_eq!(plain, b"hello, admiral");
    }

    #[test]
    fn seq_is_monotonic_per_encoder() {
        let counter = SeqCounter::new();
        let a = encode(&counter, PacketType::Heartbeat, b"", &key());
        let b = encode(&counter, PacketType::Heartbeat, b"", &key());
        let (ha, _) = decode(&a, &key()).unwrap();
        let (hb, _) = decode(&b, &key()).unwrap();
        assert_eq!(hb.seq, ha.seq + 1);
    }

    #[test]
    fn same_plaintext_yields_different_wire_bytes() {
        let counter = SeqCounter::new();
        let a = encode(&counter, PacketType::Move, b"B5", &key());
        let b = encode(&counter, PacketType::Move, b"B5", &key());
        // seq differs (covered above) but so must the IV/ciphertext region.
        assert_ne!(&a[HEADER_SIZE..], &b[HEADER_SIZE..]);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let counter = SeqCounter::new();
        let mut wire = encode(&counter, PacketType::Ack, b"", &key());
        wire[0] ^= 0xFF;
        assert_eq!(decode(&wire, &key()), Err(DecodeError::BadMagic));
    }

    #[test]
    fn truncated_header_is_rejected() {
        assert_eq!(decode(&[1, 2, 3], &key()), Err(DecodeError::TooShort));
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let counter = SeqCounter::new();
        let mut wire = encode(&counter, PacketType::Chat, b"hi", &key());
        wire.pop();
        assert_eq!(decode(&wire, &key()), Err(DecodeError::LengthMismatch));
    }

    #[test]
    fn flipped_ciphertext_byte_is_detected_with_overwhelming_probability() {
        let counter = SeqCounter::new();
        let wire = encode(&counter, PacketType::BoardUpdate, b"some board state text", &key());
        let mut failures = 0;
        for i in HEADER_SIZE..wire.len() {
            let mut corrupt = wire.clone();
            corrupt[i] ^= 0x01;
            if decode(&corrupt, &key()).is_ok() {
                failures += 1;
            }
        }
        assert_eq!(failures, 0, "checksum failed to catch a single-byte flip");
    }

    #[test]
    fn wrong_key_still_passes_checksum_but_yields_garbage_plaintext() {
        // Checksum guards integrity of the ciphertext, not who can read it;
        // a wrong key decodes successfully but produces different bytes.
        let counter = SeqCounter::new();
        let wire = encode(&counter, PacketType::Chat, b"hello, admiral", &key());
        let other_key = Key::new([9u8; Key::SIZE]);
        let (_, plain) = decode(&wire, &other_key).expect("checksum still matches");
        assert_ne!(plain, b"hello, admiral");
    }
}
