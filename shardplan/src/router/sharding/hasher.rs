//! Distribution column hashing.
//!
//! The Postgres hasher reproduces `hashint8`, `hashtext` and `uuid_hash`
//! (Bob Jenkins' lookup3, little-endian byte order), so tokens computed
//! here match the hash partitioning done on the workers.

use sha1::{Digest, Sha1};

use crate::catalog::Hasher;
use crate::query::Datum;

const SEED: u32 = 0x9e3779b9u32.wrapping_add(3923095);

#[inline]
fn mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *a = a.wrapping_sub(*c);
    *a ^= c.rotate_left(4);
    *c = c.wrapping_add(*b);
    *b = b.wrapping_sub(*a);
    *b ^= a.rotate_left(6);
    *a = a.wrapping_add(*c);
    *c = c.wrapping_sub(*b);
    *c ^= b.rotate_left(8);
    *b = b.wrapping_add(*a);
    *a = a.wrapping_sub(*c);
    *a ^= c.rotate_left(16);
    *c = c.wrapping_add(*b);
    *b = b.wrapping_sub(*a);
    *b ^= a.rotate_left(19);
    *a = a.wrapping_add(*c);
    *c = c.wrapping_sub(*b);
    *c ^= b.rotate_left(4);
    *b = b.wrapping_add(*a);
}

#[inline]
fn finish(a: &mut u32, b: &mut u32, c: &mut u32) {
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(14));
    *a ^= *c;
    *a = a.wrapping_sub(c.rotate_left(11));
    *b ^= *a;
    *b = b.wrapping_sub(a.rotate_left(25));
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(16));
    *a ^= *c;
    *a = a.wrapping_sub(c.rotate_left(4));
    *b ^= *a;
    *b = b.wrapping_sub(a.rotate_left(14));
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(24));
}

/// `hash_uint32`.
pub fn hash_uint32(k: u32) -> u32 {
    let mut a = SEED.wrapping_add(4);
    let mut b = a;
    let mut c = a;
    a = a.wrapping_add(k);
    finish(&mut a, &mut b, &mut c);
    c
}

/// `hash_any` over arbitrary bytes.
pub fn hash_bytes(key: &[u8]) -> u32 {
    let mut a = SEED.wrapping_add(key.len() as u32);
    let mut b = a;
    let mut c = a;

    let word = |bytes: &[u8]| u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);

    let mut chunks = key.chunks_exact(12);
    for chunk in &mut chunks {
        a = a.wrapping_add(word(&chunk[0..4]));
        b = b.wrapping_add(word(&chunk[4..8]));
        c = c.wrapping_add(word(&chunk[8..12]));
        mix(&mut a, &mut b, &mut c);
    }

    // Lowest byte of c is reserved for the length.
    let tail = chunks.remainder();
    for (i, byte) in tail.iter().enumerate() {
        let byte = *byte as u32;
        match i {
            0..=3 => a = a.wrapping_add(byte << (8 * i)),
            4..=7 => b = b.wrapping_add(byte << (8 * (i - 4))),
            _ => c = c.wrapping_add(byte << (8 * (i - 7))),
        }
    }

    finish(&mut a, &mut b, &mut c);
    c
}

/// `hashint8`. Equal to `hashint4` for values that fit in 32 bits.
pub fn hash_int8(value: i64) -> u32 {
    let mut low = value as u32;
    let high = (value >> 32) as u32;
    low ^= if value >= 0 { high } else { !high };
    hash_uint32(low)
}

fn sha1(bytes: &[u8]) -> i32 {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    i32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Hash token of a distribution column value. NULLs have no token.
pub fn token(hasher: Hasher, value: &Datum) -> Option<i32> {
    let token = match hasher {
        Hasher::Postgres => match value {
            Datum::Null => return None,
            Datum::Bool(value) => hash_uint32(*value as u32) as i32,
            Datum::Integer(value) => hash_int8(*value) as i32,
            Datum::Text(value) => hash_bytes(value.as_bytes()) as i32,
            Datum::Uuid(value) => hash_bytes(value.as_bytes()) as i32,
        },

        Hasher::Sha1 => match value {
            Datum::Null => return None,
            Datum::Bool(value) => sha1(&[*value as u8]),
            Datum::Integer(value) => sha1(value.to_string().as_bytes()),
            Datum::Text(value) => sha1(value.as_bytes()),
            Datum::Uuid(value) => sha1(value.as_bytes()),
        },
    };

    Some(token)
}
