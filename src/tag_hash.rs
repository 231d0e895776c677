//! Constructor tags. A sexp does not store its constructor name, only a hash that packs the
//! name six bits per character, so a tag fits in a single unboxed word and can be turned back
//! into the name when a value is printed.

use crate::failure::{fail, Fault};

/// The 64 symbols a constructor name may use. The position of a symbol is its code.
pub const ALPHABET: &[u8; 64] =
    b"_abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789'";

const BITS_PER_CHAR: u32 = 6;
const CHAR_MASK: usize = (1 << BITS_PER_CHAR) - 1;

/// Longest name that still fits in an unboxed word.
pub const MAX_TAG_LEN: usize = (usize::BITS as usize - 1) / BITS_PER_CHAR as usize;

pub const CONS_TAG_HASH: usize = const_tag_hash("cons");
pub const NIL_TAG_HASH: usize = const_tag_hash("nil");

const fn position(c: u8) -> Option<usize> {
    let mut i = 0;
    while i < ALPHABET.len() {
        if ALPHABET[i] == c {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Compile-time [tag_hash]. Panics during const evaluation on a name it cannot encode.
pub const fn const_tag_hash(name: &str) -> usize {
    let bytes = name.as_bytes();
    assert!(bytes.len() <= MAX_TAG_LEN, "constructor name too long");

    let mut hash = 0;
    let mut i = 0;
    while i < bytes.len() {
        match position(bytes[i]) {
            Some(code) => hash = (hash << BITS_PER_CHAR) | code,
            None => panic!("character outside the tag alphabet"),
        }
        i += 1;
    }
    hash
}

/// Hashes a constructor name. Names that cannot be hashed or would not read back the same are
/// fatal.
pub fn tag_hash(name: &str) -> usize {
    let mut hash = 0usize;
    let mut count = 0;

    for c in name.chars() {
        let code = u8::try_from(c)
            .ok()
            .and_then(position)
            .unwrap_or_else(|| fail(Fault::TagHashCharacter(c)));
        hash = (hash << BITS_PER_CHAR) | code;

        count += 1;
        if count > MAX_TAG_LEN {
            fail(Fault::TagHashTooLong(name.to_string(), MAX_TAG_LEN));
        }
    }

    let back = de_hash(hash);
    if back != name {
        fail(Fault::TagHashMismatch(back, name.to_string()));
    }

    hash
}

/// Recovers the constructor name from a hash.
pub fn de_hash(mut hash: usize) -> String {
    let mut name = Vec::with_capacity(MAX_TAG_LEN);
    while hash != 0 {
        name.push(ALPHABET[hash & CHAR_MASK]);
        hash >>= BITS_PER_CHAR;
    }
    name.reverse();

    // Every alphabet symbol is ASCII.
    name.into_iter().map(char::from).collect()
}
