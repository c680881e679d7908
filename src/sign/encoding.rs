//! Low-level primitives used by the request signer
//!
//! - custom-alphabet base64 used for the `X-S` and `X-S-Common` payloads
//! - the `mrc` CRC32 variant embedded in `X-S-Common`
//! - MD5 hex digests of the string-to-sign
//! - random trace ids

use base64::{
    alphabet::Alphabet,
    engine::{general_purpose::PAD, GeneralPurpose},
    DecodeError, Engine,
};
use md5::{Digest, Md5};
use rand::Rng;

/// Alphabet the platform uses in place of standard base64
pub const XHS_ALPHABET: &str = "ZmserbBoHQtNP+wOcza/LpngG8yJq42KWYj0DSfdikx3VT16IlUAFM97hECvuRX5";

const ALPHABET: Alphabet = match Alphabet::new(XHS_ALPHABET) {
    Ok(alphabet) => alphabet,
    Err(_) => panic!("invalid signing alphabet"),
};

const ENGINE: GeneralPurpose = GeneralPurpose::new(&ALPHABET, PAD);

/// Number of leading bytes the `mrc` checksum scans
pub const MRC_WINDOW: usize = 57;

const TRACE_ID_CHARS: &[u8] = b"abcdef0123456789";
const TRACE_ID_LEN: usize = 16;

/// CRC32 (IEEE, reflected) lookup table
const CRC_TABLE: [u32; 256] = build_crc_table();

const fn build_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut c = i as u32;
        let mut k = 0;
        while k < 8 {
            c = if c & 1 != 0 {
                0xEDB8_8320 ^ (c >> 1)
            } else {
                c >> 1
            };
            k += 1;
        }
        table[i] = c;
        i += 1;
    }
    table
}

/// Encode bytes with the platform alphabet (padded)
pub fn b64_encode(input: impl AsRef<[u8]>) -> String {
    ENGINE.encode(input)
}

/// Decode a platform-alphabet base64 string
pub fn b64_decode(input: impl AsRef<[u8]>) -> Result<Vec<u8>, DecodeError> {
    ENGINE.decode(input)
}

/// CRC32 variant over at most the first [`MRC_WINDOW`] bytes of `input`
///
/// Runs the standard reflected CRC32 update starting from `-1`, then finalises
/// with `^ -1 ^ -306674912`.
pub fn mrc(input: &str) -> i32 {
    let mut o: u32 = 0xFFFF_FFFF;
    for &byte in input.as_bytes().iter().take(MRC_WINDOW) {
        o = CRC_TABLE[((o ^ byte as u32) & 0xFF) as usize] ^ (o >> 8);
    }
    (o as i32) ^ -1 ^ -306_674_912
}

/// Lower-case hex MD5 of `input`
pub fn md5_hex(input: impl AsRef<[u8]>) -> String {
    format!("{:x}", Md5::digest(input.as_ref()))
}

/// 16 random characters from `[a-f0-9]`
pub fn trace_id() -> String {
    let mut rng = rand::thread_rng();
    (0..TRACE_ID_LEN)
        .map(|_| TRACE_ID_CHARS[rng.gen_range(0..TRACE_ID_CHARS.len())] as char)
        .collect()
}
