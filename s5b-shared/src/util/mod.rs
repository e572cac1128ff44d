use rand::{Rng, rng};

const RUNES_ALPHA_NUMBER: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of a generated bytestream stream id.
pub const STREAM_ID_LEN: usize = 24;

/// Length of a generated transport candidate id.
pub const CANDIDATE_ID_LEN: usize = 16;

/// math_rand_alpha_number generates a random alphabet and number sequence of the requested length.
pub fn math_rand_alpha_number(n: usize) -> String {
    generate_random_string(n, RUNES_ALPHA_NUMBER)
}

/// Generates a fresh stream id for an outgoing bytestream offer.
pub fn generate_stream_id() -> String {
    math_rand_alpha_number(STREAM_ID_LEN)
}

/// Generates a candidate id, unique within one transport.
pub fn generate_candidate_id() -> String {
    math_rand_alpha_number(CANDIDATE_ID_LEN)
}

pub fn generate_random_string(n: usize, runes: &[u8]) -> String {
    let mut rng = rng();

    (0..n)
        .map(|_| {
            let idx = rng.random_range(0..runes.len());
            runes[idx] as char
        })
        .collect()
}
