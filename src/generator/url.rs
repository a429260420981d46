//! Random URL synthesis for message content.

use rand::rngs::OsRng;
use rand::Rng;

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const SCHEMES: [&str; 2] = ["http", "https"];
const TLDS: [&str; 4] = ["com", "net", "org", "io"];

fn rand_string(len: usize) -> String {
    let mut rng = OsRng;
    (0..len)
        .map(|_| LETTERS[rng.gen_range(0..LETTERS.len())] as char)
        .collect()
}

/// Produce a plausible-looking URL with random host, path and query.
pub fn random_url() -> String {
    let mut rng = OsRng;
    format!(
        "{}://{}.{}.{}/{}?{}={}",
        SCHEMES[rng.gen_range(0..SCHEMES.len())],
        rand_string(5),
        rand_string(8),
        TLDS[rng.gen_range(0..TLDS.len())],
        rand_string(10),
        rand_string(5),
        rand_string(5),
    )
}
