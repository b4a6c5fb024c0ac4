use sha2::{Digest, Sha256, Sha512};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Algorithm {
    #[default]
    Sha256,
    Sha512,
}

/// Hex digest of `input`.
pub fn hash(input: &str, algo: Algorithm) -> String {
    match algo {
        Algorithm::Sha256 => hex::encode(Sha256::digest(input.as_bytes())),
        Algorithm::Sha512 => hex::encode(Sha512::digest(input.as_bytes())),
    }
}
