//! GP51 vendor API client: form-encoded POST actions against a fixed base
//! URL, JSON responses with a `status`/`cause` envelope (0 = success).

pub mod client;
pub mod types;

pub use client::{Gp51Api, Gp51Client};
pub use types::*;

use md5::{Digest, Md5};

/// The vendor login call takes an MD5 hex digest of the password, never the
/// plaintext.
pub fn hash_password(password: &str) -> String {
    hex::encode(Md5::digest(password.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_digest_is_md5_hex() {
        assert_eq!(hash_password(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(hash_password("abc"), "900150983cd24fb0d6963f7d28e17f72");
    }
}
