use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Salted password digest as stored on the users table.
#[derive(Debug, Clone)]
pub struct PasswordHash {
    pub hash: String,
    pub salt: String,
}

impl PasswordHash {
    pub fn new(password: &str) -> Self {
        let salt = Uuid::new_v4().simple().to_string();
        Self {
            hash: digest(&salt, password),
            salt,
        }
    }
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn verify_password(password: &str, salt: &str, expected: &str) -> bool {
    let actual = digest(salt, password);
    if actual.len() != expected.len() {
        return false;
    }
    actual
        .bytes()
        .zip(expected.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
