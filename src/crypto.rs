//! Credential hashing and key material.
//!
//! Passwords are stored as argon2id PHC strings with a fresh random salt per
//! hash. Verification honours the parameters embedded in the digest, so cost
//! settings can change without invalidating existing hashes.

use argon2::{Algorithm, Argon2, Params, PasswordHasher, PasswordVerifier, Version};
use password_hash::{PasswordHash, SaltString};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("password does not match digest")]
    Mismatch,
    #[error("malformed digest: {0}")]
    MalformedDigest(String),
    #[error("invalid hashing parameters: {0}")]
    InvalidParams(String),
    #[error("hashing failed: {0}")]
    Hash(String),
    #[error("random source unavailable: {0}")]
    Random(String),
}

/// Argon2 cost parameters. Defaults follow the argon2 crate's recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CryptoService {
    params: Params,
}

impl CryptoService {
    pub fn new(params: HashParams) -> Result<Self, CryptoError> {
        let params = Params::new(params.memory_kib, params.iterations, params.parallelism, None)
            .map_err(|e| CryptoError::InvalidParams(e.to_string()))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash `plaintext` into a PHC string. Two calls with the same input yield
    /// different digests because each draws its own salt.
    pub fn hash(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut salt_bytes = [0u8; 16];
        getrandom::getrandom(&mut salt_bytes).map_err(|e| CryptoError::Random(e.to_string()))?;
        let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| CryptoError::Hash(e.to_string()))?;
        let phc = self
            .argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| CryptoError::Hash(e.to_string()))?
            .to_string();
        Ok(phc)
    }

    /// Check `plaintext` against a stored digest. The final output comparison
    /// inside argon2 is constant-time.
    pub fn verify(&self, digest: &str, plaintext: &str) -> Result<(), CryptoError> {
        let parsed = PasswordHash::new(digest).map_err(|e| CryptoError::MalformedDigest(e.to_string()))?;
        match self.argon2().verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(()),
            Err(password_hash::Error::Password) => Err(CryptoError::Mismatch),
            Err(e) => Err(CryptoError::MalformedDigest(e.to_string())),
        }
    }

    /// Returns an error unless `digest` parses as a PHC string.
    pub fn check_digest(digest: &str) -> Result<(), CryptoError> {
        PasswordHash::new(digest)
            .map(|_| ())
            .map_err(|e| CryptoError::MalformedDigest(e.to_string()))
    }

    /// Random bytes from the OS, used as signing key material.
    pub fn generate_key(&self, len: usize) -> Result<Vec<u8>, CryptoError> {
        let mut buf = vec![0u8; len];
        getrandom::getrandom(&mut buf).map_err(|e| CryptoError::Random(e.to_string()))?;
        Ok(buf)
    }
}

#[cfg(test)]
pub(crate) fn test_crypto() -> CryptoService {
    CryptoService::new(HashParams { memory_kib: 1024, iterations: 1, parallelism: 1 }).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_succeeds() {
        let c = test_crypto();
        let d = c.hash("pw123").unwrap();
        assert!(d.starts_with("$argon2id$"));
        c.verify(&d, "pw123").unwrap();
    }

    #[test]
    fn wrong_password_is_mismatch() {
        let c = test_crypto();
        let d = c.hash("pw123").unwrap();
        assert_eq!(c.verify(&d, "pw124"), Err(CryptoError::Mismatch));
        assert_eq!(c.verify(&d, ""), Err(CryptoError::Mismatch));
    }

    #[test]
    fn same_plaintext_gets_distinct_salts() {
        let c = test_crypto();
        let a = c.hash("same").unwrap();
        let b = c.hash("same").unwrap();
        assert_ne!(a, b);
        c.verify(&a, "same").unwrap();
        c.verify(&b, "same").unwrap();
    }

    #[test]
    fn garbage_digest_is_malformed() {
        let c = test_crypto();
        assert!(matches!(c.verify("not-a-phc-string", "x"), Err(CryptoError::MalformedDigest(_))));
        assert!(CryptoService::check_digest("plaintext").is_err());
    }

    #[test]
    fn verify_uses_digest_parameters() {
        let cheap = test_crypto();
        let d = cheap.hash("pw").unwrap();
        let other = CryptoService::new(HashParams { memory_kib: 2048, iterations: 2, parallelism: 1 }).unwrap();
        other.verify(&d, "pw").unwrap();
    }

    #[test]
    fn bad_params_rejected() {
        let r = CryptoService::new(HashParams { memory_kib: 1, iterations: 0, parallelism: 0 });
        assert!(matches!(r, Err(CryptoError::InvalidParams(_))));
    }

    #[test]
    fn generate_key_has_requested_length() {
        let c = test_crypto();
        let k = c.generate_key(64).unwrap();
        assert_eq!(k.len(), 64);
        assert_ne!(k, c.generate_key(64).unwrap());
    }
}
