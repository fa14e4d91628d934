//! Signing identities for ledger gateway clients.
//!
//! Real deployments load X.509 material issued by a membership service
//! provider. This crate models the parts the gateway needs (MSP id,
//! certificate, signing key, fingerprint) with deterministic, test-friendly
//! key derivation so sessions can be opened without a certificate authority.

pub mod wallet;

pub use wallet::{InMemoryWallet, Wallet};

use base64::{engine::general_purpose, Engine as _};
use rand::{rngs::OsRng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha2::{Digest, Sha256};
use std::fmt::{self, Display};

/// Result type exposed by identity APIs.
pub type Result<T> = std::result::Result<T, IdentityError>;

/// Errors returned by identities and wallets.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("verification failed")]
    VerificationFailed,
    #[error("invalid identity: {0}")]
    Invalid(String),
    #[error("wallet error: {0}")]
    Wallet(String),
}

/// Digest of an identity's public key, used to recognise a client on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn from_public_key(public_key: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(public_key);
        let digest = hasher.finalize();
        Self(general_purpose::STANDARD_NO_PAD.encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Detached signature produced by [`Identity::sign`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Signature(String);

impl Signature {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A client identity: organization membership plus signing material.
#[derive(Clone)]
pub struct Identity {
    msp_id: String,
    certificate: String,
    public_key: Vec<u8>,
    private_key: Vec<u8>,
    fingerprint: Fingerprint,
}

impl Identity {
    /// Creates an identity with key material drawn from OS randomness.
    pub fn generate(msp_id: impl Into<String>) -> Result<Self> {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        Self::from_seed(msp_id, &seed)
    }

    /// Derives an identity deterministically from an arbitrary seed.
    pub fn from_seed(msp_id: impl Into<String>, seed: &[u8]) -> Result<Self> {
        let mut seed_bytes = [0u8; 32];
        if seed.len() >= 32 {
            seed_bytes.copy_from_slice(&seed[..32]);
        } else {
            let mut hasher = Sha256::new();
            hasher.update(seed);
            seed_bytes.copy_from_slice(&hasher.finalize()[..32]);
        }

        let mut rng = ChaCha20Rng::from_seed(seed_bytes);
        let mut private_key = vec![0u8; 64];
        rng.fill_bytes(&mut private_key);

        let msp_id = msp_id.into();
        let public_key = derive_public_key(&private_key);
        let certificate = encode_certificate(&msp_id, &public_key);
        Self::assemble(msp_id, certificate, public_key, private_key)
    }

    /// Wraps existing credential material, as loaded from a wallet.
    pub fn new(
        msp_id: impl Into<String>,
        certificate: impl Into<String>,
        private_key: Vec<u8>,
    ) -> Result<Self> {
        let public_key = derive_public_key(&private_key);
        Self::assemble(msp_id.into(), certificate.into(), public_key, private_key)
    }

    fn assemble(
        msp_id: String,
        certificate: String,
        public_key: Vec<u8>,
        private_key: Vec<u8>,
    ) -> Result<Self> {
        if msp_id.trim().is_empty() {
            return Err(IdentityError::Invalid("MSP id must not be empty".into()));
        }
        if certificate.trim().is_empty() {
            return Err(IdentityError::Invalid("certificate must not be empty".into()));
        }
        if private_key.is_empty() {
            return Err(IdentityError::Invalid("private key must not be empty".into()));
        }

        let fingerprint = Fingerprint::from_public_key(&public_key);
        Ok(Self {
            msp_id,
            certificate,
            public_key,
            private_key,
            fingerprint,
        })
    }

    pub fn msp_id(&self) -> &str {
        &self.msp_id
    }

    pub fn certificate(&self) -> &str {
        &self.certificate
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Produce a deterministic signature over `message`.
    pub fn sign(&self, message: &[u8]) -> Signature {
        let mut hasher = Sha256::new();
        hasher.update(&self.private_key);
        hasher.update(message);
        Signature(general_purpose::STANDARD_NO_PAD.encode(hasher.finalize()))
    }

    /// Verify a signature created by [`Identity::sign`].
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<()> {
        if self.sign(message) == *signature {
            Ok(())
        } else {
            Err(IdentityError::VerificationFailed)
        }
    }
}

// Private key stays out of logs.
impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("msp_id", &self.msp_id)
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

fn derive_public_key(private_key: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(private_key);
    hasher.finalize().to_vec()
}

fn encode_certificate(msp_id: &str, public_key: &[u8]) -> String {
    let mut body = msp_id.as_bytes().to_vec();
    body.push(0);
    body.extend_from_slice(public_key);
    format!(
        "-----BEGIN CERTIFICATE-----\n{}\n-----END CERTIFICATE-----\n",
        general_purpose::STANDARD.encode(body)
    )
}
