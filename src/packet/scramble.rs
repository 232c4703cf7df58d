//! RSA key pairs for the login handshake.
//!
//! The client gets the public modulus in `Init`, but not as-is: it's put
//! through a fixed byte permutation first. The permutation is public and
//! trivially reversible, so it only obfuscates the key and adds nothing to
//! the security of the exchange. It exists because the client expects it.

use std::fmt;
use std::sync::Arc;

use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, RsaPrivateKey};

use crate::error::PacketError;

/// Size of the modulus (and of every RSA block), in bytes.
pub const MODULUS_SIZE: usize = 0x80;

/// Size of the modulus field in `Init`, the tail is zeroes.
pub const SCRAMBLED_MODULUS_FIELD_SIZE: usize = 0x90;

const KEY_BITS: usize = MODULUS_SIZE * 8;
const PUBLIC_EXPONENT: u32 = 65537;

const ACCOUNT_OFFSET: usize = 0x5e;
const ACCOUNT_SIZE: usize = 14;
const PASSWORD_OFFSET: usize = 0x6c;
const PASSWORD_SIZE: usize = 16;

/// Scrambles a big-endian 128 byte modulus in place.
pub fn scramble_modulus(modulus: &mut [u8; MODULUS_SIZE]) {
    for i in 0..4 {
        modulus.swap(i, 0x4d + i);
    }

    for i in 0..0x40 {
        modulus[i] ^= modulus[0x40 + i];
    }

    for i in 0..4 {
        modulus[0x0d + i] ^= modulus[0x34 + i];
    }

    for i in 0..0x40 {
        modulus[0x40 + i] ^= modulus[i];
    }
}

/// Undoes `scramble_modulus`, this is what the client does with `Init`.
pub fn unscramble_modulus(modulus: &mut [u8; MODULUS_SIZE]) {
    for i in 0..0x40 {
        modulus[0x40 + i] ^= modulus[i];
    }

    for i in 0..4 {
        modulus[0x0d + i] ^= modulus[0x34 + i];
    }

    for i in 0..0x40 {
        modulus[i] ^= modulus[0x40 + i];
    }

    for i in 0..4 {
        modulus.swap(i, 0x4d + i);
    }
}

/// Left pads a big-endian number to a full RSA block.
fn to_block(value: &BigUint) -> Result<[u8; MODULUS_SIZE], PacketError> {
    let bytes = value.to_bytes_be();
    if bytes.len() > MODULUS_SIZE {
        return Err(PacketError::Cipher(format!(
            "{} byte value doesn't fit in an RSA block",
            bytes.len()
        )));
    }

    let mut block = [0u8; MODULUS_SIZE];
    block[MODULUS_SIZE - bytes.len()..].copy_from_slice(&bytes);
    Ok(block)
}

/// One RSA key pair together with its scrambled modulus, ready to be sent.
pub struct ScrambledKeyPair {
    private_key: RsaPrivateKey,
    scrambled_modulus: [u8; MODULUS_SIZE],
}

impl fmt::Debug for ScrambledKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScrambledKeyPair").finish_non_exhaustive()
    }
}

impl ScrambledKeyPair {
    pub fn generate() -> Result<Self, rsa::Error> {
        let mut rng = rand::thread_rng();
        let private_key =
            RsaPrivateKey::new_with_exp(&mut rng, KEY_BITS, &BigUint::from(PUBLIC_EXPONENT))?;

        Ok(Self::from_private_key(private_key))
    }

    /// Panics if the key isn't 1024 bits, callers only ever pass keys from `generate`.
    fn from_private_key(private_key: RsaPrivateKey) -> Self {
        let mut scrambled_modulus = [0u8; MODULUS_SIZE];
        let modulus = private_key.n().to_bytes_be();
        scrambled_modulus[MODULUS_SIZE - modulus.len()..].copy_from_slice(&modulus);
        scramble_modulus(&mut scrambled_modulus);

        Self {
            private_key,
            scrambled_modulus,
        }
    }

    pub fn scrambled_modulus(&self) -> &[u8; MODULUS_SIZE] {
        &self.scrambled_modulus
    }

    /// The modulus field of `Init`.
    pub fn modulus_field(&self) -> [u8; SCRAMBLED_MODULUS_FIELD_SIZE] {
        let mut field = [0u8; SCRAMBLED_MODULUS_FIELD_SIZE];
        field[..MODULUS_SIZE].copy_from_slice(&self.scrambled_modulus);
        field
    }

    /// Raw (unpadded) RSA decryption of one block.
    pub fn decrypt_block(
        &self,
        block: &[u8; MODULUS_SIZE],
    ) -> Result<[u8; MODULUS_SIZE], PacketError> {
        let cipher = BigUint::from_bytes_be(block);
        if &cipher >= self.private_key.n() {
            return Err(PacketError::Cipher(
                "RSA block is larger than the modulus".to_string(),
            ));
        }

        to_block(&cipher.modpow(self.private_key.d(), self.private_key.n()))
    }

    pub fn decrypt_credentials(
        &self,
        block: &[u8; MODULUS_SIZE],
    ) -> Result<Credentials, PacketError> {
        let plain = self.decrypt_block(block)?;
        Ok(Credentials::from_block(&plain))
    }
}

/// Client side of the exchange: encrypts `block` with the public key described
/// by a scrambled modulus as it was received in `Init`.
pub fn encrypt_block(
    scrambled_modulus: &[u8; MODULUS_SIZE],
    block: &[u8; MODULUS_SIZE],
) -> Result<[u8; MODULUS_SIZE], PacketError> {
    let mut modulus = *scrambled_modulus;
    unscramble_modulus(&mut modulus);

    let modulus = BigUint::from_bytes_be(&modulus);
    let plain = BigUint::from_bytes_be(block);
    if plain >= modulus {
        return Err(PacketError::Cipher(
            "RSA block is larger than the modulus".to_string(),
        ));
    }

    to_block(&plain.modpow(&BigUint::from(PUBLIC_EXPONENT), &modulus))
}

/// Account name and password as carried in the `RequestAuthLogin` block.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub account: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    pub fn new(account: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            password: password.into(),
        }
    }

    /// Account names are case insensitive, so they're lowercased here.
    pub fn from_block(block: &[u8; MODULUS_SIZE]) -> Self {
        let account = crate::common::read_string(
            &block[ACCOUNT_OFFSET..ACCOUNT_OFFSET + ACCOUNT_SIZE],
        );
        let password = crate::common::read_string(
            &block[PASSWORD_OFFSET..PASSWORD_OFFSET + PASSWORD_SIZE],
        );

        Self {
            account: account.to_lowercase(),
            password,
        }
    }

    /// Builds the plaintext block. Longer names and passwords are cut off
    /// at their field size.
    pub fn to_block(&self) -> [u8; MODULUS_SIZE] {
        let mut block = [0u8; MODULUS_SIZE];

        let account = self.account.as_bytes();
        let len = account.len().min(ACCOUNT_SIZE);
        block[ACCOUNT_OFFSET..ACCOUNT_OFFSET + len].copy_from_slice(&account[..len]);

        let password = self.password.as_bytes();
        let len = password.len().min(PASSWORD_SIZE);
        block[PASSWORD_OFFSET..PASSWORD_OFFSET + len].copy_from_slice(&password[..len]);

        block
    }
}

/// Key pairs are expensive to generate, so a handful are made at startup and
/// every connection picks one at random.
#[derive(Clone, Debug)]
pub struct KeyPairPool {
    pairs: Vec<Arc<ScrambledKeyPair>>,
}

impl KeyPairPool {
    pub fn generate(count: usize) -> Result<Self, rsa::Error> {
        let pairs = (0..count.max(1))
            .map(|_| ScrambledKeyPair::generate().map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { pairs })
    }

    /// Returns `None` when `pairs` is empty.
    pub fn from_pairs(pairs: Vec<Arc<ScrambledKeyPair>>) -> Option<Self> {
        if pairs.is_empty() {
            return None;
        }

        Some(Self { pairs })
    }

    pub fn pick(&self) -> Arc<ScrambledKeyPair> {
        self.pairs[fastrand::usize(..self.pairs.len())].clone()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Generating a key pair takes a while, so unit tests share a single one.
#[cfg(test)]
pub(crate) fn test_key_pair() -> Arc<ScrambledKeyPair> {
    use std::sync::OnceLock;

    static KEY_PAIR: OnceLock<Arc<ScrambledKeyPair>> = OnceLock::new();
    KEY_PAIR
        .get_or_init(|| Arc::new(ScrambledKeyPair::generate().unwrap()))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scramble_is_reversible() {
        let mut modulus = [0u8; MODULUS_SIZE];
        for (i, byte) in modulus.iter_mut().enumerate() {
            *byte = (i as u8).wrapping_mul(37).wrapping_add(11);
        }
        let original = modulus;

        scramble_modulus(&mut modulus);
        assert_ne!(modulus, original);

        unscramble_modulus(&mut modulus);
        assert_eq!(modulus, original);
    }

    #[test]
    fn scramble_swaps_then_xors() {
        let mut modulus = [0u8; MODULUS_SIZE];
        modulus[0x4d] = 0xAB;
        scramble_modulus(&mut modulus);

        // the byte moved to the front, and the last step mirrored it to 0x40
        assert_eq!(modulus[0], 0xAB);
        assert_eq!(modulus[0x40], 0xAB);
        assert_eq!(modulus[0x4d], 0);
    }

    #[test]
    fn scrambled_modulus_matches_the_key() {
        let pair = test_key_pair();

        let mut modulus = *pair.scrambled_modulus();
        unscramble_modulus(&mut modulus);
        assert_eq!(BigUint::from_bytes_be(&modulus), *pair.private_key.n());

        let field = pair.modulus_field();
        assert_eq!(&field[..MODULUS_SIZE], pair.scrambled_modulus());
        assert!(field[MODULUS_SIZE..].iter().all(|b| *b == 0));
    }

    #[test]
    fn credentials_round_trip_through_rsa() {
        let pair = test_key_pair();
        let credentials = Credentials::new("alice", "wonderland");

        let block = encrypt_block(pair.scrambled_modulus(), &credentials.to_block()).unwrap();
        assert_ne!(block, credentials.to_block());

        let decrypted = pair.decrypt_credentials(&block).unwrap();
        assert_eq!(decrypted, credentials);
    }

    #[test]
    fn account_names_are_lowercased() {
        let block = Credentials::new("Alice", "Secret").to_block();
        let credentials = Credentials::from_block(&block);
        assert_eq!(credentials.account, "alice");
        assert_eq!(credentials.password, "Secret");
    }

    #[test]
    fn long_fields_are_cut_off() {
        let block = Credentials::new("a".repeat(20), "p".repeat(20)).to_block();
        let credentials = Credentials::from_block(&block);
        assert_eq!(credentials.account.len(), ACCOUNT_SIZE);
        assert_eq!(credentials.password.len(), PASSWORD_SIZE);
    }

    #[test]
    fn block_above_the_modulus_is_rejected() {
        let pair = test_key_pair();
        assert!(matches!(
            pair.decrypt_block(&[0xFF; MODULUS_SIZE]),
            Err(PacketError::Cipher(_))
        ));
    }

    #[test]
    fn pool_needs_a_pair() {
        assert!(KeyPairPool::from_pairs(Vec::new()).is_none());

        let pool = KeyPairPool::from_pairs(vec![test_key_pair()]).unwrap();
        assert_eq!(pool.len(), 1);
        assert!(Arc::ptr_eq(&pool.pick(), &test_key_pair()));
    }
}
