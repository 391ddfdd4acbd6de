// Licensed under the Apache-2.0 license

//! Obfuscation of status records at rest.
//!
//! The key is derived from a fixed salt, so this only protects against
//! casual inspection of a flash dump. Block 0 (the record header) is
//! encrypted on its own so that headers can be decrypted without reading
//! the body; the remaining blocks are chained from a fixed IV.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Block};
use mcu_error::McuError;
use md5::{Digest, Md5};
use zeroize::{Zeroize, Zeroizing};

pub const BLOCK_SIZE: usize = 16;
const KEY_SIZE: usize = 16;
const CHAIN_IV: [u8; BLOCK_SIZE] = [0x5a; BLOCK_SIZE];

/// Salt baked into the bootloader for status record keys. Records written
/// by deployed W51x bootloaders use the same salt.
pub const STATUS_KEY_SALT: &[u8] = b"sys_gigadevice";

/// In-place block cipher used for status records. Inputs must be a non-zero
/// multiple of [`BLOCK_SIZE`].
pub trait RecordCipher {
    fn encrypt(&self, data: &mut [u8]) -> Result<(), McuError>;

    fn decrypt(&self, data: &mut [u8]) -> Result<(), McuError>;
}

pub struct SaltedAes128 {
    salt: [u8; KEY_SIZE],
}

impl SaltedAes128 {
    /// Salts longer than 16 bytes are truncated, shorter ones zero-padded.
    pub fn new(salt: &[u8]) -> Self {
        let mut padded = [0u8; KEY_SIZE];
        let len = salt.len().min(KEY_SIZE);
        padded[..len].copy_from_slice(&salt[..len]);
        SaltedAes128 { salt: padded }
    }

    /// MD5 of the zero-padded salt.
    fn key(&self) -> Zeroizing<[u8; KEY_SIZE]> {
        let mut digest = Md5::digest(self.salt);
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        key.copy_from_slice(&digest);
        digest.as_mut_slice().zeroize();
        key
    }

    fn cipher(&self) -> Aes128 {
        Aes128::new(&(*self.key()).into())
    }
}

impl Default for SaltedAes128 {
    fn default() -> Self {
        SaltedAes128::new(STATUS_KEY_SALT)
    }
}

fn check_blocks(data: &[u8]) -> Result<(), McuError> {
    if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
        return Err(McuError::Crypto(data.len()));
    }
    Ok(())
}

impl RecordCipher for SaltedAes128 {
    fn encrypt(&self, data: &mut [u8]) -> Result<(), McuError> {
        check_blocks(data)?;
        let cipher = self.cipher();
        let (first, rest) = data.split_at_mut(BLOCK_SIZE);
        cipher.encrypt_block(Block::from_mut_slice(first));

        let mut prev = CHAIN_IV;
        for block in rest.chunks_exact_mut(BLOCK_SIZE) {
            block.iter_mut().zip(prev.iter()).for_each(|(b, p)| *b ^= p);
            cipher.encrypt_block(Block::from_mut_slice(block));
            prev.copy_from_slice(block);
        }
        Ok(())
    }

    fn decrypt(&self, data: &mut [u8]) -> Result<(), McuError> {
        check_blocks(data)?;
        let cipher = self.cipher();
        let (first, rest) = data.split_at_mut(BLOCK_SIZE);
        cipher.decrypt_block(Block::from_mut_slice(first));

        let mut prev = CHAIN_IV;
        for block in rest.chunks_exact_mut(BLOCK_SIZE) {
            let mut saved = [0u8; BLOCK_SIZE];
            saved.copy_from_slice(block);
            cipher.decrypt_block(Block::from_mut_slice(block));
            block.iter_mut().zip(prev.iter()).for_each(|(b, p)| *b ^= p);
            prev = saved;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_various_lengths() {
        let cipher = SaltedAes128::default();
        for blocks in [1usize, 2, 5, 256] {
            let plain: Vec<u8> = (0..blocks * BLOCK_SIZE).map(|i| (i * 7) as u8).collect();
            let mut data = plain.clone();
            cipher.encrypt(&mut data).unwrap();
            assert_ne!(data, plain);
            cipher.decrypt(&mut data).unwrap();
            assert_eq!(data, plain);
        }
    }

    #[test]
    fn test_first_block_decrypts_alone() {
        let cipher = SaltedAes128::default();
        let plain = [0x42u8; 4 * BLOCK_SIZE];
        let mut data = plain;
        cipher.encrypt(&mut data).unwrap();

        let mut head = [0u8; BLOCK_SIZE];
        head.copy_from_slice(&data[..BLOCK_SIZE]);
        cipher.decrypt(&mut head).unwrap();
        assert_eq!(head, plain[..BLOCK_SIZE]);
    }

    #[test]
    fn test_identical_blocks_encrypt_differently_after_the_first() {
        let cipher = SaltedAes128::default();
        let mut data = [0u8; 3 * BLOCK_SIZE];
        cipher.encrypt(&mut data).unwrap();
        assert_ne!(data[BLOCK_SIZE..2 * BLOCK_SIZE], data[2 * BLOCK_SIZE..]);
    }

    #[test]
    fn test_misaligned_input_is_crypto_error() {
        let cipher = SaltedAes128::default();
        let mut data = [0u8; 20];
        assert_eq!(cipher.encrypt(&mut data), Err(McuError::Crypto(20)));
        assert_eq!(cipher.decrypt(&mut []), Err(McuError::Crypto(0)));
        assert_eq!(data, [0u8; 20]);
    }

    #[test]
    fn test_matches_deployed_records() {
        let cipher = SaltedAes128::default();
        assert_eq!(
            *cipher.key(),
            [
                0x0f, 0x46, 0x16, 0xd1, 0xd3, 0x46, 0xac, 0xc9, 0xd1, 0x74, 0xa5, 0xff, 0xf0, 0x47,
                0x85, 0x81
            ]
        );

        let mut data = [0u8; 2 * BLOCK_SIZE];
        cipher.encrypt(&mut data).unwrap();
        assert_eq!(
            data,
            [
                0x5c, 0x1a, 0xe7, 0x16, 0xbc, 0xf0, 0x7b, 0x30, 0x86, 0x46, 0xcb, 0x15, 0xca, 0xbc,
                0x09, 0x3b, 0xe5, 0xf2, 0x82, 0xae, 0x8f, 0xaa, 0x1e, 0x00, 0x2f, 0x7c, 0x62, 0x10,
                0xcb, 0x79, 0x13, 0x32
            ]
        );
    }

    #[test]
    fn test_salt_changes_key() {
        let mut a = [0u8; BLOCK_SIZE];
        let mut b = [0u8; BLOCK_SIZE];
        SaltedAes128::new(b"one").encrypt(&mut a).unwrap();
        SaltedAes128::new(b"two").encrypt(&mut b).unwrap();
        assert_ne!(a, b);
    }
}
