//! AES-128 primitives
//!
//! Thin wrappers around the `aes` and `cbc` crates for the two modes the
//! console formats use: single-block ECB (key verification) and unpadded
//! CBC (title keys and encrypted images).

use aes::Aes128;
use aes::cipher::block_padding::NoPadding;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit};

use crate::error::{CryptoError, CryptoResult};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// AES block size in bytes
pub const AES_BLOCK_SIZE: usize = 16;

/// AES-128 key size in bytes
pub const AES_128_KEY_SIZE: usize = 16;

/// Decrypt a single 16-byte block in place (ECB)
pub fn decrypt_ecb_block(key: &[u8; AES_128_KEY_SIZE], block: &mut [u8; AES_BLOCK_SIZE]) {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    cipher.decrypt_block(GenericArray::from_mut_slice(block));
}

/// Encrypt a single 16-byte block in place (ECB)
pub fn encrypt_ecb_block(key: &[u8; AES_128_KEY_SIZE], block: &mut [u8; AES_BLOCK_SIZE]) {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    cipher.encrypt_block(GenericArray::from_mut_slice(block));
}

/// Decrypt `data` in place with AES-128-CBC and no padding
///
/// `data.len()` must be a multiple of [`AES_BLOCK_SIZE`].
pub fn decrypt_cbc(key: &[u8], iv: &[u8], data: &mut [u8]) -> CryptoResult<()> {
    check_params(key, iv, data.len())?;
    let cipher = Aes128CbcDec::new_from_slices(key, iv)
        .map_err(|e| CryptoError::Cipher(format!("failed to create AES-128 cipher: {e}")))?;
    cipher
        .decrypt_padded_mut::<NoPadding>(data)
        .map_err(|e| CryptoError::Cipher(format!("AES-128 decryption failed: {e}")))?;
    Ok(())
}

/// Encrypt `data` in place with AES-128-CBC and no padding
pub fn encrypt_cbc(key: &[u8], iv: &[u8], data: &mut [u8]) -> CryptoResult<()> {
    check_params(key, iv, data.len())?;
    let len = data.len();
    let cipher = Aes128CbcEnc::new_from_slices(key, iv)
        .map_err(|e| CryptoError::Cipher(format!("failed to create AES-128 cipher: {e}")))?;
    cipher
        .encrypt_padded_mut::<NoPadding>(data, len)
        .map_err(|e| CryptoError::Cipher(format!("AES-128 encryption failed: {e}")))?;
    Ok(())
}

fn check_params(key: &[u8], iv: &[u8], len: usize) -> CryptoResult<()> {
    if key.len() != AES_128_KEY_SIZE {
        return Err(CryptoError::InvalidKeySize {
            expected: AES_128_KEY_SIZE,
            actual: key.len(),
        });
    }
    if iv.len() != AES_BLOCK_SIZE {
        return Err(CryptoError::InvalidIvSize {
            expected: AES_BLOCK_SIZE,
            actual: iv.len(),
        });
    }
    if len % AES_BLOCK_SIZE != 0 {
        return Err(CryptoError::UnalignedLength(len));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_fips197_vector() {
        // FIPS-197 appendix C.1
        let key: [u8; 16] = [
            0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d,
            0x0e, 0x0f,
        ];
        let mut block: [u8; 16] = [
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd,
            0xee, 0xff,
        ];
        encrypt_ecb_block(&key, &mut block);
        assert_eq!(hex::encode(block), "69c4e0d86a7b0430d8cdb78070b4c55a");
        decrypt_ecb_block(&key, &mut block);
        assert_eq!(hex::encode(block), "00112233445566778899aabbccddeeff");
    }

    #[test]
    fn test_cbc_round_trip() {
        let key = [0x42u8; 16];
        let iv = [0u8; 16];
        let plain: Vec<u8> = (0..64u8).collect();
        let mut data = plain.clone();
        encrypt_cbc(&key, &iv, &mut data).expect("Test operation should succeed");
        assert_ne!(data, plain);
        decrypt_cbc(&key, &iv, &mut data).expect("Test operation should succeed");
        assert_eq!(data, plain);
    }

    #[test]
    fn test_cbc_rejects_bad_params() {
        let mut data = [0u8; 15];
        assert!(matches!(
            decrypt_cbc(&[0u8; 16], &[0u8; 16], &mut data),
            Err(CryptoError::UnalignedLength(15))
        ));
        let mut data = [0u8; 16];
        assert!(matches!(
            decrypt_cbc(&[0u8; 8], &[0u8; 16], &mut data),
            Err(CryptoError::InvalidKeySize { .. })
        ));
        assert!(matches!(
            decrypt_cbc(&[0u8; 16], &[0u8; 8], &mut data),
            Err(CryptoError::InvalidIvSize { .. })
        ));
    }
}
