//! AES-128-CBC decrypting stream reader
//!
//! [`CbcReader`] exposes an encrypted byte range of an underlying stream as
//! a seekable plaintext stream. Reads can start anywhere: the IV for a
//! block is either the initial IV (block 0) or the previous ciphertext
//! block, so only the blocks covering the request are fetched and
//! decrypted. The last decrypted block is kept, so a run of small reads
//! decrypts each block once.

use std::io::{self, Read, Seek, SeekFrom};

use tracing::debug;

use crate::aes128::{AES_128_KEY_SIZE, AES_BLOCK_SIZE, decrypt_cbc};
use crate::error::{CryptoError, CryptoResult};
use crate::store_trait::KeyProvider;

const BLOCK: u64 = AES_BLOCK_SIZE as u64;

/// Seekable AES-128-CBC decrypting reader over a byte range
#[derive(Debug)]
pub struct CbcReader<R> {
    inner: R,
    offset: u64,
    length: u64,
    pos: u64,
    key: Option<[u8; AES_128_KEY_SIZE]>,
    iv: [u8; AES_BLOCK_SIZE],
    /// Plaintext of the last block decrypted, with its stream offset
    cached: Option<(u64, [u8; AES_BLOCK_SIZE])>,
}

impl<R: Read + Seek> CbcReader<R> {
    /// Create a reader over `[offset, offset + length)` of `inner`
    ///
    /// With a key, `length` is rounded down to a whole number of AES
    /// blocks. With `key == None` the range is passed through unmodified.
    /// A missing IV means an all-zero IV.
    pub fn new(
        inner: R,
        offset: u64,
        length: u64,
        key: Option<&[u8; AES_128_KEY_SIZE]>,
        iv: Option<&[u8; AES_BLOCK_SIZE]>,
    ) -> Self {
        Self {
            inner,
            offset,
            length: if key.is_some() {
                length & !(BLOCK - 1)
            } else {
                length
            },
            pos: 0,
            key: key.copied(),
            iv: iv.copied().unwrap_or([0u8; AES_BLOCK_SIZE]),
            cached: None,
        }
    }

    /// Create a reader whose key comes from `provider`
    ///
    /// Fails if the named key is missing or does not decrypt
    /// `verify_data` to the verification plaintext.
    pub fn from_provider(
        inner: R,
        offset: u64,
        length: u64,
        provider: &dyn KeyProvider,
        key_name: &str,
        verify_data: &[u8; 16],
        iv: Option<&[u8; AES_BLOCK_SIZE]>,
    ) -> CryptoResult<Self> {
        let key = provider
            .get_and_verify(key_name, verify_data)
            .map_err(|result| CryptoError::KeyVerification {
                name: key_name.to_string(),
                result,
            })?;
        debug!("opened CBC reader with key {key_name}");
        Ok(Self::new(inner, offset, length, Some(&key), iv))
    }

    /// Size of the plaintext stream
    pub fn size(&self) -> u64 {
        self.length
    }

    /// Whether reads are decrypted
    pub fn is_encrypted(&self) -> bool {
        self.key.is_some()
    }

    /// Return the underlying reader
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn read_raw(&mut self, at: u64, buf: &mut [u8]) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(self.offset + at))?;
        self.inner.read_exact(buf)
    }
}

impl<R: Read + Seek> Read for CbcReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.pos >= self.length {
            return Ok(0);
        }
        let n = (buf.len() as u64).min(self.length - self.pos) as usize;

        let Some(key) = self.key else {
            self.read_raw(self.pos, &mut buf[..n])?;
            self.pos += n as u64;
            return Ok(n);
        };

        let block_start = self.pos & !(BLOCK - 1);
        if let Some((_, block)) = self.cached.filter(|&(at, _)| at == block_start) {
            let skip = (self.pos - block_start) as usize;
            let n = n.min(AES_BLOCK_SIZE - skip);
            buf[..n].copy_from_slice(&block[skip..skip + n]);
            self.pos += n as u64;
            return Ok(n);
        }
        let block_end = (self.pos + n as u64 + BLOCK - 1) & !(BLOCK - 1);

        let mut iv = self.iv;
        if block_start > 0 {
            self.read_raw(block_start - BLOCK, &mut iv)?;
        }

        let mut data = vec![0u8; (block_end - block_start) as usize];
        self.read_raw(block_start, &mut data)?;
        decrypt_cbc(&key, &iv, &mut data).map_err(io::Error::other)?;

        let mut last = [0u8; AES_BLOCK_SIZE];
        last.copy_from_slice(&data[data.len() - AES_BLOCK_SIZE..]);
        self.cached = Some((block_end - BLOCK, last));

        let skip = (self.pos - block_start) as usize;
        buf[..n].copy_from_slice(&data[skip..skip + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for CbcReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => i128::from(p),
            SeekFrom::End(d) => i128::from(self.length) + i128::from(d),
            SeekFrom::Current(d) => i128::from(self.pos) + i128::from(d),
        };
        self.pos = target.clamp(0, i128::from(self.length)) as u64;
        Ok(self.pos)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::aes128::encrypt_cbc;
    use crate::keys::{KeyStore, NamedKey, make_verify_data};
    use proptest::prelude::*;
    use std::io::Cursor;

    const KEY: [u8; 16] = [0x2B; 16];

    fn encrypted_fixture(plain: &[u8], prefix: usize) -> Vec<u8> {
        let mut enc = plain.to_vec();
        encrypt_cbc(&KEY, &[0u8; 16], &mut enc).expect("Test operation should succeed");
        let mut file = vec![0xEE; prefix];
        file.extend_from_slice(&enc);
        file
    }

    #[test]
    fn test_partial_reads() {
        let plain: Vec<u8> = (0..128u8).collect();
        let file = encrypted_fixture(&plain, 7);
        let mut reader = CbcReader::new(Cursor::new(file), 7, 128, Some(&KEY), None);

        reader.seek(SeekFrom::Start(13)).expect("seek");
        let mut buf = [0u8; 40];
        reader.read_exact(&mut buf).expect("read");
        assert_eq!(&buf[..], &plain[13..53]);
        assert_eq!(reader.stream_position().expect("tell"), 53);
    }

    #[test]
    fn test_length_rounded_and_clamped() {
        let plain = vec![0x41u8; 64];
        let file = encrypted_fixture(&plain, 0);
        let mut reader = CbcReader::new(Cursor::new(file), 0, 60, Some(&KEY), None);
        assert_eq!(reader.size(), 48);

        assert_eq!(reader.seek(SeekFrom::Start(1000)).expect("seek"), 48);
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).expect("read"), 0);

        assert_eq!(reader.seek(SeekFrom::Current(-100)).expect("seek"), 0);
        let mut all = Vec::new();
        reader.read_to_end(&mut all).expect("read");
        assert_eq!(all, vec![0x41u8; 48]);
    }

    #[test]
    fn test_passthrough_without_key() {
        let data: Vec<u8> = (0..32u8).collect();
        let mut reader = CbcReader::new(Cursor::new(data.clone()), 16, 16, None, None);
        assert!(!reader.is_encrypted());
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).expect("read");
        assert_eq!(buf, &data[16..]);
    }

    #[test]
    fn test_from_provider_rejects_wrong_key() {
        let mut store = KeyStore::new();
        store.add(NamedKey::new("retail", [0x01; 16]));
        let verify = make_verify_data(&KEY);

        let err = CbcReader::from_provider(
            Cursor::new(vec![0u8; 32]),
            0,
            32,
            &store,
            "retail",
            &verify,
            None,
        )
        .expect_err("wrong key must not open");
        assert!(matches!(err, CryptoError::KeyVerification { .. }));

        store.add(NamedKey::new("retail", KEY));
        let plain = vec![0x99u8; 32];
        let mut reader = CbcReader::from_provider(
            Cursor::new(encrypted_fixture(&plain, 0)),
            0,
            32,
            &store,
            "retail",
            &verify,
            None,
        )
        .expect("verified key should open");
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).expect("read");
        assert_eq!(buf, plain);
    }

    /// Counts reads reaching the wrapped stream
    struct CountingReader {
        inner: Cursor<Vec<u8>>,
        reads: usize,
    }

    impl Read for CountingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads += 1;
            self.inner.read(buf)
        }
    }

    impl Seek for CountingReader {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    #[test]
    fn test_small_reads_reuse_decrypted_block() {
        let plain: Vec<u8> = (0..64u8).map(|b| b ^ 0x5A).collect();
        let counting = CountingReader {
            inner: Cursor::new(encrypted_fixture(&plain, 0)),
            reads: 0,
        };
        let mut reader = CbcReader::new(counting, 0, 64, Some(&KEY), None);

        let mut out = Vec::new();
        let mut byte = [0u8; 1];
        while reader.read(&mut byte).expect("read") == 1 {
            out.push(byte[0]);
        }
        assert_eq!(out, plain);

        // Four blocks: one data read each plus an IV read for the last three
        assert_eq!(reader.into_inner().reads, 7);
    }

    #[test]
    fn test_seeks_around_cached_block() {
        let plain: Vec<u8> = (0..48u8).collect();
        let mut reader = CbcReader::new(
            Cursor::new(encrypted_fixture(&plain, 3)),
            3,
            48,
            Some(&KEY),
            None,
        );

        let mut buf = [0u8; 20];
        reader.read_exact(&mut buf).expect("read");
        assert_eq!(&buf[..], &plain[..20]);

        reader.seek(SeekFrom::Start(17)).expect("seek");
        let mut buf = [0u8; 31];
        reader.read_exact(&mut buf).expect("read");
        assert_eq!(&buf[..], &plain[17..]);

        reader.seek(SeekFrom::Start(2)).expect("seek");
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).expect("read");
        assert_eq!(&buf[..], &plain[2..6]);
    }

    proptest! {
        #[test]
        fn prop_random_access_matches_plaintext(
            blocks in 1usize..16,
            start in 0usize..256,
            len in 0usize..256,
        ) {
            let plain: Vec<u8> = (0..blocks * 16).map(|i| (i * 7 + 3) as u8).collect();
            let file = encrypted_fixture(&plain, 5);
            let mut reader =
                CbcReader::new(Cursor::new(file), 5, plain.len() as u64, Some(&KEY), None);

            let start = start.min(plain.len());
            let end = (start + len).min(plain.len());
            reader.seek(SeekFrom::Start(start as u64)).unwrap();
            let mut buf = vec![0u8; end - start];
            reader.read_exact(&mut buf).unwrap();
            prop_assert_eq!(&buf[..], &plain[start..end]);
        }
    }
}
