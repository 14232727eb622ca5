//! USM cryptographic primitives: key derivation, HMAC authentication
//! and CBC/CFB privacy (RFC 3414 §2.6, §6, §8; RFC 3826; the
//! Blumenthal/Reeder key-extension procedure for the long ciphers)

use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use cfb_mode::cipher::AsyncStreamCipher;
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::{Error, Result};

/// Truncated HMAC output carried in msgAuthenticationParameters.
pub const AUTH_PARAMS_LEN: usize = 12;

/// Salt length in msgPrivacyParameters for every supported cipher.
pub const PRIV_PARAMS_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthProtocol {
    #[serde(rename = "md5")]
    HmacMd5,
    #[serde(rename = "sha")]
    HmacSha1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrivProtocol {
    #[serde(rename = "des")]
    DesCbc,
    #[serde(rename = "3des")]
    TripleDesEde,
    #[serde(rename = "aes128")]
    AesCfb128,
    #[serde(rename = "aes192")]
    AesCfb192,
    #[serde(rename = "aes256")]
    AesCfb256,
}

type HmacMd5 = Hmac<Md5>;
type HmacSha1 = Hmac<Sha1>;

type DesCbcEnc = cbc::Encryptor<des::Des>;
type DesCbcDec = cbc::Decryptor<des::Des>;
type TdesCbcEnc = cbc::Encryptor<des::TdesEde3>;
type TdesCbcDec = cbc::Decryptor<des::TdesEde3>;
type Aes128CfbEnc = cfb_mode::Encryptor<aes::Aes128>;
type Aes128CfbDec = cfb_mode::Decryptor<aes::Aes128>;
type Aes192CfbEnc = cfb_mode::Encryptor<aes::Aes192>;
type Aes192CfbDec = cfb_mode::Decryptor<aes::Aes192>;
type Aes256CfbEnc = cfb_mode::Encryptor<aes::Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<aes::Aes256>;

/// RFC 3414 A.2: digest one megabyte of the repeated passphrase, then
/// localize with H(Ku || engineID || Ku).
fn password_to_key<D: Digest>(password: &[u8], engine_id: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if password.is_empty() {
        return Err(Error::security("empty USM passphrase"));
    }
    let mut hasher = D::new();
    let mut buf = [0u8; 64];
    let mut pw_index = 0usize;
    let mut produced = 0usize;
    while produced < 1024 * 1024 {
        for b in buf.iter_mut() {
            *b = password[pw_index % password.len()];
            pw_index += 1;
        }
        hasher.update(buf);
        produced += buf.len();
    }
    let ku = hasher.finalize();

    let mut localizer = D::new();
    localizer.update(&ku);
    localizer.update(engine_id);
    localizer.update(&ku);
    Ok(Zeroizing::new(localizer.finalize().as_slice().to_vec()))
}

/// Chained re-hash of the localized key until `needed` bytes exist.
fn extend_key<D: Digest>(key: Zeroizing<Vec<u8>>, needed: usize) -> Zeroizing<Vec<u8>> {
    let mut key = key;
    while key.len() < needed {
        let mut hasher = D::new();
        hasher.update(&*key);
        key.extend_from_slice(hasher.finalize().as_slice());
    }
    key.truncate(needed);
    key
}

impl AuthProtocol {
    /// Localized key length: the underlying digest size.
    pub fn key_len(&self) -> usize {
        match self {
            Self::HmacMd5 => 16,
            Self::HmacSha1 => 20,
        }
    }

    /// RFC 3414 §2.6 key localisation from a passphrase.
    pub fn localize_password(
        &self,
        password: &[u8],
        engine_id: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>> {
        match self {
            Self::HmacMd5 => password_to_key::<Md5>(password, engine_id),
            Self::HmacSha1 => password_to_key::<Sha1>(password, engine_id),
        }
    }

    /// 96-bit truncated HMAC over the whole message (RFC 3414 §6.3).
    pub fn sign(&self, key: &[u8], message: &[u8]) -> Result<[u8; AUTH_PARAMS_LEN]> {
        let digest = match self {
            Self::HmacMd5 => {
                let mut mac = HmacMd5::new_from_slice(key)
                    .map_err(|e| Error::security(format!("HMAC key setup: {}", e)))?;
                mac.update(message);
                mac.finalize().into_bytes().as_slice().to_vec()
            }
            Self::HmacSha1 => {
                let mut mac = HmacSha1::new_from_slice(key)
                    .map_err(|e| Error::security(format!("HMAC key setup: {}", e)))?;
                mac.update(message);
                mac.finalize().into_bytes().as_slice().to_vec()
            }
        };
        let mut out = [0u8; AUTH_PARAMS_LEN];
        out.copy_from_slice(&digest[..AUTH_PARAMS_LEN]);
        Ok(out)
    }

    /// Constant-time comparison against a received digest.
    pub fn verify(&self, key: &[u8], message: &[u8], received: &[u8]) -> Result<bool> {
        if received.len() != AUTH_PARAMS_LEN {
            return Ok(false);
        }
        let computed = self.sign(key, message)?;
        Ok(computed.ct_eq(received).into())
    }
}

impl PrivProtocol {
    pub fn key_len(&self) -> usize {
        match self {
            Self::DesCbc => 16,
            Self::TripleDesEde => 32,
            Self::AesCfb128 => 16,
            Self::AesCfb192 => 24,
            Self::AesCfb256 => 32,
        }
    }

    /// Privacy keys are derived with the user's auth digest and extended
    /// when the cipher needs more bytes than one digest provides.
    pub fn localize_password(
        &self,
        auth: AuthProtocol,
        password: &[u8],
        engine_id: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>> {
        let key = auth.localize_password(password, engine_id)?;
        let extended = match auth {
            AuthProtocol::HmacMd5 => extend_key::<Md5>(key, self.key_len()),
            AuthProtocol::HmacSha1 => extend_key::<Sha1>(key, self.key_len()),
        };
        Ok(extended)
    }

    /// Encrypt a scoped PDU. Returns the ciphertext and the
    /// msgPrivacyParameters salt.
    pub fn encrypt(
        &self,
        key: &[u8],
        engine_boots: u32,
        engine_time: u32,
        salt_counter: u64,
        plaintext: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>)> {
        if key.len() < self.key_len() {
            return Err(Error::security("privacy key too short"));
        }
        match self {
            Self::DesCbc => {
                let mut salt = [0u8; 8];
                salt[..4].copy_from_slice(&engine_boots.to_be_bytes());
                salt[4..].copy_from_slice(&(salt_counter as u32).to_be_bytes());
                let mut iv = [0u8; 8];
                for (i, b) in iv.iter_mut().enumerate() {
                    *b = key[8 + i] ^ salt[i];
                }
                let ct = cbc_encrypt_padded::<DesCbcEnc>(&key[..8], &iv, plaintext)?;
                Ok((ct, salt.to_vec()))
            }
            Self::TripleDesEde => {
                let mut salt = [0u8; 8];
                salt[..4].copy_from_slice(&engine_boots.to_be_bytes());
                salt[4..].copy_from_slice(&(salt_counter as u32).to_be_bytes());
                let mut iv = [0u8; 8];
                for (i, b) in iv.iter_mut().enumerate() {
                    *b = key[24 + i] ^ salt[i];
                }
                let ct = cbc_encrypt_padded::<TdesCbcEnc>(&key[..24], &iv, plaintext)?;
                Ok((ct, salt.to_vec()))
            }
            Self::AesCfb128 | Self::AesCfb192 | Self::AesCfb256 => {
                let salt = salt_counter.to_be_bytes();
                let iv = aes_iv(engine_boots, engine_time, &salt);
                let mut buf = plaintext.to_vec();
                match self {
                    Self::AesCfb128 => Aes128CfbEnc::new_from_slices(&key[..16], &iv)
                        .map_err(|e| Error::security(format!("AES setup: {}", e)))?
                        .encrypt(&mut buf),
                    Self::AesCfb192 => Aes192CfbEnc::new_from_slices(&key[..24], &iv)
                        .map_err(|e| Error::security(format!("AES setup: {}", e)))?
                        .encrypt(&mut buf),
                    Self::AesCfb256 => Aes256CfbEnc::new_from_slices(&key[..32], &iv)
                        .map_err(|e| Error::security(format!("AES setup: {}", e)))?
                        .encrypt(&mut buf),
                    _ => unreachable!(),
                }
                Ok((buf, salt.to_vec()))
            }
        }
    }

    /// Decrypt ciphertext using the salt from msgPrivacyParameters.
    pub fn decrypt(
        &self,
        key: &[u8],
        engine_boots: u32,
        engine_time: u32,
        priv_params: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        if key.len() < self.key_len() {
            return Err(Error::security("privacy key too short"));
        }
        if priv_params.len() != PRIV_PARAMS_LEN {
            return Err(Error::security("privacy parameters must be 8 octets"));
        }
        match self {
            Self::DesCbc => {
                if ciphertext.is_empty() || ciphertext.len() % 8 != 0 {
                    return Err(Error::security("DES ciphertext not block aligned"));
                }
                let mut iv = [0u8; 8];
                for (i, b) in iv.iter_mut().enumerate() {
                    *b = key[8 + i] ^ priv_params[i];
                }
                cbc_decrypt::<DesCbcDec>(&key[..8], &iv, ciphertext)
            }
            Self::TripleDesEde => {
                if ciphertext.is_empty() || ciphertext.len() % 8 != 0 {
                    return Err(Error::security("3DES ciphertext not block aligned"));
                }
                let mut iv = [0u8; 8];
                for (i, b) in iv.iter_mut().enumerate() {
                    *b = key[24 + i] ^ priv_params[i];
                }
                cbc_decrypt::<TdesCbcDec>(&key[..24], &iv, ciphertext)
            }
            Self::AesCfb128 | Self::AesCfb192 | Self::AesCfb256 => {
                let iv = aes_iv(engine_boots, engine_time, priv_params);
                let mut buf = ciphertext.to_vec();
                match self {
                    Self::AesCfb128 => Aes128CfbDec::new_from_slices(&key[..16], &iv)
                        .map_err(|e| Error::security(format!("AES setup: {}", e)))?
                        .decrypt(&mut buf),
                    Self::AesCfb192 => Aes192CfbDec::new_from_slices(&key[..24], &iv)
                        .map_err(|e| Error::security(format!("AES setup: {}", e)))?
                        .decrypt(&mut buf),
                    Self::AesCfb256 => Aes256CfbDec::new_from_slices(&key[..32], &iv)
                        .map_err(|e| Error::security(format!("AES setup: {}", e)))?
                        .decrypt(&mut buf),
                    _ => unreachable!(),
                }
                Ok(buf)
            }
        }
    }
}

/// RFC 3826 §3.1.2.1: IV = engineBoots || engineTime || salt.
fn aes_iv(engine_boots: u32, engine_time: u32, salt: &[u8]) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[..4].copy_from_slice(&engine_boots.to_be_bytes());
    iv[4..8].copy_from_slice(&engine_time.to_be_bytes());
    iv[8..].copy_from_slice(salt);
    iv
}

fn cbc_encrypt_padded<C>(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>>
where
    C: BlockEncryptMut + KeyIvInit,
{
    let mut buf = plaintext.to_vec();
    let rem = buf.len() % 8;
    if rem != 0 {
        buf.resize(buf.len() + (8 - rem), 0);
    }
    let padded_len = buf.len();
    let cipher = C::new_from_slices(key, iv)
        .map_err(|e| Error::security(format!("CBC setup: {}", e)))?;
    cipher
        .encrypt_padded_mut::<NoPadding>(&mut buf, padded_len)
        .map_err(|e| Error::security(format!("CBC encrypt: {}", e)))?;
    Ok(buf)
}

fn cbc_decrypt<C>(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>>
where
    C: BlockDecryptMut + KeyIvInit,
{
    let mut buf = ciphertext.to_vec();
    let cipher = C::new_from_slices(key, iv)
        .map_err(|e| Error::security(format!("CBC setup: {}", e)))?;
    cipher
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|e| Error::security(format!("CBC decrypt: {}", e)))?;
    Ok(buf)
}
