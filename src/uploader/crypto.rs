// 分片加密
//
// 每个分片独立使用 AES-256-GCM 加密：
// - 每次加密生成新的 96 位随机 IV，同一次上传内 IV 不重复
// - 认证标签与密文分离，密文长度与明文一致，
//   所以记录的字节范围同样可以定位到提交后 blob 中的密文
// - 不使用关联数据

use super::chunk::BlockRange;
use super::error::UploadError;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce, Tag};
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// 加密方案标识
pub const ENCRYPTION_STRATEGY: &str = "AES_256_GCM";

/// 关联数据占位（不使用关联数据）
pub const NO_ASSOCIATED_DATA: &str = "none";

/// 密钥长度（字节）
pub const KEY_LEN: usize = 32;

/// IV 长度（字节）
pub const IV_LEN: usize = 12;

/// 认证标签长度（字节）
pub const TAG_LEN: usize = 16;

/// 单个分片的加密结果
#[derive(Debug, Clone)]
pub struct EncryptedBlock {
    pub ciphertext: Vec<u8>,
    pub iv: [u8; IV_LEN],
    pub auth_tag: [u8; TAG_LEN],
}

/// 分片加密器
///
/// 对外部状态无副作用，产物记录由调用方负责
#[derive(Clone)]
pub struct BlockCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for BlockCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockCipher")
            .field("strategy", &ENCRYPTION_STRATEGY)
            .finish_non_exhaustive()
    }
}

impl BlockCipher {
    /// 使用 32 字节密钥创建加密器
    pub fn new(key: &[u8]) -> Result<Self, UploadError> {
        if key.len() != KEY_LEN {
            return Err(UploadError::EncryptionFailure(format!(
                "密钥长度必须为 {} 字节，实际为 {} 字节",
                KEY_LEN,
                key.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| UploadError::EncryptionFailure(format!("密钥无效: {}", e)))?;
        Ok(Self { cipher })
    }

    /// 加密一个分片
    pub fn encrypt_block(&self, plaintext: Vec<u8>) -> Result<EncryptedBlock, UploadError> {
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let mut buffer = plaintext;
        let tag = self
            .cipher
            .encrypt_in_place_detached(Nonce::from_slice(&iv), b"", &mut buffer)
            .map_err(|e| UploadError::EncryptionFailure(format!("AES-256-GCM 加密失败: {}", e)))?;

        let mut auth_tag = [0u8; TAG_LEN];
        auth_tag.copy_from_slice(tag.as_slice());

        Ok(EncryptedBlock {
            ciphertext: buffer,
            iv,
            auth_tag,
        })
    }

    /// 解密一个分片（校验认证标签）
    pub fn decrypt_block(
        &self,
        iv: &[u8],
        auth_tag: &[u8],
        ciphertext: Vec<u8>,
    ) -> Result<Vec<u8>, UploadError> {
        if iv.len() != IV_LEN || auth_tag.len() != TAG_LEN {
            return Err(UploadError::EncryptionFailure(format!(
                "IV 或认证标签长度错误: iv={}, tag={}",
                iv.len(),
                auth_tag.len()
            )));
        }

        let mut buffer = ciphertext;
        self.cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(iv),
                b"",
                &mut buffer,
                Tag::from_slice(auth_tag),
            )
            .map_err(|e| UploadError::EncryptionFailure(format!("AES-256-GCM 解密失败: {}", e)))?;
        Ok(buffer)
    }
}

/// 上传模式，构造时确定，任务内不再判断密钥是否存在
#[derive(Debug, Clone)]
pub enum UploadMode {
    /// 明文上传
    Plain,
    /// 加密上传
    Encrypted(BlockCipher),
}

impl UploadMode {
    /// 根据可选密钥选择上传模式
    pub fn from_key(key: Option<&[u8]>) -> Result<Self, UploadError> {
        match key {
            None => Ok(UploadMode::Plain),
            Some(key) => Ok(UploadMode::Encrypted(BlockCipher::new(key)?)),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, UploadMode::Encrypted(_))
    }
}

/// 单个分片的加密产物
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockArtifact {
    pub iv: String,
    pub auth_tag: String,
    pub range: String,
}

impl BlockArtifact {
    pub fn new(block: &BlockRange, encrypted: &EncryptedBlock) -> Self {
        let engine = base64::engine::general_purpose::STANDARD;
        Self {
            iv: engine.encode(encrypted.iv),
            auth_tag: engine.encode(encrypted.auth_tag),
            range: block.label(),
        }
    }
}

/// 汇总后的加密产物，按分片索引排列
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionArtifacts {
    /// 每个分片的 IV（base64）
    pub iv: Vec<String>,
    /// 每个分片的认证标签（base64）
    pub at: Vec<String>,
    /// 每个分片的字节范围
    pub range: Vec<String>,
    /// 关联数据占位
    pub ad: String,
    /// 加密方案
    pub encryption_strategy: String,
}

impl EncryptionArtifacts {
    /// 由稀疏的分片产物汇总
    ///
    /// 缺失的索引（未成功上传的分片）以空字符串占位
    pub fn from_blocks(blocks: &[Option<BlockArtifact>]) -> Self {
        let mut iv = Vec::with_capacity(blocks.len());
        let mut at = Vec::with_capacity(blocks.len());
        let mut range = Vec::with_capacity(blocks.len());

        for block in blocks {
            match block {
                Some(a) => {
                    iv.push(a.iv.clone());
                    at.push(a.auth_tag.clone());
                    range.push(a.range.clone());
                }
                None => {
                    iv.push(String::new());
                    at.push(String::new());
                    range.push(String::new());
                }
            }
        }

        Self {
            iv,
            at,
            range,
            ad: NO_ASSOCIATED_DATA.to_string(),
            encryption_strategy: ENCRYPTION_STRATEGY.to_string(),
        }
    }

    /// 第 n 个分片的 IV 和认证标签（已解码）
    pub fn decode_block(&self, index: usize) -> Option<(Vec<u8>, Vec<u8>)> {
        let engine = base64::engine::general_purpose::STANDARD;
        let iv = engine.decode(self.iv.get(index)?).ok()?;
        let at = engine.decode(self.at.get(index)?).ok()?;
        Some((iv, at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn test_key() -> Vec<u8> {
        (0..KEY_LEN as u8).collect()
    }

    #[test]
    fn test_encrypt_decrypt() {
        let cipher = BlockCipher::new(&test_key()).unwrap();
        let plaintext = b"hello block".to_vec();

        let encrypted = cipher.encrypt_block(plaintext.clone()).unwrap();
        assert_eq!(encrypted.ciphertext.len(), plaintext.len());
        assert_ne!(encrypted.ciphertext, plaintext);

        let decrypted = cipher
            .decrypt_block(&encrypted.iv, &encrypted.auth_tag, encrypted.ciphertext)
            .unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_tampered_ciphertext_detected() {
        let cipher = BlockCipher::new(&test_key()).unwrap();
        let mut encrypted = cipher.encrypt_block(vec![7u8; 64]).unwrap();
        encrypted.ciphertext[0] ^= 0x01;

        let result = cipher.decrypt_block(&encrypted.iv, &encrypted.auth_tag, encrypted.ciphertext);
        assert!(matches!(result, Err(UploadError::EncryptionFailure(_))));
    }

    #[test]
    fn test_empty_block() {
        let cipher = BlockCipher::new(&test_key()).unwrap();
        let encrypted = cipher.encrypt_block(Vec::new()).unwrap();
        assert!(encrypted.ciphertext.is_empty());
        let decrypted = cipher
            .decrypt_block(&encrypted.iv, &encrypted.auth_tag, encrypted.ciphertext)
            .unwrap();
        assert!(decrypted.is_empty());
    }

    #[test]
    fn test_fresh_iv_per_call() {
        let cipher = BlockCipher::new(&test_key()).unwrap();
        let ivs: HashSet<[u8; IV_LEN]> = (0..256)
            .map(|_| cipher.encrypt_block(vec![0u8; 16]).unwrap().iv)
            .collect();
        assert_eq!(ivs.len(), 256);
    }

    #[test]
    fn test_malformed_key_rejected() {
        assert!(matches!(
            BlockCipher::new(&[0u8; 16]),
            Err(UploadError::EncryptionFailure(_))
        ));
        assert!(matches!(
            UploadMode::from_key(Some(b"short".as_slice())),
            Err(UploadError::EncryptionFailure(_))
        ));
        assert!(!UploadMode::from_key(None).unwrap().is_encrypted());
    }

    #[test]
    fn test_artifacts_from_sparse_blocks() {
        let blocks = vec![
            Some(BlockArtifact {
                iv: "aXY=".to_string(),
                auth_tag: "YXQ=".to_string(),
                range: "0-4".to_string(),
            }),
            None,
        ];
        let artifacts = EncryptionArtifacts::from_blocks(&blocks);
        assert_eq!(artifacts.iv, vec!["aXY=".to_string(), String::new()]);
        assert_eq!(artifacts.range[0], "0-4");
        assert_eq!(artifacts.ad, NO_ASSOCIATED_DATA);
        assert_eq!(artifacts.encryption_strategy, ENCRYPTION_STRATEGY);

        let (iv, at) = artifacts.decode_block(0).unwrap();
        assert_eq!(iv, b"iv");
        assert_eq!(at, b"at");
    }
}
