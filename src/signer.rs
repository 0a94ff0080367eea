use std::fs;
use std::path::Path;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng; // 用于生成私钥的安全随机数生成器
use tracing::info;

use crate::error::{Error, Result};
use crate::evidence::VerdictReceipt;

/// 签名器模块
/// 负责对核验回执进行签名，审计方拿公钥即可离线验签
pub struct ReceiptSigner {
    keypair: SigningKey,
}

impl ReceiptSigner {
    /// 临时密钥（测试、基准）
    pub fn generate() -> Self {
        Self { keypair: SigningKey::generate(&mut OsRng) }
    }

    /// 从文件加载 32 字节种子（Hex）；文件不存在则生成并落盘
    pub fn load_or_generate(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let raw = fs::read_to_string(path)?;
            let bytes = hex::decode(raw.trim())
                .map_err(|e| Error::Ledger(format!("密钥文件不是合法 Hex: {}", e)))?;
            let seed: [u8; 32] = bytes
                .try_into()
                .map_err(|_| Error::Ledger("密钥长度必须是 32 字节".into()))?;
            info!("🔑 已加载签名密钥: {}", path.display());
            return Ok(Self { keypair: SigningKey::from_bytes(&seed) });
        }

        let signer = Self::generate();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, hex::encode(signer.keypair.to_bytes()))?;
        info!("🔑 已生成新的签名密钥: {}", path.display());
        Ok(signer)
    }

    /// 获取公钥（用于分发给审计方进行验签）
    pub fn public_key(&self) -> VerifyingKey {
        self.keypair.verifying_key()
    }

    /// 对回执进行数字签名，返回 64 字节的 Ed25519 签名
    pub fn sign(&self, receipt: &VerdictReceipt) -> Result<Signature> {
        // 注意：这里依赖 serde_json 对同一结构体输出稳定的字节序（字段按声明顺序）
        let payload = serde_json::to_vec(receipt)?;
        Ok(self.keypair.sign(&payload))
    }

    /// 静态验证函数（给外部验证者使用）
    pub fn verify(key: &VerifyingKey, receipt: &VerdictReceipt, signature: &Signature) -> Result<bool> {
        let payload = serde_json::to_vec(receipt)?;
        Ok(key.verify(&payload, signature).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{Confidence, TamperVerdict, VerificationMethod};

    fn receipt() -> VerdictReceipt {
        VerdictReceipt {
            image_sha256: "ab".repeat(32),
            tamper_verdict: TamperVerdict::Genuine,
            tamper_score: 3.5,
            quality_used: 85,
            matched_record_id: Some(1),
            accuracy: 100.0,
            verified: true,
            method: VerificationMethod::DatabaseVerified,
            confidence: Confidence::High,
            timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn signature_round_trip_and_tamper_detection() {
        let signer = ReceiptSigner::generate();
        let mut r = receipt();
        let sig = signer.sign(&r).unwrap();
        assert!(ReceiptSigner::verify(&signer.public_key(), &r, &sig).unwrap());

        r.verified = false;
        assert!(!ReceiptSigner::verify(&signer.public_key(), &r, &sig).unwrap());
    }

    #[test]
    fn key_is_persisted_and_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("certverify.key");

        let first = ReceiptSigner::load_or_generate(&path).unwrap();
        let second = ReceiptSigner::load_or_generate(&path).unwrap();
        assert_eq!(first.public_key(), second.public_key());
    }

    #[test]
    fn bad_key_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.key");
        fs::write(&path, "abcd").unwrap();
        assert!(matches!(ReceiptSigner::load_or_generate(&path), Err(Error::Ledger(_))));
    }
}
