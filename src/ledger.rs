//! 模块：回执账本 (MMR)
//!
//! 每次核验的回执按时间顺序追加成叶子，只增不改；
//! 任何一条回执都能给出相对当前 Root 的存在性证明。

use ckb_merkle_mountain_range::{util::MemStore, Merge, MerkleProof, MMR};

use crate::error::{Error, Result};
use crate::evidence::VerdictReceipt;

/// 合并策略：H_parent = Blake3(H_left || H_right)
pub struct MergeBlake3;

impl Merge for MergeBlake3 {
    type Item = [u8; 32];

    fn merge(lhs: &Self::Item, rhs: &Self::Item) -> ckb_merkle_mountain_range::Result<Self::Item> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(lhs);
        hasher.update(rhs);
        Ok(*hasher.finalize().as_bytes())
    }
}

pub type ReceiptProof = MerkleProof<[u8; 32], MergeBlake3>;

/// 回执账本
pub struct ReceiptLedger {
    /// 纯内存存储，进程退出即丢失；持久化由外部负责
    store: MemStore<[u8; 32]>,
    /// MMR 位运算路由依赖的树大小
    mmr_size: u64,
    leaves: u64,
}

impl Default for ReceiptLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiptLedger {
    pub fn new() -> Self {
        Self {
            store: MemStore::default(),
            mmr_size: 0,
            leaves: 0,
        }
    }

    /// 叶子哈希 = Blake3(JSON(回执))
    pub fn leaf_hash(receipt: &VerdictReceipt) -> Result<[u8; 32]> {
        let payload = serde_json::to_vec(receipt)?;
        Ok(*blake3::hash(&payload).as_bytes())
    }

    /// 追加回执，返回 (新 Root, 叶子位置)
    pub fn append(&mut self, receipt: &VerdictReceipt) -> Result<([u8; 32], u64)> {
        let leaf = Self::leaf_hash(receipt)?;

        let mut mmr = MMR::<[u8; 32], MergeBlake3, _>::new(self.mmr_size, &self.store);
        let pos = mmr.push(leaf).map_err(|e| Error::Ledger(format!("MMR append error: {}", e)))?;
        let root = mmr.get_root().map_err(|e| Error::Ledger(format!("MMR get_root error: {}", e)))?;
        self.mmr_size = mmr.mmr_size();
        mmr.commit().map_err(|e| Error::Ledger(format!("MMR commit error: {}", e)))?;

        self.leaves += 1;
        Ok((root, pos))
    }

    pub fn root(&self) -> Result<[u8; 32]> {
        let mmr = MMR::<[u8; 32], MergeBlake3, _>::new(self.mmr_size, &self.store);
        mmr.get_root().map_err(|e| Error::Ledger(format!("MMR get_root error: {}", e)))
    }

    /// 为若干叶子位置开具 Merkle 证明
    pub fn proof(&self, positions: Vec<u64>) -> Result<ReceiptProof> {
        let mmr = MMR::<[u8; 32], MergeBlake3, _>::new(self.mmr_size, &self.store);
        mmr.gen_proof(positions)
            .map_err(|e| Error::Ledger(format!("MMR gen_proof error: {}", e)))
    }

    pub fn len(&self) -> u64 {
        self.leaves
    }

    pub fn is_empty(&self) -> bool {
        self.leaves == 0
    }
}
