use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::{
    evidence::VerdictReceipt,
    extractor::FieldExtractor,
    ledger::ReceiptLedger,
    pipeline::{CertificateVerifier, VerificationOutcome},
    record::{ExtractedFields, ValidationResult},
    signer::ReceiptSigner,
};

// ==========================================
// 1. 应用状态 (Shared State)
// ==========================================
// 核验流水线本身无状态，直接 Arc 共享；
// 账本是追加写的，需要 Mutex 保证写操作互斥。
pub struct AppState {
    pub verifier: Arc<CertificateVerifier>,
    pub extractor: Arc<dyn FieldExtractor>,
    pub signer: Arc<ReceiptSigner>,
    pub ledger: Arc<Mutex<ReceiptLedger>>,
    /// 已 canonicalize 的上传目录
    pub upload_dir: PathBuf,
}

// ==========================================
// 2. 数据传输对象 (DTOs)
// ==========================================

// 请求：完整核验。上传落盘由外部完成，这里只收上传目录内的路径
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub image_path: String,
    // 产物命名用；缺省取路径里的文件名
    pub name: Option<String>,
    // 外部 OCR/NER 的结果；缺省时交给 FieldExtractor
    pub fields: Option<ExtractedFields>,
}

#[derive(Deserialize)]
pub struct ValidateRequest {
    pub fields: ExtractedFields,
}

// 响应：核验结论 + 存证回执
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    #[serde(flatten)]
    pub outcome: VerificationOutcome,
    pub receipt: VerdictReceipt,
    pub signature: String, // Hex encoded
    pub root_hash: String,
    pub leaf_pos: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub records: Option<usize>,
    pub receipts: u64,
}

// 响应：Merkle Proof
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResponse {
    pub leaf_pos: u64,
    pub root_hash: String,
    pub proof_hex: Vec<String>,
}

// ==========================================
// 3. API 路由构建
// ==========================================
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/verify", post(verify_certificate))
        .route("/validate", post(validate_fields))
        .route("/audit/{pos}", get(get_audit_proof))
        .layer(CorsLayer::permissive()) // ⚠️ 开发模式：允许所有跨域
        .with_state(state)
}

// ==========================================
// 4. 处理函数 (Handlers)
// ==========================================

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let verifier = state.verifier.clone();
    let records = tokio::task::spawn_blocking(move || verifier.record_count())
        .await
        .ok()
        .flatten();
    let receipts = state.ledger.lock().await.len();

    Json(HealthResponse { status: "ok", records, receipts })
}

/// 接口：完整核验并入账
async fn verify_certificate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, (StatusCode, String)> {
    info!("📥 收到核验请求: 图片={}", req.image_path);

    // CPU 密集型：ELA 放到 blocking 线程池
    let verifier = state.verifier.clone();
    let extractor = state.extractor.clone();
    let upload_dir = state.upload_dir.clone();
    let outcome = tokio::task::spawn_blocking(move || -> Result<VerificationOutcome, (StatusCode, String)> {
        let resolved = resolve_upload(&upload_dir, &req.image_path)?;
        let path = resolved.as_path();
        let bytes = std::fs::read(path).map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

        let fields = match req.fields {
            Some(fields) => fields,
            None => extractor
                .extract(path)
                .map_err(|e| (StatusCode::BAD_GATEWAY, format!("字段抽取失败: {}", e)))?,
        };
        let name = req.name.unwrap_or_else(|| {
            path.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("upload")
                .to_string()
        });

        verifier
            .verify(&bytes, &name, &fields)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join error: {}", e)))??;

    // 签名 + 入账
    let receipt = outcome.receipt(chrono::Utc::now().timestamp());
    let signature = state
        .signer
        .sign(&receipt)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let (root, pos) = {
        let mut ledger = state.ledger.lock().await;
        ledger
            .append(&receipt)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
    };

    info!(
        "✅ 核验完成: verified={}, method={:?}, Root={}, Pos={}",
        outcome.verdict.verified,
        outcome.verdict.method,
        hex::encode(root),
        pos
    );

    Ok(Json(VerifyResponse {
        outcome,
        receipt,
        signature: hex::encode(signature.to_bytes()),
        root_hash: hex::encode(root),
        leaf_pos: pos,
    }))
}

/// 把请求里的路径落到上传目录内；相对路径按上传目录解析，
/// 符号链接和 `..` 解析后仍须位于目录之下
pub fn resolve_upload(upload_dir: &FsPath, requested: &str) -> Result<PathBuf, (StatusCode, String)> {
    let candidate = FsPath::new(requested);
    let candidate = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        upload_dir.join(candidate)
    };
    let resolved = candidate
        .canonicalize()
        .map_err(|_| (StatusCode::NOT_FOUND, format!("图片不存在: {}", requested)))?;
    if !resolved.starts_with(upload_dir) {
        warn!("⛔ 拒绝读取上传目录之外的文件: {}", requested);
        return Err((StatusCode::FORBIDDEN, format!("路径不在上传目录内: {}", requested)));
    }
    Ok(resolved)
}

/// 接口：只做数据库核验（不跑 ELA）
async fn validate_fields(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ValidateRequest>,
) -> Result<Json<ValidationResult>, (StatusCode, String)> {
    let verifier = state.verifier.clone();
    let result = tokio::task::spawn_blocking(move || verifier.validate(&req.fields))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join error: {}", e)))?;
    Ok(Json(result))
}

/// 接口：获取审计证明
async fn get_audit_proof(
    State(state): State<Arc<AppState>>,
    Path(pos): Path<u64>,
) -> Result<Json<AuditResponse>, (StatusCode, String)> {
    info!("🔍 收到审计请求: Pos={}", pos);

    let ledger = state.ledger.lock().await;
    let root = ledger
        .root()
        .map_err(|e| (StatusCode::NOT_FOUND, format!("账本为空: {}", e)))?;
    let proof = ledger
        .proof(vec![pos])
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("获取 Proof 失败: {}", e)))?;

    let proof_hex: Vec<String> = proof.proof_items().iter().map(hex::encode).collect();

    Ok(Json(AuditResponse {
        leaf_pos: pos,
        root_hash: hex::encode(root),
        proof_hex,
    }))
}
