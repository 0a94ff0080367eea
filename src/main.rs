use certverify_core::{
    api,
    artifacts::ArtifactWriter,
    config::Config,
    ela::TamperingDetector,
    extractor::SidecarExtractor,
    ledger::ReceiptLedger,
    pipeline::CertificateVerifier,
    record_store::{JsonRecordStore, RecordSource},
    signer::ReceiptSigner,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,certverify_core=debug")),
        )
        .init();

    // ----------------------------------------------------------------
    // 0. 加载配置
    // ----------------------------------------------------------------
    let config = Config::from_env()?;
    info!(
        "⚙️  配置加载完成: Host={}:{}, Records={}, Key={}, Scratch={}",
        config.host,
        config.port,
        config.records_path.display(),
        config.key_path,
        config.artifacts.scratch_dir.display()
    );

    // ----------------------------------------------------------------
    // 1. 系统初始化 & 身份加载
    // ----------------------------------------------------------------
    info!("🛡️ 证书核验服务启动中...");

    let signer = ReceiptSigner::load_or_generate(&config.key_path)?;
    info!("🆔 服务身份ID (Public Key): {}", hex::encode(signer.public_key().to_bytes()));

    let records = JsonRecordStore::new(config.records_path.clone());
    match records.records() {
        Ok(list) => info!("📚 可信记录库: {} 条", list.len()),
        Err(e) => warn!("⚠️  可信记录库暂不可用: {}", e),
    }

    let detector = TamperingDetector::new(config.detector.clone(), config.regions.clone())?;
    info!(
        "🔬 ELA 检测器就绪: qualities={:?}, threshold={}",
        detector.config().qualities,
        detector.config().tamper_threshold
    );

    std::fs::create_dir_all(&config.upload_dir)?;
    let upload_dir = config.upload_dir.canonicalize()?;
    info!("📂 上传目录: {}", upload_dir.display());

    let artifacts = ArtifactWriter::new(config.artifacts.clone())?;
    let verifier = CertificateVerifier::new(detector, Arc::new(records), Some(artifacts));

    // ----------------------------------------------------------------
    // 2. 状态共享容器
    // ----------------------------------------------------------------
    let shared_state = Arc::new(api::AppState {
        verifier: Arc::new(verifier),
        extractor: Arc::new(SidecarExtractor),
        signer: Arc::new(signer),
        ledger: Arc::new(Mutex::new(ReceiptLedger::new())),
        upload_dir,
    });

    // ----------------------------------------------------------------
    // 3. 启动 HTTP 服务
    // ----------------------------------------------------------------
    let app = api::app(shared_state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;

    info!("🚀 API 服务已运行在: http://{}", addr);
    info!("   - POST /verify      : 图像取证 + 记录比对 + 签名入账");
    info!("   - POST /validate    : 仅做记录比对");
    info!("   - GET  /audit/{{pos}} : 获取特定回执的 Merkle Proof");

    axum::serve(listener, app).await?;

    Ok(())
}
