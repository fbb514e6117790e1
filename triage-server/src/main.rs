//! 急诊分诊服务器主程序

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use triage_admin::{init_logging, TriageConfig};
use triage_integration::{ApiServer, ApiState, HttpDecisionClient};
use triage_workflow::{ArrivalSimulator, TriageEngine};

/// 分诊服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "triage-server")]
#[command(about = "急诊分诊队列对账服务器")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// API监听端口
    #[arg(short, long)]
    port: Option<u16>,

    /// 决策服务地址
    #[arg(short, long)]
    decision_endpoint: Option<String>,

    /// 日志级别
    #[arg(short, long)]
    log_level: Option<String>,

    /// 关闭到达模拟
    #[arg(long)]
    no_simulation: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = TriageConfig::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(endpoint) = args.decision_endpoint {
        config.decision_service.endpoint = endpoint;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if args.no_simulation {
        config.simulation.enabled = false;
    }
    config.validate()?;

    // 初始化日志
    init_logging(&config.logging)?;

    info!("启动急诊分诊服务器...");
    info!("  API地址: {}", config.server.bind_address());
    info!("  决策服务: {}", config.decision_service.endpoint);
    info!("  刷新间隔: {}秒", config.reconciliation.refresh_interval_secs);

    let client = HttpDecisionClient::new(config.decision_service.clone())
        .context("failed to create decision client")?;
    let engine = Arc::new(TriageEngine::new(
        Arc::new(client),
        config.reconciliation.to_reconcile_config(),
    ));

    for member in &config.staff {
        engine.register_staff(member.clone())?;
    }

    let shutdown = CancellationToken::new();
    let reconcile = tokio::spawn(Arc::clone(&engine).run(shutdown.clone()));

    let arrivals = if config.simulation.enabled {
        let simulator = ArrivalSimulator::new(config.simulation.to_arrival_config());
        Some(tokio::spawn(simulator.run(Arc::clone(&engine), shutdown.clone())))
    } else {
        info!("到达模拟已关闭");
        None
    };

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("收到关闭信号"),
            Err(e) => warn!("无法监听关闭信号: {}", e),
        }
        ctrl_c.cancel();
    });

    let server = ApiServer::new(ApiState::new(Arc::clone(&engine)));
    if let Err(e) = server.run(&config.server.bind_address(), shutdown.clone()).await {
        error!("API服务器运行失败: {}", e);
        shutdown.cancel();
        return Err(e);
    }

    shutdown.cancel();
    reconcile.await?;
    if let Some(arrivals) = arrivals {
        arrivals.await?;
    }

    let stats = engine.stats();
    info!(
        "服务器已停止: {} 名患者, 签发 {} 次对账, 安装 {} 次",
        stats.patients, stats.cycles_issued, stats.cycles_installed
    );
    Ok(())
}
