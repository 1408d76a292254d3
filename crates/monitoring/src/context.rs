//! 모니터링 컴포지션 루트
//!
//! 실행 하나(프로세스 하나)마다 한 번 만들어 `Arc`로 시나리오 실행기와
//! 오케스트레이션 코드에 넘깁니다. 전역 상태는 없으며, 테스트 격리를 위해서만
//! [`MonitoringContext::reset`]을 씁니다.

use std::sync::{Arc, Mutex};

use stage_env_core::config::StageEnvConfig;
use stage_env_core::runner::NodeCommandRunner;
use stage_env_runner::ContainerProbe;

use crate::consensus::{ConsensusMonitorConfig, NetworkConsensusMonitor};
use crate::datum::{DatumMonitor, DatumMonitorConfig};
use crate::health::{CheckKind, HealthChecker, HealthCheckerConfig, HealthStatus};

/// 데이텀 모니터, 합의 모니터, 헬스체커 묶음
pub struct MonitoringContext<R, P> {
    config: StageEnvConfig,
    runner: Arc<R>,
    datum: DatumMonitor<R>,
    consensus: NetworkConsensusMonitor<R>,
    health: HealthChecker<R, P>,
    /// 마지막 헬스체크 라운드 결과
    last_health: Mutex<Vec<HealthStatus>>,
}

impl<R: NodeCommandRunner, P: ContainerProbe> MonitoringContext<R, P> {
    pub fn new(runner: Arc<R>, probe: P, config: StageEnvConfig) -> Self {
        Self {
            datum: DatumMonitor::new(Arc::clone(&runner), DatumMonitorConfig::from_core(&config)),
            consensus: NetworkConsensusMonitor::new(
                Arc::clone(&runner),
                ConsensusMonitorConfig::from_core(&config),
            ),
            health: HealthChecker::new(
                Arc::clone(&runner),
                probe,
                HealthCheckerConfig::from_core(&config),
            ),
            runner,
            config,
            last_health: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &StageEnvConfig {
        &self.config
    }

    pub fn runner(&self) -> &Arc<R> {
        &self.runner
    }

    pub fn datum(&self) -> &DatumMonitor<R> {
        &self.datum
    }

    pub fn consensus(&self) -> &NetworkConsensusMonitor<R> {
        &self.consensus
    }

    pub fn health(&self) -> &HealthChecker<R, P> {
        &self.health
    }

    /// 설정된 모든 노드를 검사하고 결과를 보관합니다.
    pub async fn check_all_nodes(&self, kind: CheckKind) -> Vec<HealthStatus> {
        let statuses = self.health.check_many(&self.config.network.nodes, kind).await;
        if let Ok(mut last) = self.last_health.lock() {
            last.clone_from(&statuses);
        }
        statuses
    }

    /// 마지막 [`check_all_nodes`](Self::check_all_nodes) 결과
    pub fn last_health(&self) -> Vec<HealthStatus> {
        self.last_health
            .lock()
            .map(|last| last.clone())
            .unwrap_or_default()
    }

    /// 모니터를 설정으로부터 다시 만들고 보관된 헬스체크 결과를 비웁니다.
    ///
    /// 테스트 사이 격리 용도입니다.
    pub fn reset(&mut self) {
        self.datum = DatumMonitor::new(
            Arc::clone(&self.runner),
            DatumMonitorConfig::from_core(&self.config),
        );
        self.consensus = NetworkConsensusMonitor::new(
            Arc::clone(&self.runner),
            ConsensusMonitorConfig::from_core(&self.config),
        );
        if let Ok(mut last) = self.last_health.lock() {
            last.clear();
        }
    }
}
