//! 노드 헬스체크
//!
//! 세 가지 방식으로 노드 상태를 확인합니다.
//!
//! - [`CheckKind::Container`]: Docker API로 컨테이너가 실행 중인지
//! - [`CheckKind::Http`]: 노드 HTTP 엔드포인트가 200을 돌려주는지
//! - [`CheckKind::Rpc`]: JSON-RPC 호출 응답에 `result`가 있는지
//!
//! 개별 검사는 실패해도 에러가 아니라 `healthy = false`인 [`HealthStatus`]를 돌려줍니다.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use stage_env_core::config::StageEnvConfig;
use stage_env_core::runner::{NodeCommandRunner, RpcRequest, container_name};
use stage_env_runner::ContainerProbe;

use crate::error::MonitoringError;

/// RPC 헬스체크 기본 메서드
pub const DEFAULT_RPC_METHOD: &str = "eth_blockNumber";

/// 헬스체크 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    Container,
    Http,
    Rpc,
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Container => "container",
            Self::Http => "http",
            Self::Rpc => "rpc",
        })
    }
}

/// 헬스체크 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub node_id: String,
    pub kind: CheckKind,
    pub healthy: bool,
    pub response_time_ms: f64,
    pub error: Option<String>,
    pub details: BTreeMap<String, serde_json::Value>,
}

impl HealthStatus {
    fn new(node_id: &str, kind: CheckKind, started: Instant) -> Self {
        Self {
            node_id: node_id.to_owned(),
            kind,
            healthy: false,
            response_time_ms: started.elapsed().as_secs_f64() * 1000.0,
            error: None,
            details: BTreeMap::new(),
        }
    }

    fn failed(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// 헬스체커 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckerConfig {
    pub container_prefix: String,
    pub http_scheme: String,
    pub http_port: u16,
    /// 개별 요청 타임아웃
    pub timeout: Duration,
    /// `wait_for_healthy` 재시도 간격
    pub interval: Duration,
}

impl HealthCheckerConfig {
    pub fn from_core(core: &StageEnvConfig) -> Self {
        Self {
            container_prefix: core.runner.container_prefix.clone(),
            http_scheme: core.runner.rpc_scheme.clone(),
            http_port: core.runner.rpc_port,
            timeout: Duration::from_secs(core.monitoring.health_timeout_secs),
            interval: Duration::from_secs(core.monitoring.consensus_check_interval_secs),
        }
    }
}

impl Default for HealthCheckerConfig {
    fn default() -> Self {
        Self::from_core(&StageEnvConfig::default())
    }
}

/// 노드 헬스체커
pub struct HealthChecker<R, P> {
    runner: Arc<R>,
    probe: P,
    http: reqwest::Client,
    config: HealthCheckerConfig,
}

impl<R: NodeCommandRunner, P: ContainerProbe> HealthChecker<R, P> {
    pub fn new(runner: Arc<R>, probe: P, config: HealthCheckerConfig) -> Self {
        Self {
            runner,
            probe,
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &HealthCheckerConfig {
        &self.config
    }

    /// Docker 데몬에 연결할 수 있는지
    pub async fn docker_available(&self) -> bool {
        match self.probe.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "docker daemon unavailable");
                false
            }
        }
    }

    /// 노드 컨테이너가 실행 중인지 확인합니다.
    ///
    /// 이미지에 healthcheck가 정의되어 있으면 `unhealthy` 상태도 실패로 봅니다.
    pub async fn check_container(&self, node: &str) -> HealthStatus {
        let started = Instant::now();
        let container = container_name(&self.config.container_prefix, node);
        match self.probe.inspect(&container).await {
            Ok(state) => {
                let mut status = HealthStatus::new(node, CheckKind::Container, started);
                status.healthy = state.running && state.health.as_deref() != Some("unhealthy");
                status.details.insert("container".to_owned(), state.name.into());
                status.details.insert("status".to_owned(), state.status.into());
                if let Some(health) = state.health {
                    status.details.insert("health".to_owned(), health.into());
                }
                if !status.healthy {
                    status.error = Some(format!("container {container} is not running"));
                }
                status
            }
            Err(e) => HealthStatus::new(node, CheckKind::Container, started).failed(e.to_string()),
        }
    }

    /// 임의 URL에 GET을 보내 200이면 healthy로 봅니다.
    pub async fn check_url(&self, node: &str, url: &str) -> HealthStatus {
        let started = Instant::now();
        let sent = self
            .http
            .get(url)
            .timeout(self.config.timeout)
            .send()
            .await;
        match sent {
            Ok(response) => {
                let code = response.status();
                let mut status = HealthStatus::new(node, CheckKind::Http, started);
                status.healthy = code == reqwest::StatusCode::OK;
                status
                    .details
                    .insert("status_code".to_owned(), code.as_u16().into());
                debug!(node = %node, status = code.as_u16(), time_ms = status.response_time_ms, "http check");
                if !status.healthy {
                    status.error = Some(format!("http status {code}"));
                }
                status
            }
            Err(e) => {
                warn!(node = %node, url = %url, error = %e, "http check failed");
                HealthStatus::new(node, CheckKind::Http, started).failed(e.to_string())
            }
        }
    }

    /// 노드 HTTP 엔드포인트 (`<scheme>://<node>:<port>/`)
    pub async fn check_http(&self, node: &str) -> HealthStatus {
        let url = format!("{}://{node}:{}/", self.config.http_scheme, self.config.http_port);
        self.check_url(node, &url).await
    }

    /// JSON-RPC 응답에 `result`가 있으면 healthy로 봅니다.
    pub async fn check_json_rpc(&self, node: &str, method: &str) -> HealthStatus {
        let started = Instant::now();
        let request = RpcRequest::new(method, Vec::new());
        match self.runner.rpc(node, &request, self.config.timeout).await {
            Ok(body) => {
                let mut status = HealthStatus::new(node, CheckKind::Rpc, started);
                status.healthy = body.get("result").is_some();
                if !status.healthy {
                    status.error = Some(match body.get("error") {
                        Some(err) => format!("rpc error: {err}"),
                        None => "response has no result".to_owned(),
                    });
                }
                status.details.insert("response".to_owned(), body);
                debug!(node = %node, method = %method, healthy = status.healthy, "rpc check");
                status
            }
            Err(e) => {
                warn!(node = %node, method = %method, error = %e, "rpc check failed");
                HealthStatus::new(node, CheckKind::Rpc, started).failed(e.to_string())
            }
        }
    }

    pub async fn check(&self, node: &str, kind: CheckKind) -> HealthStatus {
        match kind {
            CheckKind::Container => self.check_container(node).await,
            CheckKind::Http => self.check_http(node).await,
            CheckKind::Rpc => self.check_json_rpc(node, DEFAULT_RPC_METHOD).await,
        }
    }

    /// 여러 노드를 동시에 검사합니다. 결과 순서는 입력 순서와 같습니다.
    pub async fn check_many(&self, nodes: &[String], kind: CheckKind) -> Vec<HealthStatus> {
        join_all(nodes.iter().map(|node| self.check(node, kind))).await
    }

    /// 모든 노드가 healthy가 될 때까지 재시도합니다.
    ///
    /// # Errors
    ///
    /// 제한 시간이 지나면 마지막 라운드에서 실패한 노드 목록을 담은
    /// [`MonitoringError::HealthTimeout`]을 반환합니다.
    pub async fn wait_for_healthy(
        &self,
        nodes: &[String],
        kind: CheckKind,
        timeout: Duration,
    ) -> Result<Vec<HealthStatus>, MonitoringError> {
        let start = Instant::now();
        loop {
            let statuses = self.check_many(nodes, kind).await;
            let unhealthy: Vec<String> = statuses
                .iter()
                .filter(|s| !s.healthy)
                .map(|s| s.node_id.clone())
                .collect();

            if unhealthy.is_empty() {
                info!(
                    nodes = nodes.len(),
                    kind = %kind,
                    wait_secs = start.elapsed().as_secs_f64(),
                    "nodes healthy"
                );
                return Ok(statuses);
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                error!(kind = %kind, unhealthy = ?unhealthy, timeout_secs = timeout.as_secs(), "health wait timed out");
                return Err(MonitoringError::HealthTimeout {
                    waited_secs: elapsed.as_secs_f64(),
                    unhealthy,
                });
            }
            tokio::time::sleep(self.config.interval.min(timeout - elapsed)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stage_env_core::testing::ScriptedRunner;
    use stage_env_runner::MockContainerProbe;

    fn checker(
        runner: ScriptedRunner,
        probe: MockContainerProbe,
    ) -> HealthChecker<ScriptedRunner, MockContainerProbe> {
        HealthChecker::new(Arc::new(runner), probe, HealthCheckerConfig::default())
    }

    fn nodes(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|n| (*n).to_owned()).collect()
    }

    #[tokio::test]
    async fn running_container_is_healthy() {
        let checker = checker(
            ScriptedRunner::new(),
            MockContainerProbe::new().with_container("cellframe-stage-node-1", true),
        );
        let status = checker.check_container("node1").await;
        assert!(status.healthy);
        assert_eq!(status.details["status"], "running");
        assert!(status.error.is_none());
    }

    #[tokio::test]
    async fn stopped_or_missing_container_is_unhealthy() {
        let checker = checker(
            ScriptedRunner::new(),
            MockContainerProbe::new().with_container("cellframe-stage-node-2", false),
        );
        let stopped = checker.check_container("node2").await;
        assert!(!stopped.healthy);
        assert!(stopped.error.unwrap().contains("not running"));

        let missing = checker.check_container("node3").await;
        assert!(!missing.healthy);
        assert!(missing.error.unwrap().contains("no such container"));
    }

    #[tokio::test]
    async fn rpc_result_means_healthy() {
        let runner = ScriptedRunner::new()
            .on_rpc(Some("node1"), "eth_blockNumber", json!({"jsonrpc": "2.0", "id": 1, "result": "0x2a"}))
            .on_rpc(
                Some("node2"),
                "eth_blockNumber",
                json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32601, "message": "not found"}}),
            );
        let checker = checker(runner, MockContainerProbe::new());

        let ok = checker.check("node1", CheckKind::Rpc).await;
        assert!(ok.healthy);
        assert_eq!(ok.details["response"]["result"], "0x2a");

        let err = checker.check_json_rpc("node2", DEFAULT_RPC_METHOD).await;
        assert!(!err.healthy);
        assert!(err.error.unwrap().contains("-32601"));

        let unreachable = checker.check_json_rpc("node3", DEFAULT_RPC_METHOD).await;
        assert!(!unreachable.healthy);
    }

    #[tokio::test]
    async fn invalid_url_is_unhealthy_not_error() {
        let checker = checker(ScriptedRunner::new(), MockContainerProbe::new());
        let status = checker.check_url("node1", "not a url").await;
        assert!(!status.healthy);
        assert!(status.error.is_some());
        assert_eq!(status.kind, CheckKind::Http);
    }

    #[tokio::test]
    async fn check_many_keeps_input_order() {
        let checker = checker(
            ScriptedRunner::new(),
            MockContainerProbe::new()
                .with_container("cellframe-stage-node-1", true)
                .with_container("cellframe-stage-node-3", true),
        );
        let statuses = checker
            .check_many(&nodes(&["node3", "node2", "node1"]), CheckKind::Container)
            .await;
        let summary: Vec<_> = statuses.iter().map(|s| (s.node_id.as_str(), s.healthy)).collect();
        assert_eq!(summary, [("node3", true), ("node2", false), ("node1", true)]);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_healthy_times_out_with_unhealthy_list() {
        let checker = checker(
            ScriptedRunner::new(),
            MockContainerProbe::new().with_container("cellframe-stage-node-1", true),
        );
        let err = checker
            .wait_for_healthy(&nodes(&["node1", "node2"]), CheckKind::Container, Duration::from_secs(6))
            .await
            .unwrap_err();
        match err {
            MonitoringError::HealthTimeout { waited_secs, unhealthy } => {
                assert!(waited_secs >= 6.0);
                assert_eq!(unhealthy, ["node2"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn wait_for_healthy_returns_immediately_when_healthy() {
        let checker = checker(
            ScriptedRunner::new(),
            MockContainerProbe::new().with_container("cellframe-stage-node-1", true),
        );
        let statuses = checker
            .wait_for_healthy(&nodes(&["node1"]), CheckKind::Container, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(statuses.len(), 1);
    }

    #[tokio::test]
    async fn docker_availability_follows_ping() {
        let up = checker(ScriptedRunner::new(), MockContainerProbe::new());
        assert!(up.docker_available().await);
        let down = checker(ScriptedRunner::new(), MockContainerProbe::new().with_daemon_down());
        assert!(!down.docker_available().await);
    }

    #[test]
    fn check_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_value(CheckKind::Container).unwrap(), "container");
        assert_eq!(CheckKind::Rpc.to_string(), "rpc");
    }
}
