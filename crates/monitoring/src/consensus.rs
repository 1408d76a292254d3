//! 네트워크 합의 모니터
//!
//! 모든 노드를 병렬로 폴링해 노드별 메트릭을 모으고, 클러스터 전체가
//! "준비됨"(온라인, 토폴로지 수렴, 체인 동기화)인지 판정합니다.
//!
//! # 판정 규칙
//!
//! - `all_nodes_online`: 온라인 노드 수가 기대 노드 수와 정확히 같음
//! - `nodes_with_full_list`: 노드 목록 크기가 `expected - 2` 이상인 온라인 노드 수
//! - `all_chains_synced`: 블록이 1개 이상인 온라인 노드들의 `(블록 수, 마지막 해시)`가 모두 같음
//! - `ready`: 모든 노드가 온라인이고, 전체 목록 보유 노드가 정족수(⌈2/3 × expected⌉) 이상이며,
//!   체인이 동기화되었거나 아직 블록이 없음
//!
//! 정족수는 노드 목록 수렴에만 적용됩니다. 모든 노드가 온라인이어도 P2P 탐색이 늦은
//! 노드가 일부 있으면 준비 상태일 수 있고, 한 노드라도 오프라인이면 준비 상태가 아닙니다.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use metrics::{counter, gauge};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use stage_env_core::config::StageEnvConfig;
use stage_env_core::metrics as m;
use stage_env_core::runner::{NodeCommandRunner, split_command};

use crate::error::MonitoringError;
use crate::parse;

/// 진단 메시지에 담을 출력 발췌 길이
const EXCERPT_CHARS: usize = 160;

/// 온라인 노드의 멤풀 요약
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MempoolMetrics {
    pub datum_count: usize,
}

/// 온라인 노드의 합의 역할 정보
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsensusMetrics {
    /// 상태 출력의 `role:` 값 (`master`, `root`, `full` ...)
    pub role: Option<String>,
}

/// 한 번의 폴링에서 얻은 노드 스냅샷
///
/// 폴링마다 새로 만들어지며 이전 값을 갱신하지 않습니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeMetrics {
    pub node_id: String,
    pub node_addr: Option<String>,
    pub node_list: BTreeSet<String>,
    pub chain_blocks: u64,
    pub chain_last_hash: Option<String>,
    pub is_online: bool,
    /// 온라인일 때만 수집
    pub mempool: Option<MempoolMetrics>,
    /// 온라인일 때만 수집
    pub consensus: Option<ConsensusMetrics>,
    pub error: Option<String>,
}

impl NodeMetrics {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            ..Self::default()
        }
    }

    /// 수집에 실패한 노드의 메트릭
    pub fn degraded(node_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn node_list_count(&self) -> usize {
        self.node_list.len()
    }

    /// 에러 없이 온라인으로 확인된 노드
    pub fn counts_as_online(&self) -> bool {
        self.is_online && self.error.is_none()
    }

    /// 타임아웃 진단에 쓰는 한 줄 요약
    pub fn describe(&self) -> String {
        if let Some(err) = &self.error {
            return format!("{}: error: {err}", self.node_id);
        }
        if !self.is_online {
            return format!("{}: offline", self.node_id);
        }
        let tip = self.chain_last_hash.as_deref().unwrap_or("-");
        format!(
            "{}: online, {} known nodes, {} blocks (last {tip})",
            self.node_id,
            self.node_list_count(),
            self.chain_blocks
        )
    }
}

/// 한 폴링 라운드의 합의 상태 (읽기 전용 집계)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NetworkConsensusState {
    pub expected_nodes: usize,
    pub online_nodes: usize,
    pub all_nodes_online: bool,
    pub nodes_with_full_list: usize,
    pub all_nodes_have_same_list: bool,
    pub all_chains_synced: bool,
    /// 서로 다른 `(블록 수, 마지막 해시)` 조합 수, 동기화되었으면 1
    pub unique_chain_states: usize,
    pub ready: bool,
}

impl fmt::Display for NetworkConsensusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "online={}/{} full_list={}/{} chains_synced={} ready={}",
            self.online_nodes,
            self.expected_nodes,
            self.nodes_with_full_list,
            self.expected_nodes,
            self.all_chains_synced,
            self.ready
        )
    }
}

/// 준비 판정에 필요한 정족수 (⌈2/3 × expected⌉)
pub fn quorum(expected: usize) -> usize {
    (expected * 2).div_ceil(3)
}

/// "전체 노드 목록"으로 인정하는 최소 목록 크기
pub fn full_list_threshold(expected: usize) -> usize {
    expected.saturating_sub(2)
}

/// 메트릭 집합으로부터 합의 상태를 계산합니다.
///
/// 입력 외의 상태를 참조하지 않는 순수 함수입니다.
pub fn analyze_consensus(metrics: &[NodeMetrics], expected: usize) -> NetworkConsensusState {
    let mut state = NetworkConsensusState {
        expected_nodes: expected,
        ..NetworkConsensusState::default()
    };

    let online: Vec<&NodeMetrics> = metrics.iter().filter(|n| n.counts_as_online()).collect();
    state.online_nodes = online.len();
    state.all_nodes_online = expected > 0 && state.online_nodes == expected;

    if online.is_empty() {
        return state;
    }

    let threshold = full_list_threshold(expected);
    let full: Vec<&NodeMetrics> = online
        .iter()
        .copied()
        .filter(|n| !n.node_list.is_empty() && n.node_list_count() >= threshold)
        .collect();
    state.nodes_with_full_list = full.len();
    if let [first, rest @ ..] = full.as_slice() {
        state.all_nodes_have_same_list =
            !rest.is_empty() && rest.iter().all(|n| n.node_list == first.node_list);
    }

    let chain_states: BTreeSet<(u64, Option<&str>)> = online
        .iter()
        .filter(|n| n.chain_blocks > 0)
        .map(|n| (n.chain_blocks, n.chain_last_hash.as_deref()))
        .collect();
    state.unique_chain_states = chain_states.len();
    state.all_chains_synced = chain_states.len() == 1;

    state.ready = state.all_nodes_online
        && state.nodes_with_full_list >= quorum(expected)
        && (state.all_chains_synced || state.unique_chain_states == 0);

    state
}

/// 합의 모니터 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusMonitorConfig {
    pub network: String,
    pub chain: String,
    pub nodes: Vec<String>,
    pub check_interval: Duration,
    /// 진행 상황 로그 간격
    pub progress_interval: Duration,
    /// `wait_for_network_ready`의 기본 제한 시간
    pub timeout: Duration,
    pub command_timeout: Duration,
}

impl ConsensusMonitorConfig {
    pub fn from_core(core: &StageEnvConfig) -> Self {
        Self {
            network: core.network.name.clone(),
            chain: core.network.chain.clone(),
            nodes: core.network.nodes.clone(),
            check_interval: Duration::from_secs(core.monitoring.consensus_check_interval_secs),
            progress_interval: Duration::from_secs(core.monitoring.consensus_progress_secs),
            timeout: Duration::from_secs(core.monitoring.consensus_timeout_secs),
            command_timeout: core.runner.command_timeout(),
        }
    }
}

impl Default for ConsensusMonitorConfig {
    fn default() -> Self {
        Self::from_core(&StageEnvConfig::default())
    }
}

/// 네트워크 합의 모니터
pub struct NetworkConsensusMonitor<R> {
    runner: Arc<R>,
    config: ConsensusMonitorConfig,
}

impl<R: NodeCommandRunner> NetworkConsensusMonitor<R> {
    pub fn new(runner: Arc<R>, config: ConsensusMonitorConfig) -> Self {
        info!(
            nodes = config.nodes.len(),
            network = %config.network,
            "network consensus monitor initialized"
        );
        Self { runner, config }
    }

    pub fn config(&self) -> &ConsensusMonitorConfig {
        &self.config
    }

    pub fn expected_nodes(&self) -> usize {
        self.config.nodes.len()
    }

    /// 노드 하나의 메트릭을 수집합니다.
    ///
    /// 멤풀과 역할 정보는 노드가 온라인일 때만 조회합니다.
    ///
    /// # Errors
    ///
    /// 어느 명령이든 실패하면 [`MonitoringError`]를 반환합니다.
    pub async fn collect_node_metrics(&self, node: &str) -> Result<NodeMetrics, MonitoringError> {
        let net = &self.config.network;
        let chain = &self.config.chain;
        let mut metrics = NodeMetrics::new(node);

        let list = self.cli(node, &format!("node list -net {net}")).await?;
        metrics.node_list = parse::parse_node_list(&list);

        let dump = self.cli(node, "node dump").await?;
        metrics.node_addr = parse::parse_node_addr(&dump);

        let blocks = self
            .cli(node, &format!("block list -net {net} -chain {chain} -last 1"))
            .await?;
        (metrics.chain_blocks, metrics.chain_last_hash) = parse::parse_chain_tip(&blocks);

        let status = self.cli(node, &format!("net -net {net} get status")).await?;
        metrics.is_online = parse::is_online(&status);

        if metrics.is_online {
            let mempool = self
                .cli(node, &format!("mempool_proc -list -net {net} -chain {chain}"))
                .await?;
            metrics.mempool = Some(MempoolMetrics {
                datum_count: parse::count_mempool_datums(&mempool),
            });
            metrics.consensus = Some(ConsensusMetrics {
                role: parse::parse_role(&status),
            });
        }

        Ok(metrics)
    }

    /// 모든 노드를 병렬로 폴링합니다.
    ///
    /// 노드별 실패는 `error`가 채워진 메트릭으로 바뀌며 다른 노드에 영향을 주지 않습니다.
    /// 결과 순서는 설정된 노드 순서와 같습니다.
    pub async fn collect_all_metrics(&self) -> Vec<NodeMetrics> {
        let polls = self.config.nodes.iter().map(|node| async move {
            match self.collect_node_metrics(node).await {
                Ok(metrics) => metrics,
                Err(e) => {
                    debug!(node = %node, error = %e, "failed to collect node metrics");
                    NodeMetrics::degraded(node.as_str(), e.to_string())
                }
            }
        });
        join_all(polls).await
    }

    /// 설정된 기대 노드 수로 [`analyze_consensus`]를 호출합니다.
    pub fn analyze_consensus(&self, metrics: &[NodeMetrics]) -> NetworkConsensusState {
        analyze_consensus(metrics, self.expected_nodes())
    }

    /// 네트워크가 준비될 때까지 폴링합니다.
    ///
    /// 제한 시간이 지나도 최소 한 번은 폴링합니다. `timeout`이 `None`이면
    /// 설정의 기본값을 씁니다.
    ///
    /// # Errors
    ///
    /// 제한 시간 안에 준비되지 않으면 마지막 상태와 노드별 진단을 담은
    /// [`MonitoringError::ConsensusTimeout`]을 반환합니다.
    pub async fn wait_for_network_ready(
        &self,
        timeout: Option<Duration>,
    ) -> Result<NetworkConsensusState, MonitoringError> {
        let timeout = timeout.unwrap_or(self.config.timeout);
        let start = Instant::now();
        let mut last_progress: Option<Instant> = None;
        let mut iteration: u32 = 0;

        info!(
            timeout_secs = timeout.as_secs(),
            expected_nodes = self.expected_nodes(),
            "waiting for network consensus"
        );

        loop {
            iteration += 1;
            let metrics = self.collect_all_metrics().await;
            let state = self.analyze_consensus(&metrics);
            let elapsed = start.elapsed();

            gauge!(m::CONSENSUS_ONLINE_NODES).set(state.online_nodes as f64);
            counter!(
                m::CONSENSUS_POLLS_TOTAL,
                m::LABEL_RESULT => if state.ready { "ready" } else { "not_ready" }
            )
            .increment(1);

            if last_progress.is_none_or(|t| t.elapsed() >= self.config.progress_interval) {
                last_progress = Some(Instant::now());
                info!(
                    elapsed_secs = elapsed.as_secs(),
                    online = %format!("{}/{}", state.online_nodes, state.expected_nodes),
                    full_list = %format!("{}/{}", state.nodes_with_full_list, state.expected_nodes),
                    chains_synced = state.all_chains_synced,
                    ready = state.ready,
                    "network consensus progress"
                );
                if !state.ready {
                    for node in &metrics {
                        debug!(
                            node = %node.node_id,
                            online = node.is_online,
                            node_list_count = node.node_list_count(),
                            blocks = node.chain_blocks,
                            error = node.error.as_deref().unwrap_or("none"),
                            "node state"
                        );
                    }
                }
            }

            if state.ready {
                info!(
                    elapsed_secs = elapsed.as_secs_f64(),
                    iterations = iteration,
                    state = %state,
                    "network consensus achieved"
                );
                return Ok(state);
            }

            if elapsed >= timeout {
                error!(
                    elapsed_secs = elapsed.as_secs_f64(),
                    timeout_secs = timeout.as_secs(),
                    state = %state,
                    "network consensus timeout"
                );
                return Err(MonitoringError::ConsensusTimeout {
                    waited_secs: elapsed.as_secs_f64(),
                    node_details: metrics.iter().map(NodeMetrics::describe).collect(),
                    state: Box::new(state),
                });
            }

            let remaining = timeout.saturating_sub(elapsed);
            tokio::time::sleep(self.config.check_interval.min(remaining)).await;
        }
    }

    async fn cli(&self, node: &str, command: &str) -> Result<String, MonitoringError> {
        let argv = split_command(command);
        let out = self
            .runner
            .run(node, &argv, self.config.command_timeout)
            .await?;
        if !out.is_success() {
            warn!(node = %node, command = %command, exit_code = out.exit_code, "node command failed");
            return Err(MonitoringError::CommandFailed {
                node: node.to_owned(),
                command: command.to_owned(),
                exit_code: out.exit_code,
                excerpt: out.excerpt(EXCERPT_CHARS),
            });
        }
        Ok(out.stdout)
    }
}
