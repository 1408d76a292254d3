//! 데이텀 수명주기 모니터
//!
//! 제출된 데이텀 하나가 멤풀 → 검증 → 블록 포함 단계를 거치는지 폴링으로 추적합니다.
//!
//! # 단계와 타임아웃
//!
//! ```text
//!  형식 검증 ──실패──► REJECTED (폴링 없음)
//!      │
//!      ▼
//!  멤풀 대기 ──유예 시간(0.5s) 내 미관측──► REJECTED
//!      │ 관측
//!      ▼
//!  멤풀 체류 ──timeout_mempool 초과──► TIMEOUT_MEMPOOL
//!      │ 멤풀에서 사라짐
//!      ▼
//!  검증 ──timeout_verification 초과 (멤풀 진입 기준)──► TIMEOUT_VERIFICATION
//!      │
//!      ▼
//!  블록 포함 ──timeout_in_blocks 초과 (멤풀 진입 기준)──► TIMEOUT_IN_BLOCKS
//!      │ 최근 블록에서 발견
//!      ▼
//!  PROPAGATED / IN_BLOCKS
//! ```
//!
//! 마스터 노드 확인을 켜면 블록 포함 여부를 설정된 마스터 노드들에서 찾고,
//! 같은 데이텀이 대상 노드의 최근 블록에도 보여야 PROPAGATED가 됩니다.
//! 마스터 노드 목록이 비어 있으면 대상 노드만 확인합니다.
//!
//! `timeout_total`은 단계와 무관하게 매 반복의 가장 먼저 검사됩니다.
//! 단계는 앞으로만 진행하며, 결과의 상태와 경과 시간은 루프의 단일 반환 지점에서
//! 한 번만 정해집니다.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use stage_env_core::config::StageEnvConfig;
use stage_env_core::metrics as m;
use stage_env_core::runner::NodeCommandRunner;

use crate::parse::{self, BlockRef};

/// 블록 포함 여부를 확인할 최근 블록 수
pub const RECENT_BLOCK_WINDOW: u32 = 10;

/// 멤풀 유예 구간에서의 폴링 간격 상한
const GRACE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 데이텀 최종 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatumStatus {
    /// 블록에 포함되었고 마스터 노드 검증을 거쳐 대상 노드까지 전파됨
    Propagated,
    /// 블록에 포함됨 (마스터 노드 확인 생략)
    InBlocks,
    /// 형식 오류 또는 멤풀에 나타나지 않음
    Rejected,
    TimeoutTotal,
    TimeoutMempool,
    TimeoutVerification,
    #[serde(alias = "timeout_blocks")]
    TimeoutInBlocks,
}

impl DatumStatus {
    /// 스텝을 통과시키는 상태인지 (PROPAGATED, IN_BLOCKS)
    pub fn is_success(self) -> bool {
        matches!(self, Self::Propagated | Self::InBlocks)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Propagated => "propagated",
            Self::InBlocks => "in_blocks",
            Self::Rejected => "rejected",
            Self::TimeoutTotal => "timeout_total",
            Self::TimeoutMempool => "timeout_mempool",
            Self::TimeoutVerification => "timeout_verification",
            Self::TimeoutInBlocks => "timeout_in_blocks",
        }
    }
}

impl fmt::Display for DatumStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 단계별 타임아웃
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatumTimeouts {
    pub total: Duration,
    pub mempool: Duration,
    pub verification: Duration,
    pub in_blocks: Duration,
}

impl Default for DatumTimeouts {
    fn default() -> Self {
        Self {
            total: Duration::from_secs(300),
            mempool: Duration::from_secs(60),
            verification: Duration::from_secs(120),
            in_blocks: Duration::from_secs(180),
        }
    }
}

/// 데이텀 하나에 대한 모니터링 요청
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatumRequest {
    pub datum_hash: String,
    /// 데이텀을 확인할 대상 노드
    pub node: String,
    pub network: String,
    pub chain: String,
    pub check_master_nodes: bool,
    pub timeouts: DatumTimeouts,
    pub check_interval: Duration,
}

impl DatumRequest {
    pub fn new(
        datum_hash: impl Into<String>,
        node: impl Into<String>,
        network: impl Into<String>,
        chain: impl Into<String>,
    ) -> Self {
        Self {
            datum_hash: datum_hash.into(),
            node: node.into(),
            network: network.into(),
            chain: chain.into(),
            check_master_nodes: true,
            timeouts: DatumTimeouts::default(),
            check_interval: Duration::from_secs(2),
        }
    }

    pub fn with_timeouts(mut self, timeouts: DatumTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn with_master_check(mut self, enabled: bool) -> Self {
        self.check_master_nodes = enabled;
        self
    }
}

/// 모니터링 결과 (반환 후 불변)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatumMonitorResult {
    pub status: DatumStatus,
    pub datum_hash: String,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed_time: Duration,
    pub details: BTreeMap<String, serde_json::Value>,
    pub error_message: Option<String>,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// 데이텀 모니터 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatumMonitorConfig {
    /// 이 시간 안에 멤풀에서 한 번도 보이지 않으면 REJECTED
    pub mempool_grace: Duration,
    /// 정체 시 하트비트 로그 간격
    pub heartbeat: Duration,
    /// 개별 CLI 폴링 명령 타임아웃
    pub poll_timeout: Duration,
    /// 요청이 간격을 지정하지 않을 때 쓰는 폴링 간격
    pub default_check_interval: Duration,
    /// 블록 포함을 확인할 마스터 노드 (비어 있으면 대상 노드)
    pub master_nodes: Vec<String>,
}

impl Default for DatumMonitorConfig {
    fn default() -> Self {
        Self {
            mempool_grace: Duration::from_millis(500),
            heartbeat: Duration::from_secs(10),
            poll_timeout: Duration::from_secs(30),
            default_check_interval: Duration::from_secs(2),
            master_nodes: Vec::new(),
        }
    }
}

impl DatumMonitorConfig {
    /// 통합 설정에서 데이텀 모니터 설정을 만듭니다.
    pub fn from_core(core: &StageEnvConfig) -> Self {
        Self {
            mempool_grace: Duration::from_millis(core.monitoring.mempool_grace_ms),
            heartbeat: Duration::from_secs(core.monitoring.heartbeat_secs),
            poll_timeout: core.runner.command_timeout(),
            default_check_interval: Duration::from_millis(core.monitoring.datum_check_interval_ms),
            master_nodes: core.network.master_nodes.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    AwaitingMempool,
    InMempool,
    Verifying,
    AwaitingBlock,
}

impl Stage {
    fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingMempool => "awaiting_mempool",
            Self::InMempool => "mempool",
            Self::Verifying => "verification",
            Self::AwaitingBlock => "block_inclusion",
        }
    }
}

/// 한 번의 반복이 루프에 알려주는 다음 동작
enum Tick {
    /// 같은 단계에 머무름, `check_interval` 만큼 대기
    Stay,
    /// 방금 다음 단계로 넘어감, 대기 없이 바로 다음 반복
    Advance,
    Finish(DatumStatus, Option<String>),
}

/// 반복 사이에 유지되는 단계 타임스탬프 (모니터링 시작 기준 경과 시간)
#[derive(Debug, Default)]
struct Timeline {
    mempool_entered: Option<Duration>,
    left_mempool: Option<Duration>,
    verified: Option<Duration>,
    in_blocks: Option<Duration>,
    propagated: Option<Duration>,
    block: Option<BlockRef>,
    /// 블록을 처음 발견한 노드
    block_source: Option<String>,
}

impl Timeline {
    fn since_mempool_entry(&self, now: Duration) -> Duration {
        now.saturating_sub(self.mempool_entered.unwrap_or_default())
    }
}

/// 데이텀 모니터
pub struct DatumMonitor<R> {
    runner: Arc<R>,
    config: DatumMonitorConfig,
}

impl<R: NodeCommandRunner> DatumMonitor<R> {
    pub fn new(runner: Arc<R>, config: DatumMonitorConfig) -> Self {
        Self { runner, config }
    }

    pub fn config(&self) -> &DatumMonitorConfig {
        &self.config
    }

    /// 데이텀이 블록에 포함될 때까지 기다립니다.
    ///
    /// 폴링 중의 명령 실패는 "관측되지 않음"으로 취급하고 계속 진행하므로
    /// 이 함수 자체는 실패하지 않습니다. 결과는 항상 상태 하나로 끝납니다.
    pub async fn wait_for_datum(&self, req: &DatumRequest) -> DatumMonitorResult {
        let short = short_hash(&req.datum_hash);
        let start = Instant::now();

        if !parse::is_valid_datum_hash(&req.datum_hash) {
            warn!(hash = %req.datum_hash, "malformed datum hash, rejecting without polling");
            return self.finish(
                req,
                start.elapsed(),
                DatumStatus::Rejected,
                Some(format!("malformed datum hash '{}'", req.datum_hash)),
                Timeline::default(),
                Stage::AwaitingMempool,
            );
        }

        info!(
            hash = %short,
            node = %req.node,
            network = %req.network,
            chain = %req.chain,
            "monitoring datum"
        );

        let mut stage = Stage::AwaitingMempool;
        let mut timeline = Timeline::default();
        let mut last_heartbeat = Duration::ZERO;

        let (status, error_message) = loop {
            let now = start.elapsed();
            if now > req.timeouts.total {
                break (
                    DatumStatus::TimeoutTotal,
                    Some(format!(
                        "datum not committed within {:.0}s (stuck in {} stage)",
                        req.timeouts.total.as_secs_f64(),
                        stage.as_str()
                    )),
                );
            }

            let tick = match stage {
                Stage::AwaitingMempool => {
                    if self.in_mempool(req).await {
                        timeline.mempool_entered = Some(start.elapsed());
                        stage = Stage::InMempool;
                        info!(hash = %short, "datum entered mempool");
                        Tick::Stay
                    } else if let Some(block) = self.find_in_blocks(&req.node, req).await {
                        // 첫 폴링 전에 이미 커밋된 경우
                        timeline.in_blocks = Some(start.elapsed());
                        timeline.block = Some(block);
                        timeline.block_source = Some(req.node.clone());
                        stage = Stage::AwaitingBlock;
                        Tick::Finish(success_status(req), None)
                    } else if start.elapsed() >= self.config.mempool_grace {
                        Tick::Finish(
                            DatumStatus::Rejected,
                            Some(format!(
                                "datum never appeared in mempool within {}ms; the submitting command most likely failed",
                                self.config.mempool_grace.as_millis()
                            )),
                        )
                    } else {
                        let remaining = self.config.mempool_grace.saturating_sub(start.elapsed());
                        tokio::time::sleep(
                            GRACE_POLL_INTERVAL.min(req.check_interval).min(remaining),
                        )
                        .await;
                        Tick::Advance
                    }
                }
                Stage::InMempool => {
                    if self.in_mempool(req).await {
                        let in_stage = timeline.since_mempool_entry(start.elapsed());
                        if in_stage > req.timeouts.mempool {
                            Tick::Finish(
                                DatumStatus::TimeoutMempool,
                                Some(format!(
                                    "datum stuck in mempool for {:.1}s (limit {:.0}s)",
                                    in_stage.as_secs_f64(),
                                    req.timeouts.mempool.as_secs_f64()
                                )),
                            )
                        } else {
                            Tick::Stay
                        }
                    } else {
                        timeline.left_mempool = Some(start.elapsed());
                        stage = Stage::Verifying;
                        info!(hash = %short, "datum left mempool");
                        Tick::Advance
                    }
                }
                Stage::Verifying => {
                    if self.verified(req) {
                        timeline.verified = Some(start.elapsed());
                        stage = Stage::AwaitingBlock;
                        info!(hash = %short, check_master_nodes = req.check_master_nodes, "datum verified");
                        Tick::Advance
                    } else {
                        let since = timeline.since_mempool_entry(start.elapsed());
                        if since > req.timeouts.verification {
                            Tick::Finish(
                                DatumStatus::TimeoutVerification,
                                Some(format!(
                                    "datum not verified {:.1}s after entering mempool (limit {:.0}s)",
                                    since.as_secs_f64(),
                                    req.timeouts.verification.as_secs_f64()
                                )),
                            )
                        } else {
                            Tick::Stay
                        }
                    }
                }
                Stage::AwaitingBlock => {
                    if timeline.block.is_none()
                        && let Some((block, source)) = self.find_committed(req).await
                    {
                        timeline.in_blocks = Some(start.elapsed());
                        info!(hash = %short, block = block.number, source = %source, "datum included in block");
                        timeline.block = Some(block);
                        timeline.block_source = Some(source);
                    }

                    let reached_target = match timeline.block_source.as_deref() {
                        None => false,
                        Some(source) if source == req.node => true,
                        Some(_) => self.find_in_blocks(&req.node, req).await.is_some(),
                    };
                    if reached_target {
                        if timeline.block_source.as_deref() != Some(req.node.as_str()) {
                            timeline.propagated = Some(start.elapsed());
                            info!(hash = %short, node = %req.node, "datum block propagated to node");
                        }
                        Tick::Finish(success_status(req), None)
                    } else {
                        let since = timeline.since_mempool_entry(start.elapsed());
                        if since > req.timeouts.in_blocks {
                            let message = match timeline.block_source.as_deref() {
                                Some(source) => format!(
                                    "datum committed on {source} but not seen on {} {:.1}s after entering mempool (limit {:.0}s)",
                                    req.node,
                                    since.as_secs_f64(),
                                    req.timeouts.in_blocks.as_secs_f64()
                                ),
                                None => format!(
                                    "datum not found in the last {RECENT_BLOCK_WINDOW} blocks {:.1}s after entering mempool (limit {:.0}s)",
                                    since.as_secs_f64(),
                                    req.timeouts.in_blocks.as_secs_f64()
                                ),
                            };
                            Tick::Finish(DatumStatus::TimeoutInBlocks, Some(message))
                        } else {
                            Tick::Stay
                        }
                    }
                }
            };

            match tick {
                Tick::Finish(status, message) => break (status, message),
                Tick::Advance => continue,
                Tick::Stay => {}
            }

            let now = start.elapsed();
            if now.saturating_sub(last_heartbeat) >= self.config.heartbeat {
                last_heartbeat = now;
                info!(
                    hash = %short,
                    stage = stage.as_str(),
                    elapsed_secs = now.as_secs(),
                    "datum still pending"
                );
            }

            let remaining = req.timeouts.total.saturating_sub(now);
            tokio::time::sleep(req.check_interval.min(remaining) + Duration::from_millis(1)).await;
        };

        self.finish(req, start.elapsed(), status, error_message, timeline, stage)
    }

    /// 결과를 한 번에 조립합니다.
    fn finish(
        &self,
        req: &DatumRequest,
        elapsed: Duration,
        status: DatumStatus,
        error_message: Option<String>,
        timeline: Timeline,
        stage: Stage,
    ) -> DatumMonitorResult {
        let mut details = BTreeMap::new();
        details.insert("node".to_owned(), req.node.clone().into());
        details.insert("network".to_owned(), req.network.clone().into());
        details.insert("chain".to_owned(), req.chain.clone().into());
        details.insert("stage".to_owned(), stage.as_str().into());
        details.insert(
            "mempool_observed".to_owned(),
            timeline.mempool_entered.is_some().into(),
        );

        let stamps = [
            ("mempool_entered_at", timeline.mempool_entered),
            ("left_mempool_at", timeline.left_mempool),
            ("verified_at", timeline.verified),
            ("in_blocks_at", timeline.in_blocks),
            ("propagated_at", timeline.propagated),
        ];
        for (key, value) in stamps {
            if let Some(at) = value {
                details.insert(key.to_owned(), serde_json::json!(round_ms(at)));
            }
        }
        if let Some(block) = timeline.block {
            details.insert("block_number".to_owned(), block.number.into());
            if let Some(hash) = block.hash {
                details.insert("block_hash".to_owned(), hash.into());
            }
        }
        if let Some(source) = timeline.block_source {
            details.insert("block_source".to_owned(), source.into());
        }

        counter!(m::DATUM_RESULTS_TOTAL, m::LABEL_STATUS => status.as_str()).increment(1);
        histogram!(m::DATUM_WAIT_DURATION_SECONDS).record(elapsed.as_secs_f64());

        if status.is_success() {
            info!(hash = %short_hash(&req.datum_hash), status = %status, elapsed_secs = elapsed.as_secs_f64(), "datum committed");
        } else {
            warn!(
                hash = %short_hash(&req.datum_hash),
                status = %status,
                elapsed_secs = elapsed.as_secs_f64(),
                reason = error_message.as_deref().unwrap_or(""),
                "datum monitoring failed"
            );
        }

        DatumMonitorResult {
            status,
            datum_hash: req.datum_hash.clone(),
            elapsed_time: elapsed,
            details,
            error_message,
        }
    }

    async fn in_mempool(&self, req: &DatumRequest) -> bool {
        let argv = to_argv(&["mempool_proc", "-list", "-net", &req.network, "-chain", &req.chain]);
        match self.runner.run(&req.node, &argv, self.config.poll_timeout).await {
            Ok(out) if out.is_success() => parse::output_contains_hash(&out.stdout, &req.datum_hash),
            Ok(out) => {
                debug!(node = %req.node, exit_code = out.exit_code, "mempool poll failed");
                false
            }
            Err(e) => {
                debug!(node = %req.node, error = %e, "mempool poll error");
                false
            }
        }
    }

    /// 검증 단계
    ///
    /// 노드 CLI는 데이텀별 검증 상태를 노출하지 않으므로, 멤풀에서 거부 없이
    /// 빠져나온 데이텀은 마스터 노드가 처리한 것으로 간주합니다.
    fn verified(&self, req: &DatumRequest) -> bool {
        if !req.check_master_nodes {
            debug!(hash = %short_hash(&req.datum_hash), "master node verification skipped");
        }
        true
    }

    /// 블록 포함을 확인할 노드 목록
    fn block_sources<'a>(&'a self, req: &'a DatumRequest) -> Vec<&'a str> {
        if req.check_master_nodes && !self.config.master_nodes.is_empty() {
            self.config.master_nodes.iter().map(String::as_str).collect()
        } else {
            vec![req.node.as_str()]
        }
    }

    /// 데이텀을 포함한 블록과 그 블록을 처음 보여준 노드
    async fn find_committed(&self, req: &DatumRequest) -> Option<(BlockRef, String)> {
        for node in self.block_sources(req) {
            if let Some(block) = self.find_in_blocks(node, req).await {
                return Some((block, node.to_owned()));
            }
        }
        None
    }

    async fn find_in_blocks(&self, node: &str, req: &DatumRequest) -> Option<BlockRef> {
        let window = RECENT_BLOCK_WINDOW.to_string();
        let argv = to_argv(&[
            "block", "list", "-net", &req.network, "-chain", &req.chain, "-last", &window,
        ]);
        match self.runner.run(node, &argv, self.config.poll_timeout).await {
            Ok(out) if out.is_success() => parse::find_datum_block(&out.stdout, &req.datum_hash),
            Ok(out) => {
                debug!(node, exit_code = out.exit_code, "block poll failed");
                None
            }
            Err(e) => {
                debug!(node, error = %e, "block poll error");
                None
            }
        }
    }
}

fn success_status(req: &DatumRequest) -> DatumStatus {
    if req.check_master_nodes {
        DatumStatus::Propagated
    } else {
        DatumStatus::InBlocks
    }
}

fn to_argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| (*p).to_owned()).collect()
}

fn short_hash(hash: &str) -> &str {
    hash.get(..18).unwrap_or(hash)
}

fn round_ms(d: Duration) -> f64 {
    (d.as_secs_f64() * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use stage_env_core::runner::CommandOutput;
    use stage_env_core::testing::ScriptedRunner;

    const HASH: &str = "0x4E5A0B3F9C8D7E6F5A4B3C2D1E0F9A8B7C6D5E4F3A2B1C0D9E8F7A6B5C4D3E2F";

    fn monitor(runner: ScriptedRunner) -> (Arc<ScriptedRunner>, DatumMonitor<ScriptedRunner>) {
        let runner = Arc::new(runner);
        let monitor = DatumMonitor::new(Arc::clone(&runner), DatumMonitorConfig::default());
        (runner, monitor)
    }

    fn request() -> DatumRequest {
        DatumRequest::new(HASH, "node1", "stagenet", "main")
    }

    fn mempool_with_hash() -> CommandOutput {
        CommandOutput::ok(format!("stagenet.main: 1 datum\n  {}\n", HASH.to_ascii_lowercase()))
    }

    fn empty() -> CommandOutput {
        CommandOutput::ok("")
    }

    fn block_with_hash() -> CommandOutput {
        CommandOutput::ok(format!(
            "block #41 hash: 0x0041 datums: 0\nblock #42 hash: 0x00AA datum: {HASH}\n"
        ))
    }

    fn secs(result: &DatumMonitorResult, key: &str) -> f64 {
        result.details[key].as_f64().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_hash_is_rejected_without_polling() {
        let (runner, monitor) = monitor(ScriptedRunner::new());
        let malformed = vec![
            String::new(),
            "0x1234".to_owned(),
            "zz".to_owned(),
            format!("{HASH}ff"),
            HASH.replace('4', "x"),
        ];
        for bad in malformed {
            let req = DatumRequest::new(bad.as_str(), "node1", "stagenet", "main");
            let result = monitor.wait_for_datum(&req).await;
            assert_eq!(result.status, DatumStatus::Rejected, "{bad}");
            assert!(result.error_message.unwrap().contains("malformed"));
        }
        assert!(runner.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn never_in_mempool_is_rejected_quickly() {
        let (runner, monitor) = monitor(
            ScriptedRunner::new()
                .on(None, "mempool_proc", empty())
                .on(None, "block list", empty()),
        );
        let result = monitor.wait_for_datum(&request()).await;
        assert_eq!(result.status, DatumStatus::Rejected);
        assert!(result.elapsed_time < Duration::from_secs(1));
        assert_eq!(result.details["mempool_observed"], false);
        assert!(runner.count_calls("mempool_proc -list -net stagenet -chain main") >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn mempool_then_block_succeeds_with_monotonic_stages() {
        let (_runner, monitor) = monitor(
            ScriptedRunner::new()
                .on_sequence(
                    Some("node1"),
                    "mempool_proc",
                    vec![mempool_with_hash(), mempool_with_hash(), empty()],
                )
                .on_sequence(
                    Some("node1"),
                    "block list",
                    vec![empty(), empty(), block_with_hash()],
                ),
        );
        let result = monitor.wait_for_datum(&request()).await;

        assert_eq!(result.status, DatumStatus::Propagated);
        assert!(result.error_message.is_none());
        assert_eq!(result.details["block_number"], 42);
        assert_eq!(result.details["block_hash"], "0x00AA");

        let entered = secs(&result, "mempool_entered_at");
        let left = secs(&result, "left_mempool_at");
        let verified = secs(&result, "verified_at");
        let in_blocks = secs(&result, "in_blocks_at");
        assert!(entered <= left);
        assert!(left <= verified);
        assert!(verified <= in_blocks);
        assert!(entered < in_blocks);
    }

    #[tokio::test(start_paused = true)]
    async fn without_master_check_success_is_in_blocks() {
        let (_runner, monitor) = monitor(
            ScriptedRunner::new()
                .on_sequence(None, "mempool_proc", vec![mempool_with_hash(), empty()])
                .on(None, "block list", block_with_hash()),
        );
        let req = request().with_master_check(false);
        let result = monitor.wait_for_datum(&req).await;
        assert_eq!(result.status, DatumStatus::InBlocks);
    }

    fn monitor_with_masters(
        runner: ScriptedRunner,
        masters: &[&str],
    ) -> (Arc<ScriptedRunner>, DatumMonitor<ScriptedRunner>) {
        let runner = Arc::new(runner);
        let config = DatumMonitorConfig {
            master_nodes: masters.iter().map(|n| (*n).to_owned()).collect(),
            ..DatumMonitorConfig::default()
        };
        (Arc::clone(&runner), DatumMonitor::new(runner, config))
    }

    #[tokio::test(start_paused = true)]
    async fn block_found_on_master_then_propagated_to_target() {
        let (runner, monitor) = monitor_with_masters(
            ScriptedRunner::new()
                .on_sequence(None, "mempool_proc", vec![mempool_with_hash(), empty()])
                .on(Some("node1"), "block list", empty())
                .on(Some("node2"), "block list", block_with_hash())
                .on_sequence(
                    Some("node4"),
                    "block list",
                    vec![empty(), empty(), empty(), block_with_hash()],
                ),
            &["node1", "node2"],
        );
        let req = DatumRequest::new(HASH, "node4", "stagenet", "main");
        let result = monitor.wait_for_datum(&req).await;

        assert_eq!(result.status, DatumStatus::Propagated);
        assert_eq!(result.details["block_source"], "node2");
        assert!(secs(&result, "in_blocks_at") < secs(&result, "propagated_at"));
        assert_eq!(
            runner
                .calls()
                .iter()
                .filter(|c| c.node == "node2" && c.command.starts_with("block list"))
                .count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn block_missing_on_target_times_out_naming_both_nodes() {
        let (_runner, monitor) = monitor_with_masters(
            ScriptedRunner::new()
                .on_sequence(None, "mempool_proc", vec![mempool_with_hash(), empty()])
                .on(Some("node1"), "block list", block_with_hash())
                .on(Some("node4"), "block list", empty()),
            &["node1"],
        );
        let req = DatumRequest::new(HASH, "node4", "stagenet", "main").with_timeouts(
            DatumTimeouts {
                in_blocks: Duration::from_secs(20),
                ..DatumTimeouts::default()
            },
        );
        let result = monitor.wait_for_datum(&req).await;

        assert_eq!(result.status, DatumStatus::TimeoutInBlocks);
        let message = result.error_message.unwrap();
        assert!(message.contains("committed on node1"));
        assert!(message.contains("node4"));
        assert_eq!(result.details["block_number"], 42);
    }

    #[tokio::test(start_paused = true)]
    async fn master_nodes_are_ignored_without_master_check() {
        let (runner, monitor) = monitor_with_masters(
            ScriptedRunner::new()
                .on_sequence(None, "mempool_proc", vec![mempool_with_hash(), empty()])
                .on(None, "block list", block_with_hash()),
            &["node1", "node2"],
        );
        let req = DatumRequest::new(HASH, "node4", "stagenet", "main").with_master_check(false);
        let result = monitor.wait_for_datum(&req).await;

        assert_eq!(result.status, DatumStatus::InBlocks);
        assert_eq!(result.details["block_source"], "node4");
        assert!(runner.calls().iter().all(|c| c.node == "node4"));
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_in_mempool_times_out() {
        let (_runner, monitor) =
            monitor(ScriptedRunner::new().on(None, "mempool_proc", mempool_with_hash()));
        let req = request().with_timeouts(DatumTimeouts {
            mempool: Duration::from_secs(10),
            ..DatumTimeouts::default()
        });
        let result = monitor.wait_for_datum(&req).await;
        assert_eq!(result.status, DatumStatus::TimeoutMempool);
        assert!(result.elapsed_time >= Duration::from_secs(10));
        assert!(result.elapsed_time < Duration::from_secs(20));
        assert_eq!(result.details["stage"], "mempool");
    }

    #[tokio::test(start_paused = true)]
    async fn never_in_block_times_out_from_mempool_entry() {
        let (_runner, monitor) = monitor(
            ScriptedRunner::new()
                .on_sequence(None, "mempool_proc", vec![mempool_with_hash(), empty()])
                .on(None, "block list", CommandOutput::ok("block #1 hash:0x01\n")),
        );
        let req = request().with_timeouts(DatumTimeouts {
            in_blocks: Duration::from_secs(20),
            ..DatumTimeouts::default()
        });
        let result = monitor.wait_for_datum(&req).await;
        assert_eq!(result.status, DatumStatus::TimeoutInBlocks);
        assert!(result.elapsed_time >= Duration::from_secs(20));
        assert!(result.details.contains_key("verified_at"));
        assert!(!result.details.contains_key("block_number"));
    }

    #[tokio::test(start_paused = true)]
    async fn total_timeout_is_checked_first() {
        let (_runner, monitor) =
            monitor(ScriptedRunner::new().on(None, "mempool_proc", mempool_with_hash()));
        let req = request().with_timeouts(DatumTimeouts {
            total: Duration::from_secs(5),
            mempool: Duration::from_secs(60),
            ..DatumTimeouts::default()
        });
        let result = monitor.wait_for_datum(&req).await;
        assert_eq!(result.status, DatumStatus::TimeoutTotal);
        assert!(result.error_message.unwrap().contains("mempool"));
    }

    #[tokio::test(start_paused = true)]
    async fn already_committed_datum_is_not_rejected() {
        let (_runner, monitor) = monitor(
            ScriptedRunner::new()
                .on(None, "mempool_proc", empty())
                .on(None, "block list", block_with_hash()),
        );
        let result = monitor.wait_for_datum(&request()).await;
        assert_eq!(result.status, DatumStatus::Propagated);
        assert_eq!(result.details["mempool_observed"], false);
        assert_eq!(result.details["block_number"], 42);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_errors_are_treated_as_absence() {
        let (_runner, monitor) = monitor(
            ScriptedRunner::new()
                .on_timeout(None, "mempool_proc")
                .on_error(None, "block list", "container gone"),
        );
        let result = monitor.wait_for_datum(&request()).await;
        assert_eq!(result.status, DatumStatus::Rejected);
    }

    #[test]
    fn status_serialization_and_success_set() {
        assert_eq!(
            serde_json::to_value(DatumStatus::TimeoutInBlocks).unwrap(),
            "timeout_in_blocks"
        );
        let legacy: DatumStatus = serde_json::from_value("timeout_blocks".into()).unwrap();
        assert_eq!(legacy, DatumStatus::TimeoutInBlocks);
        assert!(DatumStatus::Propagated.is_success());
        assert!(DatumStatus::InBlocks.is_success());
        assert!(!DatumStatus::Rejected.is_success());
        assert_eq!(DatumStatus::TimeoutTotal.to_string(), "timeout_total");
    }

    #[test]
    fn config_from_core() {
        let mut core = StageEnvConfig::default();
        core.monitoring.mempool_grace_ms = 750;
        let cfg = DatumMonitorConfig::from_core(&core);
        assert_eq!(cfg.mempool_grace, Duration::from_millis(750));
        assert_eq!(cfg.poll_timeout, Duration::from_secs(30));
        assert_eq!(cfg.master_nodes, core.network.master_nodes);
    }
}
