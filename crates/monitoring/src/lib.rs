//! stage-env 모니터링
//!
//! # Module Structure
//!
//! - [`parse`]: 노드 CLI 출력 파서
//! - [`datum`]: 데이텀 수명주기 모니터 (`DatumMonitor`)
//! - [`consensus`]: 네트워크 합의 모니터 (`NetworkConsensusMonitor`)
//! - [`health`]: 컨테이너/HTTP/RPC 헬스체크 (`HealthChecker`)
//! - [`context`]: 실행 단위 컴포지션 루트 (`MonitoringContext`)
//! - [`error`]: 도메인 에러 (`MonitoringError`)
//!
//! # Architecture
//!
//! ```text
//!                 MonitoringContext (Arc, 실행당 하나)
//!                 │          │            │
//!                 ▼          ▼            ▼
//!         DatumMonitor  NetworkConsensus  HealthChecker
//!                 │       Monitor         │       │
//!                 └──────────┬────────────┘       │
//!                            ▼                    ▼
//!                    NodeCommandRunner      ContainerProbe
//! ```

pub mod consensus;
pub mod context;
pub mod datum;
pub mod error;
pub mod health;
pub mod parse;

// --- Public API Re-exports ---

pub use consensus::{
    ConsensusMetrics, ConsensusMonitorConfig, MempoolMetrics, NetworkConsensusMonitor,
    NetworkConsensusState, NodeMetrics, analyze_consensus,
};
pub use context::MonitoringContext;
pub use datum::{
    DatumMonitor, DatumMonitorConfig, DatumMonitorResult, DatumRequest, DatumStatus, DatumTimeouts,
};
pub use error::MonitoringError;
pub use health::{CheckKind, HealthChecker, HealthCheckerConfig, HealthStatus};
