//! stage-env 시나리오
//!
//! YAML로 선언한 시나리오를 읽어 스테이지 네트워크에 대해 실행합니다.
//!
//! # Module Structure
//!
//! - [`schema`]: 시나리오/스텝/체크 타입과 YAML 로딩 (`Scenario`, `Step`, `Check`)
//! - [`defaults`]: 전역 → 섹션 → 그룹 → 스텝 기본값 캐스케이드
//! - [`context`]: 변수 저장소와 결과 기록 (`RuntimeContext`)
//! - [`extract`]: 출력에서 타입별 값 추출/검증 (지갑 주소 체크섬 포함)
//! - [`outcome`]: CLI 출력의 성공/실패 판정
//! - [`cli_options`]: 명령별 지원 옵션 목록과 기본 옵션 주입
//! - [`executor`]: 스텝 디스패치와 실행 (`ScenarioExecutor`)
//! - [`error`]: 도메인 에러 (`ScenarioError`, `StepFailure`)
//!
//! # Architecture
//!
//! ```text
//! scenario.yaml ──▶ Scenario::load_file ──▶ Scenario::validate
//!                                               │
//!                                               ▼
//!                                       ScenarioExecutor
//!                        (setup → test → check, 첫 실패에서 중단)
//!                       │            │               │
//!                       ▼            ▼               ▼
//!              NodeCommandRunner  DatumMonitor   RuntimeContext
//!              (CLI/RPC/exec)     (wait_for_datum) (변수, 결과 기록)
//! ```

pub mod cli_options;
pub mod context;
pub mod defaults;
pub mod error;
pub mod executor;
pub mod extract;
pub mod outcome;
pub mod schema;

// --- Public API Re-exports ---

pub use cli_options::CliOptionRegistry;
pub use context::{ExecutionSummary, RuntimeContext, StepRecord};
pub use error::{FailureKind, ScenarioError, ScenarioExecutionError, StepFailure};
pub use executor::ScenarioExecutor;
pub use extract::{ExtractionError, WalletAddress};
pub use schema::{
    Check, ExpectResult, ExtractSpec, ExtractType, Phase, Scenario, ScenarioKind, Step,
    StepDefaults,
};
