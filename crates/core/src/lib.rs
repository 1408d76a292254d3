//! stage-env 공통 크레이트
//!
//! 설정, 에러 분류, 노드 명령 실행 trait, 시간 문자열 파싱, 메트릭 이름을 정의합니다.
//! 다른 모든 크레이트가 이 크레이트에 의존합니다.

pub mod config;
pub mod duration;
pub mod error;
pub mod metrics;
pub mod runner;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, RunnerError, StageEnvError};

// 설정
pub use config::StageEnvConfig;

// 실행기 trait
pub use runner::{CommandOutput, NodeCommandRunner, RpcRequest};
