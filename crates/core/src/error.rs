//! 에러 타입: 도메인별 에러 정의
//!
//! 각 크레이트는 자신의 에러 enum을 갖고, `From` 구현으로 [`StageEnvError`]에 합류합니다.

/// stage-env 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum StageEnvError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 노드 명령 실행 에러
    #[error("runner error: {0}")]
    Runner(#[from] RunnerError),

    /// 모니터링 에러 (데이텀, 합의, 헬스체크)
    #[error("monitoring error: {0}")]
    Monitoring(String),

    /// 시나리오 실행 에러
    #[error("scenario error: {0}")]
    Scenario(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 노드 명령 실행 에러
///
/// 타임아웃은 명령 종류와 무관하게 하나의 variant로 표현하되,
/// 어떤 노드의 어떤 명령이 멈췄는지를 함께 담습니다.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// 명령이 제한 시간 안에 끝나지 않음 (프로세스는 종료됨)
    #[error("command '{command}' on {node} timed out after {timeout_secs:.1}s")]
    Timeout {
        node: String,
        command: String,
        timeout_secs: f64,
    },

    /// 프로세스 생성 실패
    #[error("failed to spawn '{program}': {reason}")]
    Spawn { program: String, reason: String },

    /// 노드 컨테이너에 접근할 수 없음
    #[error("container '{container}' unavailable: {reason}")]
    ContainerUnavailable { container: String, reason: String },

    /// JSON-RPC 호출 실패
    #[error("rpc call '{method}' on {node} failed: {reason}")]
    Rpc {
        node: String,
        method: String,
        reason: String,
    },

    /// HTTP 전송 실패
    #[error("http request to {url} failed: {reason}")]
    Http { url: String, reason: String },

    /// 응답 형식이 예상과 다름
    #[error("invalid response from {node}: {reason}")]
    InvalidResponse { node: String, reason: String },
}

impl RunnerError {
    /// 타임아웃 에러인지 확인합니다.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
