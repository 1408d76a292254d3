//! Container state probing through the Docker API.
//!
//! The health checker asks "is the container for this node running?" before it
//! bothers polling the node CLI. [`BollardProbe`] answers through `bollard`;
//! tests use `MockContainerProbe`.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;

use stage_env_core::error::RunnerError;

/// Snapshot of one container's runtime state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerState {
    /// Container name without the leading `/`.
    pub name: String,
    pub running: bool,
    /// Docker status string (`running`, `exited`, `restarting`, ...).
    pub status: String,
    /// Healthcheck status, when the image defines one.
    pub health: Option<String>,
}

/// Docker API operations needed by the health checker.
pub trait ContainerProbe: Send + Sync + 'static {
    /// Inspects a container by name.
    ///
    /// # Errors
    ///
    /// [`RunnerError::ContainerUnavailable`] if the container does not exist
    /// or the Docker daemon rejects the request.
    fn inspect(
        &self,
        container: &str,
    ) -> impl Future<Output = Result<ContainerState, RunnerError>> + Send;

    /// Checks that the Docker daemon is reachable.
    fn ping(&self) -> impl Future<Output = Result<(), RunnerError>> + Send;
}

/// Docker API probe using `bollard`.
pub struct BollardProbe {
    docker: Arc<bollard::Docker>,
}

impl BollardProbe {
    /// Connects using the platform's default local socket.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::ContainerUnavailable`] if the socket cannot be opened.
    pub fn connect_local() -> Result<Self, RunnerError> {
        let docker = bollard::Docker::connect_with_local_defaults().map_err(|e| {
            RunnerError::ContainerUnavailable {
                container: "docker".to_owned(),
                reason: format!("failed to connect to docker: {e}"),
            }
        })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }
}

impl ContainerProbe for BollardProbe {
    async fn inspect(&self, container: &str) -> Result<ContainerState, RunnerError> {
        let details = self
            .docker
            .inspect_container(container, None)
            .await
            .map_err(|e| RunnerError::ContainerUnavailable {
                container: container.to_owned(),
                reason: if e.to_string().contains("404") {
                    "no such container".to_owned()
                } else {
                    format!("inspect failed: {e}")
                },
            })?;

        let name = details
            .name
            .map(|n| n.trim_start_matches('/').to_owned())
            .unwrap_or_else(|| container.to_owned());
        let state = details.state.unwrap_or_default();
        let running = state.running.unwrap_or(false);
        let status = state
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_owned());
        let health = state
            .health
            .and_then(|h| h.status)
            .map(|s| s.to_string());

        Ok(ContainerState {
            name,
            running,
            status,
            health,
        })
    }

    async fn ping(&self) -> Result<(), RunnerError> {
        self.docker
            .ping()
            .await
            .map_err(|e| RunnerError::ContainerUnavailable {
                container: "docker".to_owned(),
                reason: format!("ping failed: {e}"),
            })?;
        Ok(())
    }
}

/// 테스트용 Mock 컨테이너 프로브
///
/// 등록된 컨테이너만 존재하는 것으로 응답합니다.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Default)]
pub struct MockContainerProbe {
    containers: std::collections::HashMap<String, ContainerState>,
    daemon_down: bool,
}

#[cfg(any(test, feature = "test-util"))]
impl MockContainerProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// 실행 중(또는 정지) 상태의 컨테이너를 등록합니다.
    pub fn with_container(mut self, name: &str, running: bool) -> Self {
        self.containers.insert(
            name.to_owned(),
            ContainerState {
                name: name.to_owned(),
                running,
                status: if running { "running" } else { "exited" }.to_owned(),
                health: None,
            },
        );
        self
    }

    /// Docker 데몬이 응답하지 않는 상황을 시뮬레이션합니다.
    pub fn with_daemon_down(mut self) -> Self {
        self.daemon_down = true;
        self
    }
}

#[cfg(any(test, feature = "test-util"))]
impl ContainerProbe for MockContainerProbe {
    async fn inspect(&self, container: &str) -> Result<ContainerState, RunnerError> {
        if self.daemon_down {
            return Err(RunnerError::ContainerUnavailable {
                container: "docker".to_owned(),
                reason: "daemon down".to_owned(),
            });
        }
        self.containers
            .get(container)
            .cloned()
            .ok_or_else(|| RunnerError::ContainerUnavailable {
                container: container.to_owned(),
                reason: "no such container".to_owned(),
            })
    }

    async fn ping(&self) -> Result<(), RunnerError> {
        if self.daemon_down {
            Err(RunnerError::ContainerUnavailable {
                container: "docker".to_owned(),
                reason: "daemon down".to_owned(),
            })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_probe_reports_registered_container() {
        let probe = MockContainerProbe::new().with_container("cellframe-stage-node-1", true);
        let state = probe.inspect("cellframe-stage-node-1").await.unwrap();
        assert!(state.running);
        assert_eq!(state.status, "running");
    }

    #[tokio::test]
    async fn mock_probe_unknown_container_is_unavailable() {
        let probe = MockContainerProbe::new();
        let err = probe.inspect("cellframe-stage-node-9").await.unwrap_err();
        assert!(matches!(err, RunnerError::ContainerUnavailable { .. }));
    }

    #[tokio::test]
    async fn mock_probe_daemon_down_fails_ping() {
        let probe = MockContainerProbe::new()
            .with_container("cellframe-stage-node-1", true)
            .with_daemon_down();
        assert!(probe.ping().await.is_err());
        assert!(probe.inspect("cellframe-stage-node-1").await.is_err());
    }

    #[test]
    fn probe_types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync + 'static>() {}
        assert_send_sync::<BollardProbe>();
        assert_send_sync::<MockContainerProbe>();
    }
}
