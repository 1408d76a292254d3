//! Production [`NodeCommandRunner`] backed by `docker exec` and HTTP JSON-RPC.
//!
//! ```text
//!   Monitors / ScenarioExecutor
//!              │
//!              ▼
//!   ┌────────────────────┐
//!   │ NodeCommandRunner  │ (trait, stage-env-core)
//!   └────────────────────┘
//!        │           │
//!        ▼           ▼
//!   DockerExec   ScriptedRunner (tests)
//!   Runner
//!    │     │
//!    ▼     ▼
//!  docker  reqwest ──► <scheme>://<node>:<rpc_port>
//!  exec
//! ```
//!
//! # Examples
//!
//! ```ignore
//! use stage_env_core::StageEnvConfig;
//! use stage_env_runner::DockerExecRunner;
//!
//! let runner = DockerExecRunner::from_config(&StageEnvConfig::default().runner)?;
//! let out = runner.run("node1", &["version".to_owned()], Duration::from_secs(10)).await?;
//! # Ok::<(), stage_env_core::RunnerError>(())
//! ```

use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use stage_env_core::config::RunnerConfig;
use stage_env_core::error::RunnerError;
use stage_env_core::runner::{
    CommandOutput, HOST_NODE, NodeCommandRunner, RpcRequest, container_name,
};

use crate::process::run_with_timeout;

/// Runs node commands through the docker CLI and RPC calls through `reqwest`.
///
/// Cheap to share behind an `Arc`: the HTTP client pools connections internally.
#[derive(Debug, Clone)]
pub struct DockerExecRunner {
    docker_bin: String,
    cli_path: String,
    container_prefix: String,
    rpc_scheme: String,
    rpc_port: u16,
    http: reqwest::Client,
}

impl DockerExecRunner {
    /// Builds a runner from the `[runner]` config section.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Http`] if the HTTP client cannot be constructed
    /// (e.g. the TLS backend fails to initialise).
    pub fn from_config(config: &RunnerConfig) -> Result<Self, RunnerError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| RunnerError::Http {
                url: String::new(),
                reason: format!("failed to build http client: {e}"),
            })?;
        Ok(Self {
            docker_bin: config.docker_bin.clone(),
            cli_path: config.cli_path.clone(),
            container_prefix: config.container_prefix.clone(),
            rpc_scheme: config.rpc_scheme.clone(),
            rpc_port: config.rpc_port,
            http,
        })
    }

    /// Container name for a node ID (`node2` → `cellframe-stage-node-2`).
    pub fn container_for(&self, node: &str) -> String {
        container_name(&self.container_prefix, node)
    }

    /// JSON-RPC endpoint for a node. Node IDs double as hostnames on the compose network.
    pub fn rpc_url(&self, node: &str) -> String {
        format!("{}://{node}:{}", self.rpc_scheme, self.rpc_port)
    }

    fn docker_exec(&self, node: &str, program: Option<&str>, argv: &[String]) -> Command {
        let mut cmd = Command::new(&self.docker_bin);
        cmd.arg("exec").arg(self.container_for(node));
        if let Some(program) = program {
            cmd.arg(program);
        }
        cmd.args(argv);
        cmd
    }
}

impl NodeCommandRunner for DockerExecRunner {
    async fn run(
        &self,
        node: &str,
        argv: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, RunnerError> {
        let cmd = self.docker_exec(node, Some(&self.cli_path), argv);
        run_with_timeout(cmd, node, &argv.join(" "), timeout).await
    }

    async fn exec(
        &self,
        node: &str,
        argv: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, RunnerError> {
        let cmd = self.docker_exec(node, None, argv);
        run_with_timeout(cmd, node, &argv.join(" "), timeout).await
    }

    async fn run_host(
        &self,
        program: &str,
        args: &[String],
        env: &[(String, String)],
        timeout: Duration,
    ) -> Result<CommandOutput, RunnerError> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        for (key, value) in env {
            cmd.env(key, value);
        }
        run_with_timeout(cmd, HOST_NODE, program, timeout).await
    }

    async fn rpc(
        &self,
        node: &str,
        request: &RpcRequest,
        timeout: Duration,
    ) -> Result<serde_json::Value, RunnerError> {
        let url = self.rpc_url(node);
        debug!(node = node, method = %request.method, url = %url, "sending json-rpc request");

        let response = self
            .http
            .post(&url)
            .json(request)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RunnerError::Timeout {
                        node: node.to_owned(),
                        command: format!("rpc {}", request.method),
                        timeout_secs: timeout.as_secs_f64(),
                    }
                } else {
                    RunnerError::Http {
                        url: url.clone(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| RunnerError::Http {
            url: url.clone(),
            reason: format!("failed to read body: {e}"),
        })?;

        // JSON-RPC 서버는 에러 응답에도 4xx/5xx를 쓸 수 있으므로 본문을 먼저 해석한다
        match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(value) => Ok(value),
            Err(_) if !status.is_success() => Err(RunnerError::Rpc {
                node: node.to_owned(),
                method: request.method.clone(),
                reason: format!("http status {status}"),
            }),
            Err(e) => Err(RunnerError::InvalidResponse {
                node: node.to_owned(),
                reason: format!("response is not JSON: {e}"),
            }),
        }
    }
}
