//! 스텝 기본값 캐스케이드
//!
//! 전역 → 섹션 → 그룹 순으로 [`StepDefaults::merge`]하고, 스텝을 실행하기 직전에
//! 값이 비어 있는(`None`) 필드만 채웁니다. 스텝이 명시한 값은 기본값과 같더라도
//! 그대로 유지됩니다.

use std::time::Duration;

use crate::schema::{Check, ExpectResult, Step, StepDefaults};

/// 어느 기본값에도 노드가 없을 때 쓰는 노드
pub const FALLBACK_NODE: &str = "node1";

impl StepDefaults {
    /// 더 구체적인 기본값을 덮어씁니다. 필드별로 나중 값이 이기고, `cli` 맵은 합집합입니다.
    pub fn merge(&self, over: Option<&StepDefaults>) -> StepDefaults {
        let Some(over) = over else {
            return self.clone();
        };
        let mut cli = self.cli.clone();
        cli.extend(over.cli.iter().map(|(k, v)| (k.clone(), v.clone())));
        StepDefaults {
            node: over.node.clone().or_else(|| self.node.clone()),
            wait: over.wait.or(self.wait),
            expect: over.expect.or(self.expect),
            timeout: over.timeout.or(self.timeout),
            cli,
        }
    }

    /// 여러 범위를 순서대로 합칩니다.
    pub fn cascade<'a>(scopes: impl IntoIterator<Item = Option<&'a StepDefaults>>) -> StepDefaults {
        scopes
            .into_iter()
            .fold(StepDefaults::default(), |acc, scope| acc.merge(scope))
    }
}

fn fill<T: Clone>(slot: &mut Option<T>, default: &Option<T>) {
    if slot.is_none() {
        slot.clone_from(default);
    }
}

impl Step {
    /// 비어 있는 공통 필드를 기본값으로 채웁니다.
    pub fn apply_defaults(&mut self, defaults: &StepDefaults) {
        match self {
            Step::Cli(step) => {
                fill(&mut step.node, &defaults.node);
                fill(&mut step.wait, &defaults.wait);
                fill(&mut step.expect, &defaults.expect);
                fill(&mut step.timeout, &defaults.timeout);
            }
            Step::Rpc(step) => {
                fill(&mut step.node, &defaults.node);
                fill(&mut step.wait, &defaults.wait);
                fill(&mut step.expect, &defaults.expect);
                fill(&mut step.timeout, &defaults.timeout);
            }
            Step::WaitForDatum(step) => {
                fill(&mut step.node, &defaults.node);
                for slot in [
                    &mut step.timeout_total,
                    &mut step.timeout_mempool,
                    &mut step.timeout_verification,
                    &mut step.timeout_in_blocks,
                ] {
                    fill(slot, &defaults.timeout);
                }
            }
            Step::Python(step) => {
                fill(&mut step.expect, &defaults.expect);
                fill(&mut step.timeout, &defaults.timeout);
            }
            Step::Bash(step) => {
                fill(&mut step.node, &defaults.node);
                fill(&mut step.expect, &defaults.expect);
                fill(&mut step.timeout, &defaults.timeout);
            }
            Step::Tool(step) => {
                fill(&mut step.node, &defaults.node);
                fill(&mut step.expect, &defaults.expect);
                fill(&mut step.timeout, &defaults.timeout);
            }
            Step::Wait(_) | Step::Loop(_) | Step::Group(_) => {}
        }
    }
}

impl Check {
    /// 체크에는 `node`와 `timeout`만 적용됩니다.
    pub fn apply_defaults(&mut self, defaults: &StepDefaults) {
        match self {
            Check::Cli(check) => {
                fill(&mut check.node, &defaults.node);
                fill(&mut check.timeout, &defaults.timeout);
            }
            Check::Rpc(check) => {
                fill(&mut check.node, &defaults.node);
                fill(&mut check.timeout, &defaults.timeout);
            }
            Check::Python(check) => fill(&mut check.timeout, &defaults.timeout),
            Check::Bash(check) => {
                fill(&mut check.node, &defaults.node);
                fill(&mut check.timeout, &defaults.timeout);
            }
        }
    }
}

/// 캐스케이드 후에도 비어 있는 필드를 해석합니다.
pub fn node_or_fallback(node: Option<&str>) -> &str {
    node.unwrap_or(FALLBACK_NODE)
}

pub fn expect_or_default(expect: Option<ExpectResult>) -> ExpectResult {
    expect.unwrap_or_default()
}

pub fn timeout_or(timeout: Option<Duration>, fallback: Duration) -> Duration {
    timeout.unwrap_or(fallback)
}
