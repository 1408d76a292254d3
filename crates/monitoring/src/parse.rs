//! 노드 CLI 출력 파서
//!
//! 모니터가 의존하는 CLI 출력 형식을 한곳에 모읍니다.
//!
//! | 명령 | 추출 대상 |
//! |------|-----------|
//! | `mempool_proc -list -net <n> -chain <c>` | 데이텀 해시 포함 여부 (부분 문자열) |
//! | `block list -net <n> -chain <c> -last <k>` | `block #<num> ... hash:<h>` 줄 |
//! | `node list -net <n>` | `::`로 이어진 4개 이상의 hex 그룹 |
//! | `node dump` | `addr:` / `node address:` 줄 |
//! | `net -net <n> get status` | `current: NET_STATE_X` 줄 |
//!
//! 모든 함수는 순수 함수이며 입력 문자열 외에는 아무것도 참조하지 않습니다.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static DATUM_HASH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(0x)?[0-9a-fA-F]{64}$").expect("datum hash pattern is valid")
});

static NODE_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9A-Fa-f]+(?:::[0-9A-Fa-f]+){3,}").expect("node address pattern is valid")
});

static BLOCK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)block\s*#\s*(\d+)").expect("block header pattern is valid")
});

static BLOCK_HASH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)hash:\s*((?:0x)?[0-9A-Fa-f]+)").expect("block hash pattern is valid")
});

static BLOCK_TOTAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:total|blocks)\s*:\s*(\d+)").expect("block total pattern is valid")
});

static NET_STATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)current\s*:\s*NET_STATE_([A-Z_]+)").expect("net state pattern is valid")
});

static NODE_ROLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)role\s*:\s*([A-Za-z_]+)").expect("node role pattern is valid")
});

static MEMPOOL_HASH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"0x[0-9A-Fa-f]{64}").expect("mempool hash pattern is valid")
});

/// 블록 목록에서 찾은 블록 참조
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    pub number: u64,
    pub hash: Option<String>,
}

/// 데이텀 해시 형식 검증 (`^(0x)?[0-9a-fA-F]{64}$`)
pub fn is_valid_datum_hash(hash: &str) -> bool {
    DATUM_HASH.is_match(hash)
}

/// `0x` 접두어를 뗀 소문자 hex 본문
fn hash_body(hash: &str) -> String {
    let trimmed = hash.trim();
    trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed)
        .to_ascii_lowercase()
}

/// 출력에 데이텀 해시가 포함되어 있는지 (대소문자, `0x` 접두어 무시)
pub fn output_contains_hash(output: &str, hash: &str) -> bool {
    let body = hash_body(hash);
    !body.is_empty() && output.to_ascii_lowercase().contains(&body)
}

/// `block list` 출력에서 데이텀 해시가 포함된 블록을 찾습니다.
///
/// 해시가 블록 헤더 줄 자체에 있거나, 헤더 다음의 상세 줄에 있을 수 있으므로
/// 가장 최근에 본 헤더를 기억하며 줄 단위로 훑습니다.
pub fn find_datum_block(output: &str, datum_hash: &str) -> Option<BlockRef> {
    let body = hash_body(datum_hash);
    if body.is_empty() {
        return None;
    }

    let mut current: Option<BlockRef> = None;
    for line in output.lines() {
        if let Some(header) = parse_block_header(line) {
            current = Some(header);
        }
        if line.to_ascii_lowercase().contains(&body) {
            if let Some(block) = current.clone() {
                return Some(block);
            }
        }
    }
    None
}

fn parse_block_header(line: &str) -> Option<BlockRef> {
    let number = BLOCK_HEADER
        .captures(line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())?;
    let hash = BLOCK_HASH
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_owned());
    Some(BlockRef { number, hash })
}

/// `block list` 출력에서 체인 높이와 마지막 블록 해시를 구합니다.
///
/// `total:`/`blocks:` 줄이 있으면 그 값을 블록 수로 쓰고, 없으면 가장 높은
/// 블록 번호 + 1을 씁니다. 블록이 없으면 `(0, None)`.
pub fn parse_chain_tip(output: &str) -> (u64, Option<String>) {
    let mut tip: Option<BlockRef> = None;
    for line in output.lines() {
        if let Some(block) = parse_block_header(line) {
            if tip.as_ref().is_none_or(|t| block.number >= t.number) {
                tip = Some(block);
            }
        }
    }

    let reported_total = BLOCK_TOTAL
        .captures(output)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok());

    match (reported_total, tip) {
        (Some(total), tip) => (total, tip.and_then(|t| t.hash)),
        (None, Some(t)) => (t.number + 1, t.hash),
        (None, None) => (0, None),
    }
}

/// `node list` 출력에서 노드 주소 집합을 추출합니다 (대문자로 정규화).
pub fn parse_node_list(output: &str) -> BTreeSet<String> {
    NODE_ADDRESS
        .find_iter(output)
        .map(|m| m.as_str().to_ascii_uppercase())
        .collect()
}

/// `node dump` 출력에서 자기 노드 주소를 추출합니다.
pub fn parse_node_addr(output: &str) -> Option<String> {
    output
        .lines()
        .filter(|line| {
            let lower = line.to_ascii_lowercase();
            lower.contains("node address:") || lower.contains("addr:")
        })
        .find_map(|line| NODE_ADDRESS.find(line))
        .map(|m| m.as_str().to_ascii_uppercase())
}

/// `net get status` 출력에서 현재 상태(`ONLINE`, `OFFLINE`, ...)를 추출합니다.
pub fn parse_net_state(output: &str) -> Option<String> {
    NET_STATE
        .captures(output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_ascii_uppercase())
}

/// `current: NET_STATE_ONLINE`일 때만 온라인으로 봅니다.
pub fn is_online(output: &str) -> bool {
    parse_net_state(output).as_deref() == Some("ONLINE")
}

/// 상태 출력의 `role:` 줄 (없으면 `None`)
pub fn parse_role(output: &str) -> Option<String> {
    NODE_ROLE
        .captures(output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_ascii_lowercase())
}

/// 멤풀 출력에 나타난 서로 다른 데이텀 해시 수
pub fn count_mempool_datums(output: &str) -> usize {
    MEMPOOL_HASH
        .find_iter(output)
        .map(|m| m.as_str().to_ascii_lowercase())
        .collect::<BTreeSet<_>>()
        .len()
}
