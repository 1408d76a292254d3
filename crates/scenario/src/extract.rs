//! 명령 출력에서 타입이 있는 값을 추출하고 검증합니다.
//!
//! 지갑 주소는 base58 형식 검사에 그치지 않고 75바이트 구조와 SHA3-256
//! 체크섬까지 확인합니다. 체크섬 불일치는 경고가 아니라 추출 실패입니다.

use std::sync::LazyLock;

use regex::Regex;
use sha3::{Digest, Sha3_256};

use crate::schema::{ExtractSpec, ExtractType};

/// 지갑 주소 바이너리 크기: ver(1) + net_id(8) + sig_type(2) + key_hash(32) + checksum(32)
pub const WALLET_ADDRESS_SIZE: usize = 75;

/// 체크섬 계산 대상 길이 (체크섬을 제외한 앞부분)
const WALLET_CHECKSUMMED_LEN: usize = WALLET_ADDRESS_SIZE - 32;

static WALLET_FORMAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]{75,105}$").expect("wallet format pattern is valid")
});

static NODE_ADDRESS_FORMAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Fa-f0-9:]{10,}$").expect("node address format pattern is valid")
});

static HASH_FORMAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(0x)?[A-Fa-f0-9]{64}$").expect("hash format pattern is valid")
});

static TOKEN_FORMAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z0-9_]{1,16}$").expect("token format pattern is valid")
});

const BOOL_TRUE: &[&str] = &["true", "1", "yes", "on", "enabled"];
const BOOL_FALSE: &[&str] = &["false", "0", "no", "off", "disabled"];

/// 추출/검증 실패
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("pattern '{pattern}' not found in output (searched {searched} characters)")]
    NotFound { pattern: String, searched: usize },

    #[error("capture group {group} not found in pattern '{pattern}'")]
    MissingGroup { pattern: String, group: usize },

    #[error("invalid {kind} '{value}': {reason}")]
    Invalid {
        kind: ExtractType,
        value: String,
        reason: String,
    },

    #[error("wallet address checksum mismatch: stored={stored}..., calculated={calculated}...")]
    ChecksumMismatch { stored: String, calculated: String },
}

/// 디코딩된 지갑 주소 구성 요소
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletAddress {
    pub version: u8,
    pub net_id: u64,
    pub sig_type: u16,
    pub key_hash: [u8; 32],
    pub checksum: [u8; 32],
}

impl WalletAddress {
    /// 구성 요소로부터 올바른 체크섬을 가진 75바이트 주소를 만듭니다.
    pub fn encode(version: u8, net_id: u64, sig_type: u16, key_hash: [u8; 32]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(WALLET_ADDRESS_SIZE);
        bytes.push(version);
        bytes.extend_from_slice(&net_id.to_le_bytes());
        bytes.extend_from_slice(&sig_type.to_le_bytes());
        bytes.extend_from_slice(&key_hash);
        let checksum = Sha3_256::digest(&bytes);
        bytes.extend_from_slice(&checksum);
        bytes
    }

    /// 75바이트 주소를 분해하고 체크섬을 검증합니다.
    pub fn decode(bytes: &[u8]) -> Result<Self, ExtractionError> {
        if bytes.len() != WALLET_ADDRESS_SIZE {
            return Err(ExtractionError::Invalid {
                kind: ExtractType::WalletAddress,
                value: hex::encode(bytes),
                reason: format!(
                    "invalid address size: {} bytes (expected {WALLET_ADDRESS_SIZE})",
                    bytes.len()
                ),
            });
        }

        let (body, stored) = bytes.split_at(WALLET_CHECKSUMMED_LEN);
        let calculated = Sha3_256::digest(body);
        if stored != calculated.as_slice() {
            return Err(ExtractionError::ChecksumMismatch {
                stored: short_hex(stored),
                calculated: short_hex(&calculated),
            });
        }

        let mut net_id = [0u8; 8];
        net_id.copy_from_slice(&body[1..9]);
        let mut sig_type = [0u8; 2];
        sig_type.copy_from_slice(&body[9..11]);
        let mut key_hash = [0u8; 32];
        key_hash.copy_from_slice(&body[11..43]);
        let mut checksum = [0u8; 32];
        checksum.copy_from_slice(stored);

        Ok(Self {
            version: body[0],
            net_id: u64::from_le_bytes(net_id),
            sig_type: u16::from_le_bytes(sig_type),
            key_hash,
            checksum,
        })
    }
}

fn short_hex(bytes: &[u8]) -> String {
    hex::encode(&bytes[..bytes.len().min(8)])
}

/// base58 지갑 주소를 검증합니다.
pub fn validate_wallet_address(value: &str) -> Result<WalletAddress, ExtractionError> {
    let invalid = |reason: String| ExtractionError::Invalid {
        kind: ExtractType::WalletAddress,
        value: value.to_owned(),
        reason,
    };
    if !WALLET_FORMAT.is_match(value) {
        return Err(invalid(format!(
            "expected base58, 75-105 characters, got {}",
            value.chars().count()
        )));
    }
    let decoded = bs58::decode(value)
        .into_vec()
        .map_err(|e| invalid(format!("invalid base58: {e}")))?;
    WalletAddress::decode(&decoded)
}

/// 값이 타입 규칙을 만족하는지 검사하고, 정규화된 값을 돌려줍니다.
///
/// 불리언만 `true`/`false`로 정규화되고 나머지는 그대로입니다.
pub fn validate(value: &str, kind: ExtractType) -> Result<String, ExtractionError> {
    let invalid = |reason: &str| ExtractionError::Invalid {
        kind,
        value: value.to_owned(),
        reason: reason.to_owned(),
    };
    match kind {
        ExtractType::Raw => Ok(value.to_owned()),
        ExtractType::WalletAddress => validate_wallet_address(value).map(|_| value.to_owned()),
        ExtractType::NodeAddress => {
            if NODE_ADDRESS_FORMAT.is_match(value) && value.contains("::") {
                Ok(value.to_owned())
            } else {
                Err(invalid("expected hex groups with :: separators, e.g. A1B2::C3D4::E5F6"))
            }
        }
        ExtractType::Hash => {
            if HASH_FORMAT.is_match(value) {
                Ok(value.to_owned())
            } else {
                Err(invalid("expected 64 hex characters, optionally prefixed with 0x"))
            }
        }
        ExtractType::Number => value
            .parse::<f64>()
            .map(|_| value.to_owned())
            .map_err(|_| invalid("not a number")),
        ExtractType::TokenName => {
            if TOKEN_FORMAT.is_match(value) {
                Ok(value.to_owned())
            } else {
                Err(invalid("expected 1-16 uppercase alphanumeric characters"))
            }
        }
        ExtractType::Bool => {
            let lower = value.to_ascii_lowercase();
            if BOOL_TRUE.contains(&lower.as_str()) {
                Ok("true".to_owned())
            } else if BOOL_FALSE.contains(&lower.as_str()) {
                Ok("false".to_owned())
            } else {
                Err(invalid("expected true/false, 1/0, yes/no, on/off, enabled/disabled"))
            }
        }
    }
}

/// 타입별 기본 추출 패턴
pub fn default_pattern(kind: ExtractType) -> &'static str {
    match kind {
        ExtractType::WalletAddress => r"addr:\s+(\S+)",
        ExtractType::NodeAddress => r"(?:node[_-]?addr|address):\s*([A-Fa-f0-9:]+)",
        ExtractType::Hash => r"(?:hash|tx):\s*((?:0x)?[A-Fa-f0-9]{64})",
        ExtractType::Number => r"(\d+(?:\.\d+)?)",
        ExtractType::TokenName => r"token:\s*([A-Z0-9_]+)",
        ExtractType::Bool => r"(true|false|yes|no|1|0|on|off|enabled|disabled)",
        ExtractType::Raw => r"(.+)",
    }
}

/// 출력에서 값을 추출합니다.
///
/// 필수가 아닌 규칙은 실패 시 `default`(없으면 `None`)를 돌려줍니다.
/// 잘못된 정규식은 `required`와 무관하게 에러입니다.
pub fn extract(output: &str, spec: &ExtractSpec) -> Result<Option<String>, ExtractionError> {
    let pattern = spec
        .pattern
        .as_deref()
        .unwrap_or_else(|| default_pattern(spec.kind));
    let regex = regex::RegexBuilder::new(pattern)
        .multi_line(true)
        .build()
        .map_err(|e| ExtractionError::InvalidPattern {
            pattern: pattern.to_owned(),
            reason: e.to_string(),
        })?;

    let outcome = match regex.captures(output) {
        None => Err(ExtractionError::NotFound {
            pattern: pattern.to_owned(),
            searched: output.chars().count(),
        }),
        Some(caps) => match caps.get(spec.group) {
            None => Err(ExtractionError::MissingGroup {
                pattern: pattern.to_owned(),
                group: spec.group,
            }),
            Some(m) => validate(m.as_str(), spec.kind),
        },
    };

    match outcome {
        Ok(value) => Ok(Some(value)),
        Err(err) if spec.required => Err(err),
        Err(err) => {
            tracing::debug!(error = %err, "optional extraction failed, using default");
            Ok(spec.default.clone())
        }
    }
}
