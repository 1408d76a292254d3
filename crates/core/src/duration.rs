//! 시간 문자열 파싱
//!
//! 시나리오 파일의 `wait: 5s`, `timeout: 30` 같은 값을 [`Duration`]으로 바꿉니다.
//! 단위가 없는 숫자는 초로 해석하고, 단위가 있으면 `humantime` 문법을 따릅니다
//! (`100ms`, `5s`, `2m`, `1h 30m`).

use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;

/// 시간 문자열을 파싱합니다.
///
/// # Errors
///
/// 빈 문자열, 음수, 알 수 없는 단위는 [`ConfigError::InvalidValue`]를 반환합니다.
pub fn parse_duration(text: &str) -> Result<Duration, ConfigError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(invalid_duration(text, "empty duration"));
    }
    if let Ok(secs) = trimmed.parse::<f64>() {
        return secs_to_duration(secs).ok_or_else(|| invalid_duration(text, "must be a non-negative number of seconds"));
    }
    humantime::parse_duration(trimmed).map_err(|e| invalid_duration(text, &e.to_string()))
}

fn secs_to_duration(secs: f64) -> Option<Duration> {
    (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
}

fn invalid_duration(text: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: "duration".to_owned(),
        reason: format!("'{text}': {reason}"),
    }
}

/// 숫자(초) 또는 문자열 형태의 YAML/TOML 값
#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Secs(f64),
    Text(String),
}

impl RawDuration {
    fn into_duration<E: serde::de::Error>(self) -> Result<Duration, E> {
        match self {
            Self::Secs(secs) => secs_to_duration(secs)
                .ok_or_else(|| E::custom(format!("invalid duration: {secs}"))),
            Self::Text(text) => parse_duration(&text).map_err(E::custom),
        }
    }
}

/// `#[serde(deserialize_with = "...")]`용 필수 필드 역직렬화
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    RawDuration::deserialize(deserializer)?.into_duration()
}

/// `Option<Duration>` 필드용 역직렬화 (`#[serde(default, deserialize_with = "...")]`)
pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<RawDuration>::deserialize(deserializer)?
        .map(RawDuration::into_duration)
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Holder {
        #[serde(default, deserialize_with = "deserialize_option")]
        wait: Option<Duration>,
    }

    #[test]
    fn bare_numbers_are_seconds() {
        assert_eq!(parse_duration("30").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration(" 1.5 ").unwrap(), Duration::from_millis(1500));
    }

    #[test]
    fn units_follow_humantime() {
        assert_eq!(parse_duration("100ms").unwrap(), Duration::from_millis(100));
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("-3").is_err());
        let err = parse_duration("soon").unwrap_err();
        assert!(err.to_string().contains("soon"));
    }

    #[test]
    fn serde_accepts_numbers_and_strings() {
        let h: Holder = serde_json::from_str(r#"{"wait": "250ms"}"#).unwrap();
        assert_eq!(h.wait, Some(Duration::from_millis(250)));
        let h: Holder = serde_json::from_str(r#"{"wait": 3}"#).unwrap();
        assert_eq!(h.wait, Some(Duration::from_secs(3)));
        let h: Holder = serde_json::from_str("{}").unwrap();
        assert_eq!(h.wait, None);
        assert!(serde_json::from_str::<Holder>(r#"{"wait": "later"}"#).is_err());
    }
}
