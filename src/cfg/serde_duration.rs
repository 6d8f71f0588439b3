//! 人性化的 Duration 序列化
//!
//! 配置里的时间统一写成 "30s"、"500ms"、"1h30m" 这样的字符串

use anyhow::{anyhow, Result};
use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

pub use serde_with::{serde_as, DeserializeAs, SerializeAs};

/// 配合 `#[serde_as(as = "HumanDur")]` 使用
pub struct HumanDur;

impl SerializeAs<Duration> for HumanDur {
    fn serialize_as<S>(source: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_duration(*source))
    }
}

impl<'de> DeserializeAs<'de, Duration> for HumanDur {
    fn deserialize_as<D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

fn unit_duration(value: f64, unit: &str) -> Result<Duration> {
    let nanos_per_unit = match unit {
        "ns" => 1.0,
        "us" | "μs" => 1e3,
        "ms" => 1e6,
        "s" => 1e9,
        "m" => 60e9,
        "h" => 3600e9,
        "d" => 86400e9,
        _ => return Err(anyhow!("不支持的时间单位: {}", unit)),
    };
    Ok(Duration::from_nanos((value * nanos_per_unit).round() as u64))
}

/// 解析时间字符串，如 "1h30m45s"
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    if s.is_empty() {
        return Err(anyhow!("空字符串"));
    }

    let mut total = Duration::ZERO;
    let mut rest = s.as_str();
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_end == 0 {
            return Err(anyhow!("期望数字: {}", rest));
        }
        let (num, tail) = rest.split_at(num_end);
        let value: f64 = num.parse().map_err(|_| anyhow!("无效数字: {}", num))?;

        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_end);
        if unit.is_empty() {
            return Err(anyhow!("缺少时间单位: {}", s));
        }

        total += unit_duration(value, unit)?;
        rest = tail;
    }

    Ok(total)
}

/// 格式化为 "1h30m45s" 形式，不足一分钟的部分选用能精确表示的最大单位
pub fn format_duration(duration: Duration) -> String {
    if duration.is_zero() {
        return "0s".to_string();
    }

    let mut out = String::new();
    let mut remaining = duration.as_secs();
    for (unit, size) in [("d", 86400), ("h", 3600), ("m", 60)] {
        if remaining >= size {
            out.push_str(&format!("{}{}", remaining / size, unit));
            remaining %= size;
        }
    }

    let nanos = u128::from(remaining) * 1_000_000_000 + u128::from(duration.subsec_nanos());
    if nanos > 0 {
        let (value, unit) = match nanos {
            n if n % 1_000_000_000 == 0 => (n / 1_000_000_000, "s"),
            n if n % 1_000_000 == 0 => (n / 1_000_000, "ms"),
            n if n % 1_000 == 0 => (n / 1_000, "us"),
            n => (n, "ns"),
        };
        out.push_str(&format!("{}{}", value, unit));
    }

    out
}
