//! 时间戳类型与 ISO 8601 basic 格式
//!
//! 线上时间有两种表示：
//! - `t`: 自 Unix epoch 起的微秒数（有符号 64 位）
//! - `lt`: 秒（64 位）+ 纳秒（32 位）两个相邻字段
//!
//! 文本表示统一为 ISO 8601 basic：`YYYYMMDDThhmmss[.f]`，
//! 小数部分解析时接受 1-9 位数字。

use crate::CsvError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

const NANOS_PER_SEC: i64 = 1_000_000_000;
const MICROS_PER_SEC: i64 = 1_000_000;

/// Unix epoch 时间戳，纳秒分辨率
///
/// `nanos` 恒在 `[0, 1e9)` 区间内，epoch 之前的时间通过负的 `secs`
/// 加正的 `nanos` 表示，因此派生的字典序比较即时间序。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Timestamp {
    /// 自 epoch 起的整秒数
    pub secs: i64,

    /// 秒内纳秒偏移，[0, 1e9)
    pub nanos: u32,
}

impl Timestamp {
    /// 从秒 + 纳秒构造
    pub fn new(secs: i64, nanos: u32) -> Self {
        Self { secs, nanos }
    }

    /// 从微秒计数构造（`t` 线格式）
    pub fn from_micros(micros: i64) -> Self {
        let secs = micros.div_euclid(MICROS_PER_SEC);
        let nanos = (micros.rem_euclid(MICROS_PER_SEC) * 1000) as u32;
        Self { secs, nanos }
    }

    /// 转换为微秒计数（`t` 线格式）
    ///
    /// 纳秒分辨率的值向下取整到微秒。
    pub fn to_micros(&self) -> i64 {
        self.secs * MICROS_PER_SEC + (self.nanos / 1000) as i64
    }

    /// 解析 ISO 8601 basic 格式
    ///
    /// 接受 `YYYYMMDDThhmmss` 加可选的 `.` 与 1-9 位小数。
    pub fn parse_iso(s: &str) -> Result<Self, CsvError> {
        let (base, nanos) = match s.split_once('.') {
            None => (s, 0u32),
            Some((base, frac)) => {
                if frac.is_empty() || frac.len() > 9 || !frac.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(CsvError::InvalidTime(s.to_string()));
                }
                let mut value: i64 = frac.parse().map_err(|_| CsvError::InvalidTime(s.to_string()))?;
                for _ in frac.len()..9 {
                    value *= 10;
                }
                debug_assert!(value < NANOS_PER_SEC);
                (base, value as u32)
            }
        };
        let naive = parse_basic(base).ok_or_else(|| CsvError::InvalidTime(s.to_string()))?;
        Ok(Self {
            secs: naive.and_utc().timestamp(),
            nanos,
        })
    }

    /// 渲染为 ISO 8601 basic 格式
    ///
    /// 整秒不带小数；整微秒带 6 位小数；其余带 9 位小数。
    pub fn format_iso(&self) -> Result<String, CsvError> {
        let datetime = DateTime::<Utc>::from_timestamp(self.secs, self.nanos)
            .ok_or_else(|| CsvError::InvalidTime(format!("{}s + {}ns", self.secs, self.nanos)))?;
        let base = datetime.format("%Y%m%dT%H%M%S").to_string();
        if self.nanos == 0 {
            Ok(base)
        } else if self.nanos % 1000 == 0 {
            Ok(format!("{}.{:06}", base, self.nanos / 1000))
        } else {
            Ok(format!("{}.{:09}", base, self.nanos))
        }
    }
}

/// 严格解析 `YYYYMMDDThhmmss`（恰好 15 个字符，第 9 位是 `T`）
fn parse_basic(s: &str) -> Option<NaiveDateTime> {
    let bytes = s.as_bytes();
    if bytes.len() != 15 || bytes[8] != b'T' {
        return None;
    }
    fn digits(s: &str) -> Option<u32> {
        if s.bytes().all(|b| b.is_ascii_digit()) {
            s.parse().ok()
        } else {
            None
        }
    }
    let date = NaiveDate::from_ymd_opt(
        digits(&s[0..4])? as i32,
        digits(&s[4..6])?,
        digits(&s[6..8])?,
    )?;
    let time = NaiveTime::from_hms_opt(digits(&s[9..11])?, digits(&s[11..13])?, digits(&s[13..15])?)?;
    Some(NaiveDateTime::new(date, time))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 测试微秒往返
    #[test]
    fn test_micros_roundtrip() {
        for micros in [0i64, 1, -1, 1_700_000_000_123_456, -123_456_789] {
            assert_eq!(Timestamp::from_micros(micros).to_micros(), micros);
        }
    }

    /// 测试 epoch 之前的拆分保持纳秒在 [0, 1e9)
    #[test]
    fn test_pre_epoch_split() {
        let ts = Timestamp::from_micros(-1);
        assert_eq!(ts.secs, -1);
        assert_eq!(ts.nanos, 999_999_000);
    }

    /// 测试整秒解析与渲染
    #[test]
    fn test_parse_format_whole_seconds() {
        let ts = Timestamp::parse_iso("20240131T123456").unwrap();
        assert_eq!(ts.nanos, 0);
        assert_eq!(ts.format_iso().unwrap(), "20240131T123456");
    }

    /// 测试微秒小数
    #[test]
    fn test_parse_format_micros() {
        let ts = Timestamp::parse_iso("20240131T123456.789012").unwrap();
        assert_eq!(ts.nanos, 789_012_000);
        assert_eq!(ts.format_iso().unwrap(), "20240131T123456.789012");
    }

    /// 测试纳秒小数
    #[test]
    fn test_parse_format_nanos() {
        let ts = Timestamp::parse_iso("20240131T123456.789012345").unwrap();
        assert_eq!(ts.nanos, 789_012_345);
        assert_eq!(ts.format_iso().unwrap(), "20240131T123456.789012345");
    }

    /// 测试短小数右补零
    #[test]
    fn test_short_fraction() {
        let ts = Timestamp::parse_iso("20240131T123456.5").unwrap();
        assert_eq!(ts.nanos, 500_000_000);
        assert_eq!(ts.format_iso().unwrap(), "20240131T123456.500000");
    }

    /// 测试已知 epoch 值
    #[test]
    fn test_known_epoch_value() {
        let ts = Timestamp::parse_iso("19700101T000000").unwrap();
        assert_eq!(ts, Timestamp::default());
        let ts = Timestamp::parse_iso("19700101T000001").unwrap();
        assert_eq!(ts.to_micros(), 1_000_000);
    }

    /// 测试非法输入被拒绝
    #[test]
    fn test_bad_time_values() {
        assert!(Timestamp::parse_iso("2024-01-31T12:34:56").is_err());
        assert!(Timestamp::parse_iso("20240131T123456.").is_err());
        assert!(Timestamp::parse_iso("20240131T123456.1234567890").is_err());
        assert!(Timestamp::parse_iso("20241331T000000").is_err());
        assert!(Timestamp::parse_iso("garbage").is_err());
    }

    /// 测试时间序比较
    #[test]
    fn test_ordering() {
        let a = Timestamp::from_micros(-1);
        let b = Timestamp::default();
        let c = Timestamp::from_micros(1);
        assert!(a < b && b < c);
    }
}
