//! 线上类型定义
//!
//! 描述符标签与线上类型一一对应：
//!
//! | 标签 | 类型 | 宽度 |
//! |------|------|------|
//! | b    | Int8 | 1 |
//! | ub   | Uint8 | 1 |
//! | w    | Int16 | 2 |
//! | uw   | Uint16 | 2 |
//! | i    | Int32 | 4 |
//! | ui   | Uint32 | 4 |
//! | l    | Int64 | 8 |
//! | ul   | Uint64 | 8 |
//! | c    | Char | 1 |
//! | f    | Float32 | 4 |
//! | d    | Float64 | 8 |
//! | t    | TimeMicros | 8 |
//! | lt   | TimeNanos | 12 |
//! | s[N] | FixedString(N) | N |

use crate::CsvError;

/// 线上类型
///
/// `TimeMicros` 为自 Unix epoch 起的微秒数（有符号 64 位）；
/// `TimeNanos` 为相邻的两个字段：秒（64 位）+ 纳秒（32 位）。
/// `FixedString` 只支持定长，变长字符串不在线格式之内。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Char,
    Float32,
    Float64,
    TimeMicros,
    TimeNanos,
    FixedString(usize),
}

impl WireType {
    /// 单个实例的字节宽度
    pub fn size(&self) -> usize {
        match self {
            WireType::Int8 | WireType::Uint8 | WireType::Char => 1,
            WireType::Int16 | WireType::Uint16 => 2,
            WireType::Int32 | WireType::Uint32 | WireType::Float32 => 4,
            WireType::Int64 | WireType::Uint64 | WireType::Float64 => 8,
            WireType::TimeMicros => 8,
            WireType::TimeNanos => 12,
            WireType::FixedString(n) => *n,
        }
    }

    /// 描述符标签（解析的逆操作）
    ///
    /// 用于从既有描述符派生输出描述符。
    pub fn tag(&self) -> String {
        match self {
            WireType::Int8 => "b".to_string(),
            WireType::Uint8 => "ub".to_string(),
            WireType::Int16 => "w".to_string(),
            WireType::Uint16 => "uw".to_string(),
            WireType::Int32 => "i".to_string(),
            WireType::Uint32 => "ui".to_string(),
            WireType::Int64 => "l".to_string(),
            WireType::Uint64 => "ul".to_string(),
            WireType::Char => "c".to_string(),
            WireType::Float32 => "f".to_string(),
            WireType::Float64 => "d".to_string(),
            WireType::TimeMicros => "t".to_string(),
            WireType::TimeNanos => "lt".to_string(),
            WireType::FixedString(n) => format!("s[{}]", n),
        }
    }

    /// 从描述符标签解析（不含重复计数前缀）
    pub fn from_tag(tag: &str) -> Result<WireType, CsvError> {
        match tag {
            "b" => Ok(WireType::Int8),
            "ub" => Ok(WireType::Uint8),
            "w" => Ok(WireType::Int16),
            "uw" => Ok(WireType::Uint16),
            "i" => Ok(WireType::Int32),
            "ui" => Ok(WireType::Uint32),
            "l" => Ok(WireType::Int64),
            "ul" => Ok(WireType::Uint64),
            "c" => Ok(WireType::Char),
            "f" => Ok(WireType::Float32),
            "d" => Ok(WireType::Float64),
            "t" => Ok(WireType::TimeMicros),
            "lt" => Ok(WireType::TimeNanos),
            // 变长字符串不支持，s 必须带 [N]
            "s" => Err(CsvError::BadDescriptor(
                "unbounded string 's' is not supported, use 's[N]'".to_string(),
            )),
            _ => {
                if let Some(n) = tag.strip_prefix("s[").and_then(|r| r.strip_suffix(']')) {
                    let n: usize = n.parse().map_err(|_| {
                        CsvError::BadDescriptor(format!("invalid string length in '{}'", tag))
                    })?;
                    if n == 0 {
                        return Err(CsvError::BadDescriptor(format!(
                            "zero-length string in '{}'",
                            tag
                        )));
                    }
                    Ok(WireType::FixedString(n))
                } else {
                    Err(CsvError::BadDescriptor(format!("unknown type tag '{}'", tag)))
                }
            }
        }
    }

    /// 数值类别（整数、浮点、char、bool 映射的 b）
    ///
    /// 二进制转换只允许同类别互转。
    pub fn is_numeric(&self) -> bool {
        !self.is_time() && !self.is_string()
    }

    /// 时间类别（t / lt）
    pub fn is_time(&self) -> bool {
        matches!(self, WireType::TimeMicros | WireType::TimeNanos)
    }

    /// 字符串类别（s[N]）
    pub fn is_string(&self) -> bool {
        matches!(self, WireType::FixedString(_))
    }

    /// 浮点文本输出的默认精度
    ///
    /// Float32 为 6 位、Float64 为 16 位小数（二进制渲染路径专用；
    /// ascii 编解码器另有自己的默认值 12）。
    pub fn default_precision(&self) -> Option<usize> {
        match self {
            WireType::Float32 => Some(6),
            WireType::Float64 => Some(16),
            _ => None,
        }
    }
}
