//! 类型描述符（二进制布局语言）
//!
//! 描述符是一个紧凑的类型字符串，定义一条定长二进制记录的布局：
//!
//! ```text
//! descriptor  := element ((','|'%') element)*
//! element     := [count] tag
//! tag         := 'b'|'ub'|'w'|'uw'|'i'|'ui'|'l'|'ul'|'c'|'f'|'d'|'t'|'lt'|'s[N]'
//! ```
//!
//! 例如 `"%ui%2w%3d"` 描述 32 字节的记录：一个 uint32、两个 int16、
//! 三个 float64。偏移严格单调且连续：
//! `offset[i+1] = offset[i] + size[i]*count[i]`。
//!
//! 除布局本身之外，本模块还提供单字段级别的文本/二进制互转
//! （[`Format::csv_to_bin`] / [`Format::bin_to_csv`]）。

use crate::time::Timestamp;
use crate::types::WireType;
use crate::CsvError;

/// 描述符中的一个元素（一种类型的连续重复）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element {
    /// 线上类型
    pub kind: WireType,

    /// 重复次数（数组元数）
    pub count: usize,

    /// 单个实例的字节宽度
    pub size: usize,

    /// 第一个重复在整条记录内的字节偏移
    pub offset: usize,
}

/// 单个标量字段的具体位置
///
/// 由 [`Format::offset`] 从展平的标量下标解出。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementView {
    /// 字节偏移
    pub offset: usize,

    /// 字节宽度
    pub size: usize,

    /// 线上类型
    pub kind: WireType,
}

/// 类型描述符
///
/// 解析一次，之后对每条记录重复应用；解析之后不可变。
#[derive(Debug, Clone, Default)]
pub struct Format {
    elements: Vec<Element>,
    /// 每个元素的起始标量下标（与 elements 平行）
    starts: Vec<usize>,
    size: usize,
    count: usize,
}

impl Format {
    /// 解析描述符字符串
    ///
    /// 元素以 `,` 或 `%` 分隔；未知标签、非法重复计数、不带长度的
    /// `s` 都在解析期拒绝，早于任何记录处理。空字符串解析为空描述符。
    pub fn parse(s: &str) -> Result<Format, CsvError> {
        let mut format = Format::default();
        format.append_str(s)?;
        Ok(format)
    }

    /// 追加另一个描述符的元素，偏移顺延
    ///
    /// 对空描述符追加、或追加空描述符，均为恒等操作。
    pub fn append(&mut self, other: &Format) {
        for element in &other.elements {
            self.push(element.kind, element.count);
        }
    }

    /// 解析并追加描述符字符串
    pub fn append_str(&mut self, s: &str) -> Result<(), CsvError> {
        for segment in s.split(',') {
            for piece in segment.split('%') {
                if piece.is_empty() {
                    continue;
                }
                self.push_token(piece)?;
            }
        }
        Ok(())
    }

    fn push_token(&mut self, token: &str) -> Result<(), CsvError> {
        let digits = token
            .bytes()
            .position(|b| !b.is_ascii_digit())
            .unwrap_or(token.len());
        let (count_str, tag) = token.split_at(digits);
        let count: usize = if count_str.is_empty() {
            1
        } else {
            count_str.parse().map_err(|_| {
                CsvError::BadDescriptor(format!("invalid repeat count in '{}'", token))
            })?
        };
        if count == 0 {
            return Err(CsvError::BadDescriptor(format!(
                "zero repeat count in '{}'",
                token
            )));
        }
        if tag.is_empty() {
            return Err(CsvError::BadDescriptor(format!(
                "missing type tag in '{}'",
                token
            )));
        }
        let kind = WireType::from_tag(tag)?;
        self.push(kind, count);
        Ok(())
    }

    fn push(&mut self, kind: WireType, count: usize) {
        let size = kind.size();
        // 相邻同类元素并入一个重复计数，描述符保持规范形式
        if let Some(last) = self.elements.last_mut() {
            if last.kind == kind {
                last.count += count;
                self.size += size * count;
                self.count += count;
                return;
            }
        }
        self.elements.push(Element {
            kind,
            count,
            size,
            offset: self.size,
        });
        self.starts.push(self.count);
        self.size += size * count;
        self.count += count;
    }

    /// 整条记录的字节数
    pub fn size(&self) -> usize {
        self.size
    }

    /// 展平后的标量字段数
    pub fn count(&self) -> usize {
        self.count
    }

    /// 元素列表
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// 按标量下标（考虑数组元数展平）取出具体的 (offset, size, kind)
    pub fn offset(&self, index: usize) -> Result<ElementView, CsvError> {
        if index >= self.count {
            return Err(CsvError::IndexOutOfRange {
                index,
                count: self.count,
            });
        }
        let at = match self.starts.binary_search(&index) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let element = &self.elements[at];
        let repeat = index - self.starts[at];
        Ok(ElementView {
            offset: element.offset + repeat * element.size,
            size: element.size,
            kind: element.kind,
        })
    }

    /// 文本 token 向量转二进制记录
    ///
    /// token 数必须等于 [`Format::count`]；逐字段做带范围检查的
    /// 类型转换，第一个错误立即中止整条记录。
    pub fn csv_to_bin<T: AsRef<str>>(&self, tokens: &[T]) -> Result<Vec<u8>, CsvError> {
        if tokens.len() != self.count {
            return Err(CsvError::FieldCount {
                expected: self.count,
                actual: tokens.len(),
                line: join(tokens, ','),
            });
        }
        let mut out = vec![0u8; self.size];
        let mut i = 0;
        for element in &self.elements {
            for repeat in 0..element.count {
                let offset = element.offset + repeat * element.size;
                write_scalar(
                    element.kind,
                    tokens[i].as_ref(),
                    &mut out[offset..offset + element.size],
                )?;
                i += 1;
            }
        }
        Ok(out)
    }

    /// 二进制记录转文本行
    ///
    /// 缓冲区长度必须等于 [`Format::size`]。浮点输出精度可配置，
    /// 缺省 float32 为 6 位、float64 为 16 位小数；时间渲染为
    /// ISO 8601 basic；定长字符串渲染到第一个 NUL 为止。
    pub fn bin_to_csv(
        &self,
        buf: &[u8],
        delimiter: char,
        precision: Option<usize>,
    ) -> Result<String, CsvError> {
        if buf.len() != self.size {
            return Err(CsvError::BufferSize {
                expected: self.size,
                actual: buf.len(),
            });
        }
        let mut tokens = Vec::with_capacity(self.count);
        for element in &self.elements {
            for repeat in 0..element.count {
                let offset = element.offset + repeat * element.size;
                tokens.push(render_scalar(
                    element.kind,
                    &buf[offset..offset + element.size],
                    precision,
                )?);
            }
        }
        Ok(tokens.join(&delimiter.to_string()))
    }
}

impl std::fmt::Display for Format {
    /// 重建规范形式的描述符字符串，如 `ui,2w,3d`
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for element in &self.elements {
            if !first {
                write!(f, ",")?;
            }
            first = false;
            if element.count > 1 {
                write!(f, "{}{}", element.count, element.kind.tag())?;
            } else {
                write!(f, "{}", element.kind.tag())?;
            }
        }
        Ok(())
    }
}

fn join<T: AsRef<str>>(tokens: &[T], delimiter: char) -> String {
    tokens
        .iter()
        .map(|t| t.as_ref())
        .collect::<Vec<_>>()
        .join(&delimiter.to_string())
}

/// 单字段文本转二进制，写入恰好 `kind.size()` 字节
fn write_scalar(kind: WireType, token: &str, out: &mut [u8]) -> Result<(), CsvError> {
    match kind {
        WireType::Int8 => {
            let value: i64 = token.parse().map_err(|_| CsvError::InvalidValue {
                target: "int8",
                value: token.to_string(),
            })?;
            // 上界取 128 而非 127：既有生产方依赖该不对称区间，
            // 128 按补码落入 0x80
            if !(-127..=128).contains(&value) {
                return Err(CsvError::OutOfRange {
                    target: "int8",
                    value: token.to_string(),
                });
            }
            out[0] = value as u8;
        }
        WireType::Uint8 => {
            let value: i64 = token.parse().map_err(|_| CsvError::InvalidValue {
                target: "uint8",
                value: token.to_string(),
            })?;
            if !(0..=255).contains(&value) {
                return Err(CsvError::OutOfRange {
                    target: "uint8",
                    value: token.to_string(),
                });
            }
            out[0] = value as u8;
        }
        WireType::Int16 => {
            let value: i16 = token.parse().map_err(|_| CsvError::InvalidValue {
                target: "int16",
                value: token.to_string(),
            })?;
            out.copy_from_slice(&value.to_ne_bytes());
        }
        WireType::Uint16 => {
            let value: u16 = token.parse().map_err(|_| CsvError::InvalidValue {
                target: "uint16",
                value: token.to_string(),
            })?;
            out.copy_from_slice(&value.to_ne_bytes());
        }
        WireType::Int32 => {
            let value: i32 = token.parse().map_err(|_| CsvError::InvalidValue {
                target: "int32",
                value: token.to_string(),
            })?;
            out.copy_from_slice(&value.to_ne_bytes());
        }
        WireType::Uint32 => {
            let value: u32 = token.parse().map_err(|_| CsvError::InvalidValue {
                target: "uint32",
                value: token.to_string(),
            })?;
            out.copy_from_slice(&value.to_ne_bytes());
        }
        WireType::Int64 => {
            let value: i64 = token.parse().map_err(|_| CsvError::InvalidValue {
                target: "int64",
                value: token.to_string(),
            })?;
            out.copy_from_slice(&value.to_ne_bytes());
        }
        WireType::Uint64 => {
            let value: u64 = token.parse().map_err(|_| CsvError::InvalidValue {
                target: "uint64",
                value: token.to_string(),
            })?;
            out.copy_from_slice(&value.to_ne_bytes());
        }
        WireType::Char => {
            let bytes = token.as_bytes();
            if bytes.len() != 1 {
                return Err(CsvError::InvalidValue {
                    target: "char",
                    value: token.to_string(),
                });
            }
            out[0] = bytes[0];
        }
        WireType::Float32 => {
            let value: f32 = token.parse().map_err(|_| CsvError::InvalidValue {
                target: "float32",
                value: token.to_string(),
            })?;
            out.copy_from_slice(&value.to_ne_bytes());
        }
        WireType::Float64 => {
            let value: f64 = token.parse().map_err(|_| CsvError::InvalidValue {
                target: "float64",
                value: token.to_string(),
            })?;
            out.copy_from_slice(&value.to_ne_bytes());
        }
        WireType::TimeMicros => {
            let ts = Timestamp::parse_iso(token)?;
            out.copy_from_slice(&ts.to_micros().to_ne_bytes());
        }
        WireType::TimeNanos => {
            let ts = Timestamp::parse_iso(token)?;
            out[..8].copy_from_slice(&ts.secs.to_ne_bytes());
            out[8..].copy_from_slice(&ts.nanos.to_ne_bytes());
        }
        WireType::FixedString(width) => {
            let bytes = token.as_bytes();
            // 超宽报错，欠宽补零
            if bytes.len() > width {
                return Err(CsvError::OutOfRange {
                    target: "fixed string",
                    value: token.to_string(),
                });
            }
            out[..bytes.len()].copy_from_slice(bytes);
            for byte in &mut out[bytes.len()..] {
                *byte = 0;
            }
        }
    }
    Ok(())
}

/// 单字段二进制转文本，`bytes` 长度恰为 `kind.size()`
fn render_scalar(
    kind: WireType,
    bytes: &[u8],
    precision: Option<usize>,
) -> Result<String, CsvError> {
    let text = match kind {
        WireType::Int8 => (bytes[0] as i8).to_string(),
        WireType::Uint8 => bytes[0].to_string(),
        WireType::Int16 => i16::from_ne_bytes(array(bytes)).to_string(),
        WireType::Uint16 => u16::from_ne_bytes(array(bytes)).to_string(),
        WireType::Int32 => i32::from_ne_bytes(array(bytes)).to_string(),
        WireType::Uint32 => u32::from_ne_bytes(array(bytes)).to_string(),
        WireType::Int64 => i64::from_ne_bytes(array(bytes)).to_string(),
        WireType::Uint64 => u64::from_ne_bytes(array(bytes)).to_string(),
        WireType::Char => (bytes[0] as char).to_string(),
        WireType::Float32 => {
            let value = f32::from_ne_bytes(array(bytes));
            render_float(value as f64, precision.unwrap_or(6))
        }
        WireType::Float64 => {
            let value = f64::from_ne_bytes(array(bytes));
            render_float(value, precision.unwrap_or(16))
        }
        WireType::TimeMicros => {
            Timestamp::from_micros(i64::from_ne_bytes(array(bytes))).format_iso()?
        }
        WireType::TimeNanos => {
            let secs = i64::from_ne_bytes(array(&bytes[..8]));
            let nanos = u32::from_ne_bytes(array(&bytes[8..]));
            Timestamp::new(secs, nanos).format_iso()?
        }
        WireType::FixedString(_) => {
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            String::from_utf8_lossy(&bytes[..end]).into_owned()
        }
    };
    Ok(text)
}

fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

/// 定点渲染浮点数并去掉尾部的零
///
/// `precision` 为小数位数；整数值渲染不带小数点。
pub(crate) fn render_float(value: f64, precision: usize) -> String {
    let text = format!("{:.*}", precision, value);
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 测试偏移计算与总大小
    #[test]
    fn test_offsets_and_size() {
        let format = Format::parse("%ui%2w%3d").unwrap();
        assert_eq!(format.size(), 4 + 2 * 2 + 3 * 8);
        assert_eq!(format.count(), 6);

        let expect = [
            (0usize, 4usize, WireType::Uint32),
            (4, 2, WireType::Int16),
            (6, 2, WireType::Int16),
            (8, 8, WireType::Float64),
            (16, 8, WireType::Float64),
            (24, 8, WireType::Float64),
        ];
        for (i, (offset, size, kind)) in expect.into_iter().enumerate() {
            let view = format.offset(i).unwrap();
            assert_eq!(view.offset, offset, "field {}", i);
            assert_eq!(view.size, size, "field {}", i);
            assert_eq!(view.kind, kind, "field {}", i);
        }
        assert!(matches!(
            format.offset(6),
            Err(CsvError::IndexOutOfRange { index: 6, count: 6 })
        ));
    }

    /// 测试逗号与百分号两种分隔形式等价
    #[test]
    fn test_separator_forms() {
        let a = Format::parse("%ui%2w%3d").unwrap();
        let b = Format::parse("ui,2w,3d").unwrap();
        assert_eq!(a.size(), b.size());
        assert_eq!(a.count(), b.count());
        assert_eq!(a.to_string(), b.to_string());
        assert_eq!(a.to_string(), "ui,2w,3d");
    }

    /// 测试非法描述符在解析期被拒绝
    #[test]
    fn test_bad_descriptors() {
        assert!(matches!(
            Format::parse("%s"),
            Err(CsvError::BadDescriptor(_))
        ));
        assert!(matches!(
            Format::parse("3x"),
            Err(CsvError::BadDescriptor(_))
        ));
        assert!(matches!(
            Format::parse("0d"),
            Err(CsvError::BadDescriptor(_))
        ));
        assert!(matches!(
            Format::parse("3"),
            Err(CsvError::BadDescriptor(_))
        ));
    }

    /// 测试空描述符与追加
    #[test]
    fn test_append() {
        let mut format = Format::parse("").unwrap();
        assert_eq!(format.size(), 0);
        assert_eq!(format.count(), 0);

        let other = Format::parse("t,2f").unwrap();
        format.append(&other);
        assert_eq!(format.size(), other.size());
        assert_eq!(format.to_string(), "t,2f");

        format.append_str("s[4]").unwrap();
        assert_eq!(format.size(), 8 + 2 * 4 + 4);
        let view = format.offset(3).unwrap();
        assert_eq!(view.offset, 16);
        assert_eq!(view.kind, WireType::FixedString(4));
    }

    /// 端到端：示例记录文本 -> 二进制 -> 文本逐字节还原
    #[test]
    fn test_example_roundtrip() {
        let format = Format::parse("%ui%2w%3d").unwrap();
        let line = "0,-1,-2,1.123,2.345,3.678";
        let tokens: Vec<&str> = line.split(',').collect();
        let buf = format.csv_to_bin(&tokens).unwrap();
        assert_eq!(buf.len(), 32);
        assert_eq!(format.bin_to_csv(&buf, ',', None).unwrap(), line);
    }

    /// 测试所有整数标签的往返
    #[test]
    fn test_integer_roundtrip() {
        let format = Format::parse("b,ub,w,uw,i,ui,l,ul").unwrap();
        let line = "-127,255,-32768,65535,-2147483648,4294967295,-9223372036854775808,18446744073709551615";
        let tokens: Vec<&str> = line.split(',').collect();
        let buf = format.csv_to_bin(&tokens).unwrap();
        assert_eq!(format.bin_to_csv(&buf, ',', None).unwrap(), line);
    }

    /// 测试 int8 的不对称范围：接受 [-127, 128]，128 落入 0x80
    #[test]
    fn test_int8_range_bounds() {
        let format = Format::parse("b").unwrap();
        assert_eq!(format.csv_to_bin(&["-127"]).unwrap(), vec![0x81]);
        assert_eq!(format.csv_to_bin(&["128"]).unwrap(), vec![0x80]);
        assert!(matches!(
            format.csv_to_bin(&["-128"]),
            Err(CsvError::OutOfRange { .. })
        ));
        assert!(matches!(
            format.csv_to_bin(&["200"]),
            Err(CsvError::OutOfRange { .. })
        ));
    }

    /// 测试 uint8 范围
    #[test]
    fn test_uint8_range_bounds() {
        let format = Format::parse("ub").unwrap();
        assert_eq!(format.csv_to_bin(&["0"]).unwrap(), vec![0]);
        assert_eq!(format.csv_to_bin(&["255"]).unwrap(), vec![255]);
        assert!(matches!(
            format.csv_to_bin(&["256"]),
            Err(CsvError::OutOfRange { .. })
        ));
        assert!(matches!(
            format.csv_to_bin(&["-1"]),
            Err(CsvError::OutOfRange { .. })
        ));
    }

    /// 测试定长字符串：欠宽补零、超宽报错、渲染到首个 NUL
    #[test]
    fn test_fixed_string() {
        let format = Format::parse("s[4]").unwrap();
        let buf = format.csv_to_bin(&["ab"]).unwrap();
        assert_eq!(buf, b"ab\0\0");
        assert_eq!(format.bin_to_csv(&buf, ',', None).unwrap(), "ab");

        let full = format.csv_to_bin(&["abcd"]).unwrap();
        assert_eq!(full, b"abcd");
        assert_eq!(format.bin_to_csv(&full, ',', None).unwrap(), "abcd");

        assert!(matches!(
            format.csv_to_bin(&["abcde"]),
            Err(CsvError::OutOfRange { .. })
        ));
    }

    /// 测试时间类型：t 为微秒计数，lt 为秒 + 纳秒
    #[test]
    fn test_time_fields() {
        let format = Format::parse("t").unwrap();
        let buf = format.csv_to_bin(&["20240131T123456.789012"]).unwrap();
        let micros = i64::from_ne_bytes(buf[..8].try_into().unwrap());
        assert_eq!(micros % 1_000_000, 789_012);
        assert_eq!(
            format.bin_to_csv(&buf, ',', None).unwrap(),
            "20240131T123456.789012"
        );

        let format = Format::parse("lt").unwrap();
        let buf = format.csv_to_bin(&["20240131T123456.789012345"]).unwrap();
        assert_eq!(buf.len(), 12);
        let nanos = u32::from_ne_bytes(buf[8..].try_into().unwrap());
        assert_eq!(nanos, 789_012_345);
        assert_eq!(
            format.bin_to_csv(&buf, ',', None).unwrap(),
            "20240131T123456.789012345"
        );
    }

    /// 测试 char 字段
    #[test]
    fn test_char_field() {
        let format = Format::parse("c").unwrap();
        let buf = format.csv_to_bin(&["a"]).unwrap();
        assert_eq!(buf, vec![b'a']);
        assert_eq!(format.bin_to_csv(&buf, ',', None).unwrap(), "a");
        assert!(format.csv_to_bin(&["ab"]).is_err());
    }

    /// 测试 token 数不匹配
    #[test]
    fn test_token_count_mismatch() {
        let format = Format::parse("2d").unwrap();
        let err = format.csv_to_bin(&["1.0"]).unwrap_err();
        match err {
            CsvError::FieldCount {
                expected, actual, ..
            } => {
                assert_eq!(expected, 2);
                assert_eq!(actual, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    /// 测试缓冲区长度不匹配
    #[test]
    fn test_buffer_size_mismatch() {
        let format = Format::parse("2d").unwrap();
        assert!(matches!(
            format.bin_to_csv(&[0u8; 15], ',', None),
            Err(CsvError::BufferSize {
                expected: 16,
                actual: 15
            })
        ));
    }

    /// 测试浮点精度：缺省值与显式覆盖
    #[test]
    fn test_float_precision() {
        let format = Format::parse("f,d").unwrap();
        let buf = format.csv_to_bin(&["1.5", "2.25"]).unwrap();
        assert_eq!(format.bin_to_csv(&buf, ',', None).unwrap(), "1.5,2.25");
        assert_eq!(format.bin_to_csv(&buf, ',', Some(1)).unwrap(), "1.5,2.2");
    }

    /// 测试尾零裁剪
    #[test]
    fn test_render_float_trim() {
        assert_eq!(render_float(1.123, 16), "1.123");
        assert_eq!(render_float(3.0, 6), "3");
        assert_eq!(render_float(-0.5, 6), "-0.5");
        assert_eq!(render_float(2.0, 0), "2");
    }

    /// 测试自定义分隔符
    #[test]
    fn test_custom_delimiter() {
        let format = Format::parse("2i").unwrap();
        let buf = format.csv_to_bin(&["1", "2"]).unwrap();
        assert_eq!(format.bin_to_csv(&buf, ';', None).unwrap(), "1;2");
    }
}
