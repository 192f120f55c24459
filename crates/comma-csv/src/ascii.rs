//! ascii 编解码器
//!
//! 结构体实例与分隔文本 token 向量之间的双向转换，由
//! [`Plan`](crate::fields::Plan) 驱动。每次调用无状态；未选中的
//! token 位置保持原样（间隙保留），空 token 保持字段原值。
//!
//! 本路径的浮点输出缺省精度为 12 位小数；binary 渲染路径
//! （[`Format::bin_to_csv`](crate::format::Format::bin_to_csv)）
//! 的缺省值是按类型的 6/16，两者各自独立、按调用路径生效。

use crate::fields::{Plan, PlanLeaf};
use crate::format::render_float;
use crate::options::CsvOptions;
use crate::record::{LeafMut, Leaf, Record, Visitor, VisitorMut};
use crate::time::Timestamp;
use crate::CsvError;
use std::marker::PhantomData;

/// ascii 路径的缺省浮点精度（小数位数）
pub const DEFAULT_PRECISION: usize = 12;

/// 按分隔符切分一行文本
pub fn split(line: &str, delimiter: char) -> Vec<String> {
    line.split(delimiter).map(|s| s.to_string()).collect()
}

/// ascii 编解码器
///
/// 按（结构体类型, 字段列表）构造一次，之后对所有记录复用；
/// 构造之后只读，跨线程共享需调用方自行同步。
pub struct AsciiCodec<S: Record> {
    plan: Plan,
    delimiter: char,
    precision: usize,
    _marker: PhantomData<fn(S)>,
}

impl<S: Record> AsciiCodec<S> {
    /// 从配置和样本实例构造
    pub fn new(options: &CsvOptions, sample: &S) -> Self {
        let plan = Plan::build(sample, &options.fields, options.full_path_as_name);
        Self {
            plan,
            delimiter: options.delimiter,
            precision: options.precision.unwrap_or(DEFAULT_PRECISION),
            _marker: PhantomData,
        }
    }

    /// 列映射计划
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// 从 token 向量填充结构体
    ///
    /// 选中且 token 非空的叶子做类型化解析；空 token 保持原值。
    /// token 数不足以覆盖引用的最大下标时报
    /// [`CsvError::FieldCount`]，消息携带拼接后的原始行。
    pub fn get(&self, record: &mut S, tokens: &[String]) -> Result<(), CsvError> {
        let mut reader = AsciiReader {
            leaves: self.plan.leaves(),
            cursor: 0,
            tokens,
            delimiter: self.delimiter,
            present: Vec::new(),
            error: None,
        };
        record.visit_mut(&mut reader);
        match reader.error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// 把结构体写入 token 向量
    ///
    /// 只触碰选中的下标位置，向量长度不足时用空 token 补齐；
    /// 未选中位置既有的占位文本逐字节保留。
    pub fn put(&self, record: &S, tokens: &mut Vec<String>) -> Result<(), CsvError> {
        let mut writer = AsciiWriter {
            leaves: self.plan.leaves(),
            cursor: 0,
            tokens,
            precision: self.precision,
            error: None,
        };
        record.visit(&mut writer);
        match writer.error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// 便捷方法：切分一行并填充结构体
    pub fn parse_line(&self, record: &mut S, line: &str) -> Result<(), CsvError> {
        self.get(record, &split(line, self.delimiter))
    }

    /// 便捷方法：渲染为一行文本
    pub fn render_line(&self, record: &S) -> Result<String, CsvError> {
        let mut tokens = Vec::new();
        self.put(record, &mut tokens)?;
        Ok(tokens.join(&self.delimiter.to_string()))
    }
}

struct AsciiReader<'a> {
    leaves: &'a [PlanLeaf],
    cursor: usize,
    tokens: &'a [String],
    delimiter: char,
    /// Option 作用域栈：本条记录内是否有后代叶子被写入
    present: Vec<bool>,
    error: Option<CsvError>,
}

impl VisitorMut for AsciiReader<'_> {
    fn begin_optional(&mut self, _name: &str) {
        self.present.push(false);
    }

    fn end_optional(&mut self) -> bool {
        self.present.pop().unwrap_or(false)
    }

    fn field(&mut self, _name: &str, leaf: LeafMut<'_>) {
        let at = self.cursor;
        self.cursor += 1;
        if self.error.is_some() {
            return;
        }
        let Some(index) = self.leaves[at].index else {
            return;
        };
        let Some(token) = self.tokens.get(index) else {
            self.error = Some(CsvError::FieldCount {
                expected: index + 1,
                actual: self.tokens.len(),
                line: self.tokens.join(&self.delimiter.to_string()),
            });
            return;
        };
        if token.is_empty() {
            return;
        }
        match parse_leaf(leaf, token) {
            Ok(()) => {
                for flag in &mut self.present {
                    *flag = true;
                }
            }
            Err(error) => self.error = Some(error),
        }
    }
}

struct AsciiWriter<'a> {
    leaves: &'a [PlanLeaf],
    cursor: usize,
    tokens: &'a mut Vec<String>,
    precision: usize,
    error: Option<CsvError>,
}

impl Visitor for AsciiWriter<'_> {
    fn field(&mut self, _name: &str, leaf: Leaf<'_>) {
        let at = self.cursor;
        self.cursor += 1;
        if self.error.is_some() {
            return;
        }
        let Some(index) = self.leaves[at].index else {
            return;
        };
        if self.tokens.len() <= index {
            self.tokens.resize(index + 1, String::new());
        }
        match render_leaf(&leaf, self.precision) {
            Ok(text) => self.tokens[index] = text,
            Err(error) => self.error = Some(error),
        }
    }
}

/// 去掉成对的外围引号
fn unquote(token: &str) -> &str {
    let bytes = token.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        if (first == b'"' || first == b'\'') && bytes[bytes.len() - 1] == first {
            return &token[1..token.len() - 1];
        }
    }
    token
}

fn parse_leaf(leaf: LeafMut<'_>, token: &str) -> Result<(), CsvError> {
    fn number<T: std::str::FromStr>(token: &str, target: &'static str) -> Result<T, CsvError> {
        token.parse().map_err(|_| CsvError::InvalidValue {
            target,
            value: token.to_string(),
        })
    }

    match leaf {
        LeafMut::Bool(x) => {
            *x = match token {
                "true" => true,
                "false" => false,
                _ => number::<i64>(token, "bool")? != 0,
            };
        }
        LeafMut::I8(x) => *x = number(token, "int8")?,
        LeafMut::U8(x) => *x = number(token, "uint8")?,
        LeafMut::I16(x) => *x = number(token, "int16")?,
        LeafMut::U16(x) => *x = number(token, "uint16")?,
        LeafMut::I32(x) => *x = number(token, "int32")?,
        LeafMut::U32(x) => *x = number(token, "uint32")?,
        LeafMut::I64(x) => *x = number(token, "int64")?,
        LeafMut::U64(x) => *x = number(token, "uint64")?,
        LeafMut::F32(x) => *x = number(token, "float32")?,
        LeafMut::F64(x) => *x = number(token, "float64")?,
        LeafMut::Char(x) => {
            // 带引号的单字符，或小整数
            let inner = unquote(token);
            let mut chars = inner.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => *x = c,
                _ => {
                    let value = number::<u8>(inner, "char")?;
                    *x = value as char;
                }
            }
        }
        LeafMut::Time(x) => *x = Timestamp::parse_iso(token)?,
        LeafMut::Str(x) => *x = unquote(token).to_string(),
    }
    Ok(())
}

fn render_leaf(leaf: &Leaf<'_>, precision: usize) -> Result<String, CsvError> {
    let text = match leaf {
        Leaf::Bool(x) => if **x { "1" } else { "0" }.to_string(),
        Leaf::I8(x) => x.to_string(),
        Leaf::U8(x) => x.to_string(),
        Leaf::I16(x) => x.to_string(),
        Leaf::U16(x) => x.to_string(),
        Leaf::I32(x) => x.to_string(),
        Leaf::U32(x) => x.to_string(),
        Leaf::I64(x) => x.to_string(),
        Leaf::U64(x) => x.to_string(),
        Leaf::F32(x) => render_float(**x as f64, precision),
        Leaf::F64(x) => render_float(**x, precision),
        Leaf::Char(x) => x.to_string(),
        Leaf::Time(x) => x.format_iso()?,
        Leaf::Str(x) => (*x).clone(),
    };
    Ok(text)
}
