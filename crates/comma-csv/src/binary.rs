//! binary 编解码器
//!
//! 结构体实例与定长字节缓冲之间的双向转换，由列映射计划加类型
//! 描述符驱动。叶子的固有类型与线上类型一致时直接拷贝；不一致时
//! 走显式类型转换：数值之间按截断语义互转，时间之间换算微秒/纳秒，
//! 字符串之间重新填充；数值与字符串、数值与时间之间拒绝转换。
//!
//! 当计划是恒等映射且描述符与结构体固有布局逐元素一致时，读写走
//! 快路径：顺序紧凑拷贝，没有逐字段的下标查找与转换分派。两条
//! 路径字节级等价（有测试钉住）。
//!
//! 未选中的元素在输出缓冲中保持原样；混合写入与透传区域的缓冲由
//! 调用方预先清零或预填。

use crate::fields::{Plan, PlanLeaf};
use crate::format::{ElementView, Format};
use crate::options::CsvOptions;
use crate::record::{Leaf, LeafMut, Record, Visitor, VisitorMut};
use crate::time::Timestamp;
use crate::types::WireType;
use crate::CsvError;
use std::marker::PhantomData;

/// binary 编解码器
///
/// 按（结构体类型, 字段列表, 描述符）构造一次，之后对所有记录
/// 复用；构造之后只读。
pub struct BinaryCodec<S: Record> {
    plan: Plan,
    format: Format,
    fast: bool,
    _marker: PhantomData<fn(S)>,
}

impl<S: Record> BinaryCodec<S> {
    /// 从配置和样本实例构造
    ///
    /// 描述符为空时从选中叶子的固有类型按列序派生；列序有空洞时
    /// 无法派生。选中叶子引用的最大逻辑下标必须落在描述符之内。
    pub fn new(options: &CsvOptions, sample: &S) -> Result<Self, CsvError> {
        let plan = Plan::build(sample, &options.fields, options.full_path_as_name);
        let format = if options.format.is_empty() {
            derive_format(&plan)?
        } else {
            Format::parse(&options.format)?
        };
        if let Some(max) = plan.max_index() {
            if max >= format.count() {
                return Err(CsvError::IndexOutOfRange {
                    index: max,
                    count: format.count(),
                });
            }
        }
        let fast = plan.is_identity() && layout_matches(&plan, &format);
        Ok(Self {
            plan,
            format,
            fast,
            _marker: PhantomData,
        })
    }

    /// 生效的类型描述符
    pub fn format(&self) -> &Format {
        &self.format
    }

    /// 单条记录的字节数
    pub fn size(&self) -> usize {
        self.format.size()
    }

    /// 列映射计划
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// 从字节缓冲填充结构体
    ///
    /// 缓冲长度必须等于 [`BinaryCodec::size`]。
    pub fn get(&self, record: &mut S, buf: &[u8]) -> Result<(), CsvError> {
        if buf.len() != self.format.size() {
            return Err(CsvError::BufferSize {
                expected: self.format.size(),
                actual: buf.len(),
            });
        }
        if self.fast {
            self.get_packed(record, buf)
        } else {
            self.get_mapped(record, buf)
        }
    }

    /// 把结构体写入字节缓冲
    ///
    /// 缓冲长度必须等于 [`BinaryCodec::size`]；未选中的元素区域
    /// 保持原样。
    pub fn put(&self, record: &S, buf: &mut [u8]) -> Result<(), CsvError> {
        if buf.len() != self.format.size() {
            return Err(CsvError::BufferSize {
                expected: self.format.size(),
                actual: buf.len(),
            });
        }
        if self.fast {
            self.put_packed(record, buf)
        } else {
            self.put_mapped(record, buf)
        }
    }

    /// 便捷方法：写入新分配的零缓冲
    pub fn to_bytes(&self, record: &S) -> Result<Vec<u8>, CsvError> {
        let mut buf = vec![0u8; self.format.size()];
        self.put(record, &mut buf)?;
        Ok(buf)
    }

    fn get_mapped(&self, record: &mut S, buf: &[u8]) -> Result<(), CsvError> {
        let mut reader = MappedReader {
            leaves: self.plan.leaves(),
            cursor: 0,
            format: &self.format,
            buf,
            present: Vec::new(),
            error: None,
        };
        record.visit_mut(&mut reader);
        match reader.error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn put_mapped(&self, record: &S, buf: &mut [u8]) -> Result<(), CsvError> {
        let mut writer = MappedWriter {
            leaves: self.plan.leaves(),
            cursor: 0,
            format: &self.format,
            buf,
            error: None,
        };
        record.visit(&mut writer);
        match writer.error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn get_packed(&self, record: &mut S, buf: &[u8]) -> Result<(), CsvError> {
        let mut reader = PackedReader {
            leaves: self.plan.leaves(),
            cursor: 0,
            offset: 0,
            buf,
        };
        record.visit_mut(&mut reader);
        Ok(())
    }

    fn put_packed(&self, record: &S, buf: &mut [u8]) -> Result<(), CsvError> {
        let mut writer = PackedWriter {
            leaves: self.plan.leaves(),
            cursor: 0,
            offset: 0,
            buf,
            error: None,
        };
        record.visit(&mut writer);
        match writer.error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// 从选中叶子的固有类型按列序派生描述符
fn derive_format(plan: &Plan) -> Result<Format, CsvError> {
    let Some(max) = plan.max_index() else {
        return Format::parse("");
    };
    let mut kinds: Vec<Option<WireType>> = vec![None; max + 1];
    for leaf in plan.leaves() {
        if let Some(index) = leaf.index {
            kinds[index] = Some(leaf.kind);
        }
    }
    let mut tags = Vec::with_capacity(kinds.len());
    for (index, kind) in kinds.iter().enumerate() {
        match kind {
            Some(kind) => tags.push(kind.tag()),
            None => {
                return Err(CsvError::BadDescriptor(format!(
                    "cannot derive format: column {} has no named field",
                    index
                )));
            }
        }
    }
    Format::parse(&tags.join(","))
}

/// 描述符与计划的固有布局逐元素一致
fn layout_matches(plan: &Plan, format: &Format) -> bool {
    if format.count() != plan.len() {
        return false;
    }
    plan.leaves().iter().enumerate().all(|(i, leaf)| {
        format
            .offset(i)
            .map(|view| view.kind == leaf.kind)
            .unwrap_or(false)
    })
}

// ============================================================================
// 映射路径（逐字段下标查找 + 类型转换）
// ============================================================================

struct MappedReader<'a> {
    leaves: &'a [PlanLeaf],
    cursor: usize,
    format: &'a Format,
    buf: &'a [u8],
    present: Vec<bool>,
    error: Option<CsvError>,
}

impl VisitorMut for MappedReader<'_> {
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
        // 下标已在构造期校验
        let view = match self.format.offset(index) {
            Ok(view) => view,
            Err(error) => {
                self.error = Some(error);
                return;
            }
        };
        let bytes = &self.buf[view.offset..view.offset + view.size];
        match read_leaf(leaf, view, bytes) {
            Ok(()) => {
                for flag in &mut self.present {
                    *flag = true;
                }
            }
            Err(error) => self.error = Some(error),
        }
    }
}

struct MappedWriter<'a> {
    leaves: &'a [PlanLeaf],
    cursor: usize,
    format: &'a Format,
    buf: &'a mut [u8],
    error: Option<CsvError>,
}

impl Visitor for MappedWriter<'_> {
    fn field(&mut self, _name: &str, leaf: Leaf<'_>) {
        let at = self.cursor;
        self.cursor += 1;
        if self.error.is_some() {
            return;
        }
        let Some(index) = self.leaves[at].index else {
            return;
        };
        let view = match self.format.offset(index) {
            Ok(view) => view,
            Err(error) => {
                self.error = Some(error);
                return;
            }
        };
        let range = view.offset..view.offset + view.size;
        if let Err(error) = write_leaf(&leaf, view, &mut self.buf[range]) {
            self.error = Some(error);
        }
    }
}

// ============================================================================
// 快路径（顺序紧凑拷贝，无下标查找、无转换分派）
// ============================================================================

struct PackedReader<'a> {
    leaves: &'a [PlanLeaf],
    cursor: usize,
    offset: usize,
    buf: &'a [u8],
}

impl VisitorMut for PackedReader<'_> {
    fn end_optional(&mut self) -> bool {
        // 恒等映射下所有叶子都被写入
        true
    }

    fn field(&mut self, _name: &str, leaf: LeafMut<'_>) {
        // 宽度取计划里按样本固定的固有类型，与描述符逐元素一致
        let kind = self.leaves[self.cursor].kind;
        self.cursor += 1;
        let size = kind.size();
        let bytes = &self.buf[self.offset..self.offset + size];
        self.offset += size;
        read_leaf_direct(leaf, bytes);
    }
}

struct PackedWriter<'a> {
    leaves: &'a [PlanLeaf],
    cursor: usize,
    offset: usize,
    buf: &'a mut [u8],
    error: Option<CsvError>,
}

impl Visitor for PackedWriter<'_> {
    fn field(&mut self, _name: &str, leaf: Leaf<'_>) {
        let kind = self.leaves[self.cursor].kind;
        self.cursor += 1;
        let size = kind.size();
        let range = self.offset..self.offset + size;
        self.offset += size;
        if self.error.is_some() {
            return;
        }
        if let Err(error) = write_leaf_direct(&leaf, kind, &mut self.buf[range]) {
            self.error = Some(error);
        }
    }
}

// ============================================================================
// 叶子级读写与类型转换
// ============================================================================

/// 数值中间表示，跨宽度转换经由它进行
#[derive(Debug, Clone, Copy)]
enum Numeric {
    Signed(i64),
    Unsigned(u64),
    Float(f64),
}

fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

/// 线上数值字段读为中间表示；时间/字符串类别报转换错误
fn read_numeric(view: ElementView, bytes: &[u8], to: &WireType) -> Result<Numeric, CsvError> {
    let value = match view.kind {
        WireType::Int8 => Numeric::Signed((bytes[0] as i8) as i64),
        WireType::Uint8 | WireType::Char => Numeric::Unsigned(bytes[0] as u64),
        WireType::Int16 => Numeric::Signed(i16::from_ne_bytes(array(bytes)) as i64),
        WireType::Uint16 => Numeric::Unsigned(u16::from_ne_bytes(array(bytes)) as u64),
        WireType::Int32 => Numeric::Signed(i32::from_ne_bytes(array(bytes)) as i64),
        WireType::Uint32 => Numeric::Unsigned(u32::from_ne_bytes(array(bytes)) as u64),
        WireType::Int64 => Numeric::Signed(i64::from_ne_bytes(array(bytes))),
        WireType::Uint64 => Numeric::Unsigned(u64::from_ne_bytes(array(bytes))),
        WireType::Float32 => Numeric::Float(f32::from_ne_bytes(array(bytes)) as f64),
        WireType::Float64 => Numeric::Float(f64::from_ne_bytes(array(bytes))),
        WireType::TimeMicros | WireType::TimeNanos | WireType::FixedString(_) => {
            return Err(CsvError::InvalidCast {
                from: view.kind.tag(),
                to: to.tag(),
            });
        }
    };
    Ok(value)
}

/// 中间表示写入线上数值字段；时间/字符串类别报转换错误
fn write_numeric(
    view: ElementView,
    value: Numeric,
    from: &WireType,
    out: &mut [u8],
) -> Result<(), CsvError> {
    match view.kind {
        WireType::Int8 => out[0] = (as_i64(value) as i8) as u8,
        WireType::Uint8 | WireType::Char => out[0] = as_u64(value) as u8,
        WireType::Int16 => out.copy_from_slice(&(as_i64(value) as i16).to_ne_bytes()),
        WireType::Uint16 => out.copy_from_slice(&(as_u64(value) as u16).to_ne_bytes()),
        WireType::Int32 => out.copy_from_slice(&(as_i64(value) as i32).to_ne_bytes()),
        WireType::Uint32 => out.copy_from_slice(&(as_u64(value) as u32).to_ne_bytes()),
        WireType::Int64 => out.copy_from_slice(&as_i64(value).to_ne_bytes()),
        WireType::Uint64 => out.copy_from_slice(&as_u64(value).to_ne_bytes()),
        WireType::Float32 => out.copy_from_slice(&(as_f64(value) as f32).to_ne_bytes()),
        WireType::Float64 => out.copy_from_slice(&as_f64(value).to_ne_bytes()),
        WireType::TimeMicros | WireType::TimeNanos | WireType::FixedString(_) => {
            return Err(CsvError::InvalidCast {
                from: from.tag(),
                to: view.kind.tag(),
            });
        }
    }
    Ok(())
}

fn as_i64(value: Numeric) -> i64 {
    match value {
        Numeric::Signed(v) => v,
        Numeric::Unsigned(v) => v as i64,
        Numeric::Float(v) => v as i64,
    }
}

fn as_u64(value: Numeric) -> u64 {
    match value {
        Numeric::Signed(v) => v as u64,
        Numeric::Unsigned(v) => v,
        Numeric::Float(v) => v as u64,
    }
}

fn as_f64(value: Numeric) -> f64 {
    match value {
        Numeric::Signed(v) => v as f64,
        Numeric::Unsigned(v) => v as f64,
        Numeric::Float(v) => v,
    }
}

/// 线上时间字段读为时间戳；其他类别报转换错误
fn read_time(view: ElementView, bytes: &[u8]) -> Result<Timestamp, CsvError> {
    match view.kind {
        WireType::TimeMicros => Ok(Timestamp::from_micros(i64::from_ne_bytes(array(bytes)))),
        WireType::TimeNanos => {
            let secs = i64::from_ne_bytes(array(&bytes[..8]));
            let nanos = u32::from_ne_bytes(array(&bytes[8..]));
            Ok(Timestamp::new(secs, nanos))
        }
        other => Err(CsvError::InvalidCast {
            from: other.tag(),
            to: WireType::TimeMicros.tag(),
        }),
    }
}

/// 时间戳写入线上时间字段
fn write_time(view: ElementView, ts: &Timestamp, out: &mut [u8]) -> Result<(), CsvError> {
    match view.kind {
        WireType::TimeMicros => out.copy_from_slice(&ts.to_micros().to_ne_bytes()),
        WireType::TimeNanos => {
            out[..8].copy_from_slice(&ts.secs.to_ne_bytes());
            out[8..].copy_from_slice(&ts.nanos.to_ne_bytes());
        }
        other => {
            return Err(CsvError::InvalidCast {
                from: WireType::TimeMicros.tag(),
                to: other.tag(),
            });
        }
    }
    Ok(())
}

fn read_string(view: ElementView, bytes: &[u8]) -> Result<String, CsvError> {
    match view.kind {
        WireType::FixedString(_) => {
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
        }
        other => Err(CsvError::InvalidCast {
            from: other.tag(),
            to: "s".to_string(),
        }),
    }
}

fn write_string(view: ElementView, value: &str, out: &mut [u8]) -> Result<(), CsvError> {
    match view.kind {
        WireType::FixedString(width) => {
            let bytes = value.as_bytes();
            if bytes.len() > width {
                return Err(CsvError::OutOfRange {
                    target: "fixed string",
                    value: value.to_string(),
                });
            }
            out[..bytes.len()].copy_from_slice(bytes);
            for byte in &mut out[bytes.len()..] {
                *byte = 0;
            }
            Ok(())
        }
        other => Err(CsvError::InvalidCast {
            from: "s".to_string(),
            to: other.tag(),
        }),
    }
}

/// 线上字段读入叶子，必要时做显式类型转换
fn read_leaf(leaf: LeafMut<'_>, view: ElementView, bytes: &[u8]) -> Result<(), CsvError> {
    match leaf {
        LeafMut::Bool(x) => {
            *x = match read_numeric(view, bytes, &WireType::Int8)? {
                Numeric::Signed(v) => v != 0,
                Numeric::Unsigned(v) => v != 0,
                Numeric::Float(v) => v != 0.0,
            };
        }
        LeafMut::I8(x) => *x = as_i64(read_numeric(view, bytes, &WireType::Int8)?) as i8,
        LeafMut::U8(x) => *x = as_u64(read_numeric(view, bytes, &WireType::Uint8)?) as u8,
        LeafMut::I16(x) => *x = as_i64(read_numeric(view, bytes, &WireType::Int16)?) as i16,
        LeafMut::U16(x) => *x = as_u64(read_numeric(view, bytes, &WireType::Uint16)?) as u16,
        LeafMut::I32(x) => *x = as_i64(read_numeric(view, bytes, &WireType::Int32)?) as i32,
        LeafMut::U32(x) => *x = as_u64(read_numeric(view, bytes, &WireType::Uint32)?) as u32,
        LeafMut::I64(x) => *x = as_i64(read_numeric(view, bytes, &WireType::Int64)?),
        LeafMut::U64(x) => *x = as_u64(read_numeric(view, bytes, &WireType::Uint64)?),
        LeafMut::F32(x) => *x = as_f64(read_numeric(view, bytes, &WireType::Float32)?) as f32,
        LeafMut::F64(x) => *x = as_f64(read_numeric(view, bytes, &WireType::Float64)?),
        LeafMut::Char(x) => {
            *x = (as_u64(read_numeric(view, bytes, &WireType::Char)?) as u8) as char;
        }
        LeafMut::Time(x) => *x = read_time(view, bytes)?,
        LeafMut::Str(x) => *x = read_string(view, bytes)?,
    }
    Ok(())
}

/// 叶子写入线上字段，必要时做显式类型转换
fn write_leaf(leaf: &Leaf<'_>, view: ElementView, out: &mut [u8]) -> Result<(), CsvError> {
    match leaf {
        Leaf::Bool(x) => write_numeric(
            view,
            Numeric::Signed(if **x { 1 } else { 0 }),
            &WireType::Int8,
            out,
        ),
        Leaf::I8(x) => write_numeric(view, Numeric::Signed(**x as i64), &WireType::Int8, out),
        Leaf::U8(x) => write_numeric(view, Numeric::Unsigned(**x as u64), &WireType::Uint8, out),
        Leaf::I16(x) => write_numeric(view, Numeric::Signed(**x as i64), &WireType::Int16, out),
        Leaf::U16(x) => write_numeric(view, Numeric::Unsigned(**x as u64), &WireType::Uint16, out),
        Leaf::I32(x) => write_numeric(view, Numeric::Signed(**x as i64), &WireType::Int32, out),
        Leaf::U32(x) => write_numeric(view, Numeric::Unsigned(**x as u64), &WireType::Uint32, out),
        Leaf::I64(x) => write_numeric(view, Numeric::Signed(**x), &WireType::Int64, out),
        Leaf::U64(x) => write_numeric(view, Numeric::Unsigned(**x), &WireType::Uint64, out),
        Leaf::F32(x) => write_numeric(view, Numeric::Float(**x as f64), &WireType::Float32, out),
        Leaf::F64(x) => write_numeric(view, Numeric::Float(**x), &WireType::Float64, out),
        Leaf::Char(x) => write_numeric(
            view,
            Numeric::Unsigned((**x as u32) as u64),
            &WireType::Char,
            out,
        ),
        Leaf::Time(x) => write_time(view, x, out),
        Leaf::Str(x) => write_string(view, x, out),
    }
}

/// 快路径：固有类型直接解码，无转换分派
///
/// `bytes` 的宽度由调用方按计划固定的固有类型切好。
fn read_leaf_direct(leaf: LeafMut<'_>, bytes: &[u8]) {
    match leaf {
        LeafMut::Bool(x) => *x = bytes[0] != 0,
        LeafMut::I8(x) => *x = bytes[0] as i8,
        LeafMut::U8(x) => *x = bytes[0],
        LeafMut::I16(x) => *x = i16::from_ne_bytes(array(bytes)),
        LeafMut::U16(x) => *x = u16::from_ne_bytes(array(bytes)),
        LeafMut::I32(x) => *x = i32::from_ne_bytes(array(bytes)),
        LeafMut::U32(x) => *x = u32::from_ne_bytes(array(bytes)),
        LeafMut::I64(x) => *x = i64::from_ne_bytes(array(bytes)),
        LeafMut::U64(x) => *x = u64::from_ne_bytes(array(bytes)),
        LeafMut::F32(x) => *x = f32::from_ne_bytes(array(bytes)),
        LeafMut::F64(x) => *x = f64::from_ne_bytes(array(bytes)),
        LeafMut::Char(x) => *x = bytes[0] as char,
        LeafMut::Time(x) => *x = Timestamp::from_micros(i64::from_ne_bytes(array(bytes))),
        LeafMut::Str(x) => {
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            *x = String::from_utf8_lossy(&bytes[..end]).into_owned();
        }
    }
}

/// 快路径：固有类型直接编码
fn write_leaf_direct(leaf: &Leaf<'_>, kind: WireType, out: &mut [u8]) -> Result<(), CsvError> {
    match leaf {
        Leaf::Bool(x) => out[0] = **x as u8,
        Leaf::I8(x) => out[0] = **x as u8,
        Leaf::U8(x) => out[0] = **x,
        Leaf::I16(x) => out.copy_from_slice(&x.to_ne_bytes()),
        Leaf::U16(x) => out.copy_from_slice(&x.to_ne_bytes()),
        Leaf::I32(x) => out.copy_from_slice(&x.to_ne_bytes()),
        Leaf::U32(x) => out.copy_from_slice(&x.to_ne_bytes()),
        Leaf::I64(x) => out.copy_from_slice(&x.to_ne_bytes()),
        Leaf::U64(x) => out.copy_from_slice(&x.to_ne_bytes()),
        Leaf::F32(x) => out.copy_from_slice(&x.to_ne_bytes()),
        Leaf::F64(x) => out.copy_from_slice(&x.to_ne_bytes()),
        Leaf::Char(x) => out[0] = (**x as u32) as u8,
        Leaf::Time(x) => out.copy_from_slice(&x.to_micros().to_ne_bytes()),
        Leaf::Str(x) => {
            let WireType::FixedString(width) = kind else {
                // 计划里字符串叶子的固有类型恒为 s[N]
                return Err(CsvError::InvalidCast {
                    from: "s".to_string(),
                    to: kind.tag(),
                });
            };
            let bytes = x.as_bytes();
            if bytes.len() > width {
                return Err(CsvError::OutOfRange {
                    target: "fixed string",
                    value: (*x).clone(),
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
