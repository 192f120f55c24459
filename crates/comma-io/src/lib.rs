//! # Comma IO
//!
//! 为编解码器供料的流适配层：按行缓冲的文本流与按描述符定长分块的
//! 字节流。编解码器本身从不阻塞，所有阻塞 I/O 都发生在这一层；
//! 坏记录是跳过还是中止由调用方决定。
//!
//! ## 契约
//!
//! - 文本流每次产出一条分隔文本记录（一行，去掉行尾的 `\n`/`\r\n`）；
//! - 字节流每次产出恰好 `format.size()` 字节；
//! - 干净的流结束返回 `None`，结尾的半条记录是独立的
//!   [`IoError::ShortRead`] 错误条件。

use comma_csv::Format;
use std::io::{BufRead, ErrorKind, Read, Write};
use thiserror::Error;

/// 流适配层错误类型
#[derive(Error, Debug)]
pub enum IoError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    /// 流在记录边界之外结束
    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    /// 写出的记录长度与描述符不一致
    #[error("Record size mismatch: expected {expected} bytes, got {actual}")]
    RecordSize { expected: usize, actual: usize },
}

/// 按行读取文本记录
pub struct LineReader<R: BufRead> {
    inner: R,
    line: String,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line: String::new(),
        }
    }

    /// 读取下一条记录；干净的流结束返回 `None`
    pub fn read_record(&mut self) -> Result<Option<&str>, IoError> {
        self.line.clear();
        let n = self.inner.read_line(&mut self.line)?;
        if n == 0 {
            tracing::debug!("line stream ended");
            return Ok(None);
        }
        if self.line.ends_with('\n') {
            self.line.pop();
            if self.line.ends_with('\r') {
                self.line.pop();
            }
        }
        Ok(Some(&self.line))
    }
}

/// 按行写出文本记录
pub struct LineWriter<W: Write> {
    inner: W,
}

impl<W: Write> LineWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// 写出一条记录并追加换行
    pub fn write_record(&mut self, line: &str) -> Result<(), IoError> {
        self.inner.write_all(line.as_bytes())?;
        self.inner.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), IoError> {
        self.inner.flush()?;
        Ok(())
    }

    /// 取回内部写入器
    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// 按描述符定长分块读取二进制记录
///
/// 缓冲在实例内复用，每次读取覆写上一条记录。
pub struct RecordReader<R: Read> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: Read> RecordReader<R> {
    /// 记录长度取自描述符
    pub fn new(inner: R, format: &Format) -> Self {
        Self::with_size(inner, format.size())
    }

    /// 显式记录长度
    pub fn with_size(inner: R, size: usize) -> Self {
        Self {
            inner,
            buf: vec![0u8; size],
        }
    }

    /// 读取下一条记录
    ///
    /// 记录边界上的流结束返回 `None`；结尾的半条记录返回
    /// [`IoError::ShortRead`]。
    pub fn read_record(&mut self) -> Result<Option<&[u8]>, IoError> {
        let mut filled = 0;
        while filled < self.buf.len() {
            match self.inner.read(&mut self.buf[filled..]) {
                Ok(0) => {
                    if filled == 0 {
                        tracing::debug!("record stream ended");
                        return Ok(None);
                    }
                    tracing::debug!(
                        expected = self.buf.len(),
                        actual = filled,
                        "record stream ended mid-record"
                    );
                    return Err(IoError::ShortRead {
                        expected: self.buf.len(),
                        actual: filled,
                    });
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Some(&self.buf))
    }
}

/// 按描述符定长分块写出二进制记录
pub struct RecordWriter<W: Write> {
    inner: W,
    size: usize,
}

impl<W: Write> RecordWriter<W> {
    /// 记录长度取自描述符
    pub fn new(inner: W, format: &Format) -> Self {
        Self::with_size(inner, format.size())
    }

    /// 显式记录长度
    pub fn with_size(inner: W, size: usize) -> Self {
        Self { inner, size }
    }

    /// 写出一条记录，长度必须与描述符一致
    pub fn write_record(&mut self, record: &[u8]) -> Result<(), IoError> {
        if record.len() != self.size {
            return Err(IoError::RecordSize {
                expected: self.size,
                actual: record.len(),
            });
        }
        self.inner.write_all(record)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), IoError> {
        self.inner.flush()?;
        Ok(())
    }

    /// 取回内部写入器
    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Cursor};

    /// 测试按行读取与行尾剥离
    #[test]
    fn test_line_reader() {
        let input = Cursor::new("1,2,3\r\n4,5,6\n7,8,9");
        let mut reader = LineReader::new(BufReader::new(input));
        assert_eq!(reader.read_record().unwrap(), Some("1,2,3"));
        assert_eq!(reader.read_record().unwrap(), Some("4,5,6"));
        assert_eq!(reader.read_record().unwrap(), Some("7,8,9"));
        assert_eq!(reader.read_record().unwrap(), None);
    }

    /// 测试行写出
    #[test]
    fn test_line_writer() {
        let mut writer = LineWriter::new(Vec::new());
        writer.write_record("a,b").unwrap();
        writer.write_record("c,d").unwrap();
        assert_eq!(writer.into_inner(), b"a,b\nc,d\n");
    }

    /// 测试定长记录读取：整记录、流结束、半条记录
    #[test]
    fn test_record_reader() {
        let format = Format::parse("2w").unwrap();
        let data: Vec<u8> = vec![1, 0, 2, 0, 3, 0, 4, 0, 5];
        let mut reader = RecordReader::new(Cursor::new(data), &format);

        assert_eq!(reader.read_record().unwrap(), Some(&[1, 0, 2, 0][..]));
        assert_eq!(reader.read_record().unwrap(), Some(&[3, 0, 4, 0][..]));
        match reader.read_record() {
            Err(IoError::ShortRead { expected, actual }) => {
                assert_eq!(expected, 4);
                assert_eq!(actual, 1);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    /// 测试记录边界上的干净结束
    #[test]
    fn test_record_reader_clean_eof() {
        let mut reader = RecordReader::with_size(Cursor::new(vec![9u8, 8, 7, 6]), 4);
        assert_eq!(reader.read_record().unwrap(), Some(&[9u8, 8, 7, 6][..]));
        assert_eq!(reader.read_record().unwrap(), None);
    }

    /// 测试定长记录写出与长度校验
    #[test]
    fn test_record_writer() {
        let format = Format::parse("ui").unwrap();
        let mut writer = RecordWriter::new(Vec::new(), &format);
        writer.write_record(&[1, 2, 3, 4]).unwrap();
        assert!(matches!(
            writer.write_record(&[1, 2, 3]),
            Err(IoError::RecordSize {
                expected: 4,
                actual: 3
            })
        ));
        assert_eq!(writer.into_inner(), vec![1, 2, 3, 4]);
    }

    /// 测试文件往返（临时文件）
    #[test]
    fn test_file_roundtrip() {
        use std::io::{Seek, SeekFrom};

        let format = Format::parse("3ub").unwrap();
        let mut file = tempfile::tempfile().unwrap();
        {
            let mut writer = RecordWriter::new(&mut file, &format);
            writer.write_record(&[1, 2, 3]).unwrap();
            writer.write_record(&[4, 5, 6]).unwrap();
            writer.flush().unwrap();
        }
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut reader = RecordReader::new(&mut file, &format);
        assert_eq!(reader.read_record().unwrap(), Some(&[1u8, 2, 3][..]));
        assert_eq!(reader.read_record().unwrap(), Some(&[4u8, 5, 6][..]));
        assert_eq!(reader.read_record().unwrap(), None);
    }
}
