//! # 控制字符清洗读取器
//!
//! vasprun.xml 在计算崩溃时可能混入使 XML 失效的控制字节。
//! 本模块在解析前无条件剥离 0x00-0x09 和 0x0B-0x1F 范围的字节
//! （保留换行 0x0A 及其他全部字节），不产生任何诊断。
//!
//! ## 依赖关系
//! - 被 `parsers/vasprun.rs`, `parsers/vasprun_stream.rs` 使用
//! - 无外部模块依赖

use std::io::Read;

/// 字节是否需要剥离
#[inline]
fn is_invalid(byte: u8) -> bool {
    matches!(byte, 0x00..=0x09 | 0x0B..=0x1F)
}

/// 包装底层字节流的单向清洗读取器
///
/// 前向只读，不可重置；读到底层流末尾即结束。
pub struct SanitizingReader<R: Read> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: Read> SanitizingReader<R> {
    pub fn new(inner: R) -> Self {
        SanitizingReader {
            inner,
            buf: vec![0; 8192],
        }
    }
}

impl<R: Read> Read for SanitizingReader<R> {
    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        // 一个块可能整块被剥离，循环直到产出数据或底层 EOF
        loop {
            let want = out.len().min(self.buf.len());
            let n = self.inner.read(&mut self.buf[..want])?;
            if n == 0 {
                return Ok(0);
            }
            let mut written = 0;
            for &b in &self.buf[..n] {
                if !is_invalid(b) {
                    out[written] = b;
                    written += 1;
                }
            }
            if written > 0 {
                return Ok(written);
            }
        }
    }
}

/// 对整块内存缓冲应用同样的清洗规则
pub fn sanitize_buffer(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().copied().filter(|&b| !is_invalid(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_control_characters() {
        let input = b"<a>\x00\x01\x08\x09text\x0b\x1f</a>";
        let mut reader = SanitizingReader::new(&input[..]);
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "<a>text</a>");
    }

    #[test]
    fn test_preserves_newlines_and_normal_bytes() {
        let input = b"line1\nline2\n";
        let mut reader = SanitizingReader::new(&input[..]);
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "line1\nline2\n");
    }

    #[test]
    fn test_all_control_chunk_then_data() {
        // 整块都是坏字节时不能被误判为 EOF
        let mut input = vec![0x01u8; 9000];
        input.extend_from_slice(b"ok");
        let mut reader = SanitizingReader::new(&input[..]);
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "ok");
    }

    #[test]
    fn test_sanitize_buffer() {
        let cleaned = sanitize_buffer(b"a\x1eb\x1fc\nd");
        assert_eq!(cleaned, b"abc\nd");
    }

    #[test]
    fn test_empty_input() {
        let mut reader = SanitizingReader::new(&b""[..]);
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert!(out.is_empty());
    }
}
