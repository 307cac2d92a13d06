//! JSON 值分帧
//!
//! 在非结构化文本中定位完整的顶层 JSON 值（对象或数组）。
//! 只跟踪括号嵌套与字符串状态，不校验值本身是否合法。
//!
//! 扫描状态在多次 `append` 之间保留，每个字节只扫描一次。

/// 单次扫描结果
///
/// 所有位置均为相对于缓冲区开头的字节偏移
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scan {
    /// 没有任何开始符 `{` / `[`
    NoOpener,
    /// 找到完整的值，`start..=end`
    Complete { start: usize, end: usize },
    /// 值尚未结束，需要更多输入
    Partial { start: usize },
    /// 遇到不匹配的结束符，停止扫描
    Mismatch { start: usize, at: usize },
}

/// 增量 JSON 扫描器
///
/// 调用方移除缓冲区前缀后必须调用 [`JsonScanner::shift`] 或 [`JsonScanner::reset`]，
/// 使保存的偏移与缓冲区保持一致。
#[derive(Debug, Clone, Default)]
pub(crate) struct JsonScanner {
    /// 当前值的开始符位置
    opener: Option<usize>,
    /// 下一个待扫描字节
    pos: usize,
    stack: Vec<u8>,
    in_string: bool,
    escaped: bool,
    /// 不匹配时的 (开始符, 结束符) 位置，之后的扫描直接返回
    mismatch: Option<(usize, usize)>,
}

impl JsonScanner {
    /// 从上次停下的位置继续扫描 `buf`
    ///
    /// 开始符之前的内容视为噪声，由调用方丢弃。
    pub(crate) fn scan(&mut self, buf: &str) -> Scan {
        if let Some((start, at)) = self.mismatch {
            return Scan::Mismatch { start, at };
        }

        let bytes = buf.as_bytes();
        let start = match self.opener {
            Some(start) => start,
            None => {
                let from = self.pos.min(bytes.len());
                match bytes[from..].iter().position(|b| matches!(b, b'{' | b'[')) {
                    Some(offset) => {
                        let start = from + offset;
                        self.opener = Some(start);
                        self.pos = start;
                        start
                    }
                    None => {
                        self.pos = bytes.len();
                        return Scan::NoOpener;
                    }
                }
            }
        };

        // 结构字符均为 ASCII，多字节 UTF-8 序列中不会出现，按字节扫描是安全的
        while self.pos < bytes.len() {
            let pos = self.pos;
            let b = bytes[pos];
            self.pos += 1;

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if b == b'\\' {
                    self.escaped = true;
                } else if b == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match b {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.stack.push(b),
                b'}' | b']' => {
                    let opener = if b == b'}' { b'{' } else { b'[' };
                    if self.stack.last() != Some(&opener) {
                        self.mismatch = Some((start, pos));
                        return Scan::Mismatch { start, at: pos };
                    }
                    self.stack.pop();
                    if self.stack.is_empty() {
                        self.reset();
                        return Scan::Complete { start, end: pos };
                    }
                }
                _ => {}
            }
        }

        Scan::Partial { start }
    }

    /// 缓冲区开头移除了 `n` 字节
    pub(crate) fn shift(&mut self, n: usize) {
        self.pos = self.pos.saturating_sub(n);
        self.opener = self.opener.map(|o| o.saturating_sub(n));
        self.mismatch = self
            .mismatch
            .map(|(start, at)| (start.saturating_sub(n), at.saturating_sub(n)));
    }

    /// 丢弃所有扫描状态
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}
