//! 语言启发式判断
//!
//! 基于字符所属的 Unicode 区段做粗略分类，不做真正的语言识别

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

/// 语言分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LanguageClass {
    /// 含有假名、汉字或全角符号
    Native,
    /// 仅由 ASCII 字母数字与标点组成
    ForeignAscii,
    /// 其他文字
    Other,
    /// 空文本
    Unknown,
}

impl LanguageClass {
    /// 与设置中的语言代码比较时使用的标签
    pub fn tag(self) -> &'static str {
        match self {
            LanguageClass::Native => "ja",
            LanguageClass::ForeignAscii => "en",
            LanguageClass::Other => "other",
            LanguageClass::Unknown => "unknown",
        }
    }
}

impl fmt::Display for LanguageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// 母语文字区段：CJK 符号、平假名、片假名、半角及全角形式、CJK 统一汉字
const NATIVE_RANGES: &[(char, char)] = &[
    ('\u{3000}', '\u{303f}'),
    ('\u{3040}', '\u{309f}'),
    ('\u{30a0}', '\u{30ff}'),
    ('\u{ff00}', '\u{ff9f}'),
    ('\u{4e00}', '\u{9faf}'),
];

/// 判断字符是否属于母语文字区段
pub fn is_native_char(c: char) -> bool {
    NATIVE_RANGES
        .iter()
        .any(|&(start, end)| (start..=end).contains(&c))
}

fn ascii_pattern() -> Option<&'static Regex> {
    static ASCII: OnceLock<Option<Regex>> = OnceLock::new();
    ASCII
        .get_or_init(|| {
            Regex::new(
                r#"^[a-zA-Z0-9\s.,!?'"&()*+\-/:;<=>@\[\\\]^_`{|}~％＆（）＊＋－／：；＜＝＞＠［＼］＾＿｀｛｜｝～]*$"#,
            )
            .ok()
        })
        .as_ref()
}

/// 对文本进行语言分类
///
/// 空文本返回 [`LanguageClass::Unknown`]，其他输入总能得到分类结果
pub fn classify(text: &str) -> LanguageClass {
    if text.is_empty() {
        return LanguageClass::Unknown;
    }

    if text.chars().any(is_native_char) {
        return LanguageClass::Native;
    }

    let is_ascii = match ascii_pattern() {
        Some(pattern) => pattern.is_match(text),
        None => text.is_ascii(),
    };

    if is_ascii {
        LanguageClass::ForeignAscii
    } else {
        LanguageClass::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_scripts() {
        assert_eq!(classify("こんにちは"), LanguageClass::Native);
        assert_eq!(classify("カタカナ"), LanguageClass::Native);
        assert_eq!(classify("漢字"), LanguageClass::Native);
        // 一个母语字符就足够
        assert_eq!(classify("hello 世界"), LanguageClass::Native);
        assert_eq!(classify("ok！"), LanguageClass::Native);
    }

    #[test]
    fn test_foreign_ascii() {
        assert_eq!(classify("hello"), LanguageClass::ForeignAscii);
        assert_eq!(classify("GG wp, see you @ 5:00 (maybe)?"), LanguageClass::ForeignAscii);
        assert_eq!(classify("path/to\\thing [x] {y} ~z"), LanguageClass::ForeignAscii);
    }

    #[test]
    fn test_other_scripts() {
        assert_eq!(classify("안녕하세요"), LanguageClass::Other);
        assert_eq!(classify("привет"), LanguageClass::Other);
        assert_eq!(classify("¿qué tal?"), LanguageClass::Other);
        // 不在模式内的 ASCII 标点
        assert_eq!(classify("#1 $5"), LanguageClass::Other);
    }

    #[test]
    fn test_empty_is_unknown() {
        assert_eq!(classify(""), LanguageClass::Unknown);
        assert_eq!(LanguageClass::Unknown.tag(), "unknown");
    }

    #[test]
    fn test_whitespace_only_is_ascii() {
        assert_eq!(classify("   "), LanguageClass::ForeignAscii);
    }
}
