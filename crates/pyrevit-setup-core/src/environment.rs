//! 机器级 PATH 字符串处理。
//!
//! 追加规则与注册表 `{olddata};{app}\bin` 写法一致：总是在原值后拼接 `;` 与新目录，
//! 不做去重。卸载不会移除该条目，重复安装会产生重复条目。

/// 在 PATH 原值后追加一个目录。
///
/// 参数：
/// - `current`：原 PATH 值（不存在时为 `None`，按空字符串处理）
/// - `entry`：要追加的目录
///
/// 返回值：
/// - `"{current};{entry}"`
pub fn append_path_entry(current: Option<&str>, entry: &str) -> String {
    format!("{};{}", current.unwrap_or_default(), entry)
}

/// 统计 PATH 中与 `entry` 相同的条目数量。
///
/// 比较时忽略大小写与末尾的路径分隔符（Windows 路径不区分大小写）。
pub fn count_path_entries(path_value: &str, entry: &str) -> usize {
    let needle = normalize(entry);
    if needle.is_empty() {
        return 0;
    }
    path_value
        .split(';')
        .filter(|segment| normalize(segment) == needle)
        .count()
}

fn normalize(segment: &str) -> String {
    segment
        .trim()
        .trim_end_matches(['\\', '/'])
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_with_leading_separator() {
        let out = append_path_entry(Some(r"C:\Windows;C:\Windows\System32"), r"C:\Tools\bin");
        assert_eq!(out, r"C:\Windows;C:\Windows\System32;C:\Tools\bin");
    }

    #[test]
    fn missing_value_still_gets_separator() {
        assert_eq!(append_path_entry(None, r"C:\Tools\bin"), r";C:\Tools\bin");
    }

    #[test]
    fn repeated_appends_accumulate_duplicates() {
        let entry = r"C:\Program Files\pyRevit CLI\bin";
        let mut value = r"%SystemRoot%\system32".to_string();
        for _ in 0..3 {
            value = append_path_entry(Some(&value), entry);
        }
        assert_eq!(count_path_entries(&value, entry), 3);
        assert_eq!(value.matches(&format!(";{entry}")).count(), 3);
    }

    #[test]
    fn count_ignores_case_and_trailing_separator() {
        let value = r"C:\A;c:\program files\pyrevit cli\BIN\;C:\B";
        assert_eq!(count_path_entries(value, r"C:\Program Files\pyRevit CLI\bin"), 1);
        assert_eq!(count_path_entries(value, ""), 0);
    }
}
