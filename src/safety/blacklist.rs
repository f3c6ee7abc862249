//! 毁灭性命令黑名单
//!
//! 内建模式覆盖根路径递归删除、裸盘设备写入、mkfs、fork bomb 等；
//! 可通过配置追加自定义正则。命中即进入不可执行区间，确认也无法放行。

use regex::Regex;

/// 内建毁灭性模式（正则，忽略大小写）
const BUILTIN_PATTERNS: &[&str] = &[
    r"rm\s+(-[a-z]*r[a-z]*f|-[a-z]*f[a-z]*r)\s+/\s*$",
    r"rm\s+(-[a-z]*r[a-z]*f|-[a-z]*f[a-z]*r)\s+/\*",
    r"rm\s+(-[a-z]*r[a-z]*f|-[a-z]*f[a-z]*r)\s+~/?\*?\s*$",
    r"mkfs",
    r"dd\s+if=/dev/(zero|random|urandom)",
    r">\s*/dev/(sd[a-z]|hd[a-z]|nvme\d)",
    r"chmod\s+-R\s+777\s+/\s*$",
    r":\(\)\{\s*:\|:&\s*\};:", // fork bomb
    r"git\s+push\s+.*--force.*\s(origin/)?(main|master)(\s|$)",
    r"git\s+push\s+-f\s+.*\s(main|master)(\s|$)",
];

/// 黑名单检查器：编译一次，之后 check 为纯查询
pub struct Blacklist {
    patterns: Vec<Regex>,
}

impl Blacklist {
    /// 内建模式 + 配置追加的自定义模式；非法正则跳过并告警
    pub fn new(custom: &[String]) -> Self {
        let mut patterns = Vec::new();
        for src in BUILTIN_PATTERNS.iter().map(|s| s.to_string()).chain(custom.iter().cloned()) {
            match Regex::new(&format!("(?i){}", src)) {
                Ok(re) => patterns.push(re),
                Err(e) => tracing::warn!(pattern = %src, error = %e, "invalid blacklist pattern"),
            }
        }
        Self { patterns }
    }

    /// 命令是否命中黑名单；返回命中的模式文本
    pub fn check(&self, command: &str) -> Option<String> {
        self.patterns
            .iter()
            .find(|re| re.is_match(command))
            .map(|re| re.as_str().to_string())
    }
}

impl Default for Blacklist {
    fn default() -> Self {
        Self::new(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_patterns_block_root_delete() {
        let bl = Blacklist::default();
        assert!(bl.check("rm -rf /").is_some());
        assert!(bl.check("rm -rf /*").is_some());
        assert!(bl.check("sudo rm -fr /").is_some());
    }

    #[test]
    fn test_disk_and_mkfs_blocked() {
        let bl = Blacklist::default();
        assert!(bl.check("dd if=/dev/zero of=/dev/sda").is_some());
        assert!(bl.check("mkfs.ext4 /dev/sda1").is_some());
        assert!(bl.check("echo x > /dev/sda").is_some());
    }

    #[test]
    fn test_force_push_to_protected_branch_blocked() {
        let bl = Blacklist::default();
        assert!(bl.check("git push --force origin main").is_some());
        assert!(bl.check("git push -f origin master").is_some());
        // 普通 push 不在黑名单（由风险分处理）
        assert!(bl.check("git push origin feature/x").is_none());
    }

    #[test]
    fn test_ordinary_commands_pass() {
        let bl = Blacklist::default();
        assert!(bl.check("ls -la").is_none());
        assert!(bl.check("rm build/output.log").is_none());
        assert!(bl.check("cargo build").is_none());
    }

    #[test]
    fn test_custom_pattern() {
        let bl = Blacklist::new(&[r"drop\s+database".to_string()]);
        assert!(bl.check("mysql -e 'DROP DATABASE prod'").is_some());
    }

    #[test]
    fn test_invalid_custom_pattern_skipped() {
        // 非法正则不让构造失败
        let bl = Blacklist::new(&["([".to_string()]);
        assert!(bl.check("ls").is_none());
    }
}
