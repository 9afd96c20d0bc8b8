//! # 输出文件定位模块
//!
//! 把计算目录的文件快照按 "角色" 解析为具体路径。每个引擎用
//! 文件名/内容谓词描述自己的角色（主输出、结构文件、态密度等），
//! 由 `FileSet` 统一执行严格的基数检查：
//!
//! - 恰好一个匹配：返回该路径
//! - 零个匹配：可选角色返回 `None`，必需角色返回 `MissingOutput`
//! - 多个匹配：一律返回 `Ambiguity`，绝不静默取第一个
//!
//! ## 依赖关系
//! - 依赖 `error` 模块
//! - 被 `parsers/` 使用

use crate::error::{ExtractError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// 一个计算目录的文件快照（仅顶层普通文件，不递归）
#[derive(Debug, Clone)]
pub struct FileSet {
    files: Vec<PathBuf>,
}

impl FileSet {
    /// 从显式路径列表创建，按路径排序保证确定性
    pub fn from_paths(paths: Vec<PathBuf>) -> Self {
        let mut files = paths;
        files.sort();
        FileSet { files }
    }

    /// 扫描目录顶层的普通文件（不进入子目录）
    pub fn from_directory(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();

        if !dir.is_dir() {
            return Err(ExtractError::DirectoryNotFound {
                path: dir.display().to_string(),
            });
        }

        let entries = fs::read_dir(dir).map_err(|e| ExtractError::file_read(dir.display(), e))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ExtractError::file_read(dir.display(), e))?;
            let file_type = entry
                .file_type()
                .map_err(|e| ExtractError::file_read(entry.path().display(), e))?;
            if file_type.is_file() {
                files.push(entry.path());
            }
        }

        Ok(FileSet::from_paths(files))
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// 解析可选角色：零个匹配返回 `None`，多个匹配返回 `Ambiguity`
    pub fn resolve<P>(&self, role: &str, predicate: P) -> Result<Option<&Path>>
    where
        P: Fn(&Path) -> bool,
    {
        let matches: Vec<&Path> = self
            .files
            .iter()
            .map(PathBuf::as_path)
            .filter(|p| predicate(p))
            .collect();

        match matches.len() {
            0 => Ok(None),
            1 => Ok(Some(matches[0])),
            _ => Err(ExtractError::Ambiguity {
                role: role.to_string(),
                paths: matches.iter().map(|p| p.display().to_string()).collect(),
            }),
        }
    }

    /// 解析必需角色：零个匹配返回 `MissingOutput`
    pub fn resolve_required<P>(&self, role: &str, predicate: P) -> Result<&Path>
    where
        P: Fn(&Path) -> bool,
    {
        self.resolve(role, predicate)?
            .ok_or_else(|| ExtractError::MissingOutput {
                role: role.to_string(),
                candidates: self.files.len(),
            })
    }
}

/// 文件名（不含路径）与给定名称相等，忽略大小写
pub fn file_name_matches(path: &Path, name: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.eq_ignore_ascii_case(name))
        .unwrap_or(false)
}

/// 文件名以给定前缀开头，忽略大小写
pub fn file_name_starts_with(path: &Path, prefix: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.get(..prefix.len()))
        .map(|head| head.eq_ignore_ascii_case(prefix))
        .unwrap_or(false)
}

/// 扩展名与给定值相等，忽略大小写
pub fn file_extension_is(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

/// 文件内容包含给定子串，忽略大小写；读取失败按不匹配处理
pub fn content_contains(path: &Path, needle: &str) -> bool {
    match fs::read(path) {
        Ok(bytes) => {
            let text = String::from_utf8_lossy(&bytes).to_ascii_lowercase();
            text.contains(&needle.to_ascii_lowercase())
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_from_directory_skips_subdirectories() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "OUTCAR", "data");
        std::fs::create_dir(dir.path().join("backup")).unwrap();
        write_file(&dir, "backup/OUTCAR", "old data");

        let fs = FileSet::from_directory(dir.path()).unwrap();
        assert_eq!(fs.len(), 1);
    }

    #[test]
    fn test_from_directory_missing_dir() {
        let dir = TempDir::new().unwrap();
        let result = FileSet::from_directory(dir.path().join("no_such"));
        assert!(matches!(
            result,
            Err(ExtractError::DirectoryNotFound { .. })
        ));
    }

    #[test]
    fn test_resolve_single_match() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "OUTCAR", "");
        write_file(&dir, "INCAR", "");

        let fs = FileSet::from_directory(dir.path()).unwrap();
        let found = fs
            .resolve("main output", |p| file_name_matches(p, "outcar"))
            .unwrap();
        assert!(found.is_some());
    }

    #[test]
    fn test_resolve_zero_matches_is_none() {
        let fs = FileSet::from_paths(vec![PathBuf::from("a/INCAR")]);
        let found = fs
            .resolve("density of states", |p| file_name_matches(p, "DOSCAR"))
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_resolve_ambiguity_lists_all_matches() {
        let fs = FileSet::from_paths(vec![
            PathBuf::from("run/OUTCAR"),
            PathBuf::from("run/OUTCAR.2"),
        ]);

        let err = fs
            .resolve("main output", |p| file_name_starts_with(p, "OUTCAR"))
            .unwrap_err();
        match err {
            ExtractError::Ambiguity { role, paths } => {
                assert_eq!(role, "main output");
                assert_eq!(paths.len(), 2);
            }
            other => panic!("expected Ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_required_missing() {
        let fs = FileSet::from_paths(vec![PathBuf::from("run/INCAR")]);
        let err = fs
            .resolve_required("main output", |p| file_name_matches(p, "OUTCAR"))
            .unwrap_err();
        assert!(matches!(err, ExtractError::MissingOutput { candidates: 1, .. }));
    }

    #[test]
    fn test_name_predicates_case_insensitive() {
        let path = PathBuf::from("run/OutCar.gz");
        assert!(file_name_starts_with(&path, "outcar"));
        assert!(!file_name_matches(&path, "outcar"));
        assert!(file_extension_is(&path, "GZ"));
    }

    #[test]
    fn test_content_contains() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "log.txt", "Running GPAW version 21.6.0\n");

        assert!(content_contains(&path, "gpaw"));
        assert!(!content_contains(&path, "vasp"));
        assert!(!content_contains(&dir.path().join("absent"), "gpaw"));
    }

    #[test]
    fn test_paths_sorted_for_determinism() {
        let fs = FileSet::from_paths(vec![
            PathBuf::from("b"),
            PathBuf::from("a"),
            PathBuf::from("c"),
        ]);
        let names: Vec<_> = fs.paths().iter().map(|p| p.display().to_string()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
