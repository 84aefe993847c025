//! 下载产生的临时文件：Drop 时删除（成功、失败、panic 均会执行）

use std::path::{Path, PathBuf};

/// 本程序产生的临时文件名前缀（启动 / 关闭时按此清理遗留文件）
pub const ARTIFACT_PREFIX: &str = "song_";

/// 一次下载的输出位置：`<dir>/song_<毫秒时间戳>_<uuid>.<ext>`
#[derive(Debug)]
pub struct TempArtifact {
    base: PathBuf,
    extension: String,
}

impl TempArtifact {
    pub fn new(dir: &Path, extension: &str) -> Self {
        let stem = format!(
            "{}{}_{}",
            ARTIFACT_PREFIX,
            chrono::Utc::now().timestamp_millis(),
            uuid::Uuid::new_v4().simple()
        );
        Self {
            base: dir.join(stem),
            extension: extension.to_string(),
        }
    }

    /// 不含扩展名的路径（供 yt-dlp 的 `-o <base>.%(ext)s` 使用）
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// 最终文件路径
    pub fn path(&self) -> PathBuf {
        self.base.with_extension(&self.extension)
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        let path = self.path();
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::debug!("Removed artifact {:?}", path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove artifact {:?}: {}", path, e),
        }
        // 转码中断时 yt-dlp 可能留下中间文件
        if let (Some(dir), Some(stem)) = (self.base.parent(), self.base.file_name()) {
            let stem = stem.to_string_lossy().to_string();
            if let Ok(entries) = std::fs::read_dir(dir) {
                for entry in entries.flatten() {
                    if entry.file_name().to_string_lossy().starts_with(&stem) {
                        let _ = std::fs::remove_file(entry.path());
                    }
                }
            }
        }
    }
}
