//! 엔티티별 로그 싱크
//!
//! 엔티티 로그는 OS 스레드 ID가 아니라 [`TaskId`]로 연결됩니다.
//! 종료된 스레드의 ID가 재사용되면 로그 파일 대응이 깨지기 때문입니다.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use crate::types::{EntityKindTag, TaskId};

/// 엔티티별 로그 파일 관리 trait
pub trait LogSink: Send + Sync {
    /// 엔티티 로그 파일 이름을 계산합니다 (파일을 열지 않음).
    fn log_file_name(&self, task: TaskId, kind: EntityKindTag, name: &str) -> String {
        format!("{}_{}_{}.log", kind, sanitize(name), task)
    }

    /// 엔티티 로그 파일로 전환하고 파일 이름을 반환합니다.
    fn change_log_file(
        &self,
        task: TaskId,
        kind: EntityKindTag,
        name: &str,
    ) -> std::io::Result<String>;

    /// 엔티티 로그에 마커 한 줄을 기록합니다.
    fn marker(&self, kind: EntityKindTag, name: &str, text: &str);

    /// 엔티티 로그 핸들을 해제합니다.
    fn release_file_handle(&self, kind: EntityKindTag, name: &str);
}

/// 파일 이름에 쓸 수 없는 문자를 `_`로 바꿉니다.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

// ─── TracingLogSink ──────────────────────────────────────────────────

/// 파일을 만들지 않고 `tracing`으로만 마커를 내보내는 싱크
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn change_log_file(
        &self,
        task: TaskId,
        kind: EntityKindTag,
        name: &str,
    ) -> std::io::Result<String> {
        let file = self.log_file_name(task, kind, name);
        debug!(entity = name, kind = %kind, task_id = %task, log = %file, "log context switched");
        Ok(file)
    }

    fn marker(&self, kind: EntityKindTag, name: &str, text: &str) {
        debug!(entity = name, kind = %kind, marker = text, "entity log marker");
    }

    fn release_file_handle(&self, kind: EntityKindTag, name: &str) {
        debug!(entity = name, kind = %kind, "log handle released");
    }
}

// ─── FileLogSink ─────────────────────────────────────────────────────

/// 엔티티마다 `<dir>/<kind>_<name>_<task_id>.log` 파일을 여는 싱크
pub struct FileLogSink {
    dir: PathBuf,
    open: Mutex<HashMap<(EntityKindTag, String), BufWriter<File>>>,
}

impl FileLogSink {
    /// 로그 디렉토리를 생성하고 싱크를 만듭니다.
    pub fn new(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            open: Mutex::new(HashMap::new()),
        })
    }

    /// 로그 디렉토리
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 현재 열려 있는 핸들 수
    pub fn open_handles(&self) -> usize {
        self.open.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl LogSink for FileLogSink {
    fn change_log_file(
        &self,
        task: TaskId,
        kind: EntityKindTag,
        name: &str,
    ) -> std::io::Result<String> {
        let file_name = self.log_file_name(task, kind, name);
        let path = self.dir.join(&file_name);
        let file = File::options().create(true).append(true).open(&path)?;
        self.open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((kind, name.to_owned()), BufWriter::new(file));
        Ok(path.display().to_string())
    }

    fn marker(&self, kind: EntityKindTag, name: &str, text: &str) {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(writer) = open.get_mut(&(kind, name.to_owned())) {
            let stamp = chrono::Utc::now().to_rfc3339();
            if let Err(e) = writeln!(writer, "{stamp} {text}") {
                warn!(entity = name, error = %e, "failed to write log marker");
            }
        }
    }

    fn release_file_handle(&self, kind: EntityKindTag, name: &str) {
        let removed = self
            .open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(kind, name.to_owned()));
        if let Some(mut writer) = removed {
            if let Err(e) = writer.flush() {
                warn!(entity = name, error = %e, "failed to flush entity log");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_path_separators() {
        assert_eq!(sanitize("io/read write"), "io_read_write");
        assert_eq!(sanitize("vlan-10.cfg"), "vlan-10.cfg");
    }

    #[test]
    fn default_file_name_uses_task_id() {
        let name = TracingLogSink.log_file_name(TaskId::new(55), EntityKindTag::Case, "ping");
        assert_eq!(name, "case_ping_55.log");
    }

    #[test]
    fn file_sink_writes_markers_and_releases() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileLogSink::new(dir.path().join("logs")).unwrap();

        let path = sink
            .change_log_file(TaskId::new(9), EntityKindTag::Case, "ping")
            .unwrap();
        assert_eq!(sink.open_handles(), 1);
        sink.marker(EntityKindTag::Case, "ping", "===== pre-test =====");
        sink.release_file_handle(EntityKindTag::Case, "ping");
        assert_eq!(sink.open_handles(), 0);

        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("===== pre-test ====="));
    }

    #[test]
    fn marker_without_open_handle_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileLogSink::new(dir.path()).unwrap();
        sink.marker(EntityKindTag::Group, "never-opened", "x");
        sink.release_file_handle(EntityKindTag::Group, "never-opened");
        assert_eq!(sink.open_handles(), 0);
    }
}
