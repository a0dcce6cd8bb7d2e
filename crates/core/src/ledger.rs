//! 상태 원장 — 엔티티 생명주기 단계와 결과의 외부 기록
//!
//! [`StatusLedger`]는 `statusUuid`로 주소가 지정되는 키-값 저장소입니다.
//! 엔진은 실행 전에 모든 엔티티를 `init_case` 단계로 저장하고,
//! 이후 단계 전환마다 `update`로 필드를 갱신합니다.
//!
//! 원장 실패는 경고로만 기록되며 실행을 중단시키지 않습니다.

use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::LedgerError;

/// 원장 레코드 필드 맵
pub type LedgerFields = Map<String, Value>;

/// 상태 필드 (`TestStatus` 토큰)
pub const FIELD_STATUS: &str = "_status";
/// 생명주기 단계 필드 (`init_case`, `running`, `done`)
pub const FIELD_STAGE: &str = "_stage";
/// 시작 시각 (RFC 3339)
pub const FIELD_START: &str = "_start";
/// 종료 시각 (RFC 3339)
pub const FIELD_END: &str = "_end";
/// 소요 시간 (초, 부동소수)
pub const FIELD_DURATION: &str = "_duration";
/// post 단계 상태
pub const FIELD_POST_STATUS: &str = "_post_status";
/// 엔티티 이름
pub const FIELD_NAME: &str = "_name";
/// 엔티티 종류 (`case`, `group`, `configuration`)
pub const FIELD_WHAT: &str = "_what";
/// 마지막 실패 사유
pub const FIELD_REASON: &str = "_reason";

/// 원장상의 생명주기 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStage {
    /// 등록됨, 아직 시작 전
    InitCase,
    /// 실행 중
    Running,
    /// 완료
    Done,
}

impl LedgerStage {
    /// 원장 필드 값
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InitCase => "init_case",
            Self::Running => "running",
            Self::Done => "done",
        }
    }
}

/// 외부 상태 저장소 trait
///
/// 구현체는 스레드 안전해야 합니다. 여러 태스크가 서로 다른 uuid를
/// 동시에 갱신합니다.
pub trait StatusLedger: Send + Sync {
    /// 새 레코드를 저장하고 uuid를 반환합니다.
    fn save(&self, fields: LedgerFields) -> Result<String, LedgerError>;

    /// 기존 레코드의 필드를 병합 갱신합니다.
    fn update(&self, uuid: &str, fields: LedgerFields) -> Result<(), LedgerError>;

    /// 버퍼된 기록을 저장소로 내보냅니다.
    fn flush(&self) -> Result<(), LedgerError> {
        Ok(())
    }
}

// ─── MemoryLedger ────────────────────────────────────────────────────

/// 프로세스 내 메모리 원장
///
/// 기본 백엔드이며, 테스트에서 기록 내용을 조회할 때도 사용합니다.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: Mutex<HashMap<String, LedgerFields>>,
}

impl MemoryLedger {
    /// 빈 원장을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// uuid로 레코드를 조회합니다.
    pub fn get(&self, uuid: &str) -> Option<LedgerFields> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uuid)
            .cloned()
    }

    /// `_name` 필드로 레코드를 조회합니다.
    pub fn find_by_name(&self, name: &str) -> Option<LedgerFields> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|fields| fields.get(FIELD_NAME).and_then(Value::as_str) == Some(name))
            .cloned()
    }

    /// 저장된 레코드 수
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StatusLedger for MemoryLedger {
    fn save(&self, fields: LedgerFields) -> Result<String, LedgerError> {
        let uuid = uuid::Uuid::new_v4().to_string();
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uuid.clone(), fields);
        Ok(uuid)
    }

    fn update(&self, uuid: &str, fields: LedgerFields) -> Result<(), LedgerError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let record = records
            .get_mut(uuid)
            .ok_or_else(|| LedgerError::UnknownRecord(uuid.to_owned()))?;
        record.extend(fields);
        Ok(())
    }
}

// ─── JsonlLedger ─────────────────────────────────────────────────────

/// JSON Lines 파일 원장
///
/// 모든 save/update를 한 줄짜리 JSON 레코드로 덧붙입니다.
/// 파일은 재생(replay) 가능한 변경 로그 형태가 됩니다.
pub struct JsonlLedger {
    path: PathBuf,
    inner: Mutex<JsonlInner>,
}

struct JsonlInner {
    writer: BufWriter<File>,
    known: HashSet<String>,
}

#[derive(Serialize)]
struct JsonlRecord<'a> {
    op: &'static str,
    uuid: &'a str,
    fields: &'a LedgerFields,
}

impl JsonlLedger {
    /// 파일을 열거나 생성합니다 (append 모드).
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| LedgerError::Write(format!("{}: {e}", parent.display())))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| LedgerError::Write(format!("{}: {e}", path.display())))?;
        Ok(Self {
            path,
            inner: Mutex::new(JsonlInner {
                writer: BufWriter::new(file),
                known: HashSet::new(),
            }),
        })
    }

    /// 원장 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(
        inner: &mut JsonlInner,
        op: &'static str,
        uuid: &str,
        fields: &LedgerFields,
    ) -> Result<(), LedgerError> {
        let line = serde_json::to_string(&JsonlRecord { op, uuid, fields })?;
        writeln!(inner.writer, "{line}").map_err(|e| LedgerError::Write(e.to_string()))
    }
}

impl StatusLedger for JsonlLedger {
    fn save(&self, fields: LedgerFields) -> Result<String, LedgerError> {
        let uuid = uuid::Uuid::new_v4().to_string();
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Self::append(&mut inner, "save", &uuid, &fields)?;
        inner.known.insert(uuid.clone());
        Ok(uuid)
    }

    fn update(&self, uuid: &str, fields: LedgerFields) -> Result<(), LedgerError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if !inner.known.contains(uuid) {
            return Err(LedgerError::UnknownRecord(uuid.to_owned()));
        }
        Self::append(&mut inner, "update", uuid, &fields)
    }

    fn flush(&self) -> Result<(), LedgerError> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .writer
            .flush()
            .map_err(|e| LedgerError::Write(e.to_string()))
    }
}

impl Drop for JsonlLedger {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to flush ledger on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(pairs: &[(&str, Value)]) -> LedgerFields {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn memory_ledger_save_then_update_merges_fields() {
        let ledger = MemoryLedger::new();
        let uuid = ledger
            .save(fields(&[
                (FIELD_NAME, json!("ping")),
                (FIELD_STAGE, json!(LedgerStage::InitCase.as_str())),
            ]))
            .unwrap();

        ledger
            .update(&uuid, fields(&[(FIELD_STAGE, json!("running"))]))
            .unwrap();

        let record = ledger.get(&uuid).unwrap();
        assert_eq!(record[FIELD_NAME], json!("ping"));
        assert_eq!(record[FIELD_STAGE], json!("running"));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn memory_ledger_update_unknown_uuid_fails() {
        let ledger = MemoryLedger::new();
        let err = ledger.update("missing", LedgerFields::new()).unwrap_err();
        assert!(matches!(err, LedgerError::UnknownRecord(_)));
    }

    #[test]
    fn memory_ledger_find_by_name() {
        let ledger = MemoryLedger::new();
        ledger.save(fields(&[(FIELD_NAME, json!("a"))])).unwrap();
        ledger.save(fields(&[(FIELD_NAME, json!("b"))])).unwrap();
        assert!(ledger.find_by_name("b").is_some());
        assert!(ledger.find_by_name("c").is_none());
    }

    #[test]
    fn stage_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&LedgerStage::InitCase).unwrap(),
            "\"init_case\""
        );
        assert_eq!(LedgerStage::Done.as_str(), "done");
    }

    #[test]
    fn jsonl_ledger_appends_one_line_per_operation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.jsonl");
        let ledger = JsonlLedger::open(&path).unwrap();

        let uuid = ledger.save(fields(&[(FIELD_NAME, json!("io"))])).unwrap();
        ledger
            .update(&uuid, fields(&[(FIELD_STATUS, json!("Pass"))]))
            .unwrap();
        ledger.flush().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["op"], json!("save"));
        assert_eq!(lines[1]["op"], json!("update"));
        assert_eq!(lines[1]["uuid"], json!(uuid));
        assert_eq!(lines[1]["fields"][FIELD_STATUS], json!("Pass"));
    }

    #[test]
    fn jsonl_ledger_rejects_update_for_unsaved_uuid() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = JsonlLedger::open(dir.path().join("ledger.jsonl")).unwrap();
        assert!(matches!(
            ledger.update("nope", LedgerFields::new()),
            Err(LedgerError::UnknownRecord(_))
        ));
    }
}
