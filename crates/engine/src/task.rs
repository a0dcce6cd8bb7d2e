//! 취소 가능한 태스크 — 엔티티 하나를 실행하는 비동기 실행 단위
//!
//! [`CancellableTask`]는 `tokio::spawn`으로 본문을 실행하고, 본문이 반환한
//! 에러를 문자열로 보관합니다 (호출자에게 다시 던지지 않음).
//!
//! # 취소 모델
//! 강제 종료 대신 협조적 취소를 사용합니다.
//! ```text
//! kill() ──> 등록된 락 해제 ──> 토큰 취소 ──> grace 대기 ──> abort()
//! ```
//! 본문은 [`TaskContext::checkpoint`], [`TaskContext::cancelled`] 등으로
//! 안전 지점에서 취소를 확인해야 합니다. `.await`을 전혀 하지 않는 본문은
//! 취소할 수 없습니다.

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::OwnedMutexGuard;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use rigcheck_core::error::{PhaseError, TaskError};
use rigcheck_core::types::{BoxFuture, TaskId};

// ─── 태스크 ID 할당 ─────────────────────────────────────────────────

/// 프로세스 수명 동안 발급된 모든 태스크 ID
static ISSUED_IDS: LazyLock<Mutex<HashSet<u64>>> = LazyLock::new(|| Mutex::new(HashSet::new()));

/// 한 번도 쓰이지 않은 무작위 태스크 ID를 발급합니다.
///
/// UUID v4의 상위 32비트를 후보로 쓰고, 이미 발급된 값이면 다시 뽑습니다.
/// 같은 프로세스 안에서 두 태스크가 같은 ID를 갖는 일은 없습니다.
pub fn allocate_task_id() -> TaskId {
    let mut issued = ISSUED_IDS.lock().unwrap_or_else(PoisonError::into_inner);
    loop {
        let (high, _) = Uuid::new_v4().as_u64_pair();
        let candidate = high >> 32;
        if candidate != 0 && issued.insert(candidate) {
            return TaskId::new(candidate);
        }
    }
}

// ─── KillOutcome ─────────────────────────────────────────────────────

/// `kill()` 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    /// kill 시점에 이미 종료되어 있었음
    AlreadyFinished,
    /// 본문이 grace 안에 취소를 관찰하고 종료함
    Cooperative,
    /// grace 초과 후 abort로 종료함
    Aborted,
    /// abort 이후에도 종료를 확인하지 못함 (yield 하지 않는 본문)
    Unresponsive,
}

impl KillOutcome {
    /// 메트릭 레이블 값
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AlreadyFinished => "already_finished",
            Self::Cooperative => "cooperative",
            Self::Aborted => "aborted",
            Self::Unresponsive => "unresponsive",
        }
    }
}

impl fmt::Display for KillOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── 공유 제어 블록 ──────────────────────────────────────────────────

struct TaskControl {
    id: TaskId,
    name: String,
    token: CancellationToken,
    /// 본문 future가 드롭되면 취소됨 (완료, 패닉, abort 모두)
    done: CancellationToken,
    started: AtomicBool,
    locks: Mutex<Vec<OwnedMutexGuard<()>>>,
    abort: Mutex<Option<AbortHandle>>,
    error: Mutex<Option<String>>,
}

impl TaskControl {
    fn new(name: String, token: CancellationToken) -> Self {
        Self {
            id: allocate_task_id(),
            name,
            token,
            done: CancellationToken::new(),
            started: AtomicBool::new(false),
            locks: Mutex::new(Vec::new()),
            abort: Mutex::new(None),
            error: Mutex::new(None),
        }
    }

    fn release_locks(&self) -> usize {
        let drained: Vec<_> = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        drained.len()
    }

    fn set_error(&self, message: String) {
        let mut slot = self.error.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(message);
        }
    }

    fn error(&self) -> Option<String> {
        self.error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    fn is_alive(&self) -> bool {
        self.is_started() && !self.done.is_cancelled()
    }
}

/// 본문 future가 어떤 경로로든 드롭될 때 종료를 알립니다.
struct FinishGuard(Arc<TaskControl>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.release_locks();
        self.0.done.cancel();
    }
}

// ─── TaskContext ─────────────────────────────────────────────────────

/// 본문에 전달되는 실행 컨텍스트
///
/// 취소 확인과 락 등록을 제공합니다.
#[derive(Clone)]
pub struct TaskContext {
    control: Arc<TaskControl>,
}

impl TaskContext {
    /// 스폰되지 않는 독립 컨텍스트를 생성합니다.
    ///
    /// 엔진 루트처럼 호출자의 흐름 안에서 직접 실행되는 단계에 사용합니다.
    pub fn detached(name: impl Into<String>) -> Self {
        Self {
            control: Arc::new(TaskControl::new(name.into(), CancellationToken::new())),
        }
    }

    /// 태스크 ID
    pub fn id(&self) -> TaskId {
        self.control.id
    }

    /// 태스크 이름
    pub fn name(&self) -> &str {
        &self.control.name
    }

    /// 취소 요청 여부
    pub fn is_cancelled(&self) -> bool {
        self.control.token.is_cancelled()
    }

    /// 취소될 때까지 대기합니다.
    pub async fn cancelled(&self) {
        self.control.token.cancelled().await;
    }

    /// 취소되었으면 [`PhaseError::Cancelled`]를 반환합니다.
    pub fn checkpoint(&self) -> Result<(), PhaseError> {
        if self.is_cancelled() {
            Err(PhaseError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// 취소와 경쟁하며 `duration` 동안 대기합니다.
    pub async fn sleep(&self, duration: Duration) -> Result<(), PhaseError> {
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = self.control.token.cancelled() => Err(PhaseError::Cancelled),
        }
    }

    /// 공유 락을 획득하고 이 태스크에 등록합니다.
    ///
    /// 등록된 락은 kill 시 취소보다 먼저 해제되고, 태스크가 끝나면 자동으로 해제됩니다.
    pub async fn acquire(&self, lock: Arc<tokio::sync::Mutex<()>>) -> Result<(), PhaseError> {
        tokio::select! {
            guard = lock.lock_owned() => {
                self.hold(guard);
                Ok(())
            }
            _ = self.control.token.cancelled() => Err(PhaseError::Cancelled),
        }
    }

    /// 이미 획득한 락 가드를 등록합니다.
    pub fn hold(&self, guard: OwnedMutexGuard<()>) {
        self.control
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(guard);
    }

    /// 등록된 락을 모두 해제하고 해제한 개수를 반환합니다.
    pub fn release_locks(&self) -> usize {
        self.control.release_locks()
    }

    /// 이 컨텍스트의 취소 토큰
    pub fn token(&self) -> &CancellationToken {
        &self.control.token
    }

    /// 외부에서 이 태스크를 제어하는 핸들
    pub fn handle(&self) -> TaskHandle {
        TaskHandle {
            control: Arc::clone(&self.control),
        }
    }
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("id", &self.control.id)
            .field("name", &self.control.name)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

// ─── TaskHandle ──────────────────────────────────────────────────────

/// 복제 가능한 태스크 제어 핸들
///
/// 바깥 레벨의 감시자가 중첩 그룹이 소유한 태스크를 종료할 때 사용합니다.
#[derive(Clone)]
pub struct TaskHandle {
    control: Arc<TaskControl>,
}

impl TaskHandle {
    /// 태스크 ID
    pub fn id(&self) -> TaskId {
        self.control.id
    }

    /// 태스크 이름
    pub fn name(&self) -> &str {
        &self.control.name
    }

    /// 시작되었고 아직 종료되지 않았는지 여부
    pub fn is_alive(&self) -> bool {
        self.control.is_alive()
    }

    /// `start()`가 호출되었는지 여부
    pub fn is_started(&self) -> bool {
        self.control.is_started()
    }

    /// 캡처된 에러 문자열
    pub fn error(&self) -> Option<String> {
        self.control.error()
    }

    /// 등록된 락을 해제하고 취소 신호만 보냅니다 (대기하지 않음).
    pub fn cancel(&self) {
        let released = self.control.release_locks();
        if released > 0 {
            debug!(task_id = %self.control.id, released, "released locks held by task");
        }
        self.control.token.cancel();
    }

    /// 태스크를 종료합니다.
    ///
    /// 락 해제와 취소 신호 후 `grace` 동안 협조적 종료를 기다리고,
    /// 그래도 살아 있으면 abort합니다.
    ///
    /// # Errors
    ///
    /// 시작되지 않은 태스크이면 [`TaskError::NotStarted`]를 반환합니다.
    pub async fn kill(&self, grace: Duration) -> Result<KillOutcome, TaskError> {
        if !self.is_started() {
            return Err(TaskError::NotStarted {
                id: self.control.id,
            });
        }
        if !self.is_alive() {
            return Ok(KillOutcome::AlreadyFinished);
        }

        self.cancel();
        if tokio::time::timeout(grace, self.control.done.cancelled())
            .await
            .is_ok()
        {
            return Ok(KillOutcome::Cooperative);
        }

        let abort = self
            .control
            .abort
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(abort) = abort {
            abort.abort();
        }
        if tokio::time::timeout(grace, self.control.done.cancelled())
            .await
            .is_ok()
        {
            debug!(task_id = %self.control.id, task = %self.control.name, "task aborted after grace period");
            Ok(KillOutcome::Aborted)
        } else {
            warn!(
                task_id = %self.control.id,
                task = %self.control.name,
                "task did not stop after abort; body never yields"
            );
            Ok(KillOutcome::Unresponsive)
        }
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.control.id)
            .field("name", &self.control.name)
            .field("alive", &self.is_alive())
            .finish()
    }
}

// ─── CancellableTask ─────────────────────────────────────────────────

/// 취소 가능한 비동기 태스크
///
/// # 생명주기
/// ```text
/// new() ──> start() ──> (is_alive) ──> join() / kill()
/// ```
pub struct CancellableTask<T> {
    control: Arc<TaskControl>,
    // 감시자가 `&CancellableTask`를 await 너머로 들고 있으므로 Sync여야 함
    body: Mutex<Option<BoxFuture<'static, Result<T, String>>>>,
    handle: Option<JoinHandle<()>>,
    result: Arc<Mutex<Option<T>>>,
}

impl<T: Send + 'static> CancellableTask<T> {
    /// 독립 취소 토큰을 가진 태스크를 생성합니다.
    ///
    /// `body`는 즉시 호출되어 future를 만들지만, 실행은 `start()` 이후입니다.
    pub fn new<F, Fut, E>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: fmt::Display,
    {
        Self::build(name.into(), CancellationToken::new(), body)
    }

    /// 부모 컨텍스트의 자식 토큰을 가진 태스크를 생성합니다.
    ///
    /// 부모가 취소되면 이 태스크도 취소 신호를 받습니다.
    pub fn with_parent<F, Fut, E>(parent: &TaskContext, name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: fmt::Display,
    {
        Self::build(name.into(), parent.token().child_token(), body)
    }

    fn build<F, Fut, E>(name: String, token: CancellationToken, body: F) -> Self
    where
        F: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: fmt::Display,
    {
        let control = Arc::new(TaskControl::new(name, token));
        let ctx = TaskContext {
            control: Arc::clone(&control),
        };
        let fut = body(ctx);
        Self {
            control,
            body: Mutex::new(Some(Box::pin(async move {
                fut.await.map_err(|e| e.to_string())
            }))),
            handle: None,
            result: Arc::new(Mutex::new(None)),
        }
    }

    /// 태스크 ID
    pub fn id(&self) -> TaskId {
        self.control.id
    }

    /// 태스크 이름
    pub fn name(&self) -> &str {
        &self.control.name
    }

    /// 제어 핸들
    pub fn handle(&self) -> TaskHandle {
        TaskHandle {
            control: Arc::clone(&self.control),
        }
    }

    /// 본문 실행을 시작합니다.
    ///
    /// # Errors
    ///
    /// 두 번째 호출이면 [`TaskError::AlreadyStarted`]를 반환합니다.
    pub fn start(&mut self) -> Result<(), TaskError> {
        let body = self
            .body
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(TaskError::AlreadyStarted {
                id: self.control.id,
            })?;

        self.control.started.store(true, Ordering::Release);
        let control = Arc::clone(&self.control);
        let result = Arc::clone(&self.result);
        let handle = tokio::spawn(async move {
            let _finish = FinishGuard(Arc::clone(&control));
            match CatchUnwind::new(body).await {
                Ok(Ok(value)) => {
                    *result.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
                }
                Ok(Err(message)) => control.set_error(message),
                Err(message) => {
                    warn!(task_id = %control.id, task = %control.name, panic = %message, "task body panicked");
                    control.set_error(format!("panicked: {message}"));
                }
            }
        });
        *self
            .control
            .abort
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle.abort_handle());
        self.handle = Some(handle);

        debug!(task_id = %self.control.id, task = %self.control.name, "task started");
        Ok(())
    }

    /// 시작되었고 아직 종료되지 않았는지 여부
    pub fn is_alive(&self) -> bool {
        self.control.is_alive()
    }

    /// 본문이 반환한 에러, 패닉 메시지, 또는 abort 사유
    pub fn error(&self) -> Option<String> {
        self.control.error()
    }

    /// 본문이 반환한 값을 꺼냅니다.
    pub fn take_result(&mut self) -> Option<T> {
        self.result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// 태스크가 끝날 때까지 기다립니다.
    ///
    /// `timeout`이 `None`이면 무기한 대기합니다. 패닉이나 abort는 에러
    /// 슬롯에 기록되며 호출자에게 전파되지 않습니다.
    ///
    /// # Errors
    ///
    /// - 시작되지 않은 태스크: [`TaskError::NotStarted`]
    /// - 시간 초과: [`TaskError::JoinTimeout`] (태스크는 계속 실행됨)
    pub async fn join(&mut self, timeout: Option<Duration>) -> Result<(), TaskError> {
        let id = self.control.id;
        let outcome = {
            let Some(handle) = self.handle.as_mut() else {
                return if self.control.is_started() {
                    Ok(())
                } else {
                    Err(TaskError::NotStarted { id })
                };
            };
            match timeout {
                Some(limit) => tokio::time::timeout(limit, handle)
                    .await
                    .map_err(|_| TaskError::JoinTimeout {
                        id,
                        timeout_ms: limit.as_millis(),
                    })?,
                None => handle.await,
            }
        };
        self.handle = None;

        if let Err(join_error) = outcome {
            if join_error.is_panic() {
                let message = panic_message(join_error.into_panic());
                warn!(task_id = %id, task = %self.control.name, panic = %message, "task body panicked");
                self.control.set_error(format!("panicked: {message}"));
            } else {
                self.control.set_error("task aborted".to_owned());
            }
        }
        Ok(())
    }

    /// 태스크를 종료합니다. [`TaskHandle::kill`]과 같습니다.
    ///
    /// # Errors
    ///
    /// 시작되지 않은 태스크이면 [`TaskError::NotStarted`]를 반환합니다.
    pub async fn kill(&self, grace: Duration) -> Result<KillOutcome, TaskError> {
        self.handle().kill(grace).await
    }
}

impl<T> fmt::Debug for CancellableTask<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellableTask")
            .field("id", &self.control.id)
            .field("name", &self.control.name)
            .field("alive", &self.control.is_alive())
            .finish()
    }
}

// ─── 패닉 격리 ───────────────────────────────────────────────────────

/// 내부 future를 폴링하다 발생한 패닉을 `Err(메시지)`로 바꿉니다.
pub(crate) struct CatchUnwind<'a, R> {
    inner: BoxFuture<'a, R>,
}

impl<'a, R> CatchUnwind<'a, R> {
    pub(crate) fn new(inner: BoxFuture<'a, R>) -> Self {
        Self { inner }
    }
}

impl<R> Future for CatchUnwind<'_, R> {
    type Output = Result<R, String>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let inner = &mut self.inner;
        match std::panic::catch_unwind(AssertUnwindSafe(|| inner.as_mut().poll(cx))) {
            Ok(Poll::Ready(value)) => Poll::Ready(Ok(value)),
            Ok(Poll::Pending) => Poll::Pending,
            Err(payload) => Poll::Ready(Err(panic_message(payload))),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRACE: Duration = Duration::from_millis(200);

    #[test]
    fn allocated_ids_are_distinct() {
        let ids: HashSet<TaskId> = (0..2_000).map(|_| allocate_task_id()).collect();
        assert_eq!(ids.len(), 2_000);
        assert!(ids.iter().all(|id| id.get() != 0 && id.get() <= u64::from(u32::MAX)));
    }

    #[tokio::test]
    async fn start_join_captures_result() {
        let mut task = CancellableTask::new("answer", |_ctx| async { Ok::<_, String>(42) });
        assert!(!task.is_alive());
        task.start().unwrap();
        task.join(None).await.unwrap();
        assert!(!task.is_alive());
        assert_eq!(task.take_result(), Some(42));
        assert!(task.error().is_none());
    }

    #[tokio::test]
    async fn body_error_is_captured_not_raised() {
        let mut task = CancellableTask::new("broken", |_ctx| async {
            Err::<(), _>(PhaseError::failure("disk full"))
        });
        task.start().unwrap();
        task.join(None).await.unwrap();
        assert_eq!(task.error().as_deref(), Some("disk full"));
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let mut task = CancellableTask::new("once", |_ctx| async { Ok::<_, String>(()) });
        task.start().unwrap();
        let err = task.start().unwrap_err();
        assert!(matches!(err, TaskError::AlreadyStarted { .. }));
        task.join(None).await.unwrap();
    }

    #[tokio::test]
    async fn kill_before_start_fails() {
        let task = CancellableTask::new("idle", |_ctx| async { Ok::<_, String>(()) });
        let err = task.kill(GRACE).await.unwrap_err();
        assert!(matches!(err, TaskError::NotStarted { id } if id == task.id()));
    }

    #[tokio::test]
    async fn join_before_start_fails() {
        let mut task = CancellableTask::new("idle", |_ctx| async { Ok::<_, String>(()) });
        assert!(matches!(
            task.join(None).await,
            Err(TaskError::NotStarted { .. })
        ));
    }

    #[tokio::test]
    async fn cooperative_kill_stops_sleeping_body() {
        let mut task = CancellableTask::new("sleeper", |ctx| async move {
            ctx.sleep(Duration::from_secs(30)).await
        });
        task.start().unwrap();
        assert!(task.is_alive());

        let outcome = task.kill(GRACE).await.unwrap();
        assert_eq!(outcome, KillOutcome::Cooperative);
        task.join(Some(GRACE)).await.unwrap();
        assert!(!task.is_alive());
        assert_eq!(task.error().as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn ignoring_body_is_aborted_after_grace() {
        let mut task = CancellableTask::new("stubborn", |_ctx| async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, String>(())
        });
        task.start().unwrap();

        let outcome = task.kill(Duration::from_millis(50)).await.unwrap();
        assert_eq!(outcome, KillOutcome::Aborted);
        task.join(None).await.unwrap();
        assert_eq!(task.error().as_deref(), Some("task aborted"));
    }

    #[tokio::test]
    async fn kill_after_finish_reports_already_finished() {
        let mut task = CancellableTask::new("quick", |_ctx| async { Ok::<_, String>(()) });
        task.start().unwrap();
        task.join(None).await.unwrap();
        assert_eq!(task.kill(GRACE).await.unwrap(), KillOutcome::AlreadyFinished);
    }

    #[tokio::test]
    async fn kill_releases_registered_locks_first() {
        let lock = Arc::new(tokio::sync::Mutex::new(()));
        let held = Arc::clone(&lock);
        let mut task = CancellableTask::new("holder", move |ctx| async move {
            ctx.acquire(held).await?;
            ctx.sleep(Duration::from_secs(30)).await
        });
        task.start().unwrap();

        // 본문이 락을 잡을 때까지 대기
        while lock.try_lock().is_ok() {
            tokio::task::yield_now().await;
        }
        task.kill(GRACE).await.unwrap();
        assert!(lock.try_lock().is_ok());
    }

    #[tokio::test]
    async fn panic_is_recorded_on_join() {
        let mut task = CancellableTask::new("panicky", |_ctx| async {
            if true {
                panic!("body exploded");
            }
            Ok::<_, String>(())
        });
        task.start().unwrap();
        task.join(None).await.unwrap();
        assert_eq!(task.error().as_deref(), Some("panicked: body exploded"));
    }

    #[tokio::test]
    async fn panic_is_recorded_before_join() {
        let mut task = CancellableTask::new("panicky", |_ctx| async {
            let values: Vec<u8> = Vec::new();
            Ok::<_, String>(values[3])
        });
        task.start().unwrap();
        while task.is_alive() {
            tokio::task::yield_now().await;
        }
        let error = task.error().unwrap_or_default();
        assert!(error.starts_with("panicked: index out of bounds"), "error: {error}");
    }

    #[tokio::test]
    async fn catch_unwind_passes_values_and_converts_panics() {
        let ok = CatchUnwind::new(Box::pin(async { 7 })).await;
        assert_eq!(ok, Ok(7));

        let failed: Result<(), String> = CatchUnwind::new(Box::pin(async {
            tokio::task::yield_now().await;
            panic!("after yield");
        }))
        .await;
        assert_eq!(failed, Err("after yield".to_owned()));
    }

    fn assert_sync<S: Sync>() {}

    #[test]
    fn task_is_sync_for_monitor_borrows() {
        assert_sync::<CancellableTask<rigcheck_core::status::TestStatus>>();
    }

    #[tokio::test]
    async fn join_timeout_leaves_task_running() {
        let mut task = CancellableTask::new("slow", |ctx| async move {
            ctx.sleep(Duration::from_secs(30)).await
        });
        task.start().unwrap();
        let err = task.join(Some(Duration::from_millis(20))).await.unwrap_err();
        assert!(matches!(err, TaskError::JoinTimeout { timeout_ms: 20, .. }));
        assert!(task.is_alive());
        task.kill(GRACE).await.unwrap();
    }

    #[tokio::test]
    async fn parent_cancellation_reaches_child_task() {
        let parent = TaskContext::detached("root");
        let mut child = CancellableTask::with_parent(&parent, "child", |ctx| async move {
            ctx.cancelled().await;
            Err::<(), _>(PhaseError::Cancelled)
        });
        child.start().unwrap();
        parent.handle().cancel();
        child.join(Some(GRACE)).await.unwrap();
        assert!(!child.is_alive());
    }
}
