//! 동일 요청 중복 제거.
//!
//! 같은 키의 요청이 진행 중이면 새로 호출하지 않고 진행 중인 결과를 공유합니다.
//!
//! ```text
//! caller A ──execute(k)──> [pending 없음] ──spawn──> task ──settle──> pending 제거 ──> 결과
//! caller B ──execute(k)──> [pending 있음] ──────────── 같은 Shared future 대기 ──────┘
//! ```
//!
//! 실제 작업은 별도 태스크에서 실행되므로 대기 중인 호출자가 모두 사라져도
//! 끝까지 진행되고 등록이 해제됩니다.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Method;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{FetchError, FetchResult};

type SharedResult<T> = Shared<BoxFuture<'static, FetchResult<T>>>;
type PendingTable<T> = Mutex<HashMap<String, SharedResult<T>>>;

/// 요청 식별 키.
///
/// `METHOD:url` 형태이며, 본문이 있으면 본문의 SHA-256을 덧붙입니다.
pub fn request_key(method: &Method, url: &str, body: Option<&[u8]>) -> String {
    match body {
        Some(body) if !body.is_empty() => {
            format!("{}:{}#{}", method, url, hex::encode(Sha256::digest(body)))
        }
        _ => format!("{}:{}", method, url),
    }
}

fn lock<T>(table: &PendingTable<T>) -> MutexGuard<'_, HashMap<String, SharedResult<T>>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 진행 중 요청 테이블.
pub struct RequestDeduplicator<T> {
    pending: Arc<PendingTable<T>>,
}

impl<T> Clone for RequestDeduplicator<T> {
    fn clone(&self) -> Self {
        Self {
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<T> Default for RequestDeduplicator<T> {
    fn default() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T> std::fmt::Debug for RequestDeduplicator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDeduplicator")
            .field("pending", &lock(&self.pending).len())
            .finish()
    }
}

impl<T> RequestDeduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// 빈 테이블을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 키가 진행 중이면 그 결과를 기다리고, 아니면 `thunk`를 실행합니다.
    ///
    /// `thunk`는 테이블 잠금 안에서 future를 만들기만 하므로 내부에서
    /// 같은 중복 제거기를 다시 호출하면 안 됩니다.
    pub async fn execute<F, Fut>(&self, key: impl Into<String>, thunk: F) -> FetchResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult<T>> + Send + 'static,
    {
        let key = key.into();

        let shared = {
            let mut pending = lock(&self.pending);
            match pending.get(&key) {
                Some(existing) => {
                    debug!(key = %key, "Joining in-flight request");
                    existing.clone()
                }
                None => {
                    let shared = self.spawn(key.clone(), thunk());
                    pending.insert(key, shared.clone());
                    shared
                }
            }
        };

        shared.await
    }

    /// 작업을 태스크로 띄우고 공유 가능한 결과 future를 돌려줍니다.
    ///
    /// 태스크는 결과를 돌려주기 전에 자신의 등록을 해제합니다.
    fn spawn<Fut>(&self, key: String, work: Fut) -> SharedResult<T>
    where
        Fut: Future<Output = FetchResult<T>> + Send + 'static,
    {
        let table = Arc::clone(&self.pending);
        let handle = tokio::spawn(async move {
            let result = work.await;
            lock(&table).remove(&key);
            result
        });

        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => Err(FetchError::NetworkFailure(format!(
                    "Request task cancelled: {}",
                    e
                ))),
            }
        }
        .boxed()
        .shared()
    }

    /// 진행 중인 요청 수.
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// 키가 진행 중인지 확인.
    pub fn is_pending(&self, key: &str) -> bool {
        lock(&self.pending).contains_key(key)
    }
}
