//! # In-Memory Stub
//!
//! Serve the data-plane verbs from process memory so the client can be driven
//! end to end without a network.
//!
//! ## Usage
//!
//! - Share one `MemoryStore` between several `MemoryStub`s to model a pool
//!   whose channels all reach the same service.
//! - `with_latency` delays every call, `fail_with` makes every call return a
//!   given status until `clear_failure`.
//! - `calls`, `closes` and `last_metadata` expose what reached the stub.
//!
//! ## Design Principles
//!
//! 1. **Service Semantics**: Missing `cache` or `authorization` metadata is
//!    rejected the way the service rejects it.
//! 2. **TTL Fast Path**: Expiration is checked on access; no background sweep.
//! 3. **Short Critical Sections**: The store lock is never held across an await.
//!
//! ```text
//! MemoryStore
//!   └── entries: Mutex<HashMap<(cache, key), Entry>>
//!         └── Entry { item: Scalar | Dictionary | List | Set, expires_at }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ahash::RandomState;
use bytes::Bytes;
use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use tokio::time::Instant;
use tonic::metadata::MetadataMap;
use tonic::{Request, Response, Status};

use scache_common::proto::{self, dictionary_get_response, list_fetch_response};
use scache_common::proto::{set_fetch_response, set_if_not_exists_response, ECacheResult};

use crate::executor::{AUTHORIZATION_HEADER, CACHE_HEADER};
use crate::stub::{CacheStub, RpcResult};

/// Expiry used when `now + ttl` overflows the clock.
const FOREVER: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

type EntryKey = (String, Bytes);
type Entries = HashMap<EntryKey, Entry, RandomState>;

#[derive(Debug)]
enum Item {
    Scalar(Bytes),
    Dictionary(HashMap<Bytes, Bytes, RandomState>),
    List(Vec<Bytes>),
    Set(HashSet<Bytes, RandomState>),
}

#[derive(Debug)]
struct Entry {
    item: Item,
    expires_at: Instant,
}

/// Shared backing store for one or more `MemoryStub`s.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<Entries>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live and not yet reclaimed entries across all caches.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[derive(Default)]
struct StubState {
    calls: AtomicU64,
    closes: AtomicU64,
    failure: Mutex<Option<Status>>,
    last_metadata: Mutex<Option<MetadataMap>>,
}

/// `CacheStub` answering from a `MemoryStore`.
#[derive(Clone)]
pub struct MemoryStub {
    store: MemoryStore,
    latency: Duration,
    state: Arc<StubState>,
}

impl MemoryStub {
    pub fn new(store: MemoryStore) -> Self {
        MemoryStub {
            store,
            latency: Duration::ZERO,
            state: Arc::new(StubState::default()),
        }
    }

    /// Delays every call by `latency` before it is served.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Makes every subsequent call fail with `status`.
    pub fn fail_with(&self, status: Status) {
        *self.state.failure.lock() = Some(status);
    }

    pub fn clear_failure(&self) {
        *self.state.failure.lock() = None;
    }

    /// Calls that reached this stub, including failed ones.
    pub fn calls(&self) -> u64 {
        self.state.calls.load(Ordering::SeqCst)
    }

    /// Times `close` was invoked.
    pub fn closes(&self) -> u64 {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Metadata of the most recent call.
    pub fn last_metadata(&self) -> Option<MetadataMap> {
        self.state.last_metadata.lock().clone()
    }

    async fn serve<Req, Resp>(
        &self,
        request: Request<Req>,
        op: impl FnOnce(&mut Entries, &str, Req, Instant) -> Result<Resp, Status>,
    ) -> RpcResult<Resp> {
        self.state.calls.fetch_add(1, Ordering::SeqCst);
        *self.state.last_metadata.lock() = Some(request.metadata().clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if let Some(status) = self.state.failure.lock().clone() {
            return Err(status);
        }

        let cache = match request.metadata().get(CACHE_HEADER) {
            Some(value) => value
                .to_str()
                .map_err(|_| Status::invalid_argument("cache header is not ascii"))?
                .to_owned(),
            None => return Err(Status::invalid_argument("missing cache header")),
        };
        if request.metadata().get(AUTHORIZATION_HEADER).is_none() {
            return Err(Status::unauthenticated("missing authorization header"));
        }

        let message = request.into_inner();
        let now = Instant::now();
        let mut entries = self.store.entries.lock();
        op(&mut *entries, &cache, message, now).map(Response::new)
    }
}

fn expiry(now: Instant, ttl_milliseconds: u64) -> Instant {
    now.checked_add(Duration::from_millis(ttl_milliseconds))
        .unwrap_or_else(|| now + FOREVER)
}

fn purge_expired(entries: &mut Entries, key: &EntryKey, now: Instant) {
    if entries.get(key).is_some_and(|entry| entry.expires_at <= now) {
        entries.remove(key);
    }
}

fn live<'a>(entries: &'a mut Entries, key: &EntryKey, now: Instant) -> Option<&'a mut Entry> {
    purge_expired(entries, key, now);
    entries.get_mut(key)
}

/// Returns the live entry at `key`, creating it with `empty` when absent.
/// An existing entry's expiry is reset only when `refresh` is set.
fn upsert<'a>(
    entries: &'a mut Entries,
    key: EntryKey,
    now: Instant,
    ttl_milliseconds: u64,
    refresh: bool,
    empty: fn() -> Item,
) -> &'a mut Entry {
    purge_expired(entries, &key, now);
    let expires_at = expiry(now, ttl_milliseconds);
    let entry = entries.entry(key).or_insert_with(|| Entry {
        item: empty(),
        expires_at,
    });
    if refresh {
        entry.expires_at = expires_at;
    }
    entry
}

fn wrong_type() -> Status {
    Status::failed_precondition("item at this key has a different type")
}

fn key(cache: &str, name: Bytes) -> EntryKey {
    (cache.to_owned(), name)
}

impl CacheStub for MemoryStub {
    async fn get(&self, request: Request<proto::GetRequest>) -> RpcResult<proto::GetResponse> {
        self.serve(request, |entries, cache, message, now| {
            let reply = match live(entries, &key(cache, message.cache_key), now) {
                Some(Entry {
                    item: Item::Scalar(value),
                    ..
                }) => proto::GetResponse {
                    result: ECacheResult::Hit as i32,
                    cache_body: value.clone(),
                    message: String::new(),
                },
                Some(_) => return Err(wrong_type()),
                None => proto::GetResponse {
                    result: ECacheResult::Miss as i32,
                    cache_body: Bytes::new(),
                    message: String::new(),
                },
            };
            Ok(reply)
        })
        .await
    }

    async fn set(&self, request: Request<proto::SetRequest>) -> RpcResult<proto::SetResponse> {
        self.serve(request, |entries, cache, message, now| {
            entries.insert(
                key(cache, message.cache_key),
                Entry {
                    item: Item::Scalar(message.cache_body),
                    expires_at: expiry(now, message.ttl_milliseconds),
                },
            );
            Ok(proto::SetResponse {})
        })
        .await
    }

    async fn delete(
        &self,
        request: Request<proto::DeleteRequest>,
    ) -> RpcResult<proto::DeleteResponse> {
        self.serve(request, |entries, cache, message, _now| {
            entries.remove(&key(cache, message.cache_key));
            Ok(proto::DeleteResponse {})
        })
        .await
    }

    async fn set_if_not_exists(
        &self,
        request: Request<proto::SetIfNotExistsRequest>,
    ) -> RpcResult<proto::SetIfNotExistsResponse> {
        use set_if_not_exists_response::{NotStored, Result, Stored};

        self.serve(request, |entries, cache, message, now| {
            let entry_key = key(cache, message.cache_key);
            if live(entries, &entry_key, now).is_some() {
                return Ok(proto::SetIfNotExistsResponse {
                    result: Some(Result::NotStored(NotStored {})),
                });
            }
            entries.insert(
                entry_key,
                Entry {
                    item: Item::Scalar(message.cache_body),
                    expires_at: expiry(now, message.ttl_milliseconds),
                },
            );
            Ok(proto::SetIfNotExistsResponse {
                result: Some(Result::Stored(Stored {})),
            })
        })
        .await
    }

    async fn increment(
        &self,
        request: Request<proto::IncrementRequest>,
    ) -> RpcResult<proto::IncrementResponse> {
        self.serve(request, |entries, cache, message, now| {
            let entry = upsert(
                entries,
                key(cache, message.cache_key),
                now,
                message.ttl_milliseconds,
                false,
                || Item::Scalar(Bytes::from_static(b"0")),
            );
            let Item::Scalar(current) = &mut entry.item else {
                return Err(wrong_type());
            };
            let value = std::str::from_utf8(current)
                .ok()
                .and_then(|text| text.parse::<i64>().ok())
                .ok_or_else(|| Status::failed_precondition("value is not an integer"))?
                .checked_add(message.amount)
                .ok_or_else(|| Status::failed_precondition("increment overflows"))?;
            *current = Bytes::from(value.to_string());
            Ok(proto::IncrementResponse { value })
        })
        .await
    }

    async fn dictionary_set(
        &self,
        request: Request<proto::DictionarySetRequest>,
    ) -> RpcResult<proto::DictionarySetResponse> {
        self.serve(request, |entries, cache, message, now| {
            let entry = upsert(
                entries,
                key(cache, message.dictionary_name),
                now,
                message.ttl_milliseconds,
                message.refresh_ttl,
                || Item::Dictionary(HashMap::default()),
            );
            let Item::Dictionary(fields) = &mut entry.item else {
                return Err(wrong_type());
            };
            for pair in message.items {
                fields.insert(pair.field, pair.value);
            }
            Ok(proto::DictionarySetResponse {})
        })
        .await
    }

    async fn dictionary_get(
        &self,
        request: Request<proto::DictionaryGetRequest>,
    ) -> RpcResult<proto::DictionaryGetResponse> {
        use dictionary_get_response::{Dictionary, Found, Missing, Part};

        self.serve(request, |entries, cache, message, now| {
            let dictionary = match live(entries, &key(cache, message.dictionary_name), now) {
                None => Dictionary::Missing(Missing {}),
                Some(Entry {
                    item: Item::Dictionary(fields),
                    ..
                }) => {
                    let items = message
                        .fields
                        .iter()
                        .map(|field| match fields.get(field) {
                            Some(value) => Part {
                                result: ECacheResult::Hit as i32,
                                cache_body: value.clone(),
                            },
                            None => Part {
                                result: ECacheResult::Miss as i32,
                                cache_body: Bytes::new(),
                            },
                        })
                        .collect();
                    Dictionary::Found(Found { items })
                }
                Some(_) => return Err(wrong_type()),
            };
            Ok(proto::DictionaryGetResponse {
                dictionary: Some(dictionary),
            })
        })
        .await
    }

    async fn list_push_back(
        &self,
        request: Request<proto::ListPushBackRequest>,
    ) -> RpcResult<proto::ListPushBackResponse> {
        self.serve(request, |entries, cache, message, now| {
            let entry = upsert(
                entries,
                key(cache, message.list_name),
                now,
                message.ttl_milliseconds,
                message.refresh_ttl,
                || Item::List(Vec::new()),
            );
            let Item::List(values) = &mut entry.item else {
                return Err(wrong_type());
            };
            values.push(message.value);
            let limit = message.truncate_front_to_size as usize;
            if limit > 0 && values.len() > limit {
                values.drain(..values.len() - limit);
            }
            Ok(proto::ListPushBackResponse {
                list_length: u32::try_from(values.len()).unwrap_or(u32::MAX),
            })
        })
        .await
    }

    async fn list_fetch(
        &self,
        request: Request<proto::ListFetchRequest>,
    ) -> RpcResult<proto::ListFetchResponse> {
        use list_fetch_response::{Found, List, Missing};

        self.serve(request, |entries, cache, message, now| {
            let list = match live(entries, &key(cache, message.list_name), now) {
                None => List::Missing(Missing {}),
                Some(Entry {
                    item: Item::List(values),
                    ..
                }) => List::Found(Found {
                    values: values.clone(),
                }),
                Some(_) => return Err(wrong_type()),
            };
            Ok(proto::ListFetchResponse { list: Some(list) })
        })
        .await
    }

    async fn set_union(
        &self,
        request: Request<proto::SetUnionRequest>,
    ) -> RpcResult<proto::SetUnionResponse> {
        self.serve(request, |entries, cache, message, now| {
            let entry = upsert(
                entries,
                key(cache, message.set_name),
                now,
                message.ttl_milliseconds,
                message.refresh_ttl,
                || Item::Set(HashSet::default()),
            );
            let Item::Set(elements) = &mut entry.item else {
                return Err(wrong_type());
            };
            elements.extend(message.elements);
            Ok(proto::SetUnionResponse {})
        })
        .await
    }

    async fn set_fetch(
        &self,
        request: Request<proto::SetFetchRequest>,
    ) -> RpcResult<proto::SetFetchResponse> {
        use set_fetch_response::{Found, Missing, Set};

        self.serve(request, |entries, cache, message, now| {
            let set = match live(entries, &key(cache, message.set_name), now) {
                None => Set::Missing(Missing {}),
                Some(Entry {
                    item: Item::Set(elements),
                    ..
                }) => Set::Found(Found {
                    elements: elements.iter().cloned().collect(),
                }),
                Some(_) => return Err(wrong_type()),
            };
            Ok(proto::SetFetchResponse { set: Some(set) })
        })
        .await
    }

    fn close(&self) {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    fn request<T>(cache: &str, message: T) -> Request<T> {
        let mut request = Request::new(message);
        request.metadata_mut().insert(CACHE_HEADER, cache.parse().unwrap());
        request
            .metadata_mut()
            .insert(AUTHORIZATION_HEADER, "token".parse().unwrap());
        request
    }

    fn get(key: &'static [u8]) -> proto::GetRequest {
        proto::GetRequest {
            cache_key: Bytes::from_static(key),
        }
    }

    #[tokio::test]
    async fn caches_are_isolated() {
        let stub = MemoryStub::new(MemoryStore::new());
        let set = proto::SetRequest {
            cache_key: Bytes::from_static(b"k"),
            cache_body: Bytes::from_static(b"v"),
            ttl_milliseconds: 60_000,
        };
        stub.set(request("a", set)).await.unwrap();

        let hit = stub.get(request("a", get(b"k"))).await.unwrap().into_inner();
        assert_eq!(hit.result, ECacheResult::Hit as i32);
        let miss = stub.get(request("b", get(b"k"))).await.unwrap().into_inner();
        assert_eq!(miss.result, ECacheResult::Miss as i32);
    }

    #[tokio::test]
    async fn expired_entries_are_misses() {
        let store = MemoryStore::new();
        let stub = MemoryStub::new(store.clone());
        let set = proto::SetRequest {
            cache_key: Bytes::from_static(b"k"),
            cache_body: Bytes::from_static(b"v"),
            ttl_milliseconds: 10,
        };
        stub.set(request("c", set)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let reply = stub.get(request("c", get(b"k"))).await.unwrap().into_inner();
        assert_eq!(reply.result, ECacheResult::Miss as i32);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn missing_headers_are_rejected() {
        let stub = MemoryStub::new(MemoryStore::new());
        let status = stub.get(Request::new(get(b"k"))).await.unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);

        let mut unauthenticated = Request::new(get(b"k"));
        unauthenticated
            .metadata_mut()
            .insert(CACHE_HEADER, "c".parse().unwrap());
        let status = stub.get(unauthenticated).await.unwrap_err();
        assert_eq!(status.code(), Code::Unauthenticated);
    }

    #[tokio::test]
    async fn list_truncates_from_front() {
        let stub = MemoryStub::new(MemoryStore::new());
        for value in [b"a", b"b", b"c"] {
            let push = proto::ListPushBackRequest {
                list_name: Bytes::from_static(b"l"),
                value: Bytes::copy_from_slice(value),
                ttl_milliseconds: 60_000,
                refresh_ttl: true,
                truncate_front_to_size: 2,
            };
            stub.list_push_back(request("c", push)).await.unwrap();
        }
        let fetch = proto::ListFetchRequest {
            list_name: Bytes::from_static(b"l"),
        };
        let reply = stub.list_fetch(request("c", fetch)).await.unwrap().into_inner();
        let Some(list_fetch_response::List::Found(found)) = reply.list else {
            panic!("expected list");
        };
        assert_eq!(found.values, vec![Bytes::from_static(b"b"), Bytes::from_static(b"c")]);
    }

    #[tokio::test]
    async fn injected_failure_is_returned_until_cleared() {
        let stub = MemoryStub::new(MemoryStore::new());
        stub.fail_with(Status::unavailable("down"));
        let status = stub.get(request("c", get(b"k"))).await.unwrap_err();
        assert_eq!(status.code(), Code::Unavailable);

        stub.clear_failure();
        assert!(stub.get(request("c", get(b"k"))).await.is_ok());
        assert_eq!(stub.calls(), 2);
    }
}
