//! # Cache Client API
//!
//! Purpose: Expose the cache's data-plane operations as async methods that
//! always resolve to a response variant, never to a raised failure.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `CacheClient` hides pooling, metadata and deadlines.
//! 2. **Validate Before Dispatch**: Bad arguments become `INVALID_ARGUMENT_ERROR`
//!    variants without touching the transport.
//! 3. **One Byte Path**: String and byte keys share the same code path through
//!    `IntoBytes`.
//! 4. **Cheap Handles**: Clones and `with_timeout` handles share one pool.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tonic::{Request, Response, Status};
use tracing::{debug, info};

use scache_common::proto::{self, DictionaryFieldValuePair};
use scache_common::{ttl_millis, CacheError, CacheResult, ErrorKind, IntoBytes};

use crate::config::ClientConfig;
use crate::executor::{is_header_safe, RequestExecutor};
use crate::lifecycle::Lifecycle;
use crate::pool::ChannelPool;
use crate::response::{
    DeleteResponse, DictionaryGetFieldResponse, DictionarySetFieldResponse, GetResponse,
    IncrementResponse, ListFetchResponse, ListPushBackResponse, ResponseVariant,
    SetAddElementsResponse, SetFetchResponse, SetIfNotExistsResponse, SetResponse,
};
use crate::stub::{CacheStub, GrpcStub};

struct ClientInner<S> {
    pool: ChannelPool<S>,
    executor: RequestExecutor,
    default_ttl: Duration,
    lifecycle: Lifecycle,
}

/// Async client for the cache data plane.
///
/// Cloning is cheap; all clones share the channel pool and close together.
///
/// # Examples
/// ```rust,no_run
/// use scache_client::{CacheClient, ClientConfig, GetResponse};
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let client = CacheClient::connect(ClientConfig::new("cache.example.com", "token"))?;
/// client.set("my-cache", "greeting", "hello").await;
/// if let GetResponse::Hit { value } = client.get("my-cache", "greeting").await {
///     assert_eq!(&value[..], b"hello");
/// }
/// client.close().await;
/// # Ok(())
/// # }
/// ```
pub struct CacheClient<S: CacheStub = GrpcStub> {
    inner: Arc<ClientInner<S>>,
    timeout: Duration,
}

impl<S: CacheStub> Clone for CacheClient<S> {
    fn clone(&self) -> Self {
        CacheClient {
            inner: Arc::clone(&self.inner),
            timeout: self.timeout,
        }
    }
}

impl CacheClient<GrpcStub> {
    /// Creates a client over `config.channel_count` lazily connected channels.
    ///
    /// No network traffic happens here; connection failures surface on the
    /// first calls as error variants.
    pub fn connect(config: ClientConfig) -> CacheResult<Self> {
        let pool = ChannelPool::connect(&config)?;
        Self::from_pool(pool, &config)
    }
}

impl<S: CacheStub> CacheClient<S> {
    /// Creates a client over caller-supplied stubs, one per pooled channel.
    ///
    /// `config.channel_count` is ignored; the pool size is `stubs.len()`.
    pub fn with_stubs(stubs: Vec<S>, config: &ClientConfig) -> CacheResult<Self> {
        config.validate()?;
        Self::from_pool(ChannelPool::new(stubs)?, config)
    }

    fn from_pool(pool: ChannelPool<S>, config: &ClientConfig) -> CacheResult<Self> {
        let executor = RequestExecutor::new(&config.auth_token)?;
        Ok(CacheClient {
            inner: Arc::new(ClientInner {
                pool,
                executor,
                default_ttl: config.default_ttl(),
                lifecycle: Lifecycle::new(),
            }),
            timeout: config.timeout(),
        })
    }

    /// Per-call timeout used by this handle.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns a handle sharing this client's pool with a different timeout.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        CacheClient {
            inner: Arc::clone(&self.inner),
            timeout,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.inner.default_ttl
    }

    pub fn channel_count(&self) -> usize {
        self.inner.pool.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lifecycle.is_closed()
    }

    /// Stops accepting calls, waits for in-flight calls, then closes every
    /// channel once.
    ///
    /// Calls made afterwards resolve to `FAILED_PRECONDITION_ERROR`. Every
    /// caller, including concurrent and repeated ones, returns only after the
    /// channels have been closed.
    pub async fn close(&self) {
        let pool = &self.inner.pool;
        if self.inner.lifecycle.close(|| pool.shutdown()).await {
            info!("cache client closed");
        }
    }

    /// Fetches the value stored at `key`.
    pub async fn get(&self, cache_name: &str, key: impl IntoBytes) -> GetResponse {
        let key = key.into_bytes();
        if let Err(err) = check_cache_name(cache_name).and_then(|()| check_bytes("key", &key)) {
            return GetResponse::from_error(err);
        }
        let message = proto::GetRequest { cache_key: key };
        self.dispatch("get", cache_name, message, |stub, request| stub.get(request))
            .await
    }

    /// Stores `value` at `key` with the client's default TTL.
    pub async fn set(
        &self,
        cache_name: &str,
        key: impl IntoBytes,
        value: impl IntoBytes,
    ) -> SetResponse {
        self.set_with_ttl(cache_name, key, value, self.inner.default_ttl)
            .await
    }

    /// Stores `value` at `key`, expiring after `ttl`.
    pub async fn set_with_ttl(
        &self,
        cache_name: &str,
        key: impl IntoBytes,
        value: impl IntoBytes,
        ttl: Duration,
    ) -> SetResponse {
        let key = key.into_bytes();
        if let Err(err) = check_cache_name(cache_name)
            .and_then(|()| check_bytes("key", &key))
            .and_then(|()| check_ttl(ttl))
        {
            return SetResponse::from_error(err);
        }
        let message = proto::SetRequest {
            cache_key: key,
            cache_body: value.into_bytes(),
            ttl_milliseconds: ttl_millis(ttl),
        };
        self.dispatch("set", cache_name, message, |stub, request| stub.set(request))
            .await
    }

    /// Removes `key`. Succeeds whether or not the key existed.
    pub async fn delete(&self, cache_name: &str, key: impl IntoBytes) -> DeleteResponse {
        let key = key.into_bytes();
        if let Err(err) = check_cache_name(cache_name).and_then(|()| check_bytes("key", &key)) {
            return DeleteResponse::from_error(err);
        }
        let message = proto::DeleteRequest { cache_key: key };
        self.dispatch("delete", cache_name, message, |stub, request| {
            stub.delete(request)
        })
        .await
    }

    /// Stores `value` only when `key` holds no live item.
    pub async fn set_if_not_exists(
        &self,
        cache_name: &str,
        key: impl IntoBytes,
        value: impl IntoBytes,
    ) -> SetIfNotExistsResponse {
        let key = key.into_bytes();
        if let Err(err) = check_cache_name(cache_name).and_then(|()| check_bytes("key", &key)) {
            return SetIfNotExistsResponse::from_error(err);
        }
        let message = proto::SetIfNotExistsRequest {
            cache_key: key,
            cache_body: value.into_bytes(),
            ttl_milliseconds: ttl_millis(self.inner.default_ttl),
        };
        self.dispatch("set_if_not_exists", cache_name, message, |stub, request| {
            stub.set_if_not_exists(request)
        })
        .await
    }

    /// Adds `amount` to the integer stored at `key`, starting from zero.
    pub async fn increment(
        &self,
        cache_name: &str,
        key: impl IntoBytes,
        amount: i64,
    ) -> IncrementResponse {
        let key = key.into_bytes();
        if let Err(err) = check_cache_name(cache_name).and_then(|()| check_bytes("key", &key)) {
            return IncrementResponse::from_error(err);
        }
        let message = proto::IncrementRequest {
            cache_key: key,
            amount,
            ttl_milliseconds: ttl_millis(self.inner.default_ttl),
        };
        self.dispatch("increment", cache_name, message, |stub, request| {
            stub.increment(request)
        })
        .await
    }

    /// Sets one field of a dictionary, creating the dictionary if needed.
    pub async fn dictionary_set_field(
        &self,
        cache_name: &str,
        dictionary_name: impl IntoBytes,
        field: impl IntoBytes,
        value: impl IntoBytes,
    ) -> DictionarySetFieldResponse {
        let dictionary_name = dictionary_name.into_bytes();
        let field = field.into_bytes();
        if let Err(err) = check_cache_name(cache_name)
            .and_then(|()| check_bytes("dictionary name", &dictionary_name))
            .and_then(|()| check_bytes("field", &field))
        {
            return DictionarySetFieldResponse::from_error(err);
        }
        let message = proto::DictionarySetRequest {
            dictionary_name,
            items: vec![DictionaryFieldValuePair {
                field,
                value: value.into_bytes(),
            }],
            ttl_milliseconds: ttl_millis(self.inner.default_ttl),
            refresh_ttl: true,
        };
        self.dispatch("dictionary_set_field", cache_name, message, |stub, request| {
            stub.dictionary_set(request)
        })
        .await
    }

    /// Reads one field of a dictionary.
    pub async fn dictionary_get_field(
        &self,
        cache_name: &str,
        dictionary_name: impl IntoBytes,
        field: impl IntoBytes,
    ) -> DictionaryGetFieldResponse {
        let dictionary_name = dictionary_name.into_bytes();
        let field = field.into_bytes();
        if let Err(err) = check_cache_name(cache_name)
            .and_then(|()| check_bytes("dictionary name", &dictionary_name))
            .and_then(|()| check_bytes("field", &field))
        {
            return DictionaryGetFieldResponse::from_error(err);
        }
        let message = proto::DictionaryGetRequest {
            dictionary_name,
            fields: vec![field],
        };
        self.dispatch("dictionary_get_field", cache_name, message, |stub, request| {
            stub.dictionary_get(request)
        })
        .await
    }

    /// Appends `value` to a list, creating the list if needed.
    pub async fn list_push_back(
        &self,
        cache_name: &str,
        list_name: impl IntoBytes,
        value: impl IntoBytes,
    ) -> ListPushBackResponse {
        let list_name = list_name.into_bytes();
        if let Err(err) =
            check_cache_name(cache_name).and_then(|()| check_bytes("list name", &list_name))
        {
            return ListPushBackResponse::from_error(err);
        }
        let message = proto::ListPushBackRequest {
            list_name,
            value: value.into_bytes(),
            ttl_milliseconds: ttl_millis(self.inner.default_ttl),
            refresh_ttl: true,
            truncate_front_to_size: 0,
        };
        self.dispatch("list_push_back", cache_name, message, |stub, request| {
            stub.list_push_back(request)
        })
        .await
    }

    /// Reads every value of a list, front to back.
    pub async fn list_fetch(&self, cache_name: &str, list_name: impl IntoBytes) -> ListFetchResponse {
        let list_name = list_name.into_bytes();
        if let Err(err) =
            check_cache_name(cache_name).and_then(|()| check_bytes("list name", &list_name))
        {
            return ListFetchResponse::from_error(err);
        }
        let message = proto::ListFetchRequest { list_name };
        self.dispatch("list_fetch", cache_name, message, |stub, request| {
            stub.list_fetch(request)
        })
        .await
    }

    /// Adds `elements` to a set, creating the set if needed.
    pub async fn set_add_elements<I>(
        &self,
        cache_name: &str,
        set_name: impl IntoBytes,
        elements: I,
    ) -> SetAddElementsResponse
    where
        I: IntoIterator,
        I::Item: IntoBytes,
    {
        let set_name = set_name.into_bytes();
        let elements: Vec<Bytes> = elements.into_iter().map(IntoBytes::into_bytes).collect();
        if let Err(err) = check_cache_name(cache_name)
            .and_then(|()| check_bytes("set name", &set_name))
            .and_then(|()| check_not_empty("elements", &elements))
        {
            return SetAddElementsResponse::from_error(err);
        }
        let message = proto::SetUnionRequest {
            set_name,
            elements,
            ttl_milliseconds: ttl_millis(self.inner.default_ttl),
            refresh_ttl: true,
        };
        self.dispatch("set_add_elements", cache_name, message, |stub, request| {
            stub.set_union(request)
        })
        .await
    }

    /// Reads every element of a set.
    pub async fn set_fetch(&self, cache_name: &str, set_name: impl IntoBytes) -> SetFetchResponse {
        let set_name = set_name.into_bytes();
        if let Err(err) =
            check_cache_name(cache_name).and_then(|()| check_bytes("set name", &set_name))
        {
            return SetFetchResponse::from_error(err);
        }
        let message = proto::SetFetchRequest { set_name };
        self.dispatch("set_fetch", cache_name, message, |stub, request| {
            stub.set_fetch(request)
        })
        .await
    }

    /// Admits the call, picks a channel and runs it through the executor.
    async fn dispatch<'a, R, Req, F, Fut>(
        &'a self,
        operation: &'static str,
        cache_name: &str,
        message: Req,
        invoke: F,
    ) -> R
    where
        R: ResponseVariant,
        F: FnOnce(&'a S, Request<Req>) -> Fut,
        Fut: Future<Output = Result<Response<R::Reply>, Status>>,
    {
        let Some(_guard) = self.inner.lifecycle.enter() else {
            return R::from_error(CacheError::new(
                ErrorKind::FailedPrecondition,
                "client is closed",
            ));
        };
        let channel = self.inner.pool.select();
        debug!(
            operation,
            cache = cache_name,
            channel = channel.index(),
            "dispatching"
        );
        let stub = channel.stub();
        let result = self
            .inner
            .executor
            .execute(cache_name, self.timeout, message, |request| {
                invoke(stub, request)
            })
            .await;
        R::from_result(result)
    }
}

fn check_cache_name(cache_name: &str) -> CacheResult<()> {
    if cache_name.trim().is_empty() {
        return Err(CacheError::invalid_argument("cache name must not be empty"));
    }
    if !is_header_safe(cache_name) {
        return Err(CacheError::invalid_argument(format!(
            "cache name {cache_name:?} must be printable ascii"
        )));
    }
    Ok(())
}

fn check_bytes(what: &str, value: &[u8]) -> CacheResult<()> {
    if value.is_empty() {
        return Err(CacheError::invalid_argument(format!("{what} must not be empty")));
    }
    Ok(())
}

fn check_not_empty<T>(what: &str, values: &[T]) -> CacheResult<()> {
    if values.is_empty() {
        return Err(CacheError::invalid_argument(format!("{what} must not be empty")));
    }
    Ok(())
}

fn check_ttl(ttl: Duration) -> CacheResult<()> {
    if ttl.is_zero() {
        return Err(CacheError::invalid_argument("ttl must be positive"));
    }
    Ok(())
}
