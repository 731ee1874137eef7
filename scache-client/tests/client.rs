use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tonic::metadata::MetadataMap;
use tonic::Status;

use scache_client::{
    agent, CacheClient, ClientConfig, DeleteResponse, DictionaryGetFieldResponse, ErrorKind,
    IncrementResponse, LimitExceededReason, ListFetchResponse, MemoryStore,
    MemoryStub, ResponseVariant, SetFetchResponse, SetIfNotExistsResponse,
};

const CACHE: &str = "test-cache";

fn config() -> ClientConfig {
    ClientConfig::new("cache.test.local", "test-token")
}

fn client_with(stubs: &[MemoryStub]) -> CacheClient<MemoryStub> {
    CacheClient::with_stubs(stubs.to_vec(), &config()).expect("client")
}

fn memory_client(channels: usize) -> (CacheClient<MemoryStub>, Vec<MemoryStub>) {
    let store = MemoryStore::new();
    let stubs: Vec<MemoryStub> = (0..channels).map(|_| MemoryStub::new(store.clone())).collect();
    (client_with(&stubs), stubs)
}

fn total_calls(stubs: &[MemoryStub]) -> u64 {
    stubs.iter().map(MemoryStub::calls).sum()
}

#[tokio::test]
async fn set_then_get_round_trip() {
    let (client, _stubs) = memory_client(2);
    assert!(!client.set(CACHE, "greeting", "hello").await.is_error());

    let response = client.get(CACHE, "greeting").await;
    assert_eq!(response.value_str(), Some("hello"));
}

#[tokio::test]
async fn get_of_missing_key_is_miss() {
    let (client, _stubs) = memory_client(1);
    assert!(client.get(CACHE, "absent").await.is_miss());
}

#[tokio::test]
async fn string_and_byte_keys_address_same_item() {
    let (client, _stubs) = memory_client(1);
    client.set(CACHE, b"key".as_slice(), vec![1u8, 2, 3]).await;

    let by_string = client.get(CACHE, "key").await;
    let by_bytes = client.get(CACHE, Bytes::from_static(b"key")).await;
    assert_eq!(by_string.value(), Some(&Bytes::from_static(&[1, 2, 3])));
    assert_eq!(by_string.value(), by_bytes.value());
}

#[tokio::test]
async fn delete_removes_and_tolerates_absent_keys() {
    let (client, _stubs) = memory_client(1);
    client.set(CACHE, "k", "v").await;
    assert!(matches!(client.delete(CACHE, "k").await, DeleteResponse::Success));
    assert!(matches!(client.delete(CACHE, "k").await, DeleteResponse::Success));
    assert!(client.get(CACHE, "k").await.is_miss());
}

#[tokio::test]
async fn invalid_arguments_never_reach_transport() {
    let (client, stubs) = memory_client(2);

    let errors = vec![
        client.get("", "k").await.error().cloned(),
        client.get("   ", "k").await.error().cloned(),
        client.get(CACHE, "").await.error().cloned(),
        client.set(CACHE, Vec::<u8>::new(), "v").await.error().cloned(),
        client
            .set_with_ttl(CACHE, "k", "v", Duration::ZERO)
            .await
            .error()
            .cloned(),
        client.delete(CACHE, b"".as_slice()).await.error().cloned(),
        client
            .dictionary_set_field(CACHE, "d", "", "v")
            .await
            .error()
            .cloned(),
        client
            .set_add_elements(CACHE, "s", Vec::<String>::new())
            .await
            .error()
            .cloned(),
        client.list_fetch(CACHE, "").await.error().cloned(),
        client
            .set_if_not_exists(CACHE, "", "v")
            .await
            .error()
            .cloned(),
        client.increment(CACHE, "", 1).await.error().cloned(),
        client
            .dictionary_get_field(CACHE, "d", "")
            .await
            .error()
            .cloned(),
        client
            .dictionary_get_field(CACHE, "", "f")
            .await
            .error()
            .cloned(),
        client.list_push_back(CACHE, "", "v").await.error().cloned(),
        client.set_fetch(CACHE, "").await.error().cloned(),
        client.get("caché", "k").await.error().cloned(),
    ];

    for error in errors {
        let error = error.expect("expected an error variant");
        assert_eq!(error.kind(), ErrorKind::InvalidArgument);
        assert!(error.transport().is_none());
    }
    assert_eq!(total_calls(&stubs), 0);
}

#[tokio::test]
async fn zero_timeout_against_slow_transport_times_out() {
    let store = MemoryStore::new();
    let stub = MemoryStub::new(store).with_latency(Duration::from_millis(50));
    let client = client_with(&[stub]);

    let hurried = client.with_timeout(Duration::ZERO);
    let response = hurried.get(CACHE, "k").await;
    assert_eq!(response.error().map(|e| e.kind()), Some(ErrorKind::Timeout));

    assert_eq!(client.timeout(), config().timeout());
    assert!(client.get(CACHE, "k").await.is_miss());
}

#[tokio::test]
async fn transport_failures_become_error_variants() {
    let (client, stubs) = memory_client(1);

    stubs[0].fail_with(Status::unavailable("service restarting"));
    let response = client.get(CACHE, "k").await;
    let error = response.error().expect("error");
    assert_eq!(error.kind(), ErrorKind::ServerUnavailable);
    assert!(error.is_retryable());
    assert_eq!(error.transport_message(), Some("service restarting"));

    let mut metadata = MetadataMap::new();
    metadata.insert("err", "throughput_rate_limit_exceeded".parse().unwrap());
    stubs[0].fail_with(Status::with_metadata(
        tonic::Code::ResourceExhausted,
        "slow down",
        metadata,
    ));
    let response = client.set(CACHE, "k", "v").await;
    let error = response.error().expect("error");
    assert_eq!(error.kind(), ErrorKind::LimitExceeded(LimitExceededReason::Throughput));

    stubs[0].fail_with(Status::permission_denied("read only"));
    let response = client.delete(CACHE, "k").await;
    assert_eq!(
        response.error().map(|e| e.kind()),
        Some(ErrorKind::PermissionDenied)
    );

    stubs[0].clear_failure();
    assert!(client.get(CACHE, "k").await.is_miss());
}

#[tokio::test]
async fn calls_carry_metadata() {
    let (client, stubs) = memory_client(1);
    client.get("orders", "k").await;

    let metadata = stubs[0].last_metadata().expect("metadata");
    assert_eq!(metadata.get("cache").unwrap(), "orders");
    assert_eq!(metadata.get("authorization").unwrap(), "test-token");
    assert_eq!(metadata.get("agent").unwrap().to_str().unwrap(), agent());
}

#[tokio::test]
async fn set_if_not_exists_stores_once() {
    let (client, _stubs) = memory_client(1);
    let first = client.set_if_not_exists(CACHE, "lock", "a").await;
    let second = client.set_if_not_exists(CACHE, "lock", "b").await;
    assert!(first.is_stored());
    assert!(matches!(second, SetIfNotExistsResponse::NotStored));
    assert_eq!(client.get(CACHE, "lock").await.value_str(), Some("a"));
}

#[tokio::test]
async fn increment_counts_from_zero() {
    let (client, _stubs) = memory_client(1);
    assert_eq!(client.increment(CACHE, "hits", 1).await.value(), Some(1));
    assert_eq!(client.increment(CACHE, "hits", 41).await.value(), Some(42));
    assert_eq!(client.increment(CACHE, "hits", -2).await.value(), Some(40));
    assert_eq!(client.get(CACHE, "hits").await.value_str(), Some("40"));

    client.set(CACHE, "name", "alice").await;
    let response = client.increment(CACHE, "name", 1).await;
    assert!(matches!(
        response,
        IncrementResponse::Error(ref error) if error.kind() == ErrorKind::FailedPrecondition
    ));
}

#[tokio::test]
async fn items_expire_after_ttl() {
    let (client, _stubs) = memory_client(1);
    client
        .set_with_ttl(CACHE, "short", "v", Duration::from_millis(20))
        .await;
    assert!(client.get(CACHE, "short").await.is_hit());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(client.get(CACHE, "short").await.is_miss());
}

#[tokio::test]
async fn dictionary_fields_round_trip() {
    let (client, _stubs) = memory_client(2);
    assert!(client
        .dictionary_get_field(CACHE, "user", "name")
        .await
        .error()
        .is_none());

    client.dictionary_set_field(CACHE, "user", "name", "ada").await;
    client.dictionary_set_field(CACHE, "user", "lang", "en").await;

    let name = client.dictionary_get_field(CACHE, "user", "name").await;
    assert_eq!(name.value_str(), Some("ada"));
    let missing = client.dictionary_get_field(CACHE, "user", "age").await;
    assert!(matches!(missing, DictionaryGetFieldResponse::Miss));
    let absent = client.dictionary_get_field(CACHE, "nobody", "name").await;
    assert!(matches!(absent, DictionaryGetFieldResponse::Miss));
}

#[tokio::test]
async fn list_push_and_fetch_preserve_order() {
    let (client, _stubs) = memory_client(2);
    assert!(matches!(
        client.list_fetch(CACHE, "queue").await,
        ListFetchResponse::Miss
    ));

    assert_eq!(client.list_push_back(CACHE, "queue", "a").await.list_length(), Some(1));
    assert_eq!(client.list_push_back(CACHE, "queue", "b").await.list_length(), Some(2));

    let fetched = client.list_fetch(CACHE, "queue").await;
    assert_eq!(
        fetched.value_strings(),
        Some(vec!["a".to_string(), "b".to_string()])
    );
}

#[tokio::test]
async fn set_elements_are_deduplicated() {
    let (client, _stubs) = memory_client(2);
    assert!(matches!(client.set_fetch(CACHE, "tags").await, SetFetchResponse::Miss));

    client.set_add_elements(CACHE, "tags", ["red", "blue"]).await;
    client.set_add_elements(CACHE, "tags", vec!["blue", "green"]).await;

    let fetched = client.set_fetch(CACHE, "tags").await;
    let mut elements: Vec<&[u8]> = fetched
        .elements()
        .expect("hit")
        .iter()
        .map(|element| element.as_ref())
        .collect();
    elements.sort();
    assert_eq!(elements, vec![&b"blue"[..], &b"green"[..], &b"red"[..]]);
}

#[tokio::test]
async fn calls_spread_evenly_across_channels() {
    let (client, stubs) = memory_client(4);

    let tasks: Vec<_> = (0..40)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move { client.get(CACHE, format!("key-{i}")).await })
        })
        .collect();
    for task in tasks {
        assert!(task.await.unwrap().is_miss());
    }

    for stub in &stubs {
        assert_eq!(stub.calls(), 10);
    }
}

#[tokio::test]
async fn close_drains_in_flight_calls_then_rejects() {
    let store = MemoryStore::new();
    let stubs: Vec<MemoryStub> = (0..2)
        .map(|_| MemoryStub::new(store.clone()).with_latency(Duration::from_millis(50)))
        .collect();
    let client = client_with(&stubs);

    let in_flight = {
        let client = client.clone();
        tokio::spawn(async move { client.get(CACHE, "k").await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    client.close().await;
    assert!(in_flight.await.unwrap().is_miss());
    assert!(client.is_closed());

    let response = client.with_timeout(Duration::from_secs(1)).get(CACHE, "k").await;
    let error = response.error().expect("closed client must reject");
    assert_eq!(error.kind(), ErrorKind::FailedPrecondition);
    assert_eq!(total_calls(&stubs), 1);

    client.close().await;
    for stub in &stubs {
        assert_eq!(stub.closes(), 1);
    }
}

#[tokio::test]
async fn construction_rejects_bad_config() {
    let store = MemoryStore::new();
    let stubs = vec![MemoryStub::new(store)];

    let no_token = ClientConfig::new("cache.test.local", "");
    assert!(CacheClient::with_stubs(stubs.clone(), &no_token).is_err());

    let err = CacheClient::<MemoryStub>::with_stubs(Vec::new(), &config())
        .err()
        .expect("empty pool");
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn grpc_client_connects_lazily() {
    let config = ClientConfig::new("127.0.0.1:9", "token")
        .with_tls(false)
        .with_channel_count(3);
    let client = CacheClient::connect(config).expect("lazy connect never dials");
    assert_eq!(client.channel_count(), 3);
    client.close().await;
}

#[tokio::test]
async fn close_releases_grpc_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = ClientConfig::new(addr.to_string(), "token")
        .with_tls(false)
        .with_channel_count(1)
        .with_timeout(Duration::from_millis(200));
    let client = CacheClient::connect(config).expect("lazy connect");

    // The peer accepts but never answers, so the call dials and then times out.
    let call = {
        let client = client.clone();
        tokio::spawn(async move { client.get(CACHE, "k").await })
    };
    let (mut socket, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
        .await
        .expect("client dialed")
        .unwrap();
    assert!(call.await.unwrap().is_error());

    client.close().await;

    let mut buf = [0u8; 1024];
    let released = async {
        loop {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return true,
                Ok(_) => continue,
            }
        }
    };
    let released = tokio::time::timeout(Duration::from_secs(2), released)
        .await
        .unwrap_or(false);
    assert!(released, "connection still open after close");
    assert!(client.is_closed());
}
