//! # Operation Responses
//!
//! Every public operation resolves to exactly one variant of its response
//! type; failures are carried in an `Error` variant rather than raised. A
//! reply whose shape the client does not recognize becomes an
//! `UNKNOWN_SERVICE_ERROR`.

use bytes::Bytes;

use scache_common::proto::{self, dictionary_get_response, list_fetch_response};
use scache_common::proto::{set_fetch_response, set_if_not_exists_response, ECacheResult};
use scache_common::{CacheError, CacheResult, ErrorKind};

/// Closed set of outcomes for one operation.
pub trait ResponseVariant: Sized {
    /// Decoded reply message the variant is built from.
    type Reply;

    fn from_reply(reply: Self::Reply) -> Self;

    fn from_error(error: CacheError) -> Self;

    /// The carried error, if this is the `Error` variant.
    fn error(&self) -> Option<&CacheError>;

    fn from_result(result: CacheResult<Self::Reply>) -> Self {
        match result {
            Ok(reply) => Self::from_reply(reply),
            Err(error) => Self::from_error(error),
        }
    }

    fn is_error(&self) -> bool {
        self.error().is_some()
    }
}

macro_rules! error_variant {
    () => {
        fn from_error(error: CacheError) -> Self {
            Self::Error(error)
        }

        fn error(&self) -> Option<&CacheError> {
            match self {
                Self::Error(error) => Some(error),
                _ => None,
            }
        }
    };
}

fn unrecognized(operation: &str, what: impl std::fmt::Display) -> CacheError {
    CacheError::new(
        ErrorKind::UnknownService,
        format!("{operation} returned an unrecognized reply: {what}"),
    )
}

fn utf8(value: &Bytes) -> Option<&str> {
    std::str::from_utf8(value).ok()
}

/// Outcome of `get`.
#[derive(Debug, Clone)]
pub enum GetResponse {
    Hit { value: Bytes },
    Miss,
    Error(CacheError),
}

impl GetResponse {
    pub fn is_hit(&self) -> bool {
        matches!(self, GetResponse::Hit { .. })
    }

    pub fn is_miss(&self) -> bool {
        matches!(self, GetResponse::Miss)
    }

    pub fn value(&self) -> Option<&Bytes> {
        match self {
            GetResponse::Hit { value } => Some(value),
            _ => None,
        }
    }

    /// The hit value as UTF-8, if it is a hit and valid UTF-8.
    pub fn value_str(&self) -> Option<&str> {
        self.value().and_then(utf8)
    }

    pub fn into_value(self) -> Option<Bytes> {
        match self {
            GetResponse::Hit { value } => Some(value),
            _ => None,
        }
    }
}

impl ResponseVariant for GetResponse {
    type Reply = proto::GetResponse;

    fn from_reply(reply: Self::Reply) -> Self {
        match ECacheResult::try_from(reply.result) {
            Ok(ECacheResult::Hit) => GetResponse::Hit {
                value: reply.cache_body,
            },
            Ok(ECacheResult::Miss) => GetResponse::Miss,
            _ => GetResponse::Error(unrecognized(
                "get",
                format_args!("result {} {}", reply.result, reply.message),
            )),
        }
    }

    error_variant!();
}

/// Outcome of `set` and `set_with_ttl`.
#[derive(Debug, Clone)]
pub enum SetResponse {
    Success,
    Error(CacheError),
}

impl ResponseVariant for SetResponse {
    type Reply = proto::SetResponse;

    fn from_reply(_reply: Self::Reply) -> Self {
        SetResponse::Success
    }

    error_variant!();
}

/// Outcome of `delete`. Deleting an absent key is a success.
#[derive(Debug, Clone)]
pub enum DeleteResponse {
    Success,
    Error(CacheError),
}

impl ResponseVariant for DeleteResponse {
    type Reply = proto::DeleteResponse;

    fn from_reply(_reply: Self::Reply) -> Self {
        DeleteResponse::Success
    }

    error_variant!();
}

/// Outcome of `set_if_not_exists`.
#[derive(Debug, Clone)]
pub enum SetIfNotExistsResponse {
    Stored,
    NotStored,
    Error(CacheError),
}

impl SetIfNotExistsResponse {
    pub fn is_stored(&self) -> bool {
        matches!(self, SetIfNotExistsResponse::Stored)
    }
}

impl ResponseVariant for SetIfNotExistsResponse {
    type Reply = proto::SetIfNotExistsResponse;

    fn from_reply(reply: Self::Reply) -> Self {
        match reply.result {
            Some(set_if_not_exists_response::Result::Stored(_)) => SetIfNotExistsResponse::Stored,
            Some(set_if_not_exists_response::Result::NotStored(_)) => {
                SetIfNotExistsResponse::NotStored
            }
            None => SetIfNotExistsResponse::Error(unrecognized("set_if_not_exists", "no result")),
        }
    }

    error_variant!();
}

/// Outcome of `increment`.
#[derive(Debug, Clone)]
pub enum IncrementResponse {
    Success { value: i64 },
    Error(CacheError),
}

impl IncrementResponse {
    /// Counter value after the increment.
    pub fn value(&self) -> Option<i64> {
        match self {
            IncrementResponse::Success { value } => Some(*value),
            IncrementResponse::Error(_) => None,
        }
    }
}

impl ResponseVariant for IncrementResponse {
    type Reply = proto::IncrementResponse;

    fn from_reply(reply: Self::Reply) -> Self {
        IncrementResponse::Success { value: reply.value }
    }

    error_variant!();
}

/// Outcome of `dictionary_set_field`.
#[derive(Debug, Clone)]
pub enum DictionarySetFieldResponse {
    Success,
    Error(CacheError),
}

impl ResponseVariant for DictionarySetFieldResponse {
    type Reply = proto::DictionarySetResponse;

    fn from_reply(_reply: Self::Reply) -> Self {
        DictionarySetFieldResponse::Success
    }

    error_variant!();
}

/// Outcome of `dictionary_get_field`. A missing dictionary and a missing
/// field are both a miss.
#[derive(Debug, Clone)]
pub enum DictionaryGetFieldResponse {
    Hit { value: Bytes },
    Miss,
    Error(CacheError),
}

impl DictionaryGetFieldResponse {
    pub fn is_hit(&self) -> bool {
        matches!(self, DictionaryGetFieldResponse::Hit { .. })
    }

    pub fn value(&self) -> Option<&Bytes> {
        match self {
            DictionaryGetFieldResponse::Hit { value } => Some(value),
            _ => None,
        }
    }

    pub fn value_str(&self) -> Option<&str> {
        self.value().and_then(utf8)
    }
}

impl ResponseVariant for DictionaryGetFieldResponse {
    type Reply = proto::DictionaryGetResponse;

    fn from_reply(reply: Self::Reply) -> Self {
        use dictionary_get_response::Dictionary;

        let part = match reply.dictionary {
            Some(Dictionary::Missing(_)) => return DictionaryGetFieldResponse::Miss,
            Some(Dictionary::Found(found)) => found.items.into_iter().next(),
            None => None,
        };
        let Some(part) = part else {
            return DictionaryGetFieldResponse::Error(unrecognized(
                "dictionary_get_field",
                "no field result",
            ));
        };
        match ECacheResult::try_from(part.result) {
            Ok(ECacheResult::Hit) => DictionaryGetFieldResponse::Hit {
                value: part.cache_body,
            },
            Ok(ECacheResult::Miss) => DictionaryGetFieldResponse::Miss,
            _ => DictionaryGetFieldResponse::Error(unrecognized(
                "dictionary_get_field",
                format_args!("result {}", part.result),
            )),
        }
    }

    error_variant!();
}

/// Outcome of `list_push_back`.
#[derive(Debug, Clone)]
pub enum ListPushBackResponse {
    Success { list_length: u32 },
    Error(CacheError),
}

impl ListPushBackResponse {
    /// Length of the list after the push.
    pub fn list_length(&self) -> Option<u32> {
        match self {
            ListPushBackResponse::Success { list_length } => Some(*list_length),
            ListPushBackResponse::Error(_) => None,
        }
    }
}

impl ResponseVariant for ListPushBackResponse {
    type Reply = proto::ListPushBackResponse;

    fn from_reply(reply: Self::Reply) -> Self {
        ListPushBackResponse::Success {
            list_length: reply.list_length,
        }
    }

    error_variant!();
}

/// Outcome of `list_fetch`.
#[derive(Debug, Clone)]
pub enum ListFetchResponse {
    Hit { values: Vec<Bytes> },
    Miss,
    Error(CacheError),
}

impl ListFetchResponse {
    pub fn values(&self) -> Option<&[Bytes]> {
        match self {
            ListFetchResponse::Hit { values } => Some(values.as_slice()),
            _ => None,
        }
    }

    /// The values as UTF-8 strings; `None` on a miss, error, or invalid UTF-8.
    pub fn value_strings(&self) -> Option<Vec<String>> {
        self.values()?
            .iter()
            .map(|value| utf8(value).map(str::to_owned))
            .collect()
    }
}

impl ResponseVariant for ListFetchResponse {
    type Reply = proto::ListFetchResponse;

    fn from_reply(reply: Self::Reply) -> Self {
        match reply.list {
            Some(list_fetch_response::List::Found(found)) => ListFetchResponse::Hit {
                values: found.values,
            },
            Some(list_fetch_response::List::Missing(_)) => ListFetchResponse::Miss,
            None => ListFetchResponse::Error(unrecognized("list_fetch", "no list")),
        }
    }

    error_variant!();
}

/// Outcome of `set_add_elements`.
#[derive(Debug, Clone)]
pub enum SetAddElementsResponse {
    Success,
    Error(CacheError),
}

impl ResponseVariant for SetAddElementsResponse {
    type Reply = proto::SetUnionResponse;

    fn from_reply(_reply: Self::Reply) -> Self {
        SetAddElementsResponse::Success
    }

    error_variant!();
}

/// Outcome of `set_fetch`. Element order is unspecified.
#[derive(Debug, Clone)]
pub enum SetFetchResponse {
    Hit { elements: Vec<Bytes> },
    Miss,
    Error(CacheError),
}

impl SetFetchResponse {
    pub fn elements(&self) -> Option<&[Bytes]> {
        match self {
            SetFetchResponse::Hit { elements } => Some(elements.as_slice()),
            _ => None,
        }
    }
}

impl ResponseVariant for SetFetchResponse {
    type Reply = proto::SetFetchResponse;

    fn from_reply(reply: Self::Reply) -> Self {
        match reply.set {
            Some(set_fetch_response::Set::Found(found)) => SetFetchResponse::Hit {
                elements: found.elements,
            },
            Some(set_fetch_response::Set::Missing(_)) => SetFetchResponse::Miss,
            None => SetFetchResponse::Error(unrecognized("set_fetch", "no set")),
        }
    }

    error_variant!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_reply_maps_hit_and_miss() {
        let hit = GetResponse::from_reply(proto::GetResponse {
            result: ECacheResult::Hit as i32,
            cache_body: Bytes::from_static(b"v"),
            message: String::new(),
        });
        assert_eq!(hit.value_str(), Some("v"));

        let miss = GetResponse::from_reply(proto::GetResponse {
            result: ECacheResult::Miss as i32,
            cache_body: Bytes::new(),
            message: String::new(),
        });
        assert!(miss.is_miss());
    }

    #[test]
    fn unexpected_get_result_is_unknown_service() {
        let reply = GetResponse::from_reply(proto::GetResponse {
            result: ECacheResult::Ok as i32,
            cache_body: Bytes::new(),
            message: String::new(),
        });
        assert_eq!(reply.error().unwrap().kind(), ErrorKind::UnknownService);
    }

    #[test]
    fn absent_oneof_is_unknown_service() {
        let reply = SetIfNotExistsResponse::from_reply(proto::SetIfNotExistsResponse { result: None });
        assert_eq!(reply.error().unwrap().kind(), ErrorKind::UnknownService);

        let reply = ListFetchResponse::from_reply(proto::ListFetchResponse { list: None });
        assert!(reply.is_error());
    }

    #[test]
    fn missing_dictionary_is_a_miss() {
        let reply = DictionaryGetFieldResponse::from_reply(proto::DictionaryGetResponse {
            dictionary: Some(dictionary_get_response::Dictionary::Missing(
                dictionary_get_response::Missing {},
            )),
        });
        assert!(matches!(reply, DictionaryGetFieldResponse::Miss));
    }

    #[test]
    fn from_result_routes_errors() {
        let err = CacheError::new(ErrorKind::Timeout, "deadline has elapsed");
        let reply = SetResponse::from_result(Err(err));
        assert_eq!(reply.error().unwrap().kind(), ErrorKind::Timeout);
        assert!(SetResponse::from_result(Ok(proto::SetResponse {})).error().is_none());
    }

    #[test]
    fn list_strings_reject_invalid_utf8() {
        let reply = ListFetchResponse::Hit {
            values: vec![Bytes::from_static(b"a"), Bytes::from_static(&[0xff])],
        };
        assert_eq!(reply.value_strings(), None);
        let reply = ListFetchResponse::Hit {
            values: vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")],
        };
        assert_eq!(reply.value_strings(), Some(vec!["a".to_string(), "b".to_string()]));
    }
}
