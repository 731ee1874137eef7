//! # Wire Messages
//!
//! Purpose: Declare the protobuf messages exchanged with the cache service's
//! `cache_client.Scs` gRPC service, written in the shape `prost-build` would
//! emit so no build-time code generation is needed.
//!
//! ## Usage Notes
//!
//! - Keys, values, and collection names are raw bytes; the client encodes
//!   strings as UTF-8 before they reach these types.
//! - `ttl_milliseconds` is the item's time-to-live on the service.
//! - Read replies signal hit/miss either with `ECacheResult` or with a
//!   `found`/`missing` oneof; an absent oneof is an unrecognized reply.

use prost::bytes::Bytes;

/// Fully-qualified gRPC method paths of the data-plane service.
pub mod paths {
    pub const GET: &str = "/cache_client.Scs/Get";
    pub const SET: &str = "/cache_client.Scs/Set";
    pub const DELETE: &str = "/cache_client.Scs/Delete";
    pub const SET_IF_NOT_EXISTS: &str = "/cache_client.Scs/SetIfNotExists";
    pub const INCREMENT: &str = "/cache_client.Scs/Increment";
    pub const DICTIONARY_SET: &str = "/cache_client.Scs/DictionarySet";
    pub const DICTIONARY_GET: &str = "/cache_client.Scs/DictionaryGet";
    pub const LIST_PUSH_BACK: &str = "/cache_client.Scs/ListPushBack";
    pub const LIST_FETCH: &str = "/cache_client.Scs/ListFetch";
    pub const SET_UNION: &str = "/cache_client.Scs/SetUnion";
    pub const SET_FETCH: &str = "/cache_client.Scs/SetFetch";
}

/// Per-item result indicator embedded in read replies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ECacheResult {
    Invalid = 0,
    Ok = 1,
    Hit = 2,
    Miss = 3,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetRequest {
    #[prost(bytes = "bytes", tag = "1")]
    pub cache_key: Bytes,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetResponse {
    #[prost(enumeration = "ECacheResult", tag = "1")]
    pub result: i32,
    #[prost(bytes = "bytes", tag = "2")]
    pub cache_body: Bytes,
    #[prost(string, tag = "3")]
    pub message: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SetRequest {
    #[prost(bytes = "bytes", tag = "1")]
    pub cache_key: Bytes,
    #[prost(bytes = "bytes", tag = "2")]
    pub cache_body: Bytes,
    #[prost(uint64, tag = "3")]
    pub ttl_milliseconds: u64,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct SetResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteRequest {
    #[prost(bytes = "bytes", tag = "1")]
    pub cache_key: Bytes,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct DeleteResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SetIfNotExistsRequest {
    #[prost(bytes = "bytes", tag = "1")]
    pub cache_key: Bytes,
    #[prost(bytes = "bytes", tag = "2")]
    pub cache_body: Bytes,
    #[prost(uint64, tag = "3")]
    pub ttl_milliseconds: u64,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct SetIfNotExistsResponse {
    #[prost(oneof = "set_if_not_exists_response::Result", tags = "1, 2")]
    pub result: ::core::option::Option<set_if_not_exists_response::Result>,
}

pub mod set_if_not_exists_response {
    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct Stored {}

    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct NotStored {}

    #[derive(Clone, Copy, PartialEq, ::prost::Oneof)]
    pub enum Result {
        #[prost(message, tag = "1")]
        Stored(Stored),
        #[prost(message, tag = "2")]
        NotStored(NotStored),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IncrementRequest {
    #[prost(bytes = "bytes", tag = "1")]
    pub cache_key: Bytes,
    #[prost(int64, tag = "2")]
    pub amount: i64,
    #[prost(uint64, tag = "3")]
    pub ttl_milliseconds: u64,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct IncrementResponse {
    #[prost(int64, tag = "1")]
    pub value: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DictionaryFieldValuePair {
    #[prost(bytes = "bytes", tag = "1")]
    pub field: Bytes,
    #[prost(bytes = "bytes", tag = "2")]
    pub value: Bytes,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DictionarySetRequest {
    #[prost(bytes = "bytes", tag = "1")]
    pub dictionary_name: Bytes,
    #[prost(message, repeated, tag = "2")]
    pub items: ::prost::alloc::vec::Vec<DictionaryFieldValuePair>,
    #[prost(uint64, tag = "3")]
    pub ttl_milliseconds: u64,
    #[prost(bool, tag = "4")]
    pub refresh_ttl: bool,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct DictionarySetResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DictionaryGetRequest {
    #[prost(bytes = "bytes", tag = "1")]
    pub dictionary_name: Bytes,
    #[prost(bytes = "bytes", repeated, tag = "2")]
    pub fields: ::prost::alloc::vec::Vec<Bytes>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DictionaryGetResponse {
    #[prost(oneof = "dictionary_get_response::Dictionary", tags = "1, 2")]
    pub dictionary: ::core::option::Option<dictionary_get_response::Dictionary>,
}

pub mod dictionary_get_response {
    use prost::bytes::Bytes;

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Part {
        #[prost(enumeration = "super::ECacheResult", tag = "1")]
        pub result: i32,
        #[prost(bytes = "bytes", tag = "2")]
        pub cache_body: Bytes,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Found {
        #[prost(message, repeated, tag = "1")]
        pub items: ::prost::alloc::vec::Vec<Part>,
    }

    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct Missing {}

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Dictionary {
        #[prost(message, tag = "1")]
        Found(Found),
        #[prost(message, tag = "2")]
        Missing(Missing),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListPushBackRequest {
    #[prost(bytes = "bytes", tag = "1")]
    pub list_name: Bytes,
    #[prost(bytes = "bytes", tag = "2")]
    pub value: Bytes,
    #[prost(uint64, tag = "3")]
    pub ttl_milliseconds: u64,
    #[prost(bool, tag = "4")]
    pub refresh_ttl: bool,
    /// Zero means no truncation.
    #[prost(uint32, tag = "5")]
    pub truncate_front_to_size: u32,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct ListPushBackResponse {
    #[prost(uint32, tag = "1")]
    pub list_length: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListFetchRequest {
    #[prost(bytes = "bytes", tag = "1")]
    pub list_name: Bytes,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListFetchResponse {
    #[prost(oneof = "list_fetch_response::List", tags = "1, 2")]
    pub list: ::core::option::Option<list_fetch_response::List>,
}

pub mod list_fetch_response {
    use prost::bytes::Bytes;

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Found {
        #[prost(bytes = "bytes", repeated, tag = "1")]
        pub values: ::prost::alloc::vec::Vec<Bytes>,
    }

    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct Missing {}

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum List {
        #[prost(message, tag = "1")]
        Found(Found),
        #[prost(message, tag = "2")]
        Missing(Missing),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SetUnionRequest {
    #[prost(bytes = "bytes", tag = "1")]
    pub set_name: Bytes,
    #[prost(bytes = "bytes", repeated, tag = "2")]
    pub elements: ::prost::alloc::vec::Vec<Bytes>,
    #[prost(uint64, tag = "3")]
    pub ttl_milliseconds: u64,
    #[prost(bool, tag = "4")]
    pub refresh_ttl: bool,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct SetUnionResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SetFetchRequest {
    #[prost(bytes = "bytes", tag = "1")]
    pub set_name: Bytes,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SetFetchResponse {
    #[prost(oneof = "set_fetch_response::Set", tags = "1, 2")]
    pub set: ::core::option::Option<set_fetch_response::Set>,
}

pub mod set_fetch_response {
    use prost::bytes::Bytes;

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Found {
        #[prost(bytes = "bytes", repeated, tag = "1")]
        pub elements: ::prost::alloc::vec::Vec<Bytes>,
    }

    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct Missing {}

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Set {
        #[prost(message, tag = "1")]
        Found(Found),
        #[prost(message, tag = "2")]
        Missing(Missing),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn get_response_decodes_hit() {
        let reply = GetResponse {
            result: ECacheResult::Hit as i32,
            cache_body: Bytes::from_static(b"value"),
            message: String::new(),
        };
        let decoded = GetResponse::decode(reply.encode_to_vec().as_slice()).unwrap();
        assert!(matches!(
            ECacheResult::try_from(decoded.result),
            Ok(ECacheResult::Hit)
        ));
        assert_eq!(decoded.cache_body, Bytes::from_static(b"value"));
    }

    #[test]
    fn empty_oneof_decodes_as_none() {
        let decoded = SetIfNotExistsResponse::decode(&[][..]).unwrap();
        assert!(decoded.result.is_none());
    }

    #[test]
    fn set_request_uses_field_numbers() {
        let request = SetRequest {
            cache_key: Bytes::from_static(b"k"),
            cache_body: Bytes::from_static(b"v"),
            ttl_milliseconds: 1,
        };
        // tag 1 (len) "k", tag 2 (len) "v", tag 3 (varint) 1
        assert_eq!(
            request.encode_to_vec(),
            vec![0x0a, 0x01, b'k', 0x12, 0x01, b'v', 0x18, 0x01]
        );
    }

    #[test]
    fn unknown_cache_result_is_rejected() {
        assert!(ECacheResult::try_from(42).is_err());
    }
}
