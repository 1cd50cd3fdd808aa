//! HTTP API Module
//!
//! Provides a REST API for producing to and consuming from the log.

mod http;

pub use http::{
    ConsumeRequest, ConsumeResponse, HttpServer, ProduceRequest, ProduceResponse, RecordBody,
};
