//! Tollgate - Per-key Admission Control
//!
//! This crate decides in real time whether each request, identified by an
//! arbitrary key such as the caller's address, is admitted or rejected. Each
//! key gets an independent token bucket that enforces a long-run average
//! rate while tolerating short bursts. The limiter core lives in
//! [`ratelimit`]; [`grpc`] exposes it as a network service.

pub mod config;
pub mod error;
pub mod grpc;
pub mod ratelimit;
