//! Compliance Core
//!
//! Core types shared by the compliance scheduler and its clients.
//!
//! This crate contains:
//! - Domain types: Core business entities (ComplianceJob, ComplianceRunner, Benchmark, etc.)
//! - DTOs: Queue messages and worker callbacks exchanged with external workers

pub mod domain;
pub mod dto;
