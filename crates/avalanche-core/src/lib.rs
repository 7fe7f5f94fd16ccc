//! Avalanche Core - Domain logic for the telemetry pipeline
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Event`, `Batch`, `ChannelState`, identifiers and error taxonomy
//! - **Port definitions** - Traits for adapters: `IEventStorage`, `IIngestion`,
//!   `IIdentityStore`, `IPreferenceStore`, `IFeature`, `IEventEmitter`
//! - **Configuration** - YAML-backed `Config` with validation and a builder
//! - **Logging** - `HubLogger`, the leveled log sink behind the facade
//!
//! # Architecture
//!
//! The domain module contains pure types with no I/O. Ports define trait
//! interfaces that adapter crates (`avalanche-storage`, `avalanche-ingestion`)
//! implement, and the pipeline crates (`avalanche-channel`, `avalanche-hub`)
//! orchestrate domain entities through those ports.

pub mod config;
pub mod domain;
pub mod logging;
pub mod ports;
