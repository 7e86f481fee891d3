//! MediaPush Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `MediaItem`, `Credential`, `BatchDescriptor`
//! - **State machine** - `pending → staged → uploading → committed | failed | skipped`
//! - **Port definitions** - Traits for adapters: `IItemStore`, `IRemoteStore`,
//!   `IMediaAccessor`, `ICredentialStore`, `ITokenRefresher`, `IUploadObserver`
//! - **Configuration** - Typed, validated YAML configuration
//!
//! # Architecture
//!
//! The domain module contains pure business logic with no I/O.
//! Ports define trait interfaces that adapter crates implement
//! (`mediapush-cache` for storage, `mediapush-remote` for the content store).
//! The orchestration components live in `mediapush-upload` and only talk
//! to the outside world through these ports.

pub mod config;
pub mod domain;
pub mod ports;
