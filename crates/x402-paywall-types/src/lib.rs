#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for the x402 paywall gateway.
//!
//! This crate holds everything the gateway needs to price a resource and to
//! reason about a payment proof, without depending on any HTTP framework.
//!
//! # Overview
//!
//! A client asks for a priced resource. The gateway answers `402 Payment Required`
//! with a [`proto::PaymentRequirement`] computed from the [`pricing`] catalog.
//! The client's wallet signs a transfer authorization and sends it back in the
//! `X-PAYMENT` header, which [`codec::PaymentProofCodec`] turns into a
//! [`proto::PaymentProof`].
//!
//! # Modules
//!
//! - [`codec`] - Decoding of the `X-PAYMENT` header and proof identifiers
//! - [`config`] - Environment variable resolution for configuration values
//! - [`networks`] - Known networks and their stablecoin deployments
//! - [`pricing`] - Per-resource prices and HTTP method multipliers
//! - [`proto`] - Wire format of requirements, proofs and verification results
//! - [`requirement`] - Construction of fresh payment requirements
//! - [`timestamp`] - Unix timestamps for authorization windows
//! - [`util`] - Base64 and money amount helpers

pub mod codec;
pub mod config;
pub mod networks;
pub mod pricing;
pub mod proto;
pub mod requirement;
pub mod timestamp;
pub mod util;
