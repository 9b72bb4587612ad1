/*
  Copyright (c) 2018-present evan GmbH.

  Licensed under the Apache License, Version 2.0 (the "License");
  you may not use this file except in compliance with the License.
  You may obtain a copy of the License at

      http://www.apache.org/licenses/LICENSE-2.0

  Unless required by applicable law or agreed to in writing, software
  distributed under the License is distributed on an "AS IS" BASIS,
  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
  See the License for the specific language governing permissions and
  limitations under the License.
*/

//! Signed credential store and bitstring status-list revocation engine for
//! self-sovereign identity backends.
//!
//! This crate owns the part of an SSI backend that turns an issuance
//! request into a persisted, signed credential, and that keeps revocation
//! state as a single signed Bitstring Status List credential per
//! `(issuer, schema)` pair rather than one on-chain entry per credential.
//!
//! ## Modules
//!
//! - [`application::credential_store`] — the compound-key-indexed KV layer
//!   credentials and status-list credentials are both persisted through.
//! - [`application::status_list::allocator`] — hands out revocation bit
//!   indexes from a pre-shuffled permutation plus a monotonic cursor.
//! - [`application::status_list::bitstring`] — the gzip+base64url bitstring
//!   codec, MSB-first per the Bitstring Status List bit-ordering rule.
//! - [`application::status_list::engine`] — owns the signed status-list VC
//!   per `(issuer, schema)`, flips bits, re-signs on change.
//! - [`application::lifecycle`] — [`application::lifecycle::CredentialLifecycle`]
//!   is the crate's main entry point: `issue`, `revoke`, `lookup`,
//!   `list_by_subject`, `verify_status`, composing the pieces above into
//!   transactionally atomic operations.
//! - [`storage`] — the namespaced KV substrate contract
//!   ([`storage::Storage`]/[`storage::Transaction`]), with a `sled`-backed
//!   and an in-memory implementation.
//! - [`signing`] — the [`signing::KeySigner`] collaborator seam.
//! - [`collaborators`] — the [`collaborators::DidResolver`],
//!   [`collaborators::SchemaValidator`], and [`collaborators::WebhookDispatcher`]
//!   seams this crate calls out to but does not own.
//! - [`config`] — layered TOML configuration with `KEYSTORE_PASSWORD` and
//!   `DB_PASSWORD` environment overrides.
//! - [`error`] — the crate's [`error::Error`] and [`error::Result`] alias.
//! - [`cancellation`] — the [`cancellation::CancellationToken`] every
//!   lifecycle operation accepts, so a caller can abort before commit.
//!
//! ## Out of scope
//!
//! HTTP routing, DID resolution and schema validation logic (only their
//! seams live here), key storage, webhook fan-out transport, and anything
//! beyond Bitstring Status List revocation.

pub mod application;
pub mod cancellation;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod signing;
pub mod storage;
pub mod utils;
