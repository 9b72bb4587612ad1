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

//! Error surface for the credential lifecycle and revocation core.
//!
//! Kinds follow what a caller needs to branch on, not the internals that
//! produced them: [`Error::NotFound`] for an absent credential or status
//! list, [`Error::Conflict`] reserved for optimistic-concurrency checks this
//! design does not currently perform, and so on.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("ambiguous id: {0}")]
    Ambiguous(String),

    #[error("credential is not revocable: {0}")]
    NotRevocable(String),

    #[error("status list index pool exhausted")]
    Exhausted,

    #[error("storage failure: {0}")]
    StorageFailure(String),

    #[error("signing failure: {0}")]
    SigningFailure(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("operation cancelled before commit")]
    Cancelled,
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        Error::StorageFailure(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Invalid(format!("could not (de)serialize JSON; {}", err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::StorageFailure(err.to_string())
    }
}
