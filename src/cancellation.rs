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

//! Cooperative cancellation for request handlers. Every external-facing
//! lifecycle operation accepts an optional [`CancellationToken`]; callers
//! that don't need cancellation (tests, internal composition) pass `None`.

use tokio::sync::watch;

/// Observes whether the handler that issued it asked for cancellation.
/// Cheap to clone; many tokens can share one [`CancellationSource`].
#[derive(Clone)]
pub struct CancellationToken {
    receiver: watch::Receiver<bool>,
}

impl CancellationToken {
    /// True once cancellation was requested. Checked before entering a
    /// transaction and before each suspension point a caller controls;
    /// never checked mid-transaction, since a transaction always either
    /// commits or rolls back atomically once started.
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }
}

/// Owns the cancel signal for one request. Dropping it without calling
/// [`Self::cancel`] leaves every derived token permanently un-cancelled.
pub struct CancellationSource {
    sender: watch::Sender<bool>,
}

impl CancellationSource {
    pub fn new() -> (Self, CancellationToken) {
        let (sender, receiver) = watch::channel(false);
        (CancellationSource { sender }, CancellationToken { receiver })
    }

    pub fn cancel(&self) {
        let _ = self.sender.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_observes_cancel() {
        match env_logger::try_init() {
            Ok(_) | Err(_) => (),
        };

        let (source, token) = CancellationSource::new();
        assert!(!token.is_cancelled());
        source.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn cloned_token_shares_state_with_source() {
        match env_logger::try_init() {
            Ok(_) | Err(_) => (),
        };

        let (source, token) = CancellationSource::new();
        let cloned = token.clone();
        source.cancel();
        assert!(token.is_cancelled());
        assert!(cloned.is_cancelled());
    }
}
