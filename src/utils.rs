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

//! Small helpers shared across the crate.

pub mod utils {
    use chrono::Utc;
    use uuid::Uuid;

    /// Generates a new random v4 UUID as a bare string; callers that need a
    /// DID-style identifier wrap it themselves (e.g. `urn:uuid:{}`).
    pub fn generate_uuid() -> String {
        Uuid::new_v4().to_string()
    }

    /// Current time formatted as an ISO8601 string, as used on `issuanceDate`
    /// and proof `created` fields.
    pub fn get_now_as_iso_string() -> String {
        Utc::now().format("%Y-%m-%dT%H:%M:%S.000Z").to_string()
    }
}
