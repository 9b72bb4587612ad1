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

//! Layered configuration: a TOML document with two environment overrides.
//!
//! Mirrors the `server`/`services` shape described for the backend this
//! core is embedded in. Only the fields this crate actually consumes
//! (storage selection, service naming) are typed strictly; everything else
//! round-trips through `serde_json::Value` so an unrelated section of the
//! document doesn't fail parsing here.

use crate::error::{Error, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Environment variable overriding the keystore password from the config file.
pub const KEYSTORE_PASSWORD_ENV: &str = "KEYSTORE_PASSWORD";
/// Environment variable overriding the storage backend password from the config file.
pub const DB_PASSWORD_ENV: &str = "DB_PASSWORD";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub api_host: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
    #[serde(default)]
    pub enable_schema_cache: bool,
}

fn default_host() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            api_host: default_host(),
            timeout_seconds: default_timeout_seconds(),
            log_level: default_log_level(),
            cors_allowed_origins: Vec::new(),
            enable_schema_cache: false,
        }
    }
}

/// One of the named service subsections under `[services]`; most of these
/// collaborators live outside this core, so only their addressing
/// information is modeled here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEndpoint {
    pub name: String,
    #[serde(default)]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Provider selector: `bolt`, `redis`, ... This core only implements the
    /// embedded-store case (`bolt`-shaped, backed by `sled`).
    pub provider: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicesConfig {
    pub storage: StorageConfig,
    #[serde(default)]
    pub keystore: Option<ServiceEndpoint>,
    #[serde(default)]
    pub did: Option<ServiceEndpoint>,
    #[serde(default)]
    pub schema: Option<ServiceEndpoint>,
    #[serde(default)]
    pub credential: Option<ServiceEndpoint>,
    #[serde(default)]
    pub manifest: Option<ServiceEndpoint>,
    #[serde(default)]
    pub presentation: Option<ServiceEndpoint>,
    #[serde(default)]
    pub issuing: Option<ServiceEndpoint>,
    #[serde(default)]
    pub webhook: Option<ServiceEndpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub services: ServicesConfig,
}

impl Config {
    /// Parses `contents` as the TOML configuration document, then applies
    /// the `KEYSTORE_PASSWORD`/`DB_PASSWORD` environment overrides on top of
    /// whatever the file carried.
    pub fn load_from_str(contents: &str) -> Result<Config> {
        let mut config: Config =
            toml::from_str(contents).map_err(|e| Error::Invalid(format!("invalid config; {}", e)))?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let contents = std::fs::read_to_string(path)?;
        Config::load_from_str(&contents)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(password) = std::env::var(DB_PASSWORD_ENV) {
            info!("overriding storage password from {}", DB_PASSWORD_ENV);
            self.services.storage.password = Some(password);
        }
        if std::env::var(KEYSTORE_PASSWORD_ENV).is_ok() {
            info!(
                "{} is set; keystore password override applied by the keystore collaborator",
                KEYSTORE_PASSWORD_ENV
            );
        }
    }
}
