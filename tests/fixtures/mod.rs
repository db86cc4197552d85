//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use appcfg::AppConfigService;
use appcfg_store::ConfigStore;
use serde_json::Value;

pub const ADMIN: &str = "admin";
pub const ACME: &str = "acme";

/// Path to a JSON fixture under `tests/fixtures/apps`.
pub fn app_fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/apps")
        .join(format!("{}.json", name))
}

pub fn load_fixture(name: &str) -> Value {
    let content = std::fs::read_to_string(app_fixture_path(name))
        .unwrap_or_else(|e| panic!("fixture {} unreadable: {}", name, e));
    serde_json::from_str(&content).unwrap_or_else(|e| panic!("fixture {} invalid: {}", name, e))
}

pub fn retail() -> Value {
    load_fixture("retail")
}

pub fn retail_acme_override() -> Value {
    load_fixture("retail_acme_override")
}

/// Save the retail platform document and the acme override.
pub async fn seed_retail(service: &AppConfigService) {
    let outcome = service.save_app_config("retail", retail(), ADMIN, None).await;
    assert!(outcome.success, "platform save failed: {:?}", outcome.error);
    let outcome = service
        .save_app_config("retail", retail_acme_override(), ADMIN, Some(ACME))
        .await;
    assert!(outcome.success, "override save failed: {:?}", outcome.error);
}

pub fn service_over(store: Arc<dyn ConfigStore>) -> AppConfigService {
    AppConfigService::new(store)
}
