//! Test helpers: build AppState and router for integration tests.
//!
//! Run with: `cargo test -p cutout-api`. Every app gets its own scratch
//! directory and the in-process chroma-key engine, so no Python is needed.

#![allow(dead_code)]

pub mod engines;
pub mod fixtures;

use axum::Router;
use axum_test::TestServer;
use cutout_api::setup::routes;
use cutout_api::state::AppState;
use cutout_core::{Config, EngineKind};
use cutout_processing::{BackgroundEngine, ChromaKeyEngine, NoopProvisioner, Provisioner};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Test application: server, shared state and owned resources.
pub struct TestApp {
    pub server: TestServer,
    pub router: Router,
    pub state: Arc<AppState>,
    pub _temp_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.state.config.scratch_dir.clone()
    }

    /// Files currently left in the scratch directory.
    pub async fn scratch_files(&self) -> Vec<PathBuf> {
        self.state
            .pipeline
            .store()
            .list_scratch()
            .await
            .expect("Failed to list scratch directory")
    }

    /// Poll until no request is registered, failing after a few seconds.
    pub async fn wait_until_idle(&self) {
        for _ in 0..200 {
            if self.state.registry.is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("registry never drained");
    }
}

pub fn create_test_config(temp_dir: &TempDir) -> Config {
    Config {
        engine: EngineKind::ChromaKey,
        scratch_dir: temp_dir.path().join("scratch"),
        ..Config::default()
    }
}

/// Setup a test app backed by the chroma-key engine.
pub fn setup_test_app() -> TestApp {
    setup_test_app_with(Arc::new(ChromaKeyEngine::new(48)), |_| {})
}

/// Setup a test app with a custom engine and config tweaks.
pub fn setup_test_app_with(
    engine: Arc<dyn BackgroundEngine>,
    configure: impl FnOnce(&mut Config),
) -> TestApp {
    setup_test_app_with_provisioner(engine, Arc::new(NoopProvisioner), configure)
}

/// Setup a test app with a custom engine, provisioner and config tweaks.
pub fn setup_test_app_with_provisioner(
    engine: Arc<dyn BackgroundEngine>,
    provisioner: Arc<dyn Provisioner>,
    configure: impl FnOnce(&mut Config),
) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut config = create_test_config(&temp_dir);
    configure(&mut config);

    let state = Arc::new(AppState::new(config.clone(), engine, provisioner));
    let router = routes::setup_routes(&config, state.clone()).expect("Failed to setup routes");
    let server = TestServer::new(router.clone().into_make_service())
        .expect("Failed to create test server");

    TestApp {
        server,
        router,
        state,
        _temp_dir: temp_dir,
    }
}
