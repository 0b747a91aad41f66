// ABOUTME: Test support utilities.
// ABOUTME: In-memory environment driver, scripted health probes, and controller builders.

// Each test binary only uses some of these helpers, so allow dead_code.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use promoter::driver::{DeployError, EnvironmentDriver};
use promoter::environment::Environment;
use promoter::health::{HealthPolicy, Probe, ProbeFailure, ProbeResult};
use promoter::promotion::{PromotionController, Target};
use promoter::rollback::{MemoryRecordStore, RollbackManager};
use promoter::types::{EnvironmentName, ImageRef};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::Once;
use std::time::Duration;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("promoter=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn image(tag: &str) -> ImageRef {
    ImageRef::new("registry.example.com", "shop", tag).unwrap()
}

pub fn staging_env() -> Environment {
    Environment::new(EnvironmentName::staging(), "shop", 8080)
        .with_health_url("http://staging.example.com:8080/health")
}

pub fn production_env() -> Environment {
    Environment::new(EnvironmentName::production(), "shop", 80)
        .with_health_url("http://localhost:80/health")
}

// =============================================================================
// FakeDriver
// =============================================================================

#[derive(Debug, Default)]
struct DriverState {
    running: Option<ImageRef>,
    deploys: Vec<ImageRef>,
    removes: usize,
    failing_images: HashSet<ImageRef>,
    fail_all_deploys: bool,
    fail_inspect: bool,
    fail_remove: bool,
}

/// One environment held in memory. Failed deploys leave it untouched.
#[derive(Debug, Default)]
pub struct FakeDriver {
    state: Mutex<DriverState>,
}

impl FakeDriver {
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn running(image: ImageRef) -> Arc<Self> {
        let driver = Self::default();
        driver.state.lock().running = Some(image);
        Arc::new(driver)
    }

    pub fn fail_deploy_of(&self, image: &ImageRef) {
        self.state.lock().failing_images.insert(image.clone());
    }

    pub fn fail_deploys(&self) {
        self.state.lock().fail_all_deploys = true;
    }

    pub fn fail_inspect(&self) {
        self.state.lock().fail_inspect = true;
    }

    pub fn fail_remove(&self) {
        self.state.lock().fail_remove = true;
    }

    /// The host is reachable again: drop every injected failure.
    pub fn recover(&self) {
        let mut state = self.state.lock();
        state.failing_images.clear();
        state.fail_all_deploys = false;
        state.fail_inspect = false;
        state.fail_remove = false;
    }

    pub fn current(&self) -> Option<ImageRef> {
        self.state.lock().running.clone()
    }

    pub fn deploys(&self) -> Vec<ImageRef> {
        self.state.lock().deploys.clone()
    }

    pub fn removes(&self) -> usize {
        self.state.lock().removes
    }

    fn unavailable(reason: &str) -> DeployError {
        DeployError::Unavailable {
            host: "fake".to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl EnvironmentDriver for FakeDriver {
    async fn current_image(&self, _env: &Environment) -> Result<Option<ImageRef>, DeployError> {
        let state = self.state.lock();
        if state.fail_inspect {
            return Err(Self::unavailable("inspect failed"));
        }
        Ok(state.running.clone())
    }

    async fn deploy(&self, _env: &Environment, image: &ImageRef) -> Result<(), DeployError> {
        let mut state = self.state.lock();
        if state.fail_all_deploys || state.failing_images.contains(image) {
            return Err(Self::unavailable(&format!("deploy of {image} failed")));
        }
        state.running = Some(image.clone());
        state.deploys.push(image.clone());
        Ok(())
    }

    async fn remove(&self, _env: &Environment) -> Result<(), DeployError> {
        let mut state = self.state.lock();
        if state.fail_remove {
            return Err(Self::unavailable("remove failed"));
        }
        state.running = None;
        state.removes += 1;
        Ok(())
    }
}

// =============================================================================
// ScriptedProbe
// =============================================================================

/// Replays a script of results, then repeats the fallback forever.
#[derive(Debug)]
pub struct ScriptedProbe {
    script: Mutex<VecDeque<ProbeResult>>,
    fallback: ProbeResult,
    calls: Mutex<u32>,
    delay: Duration,
}

impl ScriptedProbe {
    pub fn healthy() -> Arc<Self> {
        Self::with_fallback(ProbeResult::Success(200))
    }

    pub fn unhealthy() -> Arc<Self> {
        Self::with_fallback(ProbeResult::Failure(ProbeFailure::Status(503)))
    }

    /// Fails `failures` times with 503, then succeeds.
    pub fn healthy_after(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(
                std::iter::repeat_n(ProbeResult::Failure(ProbeFailure::Status(503)), failures)
                    .collect(),
            ),
            fallback: ProbeResult::Success(200),
            calls: Mutex::new(0),
            delay: Duration::ZERO,
        })
    }

    /// Never answers within `delay`.
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback: ProbeResult::Success(200),
            calls: Mutex::new(0),
            delay,
        })
    }

    fn with_fallback(fallback: ProbeResult) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            calls: Mutex::new(0),
            delay: Duration::ZERO,
        })
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock()
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    async fn probe(&self, _url: &str) -> ProbeResult {
        *self.calls.lock() += 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

// =============================================================================
// Controller fixture
// =============================================================================

/// Staging and production fakes wired into a controller with a memory store.
pub struct Fixture {
    pub staging: Arc<FakeDriver>,
    pub production: Arc<FakeDriver>,
    pub staging_probe: Arc<ScriptedProbe>,
    pub production_probe: Arc<ScriptedProbe>,
    pub store: Arc<MemoryRecordStore>,
}

impl Fixture {
    pub fn new(production: Arc<FakeDriver>) -> Self {
        Self {
            staging: FakeDriver::empty(),
            production,
            staging_probe: ScriptedProbe::healthy(),
            production_probe: ScriptedProbe::healthy(),
            store: Arc::new(MemoryRecordStore::new()),
        }
    }

    pub fn with_production_probe(mut self, probe: Arc<ScriptedProbe>) -> Self {
        self.production_probe = probe;
        self
    }

    pub fn with_staging_probe(mut self, probe: Arc<ScriptedProbe>) -> Self {
        self.staging_probe = probe;
        self
    }

    pub fn rollback(&self) -> RollbackManager {
        RollbackManager::new(self.store.clone())
    }

    pub fn staging_target(&self) -> Target {
        Target::new(staging_env(), self.staging.clone(), self.staging_probe.clone())
    }

    pub fn production_target(&self) -> Target {
        Target::new(
            production_env(),
            self.production.clone(),
            self.production_probe.clone(),
        )
    }

    /// Controller with fast polling: 3 attempts, 1s apart.
    pub fn controller(&self) -> PromotionController {
        PromotionController::new(
            self.staging_target(),
            self.production_target(),
            self.rollback(),
        )
        .with_health_policy(HealthPolicy::new(3, Duration::from_secs(1)))
    }
}
