//! Shared fixtures: an in-memory scheduler backend and a scripted prober.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use swarm_core::{Endpoint, JobHandle, JobState, SchedulerKind, SwarmConfig};
use swarm_health::{HealthProbe, ProbeResult};
use swarm_scheduler::{JobSpec, SchedulerBackend, SchedulerError, SchedulerResult};

pub const JOB_TEMPLATE: &str = "#!/bin/bash\n--model-id {{model}} --port {{port}}\necho http://$(hostname):{{port}} >> {{hosts_path}}\n";
pub const NGINX_TEMPLATE: &str = "events {}\nhttp {\n  upstream llm {\n    {{servers}}\n  }\n  server { listen {{port}}; location / { proxy_pass http://llm; } }\n}\n";

/// A config whose templates live in `dir` and whose polls are fast.
pub fn fixture_config(dir: &Path, instances: u32) -> SwarmConfig {
    let template_path = dir.join("job.template.slurm");
    let nginx_path = dir.join("nginx.template.conf");
    std::fs::write(&template_path, JOB_TEMPLATE).unwrap();
    std::fs::write(&nginx_path, NGINX_TEMPLATE).unwrap();
    SwarmConfig {
        instances,
        template_path,
        load_balancer_template_path: nginx_path,
        logs_folder: dir.join("logs"),
        poll_interval: "1ms".to_string(),
        readiness_timeout: "5s".to_string(),
        ..SwarmConfig::default()
    }
}

/// Endpoint the mock publishes for the job at `index`.
pub fn job_endpoint(index: usize) -> Endpoint {
    Endpoint::http(format!("10.0.0.{}", index + 1), 6969)
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scheduler backend that lives entirely in memory.
///
/// Jobs are named `job-<i>`. Each job reports `Submitted` until it has
/// been queried `running_after` times, then `Running`. Batched `states`
/// calls are counted, then answered one `job_state` per handle.
pub struct MockBackend {
    running_after: u32,
    published: Vec<usize>,
    terminated: HashSet<String>,
    dying: HashSet<String>,
    vanishing: HashSet<String>,
    reject_submit: bool,
    queries: Mutex<HashMap<String, u32>>,
    pub submits: AtomicU32,
    pub state_queries: AtomicU32,
    pub batched_queries: AtomicU32,
    pub resolve_calls: AtomicU32,
    pub cancels: Mutex<Vec<Vec<JobHandle>>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            running_after: 1,
            published: vec![usize::MAX],
            terminated: HashSet::new(),
            dying: HashSet::new(),
            vanishing: HashSet::new(),
            reject_submit: false,
            queries: Mutex::new(HashMap::new()),
            submits: AtomicU32::new(0),
            state_queries: AtomicU32::new(0),
            batched_queries: AtomicU32::new(0),
            resolve_calls: AtomicU32::new(0),
            cancels: Mutex::new(Vec::new()),
        }
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each job reports `Running` from its `n`th state query on.
    pub fn running_after(mut self, n: u32) -> Self {
        self.running_after = n;
        self
    }

    /// Endpoint count published on successive resolve calls; the last
    /// value repeats.
    pub fn publishing(mut self, counts: &[usize]) -> Self {
        self.published = counts.to_vec();
        self
    }

    /// `handle` reports `Terminated` from the start.
    pub fn terminating(mut self, handle: &str) -> Self {
        self.terminated.insert(handle.to_string());
        self
    }

    /// `handle` runs until endpoints are first looked up, then terminates.
    pub fn dying(mut self, handle: &str) -> Self {
        self.dying.insert(handle.to_string());
        self
    }

    /// `handle` reports `Running` on its first state query and `Submitted`
    /// on every later one, like a job that was requeued or dropped from
    /// the listing.
    pub fn vanishing(mut self, handle: &str) -> Self {
        self.vanishing.insert(handle.to_string());
        self
    }

    pub fn rejecting_submissions(mut self) -> Self {
        self.reject_submit = true;
        self
    }

    pub fn cancels(&self) -> Vec<Vec<JobHandle>> {
        lock(&self.cancels).clone()
    }
}

#[async_trait]
impl SchedulerBackend for MockBackend {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Slurm
    }

    fn spec_extension(&self) -> &'static str {
        "slurm"
    }

    async fn submit(&self, _spec: &JobSpec, instances: u32) -> SchedulerResult<Vec<JobHandle>> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        if self.reject_submit {
            return Err(SchedulerError::EmptyJobId { index: 0 });
        }
        Ok((0..instances)
            .map(|i| JobHandle::new(format!("job-{i}")))
            .collect())
    }

    async fn job_state(&self, handle: &JobHandle) -> JobState {
        self.state_queries.fetch_add(1, Ordering::SeqCst);
        let name = handle.as_str();
        if self.terminated.contains(name) {
            return JobState::Terminated;
        }
        if self.dying.contains(name) && self.resolve_calls.load(Ordering::SeqCst) > 0 {
            return JobState::Terminated;
        }
        let mut queries = lock(&self.queries);
        let seen = queries.entry(name.to_string()).or_default();
        *seen += 1;
        if self.vanishing.contains(name) {
            return if *seen == 1 {
                JobState::Running
            } else {
                JobState::Submitted
            };
        }
        if *seen >= self.running_after {
            JobState::Running
        } else {
            JobState::Submitted
        }
    }

    async fn states(&self, handles: &[JobHandle]) -> Vec<JobState> {
        self.batched_queries.fetch_add(1, Ordering::SeqCst);
        let mut states = Vec::with_capacity(handles.len());
        for handle in handles {
            states.push(self.job_state(handle).await);
        }
        states
    }

    async fn resolve_endpoints(
        &self,
        _spec: &JobSpec,
        handles: &[JobHandle],
    ) -> SchedulerResult<Vec<Endpoint>> {
        let call = self.resolve_calls.fetch_add(1, Ordering::SeqCst) as usize;
        let count = self.published[call.min(self.published.len() - 1)].min(handles.len());
        Ok((0..count).map(job_endpoint).collect())
    }

    async fn cancel(&self, handles: &[JobHandle]) {
        lock(&self.cancels).push(handles.to_vec());
    }

    fn log_hint(&self, handle: &JobHandle) -> String {
        format!("logs/{handle}.out")
    }
}

/// Healthy for every host except the ones listed.
#[derive(Default)]
pub struct MockProbe {
    unhealthy: HashSet<String>,
    pub probes: AtomicU32,
}

impl MockProbe {
    pub fn healthy() -> Self {
        Self::default()
    }

    pub fn failing_for(host: &str) -> Self {
        Self {
            unhealthy: HashSet::from([host.to_string()]),
            probes: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl HealthProbe for MockProbe {
    async fn probe(&self, endpoint: &Endpoint) -> ProbeResult {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.unhealthy.contains(endpoint.host()) {
            ProbeResult::Failed
        } else {
            ProbeResult::Healthy
        }
    }
}
