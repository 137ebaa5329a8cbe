use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::watch;

use crate::config::{ConfigError, LoadConfig, WaitTime};
use crate::stats::{Stats, Summary};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// The feature vector every simulated user sends.
pub fn payload() -> Value {
    json!({
        "sepal_length": 5.1,
        "sepal_width": 3.5,
        "petal_length": 1.4,
        "petal_width": 0.2
    })
}

#[derive(Clone, Default)]
struct SharedStats(Arc<Mutex<Stats>>);

impl SharedStats {
    fn lock(&self) -> MutexGuard<'_, Stats> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct User {
    id: usize,
    client: reqwest::Client,
    endpoint: String,
    payload: Value,
    wait: WaitTime,
    rng: StdRng,
    start_delay: Duration,
    stats: SharedStats,
}

/// Runs the configured users until the run time elapses or Ctrl-C, then
/// returns the final statistics.
pub async fn run(config: LoadConfig) -> Result<Summary, LoadError> {
    config.validate()?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs_f64(config.timeout))
        .build()?;
    let endpoint = config.endpoint();
    let stats = SharedStats::default();
    let (stop_tx, stop_rx) = watch::channel(false);
    let started = Instant::now();

    info!(
        "Starting {} user(s) against {} at {}/s, wait {}-{}s",
        config.users, endpoint, config.spawn_rate, config.min_wait, config.max_wait
    );

    let mut users = Vec::with_capacity(config.users);
    for id in 0..config.users {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(id as u64)),
            None => StdRng::from_entropy(),
        };
        let user = User {
            id,
            client: client.clone(),
            endpoint: endpoint.clone(),
            payload: payload(),
            wait: config.wait_time(),
            rng,
            start_delay: config.spawn_delay(id),
            stats: stats.clone(),
        };
        users.push(tokio::spawn(user.run(stop_rx.clone())));
    }

    let reporter = tokio::spawn(report(
        stats.clone(),
        Duration::from_secs_f64(config.report_interval),
        started,
        stop_rx,
    ));

    match config.run_time {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs_f64(secs)) => info!("Run time elapsed"),
                _ = tokio::signal::ctrl_c() => info!("Interrupted"),
            }
        }
        None => {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Unable to listen for Ctrl-C: {}", e);
            }
            info!("Interrupted");
        }
    }

    let _ = stop_tx.send(true);
    for user in users {
        if let Err(e) = user.await {
            warn!("User task ended abnormally: {}", e);
        }
    }
    let _ = reporter.await;

    let summary = stats.lock().summary(started.elapsed());
    Ok(summary)
}

impl User {
    async fn run(mut self, mut stop: watch::Receiver<bool>) {
        if pause(self.start_delay, &mut stop).await {
            return;
        }
        debug!("User {} started", self.id);

        loop {
            let wait = self.wait.sample(&mut self.rng);
            if pause(wait, &mut stop).await {
                break;
            }
            self.send_once().await;
        }

        debug!("User {} stopped", self.id);
    }

    async fn send_once(&self) {
        let sent = Instant::now();
        let result = self
            .client
            .post(&self.endpoint)
            .json(&self.payload)
            .send()
            .await;

        match result {
            Ok(resp) => {
                let status = resp.status();
                let body = resp.bytes().await;
                let latency = sent.elapsed();
                match body {
                    Ok(_) if status.is_success() => self.stats.lock().record_success(latency),
                    Ok(_) => {
                        debug!("User {}: HTTP {}", self.id, status);
                        self.stats.lock().record_failure(Some(latency));
                    }
                    Err(e) => {
                        debug!("User {}: failed reading body: {}", self.id, e);
                        self.stats.lock().record_failure(Some(latency));
                    }
                }
            }
            Err(e) => {
                debug!("User {}: request failed: {}", self.id, e);
                self.stats.lock().record_failure(None);
            }
        }
    }
}

/// Sleeps for `duration`; returns true when a stop was signalled instead.
async fn pause(duration: Duration, stop: &mut watch::Receiver<bool>) -> bool {
    if *stop.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = stop.changed() => return true,
    }
    *stop.borrow()
}

async fn report(
    stats: SharedStats,
    every: Duration,
    started: Instant,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let summary = stats.lock().summary(started.elapsed());
                info!("{}", summary);
            }
            _ = stop.changed() => break,
        }
    }
}
