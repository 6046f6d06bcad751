//! Worker pool bridging async handlers to the synchronous Chrome backend
//!
//! The `headless_chrome` API is blocking, so render jobs run on a fixed set
//! of dedicated threads. Handlers submit jobs over a channel and await a
//! per-job oneshot reply; the pool size bounds how many Chrome processes can
//! be alive at once.

use crate::{render, Error, RenderConfig, RenderOptions, Result};
use log::{debug, error, info};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use tokio::sync::oneshot;

/// Scheduling slack added on top of the render budget before a job is
/// declared timed out, so the browser's own timeout fires first.
const TIMEOUT_GRACE_MS: u64 = 2000;

struct Job {
    html: String,
    options: RenderOptions,
    resp: oneshot::Sender<Result<Vec<u8>>>,
}

/// A pool of render worker threads, each owning its Chrome launches
pub struct RenderPool {
    job_tx: Sender<Job>,
    timeout_ms: u64,
}

impl RenderPool {
    /// Spawn `workers` threads servicing render jobs
    ///
    /// No Chrome process is launched here; workers launch one per job and
    /// drop it when the job completes.
    pub fn new(config: RenderConfig, workers: usize) -> Self {
        let workers = workers.max(1);
        let timeout_ms = config.timeout_ms;

        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let job_rx = Arc::new(Mutex::new(job_rx));

        for id in 0..workers {
            let rx = Arc::clone(&job_rx);
            let config = config.clone();
            thread::spawn(move || worker_loop(id, rx, config));
        }

        info!("Render pool started with {} worker(s)", workers);

        Self { job_tx, timeout_ms }
    }

    /// Render HTML on a pool worker, honoring the configured time budget
    pub async fn render(&self, html: String, options: RenderOptions) -> Result<Vec<u8>> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.job_tx
            .send(Job {
                html,
                options,
                resp: resp_tx,
            })
            .map_err(|_| Error::Init("Render pool is not running".to_string()))?;

        let budget = std::time::Duration::from_millis(self.timeout_ms + TIMEOUT_GRACE_MS);
        match tokio::time::timeout(budget, resp_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::Render(
                "Render worker dropped the job reply".to_string(),
            )),
            Err(_) => Err(Error::Timeout(self.timeout_ms)),
        }
    }
}

fn worker_loop(id: usize, rx: Arc<Mutex<Receiver<Job>>>, config: RenderConfig) {
    loop {
        // Hold the lock only while pulling the next job off the queue
        let job = {
            let Ok(guard) = rx.lock() else {
                error!("Render worker {} lost the job queue lock", id);
                break;
            };
            guard.recv()
        };

        let Ok(job) = job else {
            debug!("Render worker {} shutting down", id);
            break;
        };

        debug!(
            "Render worker {} picked up a {}x{} {} job",
            id,
            job.options.viewport.width,
            job.options.viewport.height,
            job.options.format.as_str()
        );

        let result = render::render_html(&config, &job.html, &job.options);
        // The handler may already have timed out and dropped its receiver
        let _ = job.resp.send(result);
    }
}
