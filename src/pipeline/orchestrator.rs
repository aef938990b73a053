//! Retry orchestration
//!
//! The solve loop. One `solve_if_present` call scans for a challenge and
//! then, per attempt: extract evidence, ask the remote service, actuate
//! the answer, wait for the surface to settle, and verify by re-scanning.
//! Component failures are folded into a retry-or-give-up decision here;
//! nothing below this layer retries, and the only failure a caller sees
//! is [`GaveUp`].

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::challenge::{CaptchaChallenge, SolveResult, Solved, Surface};
use crate::config::SolverConfig;
use crate::driver::AutomationDriver;
use crate::error::{Error, GaveUp, Result};
use crate::metrics::global_metrics;
use crate::pipeline::{Actuator, ChallengeSolver, Detector, Extractor};

/// What one actuated attempt concluded about the surface
enum AttemptOutcome {
    /// The verification scan found no challenge
    Cleared,
    /// The verification scan still sees a challenge. Carried forward as
    /// the next attempt's input so one scan serves both roles.
    StillPresent(CaptchaChallenge),
}

/// Drives the scan/solve/verify loop over one driver and one client
pub struct Orchestrator<D, C> {
    driver: D,
    client: C,
    config: SolverConfig,
    surface: Surface,
    /// Correlates this instance's log lines when several sessions solve
    /// concurrently in-process
    session: Uuid,
    detector: Detector,
    extractor: Extractor,
    actuator: Actuator,
}

impl<D, C> Orchestrator<D, C>
where
    D: AutomationDriver,
    C: ChallengeSolver,
{
    /// Wire the pipeline for one surface. Fails on invalid config.
    pub fn new(driver: D, client: C, surface: Surface, config: SolverConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            driver,
            client,
            config,
            surface,
            session: Uuid::new_v4(),
            detector: Detector::new(surface),
            extractor: Extractor::new(surface),
            actuator: Actuator::new(surface),
        })
    }

    /// Hand the driver back, e.g. to shut it down after solving
    pub fn into_driver(self) -> D {
        self.driver
    }

    /// Solve whatever challenge is currently on the surface.
    ///
    /// Scans over the configured detect window first; no challenge means
    /// `Solved { attempts_used: 0 }`, nothing to do is success. The
    /// initial scan shares the first attempt's wall-clock budget.
    #[instrument(skip(self), fields(session = %self.session, surface = %self.surface, max_attempts = self.config.max_attempts))]
    pub async fn solve_if_present(&self) -> SolveResult {
        let run_started = std::time::Instant::now();
        let first_deadline = tokio::time::Instant::now() + self.config.attempt_timeout();

        let initial = tokio::time::timeout_at(
            first_deadline,
            self.detector.scan_with_window(
                &self.driver,
                self.config.detect_window(),
                self.config.detect_interval(),
            ),
        )
        .await;

        let mut attempts_used: u32 = 0;
        // The first attempt runs against the remainder of the initial
        // deadline; every later attempt gets a fresh budget.
        let mut first_window = Some(first_deadline);
        let mut pending: Option<CaptchaChallenge> = match initial {
            Err(_) => {
                let err = Error::AttemptTimeout(self.config.attempt_timeout_ms);
                global_metrics().record_attempt(run_started.elapsed());
                global_metrics().record_error(err.kind());
                warn!("attempt budget spent while still scanning");
                return self.gave_up(1, err);
            }
            Ok(Err(err)) => {
                attempts_used = 1;
                first_window = None;
                global_metrics().record_attempt(run_started.elapsed());
                global_metrics().record_error(err.kind());
                warn!(error = %err, "initial scan failed");
                if attempts_used >= self.config.max_attempts {
                    return self.gave_up(attempts_used, err);
                }
                None
            }
            Ok(Ok(None)) => {
                info!("no challenge on surface");
                global_metrics().record_outcome(true);
                return Ok(Solved { attempts_used: 0 });
            }
            Ok(Ok(Some(challenge))) => Some(challenge),
        };

        loop {
            let challenge = match pending.take() {
                Some(challenge) => challenge,
                // A failed attempt may leave a refreshed challenge, or
                // none at all. Look again before spending another one.
                None => match self.detector.scan(&self.driver).await {
                    Ok(Some(next)) => next,
                    Ok(None) => {
                        info!(attempts_used, "challenge gone after failed attempt");
                        global_metrics().record_outcome(true);
                        return Ok(Solved { attempts_used });
                    }
                    Err(err) => {
                        attempts_used += 1;
                        global_metrics().record_error(err.kind());
                        warn!(attempt = attempts_used, error = %err, "re-scan failed");
                        if attempts_used >= self.config.max_attempts {
                            return self.gave_up(attempts_used, err);
                        }
                        continue;
                    }
                },
            };

            debug!(
                attempt = attempts_used + 1,
                variant = %challenge.variant,
                "starting attempt"
            );
            let attempt_started = std::time::Instant::now();
            let attempt = self.run_attempt(&challenge);
            let outcome = match first_window.take() {
                Some(deadline) => tokio::time::timeout_at(deadline, attempt).await,
                None => tokio::time::timeout(self.config.attempt_timeout(), attempt).await,
            };
            global_metrics().record_attempt(attempt_started.elapsed());

            match outcome {
                Err(_) => {
                    attempts_used += 1;
                    let err = Error::AttemptTimeout(self.config.attempt_timeout_ms);
                    global_metrics().record_error(err.kind());
                    warn!(attempt = attempts_used, "attempt timed out");
                    return self.gave_up(attempts_used, err);
                }
                Ok(Ok(AttemptOutcome::Cleared)) => {
                    attempts_used += 1;
                    info!(attempts_used, "challenge cleared");
                    global_metrics().record_outcome(true);
                    return Ok(Solved { attempts_used });
                }
                Ok(Ok(AttemptOutcome::StillPresent(next))) => {
                    attempts_used += 1;
                    global_metrics().record_error(Error::StillPresent.kind());
                    warn!(attempt = attempts_used, "challenge survived actuation");
                    if attempts_used >= self.config.max_attempts {
                        return self.gave_up(attempts_used, Error::StillPresent);
                    }
                    pending = Some(next);
                }
                Ok(Err(err)) => {
                    attempts_used += 1;
                    global_metrics().record_error(err.kind());
                    warn!(attempt = attempts_used, error = %err, "attempt failed");
                    if attempts_used >= self.config.max_attempts {
                        return self.gave_up(attempts_used, err);
                    }
                }
            }
        }
    }

    /// Extract, solve, actuate, settle, verify. Any `?` here is caught by
    /// the loop above and converted into retry accounting.
    async fn run_attempt(&self, challenge: &CaptchaChallenge) -> Result<AttemptOutcome> {
        let evidence = self.extractor.extract(&self.driver, challenge).await?;
        let solution = self.client.solve(&evidence).await?;
        self.actuator
            .actuate(&self.driver, challenge, &solution)
            .await?;

        // Let the surface process the input and render its verdict
        // before the verification scan.
        tokio::time::sleep(self.config.settle_delay()).await;

        match self.detector.scan(&self.driver).await? {
            None => Ok(AttemptOutcome::Cleared),
            Some(next) => Ok(AttemptOutcome::StillPresent(next)),
        }
    }

    fn gave_up(&self, attempts_used: u32, last_error: Error) -> SolveResult {
        warn!(attempts_used, error = %last_error, "giving up");
        global_metrics().record_outcome(false);
        Err(GaveUp {
            attempts_used,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::Solution;
    use crate::error::ConfigError;
    use crate::geometry::{Marker, Point, Region};
    use async_trait::async_trait;

    struct IdleDriver;

    #[async_trait]
    impl AutomationDriver for IdleDriver {
        async fn capture_image(&self, _region: Option<Region>) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }

        async fn query_presence(&self, _marker: &Marker) -> Result<bool> {
            Ok(false)
        }

        async fn pointer_drag(&self, _from: Point, _to: Point, _duration_ms: u64) -> Result<()> {
            Ok(())
        }

        async fn pointer_click(&self, _point: Point) -> Result<()> {
            Ok(())
        }

        async fn read_text(&self, _marker: &Marker) -> Result<String> {
            Ok(String::new())
        }
    }

    struct IdleClient;

    #[async_trait]
    impl ChallengeSolver for IdleClient {
        async fn solve(&self, _evidence: &crate::challenge::Evidence) -> Result<Solution> {
            Ok(Solution::Rotate { angle: 0.0 })
        }
    }

    #[test]
    fn new_rejects_missing_api_key() {
        let config = SolverConfig::builder().build();
        let err = Orchestrator::new(IdleDriver, IdleClient, Surface::DesktopBrowser, config)
            .err()
            .map(|e| e.to_string())
            .unwrap_or_default();
        assert!(err.contains("API key is required"));
    }

    #[test]
    fn new_rejects_zero_attempts() {
        let config = SolverConfig::builder()
            .api_key("0123456789abcdef0123456789abcdef")
            .max_attempts(0)
            .build();
        let err = Orchestrator::new(IdleDriver, IdleClient, Surface::DesktopBrowser, config)
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(ConfigError::ZeroAttempts)));
    }

    #[tokio::test]
    async fn clear_first_scan_is_success_with_zero_attempts() {
        let config = SolverConfig::builder()
            .api_key("0123456789abcdef0123456789abcdef")
            .detect_window_ms(0)
            .build();
        let orchestrator =
            Orchestrator::new(IdleDriver, IdleClient, Surface::DesktopBrowser, config).unwrap();
        let solved = orchestrator.solve_if_present().await.unwrap();
        assert_eq!(solved.attempts_used, 0);
    }
}
