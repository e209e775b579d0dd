//! Periodic drivers.
//!
//! Each driver owns one role's loop: a single task that runs one full cycle,
//! then sleeps for the configured period. Relay failures abort the cycle
//! with in-memory state untouched and stretch the next sleep (capped
//! doubling); a shutdown signal is honored between cycles, never mid-cycle,
//! so the relay is never left partially drained.

use std::time::Duration;

use covermix_crypto::{CryptoError, MixerKeySet};
use covermix_proto::Direction;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::{
    agent::{Agent, IncomingMessage},
    env::Environment,
    mixer::{ConfigError, MixBatcher, MixConfig},
    relay::{RelayClient, RelayError},
};

/// Longest backoff multiplier applied to the cycle period after repeated
/// relay failures.
const MAX_BACKOFF_FACTOR: u32 = 8;

/// A failed cycle. Always recoverable: the next tick retries.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The relay rejected or failed an operation.
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// Envelope construction failed; indicates a bug or bad key material.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Sleep/backoff bookkeeping shared by both drivers.
struct Cadence {
    period: Duration,
    factor: u32,
}

impl Cadence {
    fn new(period: Duration) -> Self {
        Self { period, factor: 1 }
    }

    fn succeed(&mut self) -> Duration {
        self.factor = 1;
        self.period
    }

    fn fail(&mut self) -> Duration {
        self.factor = (self.factor * 2).min(MAX_BACKOFF_FACTOR);
        self.period * self.factor
    }
}

/// Wait out `delay` unless shutdown is signalled first.
///
/// Returns `true` when the loop should exit.
async fn sleep_or_shutdown(
    env: &impl Environment,
    shutdown: &mut watch::Receiver<bool>,
    delay: Duration,
) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
        () = env.sleep(delay) => false,
    }
}

/// The mixer's periodic loop: both directional lanes, advanced every cycle.
pub struct MixerDriver<R, E> {
    relay: R,
    env: E,
    keys: MixerKeySet,
    lanes: [MixBatcher; 2],
    cadence: Cadence,
    shutdown: watch::Receiver<bool>,
}

impl<R, E> MixerDriver<R, E>
where
    R: RelayClient,
    E: Environment,
{
    /// Build a driver with one batcher per direction.
    pub fn new(
        relay: R,
        env: E,
        keys: MixerKeySet,
        config: MixConfig,
        period: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, ConfigError> {
        let lanes = [
            MixBatcher::new(Direction::SourceToContact, config)?,
            MixBatcher::new(Direction::ContactToSource, config)?,
        ];
        Ok(Self { relay, env, keys, lanes, cadence: Cadence::new(period), shutdown })
    }

    /// Run until shutdown. Each lane is processed independently; a failure
    /// in one does not block the other.
    pub async fn run(mut self) {
        tracing::info!("mixer driver started");

        loop {
            let mut failed = false;
            for lane_index in 0..self.lanes.len() {
                if let Err(error) = self.cycle(lane_index).await {
                    let direction = self.lanes[lane_index].direction();
                    tracing::warn!(%direction, %error, "mix cycle aborted; will retry");
                    failed = true;
                }
            }

            let delay = if failed { self.cadence.fail() } else { self.cadence.succeed() };
            if sleep_or_shutdown(&self.env, &mut self.shutdown, delay).await {
                break;
            }
        }

        tracing::info!("mixer driver stopped");
    }

    /// One lane's cycle: confirm stale deletes, collect, batch, emit.
    async fn cycle(&mut self, lane_index: usize) -> Result<(), DriverError> {
        let lane = &mut self.lanes[lane_index];
        let direction = lane.direction();

        // Deletes from an earlier cycle must confirm before anything else;
        // until then the relay still owns those envelopes.
        for id in lane.unconfirmed_deletes() {
            self.relay.delete(direction, id).await?;
            lane.confirm_delete(id);
        }

        let arrivals = self.relay.fetch_oldest(direction, lane.fetch_count()).await?;
        let absorbed = lane.absorb(arrivals);
        tracing::debug!(%direction, absorbed, buffered = lane.buffered(), "collected");

        let Some(plan) = lane.plan(&self.keys, &mut self.env.rng())? else {
            return Ok(());
        };

        // Output first, then delete the consumed inputs: a crash in between
        // duplicates work, never loses it.
        self.relay.post_batch(direction, plan.outputs).await?;

        let stats = plan.stats;
        for id in lane.commit() {
            match self.relay.delete(direction, id).await {
                Ok(()) => lane.confirm_delete(id),
                Err(error) => {
                    tracing::warn!(%direction, id, %error, "delete unconfirmed; parked for retry");
                },
            }
        }

        tracing::info!(
            %direction,
            drained = stats.drained,
            real = stats.real,
            fillers = stats.fillers,
            dummies = stats.dummies,
            invalid = stats.invalid,
            "emitted batch"
        );
        Ok(())
    }
}

/// A source or contact agent's periodic loop.
///
/// Fresh decoded messages flow out through `inbox`; application content to
/// send flows in through `commands` and is queued at the top of each cycle.
pub struct AgentDriver<A: Agent, R, E> {
    agent: A,
    relay: R,
    env: E,
    cadence: Cadence,
    shutdown: watch::Receiver<bool>,
    inbox: mpsc::Sender<IncomingMessage>,
    commands: mpsc::Receiver<A::Outbound>,
}

impl<A, R, E> AgentDriver<A, R, E>
where
    A: Agent,
    R: RelayClient,
    E: Environment,
{
    /// Build a driver around an agent state machine.
    pub fn new(
        agent: A,
        relay: R,
        env: E,
        period: Duration,
        shutdown: watch::Receiver<bool>,
        inbox: mpsc::Sender<IncomingMessage>,
        commands: mpsc::Receiver<A::Outbound>,
    ) -> Self {
        Self { agent, relay, env, cadence: Cadence::new(period), shutdown, inbox, commands }
    }

    /// Run until shutdown.
    pub async fn run(mut self) {
        tracing::info!("agent driver started");

        loop {
            while let Ok(item) = self.commands.try_recv() {
                if let Err(error) = self.agent.queue(item) {
                    tracing::error!(%error, "rejected outbound content");
                }
            }

            let delay = match self.cycle().await {
                Ok(()) => self.cadence.succeed(),
                Err(error) => {
                    tracing::warn!(%error, "agent cycle aborted; will retry");
                    self.cadence.fail()
                },
            };

            if sleep_or_shutdown(&self.env, &mut self.shutdown, delay).await {
                break;
            }
        }

        tracing::info!("agent driver stopped");
    }

    async fn cycle(&mut self) -> Result<(), DriverError> {
        let drops = self.relay.fetch_deaddrop(self.agent.inbound_direction()).await?;
        let report = self.agent.receive(&drops);
        tracing::debug!(
            fetched = report.fetched,
            decoded = report.decoded,
            fresh = report.fresh.len(),
            "deaddrop polled"
        );

        for message in report.fresh {
            // The application side may have gone away; cover traffic
            // continues regardless.
            let _ = self.inbox.send(message).await;
        }

        let outbound = self.agent.compose(&mut self.env.rng())?;
        for envelope in outbound {
            self.relay.enqueue(self.agent.outbound_direction(), envelope).await?;
        }

        Ok(())
    }
}
