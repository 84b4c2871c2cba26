//! The arena: one tournament run streamed to live viewers.
//!
//! [`Arena`] owns the [`StateStore`] and wires the three activities that feed and
//! drain it:
//!
//! - the phase clock, ticking the countdown and moving LOBBY -> ACTIVE -> RESULTS
//! - the interaction scheduler, pairing active agents during ACTIVE and appending the
//!   interactions the generator produces
//! - the broadcast hub, turning every store change into frames for each viewer
//!
//! # Behavior & Configuration
//!
//! Everything is controlled by a [`Configuration`] (phase lengths, tick and scheduling
//! intervals, concurrency and timeout of the generator, history kept for deltas,
//! per-viewer backlog, listening address).
//!
//! RESULTS holds until [`Arena::restart`] is called, unless the configuration enables
//! auto restart. A restart clears the interaction log and reactivates every agent;
//! connected viewers receive a fresh INIT.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tournament_arena::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let roster = StaticDirectory::new(vec![
//!         Agent::new("a1", "Alpha", "ALP"),
//!         Agent::new("a2", "Beta", "BET"),
//!     ]);
//!     let arena = Arena::new(&roster, Arc::new(TemplateGenerator::new()), Configuration::from_env())?;
//!     arena.start()?;
//!     arena.serve().await?;
//!     arena.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{bail, Context};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, trace};

use crate::agent::{AgentId, AgentStatus};
use crate::agent_collector::{collect_agents, AgentDirectory};
use crate::broadcast::BroadcastHub;
use crate::configuration::Configuration;
use crate::interaction_generator::InteractionGenerator;
use crate::logger::init_logger;
use crate::phase_clock::{run_phase_clock, PhaseClock};
use crate::routes::{create_router, AppState};
use crate::state_store::{Mutation, StateStore};
use crate::tournament_scheduler::InteractionScheduler;
use crate::tournament_strategy::LeastRecentPairing;

/// A running (or ready to run) tournament arena.
pub struct Arena {
    config: Configuration,
    store: Arc<StateStore>,
    clock: Arc<Mutex<PhaseClock>>,
    hub: Arc<BroadcastHub>,
    generator: Arc<dyn InteractionGenerator>,
    started: Instant,
    shutdown: Arc<watch::Sender<bool>>,
    tasks: Mutex<JoinSet<()>>,
}

impl Arena {
    /// Load the roster from `directory` and build the arena in LOBBY.
    ///
    /// Nothing runs until [`Arena::start`] is called.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid, the roster cannot be read, or
    /// the logger cannot be installed.
    #[instrument(skip_all)]
    pub fn new(
        directory: &dyn AgentDirectory,
        generator: Arc<dyn InteractionGenerator>,
        config: Configuration,
    ) -> anyhow::Result<Arena> {
        config.validate().context("invalid arena configuration")?;
        if config.log {
            init_logger(true)?;
        }
        trace!(?config);

        let agents = collect_agents(directory).context("could not load the roster")?;
        let clock = PhaseClock::new(
            config.phase_durations,
            config.auto_restart,
            tokio::time::Instant::now().into_std(),
        );
        let store = Arc::new(StateStore::new(
            agents,
            clock.time_left_at(tokio::time::Instant::now().into_std()),
            config.history_capacity,
        ));
        let hub = Arc::new(BroadcastHub::new(
            store.clone(),
            config.viewer_queue_bound,
            config.full_log_updates,
        ));
        let (shutdown, _) = watch::channel(false);

        Ok(Arena {
            config,
            store,
            clock: Arc::new(Mutex::new(clock)),
            hub,
            generator,
            started: Instant::now(),
            shutdown: Arc::new(shutdown),
            tasks: Mutex::new(JoinSet::new()),
        })
    }

    /// Spawn the clock, the scheduler and the hub on the current tokio runtime.
    ///
    /// The lobby countdown starts now.
    pub fn start(&self) -> anyhow::Result<()> {
        let mut tasks = self.tasks.lock().expect("poisoned");
        if !tasks.is_empty() {
            bail!("arena already started");
        }
        if *self.shutdown.borrow() {
            bail!("arena was shut down");
        }

        {
            let mut clock = self.clock.lock().expect("phase clock lock poisoned");
            *clock = PhaseClock::new(
                self.config.phase_durations,
                self.config.auto_restart,
                tokio::time::Instant::now().into_std(),
            );
        }

        tasks.spawn(run_phase_clock(
            self.clock.clone(),
            self.store.clone(),
            self.config.tick_interval,
            self.shutdown.subscribe(),
        ));
        let scheduler = InteractionScheduler::new(
            self.store.clone(),
            self.generator.clone(),
            LeastRecentPairing::new(),
            &self.config,
        );
        tasks.spawn(scheduler.run(self.shutdown.subscribe()));
        tasks.spawn(self.hub.clone().run(self.shutdown.subscribe()));

        info!(
            agents = self.store.agents().len(),
            lobby_secs = self.config.phase_durations.lobby.as_secs(),
            "arena started"
        );
        Ok(())
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Router serving `/ws`, `/health` and `/api/state` for this arena.
    pub fn router(&self) -> Router {
        create_router(AppState {
            store: self.store.clone(),
            hub: self.hub.clone(),
            started: self.started,
        })
    }

    /// Bind the configured address and serve until ctrl-c or [`Arena::shutdown`].
    pub async fn serve(&self) -> anyhow::Result<()> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("could not bind {addr}"))?;
        self.serve_on(listener).await
    }

    /// Serve on an already bound listener until ctrl-c or [`Arena::shutdown`].
    ///
    /// Ctrl-c also shuts the arena down, which closes every viewer connection.
    pub async fn serve_on(&self, listener: TcpListener) -> anyhow::Result<()> {
        info!(addr = %listener.local_addr()?, "arena listening");

        let shutdown = self.shutdown.clone();
        let mut stopped = self.shutdown.subscribe();
        let signal = async move {
            let ctrl_c = async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => info!("ctrl-c received, shutting down"),
                    Err(e) => {
                        // keep serving until an explicit shutdown
                        error!(error = %e, "could not listen for ctrl-c");
                        std::future::pending::<()>().await
                    }
                }
            };
            tokio::select! {
                _ = ctrl_c => {
                    shutdown.send_replace(true);
                }
                _ = stopped.wait_for(|stop| *stop) => {}
            }
        };

        axum::serve(listener, self.router())
            .with_graceful_shutdown(signal)
            .await
            .context("server error")
    }

    /// Start a new run in LOBBY: interaction log cleared, every agent active again.
    ///
    /// Returns the store version of the reset.
    pub fn restart(&self) -> anyhow::Result<u64> {
        let mut clock = self.clock.lock().expect("phase clock lock poisoned");
        let event = clock.restart(tokio::time::Instant::now().into_std());
        let version = self.store.apply_mutation(event.into_mutation())?;
        info!(version, "arena restarted");
        Ok(version)
    }

    /// Change the status of one agent. Only active agents get paired.
    pub fn set_agent_status(
        &self,
        agent_id: impl Into<AgentId>,
        status: AgentStatus,
    ) -> anyhow::Result<u64> {
        let agent_id = agent_id.into();
        let version = self.store.apply_mutation(Mutation::SetAgentStatus {
            agent_id: agent_id.clone(),
            status,
        })?;
        info!(agent = %agent_id, ?status, "agent status changed");
        Ok(version)
    }

    /// Stop every background task and close viewer connections.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let mut tasks = std::mem::take(&mut *self.tasks.lock().expect("poisoned"));
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "arena task failed");
            }
        }
        debug!("arena stopped");
    }
}
