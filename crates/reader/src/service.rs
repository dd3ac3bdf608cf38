//! The reader service façade
//!
//! Owns the PC/SC manager, the presence monitor and the shared session
//! state, and exposes the three operations callers use: observe status,
//! subscribe to status changes and read the identity record off the seated
//! card. Reader disappearance is a status change, never an error surfaced
//! to subscribers.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use mykad_apdu_core::TransportError;
use mykad_transport_pcsc::event::{CardEventReceiver, card_event_channel};
use mykad_transport_pcsc::{CardEvent, PcscDeviceManager, PcscError, PcscMonitor};
use tracing::{debug, info, warn};

use crate::config::ReaderConfig;
use crate::error::Error;
use crate::record::IdentityRecord;
use crate::session::{CardSession, SessionState};
use crate::status::{ReaderStatus, StatusReporter};

const MSG_NO_READERS: &str = "No smart card readers found";
const MSG_WAITING: &str = "Reader ready - waiting for MyKad";
const MSG_CARD_READY: &str = "MyKad detected and ready to read";

/// Long-lived service coordinating one reader
///
/// Construct once, call [`start`](Self::start) to begin presence
/// monitoring, then read identities on demand. Reads are serialized; a
/// second caller gets [`Error::ReaderBusy`] instead of queueing.
#[allow(missing_debug_implementations)]
pub struct ReaderService {
    manager: PcscDeviceManager,
    monitor: Option<PcscMonitor>,
    config: ReaderConfig,
    reporter: Arc<StatusReporter>,
    state: Arc<Mutex<SessionState>>,
    reader_name: Arc<Mutex<Option<String>>>,
    read_lock: Mutex<()>,
    pump: Option<JoinHandle<()>>,
    pump_running: Arc<Mutex<bool>>,
}

impl ReaderService {
    /// Create a service over the platform PC/SC stack
    pub fn new(config: ReaderConfig) -> Result<Self, Error> {
        let manager = PcscDeviceManager::new().map_err(map_pcsc)?;
        let service = Self {
            manager,
            monitor: None,
            config,
            reporter: Arc::new(StatusReporter::new(ReaderStatus::disconnected(
                MSG_NO_READERS,
            ))),
            state: Arc::new(Mutex::new(SessionState::Disconnected)),
            reader_name: Arc::new(Mutex::new(None)),
            read_lock: Mutex::new(()),
            pump: None,
            pump_running: Arc::new(Mutex::new(false)),
        };
        service.refresh_presence();
        Ok(service)
    }

    /// Latest published status
    pub fn status(&self) -> ReaderStatus {
        self.reporter.current()
    }

    /// Subscribe to status changes, primed with the current status
    pub fn subscribe(&self) -> Receiver<ReaderStatus> {
        self.reporter.subscribe()
    }

    /// Start presence monitoring
    ///
    /// Spawns the PC/SC monitor thread and an event pump that keeps the
    /// session state and published status in step with card and reader
    /// movement. Idempotent failure: starting twice is an error.
    pub fn start(&mut self) -> Result<(), Error> {
        if self.monitor.is_some() {
            return Err(Error::Transport(TransportError::Other(
                "service already started".into(),
            )));
        }

        let mut monitor = self.manager.monitor().map_err(map_pcsc)?;
        let (sender, receiver) = card_event_channel();
        monitor
            .watch_cards(sender, self.config.poll_interval)
            .map_err(map_pcsc)?;
        self.monitor = Some(monitor);

        {
            let mut running = self.pump_running.lock().unwrap();
            *running = true;
        }

        let pump_manager = PcscDeviceManager::new().map_err(map_pcsc)?;
        self.pump = Some(self.spawn_pump(pump_manager, receiver));
        info!("Reader service started");
        Ok(())
    }

    /// Stop presence monitoring and join the worker threads
    pub fn stop(&mut self) {
        {
            let mut running = self.pump_running.lock().unwrap();
            *running = false;
        }
        if let Some(handle) = self.pump.take() {
            let _ = handle.join();
        }
        if let Some(mut monitor) = self.monitor.take() {
            monitor.stop();
        }
        debug!("Reader service stopped");
    }

    /// Read and decode the identity record from the seated card
    ///
    /// Serialized against concurrent callers; a read while another is in
    /// flight fails fast with [`Error::ReaderBusy`]. The session state is
    /// settled on every exit path, so a failed read leaves the service
    /// ready for the next attempt.
    pub fn read_identity(&self) -> Result<IdentityRecord, Error> {
        let Ok(_guard) = self.read_lock.try_lock() else {
            return Err(Error::ReaderBusy);
        };

        self.refresh_presence();

        let mut transport = self
            .manager
            .connect_strategy(&self.config.strategy, self.config.pcsc.clone())
            .map_err(map_pcsc)?;
        let name = transport.reader_name().to_string();
        *self.reader_name.lock().unwrap() = Some(name.clone());

        CardSession::new(&mut transport, &self.config, &self.reporter, &name).run(&self.state)
    }

    /// Re-derive session state from the actual reader population
    fn refresh_presence(&self) {
        match self.manager.list_readers() {
            Ok(readers) => {
                let card_seated = readers.iter().any(|r| r.has_card());
                let name = readers
                    .iter()
                    .find(|r| r.has_card())
                    .unwrap_or(&readers[0])
                    .name()
                    .to_string();

                let mut state = self.state.lock().unwrap();
                let next = if card_seated {
                    state.on_connected().on_card_inserted()
                } else {
                    state.on_connected().on_card_removed()
                };
                let changed = next != *state;
                *state = next;
                drop(state);

                *self.reader_name.lock().unwrap() = Some(name.clone());
                if changed {
                    self.reporter.publish(if card_seated {
                        ReaderStatus::card_present(name, MSG_CARD_READY)
                    } else {
                        ReaderStatus::idle(name, MSG_WAITING)
                    });
                }
            }
            Err(err) => {
                debug!(error = %err, "No usable readers");
                let mut state = self.state.lock().unwrap();
                let changed = *state != SessionState::Disconnected;
                *state = state.on_disconnected();
                drop(state);

                *self.reader_name.lock().unwrap() = None;
                if changed {
                    self.reporter.publish(ReaderStatus::disconnected(MSG_NO_READERS));
                }
            }
        }
    }

    fn spawn_pump(
        &self,
        pump_manager: PcscDeviceManager,
        receiver: CardEventReceiver,
    ) -> JoinHandle<()> {
        let running = Arc::clone(&self.pump_running);
        let state = Arc::clone(&self.state);
        let reader_name = Arc::clone(&self.reader_name);
        let reporter = Arc::clone(&self.reporter);
        let poll_interval = self.config.poll_interval;

        thread::spawn(move || {
            debug!("Status pump started");
            loop {
                if !*running.lock().unwrap() {
                    break;
                }

                match receiver.recv_timeout(poll_interval) {
                    Ok(CardEvent::Inserted { reader, .. }) => {
                        info!(reader = %reader, "Card inserted");
                        {
                            let mut guard = state.lock().unwrap();
                            *guard = guard.on_connected().on_card_inserted();
                        }
                        *reader_name.lock().unwrap() = Some(reader.clone());
                        reporter.publish(ReaderStatus::card_present(reader, MSG_CARD_READY));
                    }
                    Ok(CardEvent::Removed { reader }) => {
                        info!(reader = %reader, "Card removed");
                        {
                            let mut guard = state.lock().unwrap();
                            *guard = guard.on_card_removed();
                        }
                        reporter.publish(ReaderStatus::idle(reader, MSG_WAITING));
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        // Quiet interval: reconcile against reader hotplug,
                        // which the card-event stream does not carry.
                        match pump_manager.list_readers() {
                            Ok(readers) => {
                                let mut guard = state.lock().unwrap();
                                if *guard == SessionState::Disconnected {
                                    *guard = guard.on_connected();
                                    drop(guard);
                                    let name = readers[0].name().to_string();
                                    *reader_name.lock().unwrap() = Some(name.clone());
                                    reporter.publish(ReaderStatus::idle(name, MSG_WAITING));
                                }
                            }
                            Err(_) => {
                                let mut guard = state.lock().unwrap();
                                if *guard != SessionState::Disconnected {
                                    warn!("All readers disappeared");
                                    *guard = guard.on_disconnected();
                                    drop(guard);
                                    *reader_name.lock().unwrap() = None;
                                    reporter.publish(ReaderStatus::disconnected(MSG_NO_READERS));
                                }
                            }
                        }
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            debug!("Status pump stopped");
        })
    }
}

impl Drop for ReaderService {
    fn drop(&mut self) {
        self.stop();
    }
}

fn map_pcsc(err: PcscError) -> Error {
    match err {
        PcscError::NoReadersAvailable | PcscError::ReaderNotFound(_) => Error::ReaderUnavailable,
        PcscError::ReaderBusy(_) => Error::ReaderBusy,
        PcscError::NoCard(_) => Error::CardAbsent,
        other => Error::Transport(TransportError::from(other)),
    }
}
