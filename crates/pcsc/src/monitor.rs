//! Card-presence monitor for PC/SC readers

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use pcsc::{Context, ReaderState, Scope, State};
use tracing::{debug, warn};

use crate::error::PcscError;
use crate::event::{CardEvent, CardEventSender};

/// Monitor for card insertion/removal events
///
/// Runs one background thread that polls reader states with a bounded wait
/// and pushes de-duplicated [`CardEvent`]s into a channel. The loop is
/// cancellable: [`stop`](Self::stop) (or drop) signals the thread and joins
/// it, releasing the PC/SC context.
#[allow(missing_debug_implementations)]
pub struct PcscMonitor {
    /// PC/SC context
    context: Context,
    /// Whether the monitor loop should keep running
    running: Arc<Mutex<bool>>,
    /// Handle of the poll thread, if started
    handle: Option<JoinHandle<()>>,
    /// Previously seen reader states (to avoid duplicate events)
    previous_states: Arc<Mutex<HashMap<String, (State, Vec<u8>)>>>,
}

impl PcscMonitor {
    /// Create a new monitor
    pub(crate) fn new(context: Context) -> Result<Self, PcscError> {
        Ok(Self {
            context,
            running: Arc::new(Mutex::new(false)),
            handle: None,
            previous_states: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Create a new monitor with a dedicated context
    pub fn create() -> Result<Self, PcscError> {
        let context = Context::establish(Scope::User)?;
        Self::new(context)
    }

    /// Start watching for card events, pushing them into `sender`
    ///
    /// `poll_interval` bounds each wait on the PC/SC status change call so
    /// the loop notices cancellation promptly.
    pub fn watch_cards(
        &mut self,
        sender: CardEventSender,
        poll_interval: Duration,
    ) -> Result<(), PcscError> {
        let context = self.context.clone();
        let running = Arc::clone(&self.running);
        let previous_states = Arc::clone(&self.previous_states);

        {
            let mut running_guard = running.lock().unwrap();
            if *running_guard {
                return Err(PcscError::Other("monitor already running".to_string()));
            }
            *running_guard = true;
        }

        let handle = thread::spawn(move || {
            debug!("Card presence monitor started");

            loop {
                {
                    let running_guard = running.lock().unwrap();
                    if !*running_guard {
                        break;
                    }
                }

                // Rebuild reader states each pass so hotplugged readers are seen
                let mut reader_states =
                    vec![ReaderState::new(pcsc::PNP_NOTIFICATION(), State::UNAWARE)];
                match context.list_readers_owned() {
                    Ok(readers) => {
                        for reader in readers {
                            reader_states.push(ReaderState::new(reader, State::UNAWARE));
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to list readers while monitoring");
                    }
                }

                for rs in &mut reader_states {
                    rs.sync_current_state();
                }

                if context
                    .get_status_change(Some(poll_interval), &mut reader_states)
                    .is_ok()
                {
                    let mut states = previous_states.lock().unwrap();

                    for rs in &reader_states {
                        let name = rs.name().to_string_lossy().into_owned();
                        let event_state = rs.event_state();

                        // Skip PnP notification
                        if name == pcsc::PNP_NOTIFICATION().to_string_lossy() {
                            continue;
                        }

                        // Card inserted
                        if event_state.contains(State::PRESENT)
                            && !event_state.contains(State::EMPTY)
                        {
                            let atr = rs.atr().to_vec();

                            // New insertion or a different card
                            let is_new_event = match states.get(&name) {
                                Some((prev_state, prev_atr)) => {
                                    !prev_state.contains(State::PRESENT) || *prev_atr != atr
                                }
                                None => true,
                            };

                            if is_new_event {
                                let _ = sender.send(CardEvent::Inserted {
                                    reader: name.clone(),
                                    atr: atr.clone(),
                                });
                                states.insert(name, (event_state, atr));
                            }
                        }
                        // Card removed
                        else if event_state.contains(State::EMPTY) {
                            let is_new_event = match states.get(&name) {
                                Some((prev_state, _)) => prev_state.contains(State::PRESENT),
                                None => false, // Never saw it present
                            };

                            if is_new_event {
                                let _ = sender.send(CardEvent::Removed {
                                    reader: name.clone(),
                                });
                                states.insert(name, (event_state, Vec::new()));
                            }
                        }
                    }
                }

                // Small delay to prevent a tight loop when status returns early
                thread::sleep(Duration::from_millis(10));
            }

            debug!("Card presence monitor stopped");
        });

        self.handle = Some(handle);
        Ok(())
    }

    /// Stop monitoring and join the poll thread
    pub fn stop(&mut self) {
        {
            let mut running_guard = self.running.lock().unwrap();
            *running_guard = false;
        }

        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PcscMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
