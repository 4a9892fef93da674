//! Session registry.
//!
//! Maps session names to [`InstrumentSession`] slots. The map lock is only
//! held to locate, insert or remove a slot; each operation then holds that
//! slot's mutex for its whole duration. One operation runs per session at a
//! time while different sessions proceed in parallel.
//!
//! Lock order is map, then slot. The map lock is never requested while a
//! slot lock is held, except by `close()` and failed opens, which remove
//! their own slot and never wait on another one.

use crate::session::{InstrumentSession, SessionInfo, SessionState};
use meter_common::driver::InstrumentDriver;
use meter_common::error::{MeterError, classify};
use meter_common::prelude::MeterResult;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

type Slot = Arc<Mutex<InstrumentSession>>;

/// Outcome of [`SessionRegistry::open`].
#[derive(Debug, Clone, PartialEq)]
pub struct Opened {
    /// Summary of the session.
    pub info: SessionInfo,
    /// False if the session was already open.
    pub newly_opened: bool,
}

/// Named instrument sessions backed by one driver.
pub struct SessionRegistry {
    driver: Arc<dyn InstrumentDriver>,
    sessions: RwLock<HashMap<String, Slot>>,
}

impl SessionRegistry {
    /// Create an empty registry over `driver`.
    pub fn new(driver: Arc<dyn InstrumentDriver>) -> Self {
        Self {
            driver,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Driver behind every session.
    pub fn driver(&self) -> &Arc<dyn InstrumentDriver> {
        &self.driver
    }

    /// Ask the driver which meters are attached and register each name.
    ///
    /// New names become `Unopened` sessions; known names are left alone.
    pub fn enumerate(&self) -> MeterResult<Vec<String>> {
        let names = self
            .driver
            .enumerate_meter_names()
            .map_err(|e| classify(e, "enumerating meters"))?;

        let mut sessions = self.sessions.write();
        for name in &names {
            sessions.entry(name.clone()).or_insert_with(|| {
                debug!("Discovered meter {}", name);
                Arc::new(Mutex::new(InstrumentSession::unopened(name.clone(), true)))
            });
        }
        Ok(names)
    }

    /// Open the named session, creating it if needed.
    ///
    /// Opening an open session returns its current info. A failed open of a
    /// name that was never discovered leaves no trace in the registry.
    pub fn open(&self, name: &str) -> MeterResult<Opened> {
        loop {
            let slot = {
                let mut sessions = self.sessions.write();
                Arc::clone(sessions.entry(name.to_string()).or_insert_with(|| {
                    Arc::new(Mutex::new(InstrumentSession::unopened(name, false)))
                }))
            };

            let mut session = slot.lock();
            match session.state() {
                // Raced with a close or a failed open; the slot is gone from
                // the map, so start over with a fresh one.
                SessionState::Closed => continue,
                SessionState::Unopened => {}
                _ => {
                    return Ok(Opened {
                        info: session.info(),
                        newly_opened: false,
                    });
                }
            }

            return match session.open(self.driver.as_ref()) {
                Ok(()) => Ok(Opened {
                    info: session.info(),
                    newly_opened: true,
                }),
                Err(e) => {
                    warn!("Failed to open meter {}: {}", name, e);
                    if !session.is_discovered() {
                        session.abandon();
                        self.remove_slot(name, &slot);
                    }
                    Err(e)
                }
            };
        }
    }

    /// Run `f` on an open session.
    ///
    /// `NotFound` if no session has this name or it was never opened;
    /// `Invalid` if it was closed while the caller waited.
    pub fn with_session<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut InstrumentSession) -> MeterResult<T>,
    ) -> MeterResult<T> {
        let slot = self.slot(name)?;
        let mut session = slot.lock();
        match session.state() {
            SessionState::Unopened => Err(MeterError::not_found(format!(
                "session {name} has not been opened"
            ))),
            SessionState::Closed => Err(MeterError::invalid(format!("session {name} closed"))),
            _ => f(&mut *session),
        }
    }

    /// Close and remove the named session. Idempotent.
    ///
    /// Unknown and never-opened names are a no-op.
    pub fn close(&self, name: &str) -> MeterResult<()> {
        let Ok(slot) = self.slot(name) else {
            debug!("Close of unknown session {} ignored", name);
            return Ok(());
        };
        let mut session = slot.lock();
        if !session.is_open() {
            return Ok(());
        }
        let result = session.close();
        self.remove_slot(name, &slot);
        result
    }

    /// Close every session. Errors are logged, not returned.
    pub fn close_all(&self) {
        let drained: Vec<(String, Slot)> = self.sessions.write().drain().collect();
        if drained.is_empty() {
            return;
        }
        info!("Closing {} sessions", drained.len());
        for (name, slot) in drained {
            if let Err(e) = slot.lock().close() {
                warn!("Failed to close meter {}: {}", name, e);
            }
        }
    }

    /// Summary of the named session, opened or not.
    pub fn info(&self, name: &str) -> MeterResult<SessionInfo> {
        Ok(self.slot(name)?.lock().info())
    }

    /// Name and state of every session, sorted by name.
    ///
    /// Waits for any operation in flight on a session to finish.
    pub fn sessions(&self) -> Vec<(String, SessionState)> {
        let slots: Vec<(String, Slot)> = self
            .sessions
            .read()
            .iter()
            .map(|(name, slot)| (name.clone(), Arc::clone(slot)))
            .collect();
        let mut listing: Vec<(String, SessionState)> = slots
            .into_iter()
            .map(|(name, slot)| {
                let state = slot.lock().state();
                (name, state)
            })
            .collect();
        listing.sort_by(|a, b| a.0.cmp(&b.0));
        listing
    }

    /// True if a session with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.sessions.read().contains_key(name)
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// True if no session is registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    fn slot(&self, name: &str) -> MeterResult<Slot> {
        self.sessions
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| MeterError::not_found(format!("no session named {name}")))
    }

    fn remove_slot(&self, name: &str, slot: &Slot) {
        let mut sessions = self.sessions.write();
        if sessions.get(name).is_some_and(|s| Arc::ptr_eq(s, slot)) {
            sessions.remove(name);
        }
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.close_all();
    }
}
