use super::*;

/// Pool bookkeeping for one connection identity.
struct Slot<S> {
    /// Admission gate: one permit per concurrent reference allowed.
    gate: Semaphore,
    /// Held for the duration of a dial so one identity dials once at a time.
    dial: Mutex<()>,
    /// Only ever held briefly, never across network I/O.
    state: Mutex<SlotState<S>>,
}

struct SlotState<S> {
    session: Option<Arc<S>>,
    references: usize,
}

impl<S> Slot<S> {
    fn new(max_sessions: usize) -> Self {
        Self {
            gate: Semaphore::new(max_sessions),
            dial: Mutex::new(()),
            state: Mutex::new(SlotState {
                session: None,
                references: 0,
            }),
        }
    }
}

/// Reference-counted SSH connection pool.
///
/// Connections are keyed by [`ConnectionIdentity`]. The first acquire for an
/// identity dials; later acquires share the live session. At most
/// `max_sessions_per_connection` acquisitions may be outstanding per identity,
/// further callers wait until one is released. The session is closed as soon
/// as its last reference is released.
///
/// Waiters are admitted in arrival order.
pub struct ConnectionPool<C: Connector = SshConnector> {
    connector: C,
    config: PoolConfig,
    slots: Mutex<HashMap<ConnectionIdentity, Arc<Slot<C::Session>>>>,
}

impl ConnectionPool<SshConnector> {
    /// Creates a pool that dials real SSH connections with default settings.
    pub fn new() -> Self {
        Self::with_connector(SshConnector::default())
    }
}

impl Default for ConnectionPool<SshConnector> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> ConnectionPool<C> {
    pub fn with_connector(connector: C) -> Self {
        Self {
            connector,
            config: PoolConfig::default(),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a pool with explicit tuning.
    pub fn with_config(connector: C, config: PoolConfig) -> Result<Self, RemoteError> {
        config.validate()?;
        Ok(Self {
            connector,
            config,
            slots: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Gets the pooled session for `descriptor`, dialing if none is live.
    ///
    /// Waits while the identity already has the maximum number of
    /// outstanding references. Every successful call must be paired with
    /// [`ConnectionPool::release`].
    pub async fn acquire(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Arc<C::Session>, RemoteError> {
        descriptor.validate()?;
        let identity = descriptor.identity();

        let slot = {
            let mut slots = self.slots.lock().await;
            slots
                .entry(identity.clone())
                .or_insert_with(|| Arc::new(Slot::new(self.config.max_sessions_per_connection)))
                .clone()
        };

        let result = self.acquire_in(&slot, &identity, descriptor).await;
        drop(slot);
        if result.is_err() {
            self.prune(&identity).await;
        }
        result
    }

    async fn acquire_in(
        &self,
        slot: &Slot<C::Session>,
        identity: &ConnectionIdentity,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Arc<C::Session>, RemoteError> {
        if slot.gate.available_permits() == 0 {
            debug!(
                "{} has {} sessions in use, waiting for a free slot",
                identity, self.config.max_sessions_per_connection
            );
        }
        let permit = slot.gate.acquire().await.map_err(|_| {
            RemoteError::PoolInvariantViolated(format!("admission gate for {identity} closed"))
        })?;

        if let Some(session) = Self::share(slot, identity).await {
            permit.forget();
            return Ok(session);
        }

        let _dialing = slot.dial.lock().await;
        // Someone else may have finished dialing while we waited.
        if let Some(session) = Self::share(slot, identity).await {
            permit.forget();
            return Ok(session);
        }

        debug!("Cache miss, creating new connection for {}...", identity);
        // A failed dial drops the permit, handing the slot to the next waiter.
        let session = self
            .connector
            .connect(descriptor)
            .await
            .map_err(|source| RemoteError::ConnectionFailed {
                addr: identity.to_string(),
                source,
            })?;

        let session = Arc::new(session);
        let mut state = slot.state.lock().await;
        state.session = Some(session.clone());
        state.references += 1;
        permit.forget();
        debug!("New connection for {} has been cached.", identity);
        Ok(session)
    }

    /// Takes a reference on the live session, if there is one.
    async fn share(
        slot: &Slot<C::Session>,
        identity: &ConnectionIdentity,
    ) -> Option<Arc<C::Session>> {
        let mut state = slot.state.lock().await;
        let session = state.session.clone()?;
        state.references += 1;
        debug!("Cache hit: {} ({} references)", identity, state.references);
        Some(session)
    }

    /// Returns one reference taken by [`ConnectionPool::acquire`].
    ///
    /// Dropping the last reference closes the connection. A close failure is
    /// returned as [`RemoteError::ConnectionCloseFailed`]; the session is
    /// gone from the pool either way.
    pub async fn release(&self, descriptor: &ConnectionDescriptor) -> Result<(), RemoteError> {
        let identity = descriptor.identity();
        let slot = {
            let slots = self.slots.lock().await;
            slots.get(&identity).cloned()
        }
        .ok_or_else(|| {
            RemoteError::PoolInvariantViolated(format!(
                "release of {identity} without a matching acquire"
            ))
        })?;

        let closing = {
            let mut state = slot.state.lock().await;
            if state.references == 0 {
                return Err(RemoteError::PoolInvariantViolated(format!(
                    "release of {identity} with no outstanding references"
                )));
            }
            state.references -= 1;
            slot.gate.add_permits(1);
            trace!("{} released ({} references left)", identity, state.references);
            if state.references == 0 {
                state.session.take()
            } else {
                None
            }
        };
        drop(slot);

        let Some(session) = closing else {
            return Ok(());
        };
        self.prune(&identity).await;

        debug!("No references left on {}, closing connection", identity);
        session.close().await.map_err(|source| {
            warn!("Error closing connection {}: {}", identity, source);
            RemoteError::ConnectionCloseFailed {
                addr: identity.to_string(),
                source,
            }
        })
    }

    /// Drops the slot for `identity` if nobody holds or awaits it.
    async fn prune(&self, identity: &ConnectionIdentity) {
        let mut slots = self.slots.lock().await;
        let idle = slots.get(identity).is_some_and(|slot| {
            // Acquirers clone the slot under the map lock, so a single strong
            // reference means no one is between lookup and admission.
            Arc::strong_count(slot) == 1
                && slot
                    .state
                    .try_lock()
                    .is_ok_and(|state| state.session.is_none() && state.references == 0)
        });
        if idle {
            slots.remove(identity);
        }
    }

    /// Outstanding references for the descriptor's identity.
    pub async fn reference_count(&self, descriptor: &ConnectionDescriptor) -> usize {
        let slot = {
            let slots = self.slots.lock().await;
            slots.get(&descriptor.identity()).cloned()
        };
        match slot {
            Some(slot) => slot.state.lock().await.references,
            None => 0,
        }
    }

    /// Whether a live session is pooled for the descriptor's identity.
    pub async fn is_connected(&self, descriptor: &ConnectionDescriptor) -> bool {
        let slot = {
            let slots = self.slots.lock().await;
            slots.get(&descriptor.identity()).cloned()
        };
        match slot {
            Some(slot) => slot.state.lock().await.session.is_some(),
            None => false,
        }
    }

    /// Number of identities with a live session.
    pub async fn len(&self) -> usize {
        let slots: Vec<_> = self.slots.lock().await.values().cloned().collect();
        let mut live = 0;
        for slot in slots {
            if slot.state.lock().await.session.is_some() {
                live += 1;
            }
        }
        live
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
