//! The process-wide platform pointer
//!
//! A [`PlatformSlot`] holds the platform every component posts work to.
//! The harness uses the single [`PlatformSlot::process`] slot; tests that want
//! isolation from each other build their own.
//!
//! Every change of the pointer goes through [`PlatformSlot::swap`] and is
//! counted, so the quiescence protocol can be checked for exactly one swap.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::{Platform, PlatformError};

static PROCESS_SLOT: PlatformSlot = PlatformSlot::new();

pub struct PlatformSlot {
    current: RwLock<Option<Arc<dyn Platform>>>,
    swaps: AtomicUsize,
}

impl std::fmt::Debug for PlatformSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformSlot")
            .field("installed", &self.current.read().is_some())
            .field("swaps", &self.swaps())
            .finish()
    }
}

impl Default for PlatformSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformSlot {
    /// Create an empty slot.
    pub const fn new() -> Self {
        Self {
            current: RwLock::new(None),
            swaps: AtomicUsize::new(0),
        }
    }

    /// The slot shared by the whole process.
    pub fn process() -> &'static PlatformSlot {
        &PROCESS_SLOT
    }

    /// Install the first platform. Fails if one is already installed.
    pub fn install(&self, platform: Arc<dyn Platform>) -> Result<(), PlatformError> {
        let mut current = self.current.write();
        if current.is_some() {
            return Err(PlatformError::AlreadyInstalled);
        }
        *current = Some(platform);
        self.swaps.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("platform installed");
        Ok(())
    }

    /// Remove and return the installed platform.
    pub fn uninstall(&self) -> Result<Arc<dyn Platform>, PlatformError> {
        let previous = self.current.write().take().ok_or(PlatformError::NoPlatform)?;
        self.swaps.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("platform uninstalled");
        Ok(previous)
    }

    /// Replace the installed platform, returning the one it replaced.
    pub fn swap(&self, platform: Arc<dyn Platform>) -> Result<Arc<dyn Platform>, PlatformError> {
        let mut current = self.current.write();
        let Some(previous) = current.take() else {
            return Err(PlatformError::NoPlatform);
        };
        *current = Some(platform);
        self.swaps.fetch_add(1, Ordering::SeqCst);
        Ok(previous)
    }

    /// The installed platform.
    pub fn current(&self) -> Result<Arc<dyn Platform>, PlatformError> {
        self.current.read().clone().ok_or(PlatformError::NoPlatform)
    }

    /// Whether `platform` is the installed platform (by object identity).
    pub fn is_current<P: Platform + ?Sized>(&self, platform: &P) -> bool {
        self.current
            .read()
            .as_ref()
            .is_some_and(|current| std::ptr::addr_eq(Arc::as_ptr(current), platform as *const P))
    }

    pub fn is_installed(&self) -> bool {
        self.current.read().is_some()
    }

    /// Number of times the pointer has changed.
    pub fn swaps(&self) -> usize {
        self.swaps.load(Ordering::SeqCst)
    }
}
