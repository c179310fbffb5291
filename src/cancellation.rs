//! Cancellation framework: CancellationToken + session generation.
//! Each session gets a fresh token and generation number; delivering a result is gated on
//! the token under a per-session lock, so a cancelled worker can never publish again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

/// Issues session tokens. Advancing cancels whatever was issued before.
pub struct SessionGeneration {
    current_token: RwLock<CancellationToken>,
    generation: AtomicU64,
}

impl SessionGeneration {
    pub fn new() -> Self {
        Self {
            current_token: RwLock::new(CancellationToken::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Cancel the current generation, advance, and return a guard for the new one.
    pub fn cancel_and_advance(&self) -> SessionGuard {
        let mut token_guard = self.current_token.write();
        token_guard.cancel();
        let new_root = CancellationToken::new();
        let child = new_root.child_token();
        *token_guard = new_root;
        let gen = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        SessionGuard::new(gen, child)
    }

    /// Read current generation.
    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

impl Default for SessionGeneration {
    fn default() -> Self {
        Self::new()
    }
}

/// Held by a session worker and by whoever may stop it.
#[derive(Clone)]
pub struct SessionGuard {
    generation: u64,
    token: CancellationToken,
    delivery: Arc<Mutex<()>>,
}

impl SessionGuard {
    pub fn new(generation: u64, token: CancellationToken) -> Self {
        Self {
            generation,
            token,
            delivery: Arc::new(Mutex::new(())),
        }
    }

    /// A guard not tied to any generation (single-shot requests).
    pub fn detached() -> Self {
        Self::new(0, CancellationToken::new())
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Cancel, waiting for any in-flight delivery to finish first.
    pub fn cancel(&self) {
        let _lock = self.delivery.lock();
        self.token.cancel();
    }

    /// Run `deliver` unless cancelled. Returns whether it ran.
    pub fn deliver_if_current<F: FnOnce()>(&self, deliver: F) -> bool {
        let _lock = self.delivery.lock();
        if self.token.is_cancelled() {
            return false;
        }
        deliver();
        true
    }
}
