use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::{Arc, Mutex};

/// Random source shared by exploration scoring and weighted selection
///
/// Seeded sources replay the same sequence on every process start; unseeded
/// ones draw their seed from the OS.
pub type SharedRng = Arc<Mutex<StdRng>>;

pub fn shared_rng(seed: Option<u64>) -> SharedRng {
    let rng = match seed {
        Some(seed) => {
            tracing::info!(seed, "Using seeded random source");
            StdRng::seed_from_u64(seed)
        }
        None => StdRng::from_entropy(),
    };
    Arc::new(Mutex::new(rng))
}

/// Runs `f` with exclusive access to the generator
pub fn with_rng<T>(rng: &SharedRng, f: impl FnOnce(&mut StdRng) -> T) -> T {
    // A panic while holding the lock cannot leave a StdRng in an invalid state
    let mut guard = rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut guard)
}
