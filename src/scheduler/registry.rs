use super::{
    ComputationScheduler, IoScheduler, NewThreadScheduler, SchedulerKind, SchedulerRef,
    SingleScheduler, TrampolineScheduler,
};
use crate::config::SchedulerConfig;
use crate::error::{RxError, RxResult};
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};

#[derive(Default)]
struct Pools {
    computation: Option<SchedulerRef>,
    io: Option<SchedulerRef>,
    new_thread: Option<SchedulerRef>,
    single: Option<SchedulerRef>,
}

struct Registry {
    config: Mutex<SchedulerConfig>,
    pools: Mutex<Pools>,
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| Registry {
        config: Mutex::new(SchedulerConfig::default()),
        pools: Mutex::new(Pools::default()),
    })
}

/// Process-wide scheduler pools.
///
/// Each kind is created on first use from the current [`SchedulerConfig`].
/// `shutdown` stops every pool; the next access creates a fresh one.
pub struct Schedulers;

impl Schedulers {
    /// Replace the configuration. Pools already running are stopped so the
    /// next access picks the new settings up.
    pub fn init(cfg: SchedulerConfig) {
        *registry().config.lock() = cfg;
        Self::shutdown();
    }

    pub fn config() -> SchedulerConfig {
        registry().config.lock().clone()
    }

    pub fn computation() -> SchedulerRef {
        Self::pool(|p| &mut p.computation, |cfg| {
            match ComputationScheduler::new(cfg) {
                Ok(s) => Arc::new(s),
                Err(err) => {
                    tracing::error!("computation pool unavailable, using trampoline: {}", err);
                    Arc::new(TrampolineScheduler)
                }
            }
        })
    }

    pub fn io() -> SchedulerRef {
        Self::pool(|p| &mut p.io, |cfg| Arc::new(IoScheduler::new(cfg)))
    }

    pub fn new_thread() -> SchedulerRef {
        Self::pool(|p| &mut p.new_thread, |cfg| {
            Arc::new(NewThreadScheduler::new(&cfg.thread_name_prefix))
        })
    }

    pub fn single() -> SchedulerRef {
        Self::pool(|p| &mut p.single, |cfg| {
            match SingleScheduler::new(&cfg.thread_name_prefix) {
                Ok(s) => Arc::new(s),
                Err(err) => {
                    tracing::error!("single scheduler unavailable, using trampoline: {}", err);
                    Arc::new(TrampolineScheduler)
                }
            }
        })
    }

    pub fn trampoline() -> SchedulerRef {
        Arc::new(TrampolineScheduler)
    }

    /// Look a scheduler up by kind. Test schedulers are not global and must
    /// be constructed directly.
    pub fn get(kind: SchedulerKind) -> RxResult<SchedulerRef> {
        match kind {
            SchedulerKind::Computation => Ok(Self::computation()),
            SchedulerKind::Io => Ok(Self::io()),
            SchedulerKind::NewThread => Ok(Self::new_thread()),
            SchedulerKind::Single => Ok(Self::single()),
            SchedulerKind::Trampoline => Ok(Self::trampoline()),
            SchedulerKind::Test => Err(RxError::configuration(
                "test scheduler has no global instance",
            )),
        }
    }

    /// Stop every running pool.
    pub fn shutdown() {
        let pools = std::mem::take(&mut *registry().pools.lock());
        for pool in [pools.computation, pools.io, pools.new_thread, pools.single]
            .into_iter()
            .flatten()
        {
            pool.shutdown();
        }
    }

    fn pool<S, C>(slot: S, create: C) -> SchedulerRef
    where
        S: FnOnce(&mut Pools) -> &mut Option<SchedulerRef>,
        C: FnOnce(&SchedulerConfig) -> SchedulerRef,
    {
        let cfg = Self::config();
        let mut pools = registry().pools.lock();
        slot(&mut pools).get_or_insert_with(|| create(&cfg)).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_kind() {
        assert_eq!(Schedulers::get(SchedulerKind::Trampoline).unwrap().kind(), SchedulerKind::Trampoline);
        assert_eq!(Schedulers::get(SchedulerKind::Computation).unwrap().kind(), SchedulerKind::Computation);
        assert!(Arc::ptr_eq(&Schedulers::io(), &Schedulers::io()));
        assert!(Schedulers::get(SchedulerKind::Test).is_err());
    }
}
