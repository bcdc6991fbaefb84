//! Process-wide driver state

use crate::{cfg::StmtCfg, arena::BytesArena};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Driver-wide defaults
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrvCfg {
    /// Statement configuration used by every level that has not set its own
    pub stmt: StmtCfg,
}

/// Handle levels with their own id sequences
#[derive(Debug, Clone, Copy)]
pub(crate) enum Level {
    Env, Srv, Ses, Stmt, Rset, Tx,
}

pub(crate) struct Drv {
    cfg: RwLock<DrvCfg>,
    ids: [AtomicU64; 6],
    pub(crate) arena: BytesArena,
}

impl Drv {
    fn new() -> Self {
        Self {
            cfg: RwLock::new(DrvCfg::default()),
            ids: [
                AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0),
                AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0),
            ],
            arena: BytesArena::new(),
        }
    }

    /// Returns the next id of the level. Ids start at 1.
    pub(crate) fn next_id(&self, level: Level) -> u64 {
        self.ids[level as usize].fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn stmt_cfg(&self) -> StmtCfg {
        self.cfg.read().stmt.clone()
    }
}

pub(crate) static DRV : Lazy<Drv> = Lazy::new(Drv::new);

/// Returns a copy of the driver-wide defaults.
pub fn cfg() -> DrvCfg {
    DRV.cfg.read().clone()
}

/**
    Replaces the driver-wide defaults.

    Levels that have not set their own statement configuration pick up the new one on their next call.

    # Example
    ```
    let mut cfg = ora::cfg();
    cfg.stmt = cfg.stmt.set_prefetch_row_count(500);
    ora::set_cfg(cfg);
    assert_eq!(ora::cfg().stmt.prefetch_row_count(), 500);
    ```
*/
pub fn set_cfg(cfg: DrvCfg) {
    *DRV.cfg.write() = cfg;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_per_level() {
        let drv = Drv::new();
        assert_eq!(drv.next_id(Level::Ses), 1);
        assert_eq!(drv.next_id(Level::Ses), 2);
        assert_eq!(drv.next_id(Level::Stmt), 1);
        assert_eq!(drv.next_id(Level::Tx), 1);
        assert_eq!(drv.next_id(Level::Ses), 3);
    }
}
