//! Connection helpers shared by the database tests

#![allow(dead_code)]

use ora::{Env, Ses, SrvCfg, SesCfg, Result};
use std::env;

/// Connection settings from `DBNAME`, `DBUSER` and `DBPASS`. `None` when `DBNAME` is not set.
pub fn settings() -> Option<(SrvCfg, SesCfg)> {
    let dbname = env::var("DBNAME").ok()?;
    let dbuser = env::var("DBUSER").unwrap_or_default();
    let dbpass = env::var("DBPASS").unwrap_or_default();
    Some( (SrvCfg::new(&dbname), SesCfg::new(&dbuser, &dbpass)) )
}

pub fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Opens an environment and a session in it. `None` when the database is not configured.
pub fn session() -> Result<Option<(Env, Ses)>> {
    init_log();
    let (srv_cfg, ses_cfg) = match settings() {
        Some(cfg) => cfg,
        None => return Ok(None),
    };
    let env = Env::open()?;
    let srv = env.open_srv(&srv_cfg)?;
    let ses = srv.open_ses(&ses_cfg)?;
    Ok( Some( (env, ses) ) )
}

/// Runs DDL that may fail because the object does not exist.
pub fn drop_table(ses: &Ses, name: &str) {
    let _ = ses.prep_and_exe(&format!("DROP TABLE {} PURGE", name), &mut []);
}
