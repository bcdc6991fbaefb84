mod common;

use ora::*;
use std::time::{Duration, Instant};

#[test]
fn scalar_round_trips() -> Result<()> {
    let (env, ses) = match common::session()? {
        Some(conn) => conn,
        None => return Ok(()),
    };
    let stmt = ses.prep("
        SELECT :1 AS i, :2 AS u, :3 AS f, :4 AS s, :5 AS t, :6 AS n, :7 AS b
          FROM dual
    ")?;
    let ts = Timestamp::new(2021, 7, 4, 13, 14, 15, 0);
    let rset = stmt.qry(&mut [
        (-42i64).into(),
        255u8.into(),
        0.25f64.into(),
        "text".into(),
        ts.into(),
        Option::<i32>::None.into(),
        vec![1u8, 2, 3].into(),
    ])?;
    let row = rset.next_row()?.expect("one row");
    let i : i64 = row.get("I")?;
    let u : u8 = row.get("U")?;
    let f : f64 = row.get("F")?;
    let s : String = row.get("S")?;
    let mut t : Timestamp = row.get("T")?;
    let n : Option<i32> = row.get("N")?;
    let b : Vec<u8> = row.get("B")?;
    assert_eq!(i, -42);
    assert_eq!(u, 255);
    assert_eq!(f, 0.25);
    assert_eq!(s, "text");
    t.tz = None;
    assert_eq!(t, ts);
    assert_eq!(n, None);
    assert!(row.is_null("N")?);
    assert_eq!(b, vec![1, 2, 3]);
    assert!(rset.next_row()?.is_none());
    stmt.close()?;
    env.close()
}

#[test]
fn intervals_and_zones() -> Result<()> {
    let (env, ses) = match common::session()? {
        Some(conn) => conn,
        None => return Ok(()),
    };
    let ym = IntervalYM::new(1, 6);
    let ds = IntervalDS::new(2, 3, 4, 5, 0);
    let ts = Timestamp::new(2020, 2, 29, 23, 0, 0, 500_000_000).with_tz(-5, -30);
    let rset = ses.prep_and_qry("SELECT :1, :2, :3 FROM dual", &mut [ym.into(), ds.into(), ts.into()])?;
    let row = rset.next_row()?.expect("one row");
    let got_ym : IntervalYM = row.get(0)?;
    let got_ds : IntervalDS = row.get(1)?;
    let got_ts : Timestamp = row.get(2)?;
    assert_eq!(got_ym, ym);
    assert_eq!(got_ds, ds);
    assert_eq!(got_ts, ts);
    rset.close()?;
    env.close()
}

#[test]
fn zero_row_select() -> Result<()> {
    let (env, ses) = match common::session()? {
        Some(conn) => conn,
        None => return Ok(()),
    };
    let stmt = ses.prep("SELECT dummy FROM dual WHERE 1 = 0")?;
    let rset = stmt.qry(&mut [])?;
    assert_eq!(rset.columns().len(), 1);
    assert_eq!(rset.columns()[0].name, "DUMMY");
    assert!(rset.next_row()?.is_none());
    assert!(rset.next_row()?.is_none());
    assert_eq!(rset.index(), -1);
    assert!(rset.err().is_none());
    stmt.close()?;
    env.close()
}

#[test]
fn out_args() -> Result<()> {
    let (env, ses) = match common::session()? {
        Some(conn) => conn,
        None => return Ok(()),
    };
    let stmt = ses.prep("
        BEGIN
            :2 := :1 * 2;
            :3 := 'x' || :1;
            :4 := NULL;
        END;
    ")?;
    let mut doubled = 0i64;
    let mut text = String::with_capacity(32);
    let mut nothing = Some(1i32);
    stmt.exe(&mut [21.into(), (&mut doubled).into(), (&mut text).into(), (&mut nothing).into()])?;
    assert_eq!(doubled, 42);
    assert_eq!(text, "x21");
    assert_eq!(nothing, None);
    stmt.close()?;
    env.close()
}

#[test]
fn insert_returning() -> Result<()> {
    let (env, ses) = match common::session()? {
        Some(conn) => conn,
        None => return Ok(()),
    };
    common::drop_table(&ses, "ora_returning");
    ses.prep_and_exe("CREATE TABLE ora_returning (id NUMBER(10) GENERATED ALWAYS AS IDENTITY, name VARCHAR2(10))", &mut [])?;
    let stmt = ses.prep("INSERT INTO ora_returning (name) VALUES (:1) RETURNING id INTO :2")?;
    let (rows, first) = stmt.exec_returning(&mut ["a".into(), Arg::null()])?;
    assert_eq!(rows, 1);
    let (_, second) = stmt.exec_returning(&mut ["b".into(), Arg::null()])?;
    assert_eq!(second, first + 1);
    stmt.close()?;
    let stmt = ses.prep("UPDATE ora_returning SET name = NVL(:1, name) RETURNING id INTO :2")?;
    assert!(stmt.exec_returning(&mut ["c".into(), Arg::null()]).is_err());
    stmt.close()?;
    common::drop_table(&ses, "ora_returning");
    env.close()
}

#[test]
fn statement_config() -> Result<()> {
    let (env, ses) = match common::session()? {
        Some(conn) => conn,
        None => return Ok(()),
    };
    let stmt = ses.prep("SELECT level, 'Y' FROM dual CONNECT BY level <= 10")?;
    stmt.set_cfg(stmt.cfg().set_fetch_len(3)?.set_true_rune('Y'));
    let stmt2 = ses.prep_with("SELECT 2.5, 'Y' FROM dual", &[ColumnType::Str, ColumnType::Bool])?;

    let rset = stmt.qry(&mut [])?;
    let mut sum = 0;
    while let Some(row) = rset.next_row()? {
        let n : i32 = row.get(0)?;
        sum += n;
    }
    assert_eq!(sum, 55);

    let rset = stmt2.qry(&mut [])?;
    let row = rset.next_row()?.expect("one row");
    let num : String = row.get(0)?;
    assert_eq!(num, "2.5");
    let flag : bool = row.get(1)?;
    assert!(!flag);
    env.close()
}

#[test]
fn cancellation() -> Result<()> {
    let (env, ses) = match common::session()? {
        Some(conn) => conn,
        None => return Ok(()),
    };
    let stmt = ses.prep("BEGIN DBMS_SESSION.SLEEP(10); END;")?;
    let token = CancelToken::new();
    token.cancel();
    let ctx = Ctx::new().with_cancel(token);
    assert_eq!(stmt.exe_ctx(&ctx, &mut []), Err(Error::Cancelled));
    // nothing was sent, the session stays usable
    assert!(!ses.is_bad());

    let started = Instant::now();
    let ctx = Ctx::new().with_timeout(Duration::from_millis(500));
    let err = stmt.exe_ctx(&ctx, &mut []).expect_err("interrupted call");
    assert_eq!(err.code(), 1013);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(ses.is_bad());
    env.close()
}

#[test]
fn fetch_cancellation() -> Result<()> {
    let (env, ses) = match common::session()? {
        Some(conn) => conn,
        None => return Ok(()),
    };
    ses.prep_and_exe("
        CREATE OR REPLACE FUNCTION ora_slow_value (n NUMBER, pause NUMBER) RETURN NUMBER IS
        BEGIN
            DBMS_SESSION.SLEEP(pause);
            RETURN n;
        END;
    ", &mut [])?;
    let stmt = ses.prep("
        SELECT ora_slow_value(level, CASE WHEN level <= 3 THEN 0 ELSE 10 END)
          FROM dual
       CONNECT BY level <= 5
    ")?;
    stmt.set_cfg(stmt.cfg().set_fetch_len(1)?.set_prefetch_row_count(1));
    let ctx = Ctx::new().with_timeout(Duration::from_secs(2));
    let rset = stmt.qry_ctx(&ctx, &mut [])?;
    assert!(!ses.is_bad());

    let started = Instant::now();
    let mut num = 0;
    let err = loop {
        match rset.next_row() {
            Ok(Some(_)) => num += 1,
            Ok(None) => panic!("fetched past the slow row"),
            Err(err) => break err,
        }
    };
    assert_eq!(num, 3);
    assert_eq!(err, Error::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(8));
    assert!(ses.is_bad());
    assert_eq!(rset.err(), Some(Error::Cancelled));
    assert!(rset.next_row()?.is_none());
    stmt.close()?;

    let _ = ses.prep_and_exe("DROP FUNCTION ora_slow_value", &mut []);
    env.close()
}

#[test]
fn closed_result_set() -> Result<()> {
    let (env, ses) = match common::session()? {
        Some(conn) => conn,
        None => return Ok(()),
    };
    let stmt = ses.prep("SELECT level FROM dual CONNECT BY level <= 10")?;
    let rset = stmt.qry(&mut [])?;
    let first : i64 = rset.next_row()?.expect("first row").get(0)?;
    assert_eq!(first, 1);
    stmt.close()?;
    assert!(!rset.is_open());
    assert_eq!(rset.next_row().err(), Some(Error::Closed("Rset")));
    assert_eq!(rset.err(), Some(Error::Closed("Rset")));
    assert!(rset.clone().next().is_none());

    // a result set that closed itself at the end keeps reporting the end
    let rset = ses.prep_and_qry("SELECT 1 FROM dual", &mut [])?;
    assert!(rset.next_row()?.is_some());
    assert!(rset.next_row()?.is_none());
    assert!(!rset.is_open());
    assert!(rset.next_row()?.is_none());
    env.close()
}

#[test]
fn pool_drops_bad_session() -> Result<()> {
    common::init_log();
    let (srv_cfg, ses_cfg) = match common::settings() {
        Some(cfg) => cfg,
        None => return Ok(()),
    };
    let env = Env::open()?;
    let pool = Pool::new(&env, srv_cfg, ses_cfg, 2);

    let ses = pool.get()?;
    let name = ses.sys_name().to_string();
    let ctx = Ctx::new().with_timeout(Duration::from_millis(300));
    let stmt = ses.prep("BEGIN DBMS_SESSION.SLEEP(10); END;")?;
    assert_eq!(stmt.exe_ctx(&ctx, &mut []), Err(Error::Cancelled));
    assert!(ses.is_bad());

    ses.close()?;
    assert!(!ses.is_open());
    assert_eq!(pool.num_idle_ses(), 0);
    assert_eq!(env.num_srv(), 0);

    let fresh = pool.get()?;
    assert_ne!(fresh.sys_name(), name);
    assert!(!fresh.is_bad());
    fresh.close()?;
    assert_eq!(pool.num_idle_ses(), 1);

    pool.close()?;
    env.close()
}

#[test]
fn session_extras() -> Result<()> {
    let (env, ses) = match common::session()? {
        Some(conn) => conn,
        None => return Ok(()),
    };
    let version = ses.version()?;
    assert!(version.contains("Oracle"));
    ses.set_action("ora tests", "session_extras")?;
    let rset = ses.prep_and_qry("SELECT SYS_CONTEXT('USERENV', 'MODULE') FROM dual", &mut [])?;
    let module : String = rset.next_row()?.expect("one row").get(0)?;
    assert_eq!(module, "ora tests");
    rset.close()?;

    let srv = ses.srv().expect("server of the session");
    assert_eq!(srv.num_ses(), 1);
    ses.close()?;
    assert!(!ses.is_open());
    assert_eq!(srv.num_ses(), 0);
    assert_eq!(ses.prep("SELECT 1 FROM dual").err(), Some(Error::Closed("Ses")));
    env.close()
}
