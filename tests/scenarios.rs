mod common;

use ora::*;
use std::io::{Read, Write};

/// Selects a ROWID and uses it to find the row again.
#[test]
fn rowid_round_trip() -> Result<()> {
    let (env, ses) = match common::session()? {
        Some(conn) => conn,
        None => return Ok(()),
    };
    common::drop_table(&ses, "ora_rowid");
    ses.prep_and_exe("CREATE TABLE ora_rowid (id NUMBER(10), name VARCHAR2(30))", &mut [])?;
    ses.prep_and_exe("INSERT INTO ora_rowid (id, name) VALUES (:1, :2)", &mut [1.into(), "first".into()])?;

    let rset = ses.prep_and_qry("SELECT ROWID, name FROM ora_rowid WHERE id = :1", &mut [1.into()])?;
    let row = rset.next_row()?.expect("inserted row");
    let rowid : String = row.get(0)?;
    assert_eq!(rowid.len(), 18);
    assert!(rset.next_row()?.is_none());
    assert!(!rset.is_open());

    let num = ses.prep_and_exe("UPDATE ora_rowid SET name = :1 WHERE ROWID = :2", &mut ["second".into(), rowid.clone().into()])?;
    assert_eq!(num, 1);

    let rset = ses.prep_and_qry("SELECT name FROM ora_rowid WHERE ROWID = :1", &mut [rowid.into()])?;
    let name : String = rset.next_row()?.expect("updated row").get("NAME")?;
    assert_eq!(name, "second");
    rset.close()?;

    common::drop_table(&ses, "ora_rowid");
    assert_eq!(ses.num_stmt(), 0);
    env.close()
}

/// Inserts a million rows with one execute.
#[test]
fn array_insert() -> Result<()> {
    const NUM_ROWS : usize = 1_000_000;
    let (env, ses) = match common::session()? {
        Some(conn) => conn,
        None => return Ok(()),
    };
    common::drop_table(&ses, "ora_array");
    ses.prep_and_exe("CREATE TABLE ora_array (id NUMBER(10), name VARCHAR2(20), amount BINARY_DOUBLE)", &mut [])?;

    let ids : Vec<i64> = (0..NUM_ROWS as i64).collect();
    let names : Vec<String> = ids.iter().map(|id| format!("row {}", id)).collect();
    let amounts : Vec<Option<f64>> = ids.iter().map(|&id| if id % 10 == 0 { None } else { Some(id as f64 / 4.0) }).collect();

    let stmt = ses.prep("INSERT INTO ora_array (id, name, amount) VALUES (:1, :2, :3)")?;
    assert_eq!(stmt.stmt_type(), StmtType::Insert);
    assert_eq!(stmt.num_input()?, 3);
    let num = stmt.exe(&mut [(&ids).into(), (&names).into(), (&amounts).into()])?;
    assert_eq!(num, NUM_ROWS as u64);
    stmt.close()?;

    let rset = ses.prep_and_qry("SELECT COUNT(*), COUNT(amount), MAX(name) KEEP (DENSE_RANK LAST ORDER BY id) FROM ora_array", &mut [])?;
    let row = rset.next_row()?.expect("aggregate row");
    let count : i64 = row.get(0)?;
    let not_null : i64 = row.get(1)?;
    let last : String = row.get(2)?;
    assert_eq!(count, NUM_ROWS as i64);
    assert_eq!(not_null, (NUM_ROWS - NUM_ROWS / 10) as i64);
    assert_eq!(last, "row 999999");
    rset.close()?;

    let stmt = ses.prep("SELECT id, name FROM ora_array WHERE id < :1 ORDER BY id")?;
    let rset = stmt.qry(&mut [1000.into()])?;
    let mut expected = 0i64;
    for row in rset.clone() {
        let id : i64 = row.get(0)?;
        assert_eq!(id, expected);
        expected += 1;
    }
    assert!(rset.err().is_none());
    assert_eq!(expected, 1000);
    assert_eq!(rset.index(), 999);
    stmt.close()?;

    common::drop_table(&ses, "ora_array");
    env.close()
}

/// Rows inserted in an open transaction are not visible to other sessions until commit.
#[test]
fn transaction_isolation() -> Result<()> {
    let (env, ses) = match common::session()? {
        Some(conn) => conn,
        None => return Ok(()),
    };
    let (srv_cfg, ses_cfg) = common::settings().expect("database settings");
    let other = env.open_srv(&srv_cfg)?.open_ses(&ses_cfg)?;

    common::drop_table(&ses, "ora_tx");
    ses.prep_and_exe("CREATE TABLE ora_tx (id NUMBER(10))", &mut [])?;

    let count = |ses: &Ses| -> Result<i64> {
        let rset = ses.prep_and_qry("SELECT COUNT(*) FROM ora_tx", &mut [])?;
        let row = rset.next_row()?.expect("count");
        rset.close()?;
        row.get(0)
    };

    let tx = ses.start_tx()?;
    assert_eq!(ses.num_tx(), 1);
    ses.prep_and_exe("INSERT INTO ora_tx (id) VALUES (:1)", &mut [1.into()])?;
    assert_eq!(count(&ses)?, 1);
    assert_eq!(count(&other)?, 0);
    tx.commit()?;
    assert!(!tx.is_open());
    assert_eq!(ses.num_tx(), 0);
    assert_eq!(count(&other)?, 1);

    let tx = ses.start_tx()?;
    ses.prep_and_exe("INSERT INTO ora_tx (id) VALUES (:1)", &mut [2.into()])?;
    ses.rollback()?;
    assert!(!tx.is_open());
    assert_eq!(count(&ses)?, 1);

    // outside a transaction every statement commits
    ses.prep_and_exe("INSERT INTO ora_tx (id) VALUES (:1)", &mut [3.into()])?;
    assert_eq!(count(&other)?, 2);

    common::drop_table(&ses, "ora_tx");
    env.close()
}

/// A PL/SQL block opens a REF CURSOR into an output placeholder.
#[test]
fn ref_cursor_out_bind() -> Result<()> {
    let (env, ses) = match common::session()? {
        Some(conn) => conn,
        None => return Ok(()),
    };
    let stmt = ses.prep("
        BEGIN
            OPEN :1 FOR
                SELECT level AS n, 'item ' || level AS label
                  FROM dual
               CONNECT BY level <= :2;
        END;
    ")?;
    let mut cursor : Option<Rset> = None;
    stmt.exe(&mut [Arg::Cursor(&mut cursor), 25.into()])?;
    let rset = cursor.expect("opened cursor");
    assert_eq!(rset.column_names(), ["N", "LABEL"]);
    assert_eq!(stmt.num_rset(), 1);

    let mut num = 0;
    while let Some(row) = rset.next_row()? {
        num += 1;
        let n : u32 = row.get("N")?;
        let label : String = row.get("LABEL")?;
        assert_eq!(n, num);
        assert_eq!(label, format!("item {}", num));
    }
    assert_eq!(num, 25);

    stmt.close()?;
    assert!(!rset.is_open());
    env.close()
}

/// Streams a 33 MB BLOB in and reads it back in 16 MB pieces.
#[test]
fn lob_streaming() -> Result<()> {
    const LEN : usize = 33 << 20;
    const PIECE : usize = 16 << 20;
    let (env, ses) = match common::session()? {
        Some(conn) => conn,
        None => return Ok(()),
    };
    common::drop_table(&ses, "ora_lob");
    ses.prep_and_exe("CREATE TABLE ora_lob (id NUMBER(10), data BLOB, text CLOB)", &mut [])?;

    let data : Vec<u8> = (0..LEN).map(|i| (i % 251) as u8).collect();
    let num = ses.prep_and_exe(
        "INSERT INTO ora_lob (id, data, text) VALUES (:1, :2, :3)",
        &mut [1.into(), Arg::blob(&data[..]), Arg::clob("Größe".as_bytes())]
    )?;
    assert_eq!(num, 1);

    let stmt = ses.prep_with("SELECT data, text FROM ora_lob WHERE id = :1", &[ColumnType::Lob, ColumnType::Lob])?;
    let rset = stmt.qry(&mut [1.into()])?;
    let row = rset.next_row()?.expect("LOB row");
    let lob : Lob = row.get(0)?;
    assert_eq!(lob.len()? as usize, LEN);

    let mut reader = lob.reader();
    let mut buf = vec![0u8; PIECE];
    let mut pos = 0;
    loop {
        let mut filled = 0;
        while filled < PIECE {
            let n = reader.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            break;
        }
        assert!(buf[..filled] == data[pos..pos + filled]);
        pos += filled;
    }
    assert_eq!(pos, LEN);

    let text : Lob = row.get(1)?;
    assert!(text.is_clob());
    assert_eq!(text.len()?, 5);
    assert_eq!(text.read_to_string()?, "Größe");
    stmt.close()?;

    let rset = ses.prep_and_qry("SELECT data FROM ora_lob WHERE id = :1 FOR UPDATE", &mut [1.into()])?;
    let lob : Lob = rset.next_row()?.expect("locked row").get(0)?;
    lob.trim(4)?;
    assert_eq!(lob.write_at(4, &[9, 9])?, 2);
    assert_eq!(lob.read_to_end()?, vec![0, 1, 2, 3, 9, 9]);
    let mut writer = lob.writer();
    writer.write_all(&[7])?;
    writer.flush()?;
    assert_eq!(lob.read_to_end()?, vec![7, 1, 2, 3, 9, 9]);
    rset.close()?;
    ses.rollback()?;

    common::drop_table(&ses, "ora_lob");
    env.close()
}

/// Closed pooled sessions are reused by the next `get`.
#[test]
fn pool_reuse() -> Result<()> {
    common::init_log();
    let (srv_cfg, ses_cfg) = match common::settings() {
        Some(cfg) => cfg,
        None => return Ok(()),
    };
    let env = Env::open()?;
    let pool = Pool::new(&env, srv_cfg, ses_cfg, 2);

    let ses = pool.get()?;
    let name = ses.sys_name().to_string();
    ses.ping()?;
    ses.close()?;
    assert!(ses.is_open());
    assert_eq!(pool.num_idle_ses(), 1);

    let ses = pool.get()?;
    assert_eq!(ses.sys_name(), name);
    assert_eq!(pool.num_idle_ses(), 0);

    let other = pool.get()?;
    assert_ne!(other.sys_name(), name);
    other.close()?;
    ses.close()?;
    assert_eq!(pool.num_idle_ses(), 2);

    assert_eq!(env.num_srv(), 2);
    pool.close()?;
    assert!(!ses.is_open());
    assert_eq!(pool.num_idle_ses(), 0);
    assert_eq!(pool.num_idle_srv(), 0);
    assert_eq!(env.num_srv(), 0);
    env.close()
}
