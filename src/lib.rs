/*!
    A blocking interface between Rust applications and Oracle databases, built on the Oracle Call
    Interface (OCI).

    Handles form a hierarchy: an [`Env`] opens servers ([`Srv`]), a server opens sessions
    ([`Ses`]), a session prepares statements ([`Stmt`]) and starts transactions ([`Tx`]), and a
    statement opens result sets ([`Rset`]). Closing a handle closes everything opened under it.
    Every handle is cheap to clone and can be shared between threads.

    The OCI client library is loaded when the first environment is opened, so the crate builds
    without the Oracle client installed.

    # Example
    ```no_run
    use ora::{Env, Arg};

    let env = Env::open()?;
    let ses = env.connect("scott/tiger@localhost/orcl")?;

    let stmt = ses.prep("INSERT INTO emp (empno, ename) VALUES (:1, :2)")?;
    let num = stmt.exe(&mut [Arg::from(&[7990i64, 7991][..]), Arg::from(&["BLAKE", "KING"][..])])?;
    assert_eq!(num, 2);
    ses.commit()?;

    let rset = ses.prep_and_qry("SELECT ename FROM emp WHERE empno > :1", &mut [7900.into()])?;
    while let Some(row) = rset.next_row()? {
        let name : String = row.get(0)?;
        println!("{}", name);
    }
    ses.close()?;
    env.close()?;
    # Ok::<(),ora::Error>(())
    ```

    Logging goes through the [`log`](https://docs.rs/log) facade: opened and closed handles and
    executed statements at `debug`, fetch windows and binds at `trace`.
*/

#[macro_use]
mod err;
mod oci;
mod cfg;
mod arena;
mod drv;
mod dsn;
mod types;
mod conv;
mod reg;
mod env;
mod srv;
mod ses;
mod tx;
mod ctx;
mod bind;
mod def;
mod lob;
mod rset;
mod stmt;
mod pool;

pub use err::Error;
pub use cfg::{ColumnType, RsetCfg, StmtCfg, SrvCfg, SesCfg, SesMode, PoolKind};
pub use drv::{DrvCfg, cfg, set_cfg};
pub use dsn::Dsn;
pub use types::{Timestamp, IntervalYM, IntervalDS, Bfile, Value, Row, FromValue, ColumnIndex};
pub use env::Env;
pub use srv::Srv;
pub use ses::Ses;
pub use tx::Tx;
pub use ctx::{Ctx, CancelToken};
pub use bind::{Arg, Kind, ToVal, ArrayArg, OutArg};
pub use def::Column;
pub use lob::{Lob, LobReader, LobWriter};
pub use rset::Rset;
pub use stmt::{Stmt, StmtType};
pub use pool::{Pool, IdlePool, Close, DEFAULT_POOL_SIZE, DEFAULT_EVICT_DURATION};

pub type Result<T> = std::result::Result<T, Error>;
