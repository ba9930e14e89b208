//! Server error numbers the loader reacts to.

/// `ER_LOCK_WAIT_TIMEOUT`
pub const LOCK_WAIT_TIMEOUT: u16 = 1205;
/// `ER_LOCK_DEADLOCK`
pub const LOCK_DEADLOCK: u16 = 1213;
/// `ER_DUP_ENTRY`
pub const DUPLICATE_ENTRY: u16 = 1062;
/// `ER_BAD_NULL_ERROR`
pub const BAD_NULL: u16 = 1048;
/// `ER_DATA_TOO_LONG`
pub const DATA_TOO_LONG: u16 = 1406;
/// `ER_WARN_DATA_OUT_OF_RANGE`
pub const DATA_OUT_OF_RANGE: u16 = 1264;
/// `ER_TRUNCATED_WRONG_VALUE_FOR_FIELD`
pub const TRUNCATED_WRONG_VALUE: u16 = 1366;
/// `ER_NO_SUCH_TABLE`
pub const NO_SUCH_TABLE: u16 = 1146;
/// `ER_DUP_FIELDNAME`
pub const DUPLICATE_FIELD_NAME: u16 = 1060;
/// `ER_BAD_FIELD_ERROR`
pub const BAD_FIELD: u16 = 1054;
/// `ER_ACCESS_DENIED_ERROR`
pub const ACCESS_DENIED: u16 = 1045;
/// `ER_TABLEACCESS_DENIED_ERROR`
pub const TABLE_ACCESS_DENIED: u16 = 1142;
/// `ER_CON_COUNT_ERROR`
pub const TOO_MANY_CONNECTIONS: u16 = 1040;
/// `ER_QUERY_INTERRUPTED`
pub const QUERY_INTERRUPTED: u16 = 1317;
/// `CR_SERVER_GONE_ERROR`
pub const SERVER_GONE: u16 = 2006;
/// `CR_SERVER_LOST`
pub const SERVER_LOST: u16 = 2013;

/// Returns the MySQL error number carried by a [`sqlx::Error`], if any.
pub fn error_number(err: &sqlx::Error) -> Option<u16> {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
            .map(|mysql_err| mysql_err.number()),
        _ => None,
    }
}
