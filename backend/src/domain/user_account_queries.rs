//! SQL issued by the user account service.
//!
//! Columns follow `backend/sql/schema.sql`. Placeholders use PostgreSQL's
//! positional `$n` form and timestamps are millisecond epochs.

/// Whether a username is already taken. `$1`: username.
pub const USERNAME_EXISTS: &str =
    "SELECT EXISTS (SELECT 1 FROM user_accounts WHERE username = $1)";

/// Insert a user. `$1..$4`: id, first name, last name, created at.
pub const INSERT_USER: &str = "INSERT INTO users (user_id, first_name, last_name, created_at) \
     VALUES ($1, $2, $3, $4)";

/// Insert an account. `$1..$4`: id, username, user id, created at.
pub const INSERT_USER_ACCOUNT: &str = "INSERT INTO user_accounts \
     (user_account_id, username, user_id, created_at) VALUES ($1, $2, $3, $4)";

/// Number of accounts, ignoring pagination.
pub const COUNT_USER_ACCOUNTS: &str = "SELECT COUNT(*) FROM user_accounts";

/// One window of accounts joined with their users. `$1`: offset, `$2`: limit.
pub const FIND_USER_ACCOUNTS: &str = "SELECT user_account_id, username, account_created_at, \
     user_id, first_name, last_name, user_created_at \
     FROM (\
         SELECT ua.user_account_id, ua.username, ua.created_at AS account_created_at, \
         u.user_id, u.first_name, u.last_name, u.created_at AS user_created_at, \
         ROW_NUMBER() OVER (ORDER BY ua.row_id) AS row_num \
         FROM user_accounts AS ua \
         INNER JOIN users AS u ON u.user_id = ua.user_id\
     ) AS numbered \
     WHERE row_num > $1 \
     ORDER BY row_num \
     LIMIT $2";

/// Whether any account exists past a row position. `$1`: position.
pub const HAS_USER_ACCOUNTS_AFTER: &str = "SELECT EXISTS (\
         SELECT 1 FROM (\
             SELECT ROW_NUMBER() OVER (ORDER BY row_id) AS row_num FROM user_accounts\
         ) AS numbered \
         WHERE row_num > $1\
     )";

/// One account joined with its user. `$1`: account id.
pub const FIND_USER_ACCOUNT_BY_ID: &str = "SELECT ua.user_account_id, ua.username, ua.created_at, \
     u.user_id, u.first_name, u.last_name, u.created_at \
     FROM user_accounts AS ua \
     INNER JOIN users AS u ON u.user_id = ua.user_id \
     WHERE ua.user_account_id = $1";
