use diesel::r2d2::{ConnectionManager, Pool};
use diesel::PgConnection;

use crate::config::AppConfig;

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

pub fn create_conn(config: &AppConfig) -> Result<DbPool, diesel::r2d2::PoolError> {
    let manager = ConnectionManager::<PgConnection>::new(config.database_url());
    Pool::builder().build(manager)
}

/// Offset for a 1-indexed page number. Pages below 1 clamp to the first page.
pub fn page_offset(page: i64, page_size: i64) -> i64 {
    (page.max(1) - 1) * page_size
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_offsets_are_one_indexed() {
        assert_eq!(page_offset(1, 50), 0);
        assert_eq!(page_offset(2, 50), 50);
        assert_eq!(page_offset(3, 20), 40);
    }

    #[test]
    fn out_of_range_pages_clamp_to_first() {
        assert_eq!(page_offset(0, 50), 0);
        assert_eq!(page_offset(-5, 50), 0);
    }
}
